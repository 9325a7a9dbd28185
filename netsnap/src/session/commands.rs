//! Command lists: loading, cleanup and timeout selection.

use std::path::Path;
use std::time::Duration;

use encoding_rs::GBK;
use log::debug;

use crate::config::TimeoutConfig;
use crate::error::ConfigError;

/// Substrings (lowercase) of commands known to produce large output.
const BULK_OUTPUT_COMMANDS: &[&str] = &[
    "display current-configuration",
    "show running-config",
    "show configuration",
    "display diagnostic-information",
    "show tech-support",
    "display interface",
    "show interface",
    "display ip interface",
    "show ip interface",
    "display version",
    "show version",
];

/// Whether `command` gets the bulk timeout and idle-probe window.
pub fn is_bulk_output(command: &str) -> bool {
    let command = command.to_lowercase();
    BULK_OUTPUT_COMMANDS
        .iter()
        .any(|pattern| command.contains(pattern))
}

/// Per-command timeout.
pub fn timeout_for(command: &str, timeouts: &TimeoutConfig) -> Duration {
    timeouts.command(is_bulk_output(command))
}

/// Clean a command line before it is sent.
///
/// Removes byte-order marks, zero-width and bidi formatting characters,
/// control characters, a leading `<prompt>` prefix pasted along with the
/// command, and collapses whitespace runs to one space.
pub fn sanitize_command(command: &str) -> String {
    let cleaned: String = command
        .chars()
        .filter(|&c| !is_invisible(c))
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    let mut rest = cleaned.trim_start();
    if rest.starts_with('<') {
        if let Some(end) = rest.find('>') {
            rest = &rest[end + 1..];
        }
    }
    rest.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_invisible(c: char) -> bool {
    matches!(c,
        '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{206F}'
        | '\u{FEFF}')
}

/// Split command-file text into commands.
///
/// Blank lines and lines starting with `#` are skipped; every kept line is
/// sanitized and dropped if nothing is left.
pub fn parse_command_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(sanitize_command)
        .filter(|command| !command.is_empty())
        .collect()
}

/// Load and parse a command file, detecting its encoding.
pub fn load_command_file(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (text, encoding) = decode_text(&bytes);
    let commands = parse_command_list(&text);
    debug!(
        "loaded {} commands from {} ({})",
        commands.len(),
        path.display(),
        encoding
    );
    Ok(commands)
}

/// Decode with BOM detection, then strict UTF-8, then GBK, then Latin-1.
///
/// Returns the text and the name of the encoding used.
pub fn decode_text(bytes: &[u8]) -> (String, &'static str) {
    if let Some(rest) = bytes.strip_prefix(b"\xEF\xBB\xBF") {
        return (String::from_utf8_lossy(rest).into_owned(), "utf-8-bom");
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFF\xFE") {
        return (decode_utf16(rest, u16::from_le_bytes), "utf-16le");
    }
    if let Some(rest) = bytes.strip_prefix(b"\xFE\xFF") {
        return (decode_utf16(rest, u16::from_be_bytes), "utf-16be");
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), "utf-8");
    }
    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return (text.into_owned(), "gbk");
    }
    (bytes.iter().map(|&b| b as char).collect(), "latin-1")
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
