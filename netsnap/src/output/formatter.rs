//! Output normalization and per-command block formatting.
//!
//! SSH and telnet echo commands and end lines differently. Everything that
//! reaches the output file goes through here so both converge on the same
//! block shape: `"<command>\n<body>\n\n"`.

/// Marker placed before the message of a failed command's block.
pub const ERROR_MARKER: &str = "[ERROR]";

/// Drop NUL bytes and turn every CR/LF combination into a single `\n`.
///
/// A run of carriage returns, with or without a following line feed,
/// becomes one line feed.
pub fn normalize_line_endings(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\0' => {}
            '\r' => {
                while chars.next_if_eq(&'\r').is_some() {}
                let _ = chars.next_if_eq(&'\n');
                out.push('\n');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Remove leading blank lines and a single echoed command line.
///
/// The echo may carry the device prompt in front of it, so a first line that
/// ends with the command counts as the echo too.
pub fn strip_command_echo<'a>(command: &str, text: &'a str) -> &'a str {
    let mut rest = text;
    loop {
        match rest.split_once('\n') {
            Some((line, tail)) if line.trim().is_empty() => rest = tail,
            _ => break,
        }
    }
    if rest.trim().is_empty() {
        return "";
    }

    let command = command.trim();
    if command.is_empty() {
        return rest;
    }
    let (head, tail) = rest.split_once('\n').unwrap_or((rest, ""));
    let head = head.trim();
    if head == command || head.ends_with(command) {
        tail
    } else {
        rest
    }
}

fn body(command: &str, raw: &str) -> String {
    let normalized = normalize_line_endings(raw);
    strip_command_echo(command, &normalized)
        .trim_end_matches('\n')
        .to_string()
}

/// Format a successful command's output as a block.
///
/// Failed commands go through [`format_error_block`].
pub fn format_block(command: &str, raw: &str) -> String {
    let command = command.trim();
    let body = body(command, raw);
    format!("{command}\n{body}\n\n")
}

/// Block for a failed command: the error line, then whatever partial output
/// was captured before the failure.
pub fn format_error_block(command: &str, error: &str, partial: &str) -> String {
    let command = command.trim();
    let partial = body(command, partial);
    if partial.is_empty() {
        format!("{command}\n{ERROR_MARKER} {error}\n\n")
    } else {
        format!("{command}\n{ERROR_MARKER} {error}\n{partial}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert_eq!(normalize_line_endings("a\r\r\nb"), "a\nb");
        assert_eq!(normalize_line_endings("a\0b\r\n"), "ab\n");
    }

    #[test]
    fn test_crlf_and_cr_inputs_converge() {
        let crlf = format_block("show clock", "show clock\r\n12:00\r\nR1#");
        let cr = format_block("show clock", "show clock\r12:00\rR1#");
        let lf = format_block("show clock", "show clock\n12:00\nR1#");
        assert_eq!(crlf, lf);
        assert_eq!(cr, lf);
        assert_eq!(lf, "show clock\n12:00\nR1#\n\n");
    }

    #[test]
    fn test_strips_echo_with_prompt_prefix() {
        let block = format_block(
            "display device",
            "\r\n\r\n<R1>display device\r\nSlot 0 ok\r\n<R1>",
        );
        assert_eq!(block, "display device\nSlot 0 ok\n<R1>\n\n");
    }

    #[test]
    fn test_keeps_first_line_without_echo() {
        let block = format_block("show version", "Version 15.2\nR1#");
        assert_eq!(block, "show version\nVersion 15.2\nR1#\n\n");
    }

    #[test]
    fn test_only_one_echo_line_is_removed() {
        let block = format_block("ping", "ping\nping\nR1#");
        assert_eq!(block, "ping\nping\nR1#\n\n");
    }

    #[test]
    fn test_command_is_trimmed() {
        let block = format_block("  show ip route \t", "show ip route\nR1#");
        assert!(block.starts_with("show ip route\nR1#"));
    }

    #[test]
    fn test_empty_output() {
        assert_eq!(format_block("show x", ""), "show x\n\n\n");
        assert_eq!(format_block("show x", "show x\r\n"), "show x\n\n\n");
    }

    #[test]
    fn test_failure_blocks() {
        assert_eq!(
            format_error_block("show tech", "timed out after 600s", "show tech\r\npartial\r\n"),
            "show tech\n[ERROR] timed out after 600s\npartial\n\n"
        );
        assert_eq!(
            format_error_block("show tech", "timed out after 600s", ""),
            "show tech\n[ERROR] timed out after 600s\n\n"
        );
    }
}
