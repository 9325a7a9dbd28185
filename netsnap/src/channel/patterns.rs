//! Prompt matchers used against the tail window.

use std::sync::LazyLock;

use regex::bytes::Regex;

/// Path-like token, then a prompt terminator, then optional whitespace, at
/// the very end of the buffer and at the start of a line.
const GENERIC_PROMPT: &str = r"(?:^|[\r\n])[\w\-.:/@~<\[\]()]+[#>$%]\s*$";

static GENERIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GENERIC_PROMPT).expect("generic prompt pattern compiles"));

/// Trait for prompt matching; a regex works out of the box.
pub trait PromptMatcher: Send + Sync {
    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, data: &[u8]) -> Option<usize>;

    /// Check if the data matches the pattern.
    fn is_match(&self, data: &[u8]) -> bool {
        self.find_match(data).is_some()
    }
}

impl PromptMatcher for Regex {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        self.find(data).map(|m| m.end())
    }
}

/// The prompt of one session, built once after connecting.
#[derive(Debug, Clone)]
pub enum PromptPattern {
    /// The sampled prompt line, compared byte for byte at the buffer end.
    Literal(Vec<u8>),

    /// Fallback when nothing usable was sampled.
    Generic(Regex),
}

impl PromptPattern {
    /// Exact matcher for a sampled prompt line. Trailing whitespace of the
    /// sample is ignored, as is trailing whitespace of the buffer.
    pub fn literal(sample: &[u8]) -> Self {
        PromptPattern::Literal(trim_end(sample).to_vec())
    }

    pub fn generic() -> Self {
        PromptPattern::Generic(GENERIC_REGEX.clone())
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, PromptPattern::Generic(_))
    }

    /// Printable form for logs.
    pub fn describe(&self) -> String {
        match self {
            PromptPattern::Literal(prompt) => {
                format!("literal {:?}", String::from_utf8_lossy(prompt))
            }
            PromptPattern::Generic(_) => "generic".to_string(),
        }
    }
}

impl PromptMatcher for PromptPattern {
    fn find_match(&self, data: &[u8]) -> Option<usize> {
        match self {
            PromptPattern::Literal(prompt) => {
                let trimmed = trim_end(data);
                (!prompt.is_empty() && trimmed.ends_with(prompt)).then_some(trimmed.len())
            }
            PromptPattern::Generic(regex) => regex.find_match(data),
        }
    }
}

fn trim_end(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &data[..end]
}
