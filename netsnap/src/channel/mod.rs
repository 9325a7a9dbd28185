//! Channel layer: prompt detection and reading command output.
//!
//! This module turns the raw byte stream of a [`Transport`](crate::transport::Transport)
//! into per-command results by watching for the session prompt.

mod buffer;
mod detector;
mod patterns;
mod reader;

pub use buffer::TailWindow;
pub use detector::PromptDetector;
pub use patterns::{PromptMatcher, PromptPattern};
pub use reader::{ReadOutcome, ReadResult, SessionReader, TRUNCATION_MARKER};
