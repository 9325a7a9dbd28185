//! Read-until-complete state machine.
//!
//! A command is finished when the session prompt reappears at the end of the
//! output. Devices give no other end marker, so the reader polls the
//! transport, matches the prompt against a bounded tail window, nudges a
//! silent device with a bare carriage return and enforces a per-command
//! output cap.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use tokio::time::Instant;

use super::buffer::TailWindow;
use super::patterns::PromptMatcher;
use crate::config::ReaderConfig;
use crate::output::normalize_line_endings;
use crate::transport::Transport;

/// Appended to the text of a read that hit the per-command cap.
pub const TRUNCATION_MARKER: &str = "[output truncated, exceeded 48MB limit]";

/// How a read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The prompt came back.
    Completed,

    /// The deadline passed without a prompt.
    TimedOut,

    /// The per-command cap was reached.
    Truncated,

    /// The channel closed under the read.
    Closed,
}

/// Output of one command.
#[derive(Debug, Clone)]
pub struct ReadResult {
    /// Everything received, capped.
    pub data: Bytes,

    /// Decoded, line-ending-normalized text, with the truncation marker
    /// appended when capped.
    pub text: String,

    pub outcome: ReadOutcome,
    pub elapsed: Duration,
}

impl ReadResult {
    pub fn truncated(&self) -> bool {
        self.outcome == ReadOutcome::Truncated
    }

    /// Completed or truncated; both carry usable output.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReadOutcome::Completed | ReadOutcome::Truncated)
    }
}

/// Drains one command's response from a transport.
#[derive(Debug, Clone)]
pub struct SessionReader {
    config: ReaderConfig,
}

impl SessionReader {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Read until `prompt` matches the tail of the output, the deadline
    /// passes, the cap is hit or the channel closes.
    ///
    /// `bulk` selects the longer idle-probe window.
    pub async fn read_until_complete<T, P>(
        &self,
        transport: &mut T,
        prompt: &P,
        timeout: Duration,
        bulk: bool,
    ) -> ReadResult
    where
        T: Transport,
        P: PromptMatcher + ?Sized,
    {
        let start = Instant::now();
        let deadline = start + timeout;
        let idle_window = self.config.idle_probe(bulk);
        let cap = self.config.max_output_bytes;

        let mut output = BytesMut::new();
        let mut tail = TailWindow::new(self.config.tail_window);
        let mut last_data = start;

        let outcome = loop {
            if Instant::now() >= deadline {
                debug!("read timed out after {:?} with {} bytes", timeout, output.len());
                break ReadOutcome::TimedOut;
            }

            match transport.try_recv() {
                Ok(Some(chunk)) => {
                    last_data = Instant::now();
                    if append_capped(&mut output, &chunk, cap) {
                        warn!("command output reached the {} byte cap", cap);
                        break ReadOutcome::Truncated;
                    }
                    tail.push(&chunk);
                    trace!("read chunk: {} bytes, total {}", chunk.len(), output.len());

                    if prompt.is_match(tail.as_slice()) {
                        // Absorb the rest of the prompt line.
                        tokio::time::sleep(self.config.prompt_grace()).await;
                        if self.drain_available(transport, &mut output, cap) {
                            break ReadOutcome::Truncated;
                        }
                        break ReadOutcome::Completed;
                    }
                }
                Ok(None) => {
                    if last_data.elapsed() >= idle_window {
                        trace!("idle for {:?}, sending probe", idle_window);
                        if let Err(e) = transport.send(b"\r").await {
                            debug!("idle probe not sent: {}", e);
                        }
                        tokio::time::sleep(self.config.probe_settle()).await;
                        last_data = Instant::now();
                    } else {
                        tokio::time::sleep(self.config.poll_interval()).await;
                    }
                }
                Err(e) => {
                    debug!("channel ended during read: {}", e);
                    break ReadOutcome::Closed;
                }
            }
        };

        let data = output.freeze();
        let mut text = normalize_line_endings(&String::from_utf8_lossy(&data));
        if outcome == ReadOutcome::Truncated {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(TRUNCATION_MARKER);
        }

        ReadResult {
            data,
            text,
            outcome,
            elapsed: start.elapsed(),
        }
    }

    /// Pull whatever is immediately available. Returns true if the cap was hit.
    fn drain_available<T: Transport>(
        &self,
        transport: &mut T,
        output: &mut BytesMut,
        cap: usize,
    ) -> bool {
        while let Ok(Some(chunk)) = transport.try_recv() {
            if append_capped(output, &chunk, cap) {
                return true;
            }
        }
        false
    }
}

/// Append up to the cap. Returns true once the cap is reached.
fn append_capped(output: &mut BytesMut, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(output.len());
    if chunk.len() >= room {
        output.extend_from_slice(&chunk[..room]);
        return true;
    }
    output.extend_from_slice(chunk);
    false
}
