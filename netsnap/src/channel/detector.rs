//! Prompt detection: sample the device's idle response once per session.

use bytes::BytesMut;
use log::{debug, info, warn};
use tokio::time::Instant;

use super::patterns::PromptPattern;
use crate::config::ReaderConfig;
use crate::transport::Transport;

/// Infers the session prompt from the device's reply to a bare newline.
#[derive(Debug, Clone)]
pub struct PromptDetector {
    config: ReaderConfig,
}

impl PromptDetector {
    pub fn new(config: ReaderConfig) -> Self {
        Self { config }
    }

    /// Send one newline, collect everything arriving within the sample
    /// window and compile the last non-blank line into a literal matcher.
    ///
    /// Never fails: a channel error or an empty sample yields the generic
    /// fallback pattern.
    pub async fn detect<T: Transport>(&self, transport: &mut T) -> PromptPattern {
        if let Err(e) = transport.send(b"\n").await {
            warn!("prompt detection could not send: {}; using generic prompt", e);
            return PromptPattern::generic();
        }

        let deadline = Instant::now() + self.config.prompt_sample();
        let mut sample = BytesMut::new();
        while Instant::now() < deadline {
            match transport.try_recv() {
                Ok(Some(chunk)) => sample.extend_from_slice(&chunk),
                Ok(None) => tokio::time::sleep(self.config.poll_interval()).await,
                Err(e) => {
                    warn!("channel failed during prompt detection: {}", e);
                    break;
                }
            }
        }
        debug!("prompt sample: {} bytes", sample.len());

        let pattern = match last_non_blank_line(&sample) {
            Some(line) => PromptPattern::literal(line),
            None => PromptPattern::generic(),
        };
        info!("detected prompt: {}", pattern.describe());
        pattern
    }
}

/// Last line of `data` that is not blank after trimming.
pub(crate) fn last_non_blank_line(data: &[u8]) -> Option<&[u8]> {
    data.split(|&b| b == b'\n' || b == b'\r')
        .map(|line| line.trim_ascii())
        .rfind(|line| !line.is_empty())
}
