//! Run statistics and the final report.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::orchestrator::OrchestratorState;
use crate::error::ConnectErrorCode;
use crate::transport::Protocol;

/// Per-run command counters.
///
/// Skipped commands (never attempted because of a stop request or a failed
/// connect) are also counted as failed, so once a run ends
/// `completed_commands + failed_commands == total_commands`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_commands: usize,
    pub completed_commands: usize,
    pub failed_commands: usize,
    pub skipped_commands: usize,
    pub total_bytes: usize,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
}

impl SessionStats {
    pub fn new(total_commands: usize) -> Self {
        Self {
            total_commands,
            ..Self::default()
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Local::now());
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Local::now());
    }

    pub fn record_completed(&mut self) {
        self.completed_commands += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed_commands += 1;
    }

    /// Count the commands that will never run.
    pub fn skip_remaining(&mut self) {
        let remaining = self.remaining();
        self.skipped_commands += remaining;
        self.failed_commands += remaining;
    }

    /// Raise the byte counter; it never goes down.
    pub fn update_bytes(&mut self, total_bytes: usize) {
        self.total_bytes = self.total_bytes.max(total_bytes);
    }

    /// Commands neither completed nor failed yet.
    pub fn remaining(&self) -> usize {
        self.total_commands
            .saturating_sub(self.completed_commands + self.failed_commands)
    }

    /// Commands actually sent to the device.
    pub fn attempted(&self) -> usize {
        self.completed_commands + self.failed_commands - self.skipped_commands
    }
}

/// Everything reported when a run ends.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// True when every command was attempted on a live connection.
    pub success: bool,
    pub state: OrchestratorState,
    pub mode_tag: String,
    pub host: String,
    pub protocol: Protocol,
    pub stats: SessionStats,
    pub duration: Duration,
    pub throughput_bytes_per_sec: f64,
    pub output_dir: PathBuf,
    pub file_path: Option<PathBuf>,

    /// Set when the run never got past connecting.
    pub connect_error: Option<ConnectErrorCode>,
}

impl RunReport {
    /// Throughput in KiB/s, as shown to operators.
    pub fn throughput_kib(&self) -> f64 {
        self.throughput_bytes_per_sec / 1024.0
    }
}
