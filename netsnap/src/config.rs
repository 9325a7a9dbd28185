//! Collector tunables and TOML configuration loading.
//!
//! All sections are optional in the file; anything missing keeps its
//! default. Durations are stored as integer milliseconds or seconds so the
//! file stays readable.
//!
//! ```toml
//! diff_tool = "/usr/bin/meld"
//!
//! [timeouts]
//! command_secs = 120
//!
//! [terminal]
//! setup_commands = ["terminal length 0"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const MIB: usize = 1024 * 1024;

/// Top-level collector configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub reader: ReaderConfig,
    pub buffer: BufferLimits,
    pub timeouts: TimeoutConfig,
    pub terminal: TerminalConfig,
    pub telnet: TelnetLoginConfig,

    /// External program used to compare two snapshots.
    pub diff_tool: Option<PathBuf>,
}

impl CollectorConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}

/// Read-until-prompt tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Bytes kept at the end of the output for prompt matching.
    pub tail_window: usize,

    /// Per-command output cap; reading stops once reached.
    pub max_output_bytes: usize,

    /// Silence before a bare carriage return is sent to nudge the device.
    pub idle_probe_ms: u64,

    /// Idle-probe window for bulk-output commands.
    pub bulk_idle_probe_ms: u64,

    /// Wait after a prompt match to collect the rest of the prompt line.
    pub prompt_grace_ms: u64,

    /// Sleep between empty polls.
    pub poll_interval_ms: u64,

    /// Sleep after an idle probe before polling again.
    pub probe_settle_ms: u64,

    /// Window used to sample the prompt after connecting.
    pub prompt_sample_ms: u64,
}

impl ReaderConfig {
    pub fn idle_probe(&self, bulk: bool) -> Duration {
        if bulk {
            Duration::from_millis(self.bulk_idle_probe_ms)
        } else {
            Duration::from_millis(self.idle_probe_ms)
        }
    }

    pub fn prompt_grace(&self) -> Duration {
        Duration::from_millis(self.prompt_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_settle(&self) -> Duration {
        Duration::from_millis(self.probe_settle_ms)
    }

    pub fn prompt_sample(&self) -> Duration {
        Duration::from_millis(self.prompt_sample_ms)
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            tail_window: 8 * 1024,
            max_output_bytes: 48 * MIB,
            idle_probe_ms: 600,
            bulk_idle_probe_ms: 1200,
            prompt_grace_ms: 50,
            poll_interval_ms: 20,
            probe_settle_ms: 80,
            prompt_sample_ms: 2000,
        }
    }
}

/// In-memory buffering limits for one run.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct BufferLimits {
    /// Buffered bytes above which blocks are flushed to disk.
    pub soft_flush_bytes: usize,

    /// Total bytes a run may accept.
    pub hard_cap_bytes: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            soft_flush_bytes: 5 * MIB,
            hard_cap_bytes: 50 * MIB,
        }
    }
}

/// Connection and command timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub command_secs: u64,
    pub bulk_command_secs: u64,
    pub setup_command_secs: u64,
    pub ssh_connect_secs: u64,
    pub telnet_connect_secs: u64,
    pub login_prompt_secs: u64,
    pub login_verify_secs: u64,
}

impl TimeoutConfig {
    pub fn command(&self, bulk: bool) -> Duration {
        if bulk {
            Duration::from_secs(self.bulk_command_secs)
        } else {
            Duration::from_secs(self.command_secs)
        }
    }

    pub fn setup_command(&self) -> Duration {
        Duration::from_secs(self.setup_command_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 300,
            bulk_command_secs: 600,
            setup_command_secs: 10,
            ssh_connect_secs: 30,
            telnet_connect_secs: 10,
            login_prompt_secs: 10,
            login_verify_secs: 15,
        }
    }
}

/// Terminal preparation sent right after login.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Commands that disable paging or widen the terminal. Failures are ignored.
    pub setup_commands: Vec<String>,

    /// Terminal width requested from the device.
    pub width: u32,

    /// Terminal height requested from the device.
    pub height: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            setup_commands: [
                "terminal length 0",
                "screen-length 0",
                "screen-length disable",
                "terminal width 512",
                "set cli screen-length 0",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            width: 512,
            height: 1000,
        }
    }
}

/// Telnet login policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelnetLoginConfig {
    /// Connection attempts before giving up. One attempt avoids locking out
    /// accounts on devices with misconfigured credentials.
    pub login_attempts: u32,
}

impl Default for TelnetLoginConfig {
    fn default() -> Self {
        Self { login_attempts: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.reader.max_output_bytes, 48 * MIB);
        assert_eq!(config.buffer.hard_cap_bytes, 50 * MIB);
        assert_eq!(config.buffer.soft_flush_bytes, 5 * MIB);
        assert_eq!(config.timeouts.command(false), Duration::from_secs(300));
        assert_eq!(config.timeouts.command(true), Duration::from_secs(600));
        assert_eq!(config.reader.idle_probe(true), Duration::from_millis(1200));
        assert_eq!(config.terminal.setup_commands.len(), 5);
        assert_eq!(config.telnet.login_attempts, 1);
        assert!(config.diff_tool.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CollectorConfig::from_toml_str(
            r#"
            diff_tool = "/usr/bin/meld"

            [timeouts]
            command_secs = 120

            [terminal]
            setup_commands = ["terminal length 0"]
            "#,
        )
        .unwrap();

        assert_eq!(config.diff_tool, Some(PathBuf::from("/usr/bin/meld")));
        assert_eq!(config.timeouts.command_secs, 120);
        assert_eq!(config.timeouts.bulk_command_secs, 600);
        assert_eq!(config.terminal.setup_commands, vec!["terminal length 0"]);
        assert_eq!(config.terminal.width, 512);
        assert_eq!(config.reader.tail_window, 8 * 1024);
    }

    #[test]
    fn test_invalid_toml() {
        let err =
            CollectorConfig::from_toml_str("[timeouts]\ncommand_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CollectorConfig::load("/nonexistent/netsnap.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
