//! Error types for netsnap.
//!
//! Every transport failure is classified into a [`ConnectErrorCode`] before it
//! leaves the transport layer, so callers can react to a stable code instead
//! of inspecting russh or socket errors.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Main error type for netsnap operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection could not be established.
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Channel operation errors.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A single command failed.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Output buffering or file errors.
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Connection parameters were rejected before connecting.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration file errors.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The external diff tool could not be started.
    #[error("Diff error: {0}")]
    Diff(#[from] crate::diff::DiffError),

    /// Background worker failures (runtime construction, panics).
    #[error("Worker error: {0}")]
    Worker(String),
}

/// Stable, machine-readable classification of a connect failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectErrorCode {
    Timeout,
    ConnectionRefused,
    HostUnreachable,
    DnsFailure,
    AuthFailed,
    HostkeyMismatch,
    ProtocolError,
    ConnectionReset,
    Unknown,
}

impl ConnectErrorCode {
    /// The code as it appears in reports and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ConnectionRefused => "connection_refused",
            Self::HostUnreachable => "host_unreachable",
            Self::DnsFailure => "dns_failure",
            Self::AuthFailed => "auth_failed",
            Self::HostkeyMismatch => "hostkey_mismatch",
            Self::ProtocolError => "protocol_error",
            Self::ConnectionReset => "connection_reset",
            Self::Unknown => "unknown",
        }
    }

    /// A human-readable hint suggesting what the operator should check.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Timeout => {
                "the device did not answer in time; check reachability and firewall rules"
            }
            Self::ConnectionRefused => {
                "nothing is listening on that port; check the port and the protocol"
            }
            Self::HostUnreachable => {
                "no route to the device; check the address and the network path"
            }
            Self::DnsFailure => {
                "the host name could not be resolved; use the device IP address"
            }
            Self::AuthFailed => {
                "the device rejected the credentials; check username and password"
            }
            Self::HostkeyMismatch => {
                "the device host key differs from known_hosts; verify the device before trusting it"
            }
            Self::ProtocolError => {
                "the remote service did not speak the expected protocol; check port and protocol"
            }
            Self::ConnectionReset => {
                "the device closed the connection; it may limit concurrent sessions"
            }
            Self::Unknown => "unexpected failure; see the log for details",
        }
    }
}

impl fmt::Display for ConnectErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified connect failure.
#[derive(Error, Debug, Clone)]
#[error("{code} connecting to {host}:{port}: {detail}")]
pub struct ConnectError {
    pub code: ConnectErrorCode,
    pub host: String,
    pub port: u16,
    pub detail: String,
}

impl ConnectError {
    pub fn new(
        code: ConnectErrorCode,
        host: impl Into<String>,
        port: u16,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code,
            host: host.into(),
            port,
            detail: detail.into(),
        }
    }

    /// Shortcut for the operator hint of this error's code.
    pub fn hint(&self) -> &'static str {
        self.code.hint()
    }
}

/// Channel layer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was never opened or has been closed.
    #[error("Channel closed")]
    Closed,

    /// Data could not be handed to the connection.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Per-command failures; recorded and the run continues.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The prompt did not come back before the command timeout.
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The channel failed while the command was running.
    #[error("command '{command}' failed: {source}")]
    Channel {
        command: String,
        #[source]
        source: ChannelError,
    },
}

/// Output buffering errors.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Writing the session output file failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The run-level output cap would be exceeded.
    #[error("total output would exceed the {limit} byte cap")]
    CapExceeded { limit: usize },
}

/// Aggregated connection-parameter violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type alias using netsnap's Error.
pub type Result<T> = std::result::Result<T, Error>;
