//! Connection configuration for both transport variants.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For lab use only.
    Disabled,
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (IPv4 address).
    pub host: String,

    /// SSH port (default: 22).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Password for authentication.
    pub password: SecretString,

    /// Connection and authentication timeout.
    pub timeout: Duration,

    /// Terminal width for the PTY. Wide enough to avoid device-side wrapping.
    pub terminal_width: u32,

    /// Terminal height for the PTY.
    pub terminal_height: u32,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file; the user's default file when unset.
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// Get the socket address for connection.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Telnet connection configuration.
#[derive(Debug, Clone)]
pub struct TelnetConfig {
    pub host: String,

    /// Telnet port (default: 23).
    pub port: u16,

    pub username: String,

    pub password: SecretString,

    /// TCP connect timeout.
    pub connect_timeout: Duration,

    /// How long to wait for each of the login and password prompts.
    pub prompt_timeout: Duration,

    /// How long to watch for a shell prompt or an error after the password.
    pub verify_timeout: Duration,

    /// Connection attempts before giving up.
    pub login_attempts: u32,

    /// Window size reported through NAWS.
    pub terminal_width: u16,
    pub terminal_height: u16,
}

impl TelnetConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
