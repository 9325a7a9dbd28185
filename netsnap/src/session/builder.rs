//! Session definition and its validating builder.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};

use super::commands::sanitize_command;
use crate::error::ValidationError;
use crate::transport::{HostKeyVerification, Protocol};

/// Per-run output directory: `<base>/change-YYYYMMDD`.
pub fn default_output_dir(base: impl AsRef<Path>, date: NaiveDate) -> PathBuf {
    base.as_ref()
        .join(format!("change-{}", date.format("%Y%m%d")))
}

/// One run against one device. Immutable once built.
#[derive(Debug, Clone)]
pub struct Session {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub commands: Vec<String>,

    /// Tag put in front of the output file name, e.g. `before` or `after`.
    pub mode_tag: String,
    pub output_dir: PathBuf,

    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
}

impl Session {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for [`Session`].
///
/// `build` checks every field and reports all problems at once.
///
/// # Example
///
/// ```rust
/// use netsnap::session::SessionBuilder;
///
/// let session = SessionBuilder::new("192.0.2.10")
///     .protocol_name("telnet")
///     .username("admin")
///     .password("secret")
///     .commands(["display version", "display interface brief"])
///     .mode_tag("before")
///     .build()
///     .unwrap();
/// assert_eq!(session.port, 23);
/// ```
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    host: String,
    port: Option<u16>,
    port_error: Option<String>,
    protocol: String,
    username: String,
    password: SecretString,
    commands: Vec<String>,
    mode_tag: String,
    output_dir: Option<PathBuf>,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
}

impl SessionBuilder {
    /// Start a session for `host`, an IPv4 address.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            port_error: None,
            protocol: Protocol::Ssh.as_str().to_string(),
            username: String::new(),
            password: SecretString::from(String::new()),
            commands: Vec::new(),
            mode_tag: "before".to_string(),
            output_dir: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    /// Start from an `ip[:port]` string as typed by an operator.
    pub fn from_address(address: &str) -> Self {
        let address = address.trim();
        match address.split_once(':') {
            Some((host, port)) => {
                let mut builder = Self::new(host.trim());
                match port.trim().parse::<u16>() {
                    Ok(port) => builder.port = Some(port),
                    Err(_) => {
                        builder.port_error = Some(format!(
                            "port '{}' is not a number between 1 and 65535",
                            port.trim()
                        ))
                    }
                }
                builder
            }
            None => Self::new(address),
        }
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol.as_str().to_string();
        self
    }

    /// Protocol by name (`ssh` or `telnet`), checked at build time.
    pub fn protocol_name(mut self, name: impl Into<String>) -> Self {
        self.protocol = name.into();
        self
    }

    /// Port; defaults to the protocol's well-known port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self.port_error = None;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::from(password.into());
        self
    }

    pub fn commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.commands = commands
            .into_iter()
            .map(|c| sanitize_command(c.as_ref()))
            .filter(|c| !c.is_empty())
            .collect();
        self
    }

    pub fn mode_tag(mut self, tag: impl Into<String>) -> Self {
        self.mode_tag = tag.into();
        self
    }

    /// Output directory; defaults to `./change-<today>`.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<Session, ValidationError> {
        let mut errors = Vec::new();

        let protocol = match self.protocol.parse::<Protocol>() {
            Ok(protocol) => Some(protocol),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let host = self.host.trim().to_string();
        if host.is_empty() {
            errors.push("IP address must not be empty".to_string());
        } else if host.parse::<Ipv4Addr>().is_err() {
            errors.push(format!("'{host}' is not a dotted-quad IPv4 address"));
        }

        if let Some(e) = self.port_error {
            errors.push(e);
        } else if self.port == Some(0) {
            errors.push("port must be between 1 and 65535".to_string());
        }

        if self.username.trim().is_empty() {
            errors.push("username must not be empty".to_string());
        }
        if self.password.expose_secret().is_empty() {
            errors.push("password must not be empty".to_string());
        }
        if self.commands.is_empty() {
            errors.push("command list is empty".to_string());
        }
        if self.mode_tag.trim().is_empty() {
            errors.push("mode tag must not be empty".to_string());
        }

        let protocol = match protocol {
            Some(protocol) if errors.is_empty() => protocol,
            _ => return Err(ValidationError { errors }),
        };

        let output_dir = self
            .output_dir
            .unwrap_or_else(|| default_output_dir(".", chrono::Local::now().date_naive()));

        Ok(Session {
            protocol,
            port: self.port.unwrap_or_else(|| protocol.default_port()),
            host,
            username: self.username.trim().to_string(),
            password: self.password,
            commands: self.commands,
            mode_tag: self.mode_tag.trim().to_string(),
            output_dir,
            host_key_verification: self.host_key_verification,
            known_hosts_path: self.known_hosts_path,
        })
    }
}
