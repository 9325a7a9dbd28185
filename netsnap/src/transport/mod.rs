//! Transport layer: byte-stream channels to a device.
//!
//! Two variants share the small [`Transport`] capability set: an SSH
//! interactive shell (russh) and a plain telnet session (tokio TCP with a
//! telnet option codec). Login handshakes stay inside each variant.

mod classify;
pub mod config;
mod negotiation;
mod pipe;
#[cfg(test)]
pub(crate) mod scripted;
mod ssh;
mod stop;
mod telnet;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;

pub use classify::{classify_io, classify_ssh};
pub use config::{HostKeyVerification, SshConfig, TelnetConfig};
pub use negotiation::TelnetCodec;
pub use pipe::{BytePipe, PipeEnds, pipe};
pub use ssh::SshTransport;
pub use stop::StopSignal;
pub use telnet::TelnetTransport;

use crate::error::{ChannelError, ConnectError};

/// Connection protocol of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ssh,
    Telnet,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ssh => "ssh",
            Protocol::Telnet => "telnet",
        }
    }

    /// Well-known port for the protocol.
    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Ssh => 22,
            Protocol::Telnet => 23,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Protocol::Ssh),
            "telnet" => Ok(Protocol::Telnet),
            other => Err(format!("protocol must be 'ssh' or 'telnet', got '{other}'")),
        }
    }
}

/// How the terminal setup commands are sent after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSetup {
    /// Detect the prompt first, then read each setup response up to the prompt.
    ReadEach,

    /// Send each setup command, pause briefly and discard whatever came back;
    /// the prompt is detected afterwards.
    SendAndDiscard,
}

/// A duplex byte stream to one device.
///
/// `try_recv` never blocks; `close` is idempotent and safe on cleanup paths.
pub trait Transport: Send {
    /// Open the connection and complete the login.
    fn connect(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send;

    /// Write bytes to the device.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Take one pending chunk, if any.
    fn try_recv(&mut self) -> Result<Option<Bytes>, ChannelError>;

    /// Tear the connection down.
    fn close(&mut self) -> impl Future<Output = ()> + Send;

    /// Whether a channel is currently open.
    fn is_open(&self) -> bool;

    fn protocol(&self) -> Protocol;

    fn terminal_setup(&self) -> TerminalSetup;

    /// Discard everything currently pending. Returns the byte count dropped.
    fn drain(&mut self) -> Result<usize, ChannelError> {
        let mut dropped = 0;
        while let Some(chunk) = self.try_recv()? {
            dropped += chunk.len();
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("ssh".parse::<Protocol>().unwrap(), Protocol::Ssh);
        assert_eq!(" Telnet ".parse::<Protocol>().unwrap(), Protocol::Telnet);
        assert!("serial".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Protocol::Ssh.default_port(), 22);
        assert_eq!(Protocol::Telnet.default_port(), 23);
    }
}
