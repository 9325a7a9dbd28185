//! Mapping of low-level connect failures onto [`ConnectErrorCode`].

use std::io;

use crate::error::ConnectErrorCode;

/// Classify a socket-level error.
pub fn classify_io(err: &io::Error) -> ConnectErrorCode {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectErrorCode::Timeout,
        io::ErrorKind::ConnectionRefused => ConnectErrorCode::ConnectionRefused,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            ConnectErrorCode::HostUnreachable
        }
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => ConnectErrorCode::ConnectionReset,
        _ => classify_message(&err.to_string()),
    }
}

/// Classify an SSH library error.
pub fn classify_ssh(err: &russh::Error) -> ConnectErrorCode {
    match err {
        russh::Error::IO(io_err) => classify_io(io_err),
        russh::Error::UnknownKey => ConnectErrorCode::HostkeyMismatch,
        russh::Error::Disconnect => ConnectErrorCode::ConnectionReset,
        other => match classify_message(&other.to_string()) {
            ConnectErrorCode::Unknown => ConnectErrorCode::ProtocolError,
            code => code,
        },
    }
}

/// Fallback for errors that only carry a message (resolver failures, OS
/// errors without a dedicated kind).
fn classify_message(message: &str) -> ConnectErrorCode {
    let message = message.to_ascii_lowercase();
    if message.contains("lookup")
        || message.contains("name or service not known")
        || message.contains("nodename nor servname")
        || message.contains("no such host")
    {
        ConnectErrorCode::DnsFailure
    } else if message.contains("timed out") || message.contains("timeout") {
        ConnectErrorCode::Timeout
    } else if message.contains("unreachable") || message.contains("no route") {
        ConnectErrorCode::HostUnreachable
    } else if message.contains("refused") {
        ConnectErrorCode::ConnectionRefused
    } else if message.contains("reset") || message.contains("broken pipe") {
        ConnectErrorCode::ConnectionReset
    } else {
        ConnectErrorCode::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds() {
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io(&refused), ConnectErrorCode::ConnectionRefused);

        let timeout = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(classify_io(&timeout), ConnectErrorCode::Timeout);

        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert_eq!(classify_io(&reset), ConnectErrorCode::ConnectionReset);

        let unreachable = io::Error::from(io::ErrorKind::HostUnreachable);
        assert_eq!(classify_io(&unreachable), ConnectErrorCode::HostUnreachable);
    }

    #[test]
    fn test_resolver_message() {
        let err =
            io::Error::other("failed to lookup address information: Name or service not known");
        assert_eq!(classify_io(&err), ConnectErrorCode::DnsFailure);
    }

    #[test]
    fn test_unclassified_io_is_unknown() {
        let err = io::Error::other("something odd");
        assert_eq!(classify_io(&err), ConnectErrorCode::Unknown);
    }

    #[test]
    fn test_ssh_errors() {
        assert_eq!(
            classify_ssh(&russh::Error::UnknownKey),
            ConnectErrorCode::HostkeyMismatch
        );
        assert_eq!(
            classify_ssh(&russh::Error::Disconnect),
            ConnectErrorCode::ConnectionReset
        );
        let io_err = russh::Error::IO(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(classify_ssh(&io_err), ConnectErrorCode::ConnectionRefused);
    }
}
