//! One-way notifications from a running session to whoever drives it.

use log::debug;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use super::stats::RunReport;

/// Kind of error being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The connection or login failed; the run is over.
    Connect,
    /// One command failed; the run continues.
    Command,
    /// Output could not be buffered or written.
    Output,
    /// The worker itself failed.
    Runtime,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Command => "command",
            Self::Output => "output",
            Self::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress { percent: u8, message: String },
    Error { category: ErrorCategory, message: String },
    Completed(Box<RunReport>),
}

/// Receives session notifications. Every method defaults to doing nothing.
pub trait SessionObserver: Send + Sync {
    fn on_progress(&self, _percent: u8, _message: &str) {}

    fn on_error(&self, _category: ErrorCategory, _message: &str) {}

    fn on_completed(&self, _report: &RunReport) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// Forwards notifications as [`SessionEvent`]s over a channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new(sender: UnboundedSender<SessionEvent>) -> Self {
        Self { sender }
    }

    fn emit(&self, event: SessionEvent) {
        if self.sender.send(event).is_err() {
            debug!("session event dropped: receiver gone");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_progress(&self, percent: u8, message: &str) {
        self.emit(SessionEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn on_error(&self, category: ErrorCategory, message: &str) {
        self.emit(SessionEvent::Error {
            category,
            message: message.to_string(),
        });
    }

    fn on_completed(&self, report: &RunReport) {
        self.emit(SessionEvent::Completed(Box::new(report.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);
        observer.on_progress(5, "connecting");
        observer.on_error(ErrorCategory::Command, "timed out");

        match rx.try_recv().unwrap() {
            SessionEvent::Progress { percent, message } => {
                assert_eq!(percent, 5);
                assert_eq!(message, "connecting");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::Error {
                category: ErrorCategory::Command,
                ..
            }
        ));
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        ChannelObserver::new(tx).on_progress(50, "still running");
    }
}
