//! Background worker: one OS thread per run, with its own runtime.
//!
//! The thread that drives a UI never blocks on device I/O. It talks to the
//! run only through the [`StopSignal`] and the one-way event channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::mpsc::error::TryRecvError;

use super::builder::Session;
use super::events::{ChannelObserver, ErrorCategory, SessionEvent, SessionObserver};
use super::orchestrator::SessionOrchestrator;
use super::stats::RunReport;
use crate::config::CollectorConfig;
use crate::error::{Error, Result};
use crate::transport::StopSignal;

/// Handle to a run executing on its own thread.
#[derive(Debug)]
pub struct SessionWorker {
    stop: StopSignal,
    events: UnboundedReceiver<SessionEvent>,
    thread: JoinHandle<Result<RunReport>>,
}

impl SessionWorker {
    /// Start the run. Returns once the thread is up; connecting happens on
    /// the worker.
    pub fn spawn(session: Session, config: CollectorConfig) -> Result<Self> {
        let stop = StopSignal::new();
        let (tx, events) = mpsc::unbounded_channel();
        let observer: Arc<dyn SessionObserver> = Arc::new(ChannelObserver::new(tx));
        let name = format!("netsnap-{}", session.host);
        let worker_stop = stop.clone();

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || -> Result<RunReport> {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| {
                        let message = format!("failed to start runtime: {e}");
                        error!("{}", message);
                        observer.on_error(ErrorCategory::Runtime, &message);
                        Error::Worker(message)
                    })?;
                let orchestrator = SessionOrchestrator::new(session, config, observer, worker_stop);
                Ok(runtime.block_on(orchestrator.run()))
            })
            .map_err(|e| Error::Worker(format!("failed to spawn worker thread: {e}")))?;

        Ok(Self {
            stop,
            events,
            thread,
        })
    }

    /// Ask the run to stop. The current command is cut short by closing
    /// the connection; remaining commands are skipped.
    pub fn stop(&self) {
        info!("stop requested");
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Next pending event without waiting.
    pub fn try_event(&mut self) -> Option<SessionEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next event. `None` once the run has ended and every
    /// event was consumed.
    pub fn blocking_event(&mut self) -> Option<SessionEvent> {
        self.events.blocking_recv()
    }

    /// Receiver for async callers.
    pub fn events(&mut self) -> &mut UnboundedReceiver<SessionEvent> {
        &mut self.events
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to end.
    pub fn join(self) -> Result<RunReport> {
        self.thread
            .join()
            .map_err(|_| Error::Worker("worker thread panicked".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectErrorCode;
    use crate::session::SessionBuilder;
    use crate::session::stats::SessionStats;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_refused_connection_reports_through_events() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionBuilder::new("127.0.0.1")
            .protocol_name("telnet")
            .port(closed_port())
            .username("admin")
            .password("secret")
            .commands(["show version", "show clock"])
            .output_dir(dir.path())
            .build()
            .unwrap();

        let mut worker = SessionWorker::spawn(session, CollectorConfig::default()).unwrap();
        let mut events = Vec::new();
        while let Some(event) = worker.blocking_event() {
            events.push(event);
        }
        let report = worker.join().unwrap();

        assert!(!report.success);
        assert_eq!(report.connect_error, Some(ConnectErrorCode::ConnectionRefused));
        assert_eq!(
            report.stats,
            SessionStats {
                started_at: report.stats.started_at,
                ended_at: report.stats.ended_at,
                ..SessionStats {
                    total_commands: 2,
                    failed_commands: 2,
                    skipped_commands: 2,
                    ..SessionStats::default()
                }
            }
        );

        assert!(matches!(events.first(), Some(SessionEvent::Progress { percent: 5, .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error {
                category: ErrorCategory::Connect,
                ..
            }
        )));
        match events.last() {
            Some(SessionEvent::Completed(done)) => assert_eq!(done.file_path, report.file_path),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_before_connect_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionBuilder::new("127.0.0.1")
            .protocol_name("telnet")
            .port(closed_port())
            .username("admin")
            .password("secret")
            .commands(["show version"])
            .output_dir(dir.path())
            .build()
            .unwrap();

        let worker = SessionWorker::spawn(session, CollectorConfig::default()).unwrap();
        worker.stop();
        worker.stop();
        let report = worker.join().unwrap();
        assert_eq!(
            report.stats.completed_commands + report.stats.failed_commands,
            report.stats.total_commands
        );
    }
}
