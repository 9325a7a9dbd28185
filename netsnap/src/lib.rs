//! # netsnap
//!
//! Collects CLI output from network devices over SSH or telnet into
//! plain-text snapshots that can be compared before and after a change.
//!
//! ## Features
//!
//! - SSH interactive shells via russh, telnet via tokio TCP with an option codec
//! - Prompt detection on a bounded tail window, with idle probing for quiet devices
//! - Per-command timeouts and output caps; one failing command never ends the run
//! - Buffered output with soft flushing and a hard per-run cap
//! - Background worker with a stop signal and one-way progress events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netsnap::{CollectorConfig, SessionBuilder, SessionEvent, SessionWorker};
//!
//! fn main() -> Result<(), netsnap::Error> {
//!     let session = SessionBuilder::from_address("192.0.2.10:22")
//!         .username("admin")
//!         .password("secret")
//!         .commands(["show version", "show ip interface brief"])
//!         .mode_tag("before")
//!         .build()?;
//!
//!     let mut worker = SessionWorker::spawn(session, CollectorConfig::default())?;
//!     while let Some(event) = worker.blocking_event() {
//!         if let SessionEvent::Progress { percent, message } = event {
//!             println!("[{percent:>3}%] {message}");
//!         }
//!     }
//!
//!     let report = worker.join()?;
//!     println!("{:?}", report.file_path);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod diff;
pub mod error;
pub mod output;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use config::CollectorConfig;
pub use diff::{DiffLauncher, ExternalDiffTool};
pub use error::{ConnectError, ConnectErrorCode, Error, Result};
pub use session::{
    OrchestratorState, RunReport, Session, SessionBuilder, SessionEvent, SessionObserver,
    SessionOrchestrator, SessionStats, SessionWorker,
};
pub use transport::{HostKeyVerification, Protocol, StopSignal, Transport};
