//! Session layer: what to run, running it, and reporting on it.
//!
//! A [`Session`] is built and validated by [`SessionBuilder`], executed by a
//! [`SessionOrchestrator`] (usually on a [`SessionWorker`] thread), and ends
//! with a [`RunReport`] delivered to a [`SessionObserver`].

mod builder;
mod commands;
mod events;
mod orchestrator;
mod stats;
mod worker;

pub use builder::{Session, SessionBuilder, default_output_dir};
pub use commands::{
    decode_text, is_bulk_output, load_command_file, parse_command_list, sanitize_command,
    timeout_for,
};
pub use events::{ChannelObserver, ErrorCategory, NullObserver, SessionEvent, SessionObserver};
pub use orchestrator::{OrchestratorState, SessionOrchestrator};
pub use stats::{RunReport, SessionStats};
pub use worker::SessionWorker;
