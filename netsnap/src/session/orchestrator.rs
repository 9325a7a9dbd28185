//! Runs a command list end to end against one device.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Serialize;

use super::builder::Session;
use super::commands::{is_bulk_output, sanitize_command, timeout_for};
use super::events::{ErrorCategory, SessionObserver};
use super::stats::{RunReport, SessionStats};
use crate::channel::{PromptDetector, PromptPattern, ReadOutcome, SessionReader};
use crate::config::CollectorConfig;
use crate::error::{ChannelError, CommandError};
use crate::output::{BufferManager, format_block, format_error_block};
use crate::transport::{
    Protocol, SshConfig, SshTransport, StopSignal, TelnetConfig, TelnetTransport, TerminalSetup,
    Transport,
};

/// Pause after each setup command on transports that discard setup output.
const SETUP_PAUSE: Duration = Duration::from_millis(150);

/// Longest command prefix shown in progress messages.
const PROGRESS_COMMAND_CHARS: usize = 50;

/// Where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Connecting,
    Ready,
    /// Running the command at this index.
    Executing(usize),
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Ready => f.write_str("ready"),
            Self::Executing(i) => write!(f, "executing #{}", i + 1),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Done => f.write_str("done"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Sequences one session: connect, prepare the terminal, detect the prompt,
/// run every command, then close and finalize on every exit path.
pub struct SessionOrchestrator {
    session: Session,
    config: CollectorConfig,
    observer: Arc<dyn SessionObserver>,
    stop: StopSignal,
    state: OrchestratorState,
    reader: SessionReader,
}

impl SessionOrchestrator {
    pub fn new(
        session: Session,
        config: CollectorConfig,
        observer: Arc<dyn SessionObserver>,
        stop: StopSignal,
    ) -> Self {
        let reader = SessionReader::new(config.reader.clone());
        Self {
            session,
            config,
            observer,
            stop,
            state: OrchestratorState::Connecting,
            reader,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run over the transport matching the session's protocol.
    pub async fn run(self) -> RunReport {
        match self.session.protocol {
            Protocol::Ssh => {
                let transport = SshTransport::new(self.ssh_config(), self.stop.clone());
                self.run_with(transport).await
            }
            Protocol::Telnet => {
                let transport = TelnetTransport::new(self.telnet_config(), self.stop.clone());
                self.run_with(transport).await
            }
        }
    }

    fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.session.host.clone(),
            port: self.session.port,
            username: self.session.username.clone(),
            password: self.session.password.clone(),
            timeout: Duration::from_secs(self.config.timeouts.ssh_connect_secs),
            terminal_width: self.config.terminal.width,
            terminal_height: self.config.terminal.height,
            host_key_verification: self.session.host_key_verification.clone(),
            known_hosts_path: self.session.known_hosts_path.clone(),
        }
    }

    fn telnet_config(&self) -> TelnetConfig {
        let timeouts = &self.config.timeouts;
        TelnetConfig {
            host: self.session.host.clone(),
            port: self.session.port,
            username: self.session.username.clone(),
            password: self.session.password.clone(),
            connect_timeout: Duration::from_secs(timeouts.telnet_connect_secs),
            prompt_timeout: Duration::from_secs(timeouts.login_prompt_secs),
            verify_timeout: Duration::from_secs(timeouts.login_verify_secs),
            login_attempts: self.config.telnet.login_attempts,
            terminal_width: u16::try_from(self.config.terminal.width).unwrap_or(u16::MAX),
            terminal_height: u16::try_from(self.config.terminal.height).unwrap_or(u16::MAX),
        }
    }

    /// Run over a caller-supplied transport.
    pub async fn run_with<T: Transport>(mut self, mut transport: T) -> RunReport {
        let total = self.session.commands.len();
        let mut stats = SessionStats::new(total);
        stats.start();
        let mut buffer = BufferManager::new(
            &self.session.output_dir,
            &self.session.mode_tag,
            &self.session.host,
            self.config.buffer,
        );

        self.set_state(OrchestratorState::Connecting);
        self.progress(
            5,
            &format!(
                "{} connecting to {}",
                transport.protocol(),
                self.session.socket_addr()
            ),
        );

        let mut connect_error = None;
        let outcome = match transport.connect().await {
            Ok(()) => {
                self.progress(10, "connected");
                self.set_state(OrchestratorState::Ready);
                let prompt = self.prepare_terminal(&mut transport).await;
                self.execute_commands(&mut transport, &prompt, &mut buffer, &mut stats)
                    .await
            }
            Err(e) => {
                error!("{}", e);
                self.observer
                    .on_error(ErrorCategory::Connect, &format!("{e} ({})", e.hint()));
                connect_error = Some(e.code);
                stats.skip_remaining();
                OrchestratorState::Aborted
            }
        };

        self.set_state(OrchestratorState::Finalizing);
        transport.close().await;
        let summary = buffer.finalize();
        stats.update_bytes(summary.total_bytes);
        stats.finish();
        self.set_state(outcome);

        let report = RunReport {
            success: outcome == OrchestratorState::Done,
            state: outcome,
            mode_tag: self.session.mode_tag.clone(),
            host: self.session.host.clone(),
            protocol: transport.protocol(),
            stats,
            duration: summary.duration,
            throughput_bytes_per_sec: summary.throughput_bytes_per_sec,
            output_dir: summary.output_dir,
            file_path: summary.file_path,
            connect_error,
        };
        info!(
            "run {}: {}/{} commands completed, {} failed ({} skipped), {} bytes",
            outcome,
            report.stats.completed_commands,
            report.stats.total_commands,
            report.stats.failed_commands,
            report.stats.skipped_commands,
            report.stats.total_bytes
        );
        self.progress(100, &format!("run {outcome}"));
        self.observer.on_completed(&report);
        report
    }

    /// Disable paging and widen the terminal, then pick up the prompt.
    ///
    /// Setup failures are ignored; devices reject the commands meant for
    /// other vendors.
    async fn prepare_terminal<T: Transport>(&self, transport: &mut T) -> PromptPattern {
        let detector = PromptDetector::new(self.config.reader.clone());
        let setup_commands = &self.config.terminal.setup_commands;

        match transport.terminal_setup() {
            TerminalSetup::ReadEach => {
                let prompt = detector.detect(transport).await;
                let timeout = self.config.timeouts.setup_command();
                for command in setup_commands {
                    if let Err(e) = send_command(transport, command).await {
                        debug!("setup command '{}' not sent: {}", command, e);
                        continue;
                    }
                    let result = self
                        .reader
                        .read_until_complete(transport, &prompt, timeout, false)
                        .await;
                    debug!("setup command '{}': {:?}", command, result.outcome);
                }
                prompt
            }
            TerminalSetup::SendAndDiscard => {
                for command in setup_commands {
                    if let Err(e) = send_command(transport, command).await {
                        debug!("setup command '{}' not sent: {}", command, e);
                    }
                    tokio::time::sleep(SETUP_PAUSE).await;
                    if let Err(e) = transport.drain() {
                        debug!("drain after '{}': {}", command, e);
                    }
                }
                detector.detect(transport).await
            }
        }
    }

    /// Returns the terminal state of the run.
    async fn execute_commands<T: Transport>(
        &mut self,
        transport: &mut T,
        prompt: &PromptPattern,
        buffer: &mut BufferManager,
        stats: &mut SessionStats,
    ) -> OrchestratorState {
        let commands = self.session.commands.clone();
        let total = commands.len();

        for (i, command) in commands.iter().enumerate() {
            if self.stop.is_stopped() {
                info!("stop requested, skipping {} remaining commands", total - i);
                stats.skip_remaining();
                return OrchestratorState::Aborted;
            }

            self.set_state(OrchestratorState::Executing(i));
            let percent = 10 + (80 * i / total.max(1)) as u8;
            let shown: String = command.chars().take(PROGRESS_COMMAND_CHARS).collect();
            self.progress(percent, &format!("executing: {shown}"));

            let (block, success) = self.execute_command(transport, prompt, command).await;
            if buffer.add_data(block) {
                if success {
                    stats.record_completed();
                } else {
                    stats.record_failed();
                }
            } else {
                stats.record_failed();
                self.observer.on_error(
                    ErrorCategory::Output,
                    &format!("output cap reached, '{command}' was dropped"),
                );
            }
            stats.update_bytes(buffer.total_bytes());
        }

        if self.stop.is_stopped() {
            return OrchestratorState::Aborted;
        }
        self.progress(90, "all commands sent");
        OrchestratorState::Done
    }

    /// Run one command and format its block. Never fails; failures become
    /// error blocks.
    async fn execute_command<T: Transport>(
        &self,
        transport: &mut T,
        prompt: &PromptPattern,
        command: &str,
    ) -> (String, bool) {
        let command = sanitize_command(command);
        let bulk = is_bulk_output(&command);
        let timeout = timeout_for(&command, &self.config.timeouts);
        debug!("running '{}' (timeout {:?})", command, timeout);

        if let Err(source) = send_command(transport, &command).await {
            let err = CommandError::Channel {
                command: command.clone(),
                source,
            };
            return (self.command_failed(&command, &err, ""), false);
        }

        let result = self
            .reader
            .read_until_complete(transport, prompt, timeout, bulk)
            .await;
        match result.outcome {
            ReadOutcome::Completed | ReadOutcome::Truncated => {
                debug!(
                    "'{}' done: {} bytes in {:?}",
                    command,
                    result.data.len(),
                    result.elapsed
                );
                (format_block(&command, &result.text), true)
            }
            ReadOutcome::TimedOut => {
                let err = CommandError::Timeout {
                    command: command.clone(),
                    timeout,
                };
                (self.command_failed(&command, &err, &result.text), false)
            }
            ReadOutcome::Closed => {
                let err = CommandError::Channel {
                    command: command.clone(),
                    source: ChannelError::Closed,
                };
                (self.command_failed(&command, &err, &result.text), false)
            }
        }
    }

    fn command_failed(&self, command: &str, err: &CommandError, partial: &str) -> String {
        warn!("{}", err);
        self.observer
            .on_error(ErrorCategory::Command, &err.to_string());
        format_error_block(command, &err.to_string(), partial)
    }

    fn set_state(&mut self, state: OrchestratorState) {
        if self.state != state {
            debug!("{}: {} -> {}", self.session.socket_addr(), self.state, state);
            self.state = state;
        }
    }

    fn progress(&self, percent: u8, message: &str) {
        info!("[{:>3}%] {}", percent, message);
        self.observer.on_progress(percent, message);
    }
}

/// Drop residue from the previous exchange, then send `command` plus `\n`.
async fn send_command<T: Transport>(transport: &mut T, command: &str) -> Result<(), ChannelError> {
    let dropped = transport.drain()?;
    if dropped > 0 {
        debug!("discarded {} residual bytes", dropped);
    }
    transport
        .send(format!("{}\n", command.trim()).as_bytes())
        .await
}

impl fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("session", &self.session)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::channel::TRUNCATION_MARKER;
    use crate::error::ConnectErrorCode;
    use crate::session::SessionBuilder;
    use crate::session::events::{ChannelObserver, SessionEvent};
    use crate::transport::scripted::ScriptedTransport;

    fn session(dir: &std::path::Path, commands: &[&str]) -> Session {
        SessionBuilder::new("192.0.2.1")
            .username("admin")
            .password("secret")
            .commands(commands.iter().copied())
            .mode_tag("before")
            .output_dir(dir)
            .build()
            .unwrap()
    }

    fn quiet_config() -> CollectorConfig {
        let mut config = CollectorConfig::default();
        config.terminal.setup_commands = vec!["terminal length 0".to_string()];
        config
    }

    fn orchestrator(
        session: Session,
        config: CollectorConfig,
        stop: StopSignal,
    ) -> (SessionOrchestrator, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let observer = Arc::new(ChannelObserver::new(tx));
        (SessionOrchestrator::new(session, config, observer, stop), rx)
    }

    fn events(rx: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn ssh_device() -> ScriptedTransport {
        ScriptedTransport::new(Protocol::Ssh)
            .greeting(&["Welcome\r\n"])
            .on("\n", &["\r\nR1#"])
            .on("terminal length 0\n", &["terminal length 0\r\nR1#"])
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_command_run() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ssh_device().on(
            "show version\n",
            &["show version\r\nCisco IOS 15.2\r\nuptime 3 weeks\r\nR1#"],
        );
        let sent = transport.sent_log();
        let (orch, mut rx) = orchestrator(
            session(dir.path(), &["show version"]),
            quiet_config(),
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert!(report.success);
        assert_eq!(report.state, OrchestratorState::Done);
        assert_eq!(report.stats.completed_commands, 1);
        assert_eq!(report.stats.failed_commands, 0);
        let path = report.file_path.clone().unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "show version\nCisco IOS 15.2\nuptime 3 weeks\nR1#\n\n"
        );
        assert_eq!(report.stats.total_bytes, fs::metadata(&path).unwrap().len() as usize);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], b"\n");
        assert_eq!(sent[1], b"terminal length 0\n");
        assert_eq!(sent[2], b"show version\n");

        let events = events(&mut rx);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents.first(), Some(&5));
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert!(matches!(events.last(), Some(SessionEvent::Completed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config();
        config.timeouts.command_secs = 5;
        let transport = ssh_device()
            .on("show hang\n", &["show hang\r\nworking...\r\n"])
            .on("show clock\n", &["show clock\r\n12:00:00\r\nR1#"]);
        let (orch, mut rx) = orchestrator(
            session(dir.path(), &["show hang", "show clock"]),
            config,
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.state, OrchestratorState::Done);
        assert_eq!(report.stats.completed_commands, 1);
        assert_eq!(report.stats.failed_commands, 1);
        let content = fs::read_to_string(report.file_path.unwrap()).unwrap();
        assert!(content.starts_with("show hang\n[ERROR] command 'show hang' timed out"));
        assert!(content.contains("\nworking...\n\n"));
        assert!(content.ends_with("show clock\n12:00:00\nR1#\n\n"));

        assert!(events(&mut rx).iter().any(|e| matches!(
            e,
            SessionEvent::Error {
                category: ErrorCategory::Command,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_aborts_without_commands() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            ScriptedTransport::new(Protocol::Ssh).fail_connect(ConnectErrorCode::AuthFailed);
        let sent = transport.sent_log();
        let (orch, mut rx) = orchestrator(
            session(dir.path(), &["show version", "show clock"]),
            quiet_config(),
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert!(!report.success);
        assert_eq!(report.state, OrchestratorState::Aborted);
        assert_eq!(report.connect_error, Some(ConnectErrorCode::AuthFailed));
        assert_eq!(report.stats.completed_commands, 0);
        assert_eq!(report.stats.failed_commands, 2);
        assert_eq!(report.stats.skipped_commands, 2);
        assert!(sent.lock().unwrap().is_empty());
        // The output file exists even though nothing was collected.
        assert_eq!(fs::metadata(report.file_path.unwrap()).unwrap().len(), 0);

        let events = events(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error { category: ErrorCategory::Connect, message }
                if message.contains("auth_failed")
        )));
        assert!(matches!(events.last(), Some(SessionEvent::Completed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_skips_remaining_commands() {
        let dir = tempfile::tempdir().unwrap();
        let stop = StopSignal::new();
        let transport = ssh_device()
            .on("show a\n", &["show a\r\nA\r\nR1#"])
            .on("show b\n", &["show b\r\nB\r\nR1#"])
            .on("show c\n", &["show c\r\nC\r\nR1#"])
            .stop_on("show b\n", stop.clone())
            .watch(stop.clone());
        let (orch, _rx) = orchestrator(
            session(dir.path(), &["show a", "show b", "show c"]),
            quiet_config(),
            stop,
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.state, OrchestratorState::Aborted);
        assert!(!report.success);
        assert_eq!(report.stats.completed_commands, 1);
        assert_eq!(report.stats.failed_commands, 2);
        assert_eq!(report.stats.skipped_commands, 1);
        assert_eq!(
            report.stats.completed_commands + report.stats.failed_commands,
            report.stats.total_commands
        );
        let content = fs::read_to_string(report.file_path.unwrap()).unwrap();
        assert!(content.starts_with("show a\nA\nR1#\n\n"));
        assert!(content.contains("show b\n[ERROR]"));
        assert!(!content.contains("show c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_telnet_setup_discards_then_detects() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(Protocol::Telnet)
            .on("terminal length 0\n", &["\r\n% Unknown command\r\n<HUAWEI>"])
            .on("\n", &["\r\n<HUAWEI>"])
            .on("display version\n", &["display version\r\nVRP 8.1\r\n<HUAWEI>"]);
        let sent = transport.sent_log();
        let (orch, _rx) = orchestrator(
            session(dir.path(), &["display version"]),
            quiet_config(),
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.stats.completed_commands, 1);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], b"terminal length 0\n");
        assert_eq!(sent[1], b"\n");
        let content = fs::read_to_string(report.file_path.unwrap()).unwrap();
        assert_eq!(content, "display version\nVRP 8.1\n<HUAWEI>\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connection_fails_remaining_commands() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ssh_device()
            .on("show a\n", &["show a\r\nA\r\nR1#"])
            .close_on("reload\n");
        let (orch, _rx) = orchestrator(
            session(dir.path(), &["show a", "reload", "show b"]),
            quiet_config(),
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.state, OrchestratorState::Done);
        assert_eq!(report.stats.completed_commands, 1);
        assert_eq!(report.stats.failed_commands, 2);
        assert_eq!(report.stats.skipped_commands, 0);
        let content = fs::read_to_string(report.file_path.unwrap()).unwrap();
        assert!(content.contains("reload\n[ERROR] command 'reload' failed: Channel closed\n\n"));
        assert!(content.contains("show b\n[ERROR]"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncated_output_counts_as_completed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config();
        config.reader.max_output_bytes = 64;
        let transport = ssh_device()
            .on_bytes("show tech-support\n", vec![b'x'; 100])
            .on("show clock\n", &["show clock\r\n12:00:00\r\nR1#"]);
        let (orch, _rx) = orchestrator(
            session(dir.path(), &["show tech-support", "show clock"]),
            config,
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.state, OrchestratorState::Done);
        assert_eq!(report.stats.completed_commands, 2);
        assert_eq!(report.stats.failed_commands, 0);
        let content = fs::read_to_string(report.file_path.unwrap()).unwrap();
        let expected = format!(
            "show tech-support\n{}\n{TRUNCATION_MARKER}\n\nshow clock\n12:00:00\nR1#\n\n",
            "x".repeat(64)
        );
        assert_eq!(content, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cap_rejects_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quiet_config();
        config.buffer.hard_cap_bytes = 40;
        let transport = ssh_device()
            .on("show a\n", &["show a\r\nAAAAAAAAAA\r\nR1#"])
            .on("show b\n", &["show b\r\nBBBBBBBBBB\r\nR1#"]);
        let (orch, mut rx) = orchestrator(
            session(dir.path(), &["show a", "show b"]),
            config,
            StopSignal::new(),
        );

        let report = orch.run_with(transport).await;

        assert_eq!(report.stats.completed_commands, 1);
        assert_eq!(report.stats.failed_commands, 1);
        assert!(report.stats.total_bytes <= 40);
        assert!(events(&mut rx).iter().any(|e| matches!(
            e,
            SessionEvent::Error {
                category: ErrorCategory::Output,
                ..
            }
        )));
    }
}
