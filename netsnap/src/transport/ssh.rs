//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info, trace, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use secrecy::ExposeSecret;

use super::classify::classify_ssh;
use super::config::{HostKeyVerification, SshConfig};
use super::pipe::{BytePipe, PipeEnds, pipe};
use super::stop::StopSignal;
use super::{Protocol, TerminalSetup, Transport};
use crate::error::{ChannelError, ConnectError, ConnectErrorCode};

/// Pause after the shell opens, letting banners and MOTD arrive.
const BANNER_SETTLE: Duration = Duration::from_millis(300);

/// SSH transport: an interactive PTY shell on a russh session.
pub struct SshTransport {
    config: SshConfig,
    stop: StopSignal,
    session: Option<Handle<SshHandler>>,
    pipe: Option<BytePipe>,
}

impl SshTransport {
    pub fn new(config: SshConfig, stop: StopSignal) -> Self {
        Self {
            config,
            stop,
            session: None,
            pipe: None,
        }
    }

    fn error(&self, code: ConnectErrorCode, detail: impl Into<String>) -> ConnectError {
        ConnectError::new(code, &self.config.host, self.config.port, detail)
    }

    fn ssh_error(&self, err: russh::Error) -> ConnectError {
        self.error(classify_ssh(&err), err.to_string())
    }

    /// Establish the session, authenticate and open the shell channel.
    async fn establish(&mut self) -> Result<(), ConnectError> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<ConnectError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: self.config.host.clone(),
            port: self.config.port,
            host_key_verification: self.config.host_key_verification.clone(),
            known_hosts_path: self.config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let timeout = self.config.timeout;
        let mut session = tokio::time::timeout(
            timeout,
            client::connect(
                ssh_config,
                (self.config.host.as_str(), self.config.port),
                handler,
            ),
        )
        .await
        .map_err(|_| {
            self.error(
                ConnectErrorCode::Timeout,
                format!("no SSH handshake within {timeout:?}"),
            )
        })?
        .map_err(|e| {
            // A rejected host key surfaces from russh as a generic error;
            // prefer the detailed one recorded by the handler.
            let stored = host_key_error.lock().ok().and_then(|mut guard| guard.take());
            stored.unwrap_or_else(|| self.ssh_error(e))
        })?;
        debug!("{} SSH handshake complete", self.config.socket_addr());

        let auth = tokio::time::timeout(
            timeout,
            session.authenticate_password(
                &self.config.username,
                self.config.password.expose_secret(),
            ),
        )
        .await
        .map_err(|_| self.error(ConnectErrorCode::Timeout, "authentication timed out"))?
        .map_err(|e| self.ssh_error(e))?;

        if !auth.success() {
            return Err(self.error(
                ConnectErrorCode::AuthFailed,
                format!("authentication failed for user '{}'", self.config.username),
            ));
        }

        let channel = self.open_shell(&session).await?;
        let (pipe, ends) = pipe();
        tokio::spawn(run_channel_io(
            channel,
            ends,
            self.stop.clone(),
            self.config.socket_addr(),
        ));

        self.session = Some(session);
        self.pipe = Some(pipe);
        Ok(())
    }

    /// Open a PTY-backed shell channel on the session.
    async fn open_shell(&self, session: &Handle<SshHandler>) -> Result<Channel<Msg>, ConnectError> {
        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| self.ssh_error(e))?;

        channel
            .request_pty(
                true,
                "vt100",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| self.ssh_error(e))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| self.ssh_error(e))?;

        Ok(channel)
    }

    async fn teardown(&mut self) {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.close();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await
            {
                debug!("{} disconnect: {}", self.config.socket_addr(), e);
            }
        }
    }
}

impl Transport for SshTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        info!("SSH connecting to {}", self.config.socket_addr());
        if let Err(e) = self.establish().await {
            self.teardown().await;
            return Err(e);
        }

        tokio::time::sleep(BANNER_SETTLE).await;
        match self.drain() {
            Ok(dropped) => trace!("discarded {} bytes of login banner", dropped),
            Err(_) => {
                self.teardown().await;
                return Err(self.error(
                    ConnectErrorCode::ConnectionReset,
                    "shell closed right after login",
                ));
            }
        }

        info!("SSH connected to {}", self.config.socket_addr());
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        match self.pipe.as_mut() {
            Some(pipe) => pipe.send(data).await,
            None => Err(ChannelError::Closed),
        }
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, ChannelError> {
        if self.stop.is_stopped() {
            return Err(ChannelError::Closed);
        }
        match self.pipe.as_mut() {
            Some(pipe) => pipe.try_recv(),
            None => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self) {
        if self.pipe.is_some() || self.session.is_some() {
            self.teardown().await;
            info!("SSH connection closed: {}", self.config.socket_addr());
        }
    }

    fn is_open(&self) -> bool {
        self.pipe.as_ref().is_some_and(|p| !p.is_closed())
    }

    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    fn terminal_setup(&self) -> TerminalSetup {
        TerminalSetup::ReadEach
    }
}

/// Shuttle bytes between the SSH channel and the session pipe until either
/// side goes away or a stop is requested.
async fn run_channel_io(
    mut channel: Channel<Msg>,
    mut ends: PipeEnds,
    stop: StopSignal,
    addr: String,
) {
    loop {
        tokio::select! {
            _ = stop.stopped() => {
                debug!("{} stop requested, closing channel", addr);
                break;
            }
            outgoing = ends.outgoing.recv() => match outgoing {
                Some(data) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        debug!("{} failed to send data to shell: {:?}", addr, e);
                        break;
                    }
                }
                None => break,
            },
            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data })
                | Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    if ends.incoming.send(Bytes::copy_from_slice(data)).await.is_err() {
                        debug!("{} shell output receiver dropped", addr);
                        break;
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("{} shell exited with status {}", addr, exit_status);
                    break;
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    debug!("{} shell sent EOF", addr);
                    break;
                }
                Some(_) => {}
            },
        }
    }
    let _ = channel.eof().await;
    let _ = channel.close().await;
    debug!("{} SSH I/O task ended", addr);
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Detailed host-key error for connect() to surface instead of the
    /// generic russh error.
    host_key_error: Arc<Mutex<Option<ConnectError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if the host is not listed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> Result<bool, ConnectError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(ConnectError::new(
                ConnectErrorCode::HostkeyMismatch,
                &self.host,
                self.port,
                format!("host key changed (known_hosts line {line})"),
            )),
            Err(e) => Err(ConnectError::new(
                ConnectErrorCode::HostkeyMismatch,
                &self.host,
                self.port,
                format!("known_hosts check failed: {e}"),
            )),
        }
    }

    fn learn_host_key(&self, pubkey: &PublicKey) {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };
        if let Err(e) = result {
            warn!("Failed to save host key for {}: {}", self.host, e);
        }
    }

    fn reject(&self, err: ConnectError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(err);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let accepted = match self.host_key_verification {
            HostKeyVerification::Disabled => true,

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => {
                    self.learn_host_key(server_public_key);
                    true
                }
                Err(e) => self.reject(e),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => true,
                Ok(false) => self.reject(ConnectError::new(
                    ConnectErrorCode::HostkeyMismatch,
                    &self.host,
                    self.port,
                    "host is not in known_hosts",
                )),
                Err(e) => self.reject(e),
            },
        };
        Ok(accepted)
    }
}
