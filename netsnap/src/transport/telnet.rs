//! Telnet transport: TCP session with an explicit login handshake.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use memchr::memmem;
use secrecy::ExposeSecret;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;

use super::classify::classify_io;
use super::config::TelnetConfig;
use super::negotiation::TelnetCodec;
use super::pipe::{BytePipe, PipeEnds, pipe};
use super::stop::StopSignal;
use super::{Protocol, TerminalSetup, Transport};
use crate::error::{ChannelError, ConnectError, ConnectErrorCode};

const LOGIN_PROMPTS: &[&[u8]] = &[
    b"login:",
    b"Login:",
    b"Username:",
    b"username:",
    b"User Name:",
    b"user name:",
    b"User:",
];

const PASSWORD_PROMPTS: &[&[u8]] = &[b"Password:", b"password:", b"Passwd:", b"passwd:"];

/// Matched case-insensitively in the post-login output.
const LOGIN_ERRORS: &[&[u8]] = &[b"incorrect", b"error", b"fail", b"invalid", b"denied"];

/// Any of these after the password means a shell prompt showed up.
const PROMPT_TERMINATORS: &[u8] = b"#$>%";

const READ_CHUNK: usize = 16 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const AFTER_USERNAME: Duration = Duration::from_millis(300);
const AFTER_PASSWORD: Duration = Duration::from_millis(600);

/// Telnet transport.
pub struct TelnetTransport {
    config: TelnetConfig,
    stop: StopSignal,
    pipe: Option<BytePipe>,
}

impl TelnetTransport {
    pub fn new(config: TelnetConfig, stop: StopSignal) -> Self {
        Self {
            config,
            stop,
            pipe: None,
        }
    }

    fn error(&self, code: ConnectErrorCode, detail: impl Into<String>) -> ConnectError {
        ConnectError::new(code, &self.config.host, self.config.port, detail)
    }

    async fn attempt(&mut self) -> Result<(), ConnectError> {
        let addr = self.config.socket_addr();
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect((self.config.host.as_str(), self.config.port)),
        )
        .await
        .map_err(|_| {
            self.error(
                ConnectErrorCode::Timeout,
                format!("no TCP connection within {:?}", self.config.connect_timeout),
            )
        })?
        .map_err(|e| self.error(classify_io(&e), e.to_string()))?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("{} set_nodelay: {}", addr, e);
        }

        let (pipe, ends) = pipe();
        let codec = TelnetCodec::new(self.config.terminal_width, self.config.terminal_height);
        tokio::spawn(run_socket_io(stream, codec, ends, self.stop.clone(), addr));
        self.pipe = Some(pipe);

        self.login().await
    }

    /// Username, password, then watch for a shell prompt or an error.
    async fn login(&mut self) -> Result<(), ConnectError> {
        let prompt_timeout = self.config.prompt_timeout;

        if self.wait_for_any(LOGIN_PROMPTS, prompt_timeout).await?.is_none() {
            return Err(self.error(
                ConnectErrorCode::ProtocolError,
                format!(
                    "no login prompt within {prompt_timeout:?}; port may not be a telnet service"
                ),
            ));
        }
        let username = format!("{}\n", self.config.username);
        self.send_login(username.as_bytes()).await?;
        tokio::time::sleep(AFTER_USERNAME).await;

        if self.wait_for_any(PASSWORD_PROMPTS, prompt_timeout).await?.is_none() {
            return Err(self.error(
                ConnectErrorCode::ProtocolError,
                format!("no password prompt within {prompt_timeout:?}"),
            ));
        }
        let mut password = self.config.password.expose_secret().as_bytes().to_vec();
        password.push(b'\n');
        self.send_login(&password).await?;
        tokio::time::sleep(AFTER_PASSWORD).await;

        self.verify_login().await
    }

    async fn send_login(&mut self, data: &[u8]) -> Result<(), ConnectError> {
        let result = self.send(data).await;
        result.map_err(|e| self.error(ConnectErrorCode::ConnectionReset, e.to_string()))
    }

    /// Pull one chunk, mapping a closed pipe to a connect error.
    fn recv_login(&mut self) -> Result<Option<Bytes>, ConnectError> {
        let result = self.try_recv();
        result.map_err(|_| {
            self.error(
                ConnectErrorCode::ConnectionReset,
                "connection closed during login",
            )
        })
    }

    /// Accumulate output until one of `patterns` appears.
    async fn wait_for_any(
        &mut self,
        patterns: &[&'static [u8]],
        timeout: Duration,
    ) -> Result<Option<&'static [u8]>, ConnectError> {
        let deadline = Instant::now() + timeout;
        let mut seen = BytesMut::new();
        while Instant::now() < deadline {
            match self.recv_login()? {
                Some(chunk) => {
                    seen.extend_from_slice(&chunk);
                    if let Some(found) = patterns
                        .iter()
                        .find(|p| memmem::find(&seen, p).is_some())
                    {
                        return Ok(Some(*found));
                    }
                }
                None => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Ok(None)
    }

    async fn verify_login(&mut self) -> Result<(), ConnectError> {
        let deadline = Instant::now() + self.config.verify_timeout;
        let mut seen = BytesMut::new();
        loop {
            match self.recv_login()? {
                Some(chunk) => {
                    seen.extend_from_slice(&chunk);
                    match login_outcome(&seen) {
                        Some(true) => return Ok(()),
                        Some(false) => {
                            error!("telnet login to {} rejected", self.config.socket_addr());
                            return Err(self.error(
                                ConnectErrorCode::AuthFailed,
                                "the device reported a login failure",
                            ));
                        }
                        None => {}
                    }
                }
                None if Instant::now() >= deadline => break,
                None => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Err(self.error(
            ConnectErrorCode::AuthFailed,
            format!(
                "no shell prompt within {:?} after sending the password",
                self.config.verify_timeout
            ),
        ))
    }

    async fn teardown(&mut self) {
        if let Some(mut pipe) = self.pipe.take() {
            pipe.close();
        }
    }
}

/// `Some(false)` on an error keyword, `Some(true)` on a prompt terminator,
/// `None` while undecided. Errors win when both are present.
fn login_outcome(output: &[u8]) -> Option<bool> {
    let lower = output.to_ascii_lowercase();
    if LOGIN_ERRORS
        .iter()
        .any(|keyword| memmem::find(&lower, keyword).is_some())
    {
        return Some(false);
    }
    if output.iter().any(|b| PROMPT_TERMINATORS.contains(b)) {
        return Some(true);
    }
    None
}

impl Transport for TelnetTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        let attempts = self.config.login_attempts.max(1);
        let mut attempt = 1;
        loop {
            info!(
                "telnet connecting to {} (attempt {}/{})",
                self.config.socket_addr(),
                attempt,
                attempts
            );
            match self.attempt().await {
                Ok(()) => {
                    info!("telnet connected to {}", self.config.socket_addr());
                    return Ok(());
                }
                Err(e) => {
                    self.teardown().await;
                    if attempt >= attempts || self.stop.is_stopped() {
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(1 << attempt.min(5));
                    warn!("telnet attempt {} failed: {}; retrying in {:?}", attempt, e, backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
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
        if self.pipe.is_some() {
            self.teardown().await;
            info!("telnet connection closed: {}", self.config.socket_addr());
        }
    }

    fn is_open(&self) -> bool {
        self.pipe.as_ref().is_some_and(|p| !p.is_closed())
    }

    fn protocol(&self) -> Protocol {
        Protocol::Telnet
    }

    fn terminal_setup(&self) -> TerminalSetup {
        TerminalSetup::SendAndDiscard
    }
}

/// Own the socket: decode telnet framing on the way in, escape IAC on the
/// way out, answer negotiations directly.
async fn run_socket_io(
    stream: TcpStream,
    mut codec: TelnetCodec,
    mut ends: PipeEnds,
    stop: StopSignal,
    addr: String,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        tokio::select! {
            _ = stop.stopped() => {
                debug!("{} stop requested, closing socket", addr);
                break;
            }
            outgoing = ends.outgoing.recv() => match outgoing {
                Some(data) => {
                    if let Err(e) = writer.write_all(&TelnetCodec::encode(&data)).await {
                        debug!("{} write failed: {}", addr, e);
                        break;
                    }
                }
                None => break,
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("{} remote closed the connection", addr);
                    break;
                }
                Ok(n) => {
                    let decoded = codec.decode(&buf[..n]);
                    if !decoded.replies.is_empty() {
                        if let Err(e) = writer.write_all(&decoded.replies).await {
                            debug!("{} negotiation reply failed: {}", addr, e);
                            break;
                        }
                    }
                    if !decoded.data.is_empty() && ends.incoming.send(decoded.data).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{} read failed: {}", addr, e);
                    break;
                }
            },
        }
    }
    let _ = writer.shutdown().await;
    debug!("{} telnet I/O task ended", addr);
}
