//! Scripted transport for tests: replays canned device output keyed on the
//! exact bytes sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use super::stop::StopSignal;
use super::{Protocol, TerminalSetup, Transport};
use crate::error::{ChannelError, ConnectError, ConnectErrorCode};

/// One canned response: chunks released `delay` apart.
#[derive(Debug, Clone)]
struct Reply {
    chunks: Vec<Bytes>,
    delay: Duration,
}

#[derive(Debug)]
pub struct ScriptedTransport {
    protocol: Protocol,
    setup: TerminalSetup,
    script: HashMap<Vec<u8>, VecDeque<Reply>>,
    greeting: Vec<Bytes>,
    connect_error: Option<ConnectErrorCode>,
    close_on: Option<Vec<u8>>,
    stop_on: Option<(Vec<u8>, StopSignal)>,
    stop: StopSignal,
    pending: VecDeque<(Instant, Bytes)>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    open: bool,
}

impl ScriptedTransport {
    pub fn new(protocol: Protocol) -> Self {
        let setup = match protocol {
            Protocol::Ssh => TerminalSetup::ReadEach,
            Protocol::Telnet => TerminalSetup::SendAndDiscard,
        };
        Self {
            protocol,
            setup,
            script: HashMap::new(),
            greeting: Vec::new(),
            connect_error: None,
            close_on: None,
            stop_on: None,
            stop: StopSignal::new(),
            pending: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            open: false,
        }
    }

    /// Reply to `sent` with `chunks`, all available at once. Registering the
    /// same input again queues a second reply; the last one repeats.
    pub fn on(self, sent: &str, chunks: &[&str]) -> Self {
        self.on_delayed(sent, Duration::ZERO, chunks)
    }

    /// Reply to `sent` with chunks released `delay` apart, the first one
    /// after `delay`.
    pub fn on_delayed(mut self, sent: &str, delay: Duration, chunks: &[&str]) -> Self {
        let reply = Reply {
            chunks: chunks
                .iter()
                .map(|c| Bytes::copy_from_slice(c.as_bytes()))
                .collect(),
            delay,
        };
        self.script
            .entry(sent.as_bytes().to_vec())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn on_bytes(mut self, sent: &str, chunk: Vec<u8>) -> Self {
        self.script
            .entry(sent.as_bytes().to_vec())
            .or_default()
            .push_back(Reply {
                chunks: vec![Bytes::from(chunk)],
                delay: Duration::ZERO,
            });
        self
    }

    /// Output queued as soon as the connection opens.
    pub fn greeting(mut self, chunks: &[&str]) -> Self {
        self.greeting = chunks
            .iter()
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect();
        self
    }

    pub fn fail_connect(mut self, code: ConnectErrorCode) -> Self {
        self.connect_error = Some(code);
        self
    }

    /// The channel drops when `sent` is written.
    pub fn close_on(mut self, sent: &str) -> Self {
        self.close_on = Some(sent.as_bytes().to_vec());
        self
    }

    /// Fire `stop` when `sent` is written.
    pub fn stop_on(mut self, sent: &str, stop: StopSignal) -> Self {
        self.stop_on = Some((sent.as_bytes().to_vec(), stop));
        self
    }

    /// Reads fail once `stop` fires, as with the real transports.
    pub fn watch(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Everything written so far, shared with the test.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.sent.clone()
    }

    fn queue(&mut self, reply: Reply) {
        let mut at = Instant::now();
        for chunk in reply.chunks {
            at += reply.delay;
            self.pending.push_back((at, chunk));
        }
    }
}

impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), ConnectError> {
        if let Some(code) = self.connect_error {
            return Err(ConnectError::new(code, "192.0.2.1", 22, "scripted failure"));
        }
        self.open = true;
        let now = Instant::now();
        for chunk in self.greeting.clone() {
            self.pending.push_back((now, chunk));
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        if !self.open || self.stop.is_stopped() {
            return Err(ChannelError::Closed);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(data.to_vec());
        }
        if let Some((key, stop)) = &self.stop_on {
            if key == data {
                stop.stop();
            }
        }
        if self.close_on.as_deref() == Some(data) {
            self.open = false;
            return Ok(());
        }
        let reply = match self.script.get_mut(data) {
            Some(replies) if replies.len() > 1 => replies.pop_front(),
            Some(replies) => replies.front().cloned(),
            None => None,
        };
        if let Some(reply) = reply {
            self.queue(reply);
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, ChannelError> {
        if !self.open || self.stop.is_stopped() {
            return Err(ChannelError::Closed);
        }
        match self.pending.front() {
            Some((at, _)) if *at <= Instant::now() => {
                Ok(self.pending.pop_front().map(|(_, chunk)| chunk))
            }
            _ => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn terminal_setup(&self) -> TerminalSetup {
        self.setup
    }
}
