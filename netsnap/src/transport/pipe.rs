//! Byte pipe between a transport's background I/O task and the session.
//!
//! Each transport runs one task that owns the socket or SSH channel. The
//! task forwards received bytes into a bounded queue and drains outgoing
//! bytes from another; the session side only ever touches [`BytePipe`],
//! which gives it a non-blocking receive.

use bytes::Bytes;
use log::trace;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TryRecvError};

use crate::error::ChannelError;

/// Chunks buffered in each direction before the I/O task waits.
const PIPE_DEPTH: usize = 256;

/// Session-side end of the pipe.
#[derive(Debug)]
pub struct BytePipe {
    outgoing: Option<Sender<Bytes>>,
    incoming: Receiver<Bytes>,
    closed: bool,
}

/// Task-side end of the pipe.
#[derive(Debug)]
pub struct PipeEnds {
    /// Bytes the session wants written to the device.
    pub outgoing: Receiver<Bytes>,

    /// Bytes received from the device.
    pub incoming: Sender<Bytes>,
}

/// Create a connected pair.
pub fn pipe() -> (BytePipe, PipeEnds) {
    let (out_tx, out_rx) = mpsc::channel(PIPE_DEPTH);
    let (in_tx, in_rx) = mpsc::channel(PIPE_DEPTH);
    (
        BytePipe {
            outgoing: Some(out_tx),
            incoming: in_rx,
            closed: false,
        },
        PipeEnds {
            outgoing: out_rx,
            incoming: in_tx,
        },
    )
}

impl BytePipe {
    /// Queue bytes for the device.
    pub async fn send(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let sender = match (&self.outgoing, self.closed) {
            (Some(sender), false) => sender,
            _ => return Err(ChannelError::Closed),
        };
        trace!("pipe send: {} bytes", data.len());
        sender
            .send(Bytes::copy_from_slice(data))
            .await
            .map_err(|_| ChannelError::Closed)
    }

    /// Take one received chunk without waiting.
    ///
    /// Returns `Ok(None)` when nothing is pending and `Err(Closed)` once the
    /// I/O task has ended and every buffered chunk has been consumed.
    pub fn try_recv(&mut self) -> Result<Option<Bytes>, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        match self.incoming.try_recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Err(ChannelError::Closed)
            }
        }
    }

    /// Drop the outgoing side so the I/O task shuts the connection down.
    pub fn close(&mut self) {
        self.closed = true;
        self.outgoing = None;
        self.incoming.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_through_task_ends() {
        let (mut pipe, mut ends) = pipe();

        pipe.send(b"show clock\n").await.unwrap();
        assert_eq!(ends.outgoing.recv().await.unwrap(), Bytes::from_static(b"show clock\n"));

        assert_eq!(pipe.try_recv().unwrap(), None);
        ends.incoming.send(Bytes::from_static(b"router#")).await.unwrap();
        assert_eq!(pipe.try_recv().unwrap(), Some(Bytes::from_static(b"router#")));
    }

    #[tokio::test]
    async fn test_task_exit_drains_then_closes() {
        let (mut pipe, ends) = pipe();
        ends.incoming.send(Bytes::from_static(b"tail")).await.unwrap();
        drop(ends);

        assert_eq!(pipe.try_recv().unwrap(), Some(Bytes::from_static(b"tail")));
        assert_eq!(pipe.try_recv(), Err(ChannelError::Closed));
        assert!(pipe.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut pipe, _ends) = pipe();
        pipe.close();
        pipe.close();
        assert_eq!(pipe.send(b"x").await, Err(ChannelError::Closed));
        assert_eq!(pipe.try_recv(), Err(ChannelError::Closed));
    }
}
