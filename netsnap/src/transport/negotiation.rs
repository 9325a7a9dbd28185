//! Telnet option negotiation (RFC 854/855) for the client side.
//!
//! The codec splits the raw TCP stream into payload bytes and negotiation
//! replies. State is kept across calls because a command sequence can be
//! split over two reads.

use bytes::{BufMut, Bytes, BytesMut};
use log::trace;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;
const OPT_NAWS: u8 = 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    /// Previous byte was IAC.
    Command,
    /// Waiting for the option byte of WILL/WONT/DO/DONT.
    Option(u8),
    /// Inside a subnegotiation.
    Sub,
    /// IAC seen inside a subnegotiation.
    SubCommand,
    /// Previous payload byte was CR; a following NUL is dropped.
    CarriageReturn,
}

/// Output of one [`TelnetCodec::decode`] call.
#[derive(Debug, Default)]
pub struct Decoded {
    /// Payload bytes for the session.
    pub data: Bytes,

    /// Negotiation bytes to write back to the server.
    pub replies: Bytes,
}

/// Client-side telnet codec.
///
/// Accepts the server's ECHO and SGA, offers SGA, answers NAWS with a fixed
/// window size and refuses everything else. Each option is answered at most
/// once per direction so a chatty server cannot start a negotiation loop.
#[derive(Debug)]
pub struct TelnetCodec {
    state: State,
    width: u16,
    height: u16,
    /// Options we already answered a WILL/WONT for.
    remote_answered: [bool; 256],
    /// Options we already answered a DO/DONT for.
    local_answered: [bool; 256],
}

impl TelnetCodec {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            state: State::Data,
            width,
            height,
            remote_answered: [false; 256],
            local_answered: [false; 256],
        }
    }

    /// Split raw input into payload and replies.
    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        let mut data = BytesMut::with_capacity(input.len());
        let mut replies = BytesMut::new();

        for &byte in input {
            self.state = match self.state {
                State::Data | State::CarriageReturn => {
                    if byte == IAC {
                        State::Command
                    } else if byte == 0 && self.state == State::CarriageReturn {
                        State::Data
                    } else {
                        data.put_u8(byte);
                        if byte == b'\r' {
                            State::CarriageReturn
                        } else {
                            State::Data
                        }
                    }
                }
                State::Command => match byte {
                    IAC => {
                        data.put_u8(IAC);
                        State::Data
                    }
                    WILL | WONT | DO | DONT => State::Option(byte),
                    SB => State::Sub,
                    // NOP, GA, DM and friends carry no payload.
                    _ => State::Data,
                },
                State::Option(verb) => {
                    self.negotiate(verb, byte, &mut replies);
                    State::Data
                }
                State::Sub => {
                    if byte == IAC {
                        State::SubCommand
                    } else {
                        State::Sub
                    }
                }
                State::SubCommand => {
                    if byte == SE {
                        State::Data
                    } else {
                        State::Sub
                    }
                }
            };
        }

        Decoded {
            data: data.freeze(),
            replies: replies.freeze(),
        }
    }

    fn negotiate(&mut self, verb: u8, option: u8, replies: &mut BytesMut) {
        let slot = option as usize;
        match verb {
            WILL => {
                if self.remote_answered[slot] {
                    return;
                }
                self.remote_answered[slot] = true;
                let answer = if matches!(option, OPT_ECHO | OPT_SGA) { DO } else { DONT };
                trace!("telnet: WILL {} -> {}", option, answer);
                replies.put_slice(&[IAC, answer, option]);
            }
            WONT => {
                if !self.remote_answered[slot] {
                    self.remote_answered[slot] = true;
                    replies.put_slice(&[IAC, DONT, option]);
                }
            }
            DO => {
                if self.local_answered[slot] {
                    return;
                }
                self.local_answered[slot] = true;
                match option {
                    OPT_SGA => replies.put_slice(&[IAC, WILL, OPT_SGA]),
                    OPT_NAWS => {
                        replies.put_slice(&[IAC, WILL, OPT_NAWS]);
                        self.put_window_size(replies);
                    }
                    _ => replies.put_slice(&[IAC, WONT, option]),
                }
                trace!("telnet: DO {}", option);
            }
            DONT => {
                if !self.local_answered[slot] {
                    self.local_answered[slot] = true;
                    replies.put_slice(&[IAC, WONT, option]);
                }
            }
            _ => {}
        }
    }

    fn put_window_size(&self, replies: &mut BytesMut) {
        replies.put_slice(&[IAC, SB, OPT_NAWS]);
        for byte in self.width.to_be_bytes().into_iter().chain(self.height.to_be_bytes()) {
            replies.put_u8(byte);
            if byte == IAC {
                replies.put_u8(IAC);
            }
        }
        replies.put_slice(&[IAC, SE]);
    }

    /// Escape outgoing payload: a literal 0xFF is sent as IAC IAC.
    pub fn encode(data: &[u8]) -> Bytes {
        if !data.contains(&IAC) {
            return Bytes::copy_from_slice(data);
        }
        let mut out = BytesMut::with_capacity(data.len() + 4);
        for &byte in data {
            out.put_u8(byte);
            if byte == IAC {
                out.put_u8(IAC);
            }
        }
        out.freeze()
    }
}
