//! Wire message format for the datagram transports.
//!
//! Every datagram is one message: a fixed three-byte header (kind,
//! response-needed flag, data-needed flag) followed by a NUL-terminated
//! text payload. A connecting client runs the metadata query sequence
//! (version, payload size, name, title, banner, prompt) before issuing
//! commands so it can size its receive buffer and build its prompt.

use crate::error::{ConsrvError, Result};

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: u32 = 3;

/// Oldest client protocol version the server accepts.
pub const MIN_PROTOCOL_VERSION: u32 = 2;

/// Newest client protocol version the server accepts.
pub const MAX_PROTOCOL_VERSION: u32 = PROTOCOL_VERSION;

/// Default payload size and the quantum replies grow by (64 KiB).
pub const PAYLOAD_CHUNK: usize = 64 * 1024;

/// Field separator in the machine-delimited command list.
pub const COMMANDS_DELIMITER: char = '\x1f';

/// Message kinds, one byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Dispatch a command line; reply is human text.
    UserCommand = 1,
    /// Dispatch a command line; reply is a machine status code.
    ControlCommand = 2,
    /// Query the protocol version.
    VersionQuery = 3,
    /// Query the current negotiated payload size.
    PayloadSizeQuery = 4,
    /// Query the server name.
    NameQuery = 5,
    /// Query the session title.
    TitleQuery = 6,
    /// Query the connect banner.
    BannerQuery = 7,
    /// Query the prompt string.
    PromptQuery = 8,
    /// Query the command list, human-readable.
    CommandsHuman = 9,
    /// Query the command list, unit-separator delimited.
    CommandsDelimited = 10,
    /// Final reply of a dispatch or query.
    CommandComplete = 11,
    /// Notifies the peer that the payload size has grown.
    PayloadSizeUpdate = 12,
}

impl MessageKind {
    /// Decode a wire byte into a kind.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::UserCommand),
            2 => Some(Self::ControlCommand),
            3 => Some(Self::VersionQuery),
            4 => Some(Self::PayloadSizeQuery),
            5 => Some(Self::NameQuery),
            6 => Some(Self::TitleQuery),
            7 => Some(Self::BannerQuery),
            8 => Some(Self::PromptQuery),
            9 => Some(Self::CommandsHuman),
            10 => Some(Self::CommandsDelimited),
            11 => Some(Self::CommandComplete),
            12 => Some(Self::PayloadSizeUpdate),
            _ => None,
        }
    }
}

/// Status code returned to a control caller instead of human text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlStatus {
    /// Command resolved, bounds held, handler ran.
    Done = 0,
    /// No registered command matched.
    NotFound = 1,
    /// Argument count outside the registered bounds.
    BadArgCount = 2,
    /// More than one command matched the abbreviation.
    Ambiguous = 3,
}

impl ControlStatus {
    /// Single-digit wire encoding.
    pub fn as_byte(self) -> u8 {
        b'0' + self as u8
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// Whether the sender expects a reply.
    pub response_needed: bool,
    /// Whether the payload carries data the receiver must read.
    pub data_needed: bool,
    /// Text payload, without the terminating NUL.
    pub payload: Vec<u8>,
}

impl Message {
    /// Build a message carrying a text payload.
    pub fn new(kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            kind,
            response_needed: true,
            data_needed: !payload.is_empty(),
            payload,
        }
    }

    /// Build a query message with an empty payload.
    pub fn query(kind: MessageKind) -> Self {
        Self {
            kind,
            response_needed: true,
            data_needed: false,
            payload: Vec::new(),
        }
    }

    /// Payload as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encode into header + payload + NUL.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + self.payload.len() + 1);
        out.push(self.kind as u8);
        out.push(u8::from(self.response_needed));
        out.push(u8::from(self.data_needed));
        out.extend_from_slice(&self.payload);
        out.push(0);
        out
    }

    /// Decode a received datagram.
    ///
    /// Rejects short datagrams, unknown kinds, and a missing NUL terminator.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(ConsrvError::Protocol(format!(
                "datagram too short: {} bytes",
                buf.len()
            )));
        }
        let kind = MessageKind::from_byte(buf[0])
            .ok_or_else(|| ConsrvError::Protocol(format!("unknown message kind {}", buf[0])))?;
        let response_needed = buf[1] != 0;
        let data_needed = buf[2] != 0;
        let body = &buf[3..];
        let nul = body
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ConsrvError::Protocol("missing payload terminator".to_string()))?;
        Ok(Self {
            kind,
            response_needed,
            data_needed,
            payload: body[..nul].to_vec(),
        })
    }
}
