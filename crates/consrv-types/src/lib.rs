//! Foundation types for consrv.
//!
//! Everything the other crates share: the error enum, the wire message
//! format spoken on the datagram transports, and server configuration.

pub mod config;
pub mod error;
pub mod message;

pub use config::{ServerConfig, Transport};
pub use error::{ConsrvError, Result};
pub use message::{
    ControlStatus, Message, MessageKind, MAX_PROTOCOL_VERSION, MIN_PROTOCOL_VERSION,
    PAYLOAD_CHUNK, PROTOCOL_VERSION,
};
