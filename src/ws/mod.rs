//! Minimal RFC 6455 server side: the upgrade handshake and frame codec.
//!
//! Only what the push-only broadcast endpoint needs. Server frames are
//! unmasked; client frames must be masked. Fragmented messages are not
//! reassembled since client data frames are discarded anyway.

mod frame;
mod handshake;

pub use frame::{apply_mask, read_frame, write_frame, Frame, Opcode, MAX_PAYLOAD_SIZE};
pub use handshake::{
    accept, accept_key, bad_request, upgrade_response, validate_upgrade, MAX_HANDSHAKE_BYTES,
    WS_GUID,
};

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum WsError {
    Io(io::Error),
    /// Handshake rejected; the reason was sent to the client in a 400.
    Handshake(&'static str),
    UnknownOpcode(u8),
    PayloadTooLarge(u64),
    Protocol(&'static str),
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WsError::Io(e) => write!(f, "websocket io error: {e}"),
            WsError::Handshake(reason) => write!(f, "handshake rejected: {reason}"),
            WsError::UnknownOpcode(op) => write!(f, "unknown opcode 0x{op:X}"),
            WsError::PayloadTooLarge(len) => {
                write!(f, "payload length {len} exceeds maximum {MAX_PAYLOAD_SIZE}")
            }
            WsError::Protocol(msg) => write!(f, "protocol violation: {msg}"),
        }
    }
}

impl std::error::Error for WsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WsError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for WsError {
    fn from(e: io::Error) -> Self {
        WsError::Io(e)
    }
}
