use std::io;
use thiserror::Error;

/// Errors surfaced by the transfer engines. Malformed datagrams and transient
/// loss never reach this type; they are absorbed inside the loops.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("network I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("wire format error: {0}")]
    Wire(#[from] citrine_wire::WireError),

    #[error("no response to transfer request after {0} attempts")]
    HandshakeExhausted(u32),
}

pub type Result<T> = std::result::Result<T, TransportError>;
