//! Failure modes for the wire codec. Neither variant is fatal to the server:
//! a `ShortFrame` means "wait for more bytes", a `MalformedFrame` means
//! "close the stream" (TCP) or "drop the datagram" (UDP).

use std::fmt;

/// The two ways a frame can fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Not enough bytes have arrived yet to parse a complete frame.
    ShortFrame,
    /// The bytes that arrived do not form a valid frame (length mismatch,
    /// unknown message type, payload that fails to deserialize).
    MalformedFrame,
}

/// A codec failure, carrying a short human-readable reason for logging.
#[derive(Debug, Clone)]
pub struct CodecError {
    pub kind: ErrorKind,
    pub reason: &'static str,
}

impl CodecError {
    pub fn short(reason: &'static str) -> Self {
        CodecError { kind: ErrorKind::ShortFrame, reason }
    }

    pub fn malformed(reason: &'static str) -> Self {
        CodecError { kind: ErrorKind::MalformedFrame, reason }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.reason)
    }
}

impl std::error::Error for CodecError {}
