//! Domain-specific error types for the EC protocol client.
//!
//! All fallible operations return `Result<T, EcError>`.
//! Malformed wire data is always a typed error, never a panic; a codec
//! error aborts the whole parse instead of yielding a partial result.

use thiserror::Error;

use crate::codes::OpCode;

/// The canonical error type for the EC client.
#[derive(Debug, Error)]
pub enum EcError {
    // ── Codec errors ─────────────────────────────────────────────
    /// A compact-number lead byte fell outside every recognized range,
    /// or its continuation bytes did not match the lead byte's class.
    #[error("malformed compact number: lead byte {0:#04x}")]
    MalformedVarNum(u8),

    /// A value too large for the compact-number encoding was given.
    #[error("value {0:#x} exceeds the compact number range")]
    VarNumRange(u32),

    /// Fewer bytes remain than a declared length requires.
    #[error("truncated tag data: need {needed} more bytes, have {have}")]
    TruncatedTag { needed: usize, have: usize },

    /// The type byte of a tag did not name any known tag type.
    #[error("unknown tag type {0:#04x}")]
    UnknownTagType(u8),

    /// A hash payload was not exactly 16 bytes.
    #[error("invalid hash length: expected 16 bytes, got {0}")]
    InvalidHashLength(usize),

    /// A tag or packet cannot carry this many sibling tags.
    #[error("too many tags for the count field: {0}")]
    TooManyTags(usize),

    /// The packet body violated framing rules.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// The opcode byte did not name any known operation.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    /// The body carried the zlib flag but did not decompress.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// UTF-8 conversion of a string payload failed.
    #[error("invalid utf-8 in string payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Connection errors ────────────────────────────────────────
    /// The TCP connect attempt failed or timed out.
    #[error("could not connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        source: std::io::Error,
    },

    /// The daemon rejected the login handshake.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(&'static str),

    /// The daemon closed the socket mid-message.
    #[error("daemon closed the connection")]
    ConnectionClosed,

    /// A read or write did not complete within the timeout.
    #[error("connection failed: {0}")]
    ConnectionFailed(&'static str),

    /// The TCP/IO layer reported an error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker was driven through an invalid lifecycle transition.
    #[error("invalid worker state: {0}")]
    InvalidState(&'static str),

    // ── Daemon-reported errors ───────────────────────────────────
    /// The daemon answered a well-formed request with the generic
    /// failure opcode. Carries the request's opcode for diagnostics.
    #[error("operation {0} failed: daemon returned the failure opcode")]
    OperationFailed(OpCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = EcError::MalformedVarNum(0xF8);
        assert!(e.to_string().contains("0xf8"));

        let e = EcError::TruncatedTag { needed: 10, have: 4 };
        assert!(e.to_string().contains("10"));
        assert!(e.to_string().contains("4"));

        let e = EcError::InvalidHashLength(9);
        assert!(e.to_string().contains("9"));
    }

    #[test]
    fn operation_failed_names_request_opcode() {
        let e = EcError::OperationFailed(OpCode::PartfileDelete);
        assert!(e.to_string().contains("PartfileDelete"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: EcError = io_err.into();
        assert!(matches!(e, EcError::Io(_)));
    }

    #[test]
    fn from_utf8() {
        let bad = String::from_utf8(vec![0xFF, 0xFE]);
        let e: EcError = bad.unwrap_err().into();
        assert!(matches!(e, EcError::InvalidUtf8(_)));
    }
}
