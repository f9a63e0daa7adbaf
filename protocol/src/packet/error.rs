//! Error type for the packet codecs.

use thiserror::Error;

/// Errors raised while serializing or parsing OER packets.
///
/// Parsing is total: every malformed input maps to one of these variants,
/// so a receiver can answer garbage with a reject instead of crashing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The buffer ended before a field was complete.
    #[error("unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The envelope carried a type byte we do not know.
    #[error("unknown packet type: {0}")]
    UnknownType(u8),

    /// The envelope carried a known type, but not the one asked for.
    #[error("unexpected packet type: expected {expected}, got {got}")]
    UnexpectedType {
        /// The type the caller asked to parse.
        expected: u8,
        /// The type found on the wire.
        got: u8,
    },

    /// A length prefix was zero-width, wider than 8 bytes, or overflowed.
    #[error("invalid length prefix")]
    InvalidLengthPrefix,

    /// Bytes were left over after the last field.
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),

    /// A string field contained non-ASCII bytes.
    #[error("string field is not ASCII")]
    NonAscii,

    /// A timestamp field was not `YYYYMMDDHHmmssfff`.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// An ILP address was empty or contained an illegal segment.
    #[error("invalid ILP address: {0:?}")]
    InvalidAddress(String),

    /// An amount string was not an unsigned 64-bit decimal integer.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// An execution condition or fulfillment had the wrong length.
    #[error("condition must be 32 bytes, got {0}")]
    InvalidCondition(usize),

    /// A reject code was not three ASCII characters.
    #[error("invalid error code: {0:?}")]
    InvalidErrorCode(String),

    /// An IPR envelope with a version we do not speak.
    #[error("unsupported IPR version: {0}")]
    UnsupportedIprVersion(u8),
}
