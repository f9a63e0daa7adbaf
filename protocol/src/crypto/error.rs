//! Error type for the cryptographic primitives.

use thiserror::Error;

use crate::config::{MAX_SECRET_LENGTH, MIN_SECRET_LENGTH, RECEIVER_SECRET_LENGTH};

/// Errors raised by key derivation, hashing helpers and AEAD.
///
/// Decryption failures are deliberately uninformative: a wrong key, a
/// flipped ciphertext bit and a forged tag all look the same from outside.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A key could not be constructed from the supplied bytes.
    #[error("invalid key length")]
    InvalidKeyLength,

    /// Shared secrets must be between 16 and 32 bytes.
    #[error("shared secret must be {MIN_SECRET_LENGTH}..={MAX_SECRET_LENGTH} bytes, got {0}")]
    InvalidSecretLength(usize),

    /// Receiver secrets must be exactly 32 bytes.
    #[error("receiver secret must be {RECEIVER_SECRET_LENGTH} bytes, got {0}")]
    InvalidReceiverSecretLength(usize),

    /// Encryption failed (only possible for absurdly large inputs).
    #[error("encryption failed")]
    EncryptionFailed,

    /// Authentication tag mismatch, wrong key or truncated ciphertext.
    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptionFailed,

    /// A condition or fulfillment URI could not be parsed.
    #[error("malformed crypto-condition uri: {0}")]
    MalformedUri(String),
}
