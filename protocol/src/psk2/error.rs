//! Error type for the PSK2 engine.

use std::time::Duration;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::packet::PacketError;
use crate::plugin::PluginError;

#[derive(Debug, Error)]
pub enum Psk2Error {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("plugin error: {0}")]
    Plugin(PluginError),

    #[error("plugin did not connect within {0:?}")]
    ConnectionTimeout(Duration),

    /// A decrypted chunk or response had an unknown type or the wrong size.
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),

    /// The receiver refused a chunk under the shared secret, so the payment
    /// was abandoned.
    #[error("payment rejected with {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("gave up after {failures} consecutive failures, last: {last}")]
    TooManyFailures { failures: u32, last: String },

    /// The quote chunk came back without a readable amount, or was refused
    /// for a reason other than its size.
    #[error("quote failed: {0}")]
    QuoteFailed(String),

    /// Nothing of the quote reached the receiver, so no rate can be derived.
    #[error("exchange rate is zero")]
    ZeroRate,
}

impl From<PluginError> for Psk2Error {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::ConnectionTimeout(after) => Self::ConnectionTimeout(after),
            other => Self::Plugin(other),
        }
    }
}
