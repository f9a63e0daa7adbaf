//! Error type for quoting.

use std::time::Duration;

use thiserror::Error;

use crate::packet::PacketError;
use crate::plugin::PluginError;

/// Errors returned by [`quote`](super::quote) and
/// [`quote_by_connector`](super::quote_by_connector).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IlqpError {
    /// Neither or both of source and destination amount were given.
    #[error("exactly one of source amount or destination amount must be given")]
    ExactlyOneAmount,

    #[error("plugin did not connect within {0:?}")]
    ConnectionTimeout(Duration),

    /// Not local, and no connector to ask.
    #[error("no connectors available")]
    NoConnectors,

    /// The connector answered with a reject or with something that is not
    /// the matching quote response.
    #[error("remote quote error: {0}")]
    RemoteQuoteError(String),

    #[error("quote request timed out after {0:?}")]
    QuoteTimeout(Duration),

    #[error("plugin error: {0}")]
    Plugin(PluginError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

impl From<PluginError> for IlqpError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::ConnectionTimeout(after) => Self::ConnectionTimeout(after),
            other => Self::Plugin(other),
        }
    }
}
