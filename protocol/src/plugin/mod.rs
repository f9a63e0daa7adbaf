//! # Ledger Plugin Seam
//!
//! Everything in this crate talks to the outside world through one trait.
//! A plugin knows its own ILP address, can connect and disconnect, sends a
//! serialized frame and awaits the serialized answer, and accepts a single
//! data handler for frames arriving from the other side.
//!
//! The crate ships one implementation, [`loopback`], which wires two plugins
//! together through a simulated connector in the same process. Real
//! transports (HTTP, WebSocket, BTP) live outside this crate and only need
//! to implement [`Plugin`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

pub mod loopback;

pub use loopback::{LoopbackConfig, LoopbackPlugin};

/// Handler for incoming frames. Returns the serialized response, or `None`
/// when the frame is not addressed to this handler.
pub type DataHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Option<Vec<u8>>> + Send + Sync>;

/// Errors raised by plugin implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    #[error("plugin is not connected")]
    NotConnected,

    #[error("connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    #[error("a data handler is already registered")]
    HandlerAlreadyRegistered,

    #[error("no route to {0}")]
    Unreachable(String),

    #[error("send failed: {0}")]
    Send(String),
}

/// A ledger plugin.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn connect(&self) -> Result<(), PluginError>;

    async fn disconnect(&self) -> Result<(), PluginError>;

    fn is_connected(&self) -> bool;

    /// This plugin's own ILP address.
    fn address(&self) -> String;

    /// Prefix shared by every account on this plugin's ledger, with a
    /// trailing dot. Defaults to the parent of [`address`](Self::address).
    fn ledger_prefix(&self) -> String {
        let address = self.address();
        match address.rsplit_once('.') {
            Some((parent, _)) => format!("{parent}."),
            None => format!("{address}."),
        }
    }

    /// Connectors reachable from this ledger.
    fn connectors(&self) -> Vec<String> {
        Vec::new()
    }

    /// Send a frame to the default peer and await its response.
    async fn send_data(&self, data: Vec<u8>) -> Result<Vec<u8>, PluginError>;

    /// Send a frame to a specific connector. Plugins with a single peer
    /// route everything through [`send_data`](Self::send_data).
    async fn send_data_to(&self, connector: &str, data: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        debug!(connector, "no per-connector routing, using the default peer");
        self.send_data(data).await
    }

    /// Settle `amount` with the peer.
    async fn send_money(&self, amount: u64) -> Result<(), PluginError>;

    fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError>;

    fn deregister_data_handler(&self);
}

/// Connect `plugin` unless it already is, giving up after `timeout`.
pub async fn safe_connect(plugin: &dyn Plugin, timeout: Duration) -> Result<(), PluginError> {
    if plugin.is_connected() {
        return Ok(());
    }
    debug!(address = %plugin.address(), ?timeout, "connecting plugin");
    match tokio::time::timeout(timeout, plugin.connect()).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::ConnectionTimeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        address: &'static str,
    }

    #[async_trait]
    impl Plugin for Stub {
        async fn connect(&self) -> Result<(), PluginError> {
            std::future::pending().await
        }
        async fn disconnect(&self) -> Result<(), PluginError> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            false
        }
        fn address(&self) -> String {
            self.address.to_string()
        }
        async fn send_data(&self, data: Vec<u8>) -> Result<Vec<u8>, PluginError> {
            Ok(data)
        }
        async fn send_money(&self, _amount: u64) -> Result<(), PluginError> {
            Ok(())
        }
        fn register_data_handler(&self, _handler: DataHandler) -> Result<(), PluginError> {
            Ok(())
        }
        fn deregister_data_handler(&self) {}
    }

    #[test]
    fn default_ledger_prefix_and_connectors() {
        let stub = Stub {
            address: "test.east.alice",
        };
        assert_eq!(stub.ledger_prefix(), "test.east.");
        assert!(stub.connectors().is_empty());
        assert_eq!(Stub { address: "local" }.ledger_prefix(), "local.");
    }

    #[tokio::test(start_paused = true)]
    async fn safe_connect_times_out() {
        let stub = Stub { address: "test.a" };
        let err = safe_connect(&stub, Duration::from_secs(10)).await.unwrap_err();
        assert_eq!(err, PluginError::ConnectionTimeout(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn send_data_to_defaults_to_send_data() {
        let stub = Stub { address: "test.a" };
        assert_eq!(stub.send_data_to("test.c", vec![1, 2]).await.unwrap(), vec![1, 2]);
    }
}
