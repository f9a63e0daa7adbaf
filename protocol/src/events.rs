//! # Incoming Payment Events
//!
//! Listeners report every accepted payment here. Consumers subscribe either
//! to a whole protocol ("every incoming PSK2 chunk") or to one request
//! within it ("chunks of payment `ab12…`"). Lookups are exact on
//! `(protocol, request id)`; there is no pattern matching on names.
//!
//! Handlers run synchronously on the task that accepted the payment, after
//! the table lock has been released, so a handler may subscribe or
//! unsubscribe without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Which listener produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Transport listener holding a receiver secret.
    Ipr,
    /// Transport listener holding a shared secret.
    Psk,
    Psk2,
}

/// A payment (or PSK2 chunk) that was fulfilled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingEvent {
    pub protocol: Protocol,
    /// Address token for IPR/PSK, hex payment id for PSK2.
    pub request_id: String,
    pub destination_account: String,
    /// Amount of this transfer.
    pub amount: u64,
    /// PSK2 running total for the payment; `None` for IPR/PSK.
    pub total_received: Option<u64>,
    #[serde(with = "crate::packet::payment::base64url_bytes")]
    pub data: Vec<u8>,
}

pub type EventHandler = Arc<dyn Fn(&IncomingEvent) + Send + Sync>;

/// Handle returned by the subscribe calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Key = (Protocol, Option<String>);

#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    table: RwLock<HashMap<Key, Vec<(SubscriptionId, EventHandler)>>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.table.read().len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event of `protocol`.
    pub fn subscribe(&self, protocol: Protocol, handler: EventHandler) -> SubscriptionId {
        self.insert((protocol, None), handler)
    }

    /// Receive only events for one request of `protocol`.
    pub fn subscribe_request(
        &self,
        protocol: Protocol,
        request_id: impl Into<String>,
        handler: EventHandler,
    ) -> SubscriptionId {
        self.insert((protocol, Some(request_id.into())), handler)
    }

    fn insert(&self, key: Key, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.table.write().entry(key).or_default().push((id, handler));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table.write();
        let mut removed = false;
        table.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
            !handlers.is_empty()
        });
        removed
    }

    /// Deliver `event` to protocol-wide and request-specific subscribers.
    /// Returns how many handlers ran.
    pub fn dispatch(&self, event: &IncomingEvent) -> usize {
        let handlers: Vec<EventHandler> = {
            let table = self.table.read();
            let wide = table.get(&(event.protocol, None));
            let specific = table.get(&(event.protocol, Some(event.request_id.clone())));
            wide.into_iter()
                .chain(specific)
                .flatten()
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };
        trace!(
            protocol = ?event.protocol,
            request_id = %event.request_id,
            handlers = handlers.len(),
            "dispatching incoming event"
        );
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}
