//! Receiving PSK2 payments.
//!
//! Unlike IPR/PSK, the receiver keeps state: one record per payment id with
//! the amount received so far and whether the payment is finished. The
//! accept/reject decision and the record update happen under the same map
//! entry guard, so two chunks of one payment cannot both slip under the
//! limit. Different payments never contend.
//!
//! Records idle for longer than [`ReceiverOptions::record_ttl`] are swept
//! whenever a new payment arrives, so payments the sender abandons do not
//! pile up.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::clock::{system_clock, SharedClock};
use crate::config::{CONDITION_LENGTH, DEFAULT_CONNECT_TIMEOUT, PSK2_OVERPAYMENT_TOLERANCE_PERCENT, PSK2_RECORD_TTL};
use crate::crypto::{self, hash_condition};
use crate::events::{Dispatcher, IncomingEvent, Protocol};
use crate::packet::{Fulfill, IlpPayment, OerPacket, Prepare, Reject};
use crate::plugin::{safe_connect, DataHandler, Plugin};
use crate::transport::{ErrorCode, Listener};

use super::encoding::{
    fulfillment_for, open_chunk, seal_response, ChunkHeader, ChunkResponse, ChunkType, PaymentId, ResponseType,
};
use super::error::Psk2Error;

/// Bookkeeping for one incoming payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentRecord {
    pub received: u64,
    /// Destination amount the sender asked for; `None` when the source
    /// amount drives the payment.
    pub expected: Option<u64>,
    pub finished: bool,
}

/// A record plus when its payment last saw a chunk.
struct Tracked {
    record: PaymentRecord,
    last_chunk_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ReceiverOptions {
    pub shared_secret: Vec<u8>,
    pub connect_timeout: Duration,
    pub dispatcher: Option<Arc<Dispatcher>>,
    /// Idle time after which a payment record may be evicted.
    pub record_ttl: Duration,
    pub clock: SharedClock,
}

impl ReceiverOptions {
    pub fn new(shared_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            shared_secret: shared_secret.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            dispatcher: None,
            record_ttl: PSK2_RECORD_TTL,
            clock: system_clock(),
        }
    }
}

/// What the receiver makes of one incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Fulfill(Fulfill),
    Reject(Reject),
    /// Not addressed to this receiver.
    Ignore,
}

pub struct Psk2Receiver {
    address: String,
    secret: Vec<u8>,
    connect_timeout: Duration,
    payments: DashMap<PaymentId, Tracked>,
    dispatcher: Option<Arc<Dispatcher>>,
    record_ttl: Duration,
    clock: SharedClock,
}

impl std::fmt::Debug for Psk2Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Psk2Receiver")
            .field("address", &self.address)
            .field("payments", &self.payments.len())
            .finish()
    }
}

/// `received + amount` stays within the tolerance above `expected`.
fn within_tolerance(total: u64, expected: u64) -> bool {
    total as u128 * 100 <= expected as u128 * (100 + PSK2_OVERPAYMENT_TOLERANCE_PERCENT as u128)
}

impl Psk2Receiver {
    pub fn new(address: impl Into<String>, options: ReceiverOptions) -> Result<Self, Psk2Error> {
        crypto::validate_shared_secret(&options.shared_secret)?;
        Ok(Self {
            address: address.into(),
            secret: options.shared_secret,
            connect_timeout: options.connect_timeout,
            payments: DashMap::new(),
            dispatcher: options.dispatcher,
            record_ttl: options.record_ttl,
            clock: options.clock,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Snapshot of a payment's record.
    pub fn payment(&self, payment_id: &PaymentId) -> Option<PaymentRecord> {
        self.payments.get(payment_id).map(|tracked| tracked.record)
    }

    /// Number of payments currently tracked.
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    /// Drop records whose last chunk is older than the record TTL, finished
    /// or not. Returns how many were dropped.
    pub fn evict_stale(&self) -> usize {
        let now = self.clock.now();
        let before = self.payments.len();
        self.payments.retain(|_, tracked| {
            (now - tracked.last_chunk_at)
                .to_std()
                .map_or(true, |idle| idle <= self.record_ttl)
        });
        let evicted = before.saturating_sub(self.payments.len());
        if evicted > 0 {
            debug!(evicted, "evicted stale payment records");
        }
        evicted
    }

    /// Drop one payment's record.
    pub fn forget(&self, payment_id: &PaymentId) -> bool {
        self.payments.remove(payment_id).is_some()
    }

    /// Drop every record, e.g. when the connection closes.
    pub fn clear(&self) {
        self.payments.clear();
    }

    fn reject(&self, code: ErrorCode, message: impl Into<String>) -> Verdict {
        Verdict::Reject(code.reject(self.address.clone(), message))
    }

    /// F99 carrying a sealed amount the sender can read.
    fn reject_with_amount(&self, payment_id: PaymentId, amount: u64, message: &str) -> Verdict {
        let response = ChunkResponse {
            response_type: ResponseType::Error,
            payment_id,
            amount,
        };
        let mut reject = ErrorCode::ApplicationError.reject(self.address.clone(), message);
        match seal_response(&self.secret, &response) {
            Ok(sealed) => reject.data = sealed,
            Err(err) => warn!(error = %err, "failed to seal reject data"),
        }
        Verdict::Reject(reject)
    }

    fn is_ours(&self, account: &str) -> bool {
        account == self.address
            || account
                .strip_prefix(self.address.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Validate one Prepare and update the payment it belongs to.
    pub fn handle_data(&self, data: &[u8]) -> Verdict {
        let prepare = match Prepare::from_oer(data) {
            Ok(prepare) => prepare,
            Err(err) => return self.reject(ErrorCode::BadRequest, format!("invalid prepare: {err}")),
        };
        let (Some(condition), Some(ilp)) = (prepare.execution_condition, prepare.ilp.as_deref()) else {
            return self.reject(ErrorCode::BadRequest, "missing condition or packet");
        };
        let packet = match IlpPayment::from_oer(ilp) {
            Ok(packet) => packet,
            Err(err) => return self.reject(ErrorCode::BadRequest, format!("invalid packet: {err}")),
        };
        if !self.is_ours(&packet.account) {
            debug!(account = %packet.account, "chunk is not for this receiver");
            return Verdict::Ignore;
        }

        let header = match open_chunk(&self.secret, &packet.data) {
            Ok(header) => header,
            Err(err) => {
                debug!(error = %err, "could not open chunk");
                return self.reject(ErrorCode::UnexpectedPayment, "unable to decrypt chunk");
            }
        };
        let fulfillment = match fulfillment_for(&self.secret, &packet.data) {
            Ok(fulfillment) => fulfillment,
            Err(err) => return self.reject(ErrorCode::ApplicationError, err.to_string()),
        };
        if hash_condition(&fulfillment) != condition {
            return self.reject(ErrorCode::WrongCondition, "condition does not match chunk");
        }

        self.accept(&packet.account, header, prepare.amount, fulfillment)
    }

    fn accept(
        &self,
        account: &str,
        header: ChunkHeader,
        amount: u64,
        fulfillment: [u8; CONDITION_LENGTH],
    ) -> Verdict {
        let payment_id = header.payment_id;
        let id = hex::encode(payment_id);
        if header.chunk_type == ChunkType::Quote {
            debug!(payment_id = %id, amount, "answering quote");
            return self.reject_with_amount(payment_id, amount, "quote response");
        }

        let expected = (header.destination_amount > 0).then_some(header.destination_amount);
        if !self.payments.contains_key(&payment_id) {
            self.evict_stale();
        }
        let now = self.clock.now();
        let total = {
            let mut tracked = self.payments.entry(payment_id).or_insert(Tracked {
                record: PaymentRecord {
                    received: 0,
                    expected,
                    finished: false,
                },
                last_chunk_at: now,
            });
            tracked.last_chunk_at = now;
            let record = &mut tracked.record;
            if record.finished {
                let received = record.received;
                drop(tracked);
                debug!(payment_id = %id, "chunk for finished payment");
                return self.reject_with_amount(payment_id, received, "payment already finished");
            }
            let total = record.received.saturating_add(amount);
            if let Some(expected) = record.expected {
                if !within_tolerance(total, expected) {
                    let received = record.received;
                    drop(tracked);
                    debug!(payment_id = %id, total, expected, "chunk would overpay");
                    return self.reject_with_amount(payment_id, received, "payment would exceed expected amount");
                }
            }
            record.received = total;
            if header.chunk_type == ChunkType::LastChunk || record.expected.is_some_and(|e| total >= e) {
                record.finished = true;
            }
            total
        };

        let response = ChunkResponse {
            response_type: ResponseType::Fulfillment,
            payment_id,
            amount: total,
        };
        let data = match seal_response(&self.secret, &response) {
            Ok(sealed) => sealed,
            Err(err) => return self.reject(ErrorCode::ApplicationError, err.to_string()),
        };
        debug!(payment_id = %id, amount, total, "chunk accepted");

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.dispatch(&IncomingEvent {
                protocol: Protocol::Psk2,
                request_id: id,
                destination_account: account.to_string(),
                amount,
                total_received: Some(total),
                data: header.data,
            });
        }
        Verdict::Fulfill(Fulfill { fulfillment, data })
    }

    /// Serialized answer for the plugin, `None` to stay silent.
    pub fn respond(&self, data: &[u8]) -> Option<Vec<u8>> {
        let frame = match self.handle_data(data) {
            Verdict::Fulfill(fulfill) => fulfill.to_oer(),
            Verdict::Reject(reject) => {
                debug!(code = %reject.code, message = %reject.message, "rejecting chunk");
                reject.to_oer()
            }
            Verdict::Ignore => return None,
        };
        match frame {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(error = %err, "failed to serialize response");
                None
            }
        }
    }
}

/// Connect `plugin` and route incoming chunks to `receiver`.
pub async fn listen(plugin: Arc<dyn Plugin>, receiver: Arc<Psk2Receiver>) -> Result<Listener, Psk2Error> {
    safe_connect(plugin.as_ref(), receiver.connect_timeout).await?;
    let address = receiver.address.clone();
    let handler: DataHandler = Arc::new(move |data: Vec<u8>| {
        let receiver = Arc::clone(&receiver);
        async move { receiver.respond(&data) }.boxed()
    });
    plugin.register_data_handler(handler)?;
    info!(%address, "listening for PSK2 payments");
    Ok(Listener::new(plugin))
}
