//! # Receiving IPR / PSK Payments
//!
//! [`listen`] connects a plugin and installs a data handler that runs every
//! incoming Prepare through [`PaymentHandler::handle_data`]:
//!
//! ```text
//! parse prepare, condition, packet      ── F00 Bad Request
//! address is ours?                      ── ignored (not answered)
//! open details                          ── F06 Unexpected Payment
//! expiry                                ── R00 Transfer Timed Out
//! amount vs packet amount               ── F04 / F03
//! regenerate condition                  ── F05 Wrong Condition
//! review callback                       ── F99 Application Error
//! ──────────────────────────────────────────────────────────────
//! Fulfill
//! ```
//!
//! Every step returns a typed [`Outcome`]; nothing in the chain propagates
//! an error to the plugin. The review callback only runs for transfers that
//! have passed every protocol check, and its answer must carry the
//! precomputed fulfillment.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::clock::{system_clock, SharedClock};
use crate::config::{CONDITION_LENGTH, DEFAULT_CONNECT_TIMEOUT};
use crate::crypto;
use crate::details::{parse_details, Headers};
use crate::events::{Dispatcher, IncomingEvent, Protocol};
use crate::packet::{Fulfill, IlpPayment, OerPacket, Prepare};
use crate::plugin::{safe_connect, DataHandler, Plugin};

use super::error::{ErrorCode, TransportError};
use super::ipr::EXPIRES_AT_HEADER;
use super::psk::fulfillment_for_packet;
use super::receiver::Receiver;

/// Error type review callbacks may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application callback deciding whether to accept a payment.
pub type ReviewCallback =
    Arc<dyn Fn(IncomingPayment) -> BoxFuture<'static, Result<Fulfilled, BoxError>> + Send + Sync>;

/// Wrap an async closure as a [`ReviewCallback`].
pub fn review_callback<F, Fut>(review: F) -> ReviewCallback
where
    F: Fn(IncomingPayment) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Fulfilled, BoxError>> + Send + 'static,
{
    Arc::new(move |payment: IncomingPayment| review(payment).boxed())
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which secret the listener uses to recognise and open packets.
#[derive(Clone, Debug)]
pub enum ListenSecret {
    /// Derive per-token shared secrets from a receiver secret.
    Receiver(Receiver),
    /// Use one shared secret for every packet under the plugin address.
    Shared(Vec<u8>),
}

#[derive(Clone)]
pub struct ListenOptions {
    pub secret: ListenSecret,
    /// Accept transfers larger than the packet amount.
    pub allow_over_payment: bool,
    pub connect_timeout: Duration,
    pub clock: SharedClock,
    /// Where accepted payments are reported, if anywhere.
    pub dispatcher: Option<Arc<Dispatcher>>,
}

impl ListenOptions {
    pub fn new(secret: ListenSecret) -> Self {
        Self {
            secret,
            allow_over_payment: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            clock: system_clock(),
            dispatcher: None,
        }
    }
}

impl std::fmt::Debug for ListenOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenOptions")
            .field("allow_over_payment", &self.allow_over_payment)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Review callback types
// ---------------------------------------------------------------------------

/// What a review callback returns to accept a payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fulfilled {
    pub fulfillment: [u8; CONDITION_LENGTH],
    /// Response data carried back in the Fulfill frame.
    pub data: Vec<u8>,
}

/// A payment that passed every protocol check, awaiting review.
#[derive(Clone, Debug)]
pub struct IncomingPayment {
    pub transfer: Prepare,
    pub headers: Headers,
    pub public_headers: Headers,
    pub data: Vec<u8>,
    pub destination_account: String,
    pub destination_amount: u64,
    pub fulfillment: [u8; CONDITION_LENGTH],
}

impl IncomingPayment {
    /// Accept the payment.
    pub fn fulfill(&self) -> Fulfilled {
        self.fulfill_with(Vec::new())
    }

    /// Accept the payment and send `data` back to the sender.
    pub fn fulfill_with(&self, data: Vec<u8>) -> Fulfilled {
        Fulfilled {
            fulfillment: self.fulfillment,
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The packet is addressed to someone else.
    NotMyPacket,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectReason {
    pub code: ErrorCode,
    pub message: String,
}

/// Result of running one incoming frame through the validation chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Fulfill(Fulfill),
    Reject(RejectReason),
    Ignore(IgnoreReason),
}

fn reject(code: ErrorCode, message: impl Into<String>) -> Outcome {
    Outcome::Reject(RejectReason {
        code,
        message: message.into(),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "review callback panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// The validation chain for one listener.
pub struct PaymentHandler {
    address: String,
    options: ListenOptions,
    review: ReviewCallback,
}

impl PaymentHandler {
    /// `address` is the plugin's own ILP address.
    pub fn new(address: impl Into<String>, options: ListenOptions, review: ReviewCallback) -> Self {
        Self {
            address: address.into(),
            options,
            review,
        }
    }

    /// Run one incoming frame through the chain.
    pub async fn handle_data(&self, data: &[u8]) -> Outcome {
        let prepare = match Prepare::from_oer(data) {
            Ok(prepare) => prepare,
            Err(err) => return reject(ErrorCode::BadRequest, format!("invalid prepare: {err}")),
        };
        let Some(condition) = prepare.execution_condition else {
            return reject(ErrorCode::BadRequest, "missing execution condition");
        };
        let Some(packet) = prepare.ilp.as_deref() else {
            return reject(ErrorCode::BadRequest, "missing ILP packet");
        };
        let payment = match IlpPayment::from_oer(packet) {
            Ok(payment) => payment,
            Err(err) => return reject(ErrorCode::BadRequest, format!("invalid ILP packet: {err}")),
        };

        let (token, shared_secret) = match self.recognise(&payment.account) {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!(account = %payment.account, "ignoring packet for another receiver");
                return Outcome::Ignore(IgnoreReason::NotMyPacket);
            }
            Err(err) => return reject(ErrorCode::UnexpectedPayment, err.to_string()),
        };

        let details = match parse_details(&payment.data, Some(&shared_secret)) {
            Ok(details) => details,
            Err(err) => return reject(ErrorCode::UnexpectedPayment, err.to_string()),
        };

        let now = self.options.clock.now();
        if prepare.expires_at < now {
            return reject(ErrorCode::TransferTimedOut, "transfer has already expired");
        }
        if let Some(text) = details.headers.get(EXPIRES_AT_HEADER) {
            match DateTime::parse_from_rfc3339(text) {
                Ok(expires_at) if expires_at.with_timezone(&Utc) < now => {
                    return reject(ErrorCode::TransferTimedOut, "payment request has expired");
                }
                Ok(_) => {}
                Err(_) => {
                    return reject(
                        ErrorCode::UnexpectedPayment,
                        format!("invalid {EXPIRES_AT_HEADER} header: {text:?}"),
                    )
                }
            }
        }

        if prepare.amount < payment.amount {
            return reject(
                ErrorCode::InsufficientDestinationAmount,
                format!("got {}, expected at least {}", prepare.amount, payment.amount),
            );
        }
        if prepare.amount > payment.amount && !self.options.allow_over_payment {
            return reject(
                ErrorCode::InvalidAmount,
                format!("got {}, expected exactly {}", prepare.amount, payment.amount),
            );
        }

        let fulfillment = match fulfillment_for_packet(&shared_secret, packet) {
            Ok(fulfillment) => fulfillment,
            Err(err) => return reject(ErrorCode::UnexpectedPayment, err.to_string()),
        };
        if !crypto::verify_fulfillment(&fulfillment, &condition) {
            return reject(
                ErrorCode::WrongCondition,
                "condition does not match the packet",
            );
        }

        let incoming = IncomingPayment {
            transfer: prepare.clone(),
            headers: details.headers,
            public_headers: details.public_headers,
            data: details.data,
            destination_account: payment.account.clone(),
            destination_amount: payment.amount,
            fulfillment,
        };
        let review = Arc::clone(&self.review);
        let reviewed = AssertUnwindSafe(async move { review(incoming).await })
            .catch_unwind()
            .await;
        let fulfilled = match reviewed {
            Ok(Ok(fulfilled)) => fulfilled,
            Ok(Err(err)) => return reject(ErrorCode::ApplicationError, err.to_string()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(%message, "review callback panicked");
                return reject(ErrorCode::ApplicationError, message);
            }
        };
        if fulfilled.fulfillment != fulfillment {
            return reject(
                ErrorCode::ApplicationError,
                "review callback returned the wrong fulfillment",
            );
        }

        info!(
            account = %payment.account,
            amount = prepare.amount,
            "fulfilling payment"
        );
        if let Some(dispatcher) = &self.options.dispatcher {
            let protocol = match self.options.secret {
                ListenSecret::Receiver(_) => Protocol::Ipr,
                ListenSecret::Shared(_) => Protocol::Psk,
            };
            dispatcher.dispatch(&IncomingEvent {
                protocol,
                request_id: token,
                destination_account: payment.account,
                amount: prepare.amount,
                total_received: None,
                data: fulfilled.data.clone(),
            });
        }
        Outcome::Fulfill(Fulfill {
            fulfillment,
            data: fulfilled.data,
        })
    }

    /// Find the token and shared secret for `account`, or `None` if the
    /// account is not ours.
    fn recognise(&self, account: &str) -> Result<Option<(String, Vec<u8>)>, TransportError> {
        let Some(rest) = account
            .strip_prefix(self.address.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
        else {
            return Ok(None);
        };
        let local = rest.split('.').next().unwrap_or_default();
        match &self.options.secret {
            ListenSecret::Receiver(receiver) => match receiver.match_local_part(local)? {
                Some(token) => Ok(Some((
                    token.to_string(),
                    receiver.shared_secret_for_token(token)?.to_vec(),
                ))),
                None => Ok(None),
            },
            ListenSecret::Shared(secret) => Ok(Some((local.to_string(), secret.clone()))),
        }
    }

    /// Turn an outcome into the bytes the plugin sends back.
    pub async fn respond(&self, data: &[u8]) -> Option<Vec<u8>> {
        match self.handle_data(data).await {
            Outcome::Fulfill(fulfill) => match fulfill.to_oer() {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(error = %err, "failed to serialize fulfill");
                    None
                }
            },
            Outcome::Reject(reason) => {
                debug!(code = reason.code.code(), message = %reason.message, "rejecting transfer");
                reason
                    .code
                    .reject(self.address.clone(), reason.message)
                    .to_oer()
                    .ok()
            }
            Outcome::Ignore(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

/// A registered data handler. [`stop`](Self::stop) deregisters it; in-flight
/// payments finish normally.
pub struct Listener {
    plugin: Arc<dyn Plugin>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("address", &self.plugin.address())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Listener {
    pub(crate) fn new(plugin: Arc<dyn Plugin>) -> Self {
        Self {
            plugin,
            stopped: AtomicBool::new(false),
        }
    }

    /// Deregister the handler. Calling it again does nothing.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.plugin.deregister_data_handler();
            debug!(address = %self.plugin.address(), "listener stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Connect `plugin` and start accepting IPR/PSK payments.
pub async fn listen(
    plugin: Arc<dyn Plugin>,
    options: ListenOptions,
    review: ReviewCallback,
) -> Result<Listener, TransportError> {
    safe_connect(plugin.as_ref(), options.connect_timeout).await?;

    let handler = Arc::new(PaymentHandler::new(plugin.address(), options, review));
    let data_handler: DataHandler = Arc::new(move |data: Vec<u8>| {
        let handler = Arc::clone(&handler);
        async move { handler.respond(&data).await }.boxed()
    });
    plugin.register_data_handler(data_handler)?;
    info!(address = %plugin.address(), "listening for payments");
    Ok(Listener::new(plugin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::ipr::{self, IprPacketParams};
    use chrono::TimeZone;

    const SECRET: [u8; 32] = [0x42; 32];

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn accept_all() -> ReviewCallback {
        review_callback(|payment| async move { Ok::<_, BoxError>(payment.fulfill()) })
    }

    fn handler(clock: &ManualClock, allow_over_payment: bool, review: ReviewCallback) -> PaymentHandler {
        let mut options = ListenOptions::new(ListenSecret::Receiver(Receiver::new(&SECRET).unwrap()));
        options.clock = Arc::new(clock.clone());
        options.allow_over_payment = allow_over_payment;
        PaymentHandler::new("test.example.alice", options, review)
    }

    fn request(amount: u64) -> crate::transport::PacketAndCondition {
        ipr::create_packet_and_condition(&IprPacketParams {
            receiver_secret: SECRET.to_vec(),
            destination_account: "test.example.alice".to_string(),
            destination_amount: amount,
            expires_at: Some(start() + chrono::Duration::seconds(10)),
            ..IprPacketParams::default()
        })
        .unwrap()
    }

    fn prepare(amount: u64, condition: Option<[u8; 32]>, ilp: Option<Vec<u8>>) -> Vec<u8> {
        Prepare {
            amount,
            expires_at: start() + chrono::Duration::seconds(30),
            execution_condition: condition,
            ilp,
        }
        .to_oer()
        .unwrap()
    }

    fn code(outcome: Outcome) -> &'static str {
        match outcome {
            Outcome::Reject(reason) => reason.code.code(),
            Outcome::Fulfill(_) => "fulfill",
            Outcome::Ignore(_) => "ignore",
        }
    }

    #[tokio::test]
    async fn happy_path_fulfillment_matches_independent_derivation() {
        let clock = ManualClock::new(start());
        let handler = handler(&clock, false, accept_all());
        let created = request(1);

        let outcome = handler
            .handle_data(&prepare(1, Some(created.condition), Some(created.packet.clone())))
            .await;
        let Outcome::Fulfill(fulfill) = outcome else {
            panic!("expected fulfill, got {outcome:?}");
        };

        let payment = IlpPayment::from_oer(&created.packet).unwrap();
        let local = payment.account.strip_prefix("test.example.alice.").unwrap();
        let receiver = Receiver::new(&SECRET).unwrap();
        let token = receiver.match_local_part(local).unwrap().unwrap();
        let shared = receiver.shared_secret_for_token(token).unwrap();
        let expected = fulfillment_for_packet(&shared, &created.packet).unwrap();
        assert_eq!(fulfill.fulfillment, expected);
    }

    #[tokio::test]
    async fn structural_rejections() {
        let clock = ManualClock::new(start());
        let handler = handler(&clock, false, accept_all());
        let created = request(1);

        assert_eq!(code(handler.handle_data(b"garbage").await), "F00");
        assert_eq!(
            code(handler.handle_data(&prepare(1, None, Some(created.packet.clone()))).await),
            "F00"
        );
        assert_eq!(
            code(handler.handle_data(&prepare(1, Some(created.condition), None)).await),
            "F00"
        );
        assert_eq!(
            code(handler.handle_data(&prepare(1, Some(created.condition), Some(vec![1, 0]))).await),
            "F00"
        );
    }

    #[tokio::test]
    async fn foreign_packets_are_ignored() {
        let clock = ManualClock::new(start());
        let handler = handler(&clock, false, accept_all());
        let other = ipr::create_packet_and_condition(&IprPacketParams {
            receiver_secret: vec![1u8; 32],
            destination_account: "test.example.alice".to_string(),
            destination_amount: 1,
            expires_at: Some(start() + chrono::Duration::seconds(10)),
            ..IprPacketParams::default()
        })
        .unwrap();
        let outcome = handler
            .handle_data(&prepare(1, Some(other.condition), Some(other.packet)))
            .await;
        assert_eq!(outcome, Outcome::Ignore(IgnoreReason::NotMyPacket));

        let elsewhere = ipr::create_packet_and_condition(&IprPacketParams {
            receiver_secret: SECRET.to_vec(),
            destination_account: "test.example.bob".to_string(),
            destination_amount: 1,
            ..IprPacketParams::default()
        })
        .unwrap();
        let outcome = handler
            .handle_data(&prepare(1, Some(elsewhere.condition), Some(elsewhere.packet)))
            .await;
        assert_eq!(outcome, Outcome::Ignore(IgnoreReason::NotMyPacket));
    }

    #[tokio::test]
    async fn over_payment_policy() {
        let clock = ManualClock::new(start());
        let created = request(10);
        let frame = prepare(11, Some(created.condition), Some(created.packet.clone()));

        let strict = handler(&clock, false, accept_all());
        assert_eq!(code(strict.handle_data(&frame).await), "F03");

        let lenient = handler(&clock, true, accept_all());
        assert_eq!(code(lenient.handle_data(&frame).await), "fulfill");

        let short = prepare(9, Some(created.condition), Some(created.packet));
        assert_eq!(code(strict.handle_data(&short).await), "F04");
    }

    #[tokio::test]
    async fn expiry_beats_amount_checks() {
        let clock = ManualClock::new(start());
        let handler = handler(&clock, false, accept_all());
        let created = request(10);
        clock.advance(chrono::Duration::seconds(11));

        for amount in [9, 10, 11] {
            let frame = prepare(amount, Some(created.condition), Some(created.packet.clone()));
            assert_eq!(code(handler.handle_data(&frame).await), "R00");
        }
    }

    #[tokio::test]
    async fn wrong_condition() {
        let clock = ManualClock::new(start());
        let handler = handler(&clock, false, accept_all());
        let created = request(1);
        let frame = prepare(1, Some([0u8; 32]), Some(created.packet));
        assert_eq!(code(handler.handle_data(&frame).await), "F05");
    }

    #[tokio::test]
    async fn review_failures_become_application_errors() {
        let clock = ManualClock::new(start());
        let created = request(1);
        let frame = prepare(1, Some(created.condition), Some(created.packet));

        let refusing = review_callback(|_| async move { Err::<Fulfilled, BoxError>("not today".into()) });
        match handler(&clock, false, refusing).handle_data(&frame).await {
            Outcome::Reject(reason) => {
                assert_eq!(reason.code, ErrorCode::ApplicationError);
                assert_eq!(reason.message, "not today");
            }
            other => panic!("unexpected {other:?}"),
        }

        let panicking = review_callback(|payment| async move {
            if payment.destination_amount > 0 {
                panic!("boom");
            }
            Ok::<_, BoxError>(payment.fulfill())
        });
        match handler(&clock, false, panicking).handle_data(&frame).await {
            Outcome::Reject(reason) => {
                assert_eq!(reason.code, ErrorCode::ApplicationError);
                assert_eq!(reason.message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }

        let lying = review_callback(|payment| async move {
            let mut fulfilled = payment.fulfill();
            fulfilled.fulfillment[0] ^= 1;
            Ok::<_, BoxError>(fulfilled)
        });
        assert_eq!(
            code(handler(&clock, false, lying).handle_data(&frame).await),
            "F99"
        );
    }

    #[tokio::test]
    async fn shared_secret_listener_and_events() {
        let clock = ManualClock::new(start());
        let dispatcher = Arc::new(Dispatcher::new());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            dispatcher.subscribe(
                Protocol::Psk,
                Arc::new(move |event: &IncomingEvent| seen.lock().push(event.clone())),
            );
        }
        let mut options = ListenOptions::new(ListenSecret::Shared(vec![9u8; 32]));
        options.clock = Arc::new(clock.clone());
        options.dispatcher = Some(dispatcher);
        let handler = PaymentHandler::new(
            "test.bob",
            options,
            review_callback(|payment| async move {
                Ok::<_, BoxError>(payment.fulfill_with(b"receipt".to_vec()))
            }),
        );

        let created = crate::transport::psk::create_packet_and_condition(
            &crate::transport::PskPacketParams {
                shared_secret: vec![9u8; 32],
                destination_account: "test.bob.invoice7".to_string(),
                destination_amount: 3,
                ..Default::default()
            },
        )
        .unwrap();
        let Outcome::Fulfill(fulfill) = handler
            .handle_data(&prepare(3, Some(created.condition), Some(created.packet)))
            .await
        else {
            panic!("expected fulfill");
        };
        assert_eq!(fulfill.data, b"receipt");

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, "invoice7");
        assert_eq!(events[0].amount, 3);
    }

    #[tokio::test]
    async fn undecryptable_details_are_unexpected_payment() {
        let clock = ManualClock::new(start());
        let mut options = ListenOptions::new(ListenSecret::Shared(vec![9u8; 32]));
        options.clock = Arc::new(clock.clone());
        let handler = PaymentHandler::new("test.bob", options, accept_all());

        let created = crate::transport::psk::create_packet_and_condition(
            &crate::transport::PskPacketParams {
                shared_secret: vec![8u8; 32],
                destination_account: "test.bob.x".to_string(),
                destination_amount: 3,
                ..Default::default()
            },
        )
        .unwrap();
        let frame = prepare(3, Some(created.condition), Some(created.packet));
        assert_eq!(code(handler.handle_data(&frame).await), "F06");
    }
}
