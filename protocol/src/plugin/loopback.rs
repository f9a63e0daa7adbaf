//! # Loopback Plugin
//!
//! Two [`LoopbackPlugin`]s joined by a simulated connector, all in one
//! process. The connector:
//!
//! - converts Prepare amounts at a fixed rate (`numerator / denominator`,
//!   rounded down),
//! - refuses Prepares above `max_packet_amount` with `F08`, telling the
//!   sender the limit,
//! - answers ILQP quote requests itself,
//! - answers `F02` when the far side has no handler or ignores the frame,
//! - checks fulfillments against the Prepare condition before passing
//!   them back.
//!
//! Nothing here touches the network. Tests and the CLI demo use it to run
//! full sender/receiver flows.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::crypto::verify_fulfillment;
use crate::packet::{
    AmountTooLarge, Frame, LiquidityCurve, OerPacket, Prepare, QuoteByDestinationResponse, QuoteBySourceResponse,
    QuoteLiquidityResponse,
};
use crate::transport::ErrorCode;

use super::{DataHandler, Plugin, PluginError};

/// How the simulated connector behaves.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// ILP address of the connector between the two plugins.
    pub connector_address: String,
    pub rate_numerator: u64,
    pub rate_denominator: u64,
    /// Largest Prepare amount the connector will forward.
    pub max_packet_amount: Option<u64>,
    /// Added to the destination hold duration when quoting.
    pub hold_margin: Duration,
    /// Artificial delay inside `connect`.
    pub connect_delay: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            connector_address: "test.connector".to_string(),
            rate_numerator: 1,
            rate_denominator: 1,
            max_packet_amount: None,
            hold_margin: Duration::from_secs(1),
            connect_delay: Duration::ZERO,
        }
    }
}

/// Curve endpoint used when no packet limit is configured.
const UNBOUNDED_CURVE_LIMIT: u64 = 1_000_000_000_000;

struct Side {
    address: String,
    connected: AtomicBool,
    handler: RwLock<Option<DataHandler>>,
}

impl Side {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            connected: AtomicBool::new(false),
            handler: RwLock::new(None),
        }
    }
}

struct Link {
    config: LoopbackConfig,
    sides: [Side; 2],
    injected_failures: AtomicU32,
    frames_sent: AtomicU64,
    money_sent: AtomicU64,
}

/// One end of an in-process plugin pair.
#[derive(Clone)]
pub struct LoopbackPlugin {
    link: Arc<Link>,
    side: usize,
}

impl std::fmt::Debug for LoopbackPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackPlugin")
            .field("address", &self.own().address)
            .field("connector", &self.link.config.connector_address)
            .finish()
    }
}

impl LoopbackPlugin {
    /// Create two plugins joined by a connector.
    pub fn pair(left: &str, right: &str, config: LoopbackConfig) -> (Arc<Self>, Arc<Self>) {
        let link = Arc::new(Link {
            config,
            sides: [Side::new(left), Side::new(right)],
            injected_failures: AtomicU32::new(0),
            frames_sent: AtomicU64::new(0),
            money_sent: AtomicU64::new(0),
        });
        (
            Arc::new(Self {
                link: Arc::clone(&link),
                side: 0,
            }),
            Arc::new(Self { link, side: 1 }),
        )
    }

    /// Make the connector answer the next `count` Prepares with `T04`.
    pub fn fail_next(&self, count: u32) {
        self.link.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Frames sent through the connector by either side.
    pub fn frames_sent(&self) -> u64 {
        self.link.frames_sent.load(Ordering::SeqCst)
    }

    /// Total settled through `send_money` by either side.
    pub fn money_sent(&self) -> u64 {
        self.link.money_sent.load(Ordering::SeqCst)
    }

    fn own(&self) -> &Side {
        &self.link.sides[self.side]
    }

    fn peer(&self) -> &Side {
        &self.link.sides[1 - self.side]
    }

    fn convert(&self, source: u64) -> u64 {
        let config = &self.link.config;
        let converted = source as u128 * config.rate_numerator as u128
            / config.rate_denominator.max(1) as u128;
        u64::try_from(converted).unwrap_or(u64::MAX)
    }

    fn convert_back(&self, destination: u64) -> u64 {
        let config = &self.link.config;
        let source = (destination as u128 * config.rate_denominator as u128)
            .div_ceil(config.rate_numerator.max(1) as u128);
        u64::try_from(source).unwrap_or(u64::MAX)
    }

    fn source_hold(&self, destination_hold_ms: u32) -> u32 {
        let margin = u32::try_from(self.link.config.hold_margin.as_millis()).unwrap_or(u32::MAX);
        destination_hold_ms.saturating_add(margin)
    }

    fn reject(&self, code: ErrorCode, message: &str) -> Vec<u8> {
        code.reject(self.link.config.connector_address.clone(), message)
            .to_oer()
            .unwrap_or_default()
    }

    fn respond(&self, encoded: Result<Vec<u8>, crate::packet::PacketError>) -> Vec<u8> {
        encoded.unwrap_or_else(|err| self.reject(ErrorCode::BadRequest, &err.to_string()))
    }

    async fn route(&self, data: Vec<u8>) -> Vec<u8> {
        let frame = match Frame::parse(&data) {
            Ok(frame) => frame,
            Err(err) => return self.reject(ErrorCode::BadRequest, &err.to_string()),
        };
        trace!(kind = frame.kind(), from = %self.own().address, "connector received frame");

        match frame {
            Frame::Prepare(prepare) => self.forward_prepare(prepare).await,
            Frame::QuoteBySourceRequest(request) => self.respond(
                QuoteBySourceResponse {
                    destination_amount: self.convert(request.source_amount),
                    source_hold_duration: self.source_hold(request.destination_hold_duration),
                }
                .to_oer(),
            ),
            Frame::QuoteByDestinationRequest(request) => self.respond(
                QuoteByDestinationResponse {
                    source_amount: self.convert_back(request.destination_amount),
                    source_hold_duration: self.source_hold(request.destination_hold_duration),
                }
                .to_oer(),
            ),
            Frame::QuoteLiquidityRequest(request) => {
                let limit = self
                    .link
                    .config
                    .max_packet_amount
                    .unwrap_or(UNBOUNDED_CURVE_LIMIT);
                let prefix = match self.peer().address.rsplit_once('.') {
                    Some((parent, _)) => parent.to_string(),
                    None => self.peer().address.clone(),
                };
                self.respond(
                    QuoteLiquidityResponse {
                        liquidity_curve: LiquidityCurve::new(vec![(0, 0), (limit, self.convert(limit))]),
                        applies_to_prefix: prefix,
                        source_hold_duration: self.source_hold(request.destination_hold_duration),
                        expires_at: Utc::now() + chrono::Duration::seconds(30),
                    }
                    .to_oer(),
                )
            }
            other => self.reject(
                ErrorCode::BadRequest,
                &format!("connector cannot handle {}", other.kind()),
            ),
        }
    }

    async fn forward_prepare(&self, prepare: Prepare) -> Vec<u8> {
        let failed = self
            .link
            .injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return self.reject(ErrorCode::InsufficientLiquidity, "injected failure");
        }
        if let Some(max) = self.link.config.max_packet_amount {
            if prepare.amount > max {
                let mut reject = ErrorCode::AmountTooLarge.reject(
                    self.link.config.connector_address.clone(),
                    format!("amount {} exceeds maximum {max}", prepare.amount),
                );
                reject.data = AmountTooLarge {
                    received: prepare.amount,
                    maximum: max,
                }
                .to_bytes();
                return self.respond(reject.to_oer());
            }
        }

        let peer = self.peer();
        if !peer.connected.load(Ordering::SeqCst) {
            return self.reject(ErrorCode::Unreachable, "peer is not connected");
        }
        let Some(handler) = peer.handler.read().clone() else {
            return self.reject(ErrorCode::Unreachable, "peer has no data handler");
        };

        let condition = prepare.execution_condition;
        let forwarded = Prepare {
            amount: self.convert(prepare.amount),
            ..prepare
        };
        let encoded = match forwarded.to_oer() {
            Ok(encoded) => encoded,
            Err(err) => return self.reject(ErrorCode::BadRequest, &err.to_string()),
        };
        debug!(
            to = %peer.address,
            source_amount = forwarded.amount,
            "connector forwarding prepare"
        );

        let Some(response) = handler(encoded).await else {
            return self.reject(ErrorCode::Unreachable, "no receiver accepted the packet");
        };
        if let (Ok(Frame::Fulfill(fulfill)), Some(condition)) = (Frame::parse(&response), condition) {
            if !verify_fulfillment(&fulfill.fulfillment, &condition) {
                return self.reject(ErrorCode::WrongCondition, "fulfillment does not match condition");
            }
        }
        response
    }
}

#[async_trait]
impl Plugin for LoopbackPlugin {
    async fn connect(&self) -> Result<(), PluginError> {
        let delay = self.link.config.connect_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.own().connected.store(true, Ordering::SeqCst);
        debug!(address = %self.own().address, "loopback plugin connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PluginError> {
        self.own().connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.own().connected.load(Ordering::SeqCst)
    }

    fn address(&self) -> String {
        self.own().address.clone()
    }

    fn connectors(&self) -> Vec<String> {
        vec![self.link.config.connector_address.clone()]
    }

    async fn send_data(&self, data: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        if !self.is_connected() {
            return Err(PluginError::NotConnected);
        }
        self.link.frames_sent.fetch_add(1, Ordering::SeqCst);
        Ok(self.route(data).await)
    }

    async fn send_data_to(&self, connector: &str, data: Vec<u8>) -> Result<Vec<u8>, PluginError> {
        if connector != self.link.config.connector_address {
            return Err(PluginError::Unreachable(connector.to_string()));
        }
        self.send_data(data).await
    }

    async fn send_money(&self, amount: u64) -> Result<(), PluginError> {
        if !self.is_connected() {
            return Err(PluginError::NotConnected);
        }
        self.link.money_sent.fetch_add(amount, Ordering::SeqCst);
        Ok(())
    }

    fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError> {
        let mut slot = self.own().handler.write();
        if slot.is_some() {
            return Err(PluginError::HandlerAlreadyRegistered);
        }
        *slot = Some(handler);
        Ok(())
    }

    fn deregister_data_handler(&self) {
        self.own().handler.write().take();
    }
}
