//! Sending PSK2 payments.
//!
//! A payment is a strictly sequential series of chunks. Each chunk is a
//! Prepare whose ILP packet carries the sealed chunk header and whose
//! condition is derived from those sealed bytes. The receiver answers with
//! a sealed running total, which keeps the sender's rate estimate honest.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_CHUNK_EXPIRY, DEFAULT_CONNECT_TIMEOUT, PAYMENT_ID_LENGTH, PSK2_MAX_CONSECUTIVE_FAILURES,
    PSK2_STARTING_AMOUNT,
};
use crate::crypto::{self, hash_condition};
use crate::packet::{Frame, IlpPayment, OerPacket, Prepare, Reject};
use crate::plugin::{safe_connect, Plugin};
use crate::transport::ErrorCode;

use super::encoding::{
    fulfillment_for, open_response, seal_chunk, ChunkHeader, ChunkType, PaymentId, ResponseType,
};
use super::error::Psk2Error;
use super::state::{ChunkState, Target};

/// How to reach the receiver and how hard to try.
#[derive(Clone)]
pub struct PaymentOptions {
    pub destination_account: String,
    pub shared_secret: Vec<u8>,
    /// Defaults to a random id per payment.
    pub payment_id: Option<PaymentId>,
    pub chunk_expiry: Duration,
    pub max_consecutive_failures: u32,
    pub connect_timeout: Duration,
}

impl PaymentOptions {
    pub fn new(destination_account: impl Into<String>, shared_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            destination_account: destination_account.into(),
            shared_secret: shared_secret.into(),
            payment_id: None,
            chunk_expiry: DEFAULT_CHUNK_EXPIRY,
            max_consecutive_failures: PSK2_MAX_CONSECUTIVE_FAILURES,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for PaymentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentOptions")
            .field("destination_account", &self.destination_account)
            .field("shared_secret", &"<redacted>")
            .field("payment_id", &self.payment_id.map(hex::encode))
            .field("chunk_expiry", &self.chunk_expiry)
            .field("max_consecutive_failures", &self.max_consecutive_failures)
            .finish()
    }
}

/// Summary of a completed payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// Hex-encoded payment id.
    pub payment_id: String,
    pub source_amount: u64,
    pub destination_amount: u64,
    pub chunks: u32,
}

/// How one chunk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkResult {
    /// `delivered_total` is `None` when the receiver's response was unreadable.
    Fulfilled { delivered_total: Option<u64> },
    /// `amount` is the sealed amount from the receiver, if it sent one.
    Rejected { reject: Reject, amount: Option<u64> },
}

fn read_response(secret: &[u8], data: &[u8], payment_id: &PaymentId, expected: ResponseType) -> Option<u64> {
    match open_response(secret, data) {
        Ok(response) if response.response_type == expected && &response.payment_id == payment_id => {
            Some(response.amount)
        }
        Ok(response) => {
            warn!(
                response_type = ?response.response_type,
                payment_id = %hex::encode(response.payment_id),
                "response does not match chunk"
            );
            None
        }
        Err(err) => {
            if !data.is_empty() {
                warn!(error = %err, "could not open receiver response");
            }
            None
        }
    }
}

/// Send one chunk and wait for its resolution.
pub async fn send_single_chunk(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    header: &ChunkHeader,
    source_amount: u64,
) -> Result<ChunkResult, Psk2Error> {
    let sealed = seal_chunk(&options.shared_secret, header)?;
    let fulfillment = fulfillment_for(&options.shared_secret, &sealed)?;
    let ilp = IlpPayment {
        account: options.destination_account.clone(),
        amount: header.destination_amount,
        data: sealed,
    }
    .to_oer()?;
    let expiry = chrono::Duration::from_std(options.chunk_expiry).unwrap_or_else(|_| chrono::Duration::zero());
    let prepare = Prepare {
        amount: source_amount,
        expires_at: Utc::now() + expiry,
        execution_condition: Some(hash_condition(&fulfillment)),
        ilp: Some(ilp),
    };

    debug!(
        payment_id = %hex::encode(header.payment_id),
        chunk_type = ?header.chunk_type,
        source_amount,
        "sending chunk"
    );
    let response = plugin.send_data(prepare.to_oer()?).await?;
    match Frame::parse(&response)? {
        Frame::Fulfill(fulfill) => {
            if fulfill.fulfillment != fulfillment {
                return Err(Psk2Error::MalformedChunk("fulfillment does not match chunk".to_string()));
            }
            let delivered_total = read_response(
                &options.shared_secret,
                &fulfill.data,
                &header.payment_id,
                ResponseType::Fulfillment,
            );
            Ok(ChunkResult::Fulfilled { delivered_total })
        }
        Frame::Reject(reject) => {
            let amount = read_response(&options.shared_secret, &reject.data, &header.payment_id, ResponseType::Error);
            Ok(ChunkResult::Rejected { reject, amount })
        }
        other => Err(Psk2Error::MalformedChunk(format!("unexpected {} in response to chunk", other.kind()))),
    }
}

fn payment_id_for(options: &PaymentOptions) -> PaymentId {
    options
        .payment_id
        .unwrap_or_else(|| crypto::random_bytes::<PAYMENT_ID_LENGTH>())
}

/// The rate a quote chunk measured, after any shrinking the path forced on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RateSample {
    source_amount: u64,
    destination_amount: u64,
    /// Packet limit reported by an `F08` on the way, in source units.
    max_packet_amount: Option<u64>,
}

impl RateSample {
    /// Destination amount for `source_amount` at the measured rate, rounded down.
    fn delivered_for(&self, source_amount: u64) -> u64 {
        if source_amount == self.source_amount {
            return self.destination_amount;
        }
        let scaled = source_amount as u128 * self.destination_amount as u128 / self.source_amount.max(1) as u128;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

/// Send quote chunks until one reaches the receiver. `F08` shrinks the
/// quote to the reported limit, or halves it when the reject carries none.
async fn sample_rate(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    source_amount: u64,
) -> Result<RateSample, Psk2Error> {
    safe_connect(plugin, options.connect_timeout).await?;
    let header = ChunkHeader {
        chunk_type: ChunkType::Quote,
        payment_id: payment_id_for(options),
        destination_amount: 0,
        data: Vec::new(),
    };
    let mut amount = source_amount;
    let mut max_packet_amount: Option<u64> = None;
    let mut failures = 0;

    loop {
        let reject = match send_single_chunk(plugin, options, &header, amount).await? {
            ChunkResult::Rejected {
                amount: Some(delivered),
                ..
            } => {
                debug!(source_amount = amount, destination_amount = delivered, "quote answered");
                return Ok(RateSample {
                    source_amount: amount,
                    destination_amount: delivered,
                    max_packet_amount,
                });
            }
            ChunkResult::Rejected { reject, amount: None } => reject,
            ChunkResult::Fulfilled { .. } => {
                return Err(Psk2Error::QuoteFailed("quote chunk was fulfilled".to_string()))
            }
        };

        let failure = format!("{}: {}", reject.code, reject.message);
        if reject.code != ErrorCode::AmountTooLarge.code() || amount <= 1 {
            return Err(Psk2Error::QuoteFailed(failure));
        }
        failures += 1;
        if failures >= options.max_consecutive_failures {
            return Err(Psk2Error::TooManyFailures { failures, last: failure });
        }
        let smaller = match reject.amount_too_large().and_then(|limit| limit.max_source_amount(amount)) {
            Some(max) => {
                max_packet_amount = Some(max_packet_amount.map_or(max, |known| known.min(max)));
                max
            }
            None => amount / 2,
        };
        amount = smaller.clamp(1, amount - 1);
        debug!(amount, "quote too large, retrying smaller");
    }
}

/// How much arrives at the receiver when `source_amount` is sent.
///
/// When the path refuses a packet that large, the answer is scaled from a
/// smaller quote.
pub async fn quote_source_amount(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    source_amount: u64,
) -> Result<u64, Psk2Error> {
    let sample = sample_rate(plugin, options, source_amount).await?;
    Ok(sample.delivered_for(source_amount))
}

fn source_for(destination_amount: u64, quoted_source: u64, quoted_destination: u64) -> Result<u64, Psk2Error> {
    if quoted_destination == 0 {
        return Err(Psk2Error::ZeroRate);
    }
    let source = (destination_amount as u128 * quoted_source as u128).div_ceil(quoted_destination as u128);
    Ok(u64::try_from(source).unwrap_or(u64::MAX))
}

/// How much must be sent for `destination_amount` to arrive.
pub async fn quote_destination_amount(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    destination_amount: u64,
) -> Result<u64, Psk2Error> {
    let sample = sample_rate(plugin, options, PSK2_STARTING_AMOUNT).await?;
    source_for(destination_amount, sample.source_amount, sample.destination_amount)
}

/// Send exactly `source_amount`, however much of it arrives.
pub async fn send_source_amount(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    source_amount: u64,
) -> Result<PaymentResult, Psk2Error> {
    safe_connect(plugin, options.connect_timeout).await?;
    let state = ChunkState::new(Target::SourceAmount(source_amount));
    send_chunks(plugin, options, state).await
}

/// Deliver `destination_amount` to the receiver.
pub async fn send_destination_amount(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    destination_amount: u64,
) -> Result<PaymentResult, Psk2Error> {
    let sample = sample_rate(plugin, options, PSK2_STARTING_AMOUNT).await?;
    if sample.destination_amount == 0 {
        return Err(Psk2Error::ZeroRate);
    }
    let mut state = ChunkState::new(Target::DestinationAmount(destination_amount))
        .with_rate(sample.source_amount, sample.destination_amount);
    if let Some(max) = sample.max_packet_amount {
        state.limit_chunk_size(max);
    }
    send_chunks(plugin, options, state).await
}

async fn send_chunks(
    plugin: &dyn Plugin,
    options: &PaymentOptions,
    mut state: ChunkState,
) -> Result<PaymentResult, Psk2Error> {
    let payment_id = payment_id_for(options);
    let destination_amount = match state.target() {
        Target::SourceAmount(_) => 0,
        Target::DestinationAmount(amount) => amount,
    };
    info!(
        payment_id = %hex::encode(payment_id),
        destination = %options.destination_account,
        target = ?state.target(),
        "starting payment"
    );

    while let Some(next) = state.next_chunk() {
        let header = ChunkHeader {
            chunk_type: if next.is_last { ChunkType::LastChunk } else { ChunkType::Chunk },
            payment_id,
            destination_amount,
            data: Vec::new(),
        };

        let mut packet_limit = None;
        let failure = match send_single_chunk(plugin, options, &header, next.source_amount).await {
            Ok(ChunkResult::Fulfilled { delivered_total }) => {
                state.on_fulfilled(next.source_amount, delivered_total);
                continue;
            }
            // Only the receiver can seal an amount into the reject, so this
            // refusal is authentic and retrying cannot change it.
            Ok(ChunkResult::Rejected {
                reject,
                amount: Some(received),
            }) => {
                warn!(
                    code = %reject.code,
                    message = %reject.message,
                    received,
                    "receiver rejected chunk, abandoning payment"
                );
                return Err(Psk2Error::Rejected {
                    code: reject.code,
                    message: reject.message,
                });
            }
            Ok(ChunkResult::Rejected { reject, amount: None }) => {
                packet_limit = reject
                    .amount_too_large()
                    .and_then(|limit| limit.max_source_amount(next.source_amount));
                format!("{}: {}", reject.code, reject.message)
            }
            Err(Psk2Error::Plugin(err)) => err.to_string(),
            Err(err) => return Err(err),
        };

        let backoff = state.on_rejected();
        if let Some(max) = packet_limit {
            state.limit_chunk_size(max);
        }
        if state.consecutive_failures() >= options.max_consecutive_failures {
            return Err(Psk2Error::TooManyFailures {
                failures: state.consecutive_failures(),
                last: failure,
            });
        }
        debug!(
            failure = %failure,
            chunk_size = state.chunk_size(),
            backoff_ms = backoff.as_millis() as u64,
            "chunk failed, retrying"
        );
        tokio::time::sleep(backoff).await;
    }

    let result = PaymentResult {
        payment_id: hex::encode(payment_id),
        source_amount: state.amount_sent(),
        destination_amount: state.amount_delivered(),
        chunks: state.chunks_fulfilled(),
    };
    info!(
        payment_id = %result.payment_id,
        source_amount = result.source_amount,
        destination_amount = result.destination_amount,
        chunks = result.chunks,
        "payment complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_for_rounds_up() {
        assert_eq!(source_for(100, 1_000, 500).unwrap(), 200);
        assert_eq!(source_for(101, 1_000, 500).unwrap(), 202);
        assert_eq!(source_for(1, 1_000, 3).unwrap(), 334);
        assert!(matches!(source_for(1, 1_000, 0), Err(Psk2Error::ZeroRate)));
    }

    #[test]
    fn shrunken_quote_scales_to_the_asked_amount() {
        let sample = RateSample {
            source_amount: 100,
            destination_amount: 75,
            max_packet_amount: Some(100),
        };
        assert_eq!(sample.delivered_for(100), 75);
        assert_eq!(sample.delivered_for(1_000), 750);
        assert_eq!(sample.delivered_for(3), 2);
    }

    #[test]
    fn options_debug_redacts_secret() {
        let options = PaymentOptions::new("test.bob", vec![0xee; 32]);
        let text = format!("{options:?}");
        assert!(text.contains("redacted"));
        assert!(!text.contains("238"));
    }
}
