//! Chunk sizing and retry state for one outgoing payment.
//!
//! Pure bookkeeping: nothing here sends or sleeps. The sender asks for the
//! next chunk, reports what happened, and waits for whatever backoff
//! [`ChunkState::on_rejected`] returns.

use std::time::Duration;

use crate::config::{
    PSK2_DECREASE_DIVISOR, PSK2_INCREASE_TENTHS, PSK2_INITIAL_BACKOFF, PSK2_MAX_BACKOFF,
    PSK2_STARTING_AMOUNT,
};

/// Which side of the payment is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    SourceAmount(u64),
    DestinationAmount(u64),
}

/// The chunk to send next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextChunk {
    pub source_amount: u64,
    /// Sending this chunk is expected to complete the payment.
    pub is_last: bool,
}

#[derive(Debug, Clone)]
pub struct ChunkState {
    target: Target,
    chunk_size: u64,
    /// Largest chunk the path is known to carry.
    max_chunk_size: Option<u64>,
    amount_sent: u64,
    amount_delivered: u64,
    /// Last confirmed `(sent, delivered)` pair, used as the rate estimate.
    rate: Option<(u64, u64)>,
    backoff: Duration,
    consecutive_failures: u32,
    chunks_fulfilled: u32,
}

fn div_ceil(numerator: u128, denominator: u128) -> u128 {
    numerator.div_ceil(denominator.max(1))
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

impl ChunkState {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            chunk_size: PSK2_STARTING_AMOUNT,
            max_chunk_size: None,
            amount_sent: 0,
            amount_delivered: 0,
            rate: None,
            backoff: Duration::ZERO,
            consecutive_failures: 0,
            chunks_fulfilled: 0,
        }
    }

    /// Seed the rate estimate, e.g. from a quote.
    pub fn with_rate(mut self, source: u64, destination: u64) -> Self {
        if source > 0 {
            self.rate = Some((source, destination));
        }
        self
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn max_chunk_size(&self) -> Option<u64> {
        self.max_chunk_size
    }

    /// Never send chunks above `max` again, e.g. after an `F08` told us the
    /// path's packet limit. Keeps the smallest limit seen.
    pub fn limit_chunk_size(&mut self, max: u64) {
        let max = self.max_chunk_size.map_or(max, |current| current.min(max)).max(1);
        self.max_chunk_size = Some(max);
        self.chunk_size = self.chunk_size.min(max);
    }

    pub fn amount_sent(&self) -> u64 {
        self.amount_sent
    }

    pub fn amount_delivered(&self) -> u64 {
        self.amount_delivered
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn chunks_fulfilled(&self) -> u32 {
        self.chunks_fulfilled
    }

    /// Destination units `source` is expected to deliver, if a rate is known.
    pub fn estimate_delivered(&self, source: u64) -> Option<u64> {
        let (sent, delivered) = self.rate?;
        Some(saturate(source as u128 * delivered as u128 / sent as u128))
    }

    /// `None` once the target is reached.
    pub fn next_chunk(&self) -> Option<NextChunk> {
        let remaining_source = match self.target {
            Target::SourceAmount(total) => total.saturating_sub(self.amount_sent),
            Target::DestinationAmount(total) => {
                let remaining = total.saturating_sub(self.amount_delivered);
                if remaining == 0 {
                    return None;
                }
                match self.rate {
                    Some((sent, delivered)) if delivered > 0 => {
                        saturate(div_ceil(remaining as u128 * sent as u128, delivered as u128))
                    }
                    // Without a usable rate, keep sending at chunk size.
                    _ => {
                        return Some(NextChunk {
                            source_amount: self.chunk_size,
                            is_last: false,
                        })
                    }
                }
            }
        };
        if remaining_source == 0 {
            return None;
        }
        let source_amount = self.chunk_size.min(remaining_source);
        Some(NextChunk {
            source_amount,
            is_last: source_amount == remaining_source,
        })
    }

    pub fn is_done(&self) -> bool {
        self.next_chunk().is_none()
    }

    /// Record a fulfilled chunk. `delivered_total` is the receiver's running
    /// total, or `None` when its response could not be read.
    pub fn on_fulfilled(&mut self, source_amount: u64, delivered_total: Option<u64>) {
        let estimate = self.estimate_delivered(source_amount).unwrap_or(0);
        self.amount_sent = self.amount_sent.saturating_add(source_amount);
        self.amount_delivered = match delivered_total {
            Some(total) => total,
            None => self.amount_delivered.saturating_add(estimate),
        };
        if delivered_total.is_some() {
            self.rate = Some((self.amount_sent, self.amount_delivered));
        }

        let grown = saturate(self.chunk_size as u128 * PSK2_INCREASE_TENTHS as u128 / 10);
        self.chunk_size = grown
            .max(self.chunk_size.saturating_add(1))
            .min(self.max_chunk_size.unwrap_or(u64::MAX));
        self.backoff = Duration::ZERO;
        self.consecutive_failures = 0;
        self.chunks_fulfilled += 1;
    }

    /// Record a failed chunk and return how long to wait before the next.
    pub fn on_rejected(&mut self) -> Duration {
        self.chunk_size = (self.chunk_size / PSK2_DECREASE_DIVISOR).max(1);
        self.backoff = (self.backoff * 2).clamp(PSK2_INITIAL_BACKOFF, PSK2_MAX_BACKOFF);
        self.consecutive_failures += 1;
        self.backoff
    }
}
