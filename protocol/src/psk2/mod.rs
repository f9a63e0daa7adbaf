//! # PSK2: Chunked Payments
//!
//! Large payments are split into many small chunks, each an independent
//! conditional transfer. Chunk sizes adapt to what the path accepts:
//!
//! ```text
//! start at 1000 ──► fulfilled: size × 1.1, backoff reset
//!                └► rejected:  size × 0.5, wait clamp(backoff × 2, 100ms, 10s)
//! ```
//!
//! An `F08` that reports the path's packet limit also caps the size. Only a
//! reject sealed by the receiver ends the payment early.
//!
//! ```text
//! encoding.rs    chunk/response framing, sealing, fulfillment derivation
//! state.rs       pure sizing/backoff state machine
//! sender.rs      quotes and the sequential chunk loop
//! receiver.rs    per-payment records and the data handler
//! ```

pub mod encoding;
pub mod receiver;
pub mod sender;
pub mod state;

mod error;

pub use encoding::{ChunkHeader, ChunkResponse, ChunkType, PaymentId, ResponseType};
pub use error::Psk2Error;
pub use receiver::{listen, PaymentRecord, Psk2Receiver, ReceiverOptions, Verdict};
pub use sender::{
    quote_destination_amount, quote_source_amount, send_destination_amount, send_single_chunk,
    send_source_amount, ChunkResult, PaymentOptions, PaymentResult,
};
pub use state::{ChunkState, NextChunk, Target};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::plugin::{LoopbackConfig, LoopbackPlugin, Plugin};

    const SECRET: [u8; 32] = [0x5a; 32];

    async fn setup(config: LoopbackConfig) -> (Arc<LoopbackPlugin>, Arc<Psk2Receiver>, crate::transport::Listener) {
        let (alice, bob) = LoopbackPlugin::pair("test.alice", "test.bob", config);
        alice.connect().await.unwrap();
        let receiver = Arc::new(Psk2Receiver::new(bob.address(), ReceiverOptions::new(SECRET.to_vec())).unwrap());
        let listener = listen(bob, Arc::clone(&receiver)).await.unwrap();
        (alice, receiver, listener)
    }

    fn options(payment_id: PaymentId) -> PaymentOptions {
        let mut options = PaymentOptions::new("test.bob", SECRET.to_vec());
        options.payment_id = Some(payment_id);
        options
    }

    #[tokio::test]
    async fn sends_source_amount_in_chunks() {
        let (alice, receiver, _listener) = setup(LoopbackConfig::default()).await;
        let result = send_source_amount(alice.as_ref(), &options([1; 16]), 2_500).await.unwrap();
        assert_eq!(result.source_amount, 2_500);
        assert_eq!(result.destination_amount, 2_500);
        assert_eq!(result.chunks, 3);
        let record = receiver.payment(&[1; 16]).unwrap();
        assert_eq!(record.received, 2_500);
        assert!(record.finished);
    }

    #[tokio::test]
    async fn sends_destination_amount_at_a_rate() {
        let config = LoopbackConfig {
            rate_numerator: 1,
            rate_denominator: 2,
            ..LoopbackConfig::default()
        };
        let (alice, receiver, _listener) = setup(config).await;
        let result = send_destination_amount(alice.as_ref(), &options([2; 16]), 1_500).await.unwrap();
        assert_eq!(result.destination_amount, 1_500);
        assert_eq!(result.source_amount, 3_000);
        assert!(receiver.payment(&[2; 16]).unwrap().finished);
    }

    #[tokio::test]
    async fn quotes_via_rejection() {
        let config = LoopbackConfig {
            rate_numerator: 3,
            rate_denominator: 4,
            ..LoopbackConfig::default()
        };
        let (alice, receiver, _listener) = setup(config).await;
        let opts = options([3; 16]);
        assert_eq!(quote_source_amount(alice.as_ref(), &opts, 1_000).await.unwrap(), 750);
        assert_eq!(quote_destination_amount(alice.as_ref(), &opts, 75).await.unwrap(), 100);
        assert_eq!(alice.money_sent(), 0);
        assert_eq!(receiver.payment(&[3; 16]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn temporary_failures_shrink_and_retry() {
        let (alice, _receiver, _listener) = setup(LoopbackConfig::default()).await;
        alice.fail_next(3);
        let result = send_source_amount(alice.as_ref(), &options([4; 16]), 300).await.unwrap();
        assert_eq!(result.source_amount, 300);
        // 1000 → 500 → 250 → 125 after three failures.
        assert_eq!(result.chunks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_too_many_failures() {
        let (alice, _receiver, _listener) = setup(LoopbackConfig::default()).await;
        alice.fail_next(10);
        let mut opts = options([5; 16]);
        opts.max_consecutive_failures = 4;
        let err = send_source_amount(alice.as_ref(), &opts, 300).await.unwrap_err();
        assert!(matches!(err, Psk2Error::TooManyFailures { failures: 4, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_shrink_to_the_packet_limit() {
        let config = LoopbackConfig {
            max_packet_amount: Some(100),
            ..LoopbackConfig::default()
        };
        let (alice, receiver, _listener) = setup(config).await;
        let result = send_source_amount(alice.as_ref(), &options([6; 16]), 300).await.unwrap();
        assert_eq!(result.source_amount, 300);
        assert_eq!(result.destination_amount, 300);
        // One F08 at 300, then three chunks capped at 100.
        assert_eq!(result.chunks, 3);
        assert_eq!(alice.frames_sent(), 4);
        let record = receiver.payment(&[6; 16]).unwrap();
        assert_eq!(record.received, 300);
        assert!(record.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn destination_payment_respects_the_packet_limit() {
        let config = LoopbackConfig {
            max_packet_amount: Some(90),
            rate_numerator: 1,
            rate_denominator: 2,
            ..LoopbackConfig::default()
        };
        let (alice, receiver, _listener) = setup(config).await;
        let result = send_destination_amount(alice.as_ref(), &options([8; 16]), 300).await.unwrap();
        assert_eq!(result.destination_amount, 300);
        assert_eq!(result.source_amount, 600);
        assert!(receiver.payment(&[8; 16]).unwrap().finished);
    }

    #[tokio::test]
    async fn quotes_below_the_packet_limit() {
        let config = LoopbackConfig {
            max_packet_amount: Some(100),
            rate_numerator: 3,
            rate_denominator: 4,
            ..LoopbackConfig::default()
        };
        let (alice, _receiver, _listener) = setup(config).await;
        let opts = options([9; 16]);
        assert_eq!(quote_source_amount(alice.as_ref(), &opts, 1_000).await.unwrap(), 750);
        assert_eq!(quote_destination_amount(alice.as_ref(), &opts, 75).await.unwrap(), 100);
        assert_eq!(alice.money_sent(), 0);
    }

    #[tokio::test]
    async fn receiver_refusal_aborts() {
        let (alice, _receiver, _listener) = setup(LoopbackConfig::default()).await;
        let opts = options([10; 16]);
        send_source_amount(alice.as_ref(), &opts, 10).await.unwrap();

        // The same payment id is already finished at the receiver.
        let err = send_source_amount(alice.as_ref(), &opts, 10).await.unwrap_err();
        assert!(matches!(err, Psk2Error::Rejected { ref code, .. } if code == "F99"));
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_secret_is_retried_then_given_up() {
        let (alice, _receiver, _listener) = setup(LoopbackConfig::default()).await;
        let mut opts = PaymentOptions::new("test.bob", vec![0x01; 32]);
        opts.max_consecutive_failures = 3;
        let err = send_source_amount(alice.as_ref(), &opts, 10).await.unwrap_err();
        match err {
            Psk2Error::TooManyFailures { failures, last } => {
                assert_eq!(failures, 3);
                assert!(last.starts_with("F06"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_listener_stops_accepting() {
        let (alice, _receiver, listener) = setup(LoopbackConfig::default()).await;
        listener.stop();
        let mut opts = options([7; 16]);
        opts.max_consecutive_failures = 2;
        let err = send_source_amount(alice.as_ref(), &opts, 10).await.unwrap_err();
        assert!(matches!(err, Psk2Error::TooManyFailures { ref last, .. } if last.starts_with("F02")));
    }
}
