//! # Protocol Configuration & Constants
//!
//! Every magic number of the transport layer lives here: derivation labels,
//! field lengths, envelope identifiers, timeouts and the PSK2 sizing policy.
//!
//! The derivation labels are part of the wire contract. Two implementations
//! that disagree on a single byte here will happily derive different shared
//! secrets and reject each other's payments, so treat them as frozen.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Derivation Labels
// ---------------------------------------------------------------------------

/// HMAC label turning a receiver secret into the PSK shared-secret generator.
pub const PSK_GENERATION_STRING: &[u8] = b"ilp_psk_generation";

/// HMAC label for the PSK/IPR fulfillment key.
pub const PSK_CONDITION_STRING: &[u8] = b"ilp_psk_condition";

/// HMAC label for the PSK/1.0 details encryption key.
pub const PSK_ENCRYPTION_STRING: &[u8] = b"ilp_key_encryption";

/// HMAC label for the receiver id embedded in destination addresses.
pub const RECEIVER_ID_STRING: &[u8] = b"ilp_receiver_id";

/// HMAC label for interactive payment request conditions.
pub const IPR_CONDITION_STRING: &[u8] = b"ilp_ipr_condition";

/// HMAC label for the PSK2 chunk encryption key.
pub const PSK2_ENCRYPTION_STRING: &[u8] = b"ilp_psk2_encryption";

/// HMAC label for the PSK2 fulfillment key.
pub const PSK2_FULFILLMENT_STRING: &[u8] = b"ilp_psk2_fulfillment";

// ---------------------------------------------------------------------------
// Lengths
// ---------------------------------------------------------------------------

/// Receiver id length in bytes (11 characters once base64url-encoded).
pub const RECEIVER_ID_LENGTH: usize = 8;

/// Random PSK token length in bytes (22 characters once base64url-encoded).
pub const PSK_TOKEN_LENGTH: usize = 16;

/// Derived shared secrets are truncated to this many bytes.
pub const SHARED_SECRET_LENGTH: usize = 16;

/// Shortest secret we accept as a PSK shared secret.
pub const MIN_SECRET_LENGTH: usize = 16;

/// Longest secret we accept as a PSK shared secret.
pub const MAX_SECRET_LENGTH: usize = 32;

/// Receiver secrets are long-lived and must be a full 32 bytes.
pub const RECEIVER_SECRET_LENGTH: usize = 32;

/// Conditions and fulfillments are both 32 bytes (SHA-256 output / preimage).
pub const CONDITION_LENGTH: usize = 32;

/// PSK/1.0 details use a 128-bit GCM IV.
pub const DETAILS_NONCE_LENGTH: usize = 16;

/// PSK2 chunk data uses the standard 96-bit GCM nonce.
pub const PSK2_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length.
pub const AUTH_TAG_LENGTH: usize = 16;

/// PSK2 payment identifiers are 16 bytes (a v4 UUID).
pub const PAYMENT_ID_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// PSK/1.0 Envelope
// ---------------------------------------------------------------------------

/// Status line of the public details envelope.
pub const PSK_STATUS_LINE: &str = "PSK/1.0";

/// Prefix every accepted status line must carry (minor versions are tolerated).
pub const PSK_STATUS_PREFIX: &str = "PSK/1.";

/// Value of the `Encryption` header when the body is encrypted.
pub const PSK_ENCRYPTION_ALGORITHM: &str = "aes-256-gcm";

/// Value of the `Encryption` header when encryption was disabled.
pub const PSK_ENCRYPTION_NONE: &str = "none";

/// IPR envelope version byte.
pub const IPR_VERSION: u8 = 2;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// How long `listen` and `quote` wait for a plugin to connect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination hold duration requested in ILQP quotes when the caller gives none.
pub const DEFAULT_DESTINATION_EXPIRY: Duration = Duration::from_secs(10);

/// Expiry window stamped on every PSK2 chunk.
pub const DEFAULT_CHUNK_EXPIRY: Duration = Duration::from_secs(30);

/// First PSK2 retry delay; doubles on every consecutive failure.
pub const PSK2_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Ceiling on the PSK2 retry delay.
pub const PSK2_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Consecutive chunk failures tolerated before a PSK2 payment gives up.
pub const PSK2_MAX_CONSECUTIVE_FAILURES: u32 = 20;

// ---------------------------------------------------------------------------
// PSK2 Chunk Sizing
// ---------------------------------------------------------------------------

/// Source amount of the first chunk of every payment.
pub const PSK2_STARTING_AMOUNT: u64 = 1_000;

/// Chunk growth after a fulfilled chunk, in tenths (11 ⇒ ×1.1).
pub const PSK2_INCREASE_TENTHS: u64 = 11;

/// Chunk shrink divisor after a failed chunk (2 ⇒ ×0.5).
pub const PSK2_DECREASE_DIVISOR: u64 = 2;

/// Over-delivery the receiver tolerates, in percent of the expected amount.
pub const PSK2_OVERPAYMENT_TOLERANCE_PERCENT: u64 = 1;

/// How long a receiver keeps a payment record after its last chunk.
pub const PSK2_RECORD_TTL: Duration = Duration::from_secs(600);
