//! # Cryptographic Primitives
//!
//! Everything security-related in the transport flows through here:
//!
//! - **HMAC-SHA-256** as both MAC and KDF. Receiver ids, shared secrets,
//!   encryption keys and fulfillments are all HMAC chains keyed by a secret.
//! - **SHA-256** to turn a fulfillment (preimage) into a condition.
//! - **AES-256-GCM** for the details envelope and PSK2 chunk data.
//!
//! Nothing here keeps state. Given the same secret and inputs, every
//! derivation returns the same bytes, which is what lets a receiver
//! recognise payments without a session database.

pub mod encryption;
pub mod hash;
pub mod kdf;

mod error;

pub use encryption::{decrypt, encrypt, open, random_bytes, seal};
pub use error::CryptoError;
pub use hash::{
    condition_from_uri, fulfillment_from_uri, hash_condition, sha256, to_condition_uri,
    to_fulfillment_uri, verify_fulfillment,
};
pub use kdf::{
    derive_psk_token, derive_receiver_id, derive_shared_secret, hmac, validate_receiver_secret,
    validate_shared_secret,
};
