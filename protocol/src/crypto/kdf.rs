//! # HMAC-based Key Derivation
//!
//! A receiver holds one long-term secret. Everything else is an HMAC chain
//! hanging off it:
//!
//! ```text
//! receiver_id   = HMAC(receiverSecret, "ilp_receiver_id")[..8]
//! generator     = HMAC(receiverSecret, "ilp_psk_generation")
//! shared_secret = HMAC(generator, token)[..16]
//! ```
//!
//! The token travels in the destination address in base64url form, and the
//! receiver re-derives the shared secret from it when a packet arrives. The
//! token is HMAC'd as the ASCII text that appears in the address, not as the
//! raw 16 bytes, so sender and receiver never have to agree on a decoding.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::config::{
    MAX_SECRET_LENGTH, MIN_SECRET_LENGTH, PSK_GENERATION_STRING, PSK_TOKEN_LENGTH,
    RECEIVER_ID_LENGTH, RECEIVER_ID_STRING, RECEIVER_SECRET_LENGTH, SHARED_SECRET_LENGTH,
};

use super::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA-256 of `message` under `key`.
pub fn hmac(key: &[u8], message: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
    mac.update(message);
    let out = mac.finalize().into_bytes();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    Ok(digest)
}

/// Check that `secret` is usable as a PSK shared secret.
pub fn validate_shared_secret(secret: &[u8]) -> Result<(), CryptoError> {
    if (MIN_SECRET_LENGTH..=MAX_SECRET_LENGTH).contains(&secret.len()) {
        Ok(())
    } else {
        Err(CryptoError::InvalidSecretLength(secret.len()))
    }
}

/// Check that `secret` is usable as a long-term receiver secret.
pub fn validate_receiver_secret(secret: &[u8]) -> Result<(), CryptoError> {
    if secret.len() == RECEIVER_SECRET_LENGTH {
        Ok(())
    } else {
        Err(CryptoError::InvalidReceiverSecretLength(secret.len()))
    }
}

/// The 8-byte receiver id for a receiver secret.
pub fn derive_receiver_id(receiver_secret: &[u8]) -> Result<[u8; RECEIVER_ID_LENGTH], CryptoError> {
    let digest = hmac(receiver_secret, RECEIVER_ID_STRING)?;
    let mut id = [0u8; RECEIVER_ID_LENGTH];
    id.copy_from_slice(&digest[..RECEIVER_ID_LENGTH]);
    Ok(id)
}

/// 16 fresh random bytes for a PSK token.
pub fn derive_psk_token() -> [u8; PSK_TOKEN_LENGTH] {
    let mut token = [0u8; PSK_TOKEN_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut token);
    token
}

/// Derive the 16-byte shared secret for `token` (its base64url text form).
pub fn derive_shared_secret(
    receiver_secret: &[u8],
    token: &str,
) -> Result<[u8; SHARED_SECRET_LENGTH], CryptoError> {
    let generator = hmac(receiver_secret, PSK_GENERATION_STRING)?;
    let digest = hmac(&generator, token.as_bytes())?;
    let mut secret = [0u8; SHARED_SECRET_LENGTH];
    secret.copy_from_slice(&digest[..SHARED_SECRET_LENGTH]);
    Ok(secret)
}
