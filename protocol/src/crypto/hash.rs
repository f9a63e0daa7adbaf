//! # Conditions and Fulfillments
//!
//! A fulfillment is a 32-byte preimage; its condition is the SHA-256 digest.
//! A conditional transfer can only execute when the presented fulfillment
//! hashes to the transfer's condition, so the comparison below is the last
//! line of defence before funds move. It is constant-time.
//!
//! ## Text forms
//!
//! Some interop contexts (payment requests, logs, JSON APIs) want text:
//!
//! ```text
//! condition   cc:0:3:<base64url(sha256(preimage))>:<preimage length>
//! fulfillment cf:0:<base64url(preimage)>
//! ```

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::CONDITION_LENGTH;
use crate::encoding;

use super::error::CryptoError;

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// The condition for a fulfillment: `SHA-256(preimage)`.
pub fn hash_condition(preimage: &[u8]) -> [u8; CONDITION_LENGTH] {
    sha256(preimage)
}

/// Returns `true` iff `SHA-256(fulfillment) == condition`, compared in
/// constant time.
pub fn verify_fulfillment(fulfillment: &[u8], condition: &[u8]) -> bool {
    if condition.len() != CONDITION_LENGTH {
        return false;
    }
    hash_condition(fulfillment).ct_eq(condition).into()
}

/// Render a preimage's condition as a `cc:` URI.
pub fn to_condition_uri(condition: &[u8; CONDITION_LENGTH]) -> String {
    format!("cc:0:3:{}:{}", encoding::encode(condition), CONDITION_LENGTH)
}

/// Render a fulfillment as a `cf:` URI.
pub fn to_fulfillment_uri(fulfillment: &[u8; CONDITION_LENGTH]) -> String {
    format!("cf:0:{}", encoding::encode(fulfillment))
}

/// Parse a `cc:0:3:<hash>:<cost>` URI back into the 32-byte condition.
pub fn condition_from_uri(uri: &str) -> Result<[u8; CONDITION_LENGTH], CryptoError> {
    let malformed = || CryptoError::MalformedUri(uri.to_string());
    let rest = uri.strip_prefix("cc:0:3:").ok_or_else(malformed)?;
    let (hash, _cost) = rest.split_once(':').ok_or_else(malformed)?;
    let bytes = encoding::decode(hash).map_err(|_| malformed())?;
    bytes.try_into().map_err(|_| malformed())
}

/// Parse a `cf:0:<preimage>` URI back into the 32-byte fulfillment.
pub fn fulfillment_from_uri(uri: &str) -> Result<[u8; CONDITION_LENGTH], CryptoError> {
    let malformed = || CryptoError::MalformedUri(uri.to_string());
    let body = uri.strip_prefix("cf:0:").ok_or_else(malformed)?;
    let bytes = encoding::decode(body).map_err(|_| malformed())?;
    bytes.try_into().map_err(|_| malformed())
}
