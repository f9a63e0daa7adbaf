//! base64url without padding (RFC 4648 §5).
//!
//! Receiver ids and tokens live inside ILP addresses, and tags and nonces
//! live inside header values, so everything uses the URL-safe alphabet.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

pub use base64::DecodeError;

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url. Trailing `=` padding is tolerated.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD.decode(text.trim_end_matches('='))
}
