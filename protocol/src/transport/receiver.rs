//! # Receiver
//!
//! A receiver is nothing but its long-term secret. Every per-payment value
//! (shared secrets, addresses, conditions) is derived from it on demand, so
//! a receiver can recognise a packet addressed to it without having stored
//! anything when it handed out the address.
//!
//! ```text
//! destination = <ledger account> . <receiver id (11 chars)><token (22 chars)>
//! ```

use crate::config::RECEIVER_SECRET_LENGTH;
use crate::crypto::{self, CryptoError};
use crate::encoding;

/// Length of a base64url-encoded receiver id.
pub const RECEIVER_ID_TEXT_LENGTH: usize = 11;

/// Parameters a sender needs to pay this receiver with PSK.
#[derive(Clone, PartialEq, Eq)]
pub struct PskParams {
    pub shared_secret: [u8; 16],
    pub destination_account: String,
    /// The base64url token embedded in `destination_account`.
    pub token: String,
}

impl std::fmt::Debug for PskParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PskParams")
            .field("destination_account", &self.destination_account)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A long-term receiver secret.
#[derive(Clone)]
pub struct Receiver {
    secret: [u8; RECEIVER_SECRET_LENGTH],
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver").finish_non_exhaustive()
    }
}

impl Receiver {
    /// Wrap an existing 32-byte secret.
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        crypto::validate_receiver_secret(secret)?;
        let mut owned = [0u8; RECEIVER_SECRET_LENGTH];
        owned.copy_from_slice(secret);
        Ok(Self { secret: owned })
    }

    /// A receiver with a fresh random secret.
    pub fn generate() -> Self {
        Self {
            secret: crypto::random_bytes::<RECEIVER_SECRET_LENGTH>(),
        }
    }

    pub fn secret(&self) -> &[u8; RECEIVER_SECRET_LENGTH] {
        &self.secret
    }

    /// The base64url receiver id that prefixes every address this
    /// receiver hands out.
    pub fn receiver_id(&self) -> Result<String, CryptoError> {
        Ok(encoding::encode(crypto::derive_receiver_id(&self.secret)?))
    }

    /// Mint a fresh token and the shared secret and address that go with it.
    pub fn generate_psk_params(&self, destination_account: &str) -> Result<PskParams, CryptoError> {
        let token = encoding::encode(crypto::derive_psk_token());
        let shared_secret = self.shared_secret_for_token(&token)?;
        Ok(PskParams {
            shared_secret,
            destination_account: format!("{destination_account}.{}{token}", self.receiver_id()?),
            token,
        })
    }

    /// Re-derive the shared secret for a token seen in an address.
    pub fn shared_secret_for_token(&self, token: &str) -> Result<[u8; 16], CryptoError> {
        crypto::derive_shared_secret(&self.secret, token)
    }

    /// If `local_part` (the address segment after the ledger account)
    /// belongs to this receiver, return the token it carries.
    pub fn match_local_part<'a>(&self, local_part: &'a str) -> Result<Option<&'a str>, CryptoError> {
        let receiver_id = self.receiver_id()?;
        Ok(local_part
            .strip_prefix(receiver_id.as_str())
            .filter(|token| !token.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiver() -> Receiver {
        Receiver::new(&[1u8; 32]).unwrap()
    }

    #[test]
    fn receiver_id_is_eleven_chars_and_stable() {
        let id = receiver().receiver_id().unwrap();
        assert_eq!(id.len(), RECEIVER_ID_TEXT_LENGTH);
        assert_eq!(id, receiver().receiver_id().unwrap());
        assert_ne!(id, Receiver::new(&[2u8; 32]).unwrap().receiver_id().unwrap());
    }

    #[test]
    fn rejects_short_secret() {
        assert_eq!(
            Receiver::new(&[0u8; 16]).unwrap_err(),
            CryptoError::InvalidReceiverSecretLength(16)
        );
    }

    #[test]
    fn psk_params_rederive() {
        let receiver = receiver();
        let params = receiver.generate_psk_params("test.example.alice").unwrap();
        assert_eq!(params.token.len(), 22);

        let local = params
            .destination_account
            .strip_prefix("test.example.alice.")
            .unwrap();
        let token = receiver.match_local_part(local).unwrap().unwrap();
        assert_eq!(token, params.token);
        assert_eq!(
            receiver.shared_secret_for_token(token).unwrap(),
            params.shared_secret
        );
    }

    #[test]
    fn fresh_token_each_time() {
        let receiver = receiver();
        let a = receiver.generate_psk_params("test.a").unwrap();
        let b = receiver.generate_psk_params("test.a").unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.shared_secret, b.shared_secret);
    }

    #[test]
    fn foreign_local_part_does_not_match() {
        let receiver = receiver();
        let other = Receiver::new(&[9u8; 32]).unwrap();
        let params = other.generate_psk_params("test.a").unwrap();
        let local = params.destination_account.strip_prefix("test.a.").unwrap();
        assert_eq!(receiver.match_local_part(local).unwrap(), None);

        let bare_id = receiver.receiver_id().unwrap();
        assert_eq!(receiver.match_local_part(&bare_id).unwrap(), None);
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let text = format!("{:?}", receiver());
        assert!(!text.contains("1, 1, 1"));
    }
}
