//! PSK packet construction.
//!
//! The fulfillment is an HMAC over the exact serialized payment packet, so
//! any change to account, amount or details yields a different condition.

use tracing::debug;

use crate::config::{CONDITION_LENGTH, PSK_CONDITION_STRING};
use crate::crypto::{self, CryptoError};
use crate::details::{create_details, CreateDetails, Headers};
use crate::packet::{IlpPayment, OerPacket};

use super::error::TransportError;

/// Inputs to [`create_packet_and_condition`].
#[derive(Clone, Debug, Default)]
pub struct PskPacketParams {
    pub shared_secret: Vec<u8>,
    pub destination_account: String,
    pub destination_amount: u64,
    pub data: Vec<u8>,
    pub headers: Headers,
    pub public_headers: Headers,
    pub disable_encryption: bool,
}

/// A serialized payment packet and the condition that locks it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketAndCondition {
    pub packet: Vec<u8>,
    pub condition: [u8; CONDITION_LENGTH],
}

pub fn create_packet_and_condition(
    params: &PskPacketParams,
) -> Result<PacketAndCondition, TransportError> {
    crypto::validate_shared_secret(&params.shared_secret)?;
    let details = create_details(CreateDetails {
        headers: &params.headers,
        public_headers: &params.public_headers,
        secret: &params.shared_secret,
        data: &params.data,
        disable_encryption: params.disable_encryption,
    })?;
    let packet = IlpPayment {
        account: params.destination_account.clone(),
        amount: params.destination_amount,
        data: details,
    }
    .to_oer()?;

    let fulfillment = fulfillment_for_packet(&params.shared_secret, &packet)?;
    let condition = crypto::hash_condition(&fulfillment);
    debug!(
        destination = %params.destination_account,
        amount = params.destination_amount,
        condition = %hex::encode(condition),
        "created PSK packet"
    );
    Ok(PacketAndCondition { packet, condition })
}

/// `HMAC(HMAC(shared_secret, "ilp_psk_condition"), packet)`.
pub fn fulfillment_for_packet(
    shared_secret: &[u8],
    packet: &[u8],
) -> Result<[u8; CONDITION_LENGTH], CryptoError> {
    let key = crypto::hmac(shared_secret, PSK_CONDITION_STRING)?;
    crypto::hmac(&key, packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::parse_packet_and_details;

    fn params() -> PskPacketParams {
        PskPacketParams {
            shared_secret: vec![5u8; 16],
            destination_account: "test.bob.abc".to_string(),
            destination_amount: 250,
            data: b"invoice 7".to_vec(),
            headers: Headers::new().with("Memo", "lunch"),
            ..PskPacketParams::default()
        }
    }

    #[test]
    fn condition_matches_fulfillment() {
        let created = create_packet_and_condition(&params()).unwrap();
        let fulfillment = fulfillment_for_packet(&[5u8; 16], &created.packet).unwrap();
        assert!(crypto::verify_fulfillment(&fulfillment, &created.condition));
    }

    #[test]
    fn packet_opens_with_shared_secret() {
        let created = create_packet_and_condition(&params()).unwrap();
        let opened = parse_packet_and_details(&created.packet, Some(&[5u8; 16])).unwrap();
        assert_eq!(opened.account, "test.bob.abc");
        assert_eq!(opened.amount, 250);
        assert_eq!(opened.headers.get("memo"), Some("lunch"));
        assert_eq!(opened.data, b"invoice 7");
    }

    #[test]
    fn every_packet_gets_its_own_condition() {
        let a = create_packet_and_condition(&params()).unwrap();
        let b = create_packet_and_condition(&params()).unwrap();
        assert_ne!(a.condition, b.condition);
    }

    #[test]
    fn rejects_bad_secret() {
        let mut bad = params();
        bad.shared_secret = vec![1u8; 8];
        assert!(matches!(
            create_packet_and_condition(&bad),
            Err(TransportError::Crypto(CryptoError::InvalidSecretLength(8)))
        ));
    }
}
