//! IPR packet construction.
//!
//! The receiver builds the packet itself, with an address derived from its
//! own secret, and hands the sender the packet and condition out of band
//! (usually wrapped with [`encode`]). An `Expires-At` private header bounds
//! how long the request stays payable.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::{CONDITION_LENGTH, DEFAULT_DESTINATION_EXPIRY};
use crate::details::Headers;
use crate::packet::{self, Ipr, PacketError};

use super::error::TransportError;
use super::psk::{self, PacketAndCondition, PskPacketParams};
use super::receiver::Receiver;

/// Private header carrying the request expiry.
pub const EXPIRES_AT_HEADER: &str = "Expires-At";

/// Inputs to [`create_packet_and_condition`].
#[derive(Clone, Debug, Default)]
pub struct IprPacketParams {
    pub receiver_secret: Vec<u8>,
    /// The receiver's account on its ledger; the derived suffix is appended.
    pub destination_account: String,
    pub destination_amount: u64,
    /// Defaults to ten seconds from now.
    pub expires_at: Option<DateTime<Utc>>,
    pub data: Vec<u8>,
    pub headers: Headers,
    pub public_headers: Headers,
    pub disable_encryption: bool,
}

/// Format an instant the way `Expires-At` carries it.
pub fn format_expiry(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn create_packet_and_condition(
    params: &IprPacketParams,
) -> Result<PacketAndCondition, TransportError> {
    let receiver = Receiver::new(&params.receiver_secret)?;
    let psk_params = receiver.generate_psk_params(&params.destination_account)?;
    let expires_at = params.expires_at.unwrap_or_else(|| {
        Utc::now()
            + chrono::Duration::from_std(DEFAULT_DESTINATION_EXPIRY)
                .unwrap_or_else(|_| chrono::Duration::seconds(10))
    });

    psk::create_packet_and_condition(&PskPacketParams {
        shared_secret: psk_params.shared_secret.to_vec(),
        destination_account: psk_params.destination_account,
        destination_amount: params.destination_amount,
        data: params.data.clone(),
        headers: params
            .headers
            .clone()
            .with(EXPIRES_AT_HEADER, format_expiry(&expires_at)),
        public_headers: params.public_headers.clone(),
        disable_encryption: params.disable_encryption,
    })
}

/// Wrap a packet and condition in the IPR envelope.
pub fn encode(packet: &[u8], condition: &[u8; CONDITION_LENGTH]) -> Vec<u8> {
    packet::encode_ipr(packet, condition)
}

pub fn decode(bytes: &[u8]) -> Result<Ipr, PacketError> {
    packet::decode_ipr(bytes)
}
