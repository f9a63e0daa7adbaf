//! # ILP Payment Packet
//!
//! The end-to-end part of a transfer: who gets paid, how much must arrive,
//! and an opaque data blob for the receiver (for PSK, the details envelope).
//!
//! ```text
//! envelope type 1 {
//!     amount      uint64            destination amount
//!     account     var ascii         dot-separated ILP address
//!     data        var octet string  opaque to connectors
//!     extensions  uint8 = 0
//! }
//! ```
//!
//! Amounts travel as decimal strings outside the crate (JSON APIs, CLI);
//! [`parse_amount`] is the single place those strings become integers.

use serde::{Deserialize, Serialize};

use super::error::PacketError;
use super::oer::{Reader, Writer};
use super::OerPacket;

/// An ILP payment packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IlpPayment {
    /// Destination ILP address.
    pub account: String,
    /// Amount that must arrive at the destination, in its ledger's units.
    pub amount: u64,
    /// Opaque end-to-end data.
    #[serde(with = "crate::packet::payment::base64url_bytes")]
    pub data: Vec<u8>,
}

impl OerPacket for IlpPayment {
    const TYPE: u8 = 1;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        validate_address(&self.account)?;
        writer.write_u64(self.amount);
        writer.write_var_ascii(&self.account)?;
        writer.write_var_octet_string(&self.data);
        writer.write_u8(0);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let amount = reader.read_u64()?;
        let account = reader.read_var_ascii()?.to_string();
        validate_address(&account)?;
        let data = reader.read_var_octet_string()?.to_vec();
        // Extensions are reserved; tolerate and ignore whatever follows.
        reader.read_u8()?;
        reader.skip_rest();
        Ok(Self {
            account,
            amount,
            data,
        })
    }
}

/// Check that `address` is a plausible ILP address: non-empty ASCII
/// segments of `[A-Za-z0-9_~-]` joined by dots.
pub fn validate_address(address: &str) -> Result<(), PacketError> {
    let valid_segment = |segment: &str| {
        !segment.is_empty()
            && segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'~' | b'-'))
    };
    if address.is_empty() || !address.split('.').all(valid_segment) {
        return Err(PacketError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

/// Parse an unsigned decimal amount string.
pub fn parse_amount(text: &str) -> Result<u64, PacketError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PacketError::InvalidAmount(text.to_string()));
    }
    text.parse::<u64>()
        .map_err(|_| PacketError::InvalidAmount(text.to_string()))
}

pub(crate) mod base64url_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::encoding::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::encoding::decode(&text).map_err(serde::de::Error::custom)
    }
}
