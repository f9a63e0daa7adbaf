//! # Transfer Frames
//!
//! What actually travels through `Plugin::send_data`: a conditional
//! transfer offer and the two ways it can end.
//!
//! ```text
//! Prepare (12)   amount u64, expires_at time, condition var octet, ilp var octet
//! Fulfill (13)   fulfillment [32], data var octet
//! Reject  (14)   code [3], triggered_by var ascii, message var ascii, data var octet
//! ```
//!
//! An `F08` reject carries [`AmountTooLarge`] in its data so the sender can
//! size the next attempt.
//!
//! A Prepare may arrive without a condition or without an ILP packet; the
//! wire carries an empty octet string in that case and the receiver answers
//! with `F00`. We keep those as `None` instead of refusing to parse, so the
//! transport layer can produce the right reject.

use chrono::{DateTime, Utc};

use crate::config::CONDITION_LENGTH;

use super::error::PacketError;
use super::oer::{Reader, Writer};
use super::OerPacket;

const ERROR_CODE_LENGTH: usize = 3;

/// A conditional transfer offer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prepare {
    pub amount: u64,
    pub expires_at: DateTime<Utc>,
    pub execution_condition: Option<[u8; CONDITION_LENGTH]>,
    pub ilp: Option<Vec<u8>>,
}

impl OerPacket for Prepare {
    const TYPE: u8 = 12;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_u64(self.amount);
        writer.write_timestamp(&self.expires_at)?;
        match &self.execution_condition {
            Some(condition) => writer.write_var_octet_string(condition),
            None => writer.write_var_octet_string(&[]),
        }
        writer.write_var_octet_string(self.ilp.as_deref().unwrap_or_default());
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let amount = reader.read_u64()?;
        let expires_at = reader.read_timestamp()?;
        let execution_condition = match reader.read_var_octet_string()? {
            [] => None,
            raw => Some(
                <[u8; CONDITION_LENGTH]>::try_from(raw)
                    .map_err(|_| PacketError::InvalidCondition(raw.len()))?,
            ),
        };
        let ilp = match reader.read_var_octet_string()? {
            [] => None,
            raw => Some(raw.to_vec()),
        };
        Ok(Self {
            amount,
            expires_at,
            execution_condition,
            ilp,
        })
    }
}

/// The preimage that releases a prepared transfer, plus response data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fulfill {
    pub fulfillment: [u8; CONDITION_LENGTH],
    pub data: Vec<u8>,
}

impl OerPacket for Fulfill {
    const TYPE: u8 = 13;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_octet_string(&self.fulfillment);
        writer.write_var_octet_string(&self.data);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let mut fulfillment = [0u8; CONDITION_LENGTH];
        fulfillment.copy_from_slice(reader.read_octet_string(CONDITION_LENGTH)?);
        Ok(Self {
            fulfillment,
            data: reader.read_var_octet_string()?.to_vec(),
        })
    }
}

/// A refusal, with a three-character ILP error code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reject {
    pub code: String,
    pub triggered_by: String,
    pub message: String,
    pub data: Vec<u8>,
}

impl Reject {
    /// `true` for final (`F..`) codes.
    pub fn is_final(&self) -> bool {
        self.code.starts_with('F')
    }

    /// The limit carried by an `F08 Amount Too Large` reject, if its data
    /// holds one.
    pub fn amount_too_large(&self) -> Option<AmountTooLarge> {
        if self.code != AMOUNT_TOO_LARGE_CODE {
            return None;
        }
        AmountTooLarge::from_bytes(&self.data).ok()
    }
}

const AMOUNT_TOO_LARGE_CODE: &str = "F08";

/// Reject data of an `F08`: the amount the rejecting hop received and the
/// most it forwards, both in that hop's units.
///
/// ```text
/// received  uint64
/// maximum   uint64
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmountTooLarge {
    pub received: u64,
    pub maximum: u64,
}

impl AmountTooLarge {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u64(self.received);
        writer.write_u64(self.maximum);
        writer.into_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(bytes);
        let received = reader.read_u64()?;
        let maximum = reader.read_u64()?;
        reader.finish()?;
        Ok(Self { received, maximum })
    }

    /// Scale the hop's limit back to the sender: the largest source amount
    /// that would have arrived at the hop as at most `maximum`, given that
    /// `source_amount` arrived as `received`. Rounded down.
    pub fn max_source_amount(&self, source_amount: u64) -> Option<u64> {
        if self.received == 0 {
            return None;
        }
        let scaled = source_amount as u128 * self.maximum as u128 / self.received as u128;
        Some(u64::try_from(scaled).unwrap_or(u64::MAX))
    }
}

impl OerPacket for Reject {
    const TYPE: u8 = 14;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        if self.code.len() != ERROR_CODE_LENGTH || !self.code.is_ascii() {
            return Err(PacketError::InvalidErrorCode(self.code.clone()));
        }
        writer.write_octet_string(self.code.as_bytes());
        writer.write_var_ascii(&self.triggered_by)?;
        writer.write_var_ascii(&self.message)?;
        writer.write_var_octet_string(&self.data);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let raw = reader.read_octet_string(ERROR_CODE_LENGTH)?;
        let code = std::str::from_utf8(raw)
            .ok()
            .filter(|code| code.is_ascii())
            .ok_or_else(|| PacketError::InvalidErrorCode(String::from_utf8_lossy(raw).into_owned()))?
            .to_string();
        Ok(Self {
            code,
            triggered_by: reader.read_var_ascii()?.to_string(),
            message: reader.read_var_ascii()?.to_string(),
            data: reader.read_var_octet_string()?.to_vec(),
        })
    }
}
