//! # ILQP Packets
//!
//! Quote requests and responses exchanged with connectors. Every request
//! names the destination and how long the destination ledger will hold the
//! final transfer; every response says how long the *source* hold must be.
//!
//! | type | packet                        | amount field          |
//! |------|-------------------------------|-----------------------|
//! | 2    | liquidity request             | none                  |
//! | 3    | liquidity response            | curve                 |
//! | 4    | by-source request             | source amount         |
//! | 5    | by-source response            | destination amount    |
//! | 6    | by-destination request        | destination amount    |
//! | 7    | by-destination response       | source amount         |
//!
//! Hold durations are milliseconds on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::PacketError;
use super::oer::{Reader, Writer};
use super::OerPacket;

const CURVE_POINT_LENGTH: usize = 16;

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

/// Ask a connector for its whole rate curve towards a destination.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLiquidityRequest {
    pub destination_account: String,
    pub destination_hold_duration: u32,
}

impl OerPacket for QuoteLiquidityRequest {
    const TYPE: u8 = 2;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_var_ascii(&self.destination_account)?;
        writer.write_u32(self.destination_hold_duration);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            destination_account: reader.read_var_ascii()?.to_string(),
            destination_hold_duration: reader.read_u32()?,
        })
    }
}

/// Piecewise-linear map from source amount to destination amount.
///
/// Points are `(source, destination)` and are expected to be sorted by
/// source amount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityCurve {
    points: Vec<(u64, u64)>,
}

impl LiquidityCurve {
    pub fn new(points: Vec<(u64, u64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(u64, u64)] {
        &self.points
    }

    /// Destination amount delivered for `source` units.
    ///
    /// Interpolates linearly between neighbouring points, rounding down.
    /// Clamps to the first point below the curve and to the last above it.
    pub fn amount_at(&self, source: u64) -> u64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return 0,
        };
        if source <= first.0 {
            return first.1;
        }
        if source >= last.0 {
            return last.1;
        }
        for window in self.points.windows(2) {
            let ((x0, y0), (x1, y1)) = (window[0], window[1]);
            if source < x0 || source > x1 {
                continue;
            }
            if x1 == x0 {
                return y1;
            }
            let dx = (source - x0) as u128;
            let span = (x1 - x0) as u128;
            let interpolated = if y1 >= y0 {
                y0 as u128 + (y1 - y0) as u128 * dx / span
            } else {
                y0 as u128 - ((y0 - y1) as u128 * dx).div_ceil(span)
            };
            return interpolated as u64;
        }
        last.1
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        for (x, y) in &self.points {
            writer.write_u64(*x);
            writer.write_u64(*y);
        }
        writer.into_vec()
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() % CURVE_POINT_LENGTH != 0 {
            return Err(PacketError::UnexpectedEnd {
                needed: CURVE_POINT_LENGTH,
                remaining: bytes.len() % CURVE_POINT_LENGTH,
            });
        }
        let mut reader = Reader::new(bytes);
        let mut points = Vec::with_capacity(bytes.len() / CURVE_POINT_LENGTH);
        while reader.remaining() > 0 {
            points.push((reader.read_u64()?, reader.read_u64()?));
        }
        Ok(Self { points })
    }
}

/// A connector's rate curve and how long it is good for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLiquidityResponse {
    pub liquidity_curve: LiquidityCurve,
    pub applies_to_prefix: String,
    pub source_hold_duration: u32,
    pub expires_at: DateTime<Utc>,
}

impl OerPacket for QuoteLiquidityResponse {
    const TYPE: u8 = 3;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_var_octet_string(&self.liquidity_curve.to_bytes());
        writer.write_var_ascii(&self.applies_to_prefix)?;
        writer.write_u32(self.source_hold_duration);
        writer.write_timestamp(&self.expires_at)
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            liquidity_curve: LiquidityCurve::from_bytes(reader.read_var_octet_string()?)?,
            applies_to_prefix: reader.read_var_ascii()?.to_string(),
            source_hold_duration: reader.read_u32()?,
            expires_at: reader.read_timestamp()?,
        })
    }
}

// ---------------------------------------------------------------------------
// By source amount
// ---------------------------------------------------------------------------

/// "If I send this much, how much arrives?"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBySourceRequest {
    pub destination_account: String,
    pub source_amount: u64,
    pub destination_hold_duration: u32,
}

impl OerPacket for QuoteBySourceRequest {
    const TYPE: u8 = 4;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_var_ascii(&self.destination_account)?;
        writer.write_u64(self.source_amount);
        writer.write_u32(self.destination_hold_duration);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            destination_account: reader.read_var_ascii()?.to_string(),
            source_amount: reader.read_u64()?,
            destination_hold_duration: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBySourceResponse {
    pub destination_amount: u64,
    pub source_hold_duration: u32,
}

impl OerPacket for QuoteBySourceResponse {
    const TYPE: u8 = 5;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_u64(self.destination_amount);
        writer.write_u32(self.source_hold_duration);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            destination_amount: reader.read_u64()?,
            source_hold_duration: reader.read_u32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// By destination amount
// ---------------------------------------------------------------------------

/// "For this much to arrive, how much must I send?"
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteByDestinationRequest {
    pub destination_account: String,
    pub destination_amount: u64,
    pub destination_hold_duration: u32,
}

impl OerPacket for QuoteByDestinationRequest {
    const TYPE: u8 = 6;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_var_ascii(&self.destination_account)?;
        writer.write_u64(self.destination_amount);
        writer.write_u32(self.destination_hold_duration);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            destination_account: reader.read_var_ascii()?.to_string(),
            destination_amount: reader.read_u64()?,
            destination_hold_duration: reader.read_u32()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteByDestinationResponse {
    pub source_amount: u64,
    pub source_hold_duration: u32,
}

impl OerPacket for QuoteByDestinationResponse {
    const TYPE: u8 = 7;

    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError> {
        writer.write_u64(self.source_amount);
        writer.write_u32(self.source_hold_duration);
        Ok(())
    }

    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        Ok(Self {
            source_amount: reader.read_u64()?,
            source_hold_duration: reader.read_u32()?,
        })
    }
}
