//! # Packet Codecs
//!
//! Binary (OER) serialization of everything that crosses the plugin:
//!
//! ```text
//! oer.rs         primitives: fixed ints, var octet strings, timestamps, envelopes
//! payment.rs     ILP payment packet (account, amount, data)          type 1
//! ilqp.rs        ILQP quote requests and responses                  types 2..=7
//! transfer.rs    conditional transfer frames: prepare/fulfill/reject types 12..=14
//! frame.rs       type-byte dispatch over all of the above
//! ipr.rs         the IPR envelope: version, condition, packet
//! ```
//!
//! All packet structs implement [`OerPacket`], which supplies envelope
//! handling so each type only describes its own fields.

pub mod frame;
pub mod ilqp;
pub mod ipr;
pub mod oer;
pub mod payment;
pub mod transfer;

mod error;

pub use error::PacketError;
pub use frame::Frame;
pub use ilqp::{
    LiquidityCurve, QuoteByDestinationRequest, QuoteByDestinationResponse, QuoteBySourceRequest,
    QuoteBySourceResponse, QuoteLiquidityRequest, QuoteLiquidityResponse,
};
pub use ipr::{decode_ipr, encode_ipr, Ipr};
pub use payment::{parse_amount, validate_address, IlpPayment};
pub use transfer::{AmountTooLarge, Fulfill, Prepare, Reject};

use oer::{read_envelope, write_envelope, Reader, Writer};

/// A packet with a fixed envelope type byte.
pub trait OerPacket: Sized {
    /// The envelope type byte.
    const TYPE: u8;

    /// Write the envelope contents.
    fn write_contents(&self, writer: &mut Writer) -> Result<(), PacketError>;

    /// Read the envelope contents. Implementations either consume the
    /// reader exactly or explicitly skip trailing extensions.
    fn read_contents(reader: &mut Reader<'_>) -> Result<Self, PacketError>;

    /// Serialize into a complete envelope.
    fn to_oer(&self) -> Result<Vec<u8>, PacketError> {
        let mut writer = Writer::new();
        self.write_contents(&mut writer)?;
        Ok(write_envelope(Self::TYPE, &writer.into_vec()))
    }

    /// Parse a complete envelope of this type.
    fn from_oer(bytes: &[u8]) -> Result<Self, PacketError> {
        let (packet_type, contents) = read_envelope(bytes)?;
        if packet_type != Self::TYPE {
            return Err(PacketError::UnexpectedType {
                expected: Self::TYPE,
                got: packet_type,
            });
        }
        let mut reader = Reader::new(contents);
        let packet = Self::read_contents(&mut reader)?;
        reader.finish()?;
        Ok(packet)
    }
}
