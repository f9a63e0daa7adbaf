//! PSK2 chunk framing.
//!
//! ```text
//! chunk:    [type:u8 Chunk=0|LastChunk=1|Quote=2][paymentId:16][destinationAmount:u64][data…]
//! response: [type:u8 Fulfillment=4|Error=5][paymentId:16][amount:u64]
//! ```
//!
//! Both are sealed under the shared secret before they leave the process.
//! The chunk's fulfillment is an HMAC over the sealed bytes, so it cannot be
//! lifted from one chunk and reused on another.

use crate::config::{CONDITION_LENGTH, PAYMENT_ID_LENGTH, PSK2_FULFILLMENT_STRING};
use crate::crypto;
use crate::packet::oer::{Reader, Writer};

use super::error::Psk2Error;

pub type PaymentId = [u8; PAYMENT_ID_LENGTH];

/// What a chunk asks of the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkType {
    Chunk = 0,
    LastChunk = 1,
    /// Rate quote; always rejected with the amount that arrived.
    Quote = 2,
}

impl TryFrom<u8> for ChunkType {
    type Error = Psk2Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Chunk),
            1 => Ok(Self::LastChunk),
            2 => Ok(Self::Quote),
            other => Err(Psk2Error::MalformedChunk(format!("unknown chunk type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseType {
    Fulfillment = 4,
    Error = 5,
}

impl TryFrom<u8> for ResponseType {
    type Error = Psk2Error;

    fn try_from(value: u8) -> Result<Self, Psk2Error> {
        match value {
            4 => Ok(Self::Fulfillment),
            5 => Ok(Self::Error),
            other => Err(Psk2Error::MalformedChunk(format!("unknown response type {other}"))),
        }
    }
}

/// Plaintext of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_type: ChunkType,
    pub payment_id: PaymentId,
    /// Total the sender wants delivered; 0 when the source amount drives.
    pub destination_amount: u64,
    pub data: Vec<u8>,
}

/// Plaintext of a receiver response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkResponse {
    pub response_type: ResponseType,
    pub payment_id: PaymentId,
    /// Running total for fulfillments, amount that arrived for quote rejects.
    pub amount: u64,
}

fn read_payment_id(reader: &mut Reader<'_>) -> Result<PaymentId, Psk2Error> {
    let mut id = [0u8; PAYMENT_ID_LENGTH];
    id.copy_from_slice(reader.read_octet_string(PAYMENT_ID_LENGTH)?);
    Ok(id)
}

impl ChunkHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u8(self.chunk_type as u8);
        writer.write_octet_string(&self.payment_id);
        writer.write_u64(self.destination_amount);
        writer.write_octet_string(&self.data);
        writer.into_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Psk2Error> {
        let mut reader = Reader::new(bytes);
        let chunk_type = ChunkType::try_from(reader.read_u8()?)?;
        let payment_id = read_payment_id(&mut reader)?;
        let destination_amount = reader.read_u64()?;
        let data = reader.read_octet_string(reader.remaining())?.to_vec();
        Ok(Self {
            chunk_type,
            payment_id,
            destination_amount,
            data,
        })
    }
}

impl ChunkResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.write_u8(self.response_type as u8);
        writer.write_octet_string(&self.payment_id);
        writer.write_u64(self.amount);
        writer.into_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Psk2Error> {
        let mut reader = Reader::new(bytes);
        let response_type = ResponseType::try_from(reader.read_u8()?)?;
        let payment_id = read_payment_id(&mut reader)?;
        let amount = reader.read_u64()?;
        reader.finish()?;
        Ok(Self {
            response_type,
            payment_id,
            amount,
        })
    }
}

pub fn seal_chunk(secret: &[u8], header: &ChunkHeader) -> Result<Vec<u8>, Psk2Error> {
    Ok(crypto::seal(secret, &header.to_bytes())?)
}

pub fn open_chunk(secret: &[u8], sealed: &[u8]) -> Result<ChunkHeader, Psk2Error> {
    ChunkHeader::from_bytes(&crypto::open(secret, sealed)?)
}

pub fn seal_response(secret: &[u8], response: &ChunkResponse) -> Result<Vec<u8>, Psk2Error> {
    Ok(crypto::seal(secret, &response.to_bytes())?)
}

pub fn open_response(secret: &[u8], sealed: &[u8]) -> Result<ChunkResponse, Psk2Error> {
    ChunkResponse::from_bytes(&crypto::open(secret, sealed)?)
}

/// `HMAC(HMAC(secret, "ilp_psk2_fulfillment"), sealed)`.
pub fn fulfillment_for(secret: &[u8], sealed: &[u8]) -> Result<[u8; CONDITION_LENGTH], Psk2Error> {
    let key = crypto::hmac(secret, PSK2_FULFILLMENT_STRING)?;
    Ok(crypto::hmac(&key, sealed)?)
}
