//! Type-byte dispatch over every packet the crate understands.

use super::error::PacketError;
use super::ilqp::{
    QuoteByDestinationRequest, QuoteByDestinationResponse, QuoteBySourceRequest,
    QuoteBySourceResponse, QuoteLiquidityRequest, QuoteLiquidityResponse,
};
use super::oer::read_envelope;
use super::payment::IlpPayment;
use super::transfer::{Fulfill, Prepare, Reject};
use super::OerPacket;

/// Any packet that can arrive through a plugin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Payment(IlpPayment),
    QuoteLiquidityRequest(QuoteLiquidityRequest),
    QuoteLiquidityResponse(QuoteLiquidityResponse),
    QuoteBySourceRequest(QuoteBySourceRequest),
    QuoteBySourceResponse(QuoteBySourceResponse),
    QuoteByDestinationRequest(QuoteByDestinationRequest),
    QuoteByDestinationResponse(QuoteByDestinationResponse),
    Prepare(Prepare),
    Fulfill(Fulfill),
    Reject(Reject),
}

impl Frame {
    /// Parse any known envelope.
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        let (packet_type, _) = read_envelope(bytes)?;
        Ok(match packet_type {
            IlpPayment::TYPE => Self::Payment(IlpPayment::from_oer(bytes)?),
            QuoteLiquidityRequest::TYPE => {
                Self::QuoteLiquidityRequest(QuoteLiquidityRequest::from_oer(bytes)?)
            }
            QuoteLiquidityResponse::TYPE => {
                Self::QuoteLiquidityResponse(QuoteLiquidityResponse::from_oer(bytes)?)
            }
            QuoteBySourceRequest::TYPE => {
                Self::QuoteBySourceRequest(QuoteBySourceRequest::from_oer(bytes)?)
            }
            QuoteBySourceResponse::TYPE => {
                Self::QuoteBySourceResponse(QuoteBySourceResponse::from_oer(bytes)?)
            }
            QuoteByDestinationRequest::TYPE => {
                Self::QuoteByDestinationRequest(QuoteByDestinationRequest::from_oer(bytes)?)
            }
            QuoteByDestinationResponse::TYPE => {
                Self::QuoteByDestinationResponse(QuoteByDestinationResponse::from_oer(bytes)?)
            }
            Prepare::TYPE => Self::Prepare(Prepare::from_oer(bytes)?),
            Fulfill::TYPE => Self::Fulfill(Fulfill::from_oer(bytes)?),
            Reject::TYPE => Self::Reject(Reject::from_oer(bytes)?),
            other => return Err(PacketError::UnknownType(other)),
        })
    }

    pub fn to_oer(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Self::Payment(p) => p.to_oer(),
            Self::QuoteLiquidityRequest(p) => p.to_oer(),
            Self::QuoteLiquidityResponse(p) => p.to_oer(),
            Self::QuoteBySourceRequest(p) => p.to_oer(),
            Self::QuoteBySourceResponse(p) => p.to_oer(),
            Self::QuoteByDestinationRequest(p) => p.to_oer(),
            Self::QuoteByDestinationResponse(p) => p.to_oer(),
            Self::Prepare(p) => p.to_oer(),
            Self::Fulfill(p) => p.to_oer(),
            Self::Reject(p) => p.to_oer(),
        }
    }

    /// Short human-readable name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Payment(_) => "payment",
            Self::QuoteLiquidityRequest(_) => "quote_liquidity_request",
            Self::QuoteLiquidityResponse(_) => "quote_liquidity_response",
            Self::QuoteBySourceRequest(_) => "quote_by_source_request",
            Self::QuoteBySourceResponse(_) => "quote_by_source_response",
            Self::QuoteByDestinationRequest(_) => "quote_by_destination_request",
            Self::QuoteByDestinationResponse(_) => "quote_by_destination_response",
            Self::Prepare(_) => "prepare",
            Self::Fulfill(_) => "fulfill",
            Self::Reject(_) => "reject",
        }
    }
}

impl From<Reject> for Frame {
    fn from(reject: Reject) -> Self {
        Self::Reject(reject)
    }
}

impl From<Fulfill> for Frame {
    fn from(fulfill: Fulfill) -> Self {
        Self::Fulfill(fulfill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_type_byte() {
        let fulfill = Fulfill {
            fulfillment: [1u8; 32],
            data: Vec::new(),
        };
        let bytes = fulfill.to_oer().unwrap();
        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.kind(), "fulfill");
        assert_eq!(frame, Frame::Fulfill(fulfill));
        assert_eq!(frame.to_oer().unwrap(), bytes);
    }

    #[test]
    fn unknown_type() {
        assert_eq!(
            Frame::parse(&[99, 0]),
            Err(PacketError::UnknownType(99))
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(Frame::parse(&[]).is_err());
        assert!(Frame::parse(&[12, 5, 0]).is_err());
    }
}
