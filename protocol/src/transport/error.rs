//! Error types for the transport layer.
//!
//! Two kinds of failure live here. [`TransportError`] is returned to local
//! callers (building packets, starting a listener). [`ErrorCode`] is the
//! wire taxonomy: every inbound transfer we refuse is answered with a
//! Reject frame carrying one of these codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::details::DetailsError;
use crate::packet::{PacketError, Reject};
use crate::plugin::PluginError;

/// Errors returned by local transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("details error: {0}")]
    Details(#[from] DetailsError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a sender should treat an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// `F..`: retrying the same packet will fail again.
    Final,
    /// `T..`: may succeed later.
    Temporary,
    /// `R..`: failed because of timing, e.g. expiry.
    Relative,
}

/// ILP error codes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    BadRequest,
    Unreachable,
    InvalidAmount,
    InsufficientDestinationAmount,
    WrongCondition,
    UnexpectedPayment,
    AmountTooLarge,
    ApplicationError,
    InsufficientLiquidity,
    TransferTimedOut,
}

impl ErrorCode {
    const ALL: [ErrorCode; 10] = [
        Self::BadRequest,
        Self::Unreachable,
        Self::InvalidAmount,
        Self::InsufficientDestinationAmount,
        Self::WrongCondition,
        Self::UnexpectedPayment,
        Self::AmountTooLarge,
        Self::ApplicationError,
        Self::InsufficientLiquidity,
        Self::TransferTimedOut,
    ];

    /// The three-character wire code.
    pub fn code(self) -> &'static str {
        match self {
            Self::BadRequest => "F00",
            Self::Unreachable => "F02",
            Self::InvalidAmount => "F03",
            Self::InsufficientDestinationAmount => "F04",
            Self::WrongCondition => "F05",
            Self::UnexpectedPayment => "F06",
            Self::AmountTooLarge => "F08",
            Self::ApplicationError => "F99",
            Self::InsufficientLiquidity => "T04",
            Self::TransferTimedOut => "R00",
        }
    }

    /// The human-readable name that goes with the code.
    pub fn name(self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::Unreachable => "Unreachable",
            Self::InvalidAmount => "Invalid Amount",
            Self::InsufficientDestinationAmount => "Insufficient Destination Amount",
            Self::WrongCondition => "Wrong Condition",
            Self::UnexpectedPayment => "Unexpected Payment",
            Self::AmountTooLarge => "Amount Too Large",
            Self::ApplicationError => "Application Error",
            Self::InsufficientLiquidity => "Insufficient Liquidity",
            Self::TransferTimedOut => "Transfer Timed Out",
        }
    }

    pub fn class(self) -> ErrorClass {
        class_of(self.code())
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Build a Reject frame for this code.
    pub fn reject(self, triggered_by: impl Into<String>, message: impl Into<String>) -> Reject {
        Reject {
            code: self.code().to_string(),
            triggered_by: triggered_by.into(),
            message: message.into(),
            data: Vec::new(),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code(), self.name())
    }
}

/// Classify any three-character code by its first letter. Unknown letters
/// are treated as final.
pub fn class_of(code: &str) -> ErrorClass {
    match code.as_bytes().first() {
        Some(b'T') => ErrorClass::Temporary,
        Some(b'R') => ErrorClass::Relative,
        _ => ErrorClass::Final,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_parse_back() {
        for code in ErrorCode::ALL {
            assert_eq!(code.code().len(), 3);
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(ErrorCode::from_code("F42"), None);
    }

    #[test]
    fn classes() {
        assert_eq!(ErrorCode::WrongCondition.class(), ErrorClass::Final);
        assert_eq!(ErrorCode::InsufficientLiquidity.class(), ErrorClass::Temporary);
        assert_eq!(ErrorCode::TransferTimedOut.class(), ErrorClass::Relative);
        assert_eq!(class_of("X00"), ErrorClass::Final);
    }

    #[test]
    fn reject_frame_has_empty_data() {
        let reject = ErrorCode::InvalidAmount.reject("test.bob", "too much");
        assert_eq!(reject.code, "F03");
        assert_eq!(reject.triggered_by, "test.bob");
        assert!(reject.data.is_empty());
        assert_eq!(ErrorCode::InvalidAmount.to_string(), "F03 Invalid Amount");
    }
}
