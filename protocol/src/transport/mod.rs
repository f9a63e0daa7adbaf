//! # IPR / PSK Transport
//!
//! Building payment packets with their conditions, and receiving them.
//!
//! ```text
//! receiver.rs    long-term secret, receiver id, per-token shared secrets
//! psk.rs         packet + condition from a shared secret
//! ipr.rs         packet + condition from a receiver secret, IPR envelope
//! request.rs     JSON payment requests with canonical-JSON conditions
//! listen.rs      the incoming validation chain and the listener handle
//! error.rs       local errors and the wire error codes
//! ```
//!
//! IPR and PSK are stateless on the receiving side: the destination address
//! carries everything needed to re-derive the secret and the condition.

pub mod ipr;
pub mod listen;
pub mod psk;
pub mod receiver;
pub mod request;

mod error;

pub use error::{class_of, ErrorClass, ErrorCode, TransportError};
pub use listen::{
    listen, review_callback, BoxError, Fulfilled, IgnoreReason, IncomingPayment, ListenOptions,
    ListenSecret, Listener, Outcome, PaymentHandler, RejectReason, ReviewCallback,
};
pub use psk::{PacketAndCondition, PskPacketParams};
pub use receiver::{PskParams, Receiver};
pub use request::{canonical_json, PaymentRequest, RequestParams};
