// Copyright (c) 2026 ILP Transport Contributors. MIT License.
// See LICENSE for details.

//! # ILP Transport Core Library
//!
//! The protocol core that sits between an application and an Interledger
//! ledger plugin: it decides which condition gates a payment, how the
//! receiver recognises and fulfills it, how quotes are obtained and how a
//! large payment is split into adaptively sized chunks.
//!
//! Everything a receiver needs to recognise a payment is derived from its
//! long-term secret and the destination address. There is no session
//! database; the only transient state is the PSK2 per-payment ledger.
//!
//! ## Architecture
//!
//! - **config**: Protocol constants and derivation labels.
//! - **encoding**: base64url, used by addresses, headers and condition URIs.
//! - **crypto**: HMAC derivations, condition hashing, AES-256-GCM.
//! - **packet**: OER codecs: ILP payments, ILQP, transfer frames, IPR.
//! - **details**: The PSK/1.0 public/private header envelope.
//! - **plugin**: The ledger plugin seam plus an in-process loopback pair.
//! - **events**: Typed dispatch of incoming-payment notifications.
//! - **transport**: IPR/PSK packet+condition creation and the receive path.
//! - **ilqp**: Interledger quoting against connectors.
//! - **psk2**: Chunked payments with quote-via-rejection.
//!
//! ## Ground rules
//!
//! 1. Inbound validation never panics and never propagates: it produces a
//!    typed outcome that becomes a reject frame.
//! 2. A fulfillment is only released after `SHA-256(fulfillment)` matches the
//!    transfer's condition bit for bit.
//! 3. Every encrypted payload is authenticated.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod details;
pub mod encoding;
pub mod events;
pub mod ilqp;
pub mod packet;
pub mod plugin;
pub mod psk2;
pub mod transport;
