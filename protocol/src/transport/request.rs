//! # Interactive Payment Requests
//!
//! A JSON payment request whose condition is an HMAC over its canonical
//! serialization:
//!
//! ```text
//! fulfillment = HMAC(HMAC(receiverSecret, "ilp_ipr_condition"), canonical_json(request))
//! ```
//!
//! Canonical form is part of the wire contract, so it is spelled out here
//! rather than left to a serializer's defaults:
//!
//! - object keys sorted by Unicode code point (UTF-8 byte order),
//! - no whitespace outside strings,
//! - amounts as decimal strings,
//! - timestamps as RFC 3339 UTC with milliseconds and a `Z` suffix,
//! - strings escaped the way `serde_json` escapes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::{CONDITION_LENGTH, IPR_CONDITION_STRING};
use crate::crypto;

use super::error::TransportError;
use super::ipr::format_expiry;
use super::receiver::Receiver;

/// A payment request as handed to a sender.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub address: String,
    #[serde(with = "decimal_string")]
    pub amount: u64,
    #[serde(with = "millis_rfc3339")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Inputs to [`Receiver::create_request`].
#[derive(Clone, Debug)]
pub struct RequestParams {
    /// The receiver's ledger account; a derived suffix is appended.
    pub destination_account: String,
    pub amount: u64,
    pub expires_at: DateTime<Utc>,
    pub data: Value,
    /// Defaults to a fresh v4 UUID.
    pub id: Option<Uuid>,
}

/// Serialize `request` canonically.
pub fn canonical_json(request: &PaymentRequest) -> Result<String, TransportError> {
    let value = serde_json::to_value(request)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

fn fulfillment_for(
    receiver_secret: &[u8],
    request: &PaymentRequest,
) -> Result<[u8; CONDITION_LENGTH], TransportError> {
    let key = crypto::hmac(receiver_secret, IPR_CONDITION_STRING)?;
    let canonical = canonical_json(request)?;
    Ok(crypto::hmac(&key, canonical.as_bytes())?)
}

impl Receiver {
    /// Build a payment request and its condition.
    pub fn create_request(
        &self,
        params: RequestParams,
    ) -> Result<(PaymentRequest, [u8; CONDITION_LENGTH]), TransportError> {
        let psk = self.generate_psk_params(&params.destination_account)?;
        let request = PaymentRequest {
            id: params.id.unwrap_or_else(Uuid::new_v4),
            address: psk.destination_account,
            amount: params.amount,
            expires_at: params.expires_at,
            data: params.data,
        };
        let condition = crypto::hash_condition(&self.fulfillment_for_request(&request)?);
        Ok((request, condition))
    }

    /// Recompute the fulfillment for a request this receiver issued.
    pub fn fulfillment_for_request(
        &self,
        request: &PaymentRequest,
    ) -> Result<[u8; CONDITION_LENGTH], TransportError> {
        fulfillment_for(self.secret(), request)
    }
}

mod decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        crate::packet::parse_amount(&text).map_err(serde::de::Error::custom)
    }
}

mod millis_rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_expiry(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn request() -> PaymentRequest {
        PaymentRequest {
            id: Uuid::parse_str("1b5e1b2e-7f2c-4a8e-9d1a-0c2f7e8a6b3d").unwrap(),
            address: "test.alice.abc".to_string(),
            amount: 1000,
            expires_at: Utc.with_ymd_and_hms(2030, 5, 6, 7, 8, 9).unwrap(),
            data: json!({ "zeta": [1, { "b": 2, "a": "é" }], "alpha": true }),
        }
    }

    #[test]
    fn canonical_form() {
        assert_eq!(
            canonical_json(&request()).unwrap(),
            r#"{"address":"test.alice.abc","amount":"1000","data":{"alpha":true,"zeta":[1,{"a":"é","b":2}]},"expires_at":"2030-05-06T07:08:09.000Z","id":"1b5e1b2e-7f2c-4a8e-9d1a-0c2f7e8a6b3d"}"#
        );
    }

    #[test]
    fn null_data_is_omitted() {
        let mut bare = request();
        bare.data = Value::Null;
        assert!(!canonical_json(&bare).unwrap().contains("data"));
    }

    #[test]
    fn condition_is_deterministic_and_field_sensitive() {
        let receiver = Receiver::new(&[6u8; 32]).unwrap();
        let base = request();
        let f = receiver.fulfillment_for_request(&base).unwrap();
        assert_eq!(f, receiver.fulfillment_for_request(&base).unwrap());

        let variants = [
            PaymentRequest { amount: 1001, ..base.clone() },
            PaymentRequest { address: "test.alice.abd".to_string(), ..base.clone() },
            PaymentRequest { id: Uuid::nil(), ..base.clone() },
            PaymentRequest { expires_at: base.expires_at + chrono::Duration::milliseconds(1), ..base.clone() },
            PaymentRequest { data: json!({ "alpha": false }), ..base.clone() },
        ];
        for variant in variants {
            assert_ne!(receiver.fulfillment_for_request(&variant).unwrap(), f);
        }

        let other = Receiver::new(&[7u8; 32]).unwrap();
        assert_ne!(other.fulfillment_for_request(&base).unwrap(), f);
    }

    #[test]
    fn create_request_condition_verifies() {
        let receiver = Receiver::new(&[6u8; 32]).unwrap();
        let (request, condition) = receiver
            .create_request(RequestParams {
                destination_account: "test.alice".to_string(),
                amount: 5,
                expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                data: Value::Null,
                id: None,
            })
            .unwrap();
        assert!(request.address.starts_with("test.alice."));
        let fulfillment = receiver.fulfillment_for_request(&request).unwrap();
        assert!(crypto::verify_fulfillment(&fulfillment, &condition));
    }

    #[test]
    fn json_roundtrip_preserves_condition() {
        let receiver = Receiver::new(&[6u8; 32]).unwrap();
        let original = request();
        let text = serde_json::to_string(&original).unwrap();
        let parsed: PaymentRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(
            receiver.fulfillment_for_request(&parsed).unwrap(),
            receiver.fulfillment_for_request(&original).unwrap()
        );
    }
}
