//! # PSK Details Envelope
//!
//! The data field of a PSK payment packet is a small text/binary hybrid:
//!
//! ```text
//! PSK/1.0
//! Nonce: <base64url, 16 bytes>
//! Encryption: aes-256-gcm <base64url tag>      (or: none)
//! <public headers...>
//!
//! <body>
//! ```
//!
//! The body is itself an envelope without a status line (the *private*
//! envelope: private headers, blank line, application data), encrypted with
//! AES-256-GCM under a key derived from the shared secret, using the
//! `Nonce` header as IV.
//!
//! Connectors can read the public headers. Only the receiver can read the
//! private ones.
//!
//! ## Header hygiene
//!
//! Header names may not contain `\n` or `:` and values may not contain `\n`.
//! Anything else would let a caller forge extra headers or split the body
//! early. `Nonce` and `Encryption` are set by this module and cannot be
//! supplied by the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::config::{
    AUTH_TAG_LENGTH, DETAILS_NONCE_LENGTH, PSK_ENCRYPTION_ALGORITHM, PSK_ENCRYPTION_NONE,
    PSK_STATUS_LINE, PSK_STATUS_PREFIX,
};
use crate::crypto::{self, CryptoError};
use crate::encoding;
use crate::packet::{IlpPayment, OerPacket, PacketError};

const NONCE_HEADER: &str = "Nonce";
const ENCRYPTION_HEADER: &str = "Encryption";
const KEY_HEADER: &str = "Key";
const DELIMITER: &[u8] = b"\n\n";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DetailsError {
    /// A header name or value would break the envelope framing.
    #[error("header injection in {header:?}")]
    HeaderInjection { header: String },

    /// The caller tried to set a header this module owns.
    #[error("header {0:?} is reserved")]
    ReservedHeader(String),

    #[error("unsupported status line: {0:?}")]
    UnsupportedStatus(String),

    #[error("missing Nonce header")]
    MissingNonce,

    /// Legacy key-derivation scheme announced by a `Key` header.
    #[error("unsupported key derivation")]
    UnsupportedKeyDerivation,

    #[error("unsupported encryption: {0:?}")]
    UnsupportedEncryption(String),

    #[error("details are encrypted but no secret was given")]
    MissingSecret,

    /// Authentication failed, or the decrypted body is not an envelope.
    #[error("corrupted ciphertext")]
    CorruptedCiphertext,

    #[error("malformed details: {0}")]
    Malformed(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("packet error: {0}")]
    Packet(#[from] PacketError),
}

// ---------------------------------------------------------------------------
// Headers
// ---------------------------------------------------------------------------

/// An ordered header list. Lookups ignore ASCII case; the original spelling
/// is kept for serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any existing header with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn validate(&self) -> Result<(), DetailsError> {
        for (name, value) in self.iter() {
            if name.contains(['\n', ':']) || value.contains('\n') {
                return Err(DetailsError::HeaderInjection {
                    header: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn write_lines(&self, out: &mut Vec<u8>) {
        for (name, value) in self.iter() {
            out.push(b'\n');
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
        }
    }

    fn parse_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Self, DetailsError> {
        let mut headers = Self::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| DetailsError::Malformed(format!("header line without colon: {line:?}")))?;
            let value = value.strip_prefix(' ').unwrap_or(value);
            headers.entries.push((name.to_string(), value.to_string()));
        }
        Ok(headers)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Inputs to [`create_details`].
#[derive(Clone, Copy, Debug)]
pub struct CreateDetails<'a> {
    /// Private headers, readable only by the receiver.
    pub headers: &'a Headers,
    /// Public headers, readable by every hop.
    pub public_headers: &'a Headers,
    pub secret: &'a [u8],
    pub data: &'a [u8],
    pub disable_encryption: bool,
}

/// Build a details envelope. A fresh nonce is drawn on every call.
pub fn create_details(params: CreateDetails<'_>) -> Result<Vec<u8>, DetailsError> {
    params.headers.validate()?;
    params.public_headers.validate()?;
    for reserved in [NONCE_HEADER, ENCRYPTION_HEADER] {
        if params.public_headers.contains(reserved) {
            return Err(DetailsError::ReservedHeader(reserved.to_string()));
        }
    }

    let mut private = Vec::with_capacity(params.data.len() + 64);
    params.headers.write_lines(&mut private);
    // write_lines prefixes every line with '\n'; the private block has no
    // status line to hang the first one on.
    if !private.is_empty() {
        private.remove(0);
    }
    private.extend_from_slice(DELIMITER);
    private.extend_from_slice(params.data);

    let nonce = crypto::random_bytes::<DETAILS_NONCE_LENGTH>();
    let (encryption, body) = if params.disable_encryption {
        (PSK_ENCRYPTION_NONE.to_string(), private)
    } else {
        crypto::validate_shared_secret(params.secret)?;
        let (tag, ciphertext) = crypto::encrypt(params.secret, &nonce, &private)?;
        (
            format!("{PSK_ENCRYPTION_ALGORITHM} {}", encoding::encode(tag)),
            ciphertext,
        )
    };

    let mut out = Vec::with_capacity(body.len() + 128);
    out.extend_from_slice(PSK_STATUS_LINE.as_bytes());
    Headers::new()
        .with(NONCE_HEADER, encoding::encode(nonce))
        .with(ENCRYPTION_HEADER, encryption)
        .write_lines(&mut out);
    params.public_headers.write_lines(&mut out);
    out.extend_from_slice(DELIMITER);
    out.extend_from_slice(&body);

    trace!(
        len = out.len(),
        encrypted = !params.disable_encryption,
        "details envelope created"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// A decoded details envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedDetails {
    /// Every public header, including `Nonce` and `Encryption`.
    pub public_headers: Headers,
    pub headers: Headers,
    pub data: Vec<u8>,
}

fn split_envelope(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let at = bytes.windows(DELIMITER.len()).position(|w| w == DELIMITER)?;
    Some((&bytes[..at], &bytes[at + DELIMITER.len()..]))
}

/// Parse a details envelope, decrypting the private part with `secret`.
pub fn parse_details(details: &[u8], secret: Option<&[u8]>) -> Result<ParsedDetails, DetailsError> {
    let (head, body) = split_envelope(details)
        .ok_or_else(|| DetailsError::Malformed("missing header delimiter".to_string()))?;
    let head = std::str::from_utf8(head)
        .map_err(|_| DetailsError::Malformed("header block is not UTF-8".to_string()))?;

    let mut lines = head.split('\n');
    let status = lines.next().unwrap_or_default();
    if !status.starts_with(PSK_STATUS_PREFIX) {
        return Err(DetailsError::UnsupportedStatus(status.to_string()));
    }
    let public_headers = Headers::parse_lines(lines)?;

    if public_headers.contains(KEY_HEADER) {
        return Err(DetailsError::UnsupportedKeyDerivation);
    }
    let nonce_text = public_headers
        .get(NONCE_HEADER)
        .ok_or(DetailsError::MissingNonce)?;
    let nonce: [u8; DETAILS_NONCE_LENGTH] = encoding::decode(nonce_text)
        .ok()
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(|| DetailsError::Malformed(format!("invalid nonce: {nonce_text:?}")))?;

    let encryption = public_headers.get(ENCRYPTION_HEADER).unwrap_or_default();
    let private = if encryption == PSK_ENCRYPTION_NONE {
        body.to_vec()
    } else {
        let tag_text = encryption
            .strip_prefix(PSK_ENCRYPTION_ALGORITHM)
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or_else(|| DetailsError::UnsupportedEncryption(encryption.to_string()))?;
        let secret = secret.ok_or(DetailsError::MissingSecret)?;
        let tag: [u8; AUTH_TAG_LENGTH] = encoding::decode(tag_text)
            .ok()
            .and_then(|raw| raw.try_into().ok())
            .ok_or(DetailsError::CorruptedCiphertext)?;
        crypto::decrypt(secret, &nonce, &tag, body).map_err(|_| DetailsError::CorruptedCiphertext)?
    };

    let (private_head, data) = split_envelope(&private).ok_or(DetailsError::CorruptedCiphertext)?;
    let private_head =
        std::str::from_utf8(private_head).map_err(|_| DetailsError::CorruptedCiphertext)?;
    let headers = if private_head.is_empty() {
        Headers::new()
    } else {
        Headers::parse_lines(private_head.split('\n')).map_err(|_| DetailsError::CorruptedCiphertext)?
    };

    Ok(ParsedDetails {
        public_headers,
        headers,
        data: data.to_vec(),
    })
}

/// A payment packet with its details already opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketAndDetails {
    pub account: String,
    pub amount: u64,
    pub public_headers: Headers,
    pub headers: Headers,
    pub data: Vec<u8>,
}

/// Parse a serialized [`IlpPayment`] and open its details envelope.
pub fn parse_packet_and_details(
    packet: &[u8],
    secret: Option<&[u8]>,
) -> Result<PacketAndDetails, DetailsError> {
    let payment = IlpPayment::from_oer(packet)?;
    let details = parse_details(&payment.data, secret)?;
    Ok(PacketAndDetails {
        account: payment.account,
        amount: payment.amount,
        public_headers: details.public_headers,
        headers: details.headers,
        data: details.data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 16] = [7u8; 16];

    fn create(headers: &Headers, public_headers: &Headers, data: &[u8]) -> Result<Vec<u8>, DetailsError> {
        create_details(CreateDetails {
            headers,
            public_headers,
            secret: &SECRET,
            data,
            disable_encryption: false,
        })
    }

    #[test]
    fn encrypted_roundtrip() {
        let headers = Headers::new().with("Expires-At", "2030-01-01T00:00:00.000Z");
        let public = Headers::new().with("Payment-Id", "abc");
        let details = create(&headers, &public, b"hello world").unwrap();

        assert!(details.starts_with(b"PSK/1.0\nNonce: "));
        let parsed = parse_details(&details, Some(&SECRET)).unwrap();
        assert_eq!(parsed.headers, headers);
        assert_eq!(parsed.data, b"hello world");
        assert_eq!(parsed.public_headers.get("payment-id"), Some("abc"));
        assert!(parsed
            .public_headers
            .get("encryption")
            .unwrap()
            .starts_with("aes-256-gcm "));
    }

    #[test]
    fn private_data_is_not_visible() {
        let details = create(&Headers::new(), &Headers::new(), b"top secret").unwrap();
        assert!(!details.windows(10).any(|w| w == b"top secret"));
    }

    #[test]
    fn plaintext_roundtrip() {
        let headers = Headers::new().with("A", "1").with("B", "two words");
        let details = create_details(CreateDetails {
            headers: &headers,
            public_headers: &Headers::new(),
            secret: &[],
            data: b"\n\nbinary\x00",
            disable_encryption: true,
        })
        .unwrap();
        let parsed = parse_details(&details, None).unwrap();
        assert_eq!(parsed.public_headers.get("Encryption"), Some("none"));
        assert_eq!(parsed.headers, headers);
        assert_eq!(parsed.data, b"\n\nbinary\x00");
    }

    #[test]
    fn header_values_keep_surrounding_whitespace() {
        let headers = Headers::new()
            .with("Memo", "  indented")
            .with("Note", " one space")
            .with("Empty", "")
            .with("Trailing", "value  ");
        let public = Headers::new().with("Tag", "   x");
        let details = create(&headers, &public, b"").unwrap();

        let parsed = parse_details(&details, Some(&SECRET)).unwrap();
        assert_eq!(parsed.headers, headers);
        assert_eq!(parsed.headers.get("memo"), Some("  indented"));
        assert_eq!(parsed.public_headers.get("tag"), Some("   x"));
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let a = parse_details(&create(&Headers::new(), &Headers::new(), b"x").unwrap(), Some(&SECRET)).unwrap();
        let b = parse_details(&create(&Headers::new(), &Headers::new(), b"x").unwrap(), Some(&SECRET)).unwrap();
        assert_ne!(a.public_headers.get("Nonce"), b.public_headers.get("Nonce"));
    }

    #[test]
    fn every_ciphertext_bit_flip_is_detected() {
        let headers = Headers::new().with("X", "y");
        let details = create(&headers, &Headers::new(), b"payload").unwrap();
        let (head, body) = split_envelope(&details).unwrap();
        let body_start = head.len() + 2;
        for i in 0..body.len() {
            for bit in 0..8 {
                let mut tampered = details.clone();
                tampered[body_start + i] ^= 1 << bit;
                assert_eq!(
                    parse_details(&tampered, Some(&SECRET)),
                    Err(DetailsError::CorruptedCiphertext)
                );
            }
        }
    }

    #[test]
    fn tag_tampering_is_detected() {
        let details = create(&Headers::new(), &Headers::new(), b"payload").unwrap();
        let parsed_public = parse_details(&details, Some(&SECRET)).unwrap().public_headers;
        let tag_text = parsed_public.get("Encryption").unwrap().split(' ').nth(1).unwrap();
        let mut tag = encoding::decode(tag_text).unwrap();
        tag[0] ^= 0x01;
        let forged_tag = encoding::encode(&tag);

        let text = details.clone();
        let original = format!("aes-256-gcm {tag_text}");
        let forged = format!("aes-256-gcm {forged_tag}");
        let at = text
            .windows(original.len())
            .position(|w| w == original.as_bytes())
            .unwrap();
        let mut tampered = text[..at].to_vec();
        tampered.extend_from_slice(forged.as_bytes());
        tampered.extend_from_slice(&text[at + original.len()..]);

        assert_eq!(
            parse_details(&tampered, Some(&SECRET)),
            Err(DetailsError::CorruptedCiphertext)
        );
    }

    #[test]
    fn wrong_secret_is_corrupted_ciphertext() {
        let details = create(&Headers::new(), &Headers::new(), b"payload").unwrap();
        assert_eq!(
            parse_details(&details, Some(&[8u8; 16])),
            Err(DetailsError::CorruptedCiphertext)
        );
        assert_eq!(parse_details(&details, None), Err(DetailsError::MissingSecret));
    }

    #[test]
    fn header_injection_is_refused() {
        let evil_value = Headers::new().with("Foo", "bar\nNonce: x");
        assert_eq!(
            create(&evil_value, &Headers::new(), b""),
            Err(DetailsError::HeaderInjection {
                header: "Foo".to_string()
            })
        );
        let evil_name = Headers::new().with("Fo:o", "bar");
        assert!(matches!(
            create(&Headers::new(), &evil_name, b""),
            Err(DetailsError::HeaderInjection { .. })
        ));
    }

    #[test]
    fn reserved_public_headers() {
        for name in ["Nonce", "nonce", "Encryption"] {
            let public = Headers::new().with(name, "x");
            assert!(matches!(
                create(&Headers::new(), &public, b""),
                Err(DetailsError::ReservedHeader(_))
            ));
        }
    }

    #[test]
    fn status_and_header_checks() {
        assert_eq!(
            parse_details(b"PSK/2.0\nNonce: AAAAAAAAAAAAAAAAAAAAAA\nEncryption: none\n\n\n\n", None),
            Err(DetailsError::UnsupportedStatus("PSK/2.0".to_string()))
        );
        assert!(parse_details(b"PSK/1.1\nNonce: AAAAAAAAAAAAAAAAAAAAAA\nEncryption: none\n\n\n\nok", None).is_ok());
        assert_eq!(
            parse_details(b"PSK/1.0\nEncryption: none\n\n\n\n", None),
            Err(DetailsError::MissingNonce)
        );
        assert_eq!(
            parse_details(b"PSK/1.0\nNonce: AAAAAAAAAAAAAAAAAAAAAA\nKey: hmac-sha-256 x\nEncryption: none\n\n\n\n", None),
            Err(DetailsError::UnsupportedKeyDerivation)
        );
        assert_eq!(
            parse_details(b"PSK/1.0\nNonce: AAAAAAAAAAAAAAAAAAAAAA\nEncryption: aes-128-cbc x\n\nbody", Some(&SECRET)),
            Err(DetailsError::UnsupportedEncryption("aes-128-cbc x".to_string()))
        );
        assert!(matches!(
            parse_details(b"PSK/1.0\nNonce: AAAAAAAAAAAAAAAAAAAAAA", None),
            Err(DetailsError::Malformed(_))
        ));
        assert!(matches!(
            parse_details(b"PSK/1.0\nbogus line\n\n", None),
            Err(DetailsError::Malformed(_))
        ));
    }

    #[test]
    fn header_lookup_ignores_case_but_keeps_spelling() {
        let mut headers = Headers::new().with("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        headers.insert("CONTENT-TYPE", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().next(), Some(("Content-Type", "application/json")));
        assert_eq!(headers.remove("content-type"), Some("application/json".to_string()));
        assert!(headers.is_empty());
    }

    #[test]
    fn packet_and_details() {
        let headers = Headers::new().with("Memo", "rent");
        let data = create(&headers, &Headers::new(), b"app").unwrap();
        let packet = IlpPayment {
            account: "test.alice.xyz".to_string(),
            amount: 42,
            data,
        }
        .to_oer()
        .unwrap();

        let parsed = parse_packet_and_details(&packet, Some(&SECRET)).unwrap();
        assert_eq!(parsed.account, "test.alice.xyz");
        assert_eq!(parsed.amount, 42);
        assert_eq!(parsed.headers.get("memo"), Some("rent"));
        assert_eq!(parsed.data, b"app");

        assert!(matches!(
            parse_packet_and_details(b"\x01\x00", Some(&SECRET)),
            Err(DetailsError::Packet(_))
        ));
    }
}
