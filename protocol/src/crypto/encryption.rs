//! # AES-256-GCM
//!
//! Two framings share one cipher:
//!
//! - **Details envelope** ([`encrypt`] / [`decrypt`]): the caller owns the
//!   16-byte nonce (it travels in the `Nonce` header) and the tag is returned
//!   separately (it travels in the `Encryption` header). The key is
//!   `HMAC(secret, "ilp_key_encryption")`. GCM with a 128-bit IV is what the
//!   PSK/1.0 wire format specifies, so we instantiate `AesGcm<Aes256, U16>`
//!   rather than the usual 96-bit variant.
//!
//! - **PSK2 chunk data** ([`seal`] / [`open`]): a random 12-byte nonce and the
//!   tag are packed in front of the ciphertext as `nonce || tag || ciphertext`.
//!   The key is `HMAC(secret, "ilp_psk2_encryption")`.
//!
//! Nonces are always drawn from the OS CSPRNG. There is no unauthenticated
//! mode and no deterministic-nonce mode.

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    Aes256Gcm, AesGcm,
};
use rand::RngCore;

use crate::config::{
    AUTH_TAG_LENGTH, DETAILS_NONCE_LENGTH, PSK2_ENCRYPTION_STRING, PSK2_NONCE_LENGTH,
    PSK_ENCRYPTION_STRING,
};

use super::error::CryptoError;
use super::kdf::hmac;

/// AES-256-GCM with a 128-bit IV, as used by the details envelope.
type Aes256Gcm128 = AesGcm<Aes256, U16>;

/// `N` bytes from the OS CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Encrypt `plaintext` for the details envelope.
///
/// Returns `(tag, ciphertext)`; the ciphertext has the same length as the
/// plaintext.
pub fn encrypt(
    secret: &[u8],
    nonce: &[u8; DETAILS_NONCE_LENGTH],
    plaintext: &[u8],
) -> Result<([u8; AUTH_TAG_LENGTH], Vec<u8>), CryptoError> {
    let key = hmac(secret, PSK_ENCRYPTION_STRING)?;
    let cipher = Aes256Gcm128::new_from_slice(&key).map_err(|_| CryptoError::InvalidKeyLength)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; AUTH_TAG_LENGTH];
    tag_bytes.copy_from_slice(&tag);
    Ok((tag_bytes, buffer))
}

/// Decrypt details-envelope ciphertext, verifying the tag.
pub fn decrypt(
    secret: &[u8],
    nonce: &[u8; DETAILS_NONCE_LENGTH],
    tag: &[u8; AUTH_TAG_LENGTH],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let key = hmac(secret, PSK_ENCRYPTION_STRING)?;
    let cipher = Aes256Gcm128::new_from_slice(&key).map_err(|_| CryptoError::InvalidKeyLength)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(buffer)
}

/// Seal PSK2 chunk data: `nonce || tag || ciphertext`.
pub fn seal(secret: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = hmac(secret, PSK2_ENCRYPTION_STRING)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKeyLength)?;

    let nonce = random_bytes::<PSK2_NONCE_LENGTH>();
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(PSK2_NONCE_LENGTH + AUTH_TAG_LENGTH + buffer.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Open data produced by [`seal`].
pub fn open(secret: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < PSK2_NONCE_LENGTH + AUTH_TAG_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, rest) = sealed.split_at(PSK2_NONCE_LENGTH);
    let (tag, ciphertext) = rest.split_at(AUTH_TAG_LENGTH);

    let key = hmac(secret, PSK2_ENCRYPTION_STRING)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKeyLength)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag),
        )
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; 16] = [3u8; 16];

    #[test]
    fn test_detached_roundtrip() {
        let nonce = random_bytes::<DETAILS_NONCE_LENGTH>();
        let (tag, ciphertext) = encrypt(&SECRET, &nonce, b"private details").unwrap();
        assert_eq!(ciphertext.len(), b"private details".len());

        let plaintext = decrypt(&SECRET, &nonce, &tag, &ciphertext).unwrap();
        assert_eq!(plaintext, b"private details");
    }

    #[test]
    fn test_detached_tag_tamper_fails() {
        let nonce = random_bytes::<DETAILS_NONCE_LENGTH>();
        let (mut tag, ciphertext) = encrypt(&SECRET, &nonce, b"payload").unwrap();
        tag[0] ^= 0x01;
        assert_eq!(
            decrypt(&SECRET, &nonce, &tag, &ciphertext),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_detached_wrong_secret_fails() {
        let nonce = random_bytes::<DETAILS_NONCE_LENGTH>();
        let (tag, ciphertext) = encrypt(&SECRET, &nonce, b"payload").unwrap();
        assert!(decrypt(&[4u8; 16], &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn test_seal_layout_and_roundtrip() {
        let sealed = seal(&SECRET, b"chunk").unwrap();
        assert_eq!(sealed.len(), PSK2_NONCE_LENGTH + AUTH_TAG_LENGTH + 5);
        assert_eq!(open(&SECRET, &sealed).unwrap(), b"chunk");
    }

    #[test]
    fn test_seal_uses_fresh_nonces() {
        let a = seal(&SECRET, b"same").unwrap();
        let b = seal(&SECRET, b"same").unwrap();
        assert_ne!(a[..PSK2_NONCE_LENGTH], b[..PSK2_NONCE_LENGTH]);
    }

    #[test]
    fn test_open_rejects_tampering_and_truncation() {
        let mut sealed = seal(&SECRET, b"chunk").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x80;
        assert!(open(&SECRET, &sealed).is_err());
        assert!(open(&SECRET, &[0u8; 10]).is_err());
    }

    #[test]
    fn test_framings_use_distinct_keys() {
        // A PSK2 blob must not open under the details key and vice versa;
        // the label separation guarantees this even with the same secret.
        let nonce = [0u8; DETAILS_NONCE_LENGTH];
        let (tag, ct) = encrypt(&SECRET, &nonce, b"x").unwrap();
        let mut forged = vec![0u8; PSK2_NONCE_LENGTH];
        forged.extend_from_slice(&tag);
        forged.extend_from_slice(&ct);
        assert!(open(&SECRET, &forged).is_err());
    }
}
