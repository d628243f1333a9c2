//! AES-256-GCM envelopes for the local fallback file.
//!
//! Keys are derived from the configured secret with PBKDF2-HMAC-SHA256 over a
//! per-file salt. Each envelope carries its own random nonce; the
//! authentication tag is stored separately from the ciphertext.

use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use tracing::{debug, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{Result, SecretsError};

/// Size of the per-file PBKDF2 salt in bytes
pub const SALT_LEN: usize = 16;

/// Size of AES-256-GCM nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Size of AES-256-GCM tag in bytes
pub const TAG_LEN: usize = 16;

const KEY_LEN: usize = 32;

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_LEN]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_LEN]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// A 256-bit key derived from the fallback secret. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Encrypted record as stored in the fallback file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Hex nonce
    pub iv: String,
    /// Hex authentication tag
    pub tag: String,
    /// Base64 ciphertext
    pub data: String,
}

fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| SecretsError::crypto("Failed to generate random bytes"))?;
    Ok(bytes)
}

/// Fresh random salt for a new fallback file.
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    random_bytes::<SALT_LEN>()
}

/// Derive the file key. Slow on purpose; call from a blocking context.
#[instrument(skip(secret, salt), fields(salt_len = salt.len()))]
pub fn derive_key(secret: &str, salt: &[u8], iterations: NonZeroU32) -> DerivedKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations, salt, secret.as_bytes(), &mut key);
    debug!(iterations = iterations.get(), "Derived fallback encryption key");
    DerivedKey(key)
}

/// Encrypt `plaintext` under `key` with a random nonce. `aad` is
/// authenticated but not stored; `open` must be given the same bytes.
#[instrument(skip(key, plaintext), fields(plaintext_len = plaintext.len()))]
pub fn seal(key: &DerivedKey, aad: &[u8], plaintext: &[u8]) -> Result<Envelope> {
    let nonce_bytes = random_bytes::<NONCE_LEN>()?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, &key.0)
        .map_err(|_| SecretsError::crypto("Failed to create encryption key"))?;
    let mut sealing_key = aead::SealingKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let mut ciphertext = plaintext.to_vec();
    let tag = sealing_key
        .seal_in_place_separate_tag(Aad::from(aad), &mut ciphertext)
        .map_err(|_| SecretsError::crypto("Failed to encrypt record"))?;

    Ok(Envelope {
        iv: hex::encode(nonce_bytes),
        tag: hex::encode(tag.as_ref()),
        data: base64::engine::general_purpose::STANDARD.encode(&ciphertext),
    })
}

/// Decrypt an envelope. Fails on malformed fields, a wrong key, different
/// `aad` or any tampering with iv, tag or data.
#[instrument(skip(key, envelope), fields(data_len = envelope.data.len()))]
pub fn open(key: &DerivedKey, aad: &[u8], envelope: &Envelope) -> Result<Vec<u8>> {
    let nonce_bytes: [u8; NONCE_LEN] = hex::decode(&envelope.iv)
        .map_err(|e| SecretsError::crypto(format!("Invalid iv encoding: {}", e)))?
        .try_into()
        .map_err(|_| SecretsError::crypto("Invalid iv length"))?;

    let tag_bytes: [u8; TAG_LEN] = hex::decode(&envelope.tag)
        .map_err(|e| SecretsError::crypto(format!("Invalid tag encoding: {}", e)))?
        .try_into()
        .map_err(|_| SecretsError::crypto("Invalid tag length"))?;

    let mut buffer = base64::engine::general_purpose::STANDARD
        .decode(&envelope.data)
        .map_err(|e| SecretsError::crypto(format!("Invalid data encoding: {}", e)))?;
    buffer.extend_from_slice(&tag_bytes);

    let unbound_key = UnboundKey::new(&AES_256_GCM, &key.0)
        .map_err(|_| SecretsError::crypto("Failed to create decryption key"))?;
    let mut opening_key = aead::OpeningKey::new(unbound_key, SingleNonce::new(nonce_bytes));

    let plaintext = opening_key
        .open_in_place(Aad::from(aad), &mut buffer)
        .map_err(|_| SecretsError::crypto("Authentication failed: wrong secret or tampered record"))?;

    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(secret: &str) -> DerivedKey {
        derive_key(secret, &[7u8; SALT_LEN], NonZeroU32::new(10).unwrap())
    }

    #[test]
    fn test_seal_open() {
        let key = key("correct horse");
        let envelope = seal(&key, b"keys", br#"{"groqApiKey1":"abc"}"#).unwrap();

        assert_eq!(hex::decode(&envelope.iv).unwrap().len(), NONCE_LEN);
        assert_eq!(hex::decode(&envelope.tag).unwrap().len(), TAG_LEN);
        assert_eq!(open(&key, b"keys", &envelope).unwrap(), br#"{"groqApiKey1":"abc"}"#);
    }

    #[test]
    fn test_nonce_is_unique_per_seal() {
        let key = key("s");
        let a = seal(&key, b"keys", b"same").unwrap();
        let b = seal(&key, b"keys", b"same").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = seal(&key("one"), b"keys", b"payload").unwrap();
        let err = open(&key("two"), b"keys", &envelope).unwrap_err();
        assert!(matches!(err, SecretsError::Crypto { .. }));
    }

    #[test]
    fn test_salt_changes_key() {
        let iterations = NonZeroU32::new(10).unwrap();
        let a = derive_key("s", &[1u8; SALT_LEN], iterations);
        let b = derive_key("s", &[2u8; SALT_LEN], iterations);
        let envelope = seal(&a, b"keys", b"payload").unwrap();
        assert!(open(&b, b"keys", &envelope).is_err());
    }

    #[test]
    fn test_malformed_envelope_fails() {
        let key = key("s");
        let mut envelope = seal(&key, b"keys", b"payload").unwrap();
        envelope.iv = "zz".to_string();
        assert!(open(&key, b"keys", &envelope).is_err());

        let mut envelope = seal(&key, b"keys", b"payload").unwrap();
        envelope.tag = hex::encode([0u8; 8]);
        assert!(open(&key, b"keys", &envelope).is_err());
    }

    #[test]
    fn test_aad_binds_envelope_to_record() {
        let key = key("s");
        let envelope = seal(&key, b"keys", b"payload").unwrap();
        assert!(open(&key, b"state", &envelope).is_err());
        assert_eq!(open(&key, b"keys", &envelope).unwrap(), b"payload");
    }

    #[test]
    fn test_derived_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", key("s")), "DerivedKey([REDACTED])");
    }
}
