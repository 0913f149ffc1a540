//! Sealed-state codec
//!
//! AES-256-GCM encrypts a short payload, HMAC-SHA256 signs the ciphertext,
//! and both halves travel as base64url segments joined by `.`.
//! The layout of the ciphertext segment is `iv || aes-gcm output`.

pub mod state;

pub use state::OAuthState;

use crate::error::BeancounterError;
use crate::Result;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const SEGMENT_DELIMITER: char = '.';

type HmacSha256 = Hmac<Sha256>;

/// 32 bytes of key material. Never serialized, never printed.
#[derive(Clone)]
pub struct SealKey([u8; KEY_LEN]);

impl SealKey {
    /// Takes the first 32 bytes; anything shorter is rejected.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < KEY_LEN {
            return Err(BeancounterError::KeyTooShort { len: bytes.len() });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SealKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealKey(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub encryption: SealKey,
    pub signing: SealKey,
}

pub fn generate_key_pair() -> Result<KeyPair> {
    Ok(KeyPair {
        encryption: random_key()?,
        signing: random_key()?,
    })
}

fn random_key() -> Result<SealKey> {
    let mut bytes = [0u8; KEY_LEN];
    fill_random(&mut bytes)?;
    Ok(SealKey(bytes))
}

fn fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| BeancounterError::KeyGeneration(e.to_string()))
}

/// Encrypt and sign `plaintext`. A fresh IV per call means sealing the same
/// payload twice gives two different strings.
pub fn seal(plaintext: &[u8], keys: &KeyPair) -> Result<String> {
    let cipher = <Aes256Gcm as KeyInit>::new(Key::<Aes256Gcm>::from_slice(
        keys.encryption.as_bytes(),
    ));

    let mut iv = [0u8; IV_LEN];
    fill_random(&mut iv)?;

    let encrypted = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| BeancounterError::Crypto("AES-GCM encryption failed".to_string()))?;

    let mut ciphertext = Vec::with_capacity(IV_LEN + encrypted.len());
    ciphertext.extend_from_slice(&iv);
    ciphertext.extend_from_slice(&encrypted);

    let tag = compute_tag(&ciphertext, &keys.signing)?;

    Ok(format!(
        "{}{}{}",
        URL_SAFE_NO_PAD.encode(&ciphertext),
        SEGMENT_DELIMITER,
        URL_SAFE_NO_PAD.encode(tag)
    ))
}

/// Check the tag and decrypt. Any defect in the input is `StateVerification`.
pub fn open(sealed: &str, keys: &KeyPair) -> Result<Vec<u8>> {
    let (ciphertext_b64, tag_b64) = sealed
        .split_once(SEGMENT_DELIMITER)
        .ok_or(BeancounterError::StateVerification)?;

    let ciphertext = URL_SAFE_NO_PAD
        .decode(ciphertext_b64)
        .map_err(|_| BeancounterError::StateVerification)?;
    let tag = URL_SAFE_NO_PAD
        .decode(tag_b64)
        .map_err(|_| BeancounterError::StateVerification)?;

    let expected = compute_tag(&ciphertext, &keys.signing)?;
    if !bool::from(expected.as_slice().ct_eq(tag.as_slice())) {
        return Err(BeancounterError::StateVerification);
    }

    if ciphertext.len() < IV_LEN {
        return Err(BeancounterError::StateVerification);
    }
    let (iv, body) = ciphertext.split_at(IV_LEN);

    let cipher = <Aes256Gcm as KeyInit>::new(Key::<Aes256Gcm>::from_slice(
        keys.encryption.as_bytes(),
    ));
    cipher
        .decrypt(Nonce::from_slice(iv), body)
        .map_err(|_| BeancounterError::StateVerification)
}

/// True only if `sealed` was produced by `seal` under exactly these keys.
pub fn verify(sealed: &str, keys: &KeyPair) -> bool {
    open(sealed, keys).is_ok()
}

fn compute_tag(ciphertext: &[u8], key: &SealKey) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| BeancounterError::Crypto(format!("invalid signing key: {}", e)))?;
    mac.update(ciphertext);
    Ok(mac.finalize().into_bytes().to_vec())
}
