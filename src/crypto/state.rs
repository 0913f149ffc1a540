//! OAuth `state` parameter for one authorization attempt.

use super::{generate_key_pair, seal, verify, KeyPair};
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;
use uuid::Uuid;

/// Nonce plus the key pair that seals it. Lives in memory for a single
/// authorization attempt; the keys never leave the process.
pub struct OAuthState {
    nonce: String,
    keys: KeyPair,
}

impl OAuthState {
    pub fn new() -> Result<Self> {
        Ok(Self::with_keys(Uuid::new_v4().to_string(), generate_key_pair()?))
    }

    pub fn with_keys(nonce: String, keys: KeyPair) -> Self {
        Self { nonce, keys }
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Opaque value to send as `state` on the authorize URL.
    pub fn seal(&self) -> Result<String> {
        let encoded = STANDARD.encode(self.nonce.as_bytes());
        seal(encoded.as_bytes(), &self.keys)
    }

    /// Whether a `state` echoed back by the redirect is one we sealed.
    pub fn verify(&self, blob: &str) -> bool {
        verify(blob, &self.keys)
    }
}

impl fmt::Debug for OAuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthState")
            .field("nonce", &self.nonce)
            .field("keys", &"<redacted>")
            .finish()
    }
}
