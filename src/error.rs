//! Error types for beancounter

use thiserror::Error;

/// Result type alias for beancounter operations
pub type Result<T> = std::result::Result<T, BeancounterError>;

#[derive(Error, Debug)]
pub enum BeancounterError {

    // =============================
    // Transport & Protocol Errors
    // =============================

    /// Network failure or 5xx that survived every retry.
    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// 4xx and anything else the remote will not change its mind about.
    #[error("Request rejected with status {status}: {body}")]
    FatalStatus { status: u16, body: String },

    #[error("Job at {location} still not ready after {attempts} polls")]
    PollTimeout { attempts: u32, location: String },

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    // =============================
    // OAuth & Sealed State Errors
    // =============================

    #[error("State verification failed: redirect did not carry our sealed state")]
    StateVerification,

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Key too short: need 32 bytes, got {len}")]
    KeyTooShort { len: usize },

    #[error("Sealing failed: {0}")]
    Crypto(String),

    #[error("Token expired at unix time {expired_at}")]
    TokenExpired { expired_at: i64 },

    #[error("Callback error: {0}")]
    Callback(String),

    #[error("Timed out waiting for the OAuth redirect")]
    CallbackTimeout,

    // =============================
    // Output & Configuration Errors
    // =============================

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BeancounterError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BeancounterError::Transport { .. } => true,
            BeancounterError::HttpError(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
