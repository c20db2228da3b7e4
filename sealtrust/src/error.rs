// SealTrust error types

use thiserror::Error;

/// Top-level error type for the SealTrust crate.
#[derive(Debug, Error)]
pub enum SealTrustError {
    // ── Cipher errors ───────────────────────────────────────────────────
    #[error("ciphertext too short: need at least {min} bytes, got {actual}")]
    CiphertextTooShort { min: usize, actual: usize },

    #[error("ciphertext not block aligned: {0} bytes follow the IV")]
    CiphertextMisaligned(usize),

    #[error("cipher init: {0}")]
    CipherInit(String),

    #[error("random source failure: {0}")]
    Random(String),

    // ── Handshake errors ────────────────────────────────────────────────
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed {context}: expected {expected} bytes, got {actual}")]
    Malformed {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid handshake state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl SealTrustError {
    /// True for failures of the symmetric cipher layer.
    pub fn is_cipher(&self) -> bool {
        matches!(
            self,
            SealTrustError::CiphertextTooShort { .. }
                | SealTrustError::CiphertextMisaligned(_)
                | SealTrustError::CipherInit(_)
                | SealTrustError::Random(_)
        )
    }
}

/// Crate-level result alias.
pub type Result<T> = std::result::Result<T, SealTrustError>;
