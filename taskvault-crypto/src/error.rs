//! Error types for the crypto core.

use thiserror::Error;

/// Coarse classification of a [`CryptoError`].
///
/// Callers that translate errors into transport responses should branch on
/// this instead of individual variants, so the four-way split stays stable
/// as variants are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: wrong lengths, bad encodings, invalid payload shape.
    /// Never retried.
    Validation,
    /// AEAD tag mismatch. Deliberately generic — wrong key, wrong AAD, and
    /// tampered data are indistinguishable by design.
    Authentication,
    /// A configured resource cap was exceeded (decompression limit).
    ResourceLimit,
    /// Underlying primitive or RNG failure. Fatal; log server-side only.
    Internal,
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength { expected: usize, actual: usize },

    #[error("invalid tag length: expected {expected}, got {actual}")]
    InvalidTagLength { expected: usize, actual: usize },

    #[error("invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },

    #[error("invalid base64 in field '{field}'")]
    InvalidEncoding { field: &'static str },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// One generic failure for every key-derivation problem (malformed
    /// recovery code, undecodable salt, KDF refusal). Collapsing them
    /// avoids an oracle on which check failed.
    #[error("key derivation failed")]
    KeyDerivation,

    #[error("authentication failed (wrong key, AAD mismatch, or tampered data)")]
    Authentication,

    #[error("decompressed payload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("crypto backend failure: {0}")]
    Internal(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidKeyLength { .. }
            | CryptoError::InvalidNonceLength { .. }
            | CryptoError::InvalidTagLength { .. }
            | CryptoError::InvalidSaltLength { .. }
            | CryptoError::InvalidEncoding { .. }
            | CryptoError::InvalidPayload(_)
            | CryptoError::UnsupportedAlgorithm(_)
            | CryptoError::KeyDerivation => ErrorKind::Validation,
            CryptoError::Authentication => ErrorKind::Authentication,
            CryptoError::PayloadTooLarge { .. } => ErrorKind::ResourceLimit,
            CryptoError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
