//! Crypto error types.

use crate::EncryptionType;
use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors produced while parsing encoded values or crossing the decrypt boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The encoded string is malformed (header, part count, base64).
    #[error("malformed encoded value: {0}")]
    Format(String),

    /// Wrong key or tampered data. Deliberately carries no detail.
    #[error("decryption failed (wrong key or tampered data)")]
    Decryption,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("unsupported encryption type: {0}")]
    UnsupportedEncryptionType(EncryptionType),
}
