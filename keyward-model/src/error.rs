//! Model error types.

use thiserror::Error;

/// Result type for model conversions.
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid {kind} code: {code}")]
    InvalidCode { kind: &'static str, code: u8 },
}
