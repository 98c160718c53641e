//! Vault error types.

use crate::lock::AuthStatus;
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Plaintext or key material was requested while not unlocked.
    #[error("vault is not unlocked (status: {0})")]
    Locked(AuthStatus),

    #[error("timeout violates policy: {0}")]
    PolicyViolation(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("cannot {action} while {status}")]
    InvalidTransition {
        action: &'static str,
        status: AuthStatus,
    },

    #[error("no authenticated account")]
    NotAuthenticated,

    #[error("no key for organization {0}")]
    MissingOrganizationKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] keyward_crypto::CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] keyward_storage::StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
