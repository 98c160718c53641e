//! The decrypt boundary.
//!
//! Everything above this crate produces plaintext only through a
//! [`CryptoService`]. The algorithms behind it are the implementor's concern;
//! [`AesCryptoService`] is the in-process AES-CBC + HMAC-SHA256 implementation.

use crate::error::{CryptoError, CryptoResult};
use crate::{EncodedValue, SymmetricKeyMaterial};
use async_trait::async_trait;

/// Encrypt/decrypt boundary consumed by the vault core.
#[async_trait]
pub trait CryptoService: Send + Sync {
    /// Encrypts raw bytes under a symmetric key.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<EncodedValue>;

    /// Decrypts a symmetric value. Fails with [`CryptoError::Decryption`] on
    /// MAC mismatch, wrong key, or tampered data.
    async fn decrypt(
        &self,
        value: &EncodedValue,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Vec<u8>>;

    /// Decrypts an asymmetric value with the account's private key.
    async fn decrypt_with_private_key(
        &self,
        value: &EncodedValue,
        _private_key: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        Err(CryptoError::UnsupportedEncryptionType(value.enc_type()))
    }

    async fn encrypt_str(
        &self,
        plaintext: &str,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<EncodedValue> {
        self.encrypt(plaintext.as_bytes(), key).await
    }

    /// Decrypts to UTF-8. Invalid UTF-8 is reported as a decryption failure.
    async fn decrypt_str(
        &self,
        value: &EncodedValue,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<String> {
        let bytes = self.decrypt(value, key).await?;
        String::from_utf8(bytes).map_err(|_| CryptoError::Decryption)
    }
}

/// In-process AES-CBC + HMAC-SHA256 service.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesCryptoService;

#[async_trait]
impl CryptoService for AesCryptoService {
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<EncodedValue> {
        crate::encrypt(key, plaintext)
    }

    async fn decrypt(
        &self,
        value: &EncodedValue,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Vec<u8>> {
        crate::decrypt(key, value)
    }
}
