//! Traits shared by every encrypted entity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::{CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Name shown for an entity whose fields could not be decrypted.
pub const UNDECRYPTABLE_NAME: &str = "[error: cannot decrypt]";

/// A server-assigned, persisted, encrypted vault entity.
pub trait VaultEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Storage namespace, e.g. `"ciphers"`.
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// Last-write-wins concurrency marker.
    fn revision_date(&self) -> DateTime<Utc>;

    /// Owning organization; `None` means the user key protects the entity.
    fn organization_id(&self) -> Option<&str> {
        None
    }
}

/// Produces a plaintext view of an encrypted entity.
#[async_trait]
pub trait Decryptable: Sync {
    type View: Send;

    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Self::View>;

    /// Placeholder view for an entity whose decryption failed.
    fn undecryptable(&self) -> Self::View;
}

/// Re-encrypts a plaintext view for saving.
#[async_trait]
pub trait Encryptable: Sync {
    type Encrypted: Send;

    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Self::Encrypted>;
}

pub(crate) async fn decrypt_opt(
    crypto: &dyn CryptoService,
    key: &SymmetricKeyMaterial,
    value: Option<&EncodedValue>,
) -> CryptoResult<Option<String>> {
    match value {
        Some(v) => Ok(Some(crypto.decrypt_str(v, key).await?)),
        None => Ok(None),
    }
}

pub(crate) async fn encrypt_opt(
    crypto: &dyn CryptoService,
    key: &SymmetricKeyMaterial,
    value: Option<&str>,
) -> CryptoResult<Option<EncodedValue>> {
    match value {
        Some(v) => Ok(Some(crypto.encrypt_str(v, key).await?)),
        None => Ok(None),
    }
}
