//! Encrypted organization and provider key records.

use keyward_crypto::{CryptoError, CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An organization key as delivered with the account profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OrganizationKey {
    /// Encrypted to the user's RSA public key.
    Organization {
        organization_id: String,
        key: EncodedValue,
    },
    /// Encrypted with the key of a provider managing the organization.
    Provider {
        organization_id: String,
        provider_id: String,
        key: EncodedValue,
    },
}

impl OrganizationKey {
    pub fn organization_id(&self) -> &str {
        match self {
            Self::Organization { organization_id, .. } | Self::Provider { organization_id, .. } => {
                organization_id
            }
        }
    }

    /// Unwraps the organization key. Provider-wrapped keys need their
    /// provider's key in `provider_keys`.
    pub async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        private_key: Option<&[u8]>,
        provider_keys: &HashMap<String, SymmetricKeyMaterial>,
    ) -> CryptoResult<SymmetricKeyMaterial> {
        let bytes = match self {
            Self::Organization { key, .. } => {
                let private_key = private_key.ok_or(CryptoError::Decryption)?;
                crypto.decrypt_with_private_key(key, private_key).await?
            }
            Self::Provider {
                provider_id, key, ..
            } => {
                let provider_key = provider_keys
                    .get(provider_id)
                    .ok_or(CryptoError::Decryption)?;
                crypto.decrypt(key, provider_key).await?
            }
        };
        SymmetricKeyMaterial::from_bytes(bytes)
    }
}

/// A provider key, encrypted to the user's RSA public key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderKey {
    pub provider_id: String,
    pub key: EncodedValue,
}

impl ProviderKey {
    pub async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        private_key: &[u8],
    ) -> CryptoResult<SymmetricKeyMaterial> {
        let bytes = crypto.decrypt_with_private_key(&self.key, private_key).await?;
        SymmetricKeyMaterial::from_bytes(bytes)
    }
}
