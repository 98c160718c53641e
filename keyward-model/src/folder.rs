use crate::entity::{Decryptable, Encryptable, VaultEntity, UNDECRYPTABLE_NAME};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::{CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial};
use serde::{Deserialize, Serialize};

/// Encrypted folder. Always protected by the user key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: EncodedValue,
    pub revision_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FolderView {
    pub id: String,
    pub name: String,
    pub revision_date: DateTime<Utc>,
    pub decryption_failed: bool,
}

impl FolderView {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            revision_date: Utc::now(),
            decryption_failed: false,
        }
    }
}

impl VaultEntity for Folder {
    const KIND: &'static str = "folders";

    fn id(&self) -> &str {
        &self.id
    }

    fn revision_date(&self) -> DateTime<Utc> {
        self.revision_date
    }
}

#[async_trait]
impl Decryptable for Folder {
    type View = FolderView;

    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<FolderView> {
        Ok(FolderView {
            id: self.id.clone(),
            name: crypto.decrypt_str(&self.name, key).await?,
            revision_date: self.revision_date,
            decryption_failed: false,
        })
    }

    fn undecryptable(&self) -> FolderView {
        FolderView {
            id: self.id.clone(),
            name: UNDECRYPTABLE_NAME.to_string(),
            revision_date: self.revision_date,
            decryption_failed: true,
        }
    }
}

#[async_trait]
impl Encryptable for FolderView {
    type Encrypted = Folder;

    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Folder> {
        Ok(Folder {
            id: self.id.clone(),
            name: crypto.encrypt_str(&self.name, key).await?,
            revision_date: self.revision_date,
        })
    }
}
