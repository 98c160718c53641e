//! Sends: text or file shares protected by their own key.

use crate::entity::{decrypt_opt, encrypt_opt, Decryptable, Encryptable, VaultEntity, UNDECRYPTABLE_NAME};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::{CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SendType {
    #[default]
    Text = 0,
    File = 1,
}

wire_code_enum!(SendType, "send type", { Text = 0, File = 1 });

/// Encrypted send. `key` is the send key encrypted with the user key; every
/// other sensitive field is encrypted with the send key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Send {
    pub id: String,
    pub access_id: String,
    #[serde(rename = "type")]
    pub send_type: SendType,
    pub name: EncodedValue,
    #[serde(default)]
    pub notes: Option<EncodedValue>,
    pub key: EncodedValue,
    #[serde(default)]
    pub text: Option<SendText>,
    #[serde(default)]
    pub file: Option<SendFile>,
    #[serde(default)]
    pub max_access_count: Option<u32>,
    #[serde(default)]
    pub access_count: u32,
    pub revision_date: DateTime<Utc>,
    #[serde(default)]
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: DateTime<Utc>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub hide_email: bool,
    /// Server-side access password hash. Not encrypted.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SendText {
    #[serde(default)]
    pub text: Option<EncodedValue>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFile {
    pub id: String,
    pub file_name: EncodedValue,
    pub size: u64,
}

impl VaultEntity for Send {
    const KIND: &'static str = "sends";

    fn id(&self) -> &str {
        &self.id
    }

    fn revision_date(&self) -> DateTime<Utc> {
        self.revision_date
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SendView {
    pub id: String,
    pub access_id: String,
    pub send_type: SendType,
    pub name: String,
    pub notes: Option<String>,
    /// Decrypted send key. `None` for a new send or a failed decrypt.
    pub key: Option<SymmetricKeyMaterial>,
    pub text: Option<SendTextView>,
    pub file: Option<SendFileView>,
    pub max_access_count: Option<u32>,
    pub access_count: u32,
    pub revision_date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub deletion_date: DateTime<Utc>,
    pub disabled: bool,
    pub hide_email: bool,
    pub password: Option<String>,
    pub decryption_failed: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SendTextView {
    pub text: Option<String>,
    pub hidden: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SendFileView {
    pub id: String,
    pub file_name: String,
    pub size: u64,
}

impl SendView {
    /// A new text send, deleted by the server after `deletion_date`.
    pub fn new_text(
        name: impl Into<String>,
        text: impl Into<String>,
        deletion_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            access_id: String::new(),
            send_type: SendType::Text,
            name: name.into(),
            notes: None,
            key: None,
            text: Some(SendTextView {
                text: Some(text.into()),
                hidden: false,
            }),
            file: None,
            max_access_count: None,
            access_count: 0,
            revision_date: Utc::now(),
            expiration_date: None,
            deletion_date,
            disabled: false,
            hide_email: false,
            password: None,
            decryption_failed: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }

    pub fn pending_delete(&self, now: DateTime<Utc>) -> bool {
        self.deletion_date <= now
    }

    pub fn max_access_count_reached(&self) -> bool {
        self.max_access_count
            .is_some_and(|max| self.access_count >= max)
    }
}

#[async_trait]
impl Decryptable for Send {
    type View = SendView;

    /// `key` is the user key; the send key is unwrapped from it first.
    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<SendView> {
        let send_key = SymmetricKeyMaterial::from_bytes(crypto.decrypt(&self.key, key).await?)?;

        let text = match &self.text {
            Some(t) => Some(SendTextView {
                text: decrypt_opt(crypto, &send_key, t.text.as_ref()).await?,
                hidden: t.hidden,
            }),
            None => None,
        };
        let file = match &self.file {
            Some(f) => Some(SendFileView {
                id: f.id.clone(),
                file_name: crypto.decrypt_str(&f.file_name, &send_key).await?,
                size: f.size,
            }),
            None => None,
        };

        Ok(SendView {
            id: self.id.clone(),
            access_id: self.access_id.clone(),
            send_type: self.send_type,
            name: crypto.decrypt_str(&self.name, &send_key).await?,
            notes: decrypt_opt(crypto, &send_key, self.notes.as_ref()).await?,
            text,
            file,
            key: Some(send_key),
            max_access_count: self.max_access_count,
            access_count: self.access_count,
            revision_date: self.revision_date,
            expiration_date: self.expiration_date,
            deletion_date: self.deletion_date,
            disabled: self.disabled,
            hide_email: self.hide_email,
            password: self.password.clone(),
            decryption_failed: false,
        })
    }

    fn undecryptable(&self) -> SendView {
        SendView {
            id: self.id.clone(),
            access_id: self.access_id.clone(),
            send_type: self.send_type,
            name: UNDECRYPTABLE_NAME.to_string(),
            notes: None,
            key: None,
            text: None,
            file: None,
            max_access_count: self.max_access_count,
            access_count: self.access_count,
            revision_date: self.revision_date,
            expiration_date: self.expiration_date,
            deletion_date: self.deletion_date,
            disabled: self.disabled,
            hide_email: self.hide_email,
            password: self.password.clone(),
            decryption_failed: true,
        }
    }
}

#[async_trait]
impl Encryptable for SendView {
    type Encrypted = Send;

    /// Wraps the send key (generating one for a new send) with the user key.
    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Send> {
        let send_key = match &self.key {
            Some(k) => k.clone(),
            None => SymmetricKeyMaterial::generate(),
        };

        let text = match &self.text {
            Some(t) => Some(SendText {
                text: encrypt_opt(crypto, &send_key, t.text.as_deref()).await?,
                hidden: t.hidden,
            }),
            None => None,
        };
        let file = match &self.file {
            Some(f) => Some(SendFile {
                id: f.id.clone(),
                file_name: crypto.encrypt_str(&f.file_name, &send_key).await?,
                size: f.size,
            }),
            None => None,
        };

        Ok(Send {
            id: self.id.clone(),
            access_id: self.access_id.clone(),
            send_type: self.send_type,
            name: crypto.encrypt_str(&self.name, &send_key).await?,
            notes: encrypt_opt(crypto, &send_key, self.notes.as_deref()).await?,
            key: crypto.encrypt(send_key.as_bytes(), key).await?,
            text,
            file,
            max_access_count: self.max_access_count,
            access_count: self.access_count,
            revision_date: self.revision_date,
            expiration_date: self.expiration_date,
            deletion_date: self.deletion_date,
            disabled: self.disabled,
            hide_email: self.hide_email,
            password: self.password.clone(),
        })
    }
}
