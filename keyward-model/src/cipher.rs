//! Vault items: logins, cards, identities and secure notes.

use crate::entity::{decrypt_opt, encrypt_opt, Decryptable, Encryptable, VaultEntity, UNDECRYPTABLE_NAME};
use crate::uri::{uri_matches, UriMatchType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_crypto::{CryptoResult, CryptoService, EncodedValue, SymmetricKeyMaterial};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CipherType {
    Login = 1,
    SecureNote = 2,
    Card = 3,
    Identity = 4,
}

wire_code_enum!(CipherType, "cipher type", { Login = 1, SecureNote = 2, Card = 3, Identity = 4 });

/// Whether the master password is re-requested before revealing the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CipherRepromptType {
    #[default]
    None = 0,
    Password = 1,
}

wire_code_enum!(CipherRepromptType, "reprompt type", { None = 0, Password = 1 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SecureNoteType {
    #[default]
    Generic = 0,
}

wire_code_enum!(SecureNoteType, "secure note type", { Generic = 0 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FieldType {
    #[default]
    Text = 0,
    Hidden = 1,
    Boolean = 2,
    Linked = 3,
}

wire_code_enum!(FieldType, "field type", { Text = 0, Hidden = 1, Boolean = 2, Linked = 3 });

// ============================================================================
// Encrypted shapes
// ============================================================================

/// Encrypted vault item as stored and synced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cipher {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    #[serde(rename = "type")]
    pub cipher_type: CipherType,
    pub name: EncodedValue,
    #[serde(default)]
    pub notes: Option<EncodedValue>,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub reprompt: CipherRepromptType,
    /// Per-item key, encrypted with the user or organization key.
    #[serde(default)]
    pub key: Option<EncodedValue>,
    #[serde(default)]
    pub login: Option<Login>,
    #[serde(default)]
    pub card: Option<Card>,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub secure_note: Option<SecureNote>,
    #[serde(default)]
    pub fields: Vec<Field>,
    pub creation_date: DateTime<Utc>,
    pub revision_date: DateTime<Utc>,
    #[serde(default)]
    pub deleted_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Login {
    #[serde(default)]
    pub username: Option<EncodedValue>,
    #[serde(default)]
    pub password: Option<EncodedValue>,
    #[serde(default)]
    pub totp: Option<EncodedValue>,
    #[serde(default)]
    pub password_revision_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uris: Vec<LoginUri>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginUri {
    #[serde(default)]
    pub uri: Option<EncodedValue>,
    #[serde(default, rename = "match")]
    pub match_type: Option<UriMatchType>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(default)]
    pub cardholder_name: Option<EncodedValue>,
    #[serde(default)]
    pub brand: Option<EncodedValue>,
    #[serde(default)]
    pub number: Option<EncodedValue>,
    #[serde(default)]
    pub exp_month: Option<EncodedValue>,
    #[serde(default)]
    pub exp_year: Option<EncodedValue>,
    #[serde(default)]
    pub code: Option<EncodedValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub title: Option<EncodedValue>,
    pub first_name: Option<EncodedValue>,
    pub middle_name: Option<EncodedValue>,
    pub last_name: Option<EncodedValue>,
    pub company: Option<EncodedValue>,
    pub email: Option<EncodedValue>,
    pub phone: Option<EncodedValue>,
    pub address1: Option<EncodedValue>,
    pub city: Option<EncodedValue>,
    pub postal_code: Option<EncodedValue>,
    pub country: Option<EncodedValue>,
    pub username: Option<EncodedValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureNote {
    #[serde(rename = "type", default)]
    pub note_type: SecureNoteType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub name: Option<EncodedValue>,
    #[serde(default)]
    pub value: Option<EncodedValue>,
}

/// Local-only, unencrypted usage data for a cipher.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherLocalData {
    #[serde(default)]
    pub last_used_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_launched: Option<DateTime<Utc>>,
}

impl VaultEntity for Cipher {
    const KIND: &'static str = "ciphers";

    fn id(&self) -> &str {
        &self.id
    }

    fn revision_date(&self) -> DateTime<Utc> {
        self.revision_date
    }

    fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }
}

// ============================================================================
// Plaintext views
// ============================================================================

/// Decrypted projection of a [`Cipher`]. Never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct CipherView {
    /// Id of the source cipher.
    pub id: String,
    pub organization_id: Option<String>,
    pub folder_id: Option<String>,
    pub cipher_type: CipherType,
    pub name: String,
    pub notes: Option<String>,
    pub favorite: bool,
    pub reprompt: CipherRepromptType,
    /// Still-encrypted per-item key carried over from the source.
    pub item_key: Option<EncodedValue>,
    pub login: Option<LoginView>,
    pub card: Option<CardView>,
    pub identity: Option<IdentityView>,
    pub secure_note: Option<SecureNote>,
    pub fields: Vec<FieldView>,
    pub creation_date: DateTime<Utc>,
    pub revision_date: DateTime<Utc>,
    pub deleted_date: Option<DateTime<Utc>>,
    pub last_used_date: Option<DateTime<Utc>>,
    pub last_launched: Option<DateTime<Utc>>,
    pub decryption_failed: bool,
}

impl CipherView {
    /// A new, unsaved item with a provisional local id.
    pub fn new(cipher_type: CipherType, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: None,
            folder_id: None,
            cipher_type,
            name: name.into(),
            notes: None,
            favorite: false,
            reprompt: CipherRepromptType::None,
            item_key: None,
            login: (cipher_type == CipherType::Login).then(LoginView::default),
            card: (cipher_type == CipherType::Card).then(CardView::default),
            identity: (cipher_type == CipherType::Identity).then(IdentityView::default),
            secure_note: (cipher_type == CipherType::SecureNote).then(SecureNote::default),
            fields: Vec::new(),
            creation_date: now,
            revision_date: now,
            deleted_date: None,
            last_used_date: None,
            last_launched: None,
            decryption_failed: false,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_date.is_some()
    }

    /// Whether any login URI of this item matches `page_url`.
    pub fn matches_url(
        &self,
        page_url: &str,
        equivalent_domains: &HashSet<String>,
        default_match: UriMatchType,
    ) -> bool {
        self.login.as_ref().is_some_and(|login| {
            login
                .uris
                .iter()
                .any(|u| u.matches(page_url, equivalent_domains, default_match))
        })
    }

    pub fn apply_local_data(&mut self, local: &CipherLocalData) {
        self.last_used_date = local.last_used_date;
        self.last_launched = local.last_launched;
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoginView {
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp: Option<String>,
    pub password_revision_date: Option<DateTime<Utc>>,
    pub uris: Vec<LoginUriView>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoginUriView {
    pub uri: Option<String>,
    pub match_type: Option<UriMatchType>,
}

impl LoginUriView {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            match_type: None,
        }
    }

    /// Matches with this URI's own match type, or `default_match` when unset.
    pub fn matches(
        &self,
        page_url: &str,
        equivalent_domains: &HashSet<String>,
        default_match: UriMatchType,
    ) -> bool {
        match self.uri.as_deref() {
            Some(uri) => uri_matches(
                uri,
                self.match_type.unwrap_or(default_match),
                page_url,
                equivalent_domains,
            ),
            None => false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CardView {
    pub cardholder_name: Option<String>,
    pub brand: Option<String>,
    pub number: Option<String>,
    pub exp_month: Option<String>,
    pub exp_year: Option<String>,
    pub code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentityView {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldView {
    pub field_type: FieldType,
    pub name: Option<String>,
    pub value: Option<String>,
}

// ============================================================================
// Decrypt / encrypt
// ============================================================================

/// Resolves the key that protects the item's fields: the decrypted per-item
/// key when present, otherwise the parent key.
async fn resolve_item_key(
    crypto: &dyn CryptoService,
    parent: &SymmetricKeyMaterial,
    item_key: Option<&EncodedValue>,
) -> CryptoResult<Option<SymmetricKeyMaterial>> {
    match item_key {
        Some(enc) => {
            let bytes = crypto.decrypt(enc, parent).await?;
            Ok(Some(SymmetricKeyMaterial::from_bytes(bytes)?))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl Decryptable for Cipher {
    type View = CipherView;

    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<CipherView> {
        let item_key = resolve_item_key(crypto, key, self.key.as_ref()).await?;
        let key = item_key.as_ref().unwrap_or(key);

        let login = match &self.login {
            Some(l) => Some(l.decrypt(crypto, key).await?),
            None => None,
        };
        let card = match &self.card {
            Some(c) => Some(c.decrypt(crypto, key).await?),
            None => None,
        };
        let identity = match &self.identity {
            Some(i) => Some(i.decrypt(crypto, key).await?),
            None => None,
        };
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(FieldView {
                field_type: field.field_type,
                name: decrypt_opt(crypto, key, field.name.as_ref()).await?,
                value: decrypt_opt(crypto, key, field.value.as_ref()).await?,
            });
        }

        Ok(CipherView {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            folder_id: self.folder_id.clone(),
            cipher_type: self.cipher_type,
            name: crypto.decrypt_str(&self.name, key).await?,
            notes: decrypt_opt(crypto, key, self.notes.as_ref()).await?,
            favorite: self.favorite,
            reprompt: self.reprompt,
            item_key: self.key.clone(),
            login,
            card,
            identity,
            secure_note: self.secure_note.clone(),
            fields,
            creation_date: self.creation_date,
            revision_date: self.revision_date,
            deleted_date: self.deleted_date,
            last_used_date: None,
            last_launched: None,
            decryption_failed: false,
        })
    }

    fn undecryptable(&self) -> CipherView {
        CipherView {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            folder_id: self.folder_id.clone(),
            cipher_type: self.cipher_type,
            name: UNDECRYPTABLE_NAME.to_string(),
            notes: None,
            favorite: self.favorite,
            reprompt: self.reprompt,
            item_key: self.key.clone(),
            login: None,
            card: None,
            identity: None,
            secure_note: None,
            fields: Vec::new(),
            creation_date: self.creation_date,
            revision_date: self.revision_date,
            deleted_date: self.deleted_date,
            last_used_date: None,
            last_launched: None,
            decryption_failed: true,
        }
    }
}

#[async_trait]
impl Encryptable for CipherView {
    type Encrypted = Cipher;

    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Cipher> {
        let item_key = resolve_item_key(crypto, key, self.item_key.as_ref()).await?;
        let key = item_key.as_ref().unwrap_or(key);

        let login = match &self.login {
            Some(l) => Some(l.encrypt(crypto, key).await?),
            None => None,
        };
        let card = match &self.card {
            Some(c) => Some(c.encrypt(crypto, key).await?),
            None => None,
        };
        let identity = match &self.identity {
            Some(i) => Some(i.encrypt(crypto, key).await?),
            None => None,
        };
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(Field {
                field_type: field.field_type,
                name: encrypt_opt(crypto, key, field.name.as_deref()).await?,
                value: encrypt_opt(crypto, key, field.value.as_deref()).await?,
            });
        }

        Ok(Cipher {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            folder_id: self.folder_id.clone(),
            cipher_type: self.cipher_type,
            name: crypto.encrypt_str(&self.name, key).await?,
            notes: encrypt_opt(crypto, key, self.notes.as_deref()).await?,
            favorite: self.favorite,
            reprompt: self.reprompt,
            key: self.item_key.clone(),
            login,
            card,
            identity,
            secure_note: self.secure_note.clone(),
            fields,
            creation_date: self.creation_date,
            revision_date: self.revision_date,
            deleted_date: self.deleted_date,
        })
    }
}

impl Login {
    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<LoginView> {
        let mut uris = Vec::with_capacity(self.uris.len());
        for u in &self.uris {
            uris.push(LoginUriView {
                uri: decrypt_opt(crypto, key, u.uri.as_ref()).await?,
                match_type: u.match_type,
            });
        }
        Ok(LoginView {
            username: decrypt_opt(crypto, key, self.username.as_ref()).await?,
            password: decrypt_opt(crypto, key, self.password.as_ref()).await?,
            totp: decrypt_opt(crypto, key, self.totp.as_ref()).await?,
            password_revision_date: self.password_revision_date,
            uris,
        })
    }
}

impl LoginView {
    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Login> {
        let mut uris = Vec::with_capacity(self.uris.len());
        for u in &self.uris {
            uris.push(LoginUri {
                uri: encrypt_opt(crypto, key, u.uri.as_deref()).await?,
                match_type: u.match_type,
            });
        }
        Ok(Login {
            username: encrypt_opt(crypto, key, self.username.as_deref()).await?,
            password: encrypt_opt(crypto, key, self.password.as_deref()).await?,
            totp: encrypt_opt(crypto, key, self.totp.as_deref()).await?,
            password_revision_date: self.password_revision_date,
            uris,
        })
    }
}

impl Card {
    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<CardView> {
        Ok(CardView {
            cardholder_name: decrypt_opt(crypto, key, self.cardholder_name.as_ref()).await?,
            brand: decrypt_opt(crypto, key, self.brand.as_ref()).await?,
            number: decrypt_opt(crypto, key, self.number.as_ref()).await?,
            exp_month: decrypt_opt(crypto, key, self.exp_month.as_ref()).await?,
            exp_year: decrypt_opt(crypto, key, self.exp_year.as_ref()).await?,
            code: decrypt_opt(crypto, key, self.code.as_ref()).await?,
        })
    }
}

impl CardView {
    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Card> {
        Ok(Card {
            cardholder_name: encrypt_opt(crypto, key, self.cardholder_name.as_deref()).await?,
            brand: encrypt_opt(crypto, key, self.brand.as_deref()).await?,
            number: encrypt_opt(crypto, key, self.number.as_deref()).await?,
            exp_month: encrypt_opt(crypto, key, self.exp_month.as_deref()).await?,
            exp_year: encrypt_opt(crypto, key, self.exp_year.as_deref()).await?,
            code: encrypt_opt(crypto, key, self.code.as_deref()).await?,
        })
    }
}

impl Identity {
    async fn decrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<IdentityView> {
        Ok(IdentityView {
            title: decrypt_opt(crypto, key, self.title.as_ref()).await?,
            first_name: decrypt_opt(crypto, key, self.first_name.as_ref()).await?,
            middle_name: decrypt_opt(crypto, key, self.middle_name.as_ref()).await?,
            last_name: decrypt_opt(crypto, key, self.last_name.as_ref()).await?,
            company: decrypt_opt(crypto, key, self.company.as_ref()).await?,
            email: decrypt_opt(crypto, key, self.email.as_ref()).await?,
            phone: decrypt_opt(crypto, key, self.phone.as_ref()).await?,
            address1: decrypt_opt(crypto, key, self.address1.as_ref()).await?,
            city: decrypt_opt(crypto, key, self.city.as_ref()).await?,
            postal_code: decrypt_opt(crypto, key, self.postal_code.as_ref()).await?,
            country: decrypt_opt(crypto, key, self.country.as_ref()).await?,
            username: decrypt_opt(crypto, key, self.username.as_ref()).await?,
        })
    }
}

impl IdentityView {
    async fn encrypt(
        &self,
        crypto: &dyn CryptoService,
        key: &SymmetricKeyMaterial,
    ) -> CryptoResult<Identity> {
        Ok(Identity {
            title: encrypt_opt(crypto, key, self.title.as_deref()).await?,
            first_name: encrypt_opt(crypto, key, self.first_name.as_deref()).await?,
            middle_name: encrypt_opt(crypto, key, self.middle_name.as_deref()).await?,
            last_name: encrypt_opt(crypto, key, self.last_name.as_deref()).await?,
            company: encrypt_opt(crypto, key, self.company.as_deref()).await?,
            email: encrypt_opt(crypto, key, self.email.as_deref()).await?,
            phone: encrypt_opt(crypto, key, self.phone.as_deref()).await?,
            address1: encrypt_opt(crypto, key, self.address1.as_deref()).await?,
            city: encrypt_opt(crypto, key, self.city.as_deref()).await?,
            postal_code: encrypt_opt(crypto, key, self.postal_code.as_deref()).await?,
            country: encrypt_opt(crypto, key, self.country.as_deref()).await?,
            username: encrypt_opt(crypto, key, self.username.as_deref()).await?,
        })
    }
}
