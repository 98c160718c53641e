//! Encrypted vault entities and their decrypted views.
//!
//! Entities ([`Cipher`], [`Folder`], [`send::Send`]) are what storage and sync see:
//! every user-supplied sensitive field is an [`EncodedValue`]. Views
//! ([`CipherView`], [`FolderView`], [`SendView`]) are plaintext projections
//! produced through [`Decryptable`] and turned back through [`Encryptable`].
//! Views carry the source id and are never serialized.
//!
//! `send::Send` is not re-exported at the root so it never shadows the
//! marker trait in downstream modules.
//!
//! [`EncodedValue`]: keyward_crypto::EncodedValue

/// Implements the `u8` wire-code conversions for a fieldless enum.
macro_rules! wire_code_enum {
    ($name:ident, $kind:literal, { $($variant:ident = $code:literal),+ $(,)? }) => {
        impl TryFrom<u8> for $name {
            type Error = $crate::error::ModelError;

            fn try_from(code: u8) -> Result<Self, Self::Error> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    code => Err($crate::error::ModelError::InvalidCode { kind: $kind, code }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

pub mod cipher;
pub mod entity;
mod error;
mod folder;
mod organization;
pub mod send;
pub mod uri;

pub use cipher::{
    Card, CardView, Cipher, CipherLocalData, CipherRepromptType, CipherType, CipherView, Field,
    FieldType, FieldView, Identity, IdentityView, Login, LoginUri, LoginUriView, LoginView,
    SecureNote, SecureNoteType,
};
pub use entity::{Decryptable, Encryptable, VaultEntity, UNDECRYPTABLE_NAME};
pub use error::{ModelError, ModelResult};
pub use folder::{Folder, FolderView};
pub use organization::{OrganizationKey, ProviderKey};
pub use send::{SendFile, SendFileView, SendText, SendTextView, SendType, SendView};
pub use uri::UriMatchType;
