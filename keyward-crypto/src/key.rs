//! Symmetric key material.

use crate::error::{CryptoError, CryptoResult};
use crate::EncryptionType;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a full AES-256 + HMAC-SHA256 key.
pub const KEY_SIZE: usize = 64;

/// Decrypted key bytes, split into an encryption subkey and an optional
/// authentication subkey according to the key's encryption type.
///
/// The buffer is zeroized on drop and never serialized.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKeyMaterial {
    key: Vec<u8>,
    #[zeroize(skip)]
    enc_type: EncryptionType,
}

impl SymmetricKeyMaterial {
    /// Infers the type from the length: 32 bytes is `AesCbc256_B64`,
    /// 64 bytes is `AesCbc256_HmacSha256_B64`.
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        let enc_type = match bytes.len() {
            32 => EncryptionType::AesCbc256B64,
            64 => EncryptionType::AesCbc256HmacSha256B64,
            actual => {
                let mut bytes = bytes;
                bytes.zeroize();
                return Err(CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual,
                });
            }
        };
        Ok(Self {
            key: bytes,
            enc_type,
        })
    }

    /// Builds key material with an explicit type.
    pub fn with_type(bytes: Vec<u8>, enc_type: EncryptionType) -> CryptoResult<Self> {
        let expected = match enc_type {
            EncryptionType::AesCbc256B64 | EncryptionType::AesCbc128HmacSha256B64 => 32,
            EncryptionType::AesCbc256HmacSha256B64 => 64,
            other => return Err(CryptoError::UnsupportedEncryptionType(other)),
        };
        if bytes.len() != expected {
            let actual = bytes.len();
            let mut bytes = bytes;
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength { expected, actual });
        }
        Ok(Self {
            key: bytes,
            enc_type,
        })
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Format(format!("invalid key base64: {e}")))?;
        Self::from_bytes(bytes)
    }

    /// Generates a fresh random 64-byte `AesCbc256_HmacSha256_B64` key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self {
            key: bytes,
            enc_type: EncryptionType::AesCbc256HmacSha256B64,
        }
    }

    pub fn enc_type(&self) -> EncryptionType {
        self.enc_type
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.key)
    }

    /// Encryption subkey.
    pub fn enc_key(&self) -> &[u8] {
        match self.enc_type {
            EncryptionType::AesCbc128HmacSha256B64 => &self.key[..16],
            EncryptionType::AesCbc256HmacSha256B64 => &self.key[..32],
            _ => &self.key,
        }
    }

    /// Authentication subkey, present for HMAC types only.
    pub fn mac_key(&self) -> Option<&[u8]> {
        match self.enc_type {
            EncryptionType::AesCbc128HmacSha256B64 => Some(&self.key[16..32]),
            EncryptionType::AesCbc256HmacSha256B64 => Some(&self.key[32..64]),
            _ => None,
        }
    }
}

impl fmt::Debug for SymmetricKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKeyMaterial")
            .field("enc_type", &self.enc_type)
            .field("key", &"[redacted]")
            .finish()
    }
}

impl PartialEq for SymmetricKeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.enc_type == other.enc_type && bool::from(self.key.ct_eq(&other.key))
    }
}

impl Eq for SymmetricKeyMaterial {}
