//! AES-CBC + HMAC-SHA256 primitives backing [`AesCryptoService`](crate::AesCryptoService).

use crate::error::{CryptoError, CryptoResult};
use crate::{EncodedValue, EncryptionType, SymmetricKeyMaterial};
use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// AES block / IV size in bytes.
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag size in bytes.
pub const MAC_SIZE: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Encrypts `plaintext` under `key`, producing a value of the key's type.
pub fn encrypt(key: &SymmetricKeyMaterial, plaintext: &[u8]) -> CryptoResult<EncodedValue> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let data = match key.enc_type() {
        EncryptionType::AesCbc128HmacSha256B64 => cbc::Encryptor::<Aes128>::new_from_slices(key.enc_key(), &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        EncryptionType::AesCbc256B64 | EncryptionType::AesCbc256HmacSha256B64 => {
            cbc::Encryptor::<Aes256>::new_from_slices(key.enc_key(), &iv)
                .map_err(|e| CryptoError::Encryption(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        other => return Err(CryptoError::UnsupportedEncryptionType(other)),
    };

    let mac = match key.mac_key() {
        Some(mac_key) => Some(compute_mac(mac_key, &iv, &data)?),
        None => None,
    };

    EncodedValue::new(key.enc_type(), Some(iv.to_vec()), data, mac)
}

/// Decrypts `value` with `key`.
///
/// The MAC is verified in constant time before the ciphertext is touched.
/// Every failure (type mismatch, missing or wrong MAC, bad padding) maps to
/// the same [`CryptoError::Decryption`].
pub fn decrypt(key: &SymmetricKeyMaterial, value: &EncodedValue) -> CryptoResult<Vec<u8>> {
    if value.enc_type() != key.enc_type() {
        return Err(CryptoError::Decryption);
    }
    let iv = value.iv().ok_or(CryptoError::Decryption)?;

    if let Some(mac_key) = key.mac_key() {
        let tag = value.mac().ok_or(CryptoError::Decryption)?;
        let expected = compute_mac(mac_key, iv, value.data()).map_err(|_| CryptoError::Decryption)?;
        if !bool::from(expected.ct_eq(tag)) {
            return Err(CryptoError::Decryption);
        }
    }

    match key.enc_type() {
        EncryptionType::AesCbc128HmacSha256B64 => cbc::Decryptor::<Aes128>::new_from_slices(key.enc_key(), iv)
            .map_err(|_| CryptoError::Decryption)?
            .decrypt_padded_vec_mut::<Pkcs7>(value.data())
            .map_err(|_| CryptoError::Decryption),
        EncryptionType::AesCbc256B64 | EncryptionType::AesCbc256HmacSha256B64 => {
            cbc::Decryptor::<Aes256>::new_from_slices(key.enc_key(), iv)
                .map_err(|_| CryptoError::Decryption)?
                .decrypt_padded_vec_mut::<Pkcs7>(value.data())
                .map_err(|_| CryptoError::Decryption)
        }
        _ => Err(CryptoError::Decryption),
    }
}

fn compute_mac(mac_key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    mac.update(iv);
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_symmetric_types() {
        let keys = [
            SymmetricKeyMaterial::generate(),
            SymmetricKeyMaterial::from_bytes(vec![3; 32]).unwrap(),
            SymmetricKeyMaterial::with_type(vec![5; 32], EncryptionType::AesCbc128HmacSha256B64)
                .unwrap(),
        ];
        for key in &keys {
            let enc = encrypt(key, b"correct horse").unwrap();
            assert_eq!(enc.enc_type(), key.enc_type());
            assert_eq!(decrypt(key, &enc).unwrap(), b"correct horse");
        }
    }

    #[test]
    fn mac_has_expected_length() {
        let key = SymmetricKeyMaterial::generate();
        let enc = encrypt(&key, b"x").unwrap();
        assert_eq!(enc.mac().unwrap().len(), MAC_SIZE);
        assert_eq!(enc.iv().unwrap().len(), IV_SIZE);
    }

    #[test]
    fn wrong_key_fails() {
        let enc = encrypt(&SymmetricKeyMaterial::generate(), b"secret").unwrap();
        let other = SymmetricKeyMaterial::generate();
        assert_eq!(decrypt(&other, &enc).unwrap_err(), CryptoError::Decryption);
    }

    #[test]
    fn type_mismatch_fails_like_any_other_error() {
        let enc = encrypt(&SymmetricKeyMaterial::generate(), b"secret").unwrap();
        let plain_key = SymmetricKeyMaterial::from_bytes(vec![0; 32]).unwrap();
        assert_eq!(decrypt(&plain_key, &enc).unwrap_err(), CryptoError::Decryption);
    }

    #[test]
    fn empty_plaintext_round_trips() {
        let key = SymmetricKeyMaterial::generate();
        let enc = encrypt(&key, b"").unwrap();
        assert_eq!(enc.data().len(), IV_SIZE);
        assert!(decrypt(&key, &enc).unwrap().is_empty());
    }
}
