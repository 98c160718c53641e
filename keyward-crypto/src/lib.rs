//! Encryption layer for Keyward.
//!
//! Provides the at-rest representation of every sensitive vault field:
//! - [`EncodedValue`]: ciphertext plus its declared algorithm, in the
//!   `type.iv|data|mac` wire format
//! - [`SymmetricKeyMaterial`]: decrypted key bytes split into encryption and
//!   authentication subkeys, zeroized on drop
//! - [`CryptoService`]: the only path by which plaintext is produced
//!
//! # Architecture
//!
//! Key hierarchy (the vault crate owns the keys, this crate only uses them):
//!
//! 1. **User key**: unlocked by the account owner, held only while the
//!    vault is unlocked.
//! 2. **Organization / provider keys**: encrypted to the user and decrypted
//!    into the key ring on unlock or rotation.
//! 3. **Item keys**: optional per-cipher and per-send keys, encrypted with
//!    the user or organization key.

mod cipher;
mod enc_type;
mod encoded;
mod error;
mod key;
pub mod service;

pub use cipher::{decrypt, encrypt, IV_SIZE, MAC_SIZE};
pub use enc_type::EncryptionType;
pub use encoded::EncodedValue;
pub use error::{CryptoError, CryptoResult};
pub use key::{SymmetricKeyMaterial, KEY_SIZE};
pub use service::{AesCryptoService, CryptoService};
