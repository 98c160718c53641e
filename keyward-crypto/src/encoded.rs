//! The `EncodedValue` wire type.
//!
//! Every encrypted field travels and rests as a single string:
//!
//! ```text
//! <type>.<iv_b64>|<data_b64>|<mac_b64>   authenticated symmetric
//! <type>.<iv_b64>|<data_b64>             unauthenticated symmetric
//! <type>.<data_b64>                      asymmetric
//! <type>.<data_b64>|<mac_b64>            asymmetric with HMAC
//! ```
//!
//! Strings without a `<type>.` header are legacy values: two parts are
//! `AesCbc256_B64`, three parts are `AesCbc128_HmacSha256_B64`.

use crate::error::{CryptoError, CryptoResult};
use crate::EncryptionType;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Ciphertext together with its declared algorithm. Immutable once built.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedValue {
    enc_type: EncryptionType,
    iv: Option<Vec<u8>>,
    data: Vec<u8>,
    mac: Option<Vec<u8>>,
}

impl EncodedValue {
    /// Builds a value, checking that the optional parts match `enc_type`.
    pub fn new(
        enc_type: EncryptionType,
        iv: Option<Vec<u8>>,
        data: Vec<u8>,
        mac: Option<Vec<u8>>,
    ) -> CryptoResult<Self> {
        if enc_type.has_iv() != iv.is_some() {
            return Err(CryptoError::Format(format!(
                "{enc_type} {} an iv",
                if enc_type.has_iv() { "requires" } else { "does not take" }
            )));
        }
        if enc_type.has_mac() != mac.is_some() {
            return Err(CryptoError::Format(format!(
                "{enc_type} {} a mac",
                if enc_type.has_mac() { "requires" } else { "does not take" }
            )));
        }
        Ok(Self {
            enc_type,
            iv,
            data,
            mac,
        })
    }

    /// Parses the pipe-delimited wire form.
    pub fn parse(encoded: &str) -> CryptoResult<Self> {
        let (enc_type, body) = match encoded.split_once('.') {
            Some((header, body)) => {
                let code: u8 = header
                    .parse()
                    .map_err(|_| CryptoError::Format(format!("invalid type header {header:?}")))?;
                let enc_type = EncryptionType::from_code(code)
                    .ok_or_else(|| CryptoError::Format(format!("unknown encryption type {code}")))?;
                (enc_type, body)
            }
            None => {
                let legacy = match encoded.split('|').count() {
                    3 => EncryptionType::AesCbc128HmacSha256B64,
                    _ => EncryptionType::AesCbc256B64,
                };
                (legacy, encoded)
            }
        };

        let parts: Vec<&str> = body.split('|').collect();
        if parts.len() != enc_type.part_count() {
            return Err(CryptoError::Format(format!(
                "{enc_type} expects {} parts, found {}",
                enc_type.part_count(),
                parts.len()
            )));
        }

        let mut parts = parts.into_iter();
        let mut next = || parts.next().map(decode_part).transpose();

        let iv = if enc_type.has_iv() { next()? } else { None };
        let data = next()?.ok_or_else(|| CryptoError::Format("missing data part".into()))?;
        let mac = if enc_type.has_mac() { next()? } else { None };

        Self::new(enc_type, iv, data, mac)
    }

    pub fn enc_type(&self) -> EncryptionType {
        self.enc_type
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn mac(&self) -> Option<&[u8]> {
        self.mac.as_deref()
    }
}

fn decode_part(part: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(part)
        .map_err(|e| CryptoError::Format(format!("invalid base64: {e}")))
}

impl fmt::Display for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.", self.enc_type.code())?;
        if let Some(iv) = &self.iv {
            write!(f, "{}|", STANDARD.encode(iv))?;
        }
        f.write_str(&STANDARD.encode(&self.data))?;
        if let Some(mac) = &self.mac {
            write!(f, "|{}", STANDARD.encode(mac))?;
        }
        Ok(())
    }
}

// Ciphertext is not secret, but a full dump in logs is noise.
impl fmt::Debug for EncodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedValue")
            .field("enc_type", &self.enc_type)
            .field("data_len", &self.data.len())
            .finish_non_exhaustive()
    }
}

impl FromStr for EncodedValue {
    type Err = CryptoError;

    fn from_str(s: &str) -> CryptoResult<Self> {
        Self::parse(s)
    }
}

impl Serialize for EncodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EncodedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IV: &str = "AAECAwQFBgcICQoLDA0ODw==";
    const DATA: &str = "aGVsbG8gd29ybGQ=";
    const MAC: &str = "bWFjbWFjbWFj";

    #[test]
    fn parses_authenticated_symmetric() {
        let v: EncodedValue = format!("2.{IV}|{DATA}|{MAC}").parse().unwrap();
        assert_eq!(v.enc_type(), EncryptionType::AesCbc256HmacSha256B64);
        assert_eq!(v.iv().unwrap().len(), 16);
        assert_eq!(v.data(), b"hello world");
        assert_eq!(v.mac(), Some(&b"macmacmac"[..]));
    }

    #[test]
    fn serializes_back_to_identical_string() {
        let s = format!("2.{IV}|{DATA}|{MAC}");
        assert_eq!(EncodedValue::parse(&s).unwrap().to_string(), s);

        let s = format!("3.{DATA}");
        assert_eq!(EncodedValue::parse(&s).unwrap().to_string(), s);

        let s = format!("0.{IV}|{DATA}");
        assert_eq!(EncodedValue::parse(&s).unwrap().to_string(), s);
    }

    #[test]
    fn missing_mac_is_format_error() {
        let err = EncodedValue::parse(&format!("2.{IV}|{DATA}")).unwrap_err();
        assert!(matches!(err, CryptoError::Format(_)));
    }

    #[test]
    fn asymmetric_rejects_iv() {
        let err = EncodedValue::parse(&format!("3.{IV}|{DATA}")).unwrap_err();
        assert!(matches!(err, CryptoError::Format(_)));
    }

    #[test]
    fn unknown_or_garbled_header() {
        assert!(matches!(
            EncodedValue::parse(&format!("9.{DATA}")),
            Err(CryptoError::Format(_))
        ));
        assert!(matches!(
            EncodedValue::parse(&format!("x.{DATA}")),
            Err(CryptoError::Format(_))
        ));
    }

    #[test]
    fn invalid_base64_is_format_error() {
        let err = EncodedValue::parse(&format!("2.{IV}|not*base64|{MAC}")).unwrap_err();
        assert!(matches!(err, CryptoError::Format(_)));
    }

    #[test]
    fn legacy_headerless_values() {
        let v = EncodedValue::parse(&format!("{IV}|{DATA}")).unwrap();
        assert_eq!(v.enc_type(), EncryptionType::AesCbc256B64);
        assert!(v.to_string().starts_with("0."));

        let v = EncodedValue::parse(&format!("{IV}|{DATA}|{MAC}")).unwrap();
        assert_eq!(v.enc_type(), EncryptionType::AesCbc128HmacSha256B64);
        assert!(v.to_string().starts_with("1."));
    }

    #[test]
    fn new_validates_arity() {
        assert!(EncodedValue::new(EncryptionType::AesCbc256HmacSha256B64, Some(vec![0; 16]), vec![1], None).is_err());
        assert!(EncodedValue::new(EncryptionType::Rsa2048OaepSha1B64, None, vec![1], None).is_ok());
    }

    #[test]
    fn serde_uses_wire_string() {
        let s = format!("2.{IV}|{DATA}|{MAC}");
        let v = EncodedValue::parse(&s).unwrap();
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, format!("\"{s}\""));
        let back: EncodedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<EncodedValue>("\"2.abc\"").is_err());
    }
}
