//! Encryption type tags carried in the header of every encoded value.

use std::fmt;

/// Algorithm tag of an [`EncodedValue`](crate::EncodedValue).
///
/// The numeric codes are part of the wire format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EncryptionType {
    AesCbc256B64 = 0,
    AesCbc128HmacSha256B64 = 1,
    AesCbc256HmacSha256B64 = 2,
    Rsa2048OaepSha256B64 = 3,
    Rsa2048OaepSha1B64 = 4,
    Rsa2048OaepSha256HmacSha256B64 = 5,
    Rsa2048OaepSha1HmacSha256B64 = 6,
}

impl EncryptionType {
    /// Looks up a type by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::AesCbc256B64),
            1 => Some(Self::AesCbc128HmacSha256B64),
            2 => Some(Self::AesCbc256HmacSha256B64),
            3 => Some(Self::Rsa2048OaepSha256B64),
            4 => Some(Self::Rsa2048OaepSha1B64),
            5 => Some(Self::Rsa2048OaepSha256HmacSha256B64),
            6 => Some(Self::Rsa2048OaepSha1HmacSha256B64),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for RSA types, which carry no IV.
    pub fn is_asymmetric(self) -> bool {
        matches!(
            self,
            Self::Rsa2048OaepSha256B64
                | Self::Rsa2048OaepSha1B64
                | Self::Rsa2048OaepSha256HmacSha256B64
                | Self::Rsa2048OaepSha1HmacSha256B64
        )
    }

    pub fn has_iv(self) -> bool {
        !self.is_asymmetric()
    }

    /// True when values of this type carry an HMAC-SHA256 tag.
    pub fn has_mac(self) -> bool {
        matches!(
            self,
            Self::AesCbc128HmacSha256B64
                | Self::AesCbc256HmacSha256B64
                | Self::Rsa2048OaepSha256HmacSha256B64
                | Self::Rsa2048OaepSha1HmacSha256B64
        )
    }

    /// Number of `|`-separated parts after the header.
    pub fn part_count(self) -> usize {
        1 + usize::from(self.has_iv()) + usize::from(self.has_mac())
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AesCbc256B64 => "AesCbc256_B64",
            Self::AesCbc128HmacSha256B64 => "AesCbc128_HmacSha256_B64",
            Self::AesCbc256HmacSha256B64 => "AesCbc256_HmacSha256_B64",
            Self::Rsa2048OaepSha256B64 => "Rsa2048_OaepSha256_B64",
            Self::Rsa2048OaepSha1B64 => "Rsa2048_OaepSha1_B64",
            Self::Rsa2048OaepSha256HmacSha256B64 => "Rsa2048_OaepSha256_HmacSha256_B64",
            Self::Rsa2048OaepSha1HmacSha256B64 => "Rsa2048_OaepSha1_HmacSha256_B64",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=6u8 {
            let t = EncryptionType::from_code(code).unwrap();
            assert_eq!(t.code(), code);
        }
        assert!(EncryptionType::from_code(7).is_none());
    }

    #[test]
    fn part_counts_match_wire_layout() {
        assert_eq!(EncryptionType::AesCbc256B64.part_count(), 2);
        assert_eq!(EncryptionType::AesCbc128HmacSha256B64.part_count(), 3);
        assert_eq!(EncryptionType::AesCbc256HmacSha256B64.part_count(), 3);
        assert_eq!(EncryptionType::Rsa2048OaepSha256B64.part_count(), 1);
        assert_eq!(EncryptionType::Rsa2048OaepSha1B64.part_count(), 1);
        assert_eq!(EncryptionType::Rsa2048OaepSha256HmacSha256B64.part_count(), 2);
        assert_eq!(EncryptionType::Rsa2048OaepSha1HmacSha256B64.part_count(), 2);
    }
}
