//! Supported cipher identifiers and their parameters.

use std::fmt;
use std::str::FromStr;

use common::ConfigError;

/// Byte length of an AES-CBC IV (one AES block).
pub const CBC_IV_LEN: usize = 16;

/// Byte length of an AES-GCM nonce (96 bits).
pub const GCM_NONCE_LEN: usize = 12;

/// Byte length of an AES-GCM authentication tag.
pub const GCM_TAG_LEN: usize = 16;

/// Algorithm and mode an engine is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    Aes128Cbc,
    Aes256Cbc,
    Aes128Gcm,
    Aes256Gcm,
}

impl Cipher {
    pub const ALL: [Cipher; 4] = [
        Cipher::Aes128Cbc,
        Cipher::Aes256Cbc,
        Cipher::Aes128Gcm,
        Cipher::Aes256Gcm,
    ];

    /// Canonical lowercase name, e.g. `"aes-256-cbc"`.
    pub fn name(self) -> &'static str {
        match self {
            Cipher::Aes128Cbc => "aes-128-cbc",
            Cipher::Aes256Cbc => "aes-256-cbc",
            Cipher::Aes128Gcm => "aes-128-gcm",
            Cipher::Aes256Gcm => "aes-256-gcm",
        }
    }

    pub fn key_len(self) -> usize {
        match self {
            Cipher::Aes128Cbc | Cipher::Aes128Gcm => 16,
            Cipher::Aes256Cbc | Cipher::Aes256Gcm => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        if self.is_aead() {
            GCM_NONCE_LEN
        } else {
            CBC_IV_LEN
        }
    }

    /// `true` for modes that authenticate via their own tag instead of a MAC.
    pub fn is_aead(self) -> bool {
        matches!(self, Cipher::Aes128Gcm | Cipher::Aes256Gcm)
    }
}

impl FromStr for Cipher {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cipher::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnsupportedCipher(s.to_owned()))
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
