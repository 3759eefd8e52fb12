//! Error taxonomy shared by the cipher engine, the key rotator, and the
//! batch driver.
//!
//! The split mirrors where a failure can arise:
//! - [`ConfigError`] / [`SetupError`] → construction time, fatal to the instance.
//! - [`FormatError`] / [`IntegrityError`] → while decrypting one envelope.
//! - [`RotationError`] → the only failure callers of `re_encrypt` ever see.

use std::fmt;

use thiserror::Error;

/// Invalid key or cipher input supplied when building an engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The decoded key does not have the length the cipher requires.
    #[error("invalid key length for {cipher}: expected {expected} bytes, got {actual}")]
    InvalidKeyLength {
        cipher: String,
        expected: usize,
        actual: usize,
    },

    /// The cipher name is not one of the supported algorithm/mode pairs.
    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    /// The key carried the `base64:` marker but the remainder is not valid base64.
    #[error("key has a base64 marker but the payload is not valid base64")]
    MalformedKeyEncoding,
}

/// The envelope cannot be parsed or carries structurally invalid fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    /// Outer base64, JSON structure, a required field, or the value encoding is broken.
    #[error("the payload is invalid")]
    Malformed,

    /// The IV is not base64 or its length does not match the cipher.
    #[error("the payload IV is invalid")]
    InvalidIv,

    /// An AEAD cipher received a missing or wrongly sized tag.
    #[error("the payload tag is invalid")]
    InvalidTag,

    /// A non-AEAD cipher received a non-empty tag.
    #[error("unable to use tag because the cipher does not support AEAD")]
    UnexpectedTag,

    /// The MAC verified but the block padding did not.
    #[error("could not decrypt the data")]
    InvalidPadding,

    /// The envelope's serialization flag disagrees with what the caller expects.
    #[error("the payload serialization flag does not match")]
    SerializationMismatch,
}

/// Integrity verification failed; no plaintext was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("the MAC is invalid")]
    MacMismatch,

    #[error("the authentication tag is invalid")]
    TagMismatch,
}

/// Any failure of a single decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

/// The cipher refused the plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncryptError {
    /// Only reachable past AES-GCM's per-message length limit.
    #[error("plaintext exceeds the cipher's maximum message length")]
    PlaintextTooLarge,
}

/// Which of the two keys in a rotation a setup failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySide {
    Old,
    New,
}

impl fmt::Display for KeySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySide::Old => f.write_str("old"),
            KeySide::New => f.write_str("new"),
        }
    }
}

/// Failure while building a key rotator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("cipher rejected: {0}")]
    Cipher(#[source] ConfigError),

    #[error("{side} key rejected: {source}")]
    Key {
        side: KeySide,
        #[source]
        source: ConfigError,
    },

    /// Pre-built engines were bound to different ciphers.
    #[error("old and new engines must use the same cipher ({old} vs {new})")]
    CipherMismatch { old: String, new: String },
}

/// The externally visible failure of a re-encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RotationError {
    /// Wrong old key and corrupt payload are deliberately indistinguishable.
    #[error("either the old key is incorrect or the payload is invalid")]
    OldKeyOrPayloadInvalid,

    #[error("the new key could not encrypt the recovered payload")]
    NewKeyEncryptFailed,
}
