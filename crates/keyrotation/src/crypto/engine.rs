//! [`CipherEngine`]: authenticated encryption for one key and one cipher.
//!
//! **AES-CBC** payloads are Encrypt-then-MAC: the HMAC-SHA256 over the base64
//! IV and base64 ciphertext is verified in constant time before a single
//! block is decrypted. Reordering those two steps reintroduces a padding
//! oracle.
//!
//! **AES-GCM** payloads carry a detached 16-byte tag; decryption and tag
//! verification happen in one step and never yield partial plaintext.
//!
//! Only zeroizing key copies live as long as the engine. The HMAC state is
//! keyed afresh for each payload and dropped with the call.

use std::fmt;

use aes::{Aes128, Aes256};
use aes_gcm::{
    aead::{generic_array::GenericArray, rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes128Gcm, Aes256Gcm,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, InnerIvInit};
use common::{
    ConfigError, DecryptError, EncryptError, Envelope, FormatError, IntegrityError,
};
use hmac::{Hmac, Mac};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use super::cipher::{Cipher, GCM_TAG_LEN};
use crate::key::KeyMaterial;

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 block size. HMAC zero-pads shorter keys to this length, so a
/// padded copy keys it exactly like the raw key.
const HMAC_KEY_BLOCK: usize = 64;

type MacKey = Zeroizing<[u8; HMAC_KEY_BLOCK]>;

/// Decrypted bytes, wiped from memory when dropped.
pub type Plaintext = Zeroizing<Vec<u8>>;

/// Errors from the typed-value helpers [`CipherEngine::encrypt_value`] and
/// [`CipherEngine::decrypt_value`].
#[derive(Debug, Error)]
pub enum ValueError {
    #[error(transparent)]
    Encrypt(#[from] EncryptError),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("value (de)serialisation failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Keyed primitives, built once at construction.
#[derive(Clone)]
enum Backend {
    Aes128Cbc { aes: Aes128, mac: MacKey },
    Aes256Cbc { aes: Aes256, mac: MacKey },
    Aes128Gcm(Aes128Gcm),
    Aes256Gcm(Aes256Gcm),
}

/// Encrypts and decrypts [`Envelope`]s under one key.
///
/// Immutable after construction and stateless across calls: every
/// encryption draws a fresh IV from the OS CSPRNG. Safe to share between
/// threads.
#[derive(Clone)]
pub struct CipherEngine {
    cipher: Cipher,
    backend: Backend,
}

impl CipherEngine {
    /// Bind `key` to `cipher`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidKeyLength`] if the key is not exactly
    /// [`Cipher::key_len`] bytes.
    pub fn new(key: KeyMaterial, cipher: Cipher) -> Result<Self, ConfigError> {
        if !Self::supported(key.len(), cipher) {
            return Err(invalid_length(&key, cipher));
        }
        let bytes = key.as_bytes();
        let backend = match cipher {
            Cipher::Aes128Cbc => Backend::Aes128Cbc {
                aes: Aes128::new_from_slice(bytes).map_err(|_| invalid_length(&key, cipher))?,
                mac: mac_key(&key),
            },
            Cipher::Aes256Cbc => Backend::Aes256Cbc {
                aes: Aes256::new_from_slice(bytes).map_err(|_| invalid_length(&key, cipher))?,
                mac: mac_key(&key),
            },
            Cipher::Aes128Gcm => Backend::Aes128Gcm(
                Aes128Gcm::new_from_slice(bytes).map_err(|_| invalid_length(&key, cipher))?,
            ),
            Cipher::Aes256Gcm => Backend::Aes256Gcm(
                Aes256Gcm::new_from_slice(bytes).map_err(|_| invalid_length(&key, cipher))?,
            ),
        };
        debug!(cipher = %cipher, "cipher engine ready");
        Ok(Self { cipher, backend })
    }

    /// Parse a key string (see [`KeyMaterial::parse`]) and a cipher name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedCipher`],
    /// [`ConfigError::MalformedKeyEncoding`], or
    /// [`ConfigError::InvalidKeyLength`].
    pub fn from_parts(key: &str, cipher: &str) -> Result<Self, ConfigError> {
        let cipher: Cipher = cipher.parse()?;
        Self::new(KeyMaterial::parse(key)?, cipher)
    }

    /// Whether a key of `key_len` bytes can be used with `cipher`.
    pub fn supported(key_len: usize, cipher: Cipher) -> bool {
        key_len == cipher.key_len()
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    /// Encrypt `plaintext` into a new [`Envelope`].
    ///
    /// `serialized` records whether `plaintext` is a serialized value; it is
    /// written to the envelope only when `true`.
    ///
    /// # Errors
    ///
    /// Returns [`EncryptError::PlaintextTooLarge`] only when an AES-GCM
    /// message exceeds the mode's length limit. A failing OS random source
    /// panics.
    pub fn encrypt(&self, plaintext: &[u8], serialized: bool) -> Result<Envelope, EncryptError> {
        let mut iv = vec![0u8; self.cipher.iv_len()];
        OsRng.fill_bytes(&mut iv);
        let iv_text = STANDARD.encode(&iv);

        let sealed = match &self.backend {
            Backend::Aes128Cbc { aes, mac } => seal_cbc(aes, mac, &iv, &iv_text, plaintext),
            Backend::Aes256Cbc { aes, mac } => seal_cbc(aes, mac, &iv, &iv_text, plaintext),
            Backend::Aes128Gcm(aead) => seal_gcm(aead, &iv, plaintext)?,
            Backend::Aes256Gcm(aead) => seal_gcm(aead, &iv, plaintext)?,
        };

        Ok(Envelope {
            iv: iv_text,
            value: sealed.value,
            mac: sealed.mac,
            tag: sealed.tag,
            serialized: serialized.then_some(true),
        })
    }

    /// Verify and decrypt `envelope`.
    ///
    /// Structural checks run first, then integrity, then decryption.
    /// `expect_serialized` is compared against the envelope's flag when the
    /// envelope carries one; deserialising the returned bytes is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns [`DecryptError::Format`] for structurally invalid envelopes and
    /// [`DecryptError::Integrity`] when the MAC or tag does not verify.
    pub fn decrypt(
        &self,
        envelope: &Envelope,
        expect_serialized: bool,
    ) -> Result<Plaintext, DecryptError> {
        if envelope
            .serialized
            .is_some_and(|flag| flag != expect_serialized)
        {
            return Err(FormatError::SerializationMismatch.into());
        }

        let iv = STANDARD
            .decode(&envelope.iv)
            .map_err(|_| FormatError::InvalidIv)?;
        if iv.len() != self.cipher.iv_len() {
            return Err(FormatError::InvalidIv.into());
        }
        let ciphertext = STANDARD
            .decode(&envelope.value)
            .map_err(|_| FormatError::Malformed)?;

        match &self.backend {
            Backend::Aes128Cbc { aes, mac } => open_cbc(aes, mac, envelope, &iv, &ciphertext),
            Backend::Aes256Cbc { aes, mac } => open_cbc(aes, mac, envelope, &iv, &ciphertext),
            Backend::Aes128Gcm(aead) => open_gcm(aead, envelope, &iv, ciphertext),
            Backend::Aes256Gcm(aead) => open_gcm(aead, envelope, &iv, ciphertext),
        }
    }

    /// Parse envelope text and decrypt it.
    ///
    /// # Errors
    ///
    /// As [`CipherEngine::decrypt`], plus [`FormatError::Malformed`] when the
    /// text is not an envelope.
    pub fn decrypt_str(&self, text: &str, expect_serialized: bool) -> Result<Plaintext, DecryptError> {
        let envelope = Envelope::decode(text)?;
        self.decrypt(&envelope, expect_serialized)
    }

    /// Encrypt a raw string, returning envelope text.
    pub fn encrypt_string(&self, value: &str) -> Result<String, EncryptError> {
        Ok(self.encrypt(value.as_bytes(), false)?.encode())
    }

    /// Decrypt envelope text holding a raw UTF-8 string.
    ///
    /// # Errors
    ///
    /// As [`CipherEngine::decrypt_str`]; non-UTF-8 plaintext is
    /// [`FormatError::Malformed`].
    pub fn decrypt_string(&self, text: &str) -> Result<String, DecryptError> {
        let plaintext = self.decrypt_str(text, false)?;
        String::from_utf8(plaintext.to_vec()).map_err(|_| FormatError::Malformed.into())
    }

    /// Serialise `value` as JSON and encrypt it, marking the envelope serialized.
    pub fn encrypt_value<T: Serialize>(&self, value: &T) -> Result<String, ValueError> {
        let json = Zeroizing::new(serde_json::to_vec(value)?);
        Ok(self.encrypt(&json, true)?.encode())
    }

    /// Decrypt envelope text and deserialise the JSON value it holds.
    pub fn decrypt_value<T: DeserializeOwned>(&self, text: &str) -> Result<T, ValueError> {
        let plaintext = self.decrypt_str(text, true)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl fmt::Debug for CipherEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherEngine")
            .field("cipher", &self.cipher.name())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn invalid_length(key: &KeyMaterial, cipher: Cipher) -> ConfigError {
    ConfigError::InvalidKeyLength {
        cipher: cipher.name().to_owned(),
        expected: cipher.key_len(),
        actual: key.len(),
    }
}

// Callers have checked the key length against the cipher.
fn mac_key(key: &KeyMaterial) -> MacKey {
    let mut block = Zeroizing::new([0u8; HMAC_KEY_BLOCK]);
    block[..key.len()].copy_from_slice(key.as_bytes());
    block
}

/// Wire text of the sealed fields.
struct Sealed {
    value: String,
    mac: String,
    tag: String,
}

/// HMAC over the wire text of `iv` and `value`, as stored in the envelope.
fn payload_mac(key: &MacKey, iv: &str, value: &str) -> HmacSha256 {
    let mut mac = <HmacSha256 as KeyInit>::new(GenericArray::from_slice(&key[..]));
    mac.update(iv.as_bytes());
    mac.update(value.as_bytes());
    mac
}

fn seal_cbc<C>(aes: &C, mac: &MacKey, iv: &[u8], iv_text: &str, plaintext: &[u8]) -> Sealed
where
    C: BlockCipher + BlockEncryptMut + Clone,
{
    let ciphertext = cbc::Encryptor::<C>::inner_iv_init(aes.clone(), GenericArray::from_slice(iv))
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let value = STANDARD.encode(ciphertext);
    let tag = payload_mac(mac, iv_text, &value).finalize().into_bytes();
    Sealed {
        mac: hex::encode(tag),
        value,
        tag: String::new(),
    }
}

fn open_cbc<C>(
    aes: &C,
    mac: &MacKey,
    envelope: &Envelope,
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Plaintext, DecryptError>
where
    C: BlockCipher + BlockDecryptMut + Clone,
{
    if envelope.has_tag() {
        return Err(FormatError::UnexpectedTag.into());
    }

    let expected = hex::decode(&envelope.mac).map_err(|_| IntegrityError::MacMismatch)?;
    payload_mac(mac, &envelope.iv, &envelope.value)
        .verify_slice(&expected)
        .map_err(|_| IntegrityError::MacMismatch)?;

    cbc::Decryptor::<C>::inner_iv_init(aes.clone(), GenericArray::from_slice(iv))
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| FormatError::InvalidPadding.into())
}

fn seal_gcm<A: AeadInPlace>(aead: &A, nonce: &[u8], plaintext: &[u8]) -> Result<Sealed, EncryptError> {
    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = aead
        .encrypt_in_place_detached(GenericArray::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| EncryptError::PlaintextTooLarge)?;
    Ok(Sealed {
        value: STANDARD.encode(&*buffer),
        mac: String::new(),
        tag: STANDARD.encode(tag),
    })
}

fn open_gcm<A: AeadInPlace>(
    aead: &A,
    envelope: &Envelope,
    nonce: &[u8],
    ciphertext: Vec<u8>,
) -> Result<Plaintext, DecryptError> {
    let tag = STANDARD
        .decode(&envelope.tag)
        .map_err(|_| FormatError::InvalidTag)?;
    if tag.len() != GCM_TAG_LEN {
        return Err(FormatError::InvalidTag.into());
    }

    let mut buffer = Zeroizing::new(ciphertext);
    aead.decrypt_in_place_detached(
        GenericArray::from_slice(nonce),
        b"",
        &mut buffer,
        GenericArray::from_slice(&tag),
    )
    .map_err(|_| IntegrityError::TagMismatch)?;
    Ok(buffer)
}
