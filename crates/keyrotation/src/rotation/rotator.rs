//! [`KeyRotator`]: re-wraps envelopes from a retiring key to its replacement.

use common::{KeySide, RotationError, SetupError};
use tracing::debug;

use crate::crypto::{Cipher, CipherEngine};
use crate::key::KeyMaterial;

/// Anything that can move one envelope from the old key to the new key.
///
/// Batch drivers depend on this rather than on [`KeyRotator`] directly.
pub trait ReEncrypter {
    /// Re-encrypt `old_envelope`, returning the new envelope text.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError`]; nothing is produced on failure.
    fn re_encrypt(&self, old_envelope: &str, serialized: bool) -> Result<String, RotationError>;
}

/// Two engines bound to the same cipher: one for the retiring key, one for
/// the replacement key.
#[derive(Debug, Clone)]
pub struct KeyRotator {
    old: CipherEngine,
    new: CipherEngine,
}

impl KeyRotator {
    /// Build a rotator from key strings as applications store them
    /// (`base64:`-prefixed or literal) and a cipher name.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Cipher`] for an unsupported cipher, or
    /// [`SetupError::Key`] naming the side whose key was rejected.
    pub fn new(old_key: &str, new_key: &str, cipher: &str) -> Result<Self, SetupError> {
        let cipher: Cipher = cipher.parse().map_err(SetupError::Cipher)?;
        Ok(Self {
            old: engine_for(KeySide::Old, old_key, cipher)?,
            new: engine_for(KeySide::New, new_key, cipher)?,
        })
    }

    /// Build a rotator from engines constructed elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::CipherMismatch`] unless both engines use the same cipher.
    pub fn from_engines(old: CipherEngine, new: CipherEngine) -> Result<Self, SetupError> {
        if old.cipher() != new.cipher() {
            return Err(SetupError::CipherMismatch {
                old: old.cipher().name().to_owned(),
                new: new.cipher().name().to_owned(),
            });
        }
        Ok(Self { old, new })
    }

    pub fn cipher(&self) -> Cipher {
        self.old.cipher()
    }

    /// Decrypt `old_envelope` under the old key and encrypt the result under
    /// the new key, carrying `serialized` across.
    ///
    /// # Errors
    ///
    /// Returns [`RotationError::OldKeyOrPayloadInvalid`] for any failure to
    /// decrypt under the old key (wrong key, tampered or malformed payload),
    /// or [`RotationError::NewKeyEncryptFailed`] if the new engine refuses
    /// the plaintext.
    pub fn re_encrypt(&self, old_envelope: &str, serialized: bool) -> Result<String, RotationError> {
        let plaintext = self
            .old
            .decrypt_str(old_envelope, serialized)
            .map_err(|_| {
                debug!(cipher = %self.cipher(), "old envelope rejected");
                RotationError::OldKeyOrPayloadInvalid
            })?;

        let envelope = self
            .new
            .encrypt(&plaintext, serialized)
            .map_err(|_| RotationError::NewKeyEncryptFailed)?;
        Ok(envelope.encode())
    }
}

impl ReEncrypter for KeyRotator {
    fn re_encrypt(&self, old_envelope: &str, serialized: bool) -> Result<String, RotationError> {
        KeyRotator::re_encrypt(self, old_envelope, serialized)
    }
}

fn engine_for(side: KeySide, raw: &str, cipher: Cipher) -> Result<CipherEngine, SetupError> {
    KeyMaterial::parse(raw)
        .and_then(|key| CipherEngine::new(key, cipher))
        .map_err(|source| SetupError::Key { side, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use common::{ConfigError, DecryptError, Envelope, IntegrityError};

    fn b64_key(fill: u8, len: usize) -> String {
        format!("base64:{}", STANDARD.encode(vec![fill; len]))
    }

    fn engine(fill: u8, cipher: Cipher) -> CipherEngine {
        CipherEngine::new(KeyMaterial::from_bytes(&vec![fill; cipher.key_len()]), cipher).unwrap()
    }

    #[test]
    fn hello_rotation_scenario() {
        let k1 = engine(0x00, Cipher::Aes256Cbc);
        let k2 = engine(0x01, Cipher::Aes256Cbc);

        let e1 = k1.encrypt(b"hello-rotation", false).unwrap().encode();
        let raw = STANDARD.decode(&e1).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        for field in ["iv", "value", "mac"] {
            assert!(json[field].is_string(), "{field}");
        }

        let rotator = KeyRotator::new(&b64_key(0x00, 32), &b64_key(0x01, 32), "AES-256-CBC").unwrap();
        let e2 = rotator.re_encrypt(&e1, false).unwrap();

        assert_eq!(&k2.decrypt_str(&e2, false).unwrap()[..], b"hello-rotation");
        assert_eq!(
            k1.decrypt_str(&e2, false),
            Err(DecryptError::Integrity(IntegrityError::MacMismatch))
        );
    }

    #[test]
    fn appended_character_is_rejected() {
        let k1 = engine(0x00, Cipher::Aes256Cbc);
        let e1 = k1.encrypt(b"hello-rotation", false).unwrap().encode();
        let rotator = KeyRotator::new(&b64_key(0x00, 32), &b64_key(0x01, 32), "aes-256-cbc").unwrap();

        assert_eq!(
            rotator.re_encrypt(&format!("{e1}A"), false),
            Err(RotationError::OldKeyOrPayloadInvalid)
        );
    }

    #[test]
    fn rotation_round_trips_every_cipher() {
        for cipher in Cipher::ALL {
            let old = engine(0x21, cipher);
            let new = engine(0x42, cipher);
            let rotator = KeyRotator::new(
                &b64_key(0x21, cipher.key_len()),
                &b64_key(0x42, cipher.key_len()),
                cipher.name(),
            )
            .unwrap();

            let e1 = old.encrypt_string("session payload").unwrap();
            let e2 = rotator.re_encrypt(&e1, false).unwrap();
            assert_eq!(new.decrypt_string(&e2).unwrap(), "session payload", "{cipher}");
            assert!(old.decrypt_string(&e2).is_err(), "{cipher}");
        }
    }

    #[test]
    fn wrong_old_key_is_rejected() {
        let e1 = engine(0x05, Cipher::Aes128Gcm).encrypt_string("x").unwrap();
        let rotator = KeyRotator::new(&b64_key(0x06, 16), &b64_key(0x07, 16), "aes-128-gcm").unwrap();
        assert_eq!(
            rotator.re_encrypt(&e1, false),
            Err(RotationError::OldKeyOrPayloadInvalid)
        );
    }

    #[test]
    fn format_and_integrity_failures_look_the_same() {
        let k1 = engine(0x00, Cipher::Aes256Cbc);
        let rotator = KeyRotator::new(&b64_key(0x00, 32), &b64_key(0x01, 32), "aes-256-cbc").unwrap();

        let mut tampered = k1.encrypt(b"payload", false).unwrap();
        tampered.mac = "00".repeat(32);

        let malformed = rotator.re_encrypt("not an envelope", false).unwrap_err();
        let forged = rotator.re_encrypt(&tampered.encode(), false).unwrap_err();
        assert_eq!(malformed, forged);
        assert_eq!(malformed.to_string(), forged.to_string());
    }

    #[test]
    fn base64_marker_matches_raw_bytes() {
        // A literal 32-character key is the same as its bytes base64-encoded.
        let literal = "0123456789abcdef0123456789abcdef";
        let marked = format!("base64:{}", STANDARD.encode(literal));

        let e1 = CipherEngine::from_parts(literal, "aes-256-cbc")
            .unwrap()
            .encrypt_string("same key")
            .unwrap();
        let via_literal = KeyRotator::new(literal, literal, "aes-256-cbc").unwrap();
        let via_marker = KeyRotator::new(&marked, &marked, "aes-256-cbc").unwrap();

        let e2 = via_literal.re_encrypt(&e1, false).unwrap();
        let e3 = via_marker.re_encrypt(&e2, false).unwrap();
        assert!(via_literal.re_encrypt(&e3, false).is_ok());
    }

    #[test]
    fn identical_construction_accepts_the_same_envelopes() {
        let a = KeyRotator::new(&b64_key(1, 32), &b64_key(2, 32), "aes-256-gcm").unwrap();
        let b = KeyRotator::new(&b64_key(1, 32), &b64_key(2, 32), "aes-256-gcm").unwrap();

        let good = engine(1, Cipher::Aes256Gcm).encrypt_string("p").unwrap();
        let bad = engine(3, Cipher::Aes256Gcm).encrypt_string("p").unwrap();
        assert_eq!(a.re_encrypt(&good, false).is_ok(), b.re_encrypt(&good, false).is_ok());
        assert_eq!(a.re_encrypt(&bad, false), b.re_encrypt(&bad, false));
    }

    #[test]
    fn serialized_flag_is_carried_over() {
        let old = engine(0x10, Cipher::Aes256Cbc);
        let rotator = KeyRotator::new(&b64_key(0x10, 32), &b64_key(0x20, 32), "aes-256-cbc").unwrap();

        let e1 = old.encrypt(b"a:1:{i:0;s:1:\"x\";}", true).unwrap().encode();
        let e2 = rotator.re_encrypt(&e1, true).unwrap();
        assert_eq!(Envelope::decode(&e2).unwrap().serialized, Some(true));

        // A marked payload cannot be rotated as a raw string.
        assert_eq!(
            rotator.re_encrypt(&e1, false),
            Err(RotationError::OldKeyOrPayloadInvalid)
        );
    }

    #[test]
    fn setup_errors_name_the_side() {
        assert!(matches!(
            KeyRotator::new(&b64_key(0, 32), &b64_key(0, 32), "des"),
            Err(SetupError::Cipher(ConfigError::UnsupportedCipher(_)))
        ));
        assert!(matches!(
            KeyRotator::new("short", &b64_key(0, 32), "aes-256-cbc"),
            Err(SetupError::Key { side: KeySide::Old, source: ConfigError::InvalidKeyLength { actual: 5, .. } })
        ));
        assert!(matches!(
            KeyRotator::new(&b64_key(0, 32), "base64:@@", "aes-256-cbc"),
            Err(SetupError::Key { side: KeySide::New, source: ConfigError::MalformedKeyEncoding })
        ));
    }

    #[test]
    fn from_engines_requires_matching_cipher() {
        let err = KeyRotator::from_engines(engine(1, Cipher::Aes256Cbc), engine(2, Cipher::Aes256Gcm))
            .unwrap_err();
        assert!(matches!(err, SetupError::CipherMismatch { .. }));

        let rotator =
            KeyRotator::from_engines(engine(1, Cipher::Aes128Cbc), engine(2, Cipher::Aes128Cbc)).unwrap();
        assert_eq!(rotator.cipher(), Cipher::Aes128Cbc);
    }

    #[test]
    fn shared_across_threads() {
        let old = engine(0x33, Cipher::Aes256Gcm);
        let new = engine(0x44, Cipher::Aes256Gcm);
        let rotator = KeyRotator::from_engines(old.clone(), new.clone()).unwrap();

        std::thread::scope(|s| {
            for i in 0..8 {
                let (old, new, rotator) = (&old, &new, &rotator);
                s.spawn(move || {
                    let text = format!("record-{i}");
                    let e1 = old.encrypt_string(&text).unwrap();
                    let e2 = rotator.re_encrypt(&e1, false).unwrap();
                    assert_eq!(new.decrypt_string(&e2).unwrap(), text);
                });
            }
        });
    }

    #[test]
    fn usable_through_trait() {
        fn rotate(r: &dyn ReEncrypter, text: &str) -> Result<String, RotationError> {
            r.re_encrypt(text, false)
        }
        let rotator = KeyRotator::new(&b64_key(0, 16), &b64_key(1, 16), "aes-128-cbc").unwrap();
        let e1 = engine(0, Cipher::Aes128Cbc).encrypt_string("t").unwrap();
        assert!(rotate(&rotator, &e1).is_ok());
    }
}
