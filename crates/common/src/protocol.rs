//! The envelope wire format exchanged with callers and stored by them.
//!
//! ```text
//! base64( {"iv":"<b64>","value":"<b64>","mac":"<hex>","tag":"<b64>"[,"serialized":true]} )
//! ```
//!
//! The layout matches the encrypted payloads Laravel applications store, so
//! existing sessions, cookies, and encrypted columns can be read as-is.
//! Field text is kept exactly as it appeared on the wire because the MAC of
//! non-AEAD payloads is computed over the base64 text, not the raw bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FormatError;

/// One encrypted unit: IV, ciphertext, and integrity value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the raw IV / nonce.
    pub iv: String,
    /// Base64 of the raw ciphertext (without the AEAD tag).
    pub value: String,
    /// Lowercase hex HMAC-SHA256 for non-AEAD ciphers, empty otherwise.
    pub mac: String,
    /// Base64 of the AEAD tag, empty for non-AEAD ciphers.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tag: String,
    /// Whether the plaintext is a serialized value rather than a raw string.
    /// Absent on payloads written by other producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized: Option<bool>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    /// Encode to the outer base64 text handed back to callers.
    pub fn encode(&self) -> String {
        // A struct of strings and an optional bool always serialises.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }

    /// Parse the outer base64 text into an [`Envelope`].
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Malformed`] if the text is not padded base64,
    /// the decoded bytes are not a JSON object, or `iv`, `value`, or `mac`
    /// is missing or not a string.
    pub fn decode(text: &str) -> Result<Self, FormatError> {
        let json = STANDARD.decode(text).map_err(|_| FormatError::Malformed)?;
        serde_json::from_slice(&json).map_err(|_| FormatError::Malformed)
    }

    /// `true` when the envelope carries a non-empty AEAD tag.
    pub fn has_tag(&self) -> bool {
        !self.tag.is_empty()
    }
}
