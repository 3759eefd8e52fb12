//! [`KeyMaterial`]: decoded symmetric key bytes.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::ConfigError;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Marker that prefixes a base64-encoded key string, e.g. `base64:AAAA…`.
pub const BASE64_MARKER: &str = "base64:";

/// Raw key bytes, wiped from memory on drop.
///
/// Wiping happens only in `Drop`, so a live key can never be blanked while
/// it is still reachable.
#[derive(Clone)]
pub struct KeyMaterial(Vec<u8>);

impl KeyMaterial {
    /// Normalise a key string as applications store it.
    ///
    /// A string starting with [`BASE64_MARKER`] has the marker stripped and
    /// the remainder decoded as standard padded base64. Any other string is
    /// taken literally and its UTF-8 bytes become the key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MalformedKeyEncoding`] if the marker is present
    /// but the remainder is not valid base64.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.strip_prefix(BASE64_MARKER) {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map(Self)
                .map_err(|_| ConfigError::MalformedKeyEncoding),
            None => Ok(Self(raw.as_bytes().to_vec())),
        }
    }

    /// Wrap already-decoded key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material, not even in debug builds.
        write!(f, "KeyMaterial([REDACTED; {}])", self.0.len())
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl ZeroizeOnDrop for KeyMaterial {}
