//! Authenticated symmetric envelopes and key-rotation re-encryption.
//!
//! ```no_run
//! use keyrotation::KeyRotator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let stored = String::new();
//! let rotator = KeyRotator::new(
//!     "base64:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
//!     "base64:AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=",
//!     "AES-256-CBC",
//! )?;
//! let rewrapped = rotator.re_encrypt(&stored, false)?;
//! # drop(rewrapped);
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod key;
pub mod rotation;

pub use common::{
    ConfigError, DecryptError, EncryptError, Envelope, FormatError, IntegrityError, KeySide,
    RotationError, SetupError,
};
pub use crypto::{Cipher, CipherEngine, Plaintext, ValueError};
pub use key::KeyMaterial;
pub use rotation::{KeyRotator, ReEncrypter};
