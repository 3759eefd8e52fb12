//! Common types, wire format, and errors shared across `app-key-rotation` crates.

pub mod error;
pub mod protocol;

pub use error::{
    ConfigError, DecryptError, EncryptError, FormatError, IntegrityError, KeySide, RotationError,
    SetupError,
};
pub use protocol::Envelope;
