//! Authenticated envelope encryption primitives.
//!
//! This module is free of I/O and configuration lookups. It provides the
//! cipher table and the per-key engine used by the rotation layer.
//!
//! # Envelope format
//!
//! ```text
//! base64( {"iv":"…","value":"…","mac":"…","tag":"…"} )
//! ```
//!
//! - AES-CBC: `mac` is hex HMAC-SHA256(key, iv ‖ value), `tag` is empty.
//! - AES-GCM: `tag` is the base64 16-byte AEAD tag, `mac` is empty.

pub mod cipher;
pub mod engine;

pub use cipher::Cipher;
pub use engine::{CipherEngine, Plaintext, ValueError};
