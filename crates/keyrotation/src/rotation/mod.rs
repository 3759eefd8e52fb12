//! Old-key → new-key re-encryption.
//!
//! # Security invariants
//!
//! - The plaintext recovered under the old key is **never** returned, logged,
//!   or included in an error; it lives in a zeroizing buffer for the length of
//!   one call.
//! - Every decrypt failure under the old key is reported as the same
//!   [`RotationError::OldKeyOrPayloadInvalid`](common::RotationError).

pub mod rotator;

pub use rotator::{KeyRotator, ReEncrypter};
