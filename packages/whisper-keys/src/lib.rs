//! # whisper-keys
//!
//! Client-side key material for Whisper2. Everything here must be
//! bit-exact across platforms — iOS, Android, and this crate derive the
//! same keys from the same mnemonic:
//!
//! - BIP39 mnemonic → 64-byte seed (PBKDF2-HMAC-SHA512, 2048 iterations)
//! - HKDF-SHA256 (salt `"whisper"`) → `encryption` / `signing` /
//!   `contacts` sub-seeds
//! - X25519 + XSalsa20-Poly1305 (NaCl box) for message envelopes
//! - Ed25519 over SHA-256 digests for envelope signatures and
//!   registration challenge proofs
//! - XSalsa20-Poly1305 secretbox for the zero-knowledge contact backup
//!
//! The relay never sees any of the private halves.

mod backup;
mod derive;
mod envelope;

pub use backup::SealedBackup;
pub use derive::KeyBundle;
pub use envelope::{NONCE_LEN, SealedEnvelope, generate_nonce};

/// Errors from derivation or envelope crypto.
#[derive(Debug, thiserror::Error)]
pub enum KeysError {
    #[error("invalid mnemonic: {0}")]
    BadMnemonic(String),
    #[error("{0}")]
    Crypto(&'static str),
}
