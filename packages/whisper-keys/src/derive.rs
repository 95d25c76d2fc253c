//! Mnemonic → identity derivation.
//!
//! The chain clients must reproduce bit-exact for interop:
//!
//! 1. BIP39 mnemonic (12 or 24 words) → 64-byte seed via
//!    PBKDF2-HMAC-SHA512(password = NFKD mnemonic, salt = `"mnemonic" +
//!    passphrase`, 2048 iterations). This is exactly BIP39 `to_seed`.
//! 2. Three 32-byte sub-seeds via HKDF-SHA256 with salt `"whisper"` and
//!    info `"encryption"` / `"signing"` / `"contacts"`.
//! 3. `encryption` seeds an X25519 keypair, `signing` an Ed25519 keypair;
//!    `contacts` is the symmetric key for the contact backup.
//!
//! The WhisperID is derived from the Ed25519 public key and is therefore
//! stable across reinstalls on the same mnemonic.

use bip39::{Language, Mnemonic};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::KeysError;

/// HKDF salt — protocol constant, the literal ASCII string `whisper`.
const HKDF_SALT: &[u8] = b"whisper";
const INFO_ENCRYPTION: &[u8] = b"encryption";
const INFO_SIGNING: &[u8] = b"signing";
const INFO_CONTACTS: &[u8] = b"contacts";

/// Everything derived from one mnemonic.
pub struct KeyBundle {
    /// X25519 static secret for envelope encryption.
    pub encryption: crypto_box::SecretKey,
    /// Ed25519 signing key for envelopes and registration challenges.
    pub signing: ed25519_dalek::SigningKey,
    /// Symmetric key for the zero-knowledge contact backup.
    pub contacts: Zeroizing<[u8; 32]>,
}

impl KeyBundle {
    /// Derive the full bundle from a mnemonic phrase and optional
    /// passphrase.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, KeysError> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase)
            .map_err(|e| KeysError::BadMnemonic(e.to_string()))?;
        let word_count = mnemonic.word_count();
        if word_count != 12 && word_count != 24 {
            return Err(KeysError::BadMnemonic(format!(
                "mnemonic must be 12 or 24 words, got {word_count}"
            )));
        }

        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        Ok(Self::from_seed(&seed[..]))
    }

    /// Derive from the 64-byte BIP39 seed (step 2 onward).
    pub fn from_seed(seed: &[u8]) -> Self {
        let encryption = crypto_box::SecretKey::from(sub_seed(seed, INFO_ENCRYPTION));
        let signing = ed25519_dalek::SigningKey::from_bytes(&sub_seed(seed, INFO_SIGNING));
        let contacts = Zeroizing::new(sub_seed(seed, INFO_CONTACTS));
        Self { encryption, signing, contacts }
    }

    /// Generate a fresh mnemonic of `word_count` words (12 or 24).
    pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic, KeysError> {
        if word_count != 12 && word_count != 24 {
            return Err(KeysError::BadMnemonic(format!(
                "mnemonic must be 12 or 24 words, got {word_count}"
            )));
        }
        Mnemonic::generate_in(Language::English, word_count)
            .map_err(|e| KeysError::BadMnemonic(e.to_string()))
    }

    /// The public identifier, a pure function of the signing public key.
    pub fn whisper_id(&self) -> String {
        whisper_common::whisper_id::derive(&self.signing.verifying_key().to_bytes())
    }

    /// X25519 public key, base64 — uploaded at registration.
    pub fn enc_public_key_b64(&self) -> String {
        whisper_common::crypto::to_base64(self.encryption.public_key().as_bytes())
    }

    /// Ed25519 public key, base64 — uploaded at registration.
    pub fn sign_public_key_b64(&self) -> String {
        whisper_common::crypto::to_base64(&self.signing.verifying_key().to_bytes())
    }
}

fn sub_seed(seed: &[u8], info: &[u8]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), seed);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm).expect("32 bytes is a valid HKDF output length");
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    /// BIP39 spec test vector #1 (all-zero entropy, passphrase "TREZOR").
    const VECTOR_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const VECTOR_SEED_HEX: &str =
        "c55257c360c07c72029aebc1b53c05ed0362ada38ead3e3e9efa3708e53495531f09a6987599d18264c1e1c92f2cf141630c7a3c4ab7c81b2f001698e7463b04";

    fn hex_decode(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn bip39_seed_matches_spec_vector() {
        let mnemonic =
            Mnemonic::parse_in_normalized(Language::English, VECTOR_MNEMONIC).unwrap();
        let seed = mnemonic.to_seed("TREZOR");
        assert_eq!(seed.to_vec(), hex_decode(VECTOR_SEED_HEX));
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "").unwrap();
        let b = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "").unwrap();
        assert_eq!(a.whisper_id(), b.whisper_id());
        assert_eq!(a.enc_public_key_b64(), b.enc_public_key_b64());
        assert_eq!(a.sign_public_key_b64(), b.sign_public_key_b64());
        assert_eq!(*a.contacts, *b.contacts);
    }

    #[test]
    fn passphrase_changes_every_key() {
        let plain = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "").unwrap();
        let hidden = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "TREZOR").unwrap();
        assert_ne!(plain.whisper_id(), hidden.whisper_id());
        assert_ne!(plain.enc_public_key_b64(), hidden.enc_public_key_b64());
        assert_ne!(*plain.contacts, *hidden.contacts);
    }

    #[test]
    fn sub_seeds_are_domain_separated() {
        let bundle = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "").unwrap();
        assert_ne!(
            bundle.encryption.to_bytes().to_vec(),
            bundle.signing.to_bytes().to_vec(),
        );
        assert_ne!(bundle.signing.to_bytes(), *bundle.contacts);
    }

    #[test]
    fn whisper_id_is_well_formed() {
        let bundle = KeyBundle::from_mnemonic(VECTOR_MNEMONIC, "").unwrap();
        assert!(whisper_common::whisper_id::is_valid(&bundle.whisper_id()));
    }

    #[test]
    fn generated_mnemonics_round_trip() {
        let mnemonic = KeyBundle::generate_mnemonic(12).unwrap();
        let phrase = mnemonic.to_string();
        let a = KeyBundle::from_mnemonic(&phrase, "").unwrap();
        let b = KeyBundle::from_mnemonic(&phrase, "").unwrap();
        assert_eq!(a.whisper_id(), b.whisper_id());
        assert!(KeyBundle::generate_mnemonic(13).is_err());
    }
}
