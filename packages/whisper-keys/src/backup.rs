//! Contact-backup sealing — XSalsa20-Poly1305 secretbox under the
//! `contacts` sub-seed. The relay stores `(nonce, ciphertext)` verbatim and
//! can never read the contact list.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, XSalsa20Poly1305};

use crate::envelope::{NONCE_LEN, generate_nonce};
use crate::{KeyBundle, KeysError};

/// What `PUT /backup/contacts` carries.
pub struct SealedBackup {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
}

impl KeyBundle {
    /// Encrypt the serialized contact list for upload.
    pub fn seal_backup(&self, plaintext: &[u8]) -> Result<SealedBackup, KeysError> {
        let nonce = generate_nonce();
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.contacts[..]));
        let ciphertext = cipher
            .encrypt(&nonce.into(), plaintext)
            .map_err(|_| KeysError::Crypto("secretbox encryption failed"))?;
        Ok(SealedBackup {
            nonce_b64: whisper_common::crypto::to_base64(&nonce),
            ciphertext_b64: whisper_common::crypto::to_base64(&ciphertext),
        })
    }

    /// Decrypt a downloaded backup blob.
    pub fn open_backup(
        &self,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeysError> {
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.contacts[..]));
        cipher
            .decrypt(&(*nonce).into(), ciphertext)
            .map_err(|_| KeysError::Crypto("secretbox decryption failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn backup_round_trips_through_opaque_storage() {
        let bundle = KeyBundle::from_mnemonic(MNEMONIC, "").unwrap();
        let contacts = br#"[{"whisperId":"WSP-AAAA-BBBB-CCCC","name":"A"}]"#;

        let sealed = bundle.seal_backup(contacts).unwrap();

        // The relay hands back the exact pair it stored.
        let nonce: [u8; NONCE_LEN] = whisper_common::crypto::from_base64(&sealed.nonce_b64)
            .unwrap()
            .try_into()
            .unwrap();
        let ciphertext = whisper_common::crypto::from_base64(&sealed.ciphertext_b64).unwrap();

        let opened = bundle.open_backup(&nonce, &ciphertext).unwrap();
        assert_eq!(opened, contacts);
    }

    #[test]
    fn nonce_is_exactly_24_bytes_on_the_wire() {
        let bundle = KeyBundle::from_mnemonic(MNEMONIC, "").unwrap();
        let sealed = bundle.seal_backup(b"contacts").unwrap();
        let nonce = whisper_common::crypto::from_base64(&sealed.nonce_b64).unwrap();
        assert_eq!(nonce.len(), 24);
    }

    #[test]
    fn other_mnemonic_cannot_open() {
        let a = KeyBundle::from_mnemonic(MNEMONIC, "").unwrap();
        let b = KeyBundle::from_mnemonic(MNEMONIC, "other-device-passphrase").unwrap();
        let sealed = a.seal_backup(b"contacts").unwrap();

        let nonce: [u8; NONCE_LEN] = whisper_common::crypto::from_base64(&sealed.nonce_b64)
            .unwrap()
            .try_into()
            .unwrap();
        let ciphertext = whisper_common::crypto::from_base64(&sealed.ciphertext_b64).unwrap();
        assert!(b.open_backup(&nonce, &ciphertext).is_err());
    }
}
