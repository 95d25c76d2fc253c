//! Envelope crypto — what clients do around the relay's canonical form.
//!
//! Encryption is NaCl box (X25519 + XSalsa20-Poly1305) binding the sender's
//! private key, the recipient's public key, and a fresh 24-byte nonce.
//! Signatures are Ed25519 over the SHA-256 digest of the relay's canonical
//! byte string; the relay verifies the same digest. Registration proofs
//! sign the SHA-256 digest of the raw challenge bytes.

use crypto_box::SalsaBox;
use crypto_box::aead::Aead;
use ed25519_dalek::Signer;
use rand::RngCore;

use whisper_common::crypto::{canonical_signing_bytes, sha256, to_base64};

use crate::{KeyBundle, KeysError};

/// A 24-byte box nonce.
pub const NONCE_LEN: usize = 24;

/// Output of sealing one message for one recipient: everything the signed
/// envelope carries besides routing fields.
pub struct SealedEnvelope {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub sig_b64: String,
}

/// Generate a fresh random nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

impl KeyBundle {
    /// Encrypt `plaintext` for `recipient_enc_pub` and sign the canonical
    /// form the relay will verify.
    #[allow(clippy::too_many_arguments)]
    pub fn seal_envelope(
        &self,
        recipient_enc_pub: &[u8; 32],
        msg_type: &str,
        message_id: &str,
        from: &str,
        to: &str,
        timestamp: i64,
        plaintext: &[u8],
    ) -> Result<SealedEnvelope, KeysError> {
        let nonce = generate_nonce();
        let cipher = SalsaBox::new(&crypto_box::PublicKey::from(*recipient_enc_pub), &self.encryption);
        let ciphertext = cipher
            .encrypt(&nonce.into(), plaintext)
            .map_err(|_| KeysError::Crypto("box encryption failed"))?;

        let nonce_b64 = to_base64(&nonce);
        let ciphertext_b64 = to_base64(&ciphertext);
        let canonical = canonical_signing_bytes(
            msg_type,
            message_id,
            from,
            to,
            timestamp,
            &nonce_b64,
            &ciphertext_b64,
        );
        let sig_b64 = self.sign_digest(&canonical);

        Ok(SealedEnvelope { nonce_b64, ciphertext_b64, sig_b64 })
    }

    /// Open an envelope from `sender_enc_pub`.
    pub fn open_envelope(
        &self,
        sender_enc_pub: &[u8; 32],
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, KeysError> {
        let cipher = SalsaBox::new(&crypto_box::PublicKey::from(*sender_enc_pub), &self.encryption);
        cipher
            .decrypt(&(*nonce).into(), ciphertext)
            .map_err(|_| KeysError::Crypto("box decryption failed"))
    }

    /// Sign the SHA-256 digest of `covered` — the relay-side verification
    /// contract for envelopes and challenges alike.
    pub fn sign_digest(&self, covered: &[u8]) -> String {
        let digest = sha256(covered);
        to_base64(&self.signing.sign(&digest).to_bytes())
    }

    /// Registration proof: sign the digest of the raw 32 challenge bytes.
    pub fn sign_challenge(&self, challenge: &[u8]) -> String {
        self.sign_digest(challenge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_common::crypto::verify_signed_digest;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn peers() -> (KeyBundle, KeyBundle) {
        let alice = KeyBundle::from_mnemonic(MNEMONIC, "alice").unwrap();
        let bob = KeyBundle::from_mnemonic(MNEMONIC, "bob").unwrap();
        (alice, bob)
    }

    #[test]
    fn seal_then_open_round_trips() {
        let (alice, bob) = peers();
        let bob_pub = *bob.encryption.public_key().as_bytes();
        let alice_pub = *alice.encryption.public_key().as_bytes();

        let sealed = alice
            .seal_envelope(
                &bob_pub,
                "text",
                "m1",
                &alice.whisper_id(),
                &bob.whisper_id(),
                1_700_000_000_000,
                b"hello bob",
            )
            .unwrap();

        let nonce: [u8; NONCE_LEN] = whisper_common::crypto::from_base64(&sealed.nonce_b64)
            .unwrap()
            .try_into()
            .unwrap();
        let ciphertext = whisper_common::crypto::from_base64(&sealed.ciphertext_b64).unwrap();

        let plaintext = bob.open_envelope(&alice_pub, &nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello bob");
    }

    #[test]
    fn relay_accepts_the_signature() {
        let (alice, bob) = peers();
        let bob_pub = *bob.encryption.public_key().as_bytes();

        let sealed = alice
            .seal_envelope(
                &bob_pub,
                "text",
                "m1",
                &alice.whisper_id(),
                &bob.whisper_id(),
                42,
                b"payload",
            )
            .unwrap();

        let canonical = canonical_signing_bytes(
            "text",
            "m1",
            &alice.whisper_id(),
            &bob.whisper_id(),
            42,
            &sealed.nonce_b64,
            &sealed.ciphertext_b64,
        );
        verify_signed_digest(&alice.sign_public_key_b64(), &sealed.sig_b64, &canonical)
            .expect("relay-side verification must accept a client-sealed envelope");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let (alice, bob) = peers();
        let eve = KeyBundle::from_mnemonic(MNEMONIC, "eve").unwrap();
        let bob_pub = *bob.encryption.public_key().as_bytes();
        let alice_pub = *alice.encryption.public_key().as_bytes();

        let sealed = alice
            .seal_envelope(&bob_pub, "text", "m1", "a", "b", 1, b"secret")
            .unwrap();
        let nonce: [u8; NONCE_LEN] = whisper_common::crypto::from_base64(&sealed.nonce_b64)
            .unwrap()
            .try_into()
            .unwrap();
        let ciphertext = whisper_common::crypto::from_base64(&sealed.ciphertext_b64).unwrap();

        assert!(eve.open_envelope(&alice_pub, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let (alice, bob) = peers();
        let bob_pub = *bob.encryption.public_key().as_bytes();
        let alice_pub = *alice.encryption.public_key().as_bytes();

        let sealed = alice
            .seal_envelope(&bob_pub, "text", "m1", "a", "b", 1, b"secret")
            .unwrap();
        let nonce: [u8; NONCE_LEN] = whisper_common::crypto::from_base64(&sealed.nonce_b64)
            .unwrap()
            .try_into()
            .unwrap();
        let mut ciphertext = whisper_common::crypto::from_base64(&sealed.ciphertext_b64).unwrap();
        ciphertext[0] ^= 0x01;

        assert!(bob.open_envelope(&alice_pub, &nonce, &ciphertext).is_err());
    }

    #[test]
    fn challenge_proof_verifies_relay_side() {
        let alice = KeyBundle::from_mnemonic(MNEMONIC, "").unwrap();
        let challenge = [7u8; 32];
        let proof = alice.sign_challenge(&challenge);
        verify_signed_digest(&alice.sign_public_key_b64(), &proof, &challenge)
            .expect("challenge proof must verify");
    }
}
