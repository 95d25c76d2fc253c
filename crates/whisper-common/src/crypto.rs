//! Signature verification and key-material validation.
//!
//! The relay deliberately performs no encryption or decryption. This module
//! contains only:
//!
//! - **Canonical form** — the exact byte string an envelope signature covers.
//! - **Ed25519 verification** — envelopes and registration challenges. In both
//!   cases the client signs the SHA-256 digest of the covered bytes, and the
//!   relay verifies against the identity's stored signing key.
//! - **Key material validation** — base64 decoding with exact length checks
//!   for the public keys, nonces, and signatures clients upload.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Byte length of an Ed25519 or X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Byte length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;
/// Byte length of an envelope nonce.
pub const NONCE_LEN: usize = 24;
/// Byte length of a registration challenge.
pub const CHALLENGE_LEN: usize = 32;

/// Error returned when uploaded key material or a signature fails validation.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("{0} is not valid base64")]
    NotBase64(&'static str),
    #[error("{label} has wrong length: expected {expected} bytes, got {actual}")]
    WrongLength { label: &'static str, expected: usize, actual: usize },
    #[error("signature verification failed")]
    BadSignature,
}

/// Decode a base64 string and require an exact byte length.
pub fn decode_exact(
    encoded: &str,
    expected: usize,
    label: &'static str,
) -> Result<Vec<u8>, CryptoError> {
    let bytes = B64.decode(encoded).map_err(|_| CryptoError::NotBase64(label))?;
    if bytes.len() != expected {
        return Err(CryptoError::WrongLength { label, expected, actual: bytes.len() });
    }
    Ok(bytes)
}

/// Validate a base64-encoded 32-byte public key (Ed25519 or X25519).
pub fn validate_public_key(encoded: &str, label: &'static str) -> Result<[u8; 32], CryptoError> {
    let bytes = decode_exact(encoded, PUBLIC_KEY_LEN, label)?;
    Ok(bytes.try_into().expect("length checked"))
}

/// Build the canonical byte string an envelope signature covers:
///
/// `v1\n<messageType>\n<messageId>\n<from>\n<to>\n<timestamp>\n<nonceB64>\n<ciphertextB64>\n`
///
/// The trailing newline is included. For call frames, `to` is the callee.
#[allow(clippy::too_many_arguments)]
pub fn canonical_signing_bytes(
    message_type: &str,
    message_id: &str,
    from: &str,
    to: &str,
    timestamp: i64,
    nonce_b64: &str,
    ciphertext_b64: &str,
) -> Vec<u8> {
    format!(
        "v1\n{message_type}\n{message_id}\n{from}\n{to}\n{timestamp}\n{nonce_b64}\n{ciphertext_b64}\n"
    )
    .into_bytes()
}

/// SHA-256 digest.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Verify an Ed25519 signature over the SHA-256 digest of `covered`.
///
/// * `sign_public_key_b64` — base64 32-byte verifying key
/// * `sig_b64`             — base64 64-byte signature
/// * `covered`             — the canonical bytes (or challenge bytes)
pub fn verify_signed_digest(
    sign_public_key_b64: &str,
    sig_b64: &str,
    covered: &[u8],
) -> Result<(), CryptoError> {
    let pubkey = validate_public_key(sign_public_key_b64, "signPublicKey")?;
    let sig_bytes = decode_exact(sig_b64, SIGNATURE_LEN, "sig")?;

    let verifying_key =
        VerifyingKey::from_bytes(&pubkey).map_err(|_| CryptoError::BadSignature)?;
    let signature = Signature::from_bytes(
        sig_bytes.as_slice().try_into().expect("length checked"),
    );

    let digest = sha256(covered);
    verifying_key.verify(&digest, &signature).map_err(|_| CryptoError::BadSignature)
}

/// Encode arbitrary bytes to base64 (standard alphabet, padded).
pub fn to_base64(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Decode base64 to bytes, returning `None` on failure.
pub fn from_base64(encoded: &str) -> Option<Vec<u8>> {
    B64.decode(encoded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn sign_canonical(key: &SigningKey, canonical: &[u8]) -> String {
        let digest = sha256(canonical);
        to_base64(&key.sign(&digest).to_bytes())
    }

    #[test]
    fn canonical_form_is_the_exact_documented_string() {
        let bytes = canonical_signing_bytes(
            "text",
            "7f000000-0000-0000-0000-000000000001",
            "WSP-AAAA-BBBB-CCCC",
            "WSP-DDDD-EEEE-FFFF",
            1_700_000_000_000,
            "bm9uY2U=",
            "Y2lwaGVydGV4dA==",
        );
        assert_eq!(
            bytes,
            b"v1\ntext\n7f000000-0000-0000-0000-000000000001\nWSP-AAAA-BBBB-CCCC\nWSP-DDDD-EEEE-FFFF\n1700000000000\nbm9uY2U=\nY2lwaGVydGV4dA==\n"
        );
    }

    #[test]
    fn round_trip_sign_verify() {
        let key = SigningKey::generate(&mut rand_core::OsRng);
        let pubkey = to_base64(key.verifying_key().as_bytes());
        let canonical = canonical_signing_bytes(
            "text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 1, "n", "c",
        );
        let sig = sign_canonical(&key, &canonical);
        verify_signed_digest(&pubkey, &sig, &canonical).expect("signature should verify");
    }

    #[test]
    fn flipping_any_field_breaks_verification() {
        let key = SigningKey::generate(&mut rand_core::OsRng);
        let pubkey = to_base64(key.verifying_key().as_bytes());
        let canonical = canonical_signing_bytes(
            "text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 42, "nonce", "ct",
        );
        let sig = sign_canonical(&key, &canonical);

        let tampered: Vec<Vec<u8>> = vec![
            canonical_signing_bytes("image", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 42, "nonce", "ct"),
            canonical_signing_bytes("text", "m2", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 42, "nonce", "ct"),
            canonical_signing_bytes("text", "m1", "WSP-AAAA-BBBB-CCCD", "WSP-DDDD-EEEE-FFFF", 42, "nonce", "ct"),
            canonical_signing_bytes("text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFE", 42, "nonce", "ct"),
            canonical_signing_bytes("text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 43, "nonce", "ct"),
            canonical_signing_bytes("text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 42, "eonce", "ct"),
            canonical_signing_bytes("text", "m1", "WSP-AAAA-BBBB-CCCC", "WSP-DDDD-EEEE-FFFF", 42, "nonce", "cu"),
        ];
        for bytes in tampered {
            assert!(
                verify_signed_digest(&pubkey, &sig, &bytes).is_err(),
                "tampered canonical form must not verify"
            );
        }
    }

    #[test]
    fn wrong_key_fails() {
        let key = SigningKey::generate(&mut rand_core::OsRng);
        let other = SigningKey::generate(&mut rand_core::OsRng);
        let canonical = b"v1\ntext\nm\nA\nB\n1\nn\nc\n";
        let sig = sign_canonical(&key, canonical);
        let other_pub = to_base64(other.verifying_key().as_bytes());
        assert!(verify_signed_digest(&other_pub, &sig, canonical).is_err());
    }

    #[test]
    fn decode_exact_enforces_length() {
        let nonce = to_base64(&[0u8; 24]);
        assert!(decode_exact(&nonce, NONCE_LEN, "nonce").is_ok());
        let short = to_base64(&[0u8; 12]);
        assert!(matches!(
            decode_exact(&short, NONCE_LEN, "nonce"),
            Err(CryptoError::WrongLength { expected: 24, actual: 12, .. })
        ));
        assert!(decode_exact("not base64!!", NONCE_LEN, "nonce").is_err());
    }
}
