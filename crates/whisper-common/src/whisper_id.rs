//! WhisperID — the public user identifier.
//!
//! Format: `WSP-XXXX-XXXX-XXXX` where each group is 4 chars from the Base32
//! alphabet `[A-Z2-7]`. The ID is a deterministic function of the identity's
//! Ed25519 public key: the first 60 bits of SHA-256(signPublicKey), encoded
//! as 12 Base32 characters grouped 4-4-4. Stable across reinstalls on the
//! same mnemonic; there is no key rotation.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

/// RFC 4648 Base32 alphabet.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

static WHISPER_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^WSP-[A-Z2-7]{4}-[A-Z2-7]{4}-[A-Z2-7]{4}$").expect("static regex")
});

/// Check that a string is a well-formed WhisperID. Case-sensitive uppercase.
pub fn is_valid(id: &str) -> bool {
    WHISPER_ID_RE.is_match(id)
}

/// Derive the WhisperID from a 32-byte Ed25519 public key.
///
/// Takes the first 60 bits of SHA-256(signPublicKey) as 12 consecutive
/// 5-bit groups, most significant bits first.
pub fn derive(sign_public_key: &[u8; 32]) -> String {
    let digest = Sha256::digest(sign_public_key);

    let mut chars = Vec::with_capacity(12);
    let mut bit = 0usize;
    for _ in 0..12 {
        let byte = bit / 8;
        let offset = bit % 8;
        // A 5-bit group can straddle a byte boundary.
        let word = ((digest[byte] as u16) << 8) | digest[byte + 1] as u16;
        let index = ((word >> (11 - offset)) & 0x1f) as usize;
        chars.push(BASE32_ALPHABET[index]);
        bit += 5;
    }

    format!(
        "WSP-{}-{}-{}",
        std::str::from_utf8(&chars[0..4]).expect("base32 is ascii"),
        std::str::from_utf8(&chars[4..8]).expect("base32 is ascii"),
        std::str::from_utf8(&chars[8..12]).expect("base32 is ascii"),
    )
}

/// Derive from a base64-encoded public key, if it decodes to 32 bytes.
pub fn derive_from_base64(sign_public_key_b64: &str) -> Option<String> {
    let bytes = crate::crypto::from_base64(sign_public_key_b64)?;
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(derive(&arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_id_is_well_formed_and_stable() {
        let key = [7u8; 32];
        let id1 = derive(&key);
        let id2 = derive(&key);
        assert_eq!(id1, id2);
        assert!(is_valid(&id1), "derived id must match the wire format: {id1}");
    }

    #[test]
    fn distinct_keys_produce_distinct_ids() {
        let a = derive(&[1u8; 32]);
        let b = derive(&[2u8; 32]);
        assert_ne!(a, b);
    }

    #[test]
    fn format_validation_rejects_lookalikes() {
        assert!(is_valid("WSP-ABCD-EFGH-2345"));
        // lowercase
        assert!(!is_valid("wsp-abcd-efgh-2345"));
        // 0, 1, 8, 9 are not in the Base32 alphabet
        assert!(!is_valid("WSP-AB01-EFGH-2345"));
        assert!(!is_valid("WSP-AB89-EFGH-2345"));
        // wrong grouping
        assert!(!is_valid("WSP-ABCDE-FGH-2345"));
        assert!(!is_valid("WSP-ABCD-EFGH"));
        // trailing garbage
        assert!(!is_valid("WSP-ABCD-EFGH-2345X"));
        assert!(!is_valid(" WSP-ABCD-EFGH-2345"));
    }
}
