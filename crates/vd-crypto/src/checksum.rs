//! BLAKE3 content checksums over encrypted blobs
//!
//! The checksum is computed once over `iv || tag || ciphertext` at enqueue
//! time and sent with the upload so the server can verify integrity end to end.
//! Never computed over plaintext.

use crate::error::CryptoError;

/// A BLAKE3 digest (32 bytes), displayed as 64 hex chars
pub type Checksum = blake3::Hash;

/// Digest a byte slice.
pub fn checksum_bytes(data: &[u8]) -> Checksum {
    blake3::hash(data)
}

/// Digest a byte slice and format it as lowercase hex (64 chars).
pub fn checksum_hex(data: &[u8]) -> String {
    checksum_bytes(data).to_hex().to_string()
}

/// Parse a 64-char hex string into a checksum
pub fn parse_checksum(hex: &str) -> Result<Checksum, CryptoError> {
    blake3::Hash::from_hex(hex)
        .map_err(|e| CryptoError::MalformedBlob(format!("invalid BLAKE3 hex '{hex}': {e}")))
}

/// Check `data` against an expected hex checksum. Comparison is constant-time.
pub fn verify_checksum(data: &[u8], expected_hex: &str) -> bool {
    match parse_checksum(expected_hex) {
        Ok(expected) => checksum_bytes(data) == expected,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_checksum_is_deterministic() {
        assert_eq!(checksum_hex(b""), checksum_hex(b""));
    }

    #[test]
    fn checksum_is_64_hex_chars() {
        let hex = checksum_hex(b"hello vaultdrop");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector() {
        // BLAKE3 of the empty input
        assert_eq!(
            checksum_hex(b""),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn different_content_different_checksum() {
        assert_ne!(checksum_hex(b"foo"), checksum_hex(b"bar"));
    }

    #[test]
    fn verify_accepts_match_and_rejects_mismatch() {
        let hex = checksum_hex(b"blob");
        assert!(verify_checksum(b"blob", &hex));
        assert!(!verify_checksum(b"blob!", &hex));
        assert!(!verify_checksum(b"blob", "not-hex"));
    }

    proptest! {
        #[test]
        fn checksum_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            prop_assert_eq!(checksum_hex(&data), checksum_hex(&data));
        }

        #[test]
        fn hex_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..=1024)) {
            let hex = checksum_hex(&data);
            let back = parse_checksum(&hex).unwrap();
            prop_assert_eq!(checksum_bytes(&data), back);
        }
    }
}
