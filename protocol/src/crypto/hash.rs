//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **BLAKE3** derives account addresses from public keys. Native to
//!   this engine, never compared against anything external.
//! - **SHA-256** produces transaction hashes. Ledger nodes index
//!   submissions by it, so the construction must stay stable.

use sha2::{Digest, Sha256};

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// SHA-256 over several byte slices, without concatenating them first.
///
/// # Example
///
/// ```
/// use dropship_protocol::crypto::sha256_multi;
///
/// let hash = sha256_multi(&[b"drop", b"ship"]);
/// assert_eq!(hash, sha256_multi(&[b"dropship"]));
/// ```
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        assert_eq!(
            hex::encode(sha256_multi(&[b"abc"])),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn blake3_known_vector() {
        // BLAKE3 of the empty input.
        assert_eq!(
            hex::encode(blake3_hash(b"")),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn multi_matches_concatenation() {
        let joined = sha256_multi(&[b"helloworld"]);
        let parts = sha256_multi(&[b"hello", b"world"]);
        assert_eq!(joined, parts);
    }

    #[test]
    fn different_inputs_different_hashes() {
        assert_ne!(sha256_multi(&[b"a"]), sha256_multi(&[b"b"]));
        assert_ne!(blake3_hash(b"a"), blake3_hash(b"b"));
    }
}
