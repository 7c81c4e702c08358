//! # Credentials
//!
//! A [`Credential`] is the decoded signing key of the distributing account
//! plus the address derived from it. It is created once at startup from
//! hex key material handed over by the surrounding application and then
//! only ever lent out by reference.
//!
//! Key bytes are never logged. `Debug` prints the address and nothing else.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::address::Address;
use crate::config::{SECRET_KEY_LENGTH, SIGNATURE_LENGTH};

/// Errors that can occur while decoding key material.
///
/// Deliberately vague about the offending bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid secret key: expected 32 hex-encoded bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,
}

/// The distributing account: signing key plus derived address.
pub struct Credential {
    signing_key: SigningKey,
    address: Address,
}

/// The public half of a credential, embedded in every signed transaction so
/// the node can check the signature without a key lookup.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

/// An Ed25519 signature. Always 64 bytes once constructed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Credential {
    /// Generate a fresh credential from the OS RNG. Used by tests and the
    /// development node; production credentials come from [`from_hex`](Self::from_hex).
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Builds a credential from a raw 32-byte secret.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    /// Decodes a hex secret key. An optional `0x` prefix and surrounding
    /// whitespace are accepted because that is how keys get pasted.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let trimmed = hex_str.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let mut seed = [0u8; SECRET_KEY_LENGTH];
        hex::decode_to_slice(body, &mut seed).map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(&signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    /// The account this credential controls.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Deterministic Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes().to_vec())
    }

    /// Hex secret, for handing a generated credential to a person. Handle
    /// with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.address)
    }
}

impl PublicKey {
    /// Validates that the bytes are a usable Ed25519 point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The account address this key controls.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.0)
    }

    /// Returns `true` only for a well-formed signature by this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature.0.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(KeyError::InvalidSignature);
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 2 * SIGNATURE_LENGTH {
            write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "Signature({})", hex_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let cred = Credential::generate();
        let sig = cred.sign(b"send 5 to bob");
        assert!(cred.public_key().verify(b"send 5 to bob", &sig));
        assert!(!cred.public_key().verify(b"send 6 to bob", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let a = Credential::generate();
        let b = Credential::generate();
        let sig = a.sign(b"message");
        assert!(!b.public_key().verify(b"message", &sig));
    }

    #[test]
    fn hex_roundtrip_preserves_address() {
        let cred = Credential::generate();
        let restored = Credential::from_hex(&cred.secret_hex()).unwrap();
        assert_eq!(cred.address(), restored.address());
    }

    #[test]
    fn hex_accepts_prefix_and_whitespace() {
        let cred = Credential::from_seed(&[7u8; 32]);
        let pasted = format!("  0x{}\n", cred.secret_hex());
        assert_eq!(Credential::from_hex(&pasted).unwrap().address(), cred.address());
    }

    #[test]
    fn malformed_hex_rejected() {
        assert_eq!(
            Credential::from_hex("deadbeef").unwrap_err(),
            KeyError::InvalidSecretKey
        );
        assert_eq!(
            Credential::from_hex("not-hex-at-all").unwrap_err(),
            KeyError::InvalidSecretKey
        );
    }

    #[test]
    fn address_matches_public_key_derivation() {
        let cred = Credential::from_seed(&[9u8; 32]);
        assert_eq!(cred.address(), cred.public_key().address());
    }

    #[test]
    fn signatures_are_deterministic() {
        let cred = Credential::from_seed(&[3u8; 32]);
        assert_eq!(cred.sign(b"x"), cred.sign(b"x"));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let cred = Credential::from_seed(&[5u8; 32]);
        let debug = format!("{:?}", cred);
        assert!(debug.starts_with("Credential(0x"));
        assert!(!debug.contains(&cred.secret_hex()));
    }

    #[test]
    fn signature_length_enforced() {
        assert!(Signature::from_bytes(&[0u8; 10]).is_err());
        assert!(Signature::from_bytes(&[0u8; 64]).is_ok());
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(PublicKey::try_from_slice(&[0u8; 16]).is_err());
    }
}
