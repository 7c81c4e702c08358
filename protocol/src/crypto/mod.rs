//! # Cryptographic Primitives
//!
//! Thin, typed wrappers over audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) signs transactions.
//! - **BLAKE3** derives account addresses from public keys.
//! - **SHA-256** produces transaction hashes.
//!
//! Nothing here is novel and nothing here should become novel.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{Address, AddressError};
pub use hash::{blake3_hash, sha256_multi};
pub use keys::{Credential, KeyError, PublicKey, Signature};
