//! Cryptographic primitives for Ratchet
//!
//! This module provides the signing and verification foundation for the
//! trust model:
//!
//! - **Scheme-tagged keys**: every key carries its signature scheme so a
//!   metadata document can mix RSA and Ed25519 signers
//! - **Key identity**: a key is referenced by the SHA-256 digest of its
//!   canonical public form, so key ids are stable across serializations
//!
//! # Supported Schemes
//!
//! - `rsa-pkcs1v15-sha256` (the default): PKCS8 PEM encoded public keys
//! - `ed25519`: hex encoded 32-byte public keys
//!
//! Secret keys only exist on the signing side (repository creation tooling
//! and test fixtures). The update engine itself never holds one.

mod keys;

pub use keys::{KeyError, KeyId, PublicKey, SecretKey, SignatureScheme};
