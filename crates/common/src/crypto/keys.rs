use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use signature::{SignatureEncoding, Signer, Verifier};

/// Size of Ed25519 keys in bytes
pub const ED25519_KEY_SIZE: usize = 32;
/// RSA modulus size used when generating keys
pub const RSA_KEY_BITS: usize = 2048;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unknown signature scheme: {0}")]
    UnknownScheme(String),
    #[error("malformed public key material: {0}")]
    MalformedKey(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Signature scheme tag carried by every key.
///
/// The scheme determines both how the public key material is encoded and
/// how signatures over canonical document bytes are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// RSA PKCS#1 v1.5 with SHA-256, PKCS8 PEM encoded keys. The default.
    #[serde(rename = "rsa-pkcs1v15-sha256")]
    RsaPkcs1v15Sha256,
    /// Ed25519 with hex encoded raw keys.
    #[serde(rename = "ed25519")]
    Ed25519,
}

impl Default for SignatureScheme {
    fn default() -> Self {
        SignatureScheme::RsaPkcs1v15Sha256
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureScheme::RsaPkcs1v15Sha256 => write!(f, "rsa-pkcs1v15-sha256"),
            SignatureScheme::Ed25519 => write!(f, "ed25519"),
        }
    }
}

impl FromStr for SignatureScheme {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa-pkcs1v15-sha256" => Ok(SignatureScheme::RsaPkcs1v15Sha256),
            "ed25519" => Ok(SignatureScheme::Ed25519),
            other => Err(KeyError::UnknownScheme(other.to_string())),
        }
    }
}

/// Identifier of a key, derived from its public material.
///
/// Computed as the hex SHA-256 digest of the canonical JSON encoding of the
/// public key (scheme + material), so the id is stable no matter where the
/// key appears.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        KeyId(s)
    }
}

/// Public key for metadata signature verification
///
/// Carries the scheme tag alongside the encoded public material. Keys are
/// immutable once referenced by a signed metadata generation; rotating a
/// role means publishing a new root document with new key ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Signature scheme this key verifies under.
    pub scheme: SignatureScheme,
    /// Encoded public material: PKCS8 PEM for RSA, hex for Ed25519.
    pub public: String,
}

impl PublicKey {
    /// Derive this key's identifier from its canonical JSON form.
    pub fn key_id(&self) -> KeyId {
        // struct field order is fixed, so this encoding is canonical
        let canonical =
            serde_json::to_vec(self).expect("public key serialization is infallible");
        KeyId(hex::encode(Sha256::digest(&canonical)))
    }

    /// Verify a detached signature over `msg`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material or signature is malformed for
    /// the tagged scheme, or if verification fails.
    pub fn verify(&self, msg: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        match self.scheme {
            SignatureScheme::RsaPkcs1v15Sha256 => {
                let key = RsaPublicKey::from_public_key_pem(&self.public)
                    .map_err(|e| KeyError::MalformedKey(e.to_string()))?;
                let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key);
                let signature = rsa::pkcs1v15::Signature::try_from(signature)
                    .map_err(|e| KeyError::MalformedSignature(e.to_string()))?;
                verifying_key
                    .verify(msg, &signature)
                    .map_err(|_| KeyError::VerificationFailed)
            }
            SignatureScheme::Ed25519 => {
                let mut bytes = [0u8; ED25519_KEY_SIZE];
                hex::decode_to_slice(&self.public, &mut bytes)
                    .map_err(|e| KeyError::MalformedKey(e.to_string()))?;
                let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| KeyError::MalformedKey(e.to_string()))?;
                let signature: [u8; 64] = signature
                    .try_into()
                    .map_err(|_| KeyError::MalformedSignature("bad length".to_string()))?;
                verifying_key
                    .verify_strict(msg, &ed25519_dalek::Signature::from_bytes(&signature))
                    .map_err(|_| KeyError::VerificationFailed)
            }
        }
    }
}

/// Secret key for metadata signing
///
/// Only repository creation tooling and test fixtures hold secret keys.
/// The update engine verifies; it never signs.
#[derive(Clone)]
pub enum SecretKey {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        match self {
            SecretKey::Rsa(_) => write!(f, "SecretKey(rsa-pkcs1v15-sha256)"),
            SecretKey::Ed25519(_) => write!(f, "SecretKey(ed25519)"),
        }
    }
}

impl SecretKey {
    /// Generate a new random secret key for the given scheme.
    ///
    /// RSA generation is expensive; fixtures that don't exercise the RSA
    /// path specifically should prefer Ed25519.
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::RsaPkcs1v15Sha256 => {
                let key = RsaPrivateKey::new(&mut rand::thread_rng(), RSA_KEY_BITS)
                    .expect("failed to generate RSA key");
                SecretKey::Rsa(key)
            }
            SignatureScheme::Ed25519 => {
                let mut bytes = [0u8; ED25519_KEY_SIZE];
                rand::thread_rng().fill_bytes(&mut bytes);
                SecretKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&bytes))
            }
        }
    }

    /// The scheme this key signs under.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            SecretKey::Rsa(_) => SignatureScheme::RsaPkcs1v15Sha256,
            SecretKey::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }

    /// Derive the public key from this secret key.
    pub fn public(&self) -> PublicKey {
        match self {
            SecretKey::Rsa(key) => PublicKey {
                scheme: SignatureScheme::RsaPkcs1v15Sha256,
                public: key
                    .to_public_key()
                    .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
                    .expect("RSA public key PEM encoding is infallible"),
            },
            SecretKey::Ed25519(key) => PublicKey {
                scheme: SignatureScheme::Ed25519,
                public: hex::encode(key.verifying_key().to_bytes()),
            },
        }
    }

    /// Sign a message, returning the detached signature bytes.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        match self {
            SecretKey::Rsa(key) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                signing_key.sign(msg).to_vec()
            }
            SecretKey::Ed25519(key) => {
                use ed25519_dalek::Signer as _;
                key.sign(msg).to_bytes().to_vec()
            }
        }
    }

    /// Encode the secret key in PKCS8 PEM (RSA) or hex (Ed25519) for storage.
    pub fn to_storage(&self) -> String {
        match self {
            SecretKey::Rsa(key) => key
                .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
                .expect("RSA private key PEM encoding is infallible")
                .to_string(),
            SecretKey::Ed25519(key) => hex::encode(key.to_bytes()),
        }
    }

    /// Parse a secret key from its storage encoding.
    pub fn from_storage(scheme: SignatureScheme, material: &str) -> Result<Self, KeyError> {
        match scheme {
            SignatureScheme::RsaPkcs1v15Sha256 => {
                let key = RsaPrivateKey::from_pkcs8_pem(material)
                    .map_err(|e| KeyError::MalformedKey(e.to_string()))?;
                Ok(SecretKey::Rsa(key))
            }
            SignatureScheme::Ed25519 => {
                let mut bytes = [0u8; ED25519_KEY_SIZE];
                hex::decode_to_slice(material, &mut bytes)
                    .map_err(|e| KeyError::MalformedKey(e.to_string()))?;
                Ok(SecretKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &bytes,
                )))
            }
        }
    }
}
