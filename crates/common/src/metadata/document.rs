use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{KeyId, PublicKey};

use super::role::{Role, RoleName};

/// Compute the canonical byte form of a serializable value.
///
/// The canonical form is the compact JSON encoding of the value after a
/// round-trip through `serde_json::Value`, whose object representation is a
/// BTreeMap; object keys come out sorted, making the bytes deterministic.
/// Signatures are produced and verified over exactly these bytes.
pub fn canonical_bytes<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    serde_json::to_vec(&value)
}

/// One (key id, signature) pair from a document's signature block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignature {
    pub keyid: KeyId,
    /// Hex encoded detached signature over the canonical signed bytes.
    pub sig: String,
}

/// Root role content: the key table and the role table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootContent {
    /// Every key any role may reference, by key id.
    pub keys: BTreeMap<KeyId, PublicKey>,
    /// Authorized key ids and thresholds per role.
    pub roles: BTreeMap<RoleName, Role>,
}

impl RootContent {
    /// Look up a role definition.
    pub fn resolve_role(&self, name: &RoleName) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Check structural invariants: the root role is defined, every role is
    /// well formed, and every referenced key id exists in the key table.
    pub fn check(&self) -> Result<(), String> {
        if !self.roles.contains_key(&RoleName::Root) {
            return Err("root role is not defined".to_string());
        }
        for (name, role) in &self.roles {
            if !role.is_well_formed() {
                return Err(format!(
                    "role {} has invalid threshold {} over {} keys",
                    name,
                    role.threshold,
                    role.keyids.len()
                ));
            }
            for keyid in &role.keyids {
                if !self.keys.contains_key(keyid) {
                    return Err(format!("role {} references unknown key {}", name, keyid));
                }
            }
        }
        Ok(())
    }
}

/// Hash manifest entry for one target file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFileSpec {
    /// Hex digests by algorithm name. `sha256` is required in practice.
    pub hashes: BTreeMap<String, String>,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl TargetFileSpec {
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get("sha256").map(String::as_str)
    }

    /// Whether the given raw bytes match this entry's length and sha256.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        if bytes.len() as u64 != self.length {
            return false;
        }
        match self.sha256() {
            Some(expected) => expected == hex::encode(Sha256::digest(bytes)),
            None => false,
        }
    }
}

/// Targets-like role content: the target-file hash manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetsContent {
    pub targets: BTreeMap<String, TargetFileSpec>,
}

/// Version + hash reference to another role's metadata file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub version: u64,
    /// Hex digests of the referenced metadata file's raw bytes.
    pub hashes: BTreeMap<String, String>,
}

impl MetaEntry {
    pub fn sha256(&self) -> Option<&str> {
        self.hashes.get("sha256").map(String::as_str)
    }
}

/// Snapshot role content: references every role document except snapshot
/// itself and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotContent {
    /// Keyed by metadata filename, e.g. `root.json`.
    pub meta: BTreeMap<String, MetaEntry>,
}

/// Timestamp role content: references the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampContent {
    pub meta: BTreeMap<String, MetaEntry>,
}

impl TimestampContent {
    /// The snapshot reference, if present.
    pub fn snapshot(&self) -> Option<&MetaEntry> {
        self.meta.get("snapshot.json")
    }
}

/// Role-specific document content.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleContent {
    Root(RootContent),
    Targets(TargetsContent),
    Snapshot(SnapshotContent),
    Timestamp(TimestampContent),
}

impl RoleContent {
    pub fn as_root(&self) -> Option<&RootContent> {
        match self {
            RoleContent::Root(content) => Some(content),
            _ => None,
        }
    }

    pub fn as_targets(&self) -> Option<&TargetsContent> {
        match self {
            RoleContent::Targets(content) => Some(content),
            _ => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&SnapshotContent> {
        match self {
            RoleContent::Snapshot(content) => Some(content),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&TimestampContent> {
        match self {
            RoleContent::Timestamp(content) => Some(content),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    signed: serde_json::Value,
    signatures: Vec<RawSignature>,
}

#[derive(Deserialize)]
struct SignedHeader {
    #[serde(rename = "_type")]
    doc_type: String,
    version: u64,
    expires: DateTime<Utc>,
}

/// A parsed, unverified metadata document bound to one role at one commit.
///
/// Holds everything the trust chain validator needs: the typed content, the
/// signature block, the canonical signed bytes signatures are verified
/// over, and the digest of the raw file for snapshot cross-referencing.
/// Immutable once constructed.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    pub role: RoleName,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub content: RoleContent,
    pub signatures: Vec<RawSignature>,
    canonical: Vec<u8>,
    file_digest: String,
}

impl MetadataDocument {
    /// Parse a raw metadata file into a document for the given role.
    ///
    /// Checks schema only: envelope shape, `_type` tag, version counter,
    /// and role-specific content (including the root role-table
    /// invariants). Signature verification happens in the chain validator.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the document does not fit the
    /// generation schema; callers surface it as `MalformedMetadata`.
    pub fn parse(role: &RoleName, raw: &[u8]) -> Result<Self, String> {
        let envelope: Envelope = serde_json::from_slice(raw)
            .map_err(|e| format!("invalid document envelope: {}", e))?;
        let header: SignedHeader = serde_json::from_value(envelope.signed.clone())
            .map_err(|e| format!("invalid signed header: {}", e))?;

        let expected_type = if role.is_targets_like() {
            "targets"
        } else {
            role.as_str()
        };
        if header.doc_type != expected_type {
            return Err(format!(
                "document type {} does not match role {}",
                header.doc_type, role
            ));
        }
        if header.version == 0 {
            return Err("version counter must be at least 1".to_string());
        }

        let content = match role {
            RoleName::Root => {
                let content: RootContent = serde_json::from_value(envelope.signed.clone())
                    .map_err(|e| format!("invalid root content: {}", e))?;
                content.check()?;
                RoleContent::Root(content)
            }
            RoleName::Targets | RoleName::Delegated(_) => {
                let content: TargetsContent = serde_json::from_value(envelope.signed.clone())
                    .map_err(|e| format!("invalid targets content: {}", e))?;
                RoleContent::Targets(content)
            }
            RoleName::Snapshot => {
                let content: SnapshotContent = serde_json::from_value(envelope.signed.clone())
                    .map_err(|e| format!("invalid snapshot content: {}", e))?;
                RoleContent::Snapshot(content)
            }
            RoleName::Timestamp => {
                let content: TimestampContent = serde_json::from_value(envelope.signed.clone())
                    .map_err(|e| format!("invalid timestamp content: {}", e))?;
                RoleContent::Timestamp(content)
            }
        };

        let canonical = canonical_bytes(&envelope.signed)
            .map_err(|e| format!("canonicalization failed: {}", e))?;

        Ok(MetadataDocument {
            role: role.clone(),
            version: header.version,
            expires: header.expires,
            content,
            signatures: envelope.signatures,
            canonical,
            file_digest: hex::encode(Sha256::digest(raw)),
        })
    }

    /// The canonical signed bytes signatures are verified over.
    pub fn canonical(&self) -> &[u8] {
        &self.canonical
    }

    /// Hex SHA-256 of the raw file as committed, for snapshot
    /// cross-referencing.
    pub fn file_digest(&self) -> &str {
        &self.file_digest
    }
}
