use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::crypto::{SecretKey, SignatureScheme};
use crate::metadata::{
    canonical_bytes, MetaEntry, Role, RoleName, RootContent, SnapshotContent, TargetFileSpec,
    TargetsContent, TimestampContent, METADATA_DIR, TARGETS_DIR,
};

/// Per-role signing keys and thresholds for fixtures.
///
/// Keys are Ed25519; deterministic signatures and cheap generation; the
/// RSA path is exercised by the crypto unit tests.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: BTreeMap<RoleName, Vec<SecretKey>>,
    thresholds: BTreeMap<RoleName, u32>,
}

impl KeyRing {
    /// Generate a keyring from `(role, key count, threshold)` triples.
    pub fn generate(spec: &[(RoleName, usize, u32)]) -> Self {
        let mut keys = BTreeMap::new();
        let mut thresholds = BTreeMap::new();
        for (role, count, threshold) in spec {
            let role_keys = (0..*count)
                .map(|_| SecretKey::generate(SignatureScheme::Ed25519))
                .collect();
            keys.insert(role.clone(), role_keys);
            thresholds.insert(role.clone(), *threshold);
        }
        Self { keys, thresholds }
    }

    /// The canonical test setup: root 2-of-3, everything else 1-of-1.
    pub fn standard() -> Self {
        Self::generate(&[
            (RoleName::Root, 3, 2),
            (RoleName::Targets, 1, 1),
            (RoleName::Snapshot, 1, 1),
            (RoleName::Timestamp, 1, 1),
        ])
    }

    pub fn keys(&self, role: &RoleName) -> &[SecretKey] {
        self.keys.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn threshold(&self, role: &RoleName) -> u32 {
        self.thresholds.get(role).copied().unwrap_or(1)
    }

    /// A copy of this ring with the root role's keys replaced: the new
    /// authority after a rotation.
    pub fn with_rotated_root(&self, count: usize, threshold: u32) -> Self {
        let mut rotated = self.clone();
        rotated.keys.insert(
            RoleName::Root,
            (0..count)
                .map(|_| SecretKey::generate(SignatureScheme::Ed25519))
                .collect(),
        );
        rotated.thresholds.insert(RoleName::Root, threshold);
        rotated
    }

    /// The root content describing this ring's keys and roles.
    pub fn root_content(&self) -> RootContent {
        let mut keys = BTreeMap::new();
        let mut roles = BTreeMap::new();
        for (role, secrets) in &self.keys {
            let keyids = secrets
                .iter()
                .map(|secret| {
                    let public = secret.public();
                    let keyid = public.key_id();
                    keys.insert(keyid.clone(), public);
                    keyid
                })
                .collect();
            roles.insert(
                role.clone(),
                Role {
                    keyids,
                    threshold: self.threshold(role),
                },
            );
        }
        RootContent { keys, roles }
    }
}

/// Everything that varies between one fixture commit and the next.
#[derive(Debug, Clone)]
pub struct CommitSpec {
    /// Document version per role; absent roles default to 1.
    pub versions: BTreeMap<RoleName, u64>,
    pub expires: DateTime<Utc>,
    /// Target files (path relative to `targets/` → bytes) to commit and
    /// pin in the targets manifest.
    pub target_files: BTreeMap<String, Vec<u8>>,
    /// How many of a role's keys sign; absent roles sign with all keys.
    pub signer_counts: BTreeMap<RoleName, usize>,
    /// Extra root document signers, e.g. the previous authority's keys
    /// during a rotation.
    pub root_extra_signers: Vec<SecretKey>,
    /// Override for the published root content (rotation fixtures publish
    /// the new ring's content while signing with both authorities).
    pub root_content: Option<RootContent>,
}

impl CommitSpec {
    /// A first commit: every version 1, expiring far in the future.
    pub fn initial() -> Self {
        Self {
            versions: BTreeMap::new(),
            expires: Utc::now() + Duration::days(3650),
            target_files: BTreeMap::new(),
            signer_counts: BTreeMap::new(),
            root_extra_signers: Vec::new(),
            root_content: None,
        }
    }

    /// The follow-up commit: every top-level version bumped by one,
    /// target files carried over.
    pub fn next(&self) -> Self {
        let mut next = self.clone();
        for role in RoleName::TOP_LEVEL {
            let version = self.versions.get(&role).copied().unwrap_or(1);
            next.versions.insert(role, version + 1);
        }
        next.signer_counts.clear();
        next.root_extra_signers.clear();
        next.root_content = None;
        next
    }

    pub fn with_version(mut self, role: RoleName, version: u64) -> Self {
        self.versions.insert(role, version);
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = expires;
        self
    }

    pub fn with_target(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.target_files.insert(path.to_string(), bytes);
        self
    }

    pub fn with_signer_count(mut self, role: RoleName, count: usize) -> Self {
        self.signer_counts.insert(role, count);
        self
    }
}

/// Sign a document body and wrap it in the envelope format.
///
/// Returns the pretty-printed file bytes as they would be committed.
pub fn sign_document<T: Serialize>(
    doc_type: &str,
    version: u64,
    expires: DateTime<Utc>,
    content: &T,
    signers: &[SecretKey],
) -> Vec<u8> {
    let mut signed = serde_json::to_value(content).expect("content serializes");
    signed["_type"] = serde_json::json!(doc_type);
    signed["version"] = serde_json::json!(version);
    signed["expires"] = serde_json::json!(expires);

    let canonical = canonical_bytes(&signed).expect("canonicalization succeeds");
    let signatures: Vec<serde_json::Value> = signers
        .iter()
        .map(|secret| {
            serde_json::json!({
                "keyid": secret.public().key_id(),
                "sig": hex::encode(secret.sign(&canonical)),
            })
        })
        .collect();

    serde_json::to_vec_pretty(&serde_json::json!({
        "signed": signed,
        "signatures": signatures,
    }))
    .expect("envelope serializes")
}

fn meta_entry(version: u64, bytes: &[u8]) -> MetaEntry {
    MetaEntry {
        version,
        hashes: BTreeMap::from([("sha256".to_string(), hex::encode(Sha256::digest(bytes)))]),
    }
}

/// Build the complete, correctly cross-referenced file set for one
/// commit: the four role documents under `metadata/` and every target
/// file under `targets/`, ready for [`AuthRepoFixture::commit`].
///
/// [`AuthRepoFixture::commit`]: super::AuthRepoFixture::commit
pub fn build_metadata(ring: &KeyRing, spec: &CommitSpec) -> BTreeMap<String, Vec<u8>> {
    let version = |role: &RoleName| spec.versions.get(role).copied().unwrap_or(1);
    let signers = |role: &RoleName| -> Vec<SecretKey> {
        let all = ring.keys(role);
        let count = spec.signer_counts.get(role).copied().unwrap_or(all.len());
        all.iter().take(count).cloned().collect()
    };

    let mut files = BTreeMap::new();

    // targets manifest pins every target file by hash and length
    let mut manifest = BTreeMap::new();
    for (path, bytes) in &spec.target_files {
        files.insert(format!("{}/{}", TARGETS_DIR, path), bytes.clone());
        manifest.insert(
            path.clone(),
            TargetFileSpec {
                hashes: BTreeMap::from([(
                    "sha256".to_string(),
                    hex::encode(Sha256::digest(bytes)),
                )]),
                length: bytes.len() as u64,
                custom: None,
            },
        );
    }
    let targets_bytes = sign_document(
        "targets",
        version(&RoleName::Targets),
        spec.expires,
        &TargetsContent { targets: manifest },
        &signers(&RoleName::Targets),
    );

    // delegated roles in the ring get empty manifests of their own
    let mut delegated: Vec<(RoleName, Vec<u8>)> = Vec::new();
    for role in ring.keys.keys() {
        if let RoleName::Delegated(_) = role {
            let bytes = sign_document(
                "targets",
                version(role),
                spec.expires,
                &TargetsContent {
                    targets: BTreeMap::new(),
                },
                &signers(role),
            );
            delegated.push((role.clone(), bytes));
        }
    }

    let root_content = spec
        .root_content
        .clone()
        .unwrap_or_else(|| ring.root_content());
    let mut root_signers = signers(&RoleName::Root);
    root_signers.extend(spec.root_extra_signers.iter().cloned());
    let root_bytes = sign_document(
        "root",
        version(&RoleName::Root),
        spec.expires,
        &root_content,
        &root_signers,
    );

    let mut snapshot_meta = BTreeMap::from([
        (
            "root.json".to_string(),
            meta_entry(version(&RoleName::Root), &root_bytes),
        ),
        (
            "targets.json".to_string(),
            meta_entry(version(&RoleName::Targets), &targets_bytes),
        ),
    ]);
    for (role, bytes) in &delegated {
        snapshot_meta.insert(role.metadata_filename(), meta_entry(version(role), bytes));
    }
    let snapshot_bytes = sign_document(
        "snapshot",
        version(&RoleName::Snapshot),
        spec.expires,
        &SnapshotContent {
            meta: snapshot_meta,
        },
        &signers(&RoleName::Snapshot),
    );

    let timestamp_bytes = sign_document(
        "timestamp",
        version(&RoleName::Timestamp),
        spec.expires,
        &TimestampContent {
            meta: BTreeMap::from([(
                "snapshot.json".to_string(),
                meta_entry(version(&RoleName::Snapshot), &snapshot_bytes),
            )]),
        },
        &signers(&RoleName::Timestamp),
    );

    files.insert(format!("{}/root.json", METADATA_DIR), root_bytes);
    files.insert(format!("{}/targets.json", METADATA_DIR), targets_bytes);
    files.insert(format!("{}/snapshot.json", METADATA_DIR), snapshot_bytes);
    files.insert(format!("{}/timestamp.json", METADATA_DIR), timestamp_bytes);
    for (role, bytes) in delegated {
        files.insert(
            format!("{}/{}", METADATA_DIR, role.metadata_filename()),
            bytes,
        );
    }
    files
}
