use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::crypto::{KeyId, PublicKey};
use crate::git::CommitId;
use crate::metadata::{MetadataDocument, Role, RoleName, RootContent};

use super::generation::MetadataGeneration;
use super::state::ValidationState;

/// Trust chain failures.
///
/// Any variant halts forward progress of validation for the
/// authentication repository at the offending commit; later commits are
/// not evaluated in the session.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainError {
    #[error("{role} signed by {valid} of {threshold} required keys")]
    InsufficientSignatures {
        role: RoleName,
        valid: usize,
        threshold: u32,
    },
    #[error("rollback detected: {role} version {version} is not greater than trusted version {trusted}")]
    RollbackDetected {
        role: RoleName,
        trusted: u64,
        version: u64,
    },
    #[error("{role} metadata expired at {expires}, commit timestamp is {commit_time}")]
    MetadataExpired {
        role: RoleName,
        expires: DateTime<Utc>,
        commit_time: DateTime<Utc>,
    },
    #[error("snapshot mismatch for {meta}: {reason}")]
    SnapshotMismatch { meta: String, reason: String },
    #[error("timestamp references snapshot version {referenced}, current snapshot is {current}")]
    TimestampStale { referenced: u64, current: u64 },
    #[error("role {0} is not defined by any trusted root generation")]
    RoleNotFound(RoleName),
    #[error("target file {path} does not match the signed manifest")]
    TargetFileMismatch { path: String },
    #[error("malformed metadata: {0}")]
    Malformed(String),
}

/// Verifies metadata generations commit by commit against the previously
/// trusted generation.
///
/// The validator is strictly sequential: commits must be fed oldest to
/// newest, and a later commit is never trusted without every intermediate
/// commit having been validated first.
#[derive(Debug)]
pub struct TrustChainValidator {
    trusted: Option<MetadataGeneration>,
}

impl TrustChainValidator {
    /// A validator with no prior trust. The first commit fed to
    /// [`advance`](Self::advance) bootstraps trust: its root document must
    /// meet its own declared threshold.
    pub fn new() -> Self {
        Self { trusted: None }
    }

    /// A validator resuming from an already-trusted generation, typically
    /// the one at the durable trusted pointer.
    pub fn with_trusted(generation: MetadataGeneration) -> Self {
        Self {
            trusted: Some(generation),
        }
    }

    /// The currently trusted generation, if any.
    pub fn trusted(&self) -> Option<&MetadataGeneration> {
        self.trusted.as_ref()
    }

    pub fn trusted_commit(&self) -> Option<CommitId> {
        self.trusted.as_ref().map(MetadataGeneration::commit)
    }

    /// Resolve a role's authorized key set and threshold from the trusted
    /// root. Fatal for the session when the role was never defined.
    pub fn resolve_role(&self, name: &RoleName) -> Result<Role, ChainError> {
        self.trusted
            .as_ref()
            .and_then(|generation| generation.root().resolve_role(name))
            .cloned()
            .ok_or_else(|| ChainError::RoleNotFound(name.clone()))
    }

    /// Validate one commit's documents against the trusted generation and,
    /// on success, promote them to the new trusted generation.
    ///
    /// `commit_time` is the commit's committer timestamp, the reference
    /// clock for expiration checks, so re-validating an old history is
    /// deterministic.
    pub fn advance(
        &mut self,
        commit: CommitId,
        documents: BTreeMap<RoleName, MetadataDocument>,
        commit_time: DateTime<Utc>,
    ) -> Result<&MetadataGeneration, ChainError> {
        match self.advance_checks(commit, documents, commit_time) {
            Ok(()) => Ok(self.trusted.as_ref().expect("generation was just promoted")),
            Err(reason) => {
                tracing::trace!(
                    "Commit {}: -> {:?}",
                    commit,
                    ValidationState::Rejected(reason.clone())
                );
                Err(reason)
            }
        }
    }

    fn advance_checks(
        &mut self,
        commit: CommitId,
        documents: BTreeMap<RoleName, MetadataDocument>,
        commit_time: DateTime<Utc>,
    ) -> Result<(), ChainError> {
        let mut state = ValidationState::Unvalidated;

        let root_doc = documents
            .get(&RoleName::Root)
            .ok_or_else(|| ChainError::Malformed("missing root document".to_string()))?;
        let new_root = root_doc
            .content
            .as_root()
            .ok_or_else(|| ChainError::Malformed("root document has no root content".to_string()))?
            .clone();

        // Root first: the signature rule for every other role depends on
        // which root survives this commit.
        self.transition(&commit, &mut state, ValidationState::CheckingSignatures);
        let root_changed = self.check_root_signatures(root_doc, &new_root)?;
        let effective_root = if root_changed {
            &new_root
        } else {
            match &self.trusted {
                Some(trusted) => trusted.root(),
                None => &new_root,
            }
        };

        for (role, doc) in &documents {
            if *role == RoleName::Root {
                continue;
            }
            let role_def = effective_root
                .resolve_role(role)
                .ok_or_else(|| ChainError::RoleNotFound(role.clone()))?;
            if self.unchanged(role, doc) {
                continue;
            }
            let valid = count_valid_signatures(doc, role_def, &effective_root.keys);
            if valid < role_def.threshold as usize {
                return Err(ChainError::InsufficientSignatures {
                    role: role.clone(),
                    valid,
                    threshold: role_def.threshold,
                });
            }
        }

        self.transition(&commit, &mut state, ValidationState::CheckingVersion);
        for (role, doc) in &documents {
            if self.unchanged(role, doc) {
                continue;
            }
            if let Some(trusted_version) = self.trusted_version(role) {
                if doc.version <= trusted_version {
                    return Err(ChainError::RollbackDetected {
                        role: role.clone(),
                        trusted: trusted_version,
                        version: doc.version,
                    });
                }
            }
        }

        self.transition(&commit, &mut state, ValidationState::CheckingExpiry);
        for (role, doc) in &documents {
            if doc.expires <= commit_time {
                return Err(ChainError::MetadataExpired {
                    role: role.clone(),
                    expires: doc.expires,
                    commit_time,
                });
            }
        }

        self.transition(&commit, &mut state, ValidationState::CheckingCrossref);
        check_cross_references(&documents)?;

        self.transition(&commit, &mut state, ValidationState::Trusted);
        self.trusted = Some(MetadataGeneration::new(commit, documents, new_root));
        Ok(())
    }

    /// Verify the root document's signatures.
    ///
    /// An unchanged root carries forward untouched. A changed root must
    /// meet the threshold of the *previous* trusted root's key set, so a
    /// compromised lower-threshold attacker cannot self-authorize, and
    /// additionally the threshold of its own new key set, which is what
    /// permits legitimate rotation while forbidding unilateral rotation.
    /// With no prior trust the first root self-certifies (trust on first
    /// use).
    ///
    /// Returns whether the root changed.
    fn check_root_signatures(
        &self,
        root_doc: &MetadataDocument,
        new_root: &RootContent,
    ) -> Result<bool, ChainError> {
        let new_role = new_root
            .resolve_role(&RoleName::Root)
            .ok_or_else(|| ChainError::RoleNotFound(RoleName::Root))?;

        let Some(trusted) = &self.trusted else {
            let valid = count_valid_signatures(root_doc, new_role, &new_root.keys);
            if valid < new_role.threshold as usize {
                return Err(ChainError::InsufficientSignatures {
                    role: RoleName::Root,
                    valid,
                    threshold: new_role.threshold,
                });
            }
            return Ok(true);
        };

        if self.unchanged(&RoleName::Root, root_doc) {
            return Ok(false);
        }

        let old_root = trusted.root();
        let old_role = old_root
            .resolve_role(&RoleName::Root)
            .ok_or_else(|| ChainError::RoleNotFound(RoleName::Root))?;

        let valid_old = count_valid_signatures(root_doc, old_role, &old_root.keys);
        if valid_old < old_role.threshold as usize {
            return Err(ChainError::InsufficientSignatures {
                role: RoleName::Root,
                valid: valid_old,
                threshold: old_role.threshold,
            });
        }
        let valid_new = count_valid_signatures(root_doc, new_role, &new_root.keys);
        if valid_new < new_role.threshold as usize {
            return Err(ChainError::InsufficientSignatures {
                role: RoleName::Root,
                valid: valid_new,
                threshold: new_role.threshold,
            });
        }
        Ok(true)
    }

    /// Whether the document is byte-identical to the trusted generation's
    /// document for the same role. Unchanged documents carry forward
    /// without signature/version re-checks.
    fn unchanged(&self, role: &RoleName, doc: &MetadataDocument) -> bool {
        self.trusted
            .as_ref()
            .and_then(|trusted| trusted.document(role))
            .map(|trusted_doc| trusted_doc.file_digest() == doc.file_digest())
            .unwrap_or(false)
    }

    fn trusted_version(&self, role: &RoleName) -> Option<u64> {
        self.trusted
            .as_ref()
            .and_then(|trusted| trusted.document(role))
            .map(|doc| doc.version)
    }

    fn transition(&self, commit: &CommitId, state: &mut ValidationState, next: ValidationState) {
        tracing::trace!("Commit {}: {:?} -> {:?}", commit, state, next);
        *state = next;
    }
}

impl Default for TrustChainValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Count distinct authorized keys with a verifying signature over the
/// document's canonical bytes. Unauthorized keyids, unknown keys, and
/// undecodable signatures are simply not counted.
fn count_valid_signatures(
    doc: &MetadataDocument,
    role: &Role,
    keys: &BTreeMap<KeyId, PublicKey>,
) -> usize {
    let mut valid: BTreeSet<&KeyId> = BTreeSet::new();
    for signature in &doc.signatures {
        if valid.contains(&signature.keyid) || !role.authorizes(&signature.keyid) {
            continue;
        }
        let Some(key) = keys.get(&signature.keyid) else {
            continue;
        };
        let Ok(bytes) = hex::decode(&signature.sig) else {
            tracing::debug!("Undecodable signature from key {}", signature.keyid);
            continue;
        };
        if key.verify(doc.canonical(), &bytes).is_ok() {
            valid.insert(&signature.keyid);
        }
    }
    valid.len()
}

/// Check snapshot and timestamp cross-references against the documents
/// actually loaded at the commit.
fn check_cross_references(
    documents: &BTreeMap<RoleName, MetadataDocument>,
) -> Result<(), ChainError> {
    let snapshot_doc = documents
        .get(&RoleName::Snapshot)
        .ok_or_else(|| ChainError::Malformed("missing snapshot document".to_string()))?;
    let snapshot = snapshot_doc
        .content
        .as_snapshot()
        .ok_or_else(|| ChainError::Malformed("snapshot document has no meta".to_string()))?;

    // every non-snapshot, non-timestamp document must be pinned exactly
    for (role, doc) in documents {
        if matches!(role, RoleName::Snapshot | RoleName::Timestamp) {
            continue;
        }
        let meta_name = role.metadata_filename();
        let entry = snapshot
            .meta
            .get(&meta_name)
            .ok_or_else(|| ChainError::SnapshotMismatch {
                meta: meta_name.clone(),
                reason: "present at commit but not listed by snapshot".to_string(),
            })?;
        if entry.version != doc.version {
            return Err(ChainError::SnapshotMismatch {
                meta: meta_name,
                reason: format!(
                    "snapshot pins version {}, document is version {}",
                    entry.version, doc.version
                ),
            });
        }
        match entry.sha256() {
            Some(expected) if expected == doc.file_digest() => {}
            Some(_) => {
                return Err(ChainError::SnapshotMismatch {
                    meta: meta_name,
                    reason: "content hash diverges from snapshot".to_string(),
                })
            }
            None => {
                return Err(ChainError::SnapshotMismatch {
                    meta: meta_name,
                    reason: "snapshot entry has no sha256".to_string(),
                })
            }
        }
    }

    // and snapshot must not pin files that are absent
    for meta_name in snapshot.meta.keys() {
        let Some(stem) = meta_name.strip_suffix(".json") else {
            return Err(ChainError::SnapshotMismatch {
                meta: meta_name.clone(),
                reason: "not a metadata filename".to_string(),
            });
        };
        let role: RoleName = stem.parse().expect("role name parsing is infallible");
        if !documents.contains_key(&role) {
            return Err(ChainError::SnapshotMismatch {
                meta: meta_name.clone(),
                reason: "listed by snapshot but absent at commit".to_string(),
            });
        }
    }

    let timestamp_doc = documents
        .get(&RoleName::Timestamp)
        .ok_or_else(|| ChainError::Malformed("missing timestamp document".to_string()))?;
    let timestamp = timestamp_doc
        .content
        .as_timestamp()
        .ok_or_else(|| ChainError::Malformed("timestamp document has no meta".to_string()))?;
    let snapshot_entry = timestamp
        .snapshot()
        .ok_or_else(|| ChainError::Malformed("timestamp does not reference snapshot".to_string()))?;

    if snapshot_entry.version != snapshot_doc.version {
        return Err(ChainError::TimestampStale {
            referenced: snapshot_entry.version,
            current: snapshot_doc.version,
        });
    }
    match snapshot_entry.sha256() {
        Some(expected) if expected == snapshot_doc.file_digest() => Ok(()),
        _ => Err(ChainError::SnapshotMismatch {
            meta: "snapshot.json".to_string(),
            reason: "timestamp's snapshot hash diverges".to_string(),
        }),
    }
}
