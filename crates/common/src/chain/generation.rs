use std::collections::BTreeMap;

use crate::git::CommitId;
use crate::metadata::{MetadataDocument, RoleName, RootContent, TargetsContent};

use super::validator::ChainError;

/// A fully validated set of metadata documents at one commit.
///
/// This is the unit of trust: generations are created only by the trust
/// chain validator after every check passes, are never mutated, and form
/// an append-only history; each session starts from the generation at the
/// durable trusted pointer and only ever moves forward.
#[derive(Debug, Clone)]
pub struct MetadataGeneration {
    commit: CommitId,
    documents: BTreeMap<RoleName, MetadataDocument>,
    root: RootContent,
}

impl MetadataGeneration {
    pub(super) fn new(
        commit: CommitId,
        documents: BTreeMap<RoleName, MetadataDocument>,
        root: RootContent,
    ) -> Self {
        Self {
            commit,
            documents,
            root,
        }
    }

    /// The authentication-repository commit this generation is bound to.
    pub fn commit(&self) -> CommitId {
        self.commit
    }

    /// The root content in effect at this generation.
    pub fn root(&self) -> &RootContent {
        &self.root
    }

    /// All documents in this generation, by role.
    pub fn documents(&self) -> &BTreeMap<RoleName, MetadataDocument> {
        &self.documents
    }

    pub fn document(&self, role: &RoleName) -> Option<&MetadataDocument> {
        self.documents.get(role)
    }

    /// The top-level targets manifest, when present.
    pub fn targets(&self) -> Option<&TargetsContent> {
        self.documents
            .get(&RoleName::Targets)
            .and_then(|doc| doc.content.as_targets())
    }

    /// Look up a target file's manifest entry across the targets role and
    /// every delegated role.
    pub fn target_spec(&self, path: &str) -> Option<&crate::metadata::TargetFileSpec> {
        self.documents.values().find_map(|doc| {
            doc.content
                .as_targets()
                .and_then(|content| content.targets.get(path))
        })
    }

    /// Verify raw target file bytes against the signed manifest.
    ///
    /// A file that is not listed by any targets-like role, or whose bytes
    /// diverge from the pinned length/hash, is not authenticated.
    pub fn verify_target_file(&self, path: &str, bytes: &[u8]) -> Result<(), ChainError> {
        match self.target_spec(path) {
            Some(spec) if spec.matches(bytes) => Ok(()),
            _ => Err(ChainError::TargetFileMismatch {
                path: path.to_string(),
            }),
        }
    }
}
