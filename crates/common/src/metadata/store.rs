use std::collections::BTreeMap;

use crate::git::{CommitId, GitError, GitRepository};

use super::document::MetadataDocument;
use super::role::RoleName;
use super::{METADATA_DIR, TARGETS_DIR};

/// Errors surfaced while materializing metadata at a commit.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// A document cannot be parsed into the generation schema. Non-fatal
    /// per commit; the orchestrator rejects the commit and stops there.
    #[error("malformed {role} metadata: {reason}")]
    Malformed { role: RoleName, reason: String },
    /// A top-level role document is absent at the commit.
    #[error("missing {role} metadata document")]
    MissingDocument { role: RoleName },
    #[error(transparent)]
    Git(#[from] GitError),
}

/// A raw target file read from the authentication repository at a commit.
#[derive(Debug, Clone)]
pub struct TargetFile {
    /// Path relative to the targets directory, e.g. `ns/repo1`.
    pub path: String,
    pub raw: Vec<u8>,
}

/// Materializes the metadata documents present at a commit of the
/// authentication repository, without verifying them.
///
/// Verification is the trust chain validator's job; the store only reads
/// and parses. One store instance is scoped to one open repository.
#[derive(Debug)]
pub struct MetadataStore<'a> {
    repo: &'a GitRepository,
}

impl<'a> MetadataStore<'a> {
    pub fn new(repo: &'a GitRepository) -> Self {
        Self { repo }
    }

    /// Load every role document present under `metadata/` at the commit.
    ///
    /// All four top-level roles must be present; delegated role documents
    /// are picked up by filename. Parse failures surface as
    /// [`MetadataError::Malformed`] for the offending role.
    pub fn load_documents(
        &self,
        commit: &CommitId,
    ) -> Result<BTreeMap<RoleName, MetadataDocument>, MetadataError> {
        let mut documents = BTreeMap::new();

        for filename in self.repo.list_dir_at(commit, METADATA_DIR)? {
            let Some(stem) = filename.strip_suffix(".json") else {
                tracing::debug!("Skipping non-metadata file {} at {}", filename, commit);
                continue;
            };
            let role: RoleName = stem.parse().expect("role name parsing is infallible");

            let path = format!("{}/{}", METADATA_DIR, filename);
            let raw = self
                .repo
                .read_file_at(commit, &path)?
                .ok_or_else(|| MetadataError::MissingDocument { role: role.clone() })?;

            let document = MetadataDocument::parse(&role, &raw).map_err(|reason| {
                MetadataError::Malformed {
                    role: role.clone(),
                    reason,
                }
            })?;
            documents.insert(role, document);
        }

        for role in RoleName::TOP_LEVEL {
            if !documents.contains_key(&role) {
                return Err(MetadataError::MissingDocument { role });
            }
        }

        Ok(documents)
    }

    /// Read a single target file at the commit, if present.
    pub fn read_target_file(
        &self,
        commit: &CommitId,
        name: &str,
    ) -> Result<Option<TargetFile>, MetadataError> {
        let path = format!("{}/{}", TARGETS_DIR, name);
        Ok(self.repo.read_file_at(commit, &path)?.map(|raw| TargetFile {
            path: name.to_string(),
            raw,
        }))
    }
}
