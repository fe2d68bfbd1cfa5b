//! Target repository validation
//!
//! Once the trust chain has produced an authenticated descriptor, every
//! target repository it names is checked against two claims:
//!
//! - its resolved URL (or filesystem path) matches the descriptor entry,
//!   directly or via mirror template substitution when the entry carries
//!   no direct urls
//! - every commit the authentication repository pinned for it exists in
//!   its local history, in pin order
//!
//! Failures are fatal for the offending repository but never abort
//! validation of its siblings; the orchestrator aggregates all failures
//! before deciding the session outcome.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::descriptor::{DescriptorError, MirrorsDescriptor, RepositoryEntry};
use crate::git::{CommitId, GitError, GitRepository};

/// Per-target validation failures.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("{name}: url {actual} matches none of the descriptor urls {expected:?}")]
    UrlMismatch {
        name: String,
        actual: String,
        expected: Vec<String>,
    },
    #[error("{name}: pinned commit {commit} is missing from local history")]
    MissingPinnedCommit { name: String, commit: CommitId },
    #[error("{name}: pinned commit {commit} is out of order in local history")]
    CommitOrderMismatch { name: String, commit: CommitId },
    #[error("{name}: repository cannot be located at {path}")]
    Unlocatable { name: String, path: String },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Git(#[from] GitError),
}

/// The authenticated claims one session makes about a target repository.
#[derive(Debug, Clone)]
pub struct TargetClaims {
    /// Namespaced repository name, e.g. `ns/repo1`.
    pub name: String,
    /// Descriptor entry for the repository.
    pub entry: RepositoryEntry,
    /// Branch the pins apply to; the session default when absent.
    pub branch: Option<String>,
    /// Pinned commits in authentication-commit order, oldest first.
    pub pins: Vec<CommitId>,
}

/// One pin file's body: the head commit the authentication repository
/// vouches for at one of its own commits.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetPin {
    pub commit: String,
    #[serde(default)]
    pub branch: Option<String>,
}

impl TargetPin {
    /// Parse a pin file body. The reason string surfaces as the rejection
    /// reason for the authentication commit carrying the pin.
    pub fn parse(raw: &[u8]) -> Result<Self, String> {
        serde_json::from_slice(raw).map_err(|e| format!("invalid target pin file: {}", e))
    }
}

/// Validate one target repository against its claims.
///
/// `check_urls` is off for filesystem-only updates, where the descriptor
/// urls are local paths with no remote to compare against.
pub fn validate_target(
    repo: &GitRepository,
    claims: &TargetClaims,
    mirrors: Option<&MirrorsDescriptor>,
    default_branch: &str,
    check_urls: bool,
) -> Result<(), TargetError> {
    if check_urls {
        check_url(repo, claims, mirrors)?;
    }

    let branch = claims.branch.as_deref().unwrap_or(default_branch);
    check_pins(repo, claims, branch)?;

    tracing::info!(
        "Validated target {} ({} pinned commits)",
        claims.name,
        claims.pins.len()
    );
    Ok(())
}

/// The urls a target repository is allowed to resolve to: the entry's
/// direct urls, or every mirror substitution when the entry has none.
/// The orchestrator also clones missing targets from the first of these.
pub fn resolved_urls(
    claims: &TargetClaims,
    mirrors: Option<&MirrorsDescriptor>,
) -> Result<Vec<String>, TargetError> {
    if !claims.entry.urls.is_empty() {
        return Ok(claims.entry.urls.clone());
    }
    match mirrors {
        Some(mirrors) => Ok(mirrors.resolve(&claims.name)?),
        None => Ok(Vec::new()),
    }
}

fn check_url(
    repo: &GitRepository,
    claims: &TargetClaims,
    mirrors: Option<&MirrorsDescriptor>,
) -> Result<(), TargetError> {
    let expected = resolved_urls(claims, mirrors)?;
    let actual = match repo.origin_url() {
        Some(url) => url,
        // no remote configured: the repository's own path stands in
        None => repo.path().display().to_string(),
    };

    if expected.iter().any(|url| url == &actual) {
        return Ok(());
    }
    // urls that are filesystem paths may differ in spelling; compare
    // canonical forms before giving up
    if let Ok(actual_path) = Path::new(&actual).canonicalize() {
        for url in &expected {
            if let Ok(expected_path) = Path::new(url).canonicalize() {
                if expected_path == actual_path {
                    return Ok(());
                }
            }
        }
    }

    Err(TargetError::UrlMismatch {
        name: claims.name.clone(),
        actual,
        expected,
    })
}

/// Every pinned commit must exist in the branch history, and the pins
/// must appear in the same order they were made.
///
/// History is read from the origin tracking ref when one exists (the
/// fetch step updates it), falling back to the local branch for
/// filesystem-only repositories.
fn check_pins(repo: &GitRepository, claims: &TargetClaims, branch: &str) -> Result<(), TargetError> {
    if claims.pins.is_empty() {
        return Ok(());
    }

    let head = repo.remote_branch_head(branch)?;
    let history = repo.commits_between(None, &head)?;
    let positions: HashMap<CommitId, usize> = history
        .iter()
        .enumerate()
        .map(|(index, commit)| (*commit, index))
        .collect();

    let mut last_position: Option<usize> = None;
    for pin in &claims.pins {
        let position = positions
            .get(pin)
            .copied()
            .ok_or_else(|| TargetError::MissingPinnedCommit {
                name: claims.name.clone(),
                commit: *pin,
            })?;
        if let Some(last) = last_position {
            if position <= last {
                return Err(TargetError::CommitOrderMismatch {
                    name: claims.name.clone(),
                    commit: *pin,
                });
            }
        }
        last_position = Some(position);
    }
    Ok(())
}
