//! Update sessions
//!
//! One `update` or `validate` invocation is scoped by an [`UpdateSession`]:
//! it resolves the layout, walks the authentication repository's new
//! commits through the trust chain validator, validates every target
//! repository concurrently, and, only when everything passed, advances
//! the durable trusted pointer and fast-forwards local branches, all or
//! nothing.
//!
//! The orchestrator is the only component with side effects on persistent
//! local state. The trusted pointer is mutated under an exclusive
//! per-repository lock, so at most one successful session advances it even
//! when invoked concurrently.

mod hooks;
mod orchestrator;
mod pointer;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::chain::ChainError;
use crate::descriptor::DescriptorError;
use crate::git::{CommitId, GitError, DEFAULT_FETCH_ATTEMPTS};
use crate::layout::LayoutError;

pub use hooks::{run_hooks, HookError};
pub use orchestrator::UpdateSession;
pub use pointer::{PointerError, RepoLock, TrustedPointer};

/// Target file whose presence marks a test authentication repository.
pub const TEST_REPO_MARKER: &str = "test-auth-repo";

/// What kind of authentication repository the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedRepoType {
    Test,
    Official,
    /// Skip the repository type check entirely.
    #[default]
    Either,
}

impl fmt::Display for ExpectedRepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedRepoType::Test => write!(f, "test"),
            ExpectedRepoType::Official => write!(f, "official"),
            ExpectedRepoType::Either => write!(f, "either"),
        }
    }
}

impl FromStr for ExpectedRepoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(ExpectedRepoType::Test),
            "official" => Ok(ExpectedRepoType::Official),
            "either" => Ok(ExpectedRepoType::Either),
            other => Err(format!("unknown repository type: {}", other)),
        }
    }
}

/// Configuration for one session.
///
/// `remote_url` decides the mode: set for `update` (clone/fetch allowed,
/// local state advanced on success), absent for `validate` (read-only, no
/// clones, no fetches, no pointer mutation).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Source url of the authentication repository; None for validate-only.
    pub remote_url: Option<String>,
    /// Local path of the authentication repository; derived from the
    /// library dir and url when absent.
    pub auth_path: Option<PathBuf>,
    /// Explicit library directory override.
    pub library_dir: Option<PathBuf>,
    /// Explicit namespace override.
    pub namespace: Option<String>,
    pub default_branch: String,
    /// The remote url is a filesystem path; url validation is skipped.
    pub from_fs: bool,
    pub expected_type: ExpectedRepoType,
    /// Root directory for post-update lifecycle hook scripts.
    pub scripts_root_dir: Option<PathBuf>,
    /// First commit to validate (validate-only runs).
    pub from_commit: Option<CommitId>,
    /// Bound on concurrently validated target repositories.
    pub max_concurrent_targets: usize,
    /// Bound on clone/fetch attempts for transient failures.
    pub fetch_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            auth_path: None,
            library_dir: None,
            namespace: None,
            default_branch: "main".to_string(),
            from_fs: false,
            expected_type: ExpectedRepoType::default(),
            scripts_root_dir: None,
            from_commit: None,
            max_concurrent_targets: 4,
            fetch_attempts: DEFAULT_FETCH_ATTEMPTS,
        }
    }
}

impl SessionConfig {
    /// Configuration for an update session from a remote url.
    pub fn update(url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Configuration for a validate-only session over a local repository.
    pub fn validate(auth_path: impl Into<PathBuf>) -> Self {
        Self {
            auth_path: Some(auth_path.into()),
            ..Self::default()
        }
    }

    /// Whether this session may touch the network and local state.
    pub fn is_update(&self) -> bool {
        self.remote_url.is_some()
    }
}

/// Per-target-repository result, aggregated across all workers.
#[derive(Debug, Clone)]
pub struct RepoReport {
    pub name: String,
    /// None when validation passed.
    pub error: Option<String>,
}

/// A successful session's result.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The last fully validated authentication-repository commit; the
    /// trusted pointer now rests here (update mode).
    pub accepted_commit: CommitId,
    /// Number of commits newly validated by this session.
    pub newly_validated: usize,
    pub per_repo: Vec<RepoReport>,
}

/// Session failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The trust chain rejected a commit. `last_trusted` is the commit the
    /// chain stopped at; when target validation for it passed, the pointer
    /// rests there.
    #[error("trust chain rejected commit {commit}: {reason}")]
    ChainRejected {
        commit: CommitId,
        reason: ChainError,
        last_trusted: Option<CommitId>,
    },
    #[error("target validation failed for {} repository(ies)", .failures.len())]
    Targets { failures: Vec<RepoReport> },
    #[error("expected {expected} authentication repository, found a {found} one")]
    WrongRepoType {
        expected: ExpectedRepoType,
        found: ExpectedRepoType,
    },
    #[error("required target file {0} is missing or unauthenticated")]
    MissingTargetFile(String),
    #[error("authentication repository has no commits to validate")]
    EmptyHistory,
    #[error("either an authentication repository path or a library directory is required")]
    MissingPaths,
    #[error("session cancelled")]
    Cancelled,
    #[error("worker task failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Pointer(#[from] PointerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_repo_type_round_trip() {
        for repo_type in [
            ExpectedRepoType::Test,
            ExpectedRepoType::Official,
            ExpectedRepoType::Either,
        ] {
            let parsed: ExpectedRepoType = repo_type.to_string().parse().unwrap();
            assert_eq!(parsed, repo_type);
        }
        assert!("production".parse::<ExpectedRepoType>().is_err());
    }

    #[test]
    fn test_config_modes() {
        assert!(SessionConfig::update("https://example.com/ns/auth").is_update());
        assert!(!SessionConfig::validate("/library/ns/auth").is_update());
    }
}
