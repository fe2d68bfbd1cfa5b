//! Light wrapper around libgit2
//!
//! Scoped to exactly what the update protocol needs:
//!
//! - open / clone / fetch with bounded retries on transient failures
//! - commit enumeration, oldest first, strictly after a known commit
//! - reading files and directory listings at a specific commit
//! - commit timestamps (the reference clock for expiration checks)
//! - fast-forwarding local branches once a session succeeds
//!
//! This is a capability wrapper, not a git implementation: anything beyond
//! the calls below stays out.

mod retry;

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};

pub use retry::{is_transient, with_retries, DEFAULT_FETCH_ATTEMPTS};

/// Name of the remote tracked by clones and fetches.
pub const ORIGIN: &str = "origin";

/// Identifier of a git commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(git2::Oid);

impl CommitId {
    /// Parse a commit id from its hex form.
    pub fn from_hex(hex: &str) -> Result<Self, GitError> {
        git2::Oid::from_str(hex)
            .map(CommitId)
            .map_err(|_| GitError::InvalidCommitId(hex.to_string()))
    }

    fn oid(&self) -> git2::Oid {
        self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from the git capability.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// A transient failure that survived every retry attempt.
    #[error("network failure after {attempts} attempts: {source}")]
    NetworkFailure { attempts: u32, source: git2::Error },
    #[error("invalid commit id: {0}")]
    InvalidCommitId(String),
    #[error("branch {0} not found")]
    BranchNotFound(String),
    #[error("commit {0} has no representable timestamp")]
    BadTimestamp(String),
    #[error("object at {0} is not a blob")]
    NotABlob(String),
    #[error("object at {0} is not a tree")]
    NotATree(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// An open git repository on the local filesystem.
///
/// Wraps a `git2::Repository` handle. Handles are cheap to open; workers
/// that cross thread boundaries open their own rather than sharing one.
pub struct GitRepository {
    inner: git2::Repository,
    path: PathBuf,
}

impl fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository {
    /// Open an existing repository at the given path.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let inner = git2::Repository::open(path)?;
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Clone a repository, retrying transient network failures.
    ///
    /// `url` may be a remote URL or a filesystem path. When `branch` is
    /// given the clone checks it out directly.
    pub fn clone(
        url: &str,
        path: &Path,
        branch: Option<&str>,
        attempts: u32,
    ) -> Result<Self, GitError> {
        let inner = with_retries("clone", attempts, None, || {
            let mut builder = RepoBuilder::new();
            if let Some(branch) = branch {
                builder.branch(branch);
            }
            builder.clone(url, path)
        })?;
        tracing::info!("Cloned {} into {}", url, path.display());
        Ok(Self {
            inner,
            path: path.to_path_buf(),
        })
    }

    /// Fetch a branch from origin, retrying transient network failures.
    pub fn fetch(
        &self,
        branch: &str,
        attempts: u32,
        cancel: Option<&tokio::sync::watch::Receiver<bool>>,
    ) -> Result<(), GitError> {
        // an explicit refspec so the origin tracking ref advances too
        let refspec = format!("+refs/heads/{}:refs/remotes/{}/{}", branch, ORIGIN, branch);
        with_retries("fetch", attempts, cancel, || {
            let mut remote = self.inner.find_remote(ORIGIN)?;
            remote.fetch(&[refspec.as_str()], None, None)
        })?;
        tracing::debug!("Fetched {} for {}", branch, self.path.display());
        Ok(())
    }

    /// The filesystem path this repository lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL of the origin remote, if one is configured.
    pub fn origin_url(&self) -> Option<String> {
        self.inner
            .find_remote(ORIGIN)
            .ok()
            .and_then(|remote| remote.url().map(String::from))
    }

    /// Head commit of a local branch.
    pub fn branch_head(&self, branch: &str) -> Result<CommitId, GitError> {
        let branch = self
            .inner
            .find_branch(branch, git2::BranchType::Local)
            .map_err(|_| GitError::BranchNotFound(branch.to_string()))?;
        Ok(CommitId(branch.get().peel_to_commit()?.id()))
    }

    /// Head commit of the origin tracking ref for a branch, falling back
    /// to the local branch when no tracking ref exists (fs-only repos).
    pub fn remote_branch_head(&self, branch: &str) -> Result<CommitId, GitError> {
        match self
            .inner
            .find_branch(&format!("{}/{}", ORIGIN, branch), git2::BranchType::Remote)
        {
            Ok(remote) => Ok(CommitId(remote.get().peel_to_commit()?.id())),
            Err(_) => self.branch_head(branch),
        }
    }

    /// Whether the given commit exists in this repository.
    pub fn contains_commit(&self, commit: &CommitId) -> bool {
        self.inner.find_commit(commit.oid()).is_ok()
    }

    /// Commits reachable from `head`, oldest first, strictly after
    /// `since` when given.
    pub fn commits_between(
        &self,
        since: Option<&CommitId>,
        head: &CommitId,
    ) -> Result<Vec<CommitId>, GitError> {
        let mut walk = self.inner.revwalk()?;
        walk.push(head.oid())?;
        if let Some(since) = since {
            walk.hide(since.oid())?;
        }
        walk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;
        let mut commits = Vec::new();
        for oid in walk {
            commits.push(CommitId(oid?));
        }
        Ok(commits)
    }

    /// Committer timestamp of a commit, the reference clock for
    /// expiration checks.
    pub fn commit_time(&self, commit: &CommitId) -> Result<DateTime<Utc>, GitError> {
        let found = self.inner.find_commit(commit.oid())?;
        Utc.timestamp_opt(found.time().seconds(), 0)
            .single()
            .ok_or_else(|| GitError::BadTimestamp(commit.to_string()))
    }

    /// Read a file's bytes at a commit. `Ok(None)` when the path does not
    /// exist in that commit's tree.
    pub fn read_file_at(&self, commit: &CommitId, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let tree = self.inner.find_commit(commit.oid())?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.inner)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| GitError::NotABlob(path.to_string()))?;
        Ok(Some(blob.content().to_vec()))
    }

    /// List entry names of a directory at a commit. Empty when the
    /// directory does not exist in that commit's tree.
    pub fn list_dir_at(&self, commit: &CommitId, dir: &str) -> Result<Vec<String>, GitError> {
        let tree = self.inner.find_commit(commit.oid())?.tree()?;
        let entry = match tree.get_path(Path::new(dir)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let object = entry.to_object(&self.inner)?;
        let subtree = object
            .as_tree()
            .ok_or_else(|| GitError::NotATree(dir.to_string()))?;
        Ok(subtree
            .iter()
            .filter_map(|entry| entry.name().map(String::from))
            .collect())
    }

    /// Fast-forward a local branch to a validated commit and check it out.
    ///
    /// Only called by the orchestrator's final merge step, after the
    /// session has fully succeeded.
    pub fn fast_forward(&self, branch: &str, commit: &CommitId) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", branch);
        self.inner
            .reference(&refname, commit.oid(), true, "ratchet: fast-forward")?;
        if !self.inner.is_bare() {
            self.inner.set_head(&refname)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            self.inner.checkout_head(Some(&mut checkout))?;
        }
        tracing::info!(
            "Fast-forwarded {} to {} in {}",
            branch,
            commit,
            self.path.display()
        );
        Ok(())
    }
}
