use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::git::CommitId;

fn signature() -> Result<git2::Signature<'static>> {
    Ok(git2::Signature::now("ratchet-testkit", "testkit@example.com")?)
}

fn commit_files(
    repo_path: &Path,
    files: &BTreeMap<String, Vec<u8>>,
    message: &str,
) -> Result<CommitId> {
    for (rel, bytes) in files {
        let full = repo_path.join(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)?;
    }

    let repo = git2::Repository::open(repo_path)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let sig = signature()?;

    let parent = repo
        .head()
        .ok()
        .and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
    Ok(CommitId::from_hex(&oid.to_string())?)
}

/// A scripted authentication repository on disk.
///
/// Commits are whole file sets, usually produced by
/// [`build_metadata`](super::build_metadata).
#[derive(Debug)]
pub struct AuthRepoFixture {
    path: PathBuf,
}

impl AuthRepoFixture {
    /// Initialize a fresh repository with the given default branch.
    pub fn init(path: &Path, branch: &str) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head(branch);
        git2::Repository::init_opts(path, &opts)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the file set into the working tree and commit it.
    pub fn commit(&self, files: &BTreeMap<String, Vec<u8>>, message: &str) -> Result<CommitId> {
        commit_files(&self.path, files, message)
    }

    pub fn head(&self) -> Result<CommitId> {
        let repo = git2::Repository::open(&self.path)?;
        let oid = repo.head()?.peel_to_commit()?.id();
        Ok(CommitId::from_hex(&oid.to_string())?)
    }
}

/// A scripted target repository on disk.
#[derive(Debug)]
pub struct TargetRepoFixture {
    path: PathBuf,
}

impl TargetRepoFixture {
    pub fn init(path: &Path, branch: &str) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head(branch);
        git2::Repository::init_opts(path, &opts)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit a single file change and return the new head.
    pub fn commit_file(&self, name: &str, content: &str) -> Result<CommitId> {
        let files = BTreeMap::from([(name.to_string(), content.as_bytes().to_vec())]);
        commit_files(&self.path, &files, &format!("update {}", name))
    }

    pub fn head(&self) -> Result<CommitId> {
        let repo = git2::Repository::open(&self.path)?;
        let oid = repo.head()?.peel_to_commit()?.id();
        Ok(CommitId::from_hex(&oid.to_string())?)
    }
}

/// Body of a target pin file vouching for one commit.
pub fn pin_file(commit: &CommitId, branch: Option<&str>) -> Vec<u8> {
    let mut body = serde_json::json!({ "commit": commit.to_string() });
    if let Some(branch) = branch {
        body["branch"] = serde_json::json!(branch);
    }
    serde_json::to_vec_pretty(&body).expect("pin file serializes")
}

/// Body of a repositories.json descriptor from `(name, urls)` pairs.
pub fn repositories_json(entries: &[(&str, Vec<String>)]) -> Vec<u8> {
    let repositories: BTreeMap<&str, serde_json::Value> = entries
        .iter()
        .map(|(name, urls)| (*name, serde_json::json!({ "urls": urls })))
        .collect();
    serde_json::to_vec_pretty(&serde_json::json!({ "repositories": repositories }))
        .expect("descriptor serializes")
}
