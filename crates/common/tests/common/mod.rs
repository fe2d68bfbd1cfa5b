//! Shared fixtures for update engine integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use tempfile::TempDir;

use common::git::CommitId;
use common::metadata::{MetadataDocument, RoleName};
use common::testkit::{
    build_metadata, pin_file, repositories_json, AuthRepoFixture, CommitSpec, KeyRing,
    TargetRepoFixture,
};

pub const BRANCH: &str = "main";
pub const TARGET_NAME: &str = "ns/repo1";

/// An origin library with one authentication repo and one target repo,
/// plus an empty client library to update into.
pub struct Library {
    pub temp: TempDir,
    pub ring: KeyRing,
    pub auth: AuthRepoFixture,
    pub target: TargetRepoFixture,
}

impl Library {
    pub fn origin_dir(&self) -> PathBuf {
        self.temp.path().join("origin")
    }

    pub fn client_dir(&self) -> PathBuf {
        self.temp.path().join("client")
    }

    /// The auth repo's "remote" url: a filesystem path in tests.
    pub fn auth_url(&self) -> String {
        self.origin_dir().join("ns/auth-repo").display().to_string()
    }

    /// Where the client copy of the auth repo lands after an update.
    pub fn client_auth_path(&self) -> PathBuf {
        self.client_dir().join("ns/auth-repo")
    }

    pub fn client_target_path(&self) -> PathBuf {
        self.client_dir().join("ns").join("repo1")
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.client_dir().join("ns/_auth-repo/last_validated_commit")
    }

    /// Commit a metadata generation to the auth repo that pins the given
    /// target commit for `ns/repo1`.
    pub fn commit_pinning(&self, spec: &CommitSpec, pinned: &CommitId) -> CommitId {
        let descriptor = repositories_json(&[(
            TARGET_NAME,
            vec![self.target.path().display().to_string()],
        )]);
        let spec = spec
            .clone()
            .with_target("repositories.json", descriptor)
            .with_target(TARGET_NAME, pin_file(pinned, Some(BRANCH)));
        self.auth
            .commit(&build_metadata(&self.ring, &spec), "metadata update")
            .unwrap()
    }
}

pub fn setup_library() -> Library {
    let temp = TempDir::new().unwrap();
    let origin = temp.path().join("origin");
    let ring = KeyRing::standard();
    let auth = AuthRepoFixture::init(&origin.join("ns/auth-repo"), BRANCH).unwrap();
    let target = TargetRepoFixture::init(&origin.join("ns/repo1"), BRANCH).unwrap();
    std::fs::create_dir_all(temp.path().join("client")).unwrap();
    Library {
        temp,
        ring,
        auth,
        target,
    }
}

/// Parse a built metadata file set into per-role documents, the way the
/// store would at a commit.
pub fn parse_documents(
    files: &BTreeMap<String, Vec<u8>>,
) -> BTreeMap<RoleName, MetadataDocument> {
    files
        .iter()
        .filter_map(|(path, raw)| {
            let filename = path.strip_prefix("metadata/")?;
            let role: RoleName = filename.strip_suffix(".json")?.parse().ok()?;
            Some((role.clone(), MetadataDocument::parse(&role, raw).unwrap()))
        })
        .collect()
}

/// A synthetic commit id for validator-level tests that don't need git.
pub fn commit_id(n: u8) -> CommitId {
    CommitId::from_hex(&format!("{:040x}", n)).unwrap()
}
