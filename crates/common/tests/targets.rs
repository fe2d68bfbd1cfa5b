//! Target repository validation against descriptor entries and pins

mod common;

use ::common::descriptor::{MirrorsDescriptor, RepositoryEntry};
use ::common::git::GitRepository;
use ::common::target::{validate_target, TargetClaims, TargetError};

use self::common::{setup_library, BRANCH, TARGET_NAME};

fn claims(entry: RepositoryEntry, pins: Vec<::common::git::CommitId>) -> TargetClaims {
    TargetClaims {
        name: TARGET_NAME.to_string(),
        entry,
        branch: None,
        pins,
    }
}

#[test]
fn test_pins_in_order_pass() {
    let lib = setup_library();
    let c1 = lib.target.commit_file("a.txt", "1").unwrap();
    let c2 = lib.target.commit_file("a.txt", "2").unwrap();

    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(RepositoryEntry { urls: vec![], custom: None }, vec![c1, c2]);
    validate_target(&repo, &claims, None, BRANCH, false).unwrap();
}

#[test]
fn test_out_of_order_pins_fail() {
    let lib = setup_library();
    let c1 = lib.target.commit_file("a.txt", "1").unwrap();
    let c2 = lib.target.commit_file("a.txt", "2").unwrap();

    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(RepositoryEntry { urls: vec![], custom: None }, vec![c2, c1]);
    let err = validate_target(&repo, &claims, None, BRANCH, false).unwrap_err();
    assert!(matches!(err, TargetError::CommitOrderMismatch { commit, .. } if commit == c1));
}

#[test]
fn test_missing_pin_fails() {
    let lib = setup_library();
    lib.target.commit_file("a.txt", "1").unwrap();

    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(
        RepositoryEntry { urls: vec![], custom: None },
        vec![self::common::commit_id(0x42)],
    );
    let err = validate_target(&repo, &claims, None, BRANCH, false).unwrap_err();
    assert!(matches!(err, TargetError::MissingPinnedCommit { .. }));
}

#[test]
fn test_url_mismatch_fails() {
    let lib = setup_library();
    let c1 = lib.target.commit_file("a.txt", "1").unwrap();

    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(
        RepositoryEntry {
            urls: vec!["https://example.com/elsewhere.git".to_string()],
            custom: None,
        },
        vec![c1],
    );
    let err = validate_target(&repo, &claims, None, BRANCH, true).unwrap_err();
    assert!(matches!(err, TargetError::UrlMismatch { .. }));
}

#[test]
fn test_url_match_via_path() {
    let lib = setup_library();
    let c1 = lib.target.commit_file("a.txt", "1").unwrap();

    // a repo without a remote resolves to its own path
    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(
        RepositoryEntry {
            urls: vec![lib.target.path().display().to_string()],
            custom: None,
        },
        vec![c1],
    );
    validate_target(&repo, &claims, None, BRANCH, true).unwrap();
}

#[test]
fn test_mirror_templates_supply_urls() {
    let lib = setup_library();
    let c1 = lib.target.commit_file("a.txt", "1").unwrap();

    let template = format!("{}/{{org_name}}/{{repo_name}}", lib.origin_dir().display());
    let mirrors =
        MirrorsDescriptor::parse(serde_json::to_vec(&vec![template]).unwrap().as_slice()).unwrap();

    let repo = GitRepository::open(lib.target.path()).unwrap();
    let claims = claims(RepositoryEntry { urls: vec![], custom: None }, vec![c1]);
    validate_target(&repo, &claims, Some(&mirrors), BRANCH, true).unwrap();
}
