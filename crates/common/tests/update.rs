//! End-to-end update and validate sessions over filesystem repositories

mod common;

use tokio::sync::watch;

use ::common::chain::ChainError;
use ::common::git::GitRepository;
use ::common::metadata::RoleName;
use ::common::session::{ExpectedRepoType, SessionConfig, SessionError, UpdateSession};
use ::common::testkit::CommitSpec;

use self::common::{commit_id, setup_library, Library, BRANCH, TARGET_NAME};

fn update_config(lib: &Library) -> SessionConfig {
    let mut config = SessionConfig::update(lib.auth_url());
    config.library_dir = Some(lib.client_dir());
    config.from_fs = true;
    config
}

fn validate_config(lib: &Library) -> SessionConfig {
    let mut config = SessionConfig::validate(lib.client_auth_path());
    config.library_dir = Some(lib.client_dir());
    config
}

/// A never-fired cancellation signal; the receiver keeps the last value
/// after the sender is gone.
fn cancel_signal() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

#[tokio::test]
async fn test_update_clones_and_validates_everything() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    let auth_commit = lib.commit_pinning(&CommitSpec::initial(), &pinned);

    let session = UpdateSession::new(update_config(&lib));
    let outcome = session.run(cancel_signal()).await.unwrap();

    assert_eq!(outcome.accepted_commit, auth_commit);
    assert_eq!(outcome.newly_validated, 1);
    assert_eq!(outcome.per_repo.len(), 1);
    assert!(outcome.per_repo[0].error.is_none());

    // the client copies exist and the trusted pointer rests at the head
    assert!(lib.client_auth_path().join(".git").exists());
    assert!(lib.client_target_path().join(".git").exists());
    let recorded = std::fs::read_to_string(lib.pointer_path()).unwrap();
    assert_eq!(recorded.trim(), auth_commit.to_string());

    // the target's local branch was fast-forwarded to the pinned commit
    let target = GitRepository::open(&lib.client_target_path()).unwrap();
    assert_eq!(target.branch_head(BRANCH).unwrap(), pinned);
}

#[tokio::test]
async fn test_update_advances_over_new_commits() {
    let lib = setup_library();
    let pin1 = lib.target.commit_file("data.txt", "v1").unwrap();
    let spec1 = CommitSpec::initial();
    lib.commit_pinning(&spec1, &pin1);

    let session = UpdateSession::new(update_config(&lib));
    session.run(cancel_signal()).await.unwrap();

    // origin moves forward: new target head, new metadata generation
    let pin2 = lib.target.commit_file("data.txt", "v2").unwrap();
    let auth2 = lib.commit_pinning(&spec1.next(), &pin2);

    let session = UpdateSession::new(update_config(&lib));
    let outcome = session.run(cancel_signal()).await.unwrap();

    assert_eq!(outcome.accepted_commit, auth2);
    assert_eq!(outcome.newly_validated, 1);
    let target = GitRepository::open(&lib.client_target_path()).unwrap();
    assert_eq!(target.branch_head(BRANCH).unwrap(), pin2);
}

#[tokio::test]
async fn test_update_is_idempotent() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    let auth_commit = lib.commit_pinning(&CommitSpec::initial(), &pinned);

    let first = UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap();
    let second = UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap();

    assert_eq!(first.accepted_commit, auth_commit);
    assert_eq!(second.accepted_commit, auth_commit);
    assert_eq!(second.newly_validated, 0);
}

#[tokio::test]
async fn test_validate_only_is_read_only_and_idempotent() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    let auth_commit = lib.commit_pinning(&CommitSpec::initial(), &pinned);

    UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap();
    let pointer_before = std::fs::read_to_string(lib.pointer_path()).unwrap();

    for _ in 0..2 {
        let outcome = UpdateSession::new(validate_config(&lib))
            .run(cancel_signal())
            .await
            .unwrap();
        assert_eq!(outcome.accepted_commit, auth_commit);
    }

    // no durable state was touched
    let pointer_after = std::fs::read_to_string(lib.pointer_path()).unwrap();
    assert_eq!(pointer_before, pointer_after);
}

#[tokio::test]
async fn test_missing_pinned_commit_rejects_session() {
    let lib = setup_library();
    lib.target.commit_file("data.txt", "v1").unwrap();
    // pin a commit that exists nowhere in the target's history
    let bogus = commit_id(0xab);
    lib.commit_pinning(&CommitSpec::initial(), &bogus);

    let err = UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap_err();

    match err {
        SessionError::Targets { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, TARGET_NAME);
            assert!(failures[0]
                .error
                .as_deref()
                .unwrap()
                .contains("missing from local history"));
        }
        other => panic!("expected target failure, got {}", other),
    }
    // all-or-nothing: the trusted pointer did not advance
    assert!(!lib.pointer_path().exists());
}

#[tokio::test]
async fn test_rollback_mid_chain_stops_at_last_trusted() {
    let lib = setup_library();
    let pin1 = lib.target.commit_file("data.txt", "v1").unwrap();
    let spec1 = CommitSpec::initial();
    let auth1 = lib.commit_pinning(&spec1, &pin1);

    // commit B changes the targets content but reuses its version
    let pin2 = lib.target.commit_file("data.txt", "v2").unwrap();
    lib.commit_pinning(&spec1.next().with_version(RoleName::Targets, 1), &pin2);

    let err = UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap_err();

    match err {
        SessionError::ChainRejected {
            reason: ChainError::RollbackDetected { .. },
            last_trusted,
            ..
        } => assert_eq!(last_trusted, Some(auth1)),
        other => panic!("expected rollback rejection, got {}", other),
    }
    // the session stopped at commit A and committed exactly that much
    let recorded = std::fs::read_to_string(lib.pointer_path()).unwrap();
    assert_eq!(recorded.trim(), auth1.to_string());
}

#[tokio::test]
async fn test_sub_threshold_bootstrap_leaves_no_state() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    lib.commit_pinning(
        &CommitSpec::initial().with_signer_count(RoleName::Root, 1),
        &pinned,
    );

    let err = UpdateSession::new(update_config(&lib))
        .run(cancel_signal())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::ChainRejected {
            reason: ChainError::InsufficientSignatures { .. },
            last_trusted: None,
            ..
        }
    ));
    assert!(!lib.pointer_path().exists());
}

#[tokio::test]
async fn test_expected_repo_type_is_enforced() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    lib.commit_pinning(&CommitSpec::initial(), &pinned);

    let mut config = update_config(&lib);
    config.expected_type = ExpectedRepoType::Test;
    let err = UpdateSession::new(config)
        .run(cancel_signal())
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::WrongRepoType { .. }));

    // marking the repository as a test repository satisfies the check
    let lib2 = setup_library();
    let pinned2 = lib2.target.commit_file("data.txt", "v1").unwrap();
    let spec = CommitSpec::initial().with_target("test-auth-repo", b"{}".to_vec());
    lib2.commit_pinning(&spec, &pinned2);

    let mut config = update_config(&lib2);
    config.expected_type = ExpectedRepoType::Test;
    UpdateSession::new(config).run(cancel_signal()).await.unwrap();
}

#[tokio::test]
async fn test_cancelled_session_leaves_state_untouched() {
    let lib = setup_library();
    let pinned = lib.target.commit_file("data.txt", "v1").unwrap();
    lib.commit_pinning(&CommitSpec::initial(), &pinned);

    let (tx, rx) = watch::channel(true);
    let err = UpdateSession::new(update_config(&lib))
        .run(rx)
        .await
        .unwrap_err();
    drop(tx);

    assert!(matches!(
        err,
        SessionError::Cancelled | SessionError::Git(::common::git::GitError::Cancelled)
    ));
    assert!(!lib.pointer_path().exists());
}
