//! Trust chain validator properties
//!
//! These exercise the validator directly over built metadata sets -
//! synthetic commit ids, no git repositories involved.

mod common;

use chrono::{Duration, Utc};

use ::common::chain::{ChainError, TrustChainValidator};
use ::common::metadata::RoleName;
use ::common::testkit::{build_metadata, sign_document, CommitSpec, KeyRing};

use self::common::{commit_id, parse_documents};

#[test]
fn test_valid_chain_reaches_trusted_at_every_commit() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let mut spec = CommitSpec::initial().with_target("file.txt", b"v1".to_vec());
    for n in 1..=3u8 {
        let documents = parse_documents(&build_metadata(&ring, &spec));
        let trusted = validator
            .advance(commit_id(n), documents, Utc::now())
            .unwrap();
        assert_eq!(trusted.commit(), commit_id(n));
        spec = spec.next();
    }
    assert_eq!(validator.trusted_commit(), Some(commit_id(3)));
}

#[test]
fn test_version_reuse_is_rollback() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial().with_target("file.txt", b"v1".to_vec());
    validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap();

    // changed targets content reusing the trusted version number
    let replay = spec
        .next()
        .with_version(RoleName::Targets, 1)
        .with_target("file.txt", b"v2".to_vec());
    let err = validator
        .advance(commit_id(2), parse_documents(&build_metadata(&ring, &replay)), Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::RollbackDetected {
            role: RoleName::Targets,
            trusted: 1,
            version: 1,
        }
    ));
    // the chain stays at the last trusted commit
    assert_eq!(validator.trusted_commit(), Some(commit_id(1)));
}

#[test]
fn test_version_decrease_is_rollback() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial().with_version(RoleName::Snapshot, 5);
    validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap();

    let rollback = spec.next().with_version(RoleName::Snapshot, 3);
    let err = validator
        .advance(commit_id(2), parse_documents(&build_metadata(&ring, &rollback)), Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::RollbackDetected {
            role: RoleName::Snapshot,
            ..
        }
    ));
}

#[test]
fn test_sub_threshold_signatures_are_rejected() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    // root threshold is 2 of 3; sign with only 1
    let spec = CommitSpec::initial().with_signer_count(RoleName::Root, 1);
    let err = validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::InsufficientSignatures {
            role: RoleName::Root,
            valid: 1,
            threshold: 2,
        }
    ));
    assert_eq!(validator.trusted_commit(), None);
}

#[test]
fn test_root_rotation_requires_old_keys() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial();
    validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap();

    let rotated = ring.with_rotated_root(3, 2);

    // signed by the new keys alone: unilateral rotation, rejected
    let mut unilateral = spec.next();
    unilateral.root_content = Some(rotated.root_content());
    let err = validator
        .advance(
            commit_id(2),
            parse_documents(&build_metadata(&rotated, &unilateral)),
            Utc::now(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::InsufficientSignatures {
            role: RoleName::Root,
            ..
        }
    ));

    // signed by a threshold of the old keys as well: legitimate rotation
    let mut legitimate = spec.next();
    legitimate.root_content = Some(rotated.root_content());
    legitimate.root_extra_signers = ring.keys(&RoleName::Root)[..2].to_vec();
    let trusted = validator
        .advance(
            commit_id(2),
            parse_documents(&build_metadata(&rotated, &legitimate)),
            Utc::now(),
        )
        .unwrap();
    assert_eq!(trusted.commit(), commit_id(2));
}

#[test]
fn test_expired_metadata_is_rejected() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial().with_expires(Utc::now() - Duration::days(1));
    let err = validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap_err();
    assert!(matches!(err, ChainError::MetadataExpired { .. }));
}

#[test]
fn test_snapshot_mismatch_on_swapped_document() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    // re-sign the targets document at a different version without
    // updating snapshot: a classic mix-and-match
    let spec = CommitSpec::initial();
    let mut files = build_metadata(&ring, &spec);
    let swapped = build_metadata(&ring, &spec.clone().with_version(RoleName::Targets, 2));
    files.insert(
        "metadata/targets.json".to_string(),
        swapped["metadata/targets.json"].clone(),
    );

    let err = validator
        .advance(commit_id(1), parse_documents(&files), Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::SnapshotMismatch { meta, .. } if meta == "targets.json"
    ));
}

#[test]
fn test_stale_timestamp_is_rejected() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial().with_version(RoleName::Snapshot, 4);
    let mut files = build_metadata(&ring, &spec);

    // forge a timestamp that references an older snapshot version but the
    // correct snapshot hash
    let documents = parse_documents(&files);
    let mut meta = documents[&RoleName::Timestamp]
        .content
        .as_timestamp()
        .unwrap()
        .clone();
    meta.meta.get_mut("snapshot.json").unwrap().version = 3;
    files.insert(
        "metadata/timestamp.json".to_string(),
        sign_document(
            "timestamp",
            1,
            spec.expires,
            &meta,
            ring.keys(&RoleName::Timestamp),
        ),
    );

    let err = validator
        .advance(commit_id(1), parse_documents(&files), Utc::now())
        .unwrap_err();
    assert!(matches!(
        err,
        ChainError::TimestampStale {
            referenced: 3,
            current: 4,
        }
    ));
}

#[test]
fn test_unchanged_documents_carry_forward() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let spec = CommitSpec::initial();
    let files = build_metadata(&ring, &spec);
    validator
        .advance(commit_id(1), parse_documents(&files), Utc::now())
        .unwrap();

    // the exact same files at a later commit: nothing changed, nothing to
    // reject
    let trusted = validator
        .advance(commit_id(2), parse_documents(&files), Utc::now())
        .unwrap();
    assert_eq!(trusted.commit(), commit_id(2));
}

#[test]
fn test_undefined_role_is_not_found() {
    let ring = KeyRing::standard();
    let validator = TrustChainValidator::new();
    assert!(matches!(
        validator.resolve_role(&RoleName::Root),
        Err(ChainError::RoleNotFound(RoleName::Root))
    ));

    let mut validator = TrustChainValidator::new();
    validator
        .advance(
            commit_id(1),
            parse_documents(&build_metadata(&ring, &CommitSpec::initial())),
            Utc::now(),
        )
        .unwrap();
    assert!(validator.resolve_role(&RoleName::Targets).is_ok());
    assert!(matches!(
        validator.resolve_role(&RoleName::Delegated("releases".to_string())),
        Err(ChainError::RoleNotFound(_))
    ));
}

#[test]
fn test_scenario_two_of_three_root_one_of_one_targets() {
    // commit A validly signed by 2 root keys and 1 targets key, commit B
    // reuses the targets version from A
    let ring = KeyRing::generate(&[
        (RoleName::Root, 3, 2),
        (RoleName::Targets, 1, 1),
        (RoleName::Snapshot, 1, 1),
        (RoleName::Timestamp, 1, 1),
    ]);
    let mut validator = TrustChainValidator::new();

    let spec_a = CommitSpec::initial().with_target("pinned", b"a".to_vec());
    validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec_a)), Utc::now())
        .unwrap();

    let spec_b = spec_a
        .next()
        .with_version(RoleName::Targets, 1)
        .with_target("pinned", b"b".to_vec());
    let err = validator
        .advance(commit_id(2), parse_documents(&build_metadata(&ring, &spec_b)), Utc::now())
        .unwrap_err();
    assert!(matches!(err, ChainError::RollbackDetected { .. }));
    assert_eq!(validator.trusted_commit(), Some(commit_id(1)));
}

#[test]
fn test_delegated_role_validates_alongside_top_level() {
    let releases = RoleName::Delegated("releases".to_string());
    let ring = KeyRing::generate(&[
        (RoleName::Root, 3, 2),
        (RoleName::Targets, 1, 1),
        (RoleName::Snapshot, 1, 1),
        (RoleName::Timestamp, 1, 1),
        (releases.clone(), 2, 2),
    ]);
    let mut validator = TrustChainValidator::new();

    let trusted = validator
        .advance(
            commit_id(1),
            parse_documents(&build_metadata(&ring, &CommitSpec::initial())),
            Utc::now(),
        )
        .unwrap();
    assert!(trusted.document(&releases).is_some());
    assert_eq!(validator.resolve_role(&releases).unwrap().threshold, 2);
}

#[test]
fn test_document_for_undefined_role_is_rejected() {
    let ring = KeyRing::standard();
    let rogue = KeyRing::generate(&[(RoleName::Delegated("rogue".to_string()), 1, 1)]);
    let mut validator = TrustChainValidator::new();

    // a metadata file for a role the root never defined
    let mut files = build_metadata(&ring, &CommitSpec::initial());
    let rogue_files = build_metadata(&rogue, &CommitSpec::initial());
    files.insert(
        "metadata/rogue.json".to_string(),
        rogue_files["metadata/rogue.json"].clone(),
    );

    let err = validator
        .advance(commit_id(1), parse_documents(&files), Utc::now())
        .unwrap_err();
    assert!(matches!(err, ChainError::RoleNotFound(RoleName::Delegated(name)) if name == "rogue"));
}

#[test]
fn test_generation_authenticates_target_files() {
    let ring = KeyRing::standard();
    let mut validator = TrustChainValidator::new();

    let body = b"{\"repositories\": {}}".to_vec();
    let spec = CommitSpec::initial().with_target("repositories.json", body.clone());
    let trusted = validator
        .advance(commit_id(1), parse_documents(&build_metadata(&ring, &spec)), Utc::now())
        .unwrap();

    assert!(trusted.verify_target_file("repositories.json", &body).is_ok());
    assert!(matches!(
        trusted.verify_target_file("repositories.json", b"tampered"),
        Err(ChainError::TargetFileMismatch { .. })
    ));
    assert!(matches!(
        trusted.verify_target_file("unlisted.json", &body),
        Err(ChainError::TargetFileMismatch { .. })
    ));
}
