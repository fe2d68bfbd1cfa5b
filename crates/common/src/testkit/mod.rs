/// Fixture builders for integration and unit tests
///
/// This module provides the pieces tests assemble into full scenarios
/// without requiring any external infrastructure:
///
/// - [`KeyRing`]: per-role signing keys with thresholds
/// - [`CommitSpec`] + [`build_metadata`]: a complete, correctly
///   cross-referenced signed metadata set for one commit
/// - [`AuthRepoFixture`] / [`TargetRepoFixture`]: scripted git
///   repositories on disk
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::{build_metadata, AuthRepoFixture, CommitSpec, KeyRing};
///
/// let ring = KeyRing::standard();
/// let auth = AuthRepoFixture::init(&path, "main")?;
/// let spec = CommitSpec::initial().with_target("repositories.json", descriptor);
/// auth.commit(&build_metadata(&ring, &spec), "genesis")?;
/// ```
mod scenario;
mod signer;

pub use scenario::{pin_file, repositories_json, AuthRepoFixture, TargetRepoFixture};
pub use signer::{build_metadata, sign_document, CommitSpec, KeyRing};
