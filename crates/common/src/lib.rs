/**
 * Trust-chain validation.
 *  Verifies role-based, threshold-signed metadata
 *  commit by commit and promotes trusted generations.
 */
pub mod chain;
/**
 * Cryptographic types and operations.
 *  - Scheme-tagged public and secret key implementations
 *  - Key-id derivation from public key material
 */
pub mod crypto;
/**
 * Typed descriptors consumed from the authentication
 *  repository's signed target files: repositories.json
 *  and mirrors.json.
 */
pub mod descriptor;
/**
 * Light wrapper around libgit2, scoped to what the
 *  update protocol needs: clone/fetch, commit walks,
 *  and reading files at a commit.
 */
pub mod git;
/**
 * Filesystem layout resolution: where the authentication
 *  repository and its target repositories live relative
 *  to the library directory and namespace.
 */
pub mod layout;
/**
 * Signed metadata model: roles, document envelopes,
 *  and the per-commit metadata store.
 */
pub mod metadata;
/**
 * One update/validate invocation end to end: the session
 *  orchestrator, the durable trusted pointer, and
 *  post-update lifecycle hooks.
 */
pub mod session;
/**
 * Validation of target repositories against the
 *  authenticated descriptor and per-commit pins.
 */
pub mod target;
/**
 * Fixture builders for tests: keyrings, signed metadata
 *  chains, and scripted git repositories.
 */
pub mod testkit;

pub mod prelude {
    pub use crate::chain::{ChainError, TrustChainValidator};
    pub use crate::crypto::{KeyId, PublicKey, SecretKey, SignatureScheme};
    pub use crate::git::{CommitId, GitRepository};
    pub use crate::layout::RepoLayout;
    pub use crate::metadata::{MetadataStore, Role, RoleName};
    pub use crate::session::{Outcome, SessionConfig, SessionError, UpdateSession};
}
