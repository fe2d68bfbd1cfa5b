//! Signed metadata model
//!
//! Every commit of an authentication repository carries one signed metadata
//! document per role under `metadata/`, plus arbitrary target files under
//! `targets/`. This module models both without judging them:
//!
//! - **Roles**: named authorities (root, targets, snapshot, timestamp, or
//!   delegated custom roles) with key sets and signature thresholds
//! - **Documents**: the signed envelope format, its canonical byte form,
//!   and the role-specific content bodies
//! - **Store**: materializing the documents present at a given commit
//!
//! Verification is deliberately not here; that is the trust chain
//! validator's job. The store only parses, and parsing failures surface as
//! [`MetadataError::Malformed`] so the orchestrator can reject the commit.

mod document;
mod role;
mod store;

pub use document::{
    canonical_bytes, MetadataDocument, MetaEntry, RawSignature, RoleContent, RootContent,
    SnapshotContent, TargetFileSpec, TargetsContent, TimestampContent,
};
pub use role::{Role, RoleName};
pub use store::{MetadataError, MetadataStore, TargetFile};

/// Directory inside the authentication repository holding role documents.
pub const METADATA_DIR: &str = "metadata";
/// Directory inside the authentication repository holding target files.
pub const TARGETS_DIR: &str = "targets";
