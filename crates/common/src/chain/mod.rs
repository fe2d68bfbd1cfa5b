//! Trust chain validation
//!
//! The protocol core. Authentication-repository commits are validated
//! strictly in order, oldest to newest, and each commit's metadata is only
//! promoted to the trusted generation after four checks pass for every
//! role:
//!
//! 1. **Signatures**: at least `threshold` distinct keys from the
//!    *previously trusted* root's authorized set (root rotation requires
//!    the old set's threshold AND the new set's threshold)
//! 2. **Version monotonicity**: a changed document must carry a strictly
//!    greater version counter
//! 3. **Expiration**: measured against the commit's timestamp
//! 4. **Cross-references**: snapshot must pin every other document's
//!    version and hash; timestamp must reference the current snapshot
//!
//! The first failing check rejects the commit and halts the chain: later
//! commits are never evaluated, which is what closes the
//! revoked-then-reinstated key window (mix-and-match).

mod generation;
mod state;
mod validator;

pub use generation::MetadataGeneration;
pub use state::ValidationState;
pub use validator::{ChainError, TrustChainValidator};
