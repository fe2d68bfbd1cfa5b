use super::validator::ChainError;

/// Progress of one commit through the validation pipeline.
///
/// A commit moves through the checking states in order and ends in either
/// `Trusted` or `Rejected`. Rejection halts the whole chain at that
/// commit; the session reports the last trusted commit reached.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationState {
    Unvalidated,
    CheckingSignatures,
    CheckingVersion,
    CheckingExpiry,
    CheckingCrossref,
    Trusted,
    Rejected(ChainError),
}

impl ValidationState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ValidationState::Trusted | ValidationState::Rejected(_))
    }
}
