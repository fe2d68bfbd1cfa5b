use std::fmt;
use std::path::PathBuf;

use clap::Args;

use common::git::CommitId;
use common::session::{Outcome, SessionConfig, SessionError, UpdateSession};

use crate::op::{Op, OpContext};

/// Validate an authentication repository and its target repositories
/// already on the filesystem. Does not clone, fetch, or merge anything.
#[derive(Args, Debug, Clone)]
pub struct Validate {
    /// Directory where the authentication repository is located
    pub clients_auth_path: PathBuf,

    /// Directory where target repositories and, optionally, the
    /// authentication repository are located. If omitted it is calculated
    /// based on the authentication repository's path
    #[arg(long)]
    pub clients_library_dir: Option<PathBuf>,

    /// Name of the default branch, like main or master
    #[arg(long, default_value = "main")]
    pub default_branch: String,

    /// First commit which should be validated
    #[arg(long)]
    pub from_commit: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("invalid --from-commit value: {0}")]
    InvalidFromCommit(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug)]
pub struct ValidateOutput(pub Outcome);

impl fmt::Display for ValidateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validation successful: accepted commit {} ({} target repositories)",
            self.0.accepted_commit,
            self.0.per_repo.len()
        )
    }
}

#[async_trait::async_trait]
impl Op for Validate {
    type Error = ValidateError;
    type Output = ValidateOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let from_commit = self
            .from_commit
            .as_deref()
            .map(CommitId::from_hex)
            .transpose()
            .map_err(|_| {
                ValidateError::InvalidFromCommit(
                    self.from_commit.clone().unwrap_or_default(),
                )
            })?;

        let mut config = SessionConfig::validate(self.clients_auth_path.clone());
        config.library_dir = self.clients_library_dir.clone();
        config.default_branch = self.default_branch.clone();
        config.from_commit = from_commit;

        let outcome = UpdateSession::new(config).run(ctx.cancel.clone()).await?;
        Ok(ValidateOutput(outcome))
    }
}
