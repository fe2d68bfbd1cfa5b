use std::fmt;
use std::path::PathBuf;

use clap::Args;

use common::session::{ExpectedRepoType, Outcome, SessionConfig, SessionError, UpdateSession};

use crate::op::{Op, OpContext};

/// Update and validate the local authentication repository and its target
/// repositories from a remote url.
#[derive(Args, Debug, Clone)]
pub struct Update {
    /// Url of the remote authentication repository
    pub url: String,

    /// Directory where the authentication repository is located
    #[arg(long)]
    pub clients_auth_path: Option<PathBuf>,

    /// Directory where target repositories and, optionally, the
    /// authentication repository are located. If omitted it is calculated
    /// based on the authentication repository's path
    #[arg(long)]
    pub clients_library_dir: Option<PathBuf>,

    /// Name of the default branch, like main or master
    #[arg(long, default_value = "main")]
    pub default_branch: String,

    /// Clone the repository from the filesystem (skips url validation)
    #[arg(long)]
    pub from_fs: bool,

    /// Expected authentication repository type
    #[arg(long, value_enum, default_value = "either")]
    pub expected_repo_type: RepoTypeArg,

    /// Scripts root directory, used to keep lifecycle scripts outside the
    /// authentication repository. Scripts are expected under
    /// scripts-root-dir/repo-name
    #[arg(long)]
    pub scripts_root_dir: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
pub enum RepoTypeArg {
    Test,
    Official,
    Either,
}

impl From<RepoTypeArg> for ExpectedRepoType {
    fn from(arg: RepoTypeArg) -> Self {
        match arg {
            RepoTypeArg::Test => ExpectedRepoType::Test,
            RepoTypeArg::Official => ExpectedRepoType::Official,
            RepoTypeArg::Either => ExpectedRepoType::Either,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("must specify either an authentication repository path or a library directory")]
    MissingPaths,
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug)]
pub struct UpdateOutput(pub Outcome);

impl fmt::Display for UpdateOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Update successful: accepted commit {} ({} newly validated, {} target repositories)",
            self.0.accepted_commit,
            self.0.newly_validated,
            self.0.per_repo.len()
        )
    }
}

#[async_trait::async_trait]
impl Op for Update {
    type Error = UpdateError;
    type Output = UpdateOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        if self.clients_auth_path.is_none() && self.clients_library_dir.is_none() {
            return Err(UpdateError::MissingPaths);
        }

        let mut config = SessionConfig::update(self.url.clone());
        config.auth_path = self.clients_auth_path.clone();
        config.library_dir = self.clients_library_dir.clone();
        config.default_branch = self.default_branch.clone();
        config.from_fs = self.from_fs;
        config.expected_type = self.expected_repo_type.into();
        config.scripts_root_dir = self.scripts_root_dir.clone();

        let outcome = UpdateSession::new(config).run(ctx.cancel.clone()).await?;
        Ok(UpdateOutput(outcome))
    }
}
