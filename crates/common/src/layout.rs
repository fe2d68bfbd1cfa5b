//! Repository layout resolution
//!
//! Derives where everything lives on the local filesystem:
//!
//! - the **library directory** under which target repositories are kept,
//!   by default two levels up from the authentication repository
//! - the **namespace**, by default the name of the directory immediately
//!   containing the authentication repository
//!
//! Explicit overrides strictly dominate the derived defaults. An
//! authentication repository at `/library/ns/auth-repo` therefore resolves
//! to library dir `/library` and namespace `ns`, and a target named
//! `ns/repo1` lives at `/library/ns/repo1`.

use std::path::{Path, PathBuf};

/// Layout resolution failures. Only raised when a location genuinely
/// cannot be computed; a missing-but-explicit library dir is a warning,
/// fatal only once a referenced target repository cannot be located.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("cannot resolve layout: {0}")]
    Unresolvable(String),
}

/// Resolved filesystem layout for one authentication repository and its
/// target repositories.
#[derive(Debug, Clone)]
pub struct RepoLayout {
    library_dir: PathBuf,
    namespace: String,
    auth_path: PathBuf,
    auth_name: String,
}

impl RepoLayout {
    /// Resolve the layout from the authentication repository's local path
    /// and optional overrides. Overrides take precedence; defaults are
    /// derived from the path only when absent.
    pub fn resolve(
        auth_path: &Path,
        library_dir: Option<&Path>,
        namespace: Option<&str>,
    ) -> Result<Self, LayoutError> {
        let auth_name = dir_name(auth_path)?;

        let derived_namespace = auth_path
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
            .map(String::from);
        let namespace = match namespace {
            Some(explicit) => explicit.to_string(),
            None => derived_namespace.ok_or_else(|| {
                LayoutError::Unresolvable(format!(
                    "no namespace directory above {}",
                    auth_path.display()
                ))
            })?,
        };

        let library_dir = match library_dir {
            Some(explicit) => {
                if !explicit.exists() {
                    tracing::warn!(
                        "Explicit library directory {} does not exist",
                        explicit.display()
                    );
                }
                explicit.to_path_buf()
            }
            None => auth_path
                .parent()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    LayoutError::Unresolvable(format!(
                        "no library directory two levels above {}",
                        auth_path.display()
                    ))
                })?,
        };

        Ok(Self {
            library_dir,
            namespace,
            auth_path: auth_path.to_path_buf(),
            auth_name,
        })
    }

    /// The directory under which target repositories live.
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// The namespace prefix for target repository names.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The authentication repository's local path.
    pub fn auth_path(&self) -> &Path {
        &self.auth_path
    }

    /// The authentication repository's directory name.
    pub fn auth_name(&self) -> &str {
        &self.auth_name
    }

    /// Expected local path of a target repository, from its namespaced
    /// name (`ns/name`). Each name component becomes a path component
    /// under the library directory.
    pub fn resolve_target_path(&self, namespaced_name: &str) -> PathBuf {
        let mut path = self.library_dir.clone();
        for component in namespaced_name.split('/') {
            path.push(component);
        }
        path
    }

    /// Sibling configuration directory holding the durable trusted
    /// pointer, named `_<auth-repo-name>`.
    pub fn conf_dir(&self) -> PathBuf {
        let parent = self
            .auth_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.auth_path.clone());
        parent.join(format!("_{}", self.auth_name))
    }
}

fn dir_name(path: &Path) -> Result<String, LayoutError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .ok_or_else(|| {
            LayoutError::Unresolvable(format!("path {} has no directory name", path.display()))
        })
}
