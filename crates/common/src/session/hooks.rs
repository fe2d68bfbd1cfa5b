use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Lifecycle hook failures.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("hook {} exited with {code:?}", .script.display())]
    Failed {
        script: PathBuf,
        code: Option<i32>,
    },
}

/// Run post-update lifecycle hooks for a repository.
///
/// Scripts live under `<scripts_root>/<repo_name>/` and run in filename
/// order, each receiving the session summary JSON on stdin. A missing
/// hook directory is not an error; most repositories have no hooks.
///
/// Returns the number of scripts run.
pub fn run_hooks(
    scripts_root: &Path,
    repo_name: &str,
    payload: &serde_json::Value,
) -> Result<usize, HookError> {
    let hook_dir = scripts_root.join(repo_name);
    if !hook_dir.is_dir() {
        tracing::debug!("No hook directory at {}", hook_dir.display());
        return Ok(0);
    }

    let mut scripts: Vec<PathBuf> = std::fs::read_dir(&hook_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    scripts.sort();

    let body = serde_json::to_vec(payload).expect("hook payload serialization is infallible");
    for script in &scripts {
        tracing::info!("Running hook {}", script.display());
        let mut child = Command::new(script)
            .stdin(Stdio::piped())
            .spawn()?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin.write_all(&body)?;
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(HookError::Failed {
                script: script.clone(),
                code: status.code(),
            });
        }
    }
    Ok(scripts.len())
}
