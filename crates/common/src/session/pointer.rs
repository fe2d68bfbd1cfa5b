use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::Mutex;

use crate::git::CommitId;

/// Filename of the durable trusted pointer inside the conf directory.
pub const POINTER_FILE: &str = "last_validated_commit";

const LOCK_FILE: &str = ".ratchet-lock";
const LOCK_ATTEMPTS: u32 = 10;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Pointer store failures.
#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("another session holds the lock for {}", .0.display())]
    Locked(PathBuf),
    #[error("corrupt trusted pointer: {0}")]
    Corrupt(String),
}

/// The durable record of the last fully validated commit of one
/// authentication repository.
///
/// Stored as a single file in the repository's conf directory and only
/// ever replaced atomically (write to a temp file, then rename), so a
/// crashed session can never leave a torn pointer behind.
#[derive(Debug, Clone)]
pub struct TrustedPointer {
    conf_dir: PathBuf,
}

impl TrustedPointer {
    pub fn new(conf_dir: PathBuf) -> Self {
        Self { conf_dir }
    }

    fn path(&self) -> PathBuf {
        self.conf_dir.join(POINTER_FILE)
    }

    /// Read the pointer. `Ok(None)` when no session has succeeded yet.
    pub fn load(&self) -> Result<Option<CommitId>, PointerError> {
        let path = self.path();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        CommitId::from_hex(trimmed)
            .map(Some)
            .map_err(|_| PointerError::Corrupt(trimmed.to_string()))
    }

    /// Atomically advance the pointer. Callers hold the repository's
    /// [`RepoLock`] for the duration of the final commit step.
    pub fn advance(&self, commit: &CommitId) -> Result<(), PointerError> {
        std::fs::create_dir_all(&self.conf_dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.conf_dir)?;
        writeln!(tmp, "{}", commit)?;
        tmp.persist(self.path()).map_err(|e| e.error)?;
        tracing::info!("Advanced trusted pointer to {}", commit);
        Ok(())
    }
}

fn held_locks() -> &'static Mutex<HashSet<PathBuf>> {
    static LOCKS: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive lock scoped to one authentication repository.
///
/// Combines an in-process registry (concurrent sessions in one process)
/// with an on-disk lockfile (concurrent processes). Acquisition waits a
/// bounded number of attempts before failing with
/// [`PointerError::Locked`]; dropping the guard releases both.
#[derive(Debug)]
pub struct RepoLock {
    conf_dir: PathBuf,
}

impl RepoLock {
    pub fn acquire(conf_dir: &Path) -> Result<Self, PointerError> {
        std::fs::create_dir_all(conf_dir)?;
        let lock_path = conf_dir.join(LOCK_FILE);

        for attempt in 0..LOCK_ATTEMPTS {
            let registered = held_locks().lock().insert(conf_dir.to_path_buf());
            if registered {
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&lock_path)
                {
                    Ok(mut file) => {
                        let _ = writeln!(file, "{}", std::process::id());
                        return Ok(Self {
                            conf_dir: conf_dir.to_path_buf(),
                        });
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        held_locks().lock().remove(conf_dir);
                    }
                    Err(e) => {
                        held_locks().lock().remove(conf_dir);
                        return Err(e.into());
                    }
                }
            }
            tracing::debug!(
                "Lock for {} is held, waiting (attempt {}/{})",
                conf_dir.display(),
                attempt + 1,
                LOCK_ATTEMPTS
            );
            std::thread::sleep(LOCK_RETRY_DELAY);
        }
        Err(PointerError::Locked(conf_dir.to_path_buf()))
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(self.conf_dir.join(LOCK_FILE));
        held_locks().lock().remove(&self.conf_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pointer = TrustedPointer::new(dir.path().join("_auth"));

        assert!(pointer.load().unwrap().is_none());

        let commit =
            CommitId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        pointer.advance(&commit).unwrap();
        assert_eq!(pointer.load().unwrap(), Some(commit));
    }

    #[test]
    fn test_corrupt_pointer_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("_auth");
        std::fs::create_dir_all(&conf_dir).unwrap();
        std::fs::write(conf_dir.join(POINTER_FILE), "not a commit id").unwrap();

        let pointer = TrustedPointer::new(conf_dir);
        assert!(matches!(pointer.load(), Err(PointerError::Corrupt(_))));
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("_auth");

        let lock = RepoLock::acquire(&conf_dir).unwrap();
        // a second acquisition must time out while the first is held
        assert!(matches!(
            RepoLock::acquire(&conf_dir),
            Err(PointerError::Locked(_))
        ));
        drop(lock);
        // and succeed after release
        let _relock = RepoLock::acquire(&conf_dir).unwrap();
    }
}
