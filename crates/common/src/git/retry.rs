use std::time::Duration;

use tokio::sync::watch;

use super::GitError;

/// Default number of attempts for clone/fetch operations.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Whether a libgit2 error is worth retrying.
pub fn is_transient(err: &git2::Error) -> bool {
    matches!(
        err.class(),
        git2::ErrorClass::Net | git2::ErrorClass::Http | git2::ErrorClass::Ssh | git2::ErrorClass::Os
    )
}

/// Run a blocking git operation with bounded retries and linear backoff.
///
/// Only transient failures (network classes) are retried; anything else
/// returns immediately. A transient failure that survives every attempt is
/// classified as [`GitError::NetworkFailure`]. The cancellation signal is
/// checked before each attempt; callers run inside `spawn_blocking`, so
/// this is the worker's safe checkpoint.
pub fn with_retries<T>(
    what: &str,
    attempts: u32,
    cancel: Option<&watch::Receiver<bool>>,
    mut op: impl FnMut() -> Result<T, git2::Error>,
) -> Result<T, GitError> {
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        if let Some(cancel) = cancel {
            if *cancel.borrow() {
                return Err(GitError::Cancelled);
            }
        }
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < attempts => {
                tracing::warn!(
                    "Transient failure during {} (attempt {}/{}): {}",
                    what,
                    attempt,
                    attempts,
                    e
                );
                std::thread::sleep(BACKOFF_BASE * attempt);
            }
            Err(e) if is_transient(&e) => {
                return Err(GitError::NetworkFailure {
                    attempts,
                    source: e,
                })
            }
            Err(e) => return Err(GitError::Git(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_error() -> git2::Error {
        git2::Error::new(git2::ErrorCode::GenericError, git2::ErrorClass::Net, "down")
    }

    #[test]
    fn test_retries_transient_until_exhausted() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries("fetch", 3, None, || {
            calls += 1;
            Err(net_error())
        });
        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(GitError::NetworkFailure { attempts: 3, .. })
        ));
    }

    #[test]
    fn test_does_not_retry_permanent_errors() {
        let mut calls = 0;
        let result: Result<(), _> = with_retries("fetch", 3, None, || {
            calls += 1;
            Err(git2::Error::new(
                git2::ErrorCode::NotFound,
                git2::ErrorClass::Repository,
                "missing",
            ))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(GitError::Git(_))));
    }

    #[test]
    fn test_succeeds_after_transient_failure() {
        let mut calls = 0;
        let result = with_retries("fetch", 3, None, || {
            calls += 1;
            if calls < 2 {
                Err(net_error())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_cancellation_preempts_attempts() {
        let (tx, rx) = watch::channel(true);
        let result: Result<(), _> = with_retries("fetch", 3, Some(&rx), || Ok(()));
        assert!(matches!(result, Err(GitError::Cancelled)));
        drop(tx);
    }
}
