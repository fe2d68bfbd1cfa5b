//! Update session orchestration
//!
//! Drives one end-to-end run: resolve layout, locate/clone the
//! authentication repository, feed its new commits through the trust
//! chain validator, validate every target repository through a bounded
//! worker pool, and, only when everything passed, fast-forward local
//! branches and advance the durable trusted pointer.

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tokio::sync::watch;

use crate::chain::{ChainError, MetadataGeneration, TrustChainValidator};
use crate::descriptor::{
    MirrorsDescriptor, RepositoriesDescriptor, MIRRORS_JSON, REPOSITORIES_JSON,
};
use crate::git::{CommitId, GitError, GitRepository};
use crate::layout::RepoLayout;
use crate::metadata::{MetadataError, MetadataStore};
use crate::target::{resolved_urls, validate_target, TargetClaims, TargetError, TargetPin};

use super::pointer::{RepoLock, TrustedPointer};
use super::{
    run_hooks, ExpectedRepoType, Outcome, RepoReport, SessionConfig, SessionError,
    TEST_REPO_MARKER,
};

/// One update or validate invocation.
///
/// Transient: created at the start of an invocation and discarded at the
/// end. Its only durable effect is advancing the trusted pointer (and
/// fast-forwarding local branches) when the whole session succeeds.
#[derive(Debug)]
pub struct UpdateSession {
    config: SessionConfig,
}

/// Everything the chain phase hands to the target phase.
struct ChainPhase {
    accepted: CommitId,
    newly_validated: usize,
    /// The commit the chain halted at and why, when it did not reach head.
    rejection: Option<(CommitId, ChainError)>,
    mirrors: Option<MirrorsDescriptor>,
    claims: Vec<TargetClaims>,
}

impl UpdateSession {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Run the session to completion.
    ///
    /// The cancellation signal is checked at every safe checkpoint:
    /// between chain commits, before each fetch attempt, and before the
    /// final commit step. A cancelled session leaves local state
    /// untouched.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Result<Outcome, SessionError> {
        let config = self.config.clone();
        let layout = resolve_layout(&config)?;
        tracing::info!(
            "Session start: auth repo {} (library dir {}, namespace {})",
            layout.auth_path().display(),
            layout.library_dir().display(),
            layout.namespace()
        );

        // updates mutate local state; hold the repository lock for the
        // whole session so concurrent invocations serialize
        let _lock = if config.is_update() {
            Some(RepoLock::acquire(&layout.conf_dir())?)
        } else {
            None
        };

        let chain = {
            let config = config.clone();
            let layout = layout.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || chain_phase(&config, &layout, &cancel))
                .await
                .map_err(|e| SessionError::Worker(e.to_string()))??
        };

        let reports = validate_targets(&config, &layout, &chain, cancel.clone()).await;
        let failures: Vec<RepoReport> = reports
            .iter()
            .filter(|report| report.error.is_some())
            .cloned()
            .collect();
        if !failures.is_empty() {
            for failure in &failures {
                tracing::error!(
                    "Target {} failed: {}",
                    failure.name,
                    failure.error.as_deref().unwrap_or("unknown")
                );
            }
            return Err(SessionError::Targets { failures });
        }

        if *cancel.borrow() {
            return Err(SessionError::Cancelled);
        }

        if config.is_update() {
            let config = config.clone();
            let layout = layout.clone();
            let claims = chain.claims.clone();
            let accepted = chain.accepted;
            tokio::task::spawn_blocking(move || finalize(&config, &layout, &claims, &accepted))
                .await
                .map_err(|e| SessionError::Worker(e.to_string()))??;
        }

        // a mid-chain rejection still surfaces, even though everything up
        // to the last trusted commit was accepted and committed
        if let Some((commit, reason)) = chain.rejection {
            return Err(SessionError::ChainRejected {
                commit,
                reason,
                last_trusted: Some(chain.accepted),
            });
        }

        if config.is_update() {
            if let Some(scripts_root) = &config.scripts_root_dir {
                let payload = serde_json::json!({
                    "update": {
                        "event": "succeeded",
                        "repo_name": layout.auth_name(),
                        "commit": chain.accepted.to_string(),
                        "changed": chain.newly_validated > 0,
                    }
                });
                // the pointer has already advanced; hook failures are
                // reported but cannot un-accept the update
                match run_hooks(scripts_root, layout.auth_name(), &payload) {
                    Ok(0) => {}
                    Ok(count) => tracing::info!("Ran {} lifecycle hook(s)", count),
                    Err(e) => tracing::error!("Lifecycle hook failed: {}", e),
                }
            }
        }

        tracing::info!(
            "Session accepted commit {} ({} newly validated)",
            chain.accepted,
            chain.newly_validated
        );
        Ok(Outcome {
            accepted_commit: chain.accepted,
            newly_validated: chain.newly_validated,
            per_repo: reports,
        })
    }
}

fn resolve_layout(config: &SessionConfig) -> Result<RepoLayout, SessionError> {
    let auth_path = match &config.auth_path {
        Some(path) => path.clone(),
        None => {
            let library_dir = config.library_dir.as_ref().ok_or(SessionError::MissingPaths)?;
            let url = config.remote_url.as_ref().ok_or(SessionError::MissingPaths)?;
            derive_auth_path(library_dir, url)
        }
    };
    Ok(RepoLayout::resolve(
        &auth_path,
        config.library_dir.as_deref(),
        config.namespace.as_deref(),
    )?)
}

/// Derive the authentication repository's local path from its url: the
/// last two url components (namespace and name) under the library dir.
fn derive_auth_path(library_dir: &Path, url: &str) -> PathBuf {
    let trimmed = url.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut tail: Vec<&str> = trimmed.rsplitn(3, ['/', '\\']).take(2).collect();
    tail.reverse();
    let mut path = library_dir.to_path_buf();
    for part in tail {
        if !part.is_empty() && !part.contains(':') {
            path.push(part);
        }
    }
    path
}

/// Locate or clone the authentication repository, then walk its commit
/// chain through the validator and extract the authenticated claims.
fn chain_phase(
    config: &SessionConfig,
    layout: &RepoLayout,
    cancel: &watch::Receiver<bool>,
) -> Result<ChainPhase, SessionError> {
    let repo = match GitRepository::open(layout.auth_path()) {
        Ok(repo) => {
            if config.is_update() {
                repo.fetch(&config.default_branch, config.fetch_attempts, Some(cancel))?;
            }
            repo
        }
        Err(_) if config.is_update() => {
            let url = config
                .remote_url
                .as_deref()
                .ok_or(SessionError::MissingPaths)?;
            GitRepository::clone(
                url,
                layout.auth_path(),
                Some(&config.default_branch),
                config.fetch_attempts,
            )?
        }
        Err(e) => return Err(e.into()),
    };

    let head = if config.is_update() {
        repo.remote_branch_head(&config.default_branch)?
    } else {
        repo.branch_head(&config.default_branch)?
    };

    let pointer = TrustedPointer::new(layout.conf_dir());
    let start = if config.is_update() {
        pointer.load()?
    } else {
        config.from_commit
    };

    // the start commit is re-validated as the trust bootstrap; everything
    // after it is new
    let mut commits: Vec<CommitId> = Vec::new();
    if let Some(start) = start {
        commits.push(start);
    }
    commits.extend(repo.commits_between(start.as_ref(), &head)?);
    if commits.is_empty() {
        return Err(SessionError::EmptyHistory);
    }
    tracing::info!(
        "Validating {} commit(s) up to {} (bootstrap: {})",
        commits.len(),
        head,
        start.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string())
    );

    let store = MetadataStore::new(&repo);
    let mut validator = TrustChainValidator::new();
    let mut generations: Vec<MetadataGeneration> = Vec::new();
    let mut rejection = None;

    for commit in &commits {
        if *cancel.borrow() {
            return Err(SessionError::Cancelled);
        }
        let documents = match store.load_documents(commit) {
            Ok(documents) => documents,
            Err(MetadataError::Git(e)) => return Err(e.into()),
            Err(e) => {
                rejection = Some((*commit, ChainError::Malformed(e.to_string())));
                break;
            }
        };
        let commit_time = repo.commit_time(commit)?;
        match validator.advance(*commit, documents, commit_time) {
            Ok(generation) => generations.push(generation.clone()),
            Err(reason) => {
                tracing::error!("Commit {} rejected: {}", commit, reason);
                rejection = Some((*commit, reason));
                break;
            }
        }
    }

    let Some(last) = generations.last() else {
        let (commit, reason) = rejection.expect("an empty chain implies a rejection");
        return Err(SessionError::ChainRejected {
            commit,
            reason,
            last_trusted: None,
        });
    };
    let newly_validated = generations.len() - usize::from(start.is_some());

    check_repo_type(config.expected_type, last)?;

    let repositories_file = read_required_target(&store, last, REPOSITORIES_JSON)?;
    let repositories = RepositoriesDescriptor::parse(&repositories_file)?;

    let mirrors = match store.read_target_file(&last.commit(), MIRRORS_JSON) {
        Ok(Some(file)) => {
            verify_authenticated(last, MIRRORS_JSON, &file.raw)?;
            Some(MirrorsDescriptor::parse(&file.raw)?)
        }
        Ok(None) => None,
        Err(MetadataError::Git(e)) => return Err(e.into()),
        Err(e) => return Err(SessionError::Worker(e.to_string())),
    };

    let claims = collect_claims(&store, &generations, &repositories)?;

    Ok(ChainPhase {
        accepted: last.commit(),
        newly_validated,
        rejection,
        mirrors,
        claims,
    })
}

fn check_repo_type(
    expected: ExpectedRepoType,
    generation: &MetadataGeneration,
) -> Result<(), SessionError> {
    let found = if generation.target_spec(TEST_REPO_MARKER).is_some() {
        ExpectedRepoType::Test
    } else {
        ExpectedRepoType::Official
    };
    match expected {
        ExpectedRepoType::Either => Ok(()),
        _ if expected == found => Ok(()),
        _ => Err(SessionError::WrongRepoType { expected, found }),
    }
}

fn read_required_target(
    store: &MetadataStore<'_>,
    generation: &MetadataGeneration,
    name: &str,
) -> Result<Vec<u8>, SessionError> {
    let file = match store.read_target_file(&generation.commit(), name) {
        Ok(Some(file)) => file,
        Ok(None) => return Err(SessionError::MissingTargetFile(name.to_string())),
        Err(MetadataError::Git(e)) => return Err(e.into()),
        Err(e) => return Err(SessionError::Worker(e.to_string())),
    };
    verify_authenticated(generation, name, &file.raw)?;
    Ok(file.raw)
}

/// A target file that does not match the signed manifest at its commit is
/// a trust failure, not an I/O problem.
fn verify_authenticated(
    generation: &MetadataGeneration,
    name: &str,
    raw: &[u8],
) -> Result<(), SessionError> {
    generation
        .verify_target_file(name, raw)
        .map_err(|reason| SessionError::ChainRejected {
            commit: generation.commit(),
            reason,
            last_trusted: None,
        })
}

/// Gather each target repository's pinned commits across the validated
/// generations, oldest first, deduplicating consecutive repeats.
fn collect_claims(
    store: &MetadataStore<'_>,
    generations: &[MetadataGeneration],
    repositories: &RepositoriesDescriptor,
) -> Result<Vec<TargetClaims>, SessionError> {
    let mut claims = Vec::new();
    for (name, entry) in &repositories.repositories {
        let mut pins: Vec<CommitId> = Vec::new();
        let mut branch = None;
        for generation in generations {
            let file = match store.read_target_file(&generation.commit(), name) {
                Ok(Some(file)) => file,
                Ok(None) => continue,
                Err(MetadataError::Git(e)) => return Err(e.into()),
                Err(e) => return Err(SessionError::Worker(e.to_string())),
            };
            verify_authenticated(generation, name, &file.raw)?;

            let pin = TargetPin::parse(&file.raw).map_err(|reason| {
                SessionError::ChainRejected {
                    commit: generation.commit(),
                    reason: ChainError::Malformed(reason),
                    last_trusted: None,
                }
            })?;
            let commit = CommitId::from_hex(&pin.commit).map_err(|_| {
                SessionError::ChainRejected {
                    commit: generation.commit(),
                    reason: ChainError::Malformed(format!(
                        "pin for {} is not a commit id: {}",
                        name, pin.commit
                    )),
                    last_trusted: None,
                }
            })?;
            if pins.last() != Some(&commit) {
                pins.push(commit);
            }
            if pin.branch.is_some() {
                branch = pin.branch;
            }
        }
        claims.push(TargetClaims {
            name: name.clone(),
            entry: entry.clone(),
            branch,
            pins,
        });
    }
    Ok(claims)
}

/// Fetch and validate every target repository through a bounded worker
/// pool. Each worker owns its repository's working tree for the session;
/// sibling failures never cancel one another.
async fn validate_targets(
    config: &SessionConfig,
    layout: &RepoLayout,
    chain: &ChainPhase,
    cancel: watch::Receiver<bool>,
) -> Vec<RepoReport> {
    let workers = chain.claims.iter().cloned().map(|claim| {
        let config = config.clone();
        let path = layout.resolve_target_path(&claim.name);
        let mirrors = chain.mirrors.clone();
        let cancel = cancel.clone();
        async move {
            let name = claim.name.clone();
            let outcome =
                tokio::task::spawn_blocking(move || {
                    process_target(&config, &path, claim, mirrors.as_ref(), &cancel)
                })
                .await;
            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("worker task failed: {}", e)),
            };
            RepoReport { name, error }
        }
    });
    stream::iter(workers)
        .buffer_unordered(config.max_concurrent_targets.max(1))
        .collect()
        .await
}

/// One worker: locate (or clone), fetch, and validate a single target
/// repository against its claims.
fn process_target(
    config: &SessionConfig,
    path: &Path,
    claim: TargetClaims,
    mirrors: Option<&MirrorsDescriptor>,
    cancel: &watch::Receiver<bool>,
) -> Result<(), TargetError> {
    if *cancel.borrow() {
        return Err(TargetError::Git(GitError::Cancelled));
    }
    let branch = claim
        .branch
        .clone()
        .unwrap_or_else(|| config.default_branch.clone());

    let repo = match GitRepository::open(path) {
        Ok(repo) => {
            if config.is_update() {
                repo.fetch(&branch, config.fetch_attempts, Some(cancel))?;
            }
            repo
        }
        Err(_) if config.is_update() => {
            let urls = resolved_urls(&claim, mirrors)?;
            let url = urls.first().ok_or_else(|| TargetError::Unlocatable {
                name: claim.name.clone(),
                path: path.display().to_string(),
            })?;
            GitRepository::clone(url, path, Some(&branch), config.fetch_attempts)?
        }
        Err(_) => {
            return Err(TargetError::Unlocatable {
                name: claim.name.clone(),
                path: path.display().to_string(),
            })
        }
    };

    let check_urls = config.is_update() && !config.from_fs;
    validate_target(&repo, &claim, mirrors, &config.default_branch, check_urls)
}

/// Merge into local state: fast-forward every target's branch to its last
/// pinned commit, the authentication branch to the accepted commit, and
/// advance the trusted pointer. Runs only after every validation passed.
fn finalize(
    config: &SessionConfig,
    layout: &RepoLayout,
    claims: &[TargetClaims],
    accepted: &CommitId,
) -> Result<(), SessionError> {
    for claim in claims {
        let Some(last_pin) = claim.pins.last() else {
            continue;
        };
        let path = layout.resolve_target_path(&claim.name);
        let repo = GitRepository::open(&path)?;
        let branch = claim.branch.as_deref().unwrap_or(&config.default_branch);
        repo.fast_forward(branch, last_pin)?;
    }

    let auth = GitRepository::open(layout.auth_path())?;
    auth.fast_forward(&config.default_branch, accepted)?;

    TrustedPointer::new(layout.conf_dir()).advance(accepted)?;
    Ok(())
}
