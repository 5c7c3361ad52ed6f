//! Driver loop: reconcile a provider's newest state file until it is empty.
//!
//! Stops with success only on a zero-byte state file. A missing file means no
//! jobs have been tracked yet and is retried, like any transient failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::models::job::ProviderKind;
use crate::providers::BatchProvider;
use crate::services::reconciler::{ReconcileError, ReconcileOptions, ReconcileOutcome, Reconciler};
use crate::services::state_file;

/// What one poll found and did.
#[derive(Debug)]
pub enum PollState {
    /// No state file written yet.
    Waiting,
    Reconciled(ReconcileOutcome),
    /// The newest state file is empty.
    Finished(PathBuf),
}

pub struct Poller<'a, P> {
    kind: ProviderKind,
    dir: PathBuf,
    reconciler: Reconciler<'a, P>,
}

impl<'a, P: BatchProvider> Poller<'a, P> {
    pub fn new(provider: &'a P, dir: impl Into<PathBuf>, options: ReconcileOptions) -> Self {
        Self {
            kind: provider.kind(),
            dir: dir.into(),
            reconciler: Reconciler::new(provider, options),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn poll_once(&self) -> Result<PollState, ReconcileError> {
        self.poll_once_at(Utc::now()).await
    }

    /// Locate the newest state file and act on it once.
    pub async fn poll_once_at(&self, now: DateTime<Utc>) -> Result<PollState, ReconcileError> {
        let Some(path) = state_file::locate_latest(&self.dir, self.kind)? else {
            return Ok(PollState::Waiting);
        };
        if state_file::is_empty(&path)? {
            return Ok(PollState::Finished(path));
        }

        let outcome = self.reconciler.reconcile_at(&path, now).await?;
        Ok(PollState::Reconciled(outcome))
    }

    /// Poll every `interval` until the newest state file is empty.
    ///
    /// Returns the empty file's path, or the first fatal error. A pass that
    /// leaves no job in flight is followed immediately by the next poll.
    pub async fn run(&self, interval: Duration) -> Result<PathBuf, ReconcileError> {
        loop {
            match self.poll_once().await {
                Ok(PollState::Finished(path)) => {
                    tracing::info!(state_file = %path.display(), "All jobs terminal");
                    return Ok(path);
                }
                Ok(PollState::Reconciled(outcome)) if outcome.all_terminal() => continue,
                Ok(PollState::Reconciled(outcome)) => {
                    tracing::info!(
                        remaining = outcome.remaining,
                        query_failures = outcome.query_failures,
                        "Jobs still in flight, sleeping"
                    );
                }
                Ok(PollState::Waiting) => {
                    tracing::warn!(dir = %self.dir.display(), "No state file found yet, will retry");
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Reconciliation pass failed, will retry");
                }
            }
            sleep(interval).await;
        }
    }
}
