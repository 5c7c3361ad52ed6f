//! One reconciliation pass over a state file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};

use crate::models::job::{JobRecord, UnifiedStatus};
use crate::models::report::JobReport;
use crate::providers::{BatchProvider, JobSnapshot, ProviderError};
use crate::services::report_log::{self, ReportLogError};
use crate::services::state_file::{self, StateFileError};
use crate::services::status::PROCESSING_WINDOW_HOURS;

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Where terminal outcomes are appended; `None` disables the report.
    pub report_path: Option<PathBuf>,
    /// Ask the vendor to cancel jobs still running past the processing window.
    pub cancel_overdue: bool,
}

/// Result of one pass.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub state_file: PathBuf,
    /// Jobs carried into `state_file`.
    pub remaining: usize,
    /// Jobs that became terminal during this pass.
    pub finished: Vec<JobReport>,
    /// Jobs carried forward unchanged because their query failed.
    pub query_failures: usize,
}

impl ReconcileOutcome {
    pub fn all_terminal(&self) -> bool {
        self.remaining == 0
    }
}

/// Refreshes every non-terminal job in a state file through one provider.
pub struct Reconciler<'a, P> {
    provider: &'a P,
    options: ReconcileOptions,
}

enum JobUpdate {
    Observed(JobSnapshot),
    NotFound,
    Unreachable,
}

impl<'a, P: BatchProvider> Reconciler<'a, P> {
    pub fn new(provider: &'a P, options: ReconcileOptions) -> Self {
        Self { provider, options }
    }

    pub async fn reconcile(&self, state_path: &Path) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_at(state_path, Utc::now()).await
    }

    /// Run a pass with an explicit clock.
    ///
    /// The input file is only read. On any error nothing is written, so the
    /// previous state file stays the newest one.
    pub async fn reconcile_at(
        &self,
        state_path: &Path,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let kind = self.provider.kind();
        let records = state_file::read(state_path)?;

        tracing::info!(
            provider = %kind,
            state_file = %state_path.display(),
            jobs = records.len(),
            "Starting reconciliation pass"
        );

        let mut carried = Vec::with_capacity(records.len());
        let mut finished = Vec::new();
        let mut query_failures = 0;

        for mut record in records {
            if record.is_settled(now) {
                tracing::debug!(
                    job_id = %record.job_id(),
                    status = %record.unified_status(),
                    "Dropping job already terminal"
                );
                continue;
            }
            if record.is_terminal() {
                tracing::warn!(
                    job_id = %record.job_id(),
                    raw_status = %record.raw_status(),
                    status = %record.unified_status(),
                    "Stored status does not follow from raw status, querying again"
                );
            }

            match self.query(&record).await? {
                JobUpdate::Observed(snapshot) => {
                    let previous = record.observe(
                        &snapshot.raw_status,
                        snapshot.request_counts.as_ref(),
                        now,
                    );
                    if previous != record.unified_status() {
                        tracing::info!(
                            job_id = %record.job_id(),
                            raw_status = %record.raw_status(),
                            from = %previous,
                            to = %record.unified_status(),
                            "Job status changed"
                        );
                    }

                    if record.is_terminal() {
                        finished.push(JobReport::from_observation(&record, &snapshot));
                        continue;
                    }
                    if self.options.cancel_overdue {
                        self.cancel_if_overdue(&record, now).await;
                    }
                }
                JobUpdate::NotFound => {
                    record.mark_not_found(now);
                }
                JobUpdate::Unreachable => query_failures += 1,
            }
            carried.push(record);
        }

        if let Some(report_path) = &self.options.report_path {
            report_log::append(report_path, &finished)?;
        }

        let next_path = state_file::successor_path(kind, state_path, now);
        state_file::write(&next_path, &carried)?;

        tracing::info!(
            provider = %kind,
            state_file = %next_path.display(),
            remaining = carried.len(),
            finished = finished.len(),
            query_failures,
            "Reconciliation pass complete"
        );

        Ok(ReconcileOutcome {
            state_file: next_path,
            remaining: carried.len(),
            finished,
            query_failures,
        })
    }

    async fn query(&self, record: &JobRecord) -> Result<JobUpdate, ReconcileError> {
        if record.provider() != self.provider.kind() {
            tracing::warn!(
                job_id = %record.job_id(),
                provider = %record.provider(),
                configured = %self.provider.kind(),
                "No client for job's provider, carrying forward"
            );
            return Ok(JobUpdate::Unreachable);
        }

        match self
            .provider
            .get_job_status(record.job_id(), record.extra())
            .await
        {
            Ok(snapshot) => Ok(JobUpdate::Observed(snapshot)),
            Err(ProviderError::UnknownJob(_)) => {
                tracing::warn!(
                    job_id = %record.job_id(),
                    "Provider does not recognize job, marking UNKNOWN"
                );
                Ok(JobUpdate::NotFound)
            }
            Err(ProviderError::Configuration(reason)) => {
                Err(ReconcileError::ProviderConfiguration(reason))
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %record.job_id(),
                    error = %e,
                    "Status query failed, carrying job forward unchanged"
                );
                Ok(JobUpdate::Unreachable)
            }
        }
    }

    async fn cancel_if_overdue(&self, record: &JobRecord, now: DateTime<Utc>) {
        let overdue = record.unified_status() == UnifiedStatus::InProgress
            && now - record.created_at() > Duration::hours(PROCESSING_WINDOW_HOURS);
        if !overdue {
            return;
        }

        tracing::warn!(job_id = %record.job_id(), "Job exceeded processing window, cancelling");
        if let Err(e) = self.provider.cancel_job(record.job_id()).await {
            tracing::error!(job_id = %record.job_id(), error = %e, "Cancel request failed");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    StateFile(#[from] StateFileError),

    #[error("Provider configuration error: {0}")]
    ProviderConfiguration(String),

    #[error("Failed to append job reports: {0}")]
    Report(#[from] ReportLogError),
}

impl ReconcileError {
    /// Malformed input or bad credentials will not fix themselves on retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::StateFile(StateFileError::Malformed { .. })
                | ReconcileError::ProviderConfiguration(_)
        )
    }
}
