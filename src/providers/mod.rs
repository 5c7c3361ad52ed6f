//! Vendor batch APIs behind one capability.
//!
//! The reconciler only needs [`BatchProvider`]; the CLI builds a
//! [`ProviderClient`] for the single provider selected on the command line.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::models::job::{JobExtra, ProviderKind, RequestCounts};

pub mod anthropic;
pub mod google;
mod http;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use google::{GoogleBackend, GoogleBatchClient};
pub use openai::OpenAiClient;

/// What a vendor currently reports about one batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub raw_status: String,
    pub request_counts: Option<RequestCounts>,
    pub created_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub model: Option<String>,
}

/// Operations the tracker needs from a vendor batch API.
#[allow(async_fn_in_trait)]
pub trait BatchProvider {
    fn kind(&self) -> ProviderKind;

    /// Fetch the current raw status of a job.
    async fn get_job_status(
        &self,
        job_id: &str,
        extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError>;

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError>;

    /// Jobs created at or after `since`, newest first.
    async fn list_jobs(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError>;

    /// Write the vendor's result file for a finished job to `dest`; returns bytes written.
    async fn download_results(&self, job_id: &str, dest: &Path) -> Result<u64, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Rate limits, timeouts, vendor outages: retry on the next pass.
    #[error("Transient provider error: {0}")]
    Transient(String),

    #[error("Job {0} is not known to the provider")]
    UnknownJob(String),

    /// Credentials rejected or missing; nothing will succeed until fixed.
    #[error("Provider configuration error: {0}")]
    Configuration(String),

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Results unavailable: {0}")]
    ResultsUnavailable(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Failed to write results: {0}")]
    Io(#[from] std::io::Error),
}

/// The configured vendor client, selected once at startup.
pub enum ProviderClient {
    Google(GoogleBatchClient),
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
}

impl BatchProvider for ProviderClient {
    fn kind(&self) -> ProviderKind {
        match self {
            Self::Google(client) => client.kind(),
            Self::OpenAi(client) => client.kind(),
            Self::Anthropic(client) => client.kind(),
        }
    }

    async fn get_job_status(
        &self,
        job_id: &str,
        extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError> {
        match self {
            Self::Google(client) => client.get_job_status(job_id, extra).await,
            Self::OpenAi(client) => client.get_job_status(job_id, extra).await,
            Self::Anthropic(client) => client.get_job_status(job_id, extra).await,
        }
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        match self {
            Self::Google(client) => client.cancel_job(job_id).await,
            Self::OpenAi(client) => client.cancel_job(job_id).await,
            Self::Anthropic(client) => client.cancel_job(job_id).await,
        }
    }

    async fn list_jobs(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        match self {
            Self::Google(client) => client.list_jobs(since).await,
            Self::OpenAi(client) => client.list_jobs(since).await,
            Self::Anthropic(client) => client.list_jobs(since).await,
        }
    }

    async fn download_results(&self, job_id: &str, dest: &Path) -> Result<u64, ProviderError> {
        match self {
            Self::Google(client) => client.download_results(job_id, dest).await,
            Self::OpenAi(client) => client.download_results(job_id, dest).await,
            Self::Anthropic(client) => client.download_results(job_id, dest).await,
        }
    }
}
