use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::http::{build_client, ensure_success, write_body};
use super::{BatchProvider, JobSnapshot, ProviderError};
use crate::models::job::{JobExtra, ProviderKind, RequestCounts};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const PAGE_LIMIT: u32 = 100;

/// Client for the OpenAI Batch API.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct Batch {
    id: String,
    status: String,
    created_at: i64,
    #[serde(default)]
    completed_at: Option<i64>,
    #[serde(default)]
    failed_at: Option<i64>,
    #[serde(default)]
    expired_at: Option<i64>,
    #[serde(default)]
    cancelled_at: Option<i64>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    request_counts: Option<BatchRequestCounts>,
    #[serde(default)]
    output_file_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchRequestCounts {
    total: u64,
    completed: u64,
    failed: u64,
}

#[derive(Debug, Deserialize)]
struct BatchList {
    data: Vec<Batch>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

impl Batch {
    fn into_snapshot(self) -> JobSnapshot {
        let ended_at = self
            .completed_at
            .or(self.failed_at)
            .or(self.expired_at)
            .or(self.cancelled_at)
            .and_then(from_unix);
        let request_counts = self.request_counts.map(|c| RequestCounts {
            processing: c.total.saturating_sub(c.completed + c.failed),
            succeeded: c.completed,
            errored: c.failed,
            ..RequestCounts::default()
        });

        JobSnapshot {
            job_id: self.id,
            raw_status: self.status,
            request_counts,
            created_at: from_unix(self.created_at),
            ended_at,
            model: self.model,
        }
    }
}

impl OpenAiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(timeout)?,
            api_key,
            base_url: OPENAI_API_BASE.to_string(),
        })
    }

    async fn retrieve(&self, job_id: &str) -> Result<Batch, ProviderError> {
        let url = format!("{}/batches/{}", self.base_url, job_id);
        let response = self.http.get(&url).bearer_auth(&self.api_key).send().await?;
        let response = ensure_success(response, job_id).await?;
        Ok(response.json().await?)
    }
}

impl BatchProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn get_job_status(
        &self,
        job_id: &str,
        _extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError> {
        Ok(self.retrieve(job_id).await?.into_snapshot())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/batches/{}/cancel", self.base_url, job_id);
        let response = self.http.post(&url).bearer_auth(&self.api_key).send().await?;
        let batch: Batch = ensure_success(response, job_id).await?.json().await?;
        tracing::info!(job_id = %batch.id, status = %batch.status, "Cancel requested");
        Ok(())
    }

    async fn list_jobs(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        let url = format!("{}/batches", self.base_url);
        let mut jobs = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor)]);
            }
            let page: BatchList = ensure_success(request.send().await?, "batch listing")
                .await?
                .json()
                .await?;

            for batch in page.data {
                if from_unix(batch.created_at).map_or(true, |created| created < since) {
                    return Ok(jobs);
                }
                jobs.push(batch.into_snapshot());
            }

            match page.last_id {
                Some(last_id) if page.has_more => after = Some(last_id),
                _ => return Ok(jobs),
            }
        }
    }

    async fn download_results(&self, job_id: &str, dest: &Path) -> Result<u64, ProviderError> {
        let batch = self.retrieve(job_id).await?;
        if batch.status != "completed" {
            return Err(ProviderError::ResultsUnavailable(format!(
                "job {job_id} is {}",
                batch.status
            )));
        }
        let file_id = batch.output_file_id.ok_or_else(|| {
            ProviderError::ResultsUnavailable(format!("job {job_id} has no output file"))
        })?;

        let url = format!("{}/files/{}/content", self.base_url, file_id);
        let response = self.http.get(&url).bearer_auth(&self.api_key).send().await?;
        write_body(ensure_success(response, &file_id).await?, dest).await
    }
}
