use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::http::{build_client, ensure_success, write_body};
use super::{BatchProvider, JobSnapshot, ProviderError};
use crate::models::job::{JobExtra, ProviderKind, RequestCounts};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PAGE_LIMIT: u32 = 100;

/// Client for the Anthropic Message Batches API.
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageBatch {
    id: String,
    processing_status: String,
    request_counts: RequestCounts,
    created_at: DateTime<Utc>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    results_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageBatchList {
    data: Vec<MessageBatch>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

impl MessageBatch {
    fn into_snapshot(self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            raw_status: self.processing_status,
            request_counts: Some(self.request_counts),
            created_at: Some(self.created_at),
            ended_at: self.ended_at,
            model: None,
        }
    }
}

impl AnthropicClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(timeout)?,
            api_key,
            base_url: ANTHROPIC_API_BASE.to_string(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    async fn retrieve(&self, job_id: &str) -> Result<MessageBatch, ProviderError> {
        let url = format!("{}/messages/batches/{}", self.base_url, job_id);
        let response = self.authed(self.http.get(&url)).send().await?;
        Ok(ensure_success(response, job_id).await?.json().await?)
    }
}

impl BatchProvider for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn get_job_status(
        &self,
        job_id: &str,
        _extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError> {
        Ok(self.retrieve(job_id).await?.into_snapshot())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/messages/batches/{}/cancel", self.base_url, job_id);
        let response = self.authed(self.http.post(&url)).send().await?;
        let batch: MessageBatch = ensure_success(response, job_id).await?.json().await?;
        tracing::info!(
            job_id = %batch.id,
            status = %batch.processing_status,
            "Cancel requested"
        );
        Ok(())
    }

    async fn list_jobs(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        let url = format!("{}/messages/batches", self.base_url);
        let mut jobs = Vec::new();
        let mut after_id: Option<String> = None;

        loop {
            let mut request = self
                .authed(self.http.get(&url))
                .query(&[("limit", PAGE_LIMIT.to_string())]);
            if let Some(cursor) = &after_id {
                request = request.query(&[("after_id", cursor)]);
            }
            let page: MessageBatchList = ensure_success(request.send().await?, "batch listing")
                .await?
                .json()
                .await?;

            for batch in page.data {
                if batch.created_at < since {
                    return Ok(jobs);
                }
                jobs.push(batch.into_snapshot());
            }

            match page.last_id {
                Some(last_id) if page.has_more => after_id = Some(last_id),
                _ => return Ok(jobs),
            }
        }
    }

    async fn download_results(&self, job_id: &str, dest: &Path) -> Result<u64, ProviderError> {
        let batch = self.retrieve(job_id).await?;
        if batch.processing_status != "ended" {
            return Err(ProviderError::ResultsUnavailable(format!(
                "job {job_id} is {}",
                batch.processing_status
            )));
        }
        let results_url = batch.results_url.ok_or_else(|| {
            ProviderError::ResultsUnavailable(format!("job {job_id} has no results URL"))
        })?;

        let response = self.authed(self.http.get(&results_url)).send().await?;
        write_body(ensure_success(response, job_id).await?, dest).await
    }
}
