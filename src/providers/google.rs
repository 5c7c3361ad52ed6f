//! Gemini batch jobs, through either the developer API or Vertex AI.
//!
//! Both backends report the same `JOB_STATE_*`/`BATCH_STATE_*` vocabulary but
//! differ in endpoints, authentication and response shape.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;

use super::http::{build_client, ensure_success, write_body};
use super::{BatchProvider, JobSnapshot, ProviderError};
use crate::models::job::{JobExtra, ProviderKind, RequestCounts};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";
const PAGE_SIZE: u32 = 100;

pub enum GoogleBackend {
    /// Gemini developer API, authenticated with an API key.
    DeveloperApi { api_key: String },
    /// Vertex AI batch prediction, authenticated with an OAuth access token.
    VertexAi {
        project: String,
        location: String,
        access_token: String,
    },
}

pub struct GoogleBatchClient {
    http: Client,
    backend: GoogleBackend,
}

// ── Developer API shapes ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    metadata: Option<GenerateContentBatch>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBatch {
    #[serde(default)]
    model: Option<String>,
    state: String,
    create_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    batch_stats: Option<BatchStats>,
    #[serde(default)]
    output: Option<BatchOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchStats {
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    successful_request_count: u64,
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    failed_request_count: u64,
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    pending_request_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchOutput {
    #[serde(default)]
    responses_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationList {
    #[serde(default)]
    operations: Vec<Operation>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl Operation {
    fn into_snapshot(self) -> Result<JobSnapshot, ProviderError> {
        let batch = self.metadata.ok_or_else(|| {
            ProviderError::Decode(format!("batch {} has no metadata", self.name))
        })?;
        Ok(JobSnapshot {
            job_id: self.name,
            raw_status: batch.state,
            request_counts: batch.batch_stats.map(|s| RequestCounts {
                processing: s.pending_request_count,
                succeeded: s.successful_request_count,
                errored: s.failed_request_count,
                ..RequestCounts::default()
            }),
            created_at: Some(batch.create_time),
            ended_at: batch.end_time,
            model: batch.model,
        })
    }
}

// ── Vertex AI shapes ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPredictionJob {
    name: String,
    #[serde(default)]
    model: Option<String>,
    state: String,
    create_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    completion_stats: Option<CompletionStats>,
    #[serde(default)]
    output_info: Option<OutputInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionStats {
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    successful_count: u64,
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    failed_count: u64,
    #[serde(default, deserialize_with = "super::http::int64::deserialize")]
    incomplete_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputInfo {
    #[serde(default)]
    gcs_output_directory: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPredictionJobList {
    #[serde(default)]
    batch_prediction_jobs: Vec<BatchPredictionJob>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl BatchPredictionJob {
    fn into_snapshot(self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.name,
            raw_status: self.state,
            request_counts: self.completion_stats.map(|s| RequestCounts {
                processing: s.incomplete_count,
                succeeded: s.successful_count,
                errored: s.failed_count,
                ..RequestCounts::default()
            }),
            created_at: Some(self.create_time),
            ended_at: self.end_time,
            model: self.model,
        }
    }
}

impl GoogleBatchClient {
    pub fn new(backend: GoogleBackend, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(timeout)?,
            backend,
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.backend {
            GoogleBackend::DeveloperApi { api_key } => request.header("x-goog-api-key", api_key),
            GoogleBackend::VertexAi { access_token, .. } => request.bearer_auth(access_token),
        }
    }

    /// Absolute URL of a job resource. Bare ids are qualified with the
    /// configured project/location; Vertex jobs may carry a `location` in
    /// their extra metadata when created outside the default region.
    fn job_url(&self, job_id: &str, extra: Option<&JobExtra>) -> String {
        match &self.backend {
            GoogleBackend::DeveloperApi { .. } => {
                let name = if job_id.starts_with("batches/") {
                    job_id.to_string()
                } else {
                    format!("batches/{job_id}")
                };
                format!("{GEMINI_API_BASE}/v1beta/{name}")
            }
            GoogleBackend::VertexAi {
                project, location, ..
            } => {
                if job_id.starts_with("projects/") {
                    let location = resource_location(job_id).unwrap_or(location);
                    return format!("{}/{job_id}", vertex_base(location));
                }
                let location = extra
                    .and_then(|e| e.get("location"))
                    .and_then(|v| v.as_str())
                    .unwrap_or(location);
                format!(
                    "{}/projects/{project}/locations/{location}/batchPredictionJobs/{job_id}",
                    vertex_base(location)
                )
            }
        }
    }

    async fn fetch(
        &self,
        job_id: &str,
        extra: Option<&JobExtra>,
    ) -> Result<FetchedJob, ProviderError> {
        let url = self.job_url(job_id, extra);
        let response = self.authed(self.http.get(&url)).send().await?;
        let response = ensure_success(response, job_id).await?;
        match self.backend {
            GoogleBackend::DeveloperApi { .. } => Ok(FetchedJob::Gemini(response.json().await?)),
            GoogleBackend::VertexAi { .. } => Ok(FetchedJob::Vertex(response.json().await?)),
        }
    }

    async fn list_gemini(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        let url = format!("{GEMINI_API_BASE}/v1beta/batches");
        let mut jobs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .authed(self.http.get(&url))
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: OperationList = ensure_success(request.send().await?, "batch listing")
                .await?
                .json()
                .await?;

            for operation in page.operations {
                let snapshot = operation.into_snapshot()?;
                if snapshot.created_at.map_or(true, |created| created < since) {
                    return Ok(jobs);
                }
                jobs.push(snapshot);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(jobs),
            }
        }
    }

    async fn list_vertex(
        &self,
        project: &str,
        location: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<JobSnapshot>, ProviderError> {
        let url = format!(
            "{}/projects/{project}/locations/{location}/batchPredictionJobs",
            vertex_base(location)
        );
        let filter = format!("create_time>=\"{}\"", since.to_rfc3339());
        let mut jobs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.authed(self.http.get(&url)).query(&[
                ("pageSize", PAGE_SIZE.to_string()),
                ("filter", filter.clone()),
            ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: BatchPredictionJobList =
                ensure_success(request.send().await?, "batch listing")
                    .await?
                    .json()
                    .await?;

            jobs.extend(
                page.batch_prediction_jobs
                    .into_iter()
                    .map(BatchPredictionJob::into_snapshot),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}

/// Region segment of `projects/{p}/locations/{l}/...`.
fn resource_location(name: &str) -> Option<&str> {
    let mut segments = name.split('/');
    segments.find(|s| *s == "locations")?;
    segments.next().filter(|s| !s.is_empty())
}

fn vertex_base(location: &str) -> String {
    format!("https://{location}-aiplatform.googleapis.com/v1")
}

enum FetchedJob {
    Gemini(Operation),
    Vertex(BatchPredictionJob),
}

impl BatchProvider for GoogleBatchClient {
    fn kind(&self) -> ProviderKind {
        match self.backend {
            GoogleBackend::DeveloperApi { .. } => ProviderKind::Google,
            GoogleBackend::VertexAi { .. } => ProviderKind::GoogleVertexAi,
        }
    }

    async fn get_job_status(
        &self,
        job_id: &str,
        extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError> {
        match self.fetch(job_id, Some(extra)).await? {
            FetchedJob::Gemini(operation) => operation.into_snapshot(),
            FetchedJob::Vertex(job) => Ok(job.into_snapshot()),
        }
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}:cancel", self.job_url(job_id, None));
        let response = self.authed(self.http.post(&url)).send().await?;
        ensure_success(response, job_id).await?;
        tracing::info!(job_id = %job_id, "Cancel requested");
        Ok(())
    }

    async fn list_jobs(&self, since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        match &self.backend {
            GoogleBackend::DeveloperApi { .. } => self.list_gemini(since).await,
            GoogleBackend::VertexAi {
                project, location, ..
            } => self.list_vertex(project, location, since).await,
        }
    }

    async fn download_results(&self, job_id: &str, dest: &Path) -> Result<u64, ProviderError> {
        match self.fetch(job_id, None).await? {
            FetchedJob::Gemini(operation) => {
                let snapshot_state = operation
                    .metadata
                    .as_ref()
                    .map(|m| m.state.clone())
                    .unwrap_or_default();
                let responses_file = operation
                    .metadata
                    .and_then(|m| m.output)
                    .and_then(|o| o.responses_file)
                    .ok_or_else(|| {
                        ProviderError::ResultsUnavailable(format!(
                            "job {job_id} has no responses file (state {snapshot_state})"
                        ))
                    })?;

                let url = format!("{GEMINI_API_BASE}/download/v1beta/{responses_file}:download");
                let response = self
                    .authed(self.http.get(&url))
                    .query(&[("alt", "media")])
                    .send()
                    .await?;
                write_body(ensure_success(response, &responses_file).await?, dest).await
            }
            FetchedJob::Vertex(job) => {
                let location = job
                    .output_info
                    .and_then(|o| o.gcs_output_directory)
                    .unwrap_or_else(|| "an unknown location".to_string());
                Err(ProviderError::Unsupported(format!(
                    "Vertex AI results for {job_id} are stored in {location}; fetch them from GCS"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_client() -> GoogleBatchClient {
        GoogleBatchClient::new(
            GoogleBackend::VertexAi {
                project: "my-project".to_string(),
                location: "us-central1".to_string(),
                access_token: "token".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_gemini_operation_snapshot() {
        let operation: Operation = serde_json::from_value(serde_json::json!({
            "name": "batches/123456",
            "metadata": {
                "@type": "type.googleapis.com/google.ai.generativelanguage.v1main.GenerateContentBatch",
                "model": "models/gemini-2.5-flash-lite",
                "state": "BATCH_STATE_SUCCEEDED",
                "createTime": "2025-10-12T06:00:00.123456Z",
                "endTime": "2025-10-12T06:02:03.573456Z",
                "batchStats": {
                    "requestCount": "10",
                    "successfulRequestCount": "9",
                    "failedRequestCount": 1
                },
                "output": {"responsesFile": "files/batch-123456"}
            },
            "done": true
        }))
        .unwrap();

        let snapshot = operation.into_snapshot().unwrap();
        assert_eq!(snapshot.job_id, "batches/123456");
        assert_eq!(snapshot.raw_status, "BATCH_STATE_SUCCEEDED");
        let counts = snapshot.request_counts.unwrap();
        assert_eq!((counts.succeeded, counts.errored, counts.processing), (9, 1, 0));
        assert!(snapshot.ended_at.is_some());
    }

    #[test]
    fn test_gemini_operation_without_metadata_is_decode_error() {
        let operation: Operation =
            serde_json::from_value(serde_json::json!({"name": "batches/1"})).unwrap();
        assert!(matches!(
            operation.into_snapshot(),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn test_vertex_job_snapshot() {
        let job: BatchPredictionJob = serde_json::from_value(serde_json::json!({
            "name": "projects/42/locations/us-central1/batchPredictionJobs/987",
            "displayName": "vertexai-gemini-batch-job-0",
            "model": "publishers/google/models/gemini-2.5-flash-lite",
            "state": "JOB_STATE_RUNNING",
            "createTime": "2025-10-12T06:00:00Z",
            "completionStats": {"successfulCount": "3", "incompleteCount": "7"}
        }))
        .unwrap();

        let snapshot = job.into_snapshot();
        assert_eq!(snapshot.raw_status, "JOB_STATE_RUNNING");
        assert_eq!(snapshot.ended_at, None);
        let counts = snapshot.request_counts.unwrap();
        assert_eq!((counts.succeeded, counts.processing), (3, 7));
    }

    #[test]
    fn test_job_urls() {
        let gemini = GoogleBatchClient::new(
            GoogleBackend::DeveloperApi {
                api_key: "key".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            gemini.job_url("batches/abc", None),
            "https://generativelanguage.googleapis.com/v1beta/batches/abc"
        );
        assert_eq!(
            gemini.job_url("abc", None),
            "https://generativelanguage.googleapis.com/v1beta/batches/abc"
        );

        let vertex = vertex_client();
        assert_eq!(
            vertex.job_url("projects/42/locations/us-central1/batchPredictionJobs/987", None),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/42/locations/us-central1/batchPredictionJobs/987"
        );

        let mut extra = JobExtra::new();
        extra.insert("location".to_string(), serde_json::json!("europe-west4"));
        assert_eq!(
            vertex.job_url("987", Some(&extra)),
            "https://europe-west4-aiplatform.googleapis.com/v1/projects/my-project/locations/europe-west4/batchPredictionJobs/987"
        );
        assert_eq!(
            vertex.job_url("projects/42/locations/asia-east1/batchPredictionJobs/5", None),
            "https://asia-east1-aiplatform.googleapis.com/v1/projects/42/locations/asia-east1/batchPredictionJobs/5"
        );
        assert_eq!(vertex.kind(), ProviderKind::GoogleVertexAi);
        assert_eq!(gemini.kind(), ProviderKind::Google);
    }
}
