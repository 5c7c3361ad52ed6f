use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::job::{JobRecord, ProviderKind, RequestCounts, UnifiedStatus};
use crate::providers::JobSnapshot;

/// Final or point-in-time outcome of one batch job, written as a JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub provider: ProviderKind,
    pub job_id: String,
    pub status: UnifiedStatus,
    pub raw_status: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds between creation and end, only for succeeded jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_counts: Option<RequestCounts>,
}

impl JobReport {
    /// Build a report for a record that was just updated from `snapshot`.
    pub fn from_observation(record: &JobRecord, snapshot: &JobSnapshot) -> Self {
        let status = record.unified_status();
        let latency_seconds = match (status, snapshot.ended_at) {
            (UnifiedStatus::Succeeded, Some(ended_at)) => {
                Some(latency_seconds(record.created_at(), ended_at))
            }
            _ => None,
        };

        Self {
            provider: record.provider(),
            job_id: record.job_id().to_string(),
            status,
            raw_status: record.raw_status().to_string(),
            created_at: record.created_at(),
            ended_at: snapshot.ended_at,
            latency_seconds,
            model: snapshot.model.clone(),
            request_counts: snapshot.request_counts,
        }
    }
}

/// Elapsed seconds rounded to two decimals.
fn latency_seconds(created_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> f64 {
    let millis = (ended_at - created_at).num_milliseconds() as f64;
    (millis / 10.0).round() / 100.0
}
