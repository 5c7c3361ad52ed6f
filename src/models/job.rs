use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::providers::JobSnapshot;
use crate::services::status;

/// Provider-specific metadata carried alongside a job so it can be re-queried.
pub type JobExtra = BTreeMap<String, serde_json::Value>;

/// Raw status written when the vendor no longer recognizes a job id.
pub const NOT_FOUND_RAW_STATUS: &str = "not_found";

/// Vendor batch APIs the tracker knows how to query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProviderKind {
    Google,
    GoogleVertexAi,
    #[serde(rename = "openai")]
    #[strum(to_string = "openai")]
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Google,
        ProviderKind::GoogleVertexAi,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
    ];

    /// File name prefix shared by every state file of this provider.
    pub fn state_file_prefix(self) -> String {
        format!("{self}_job_reports")
    }
}

/// Vendor-independent outcome of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum UnifiedStatus {
    Succeeded,
    Failed,
    CancelledTimedOut,
    CancelledOnDemand,
    InProgress,
    Unknown,
}

impl UnifiedStatus {
    /// Terminal jobs need no further reconciliation and leave the state file.
    pub fn is_terminal(self) -> bool {
        !matches!(self, UnifiedStatus::InProgress | UnifiedStatus::Unknown)
    }
}

/// Per-request outcome counts reported by a vendor for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    #[serde(default)]
    pub processing: u64,
    #[serde(default)]
    pub succeeded: u64,
    #[serde(default)]
    pub errored: u64,
    #[serde(default)]
    pub canceled: u64,
    #[serde(default)]
    pub expired: u64,
}

impl RequestCounts {
    pub fn total(&self) -> u64 {
        self.processing + self.succeeded + self.errored + self.canceled + self.expired
    }
}

/// One tracked batch job, as stored in a state file line.
///
/// `unified_status` is private: it only ever changes through [`JobRecord::observe`]
/// or [`JobRecord::mark_not_found`], both of which recompute it with
/// [`status::map_status`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    provider: ProviderKind,
    job_id: String,
    raw_status: String,
    unified_status: UnifiedStatus,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    extra: JobExtra,
}

impl JobRecord {
    /// Start tracking a job whose current raw status is already known.
    pub fn new(
        provider: ProviderKind,
        job_id: impl Into<String>,
        raw_status: impl Into<String>,
        created_at: DateTime<Utc>,
        extra: JobExtra,
        breakdown: Option<&RequestCounts>,
        now: DateTime<Utc>,
    ) -> Self {
        let raw_status = raw_status.into();
        let unified_status = status::map_status(provider, &raw_status, created_at, now, breakdown);
        Self {
            provider,
            job_id: job_id.into(),
            raw_status,
            unified_status,
            created_at,
            extra,
        }
    }

    /// Start tracking a job from what its vendor currently reports.
    ///
    /// Falls back to `now` when the vendor did not report a creation time.
    pub fn from_snapshot(provider: ProviderKind, snapshot: &JobSnapshot, now: DateTime<Utc>) -> Self {
        let mut extra = JobExtra::new();
        if let Some(model) = &snapshot.model {
            extra.insert("model".to_string(), serde_json::Value::from(model.as_str()));
        }
        Self::new(
            provider,
            snapshot.job_id.as_str(),
            snapshot.raw_status.as_str(),
            snapshot.created_at.unwrap_or(now),
            extra,
            snapshot.request_counts.as_ref(),
            now,
        )
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn raw_status(&self) -> &str {
        &self.raw_status
    }

    pub fn unified_status(&self) -> UnifiedStatus {
        self.unified_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn extra(&self) -> &JobExtra {
        &self.extra
    }

    pub fn is_terminal(&self) -> bool {
        self.unified_status.is_terminal()
    }

    /// Terminal as stored and as derived again from `raw_status`.
    ///
    /// A record read from disk whose two statuses disagree is not settled and
    /// must be queried again. Without a request breakdown an Anthropic
    /// `ended` job derives to UNKNOWN, so it is re-queried too.
    pub fn is_settled(&self, now: DateTime<Utc>) -> bool {
        self.is_terminal()
            && status::map_status(self.provider, &self.raw_status, self.created_at, now, None)
                .is_terminal()
    }

    /// Apply a freshly observed raw status and return the previous unified status.
    pub fn observe(
        &mut self,
        raw_status: &str,
        breakdown: Option<&RequestCounts>,
        now: DateTime<Utc>,
    ) -> UnifiedStatus {
        let previous = self.unified_status;
        self.raw_status = raw_status.to_string();
        self.unified_status =
            status::map_status(self.provider, &self.raw_status, self.created_at, now, breakdown);
        previous
    }

    /// The vendor no longer knows this job id; keep tracking it as UNKNOWN.
    pub fn mark_not_found(&mut self, now: DateTime<Utc>) -> UnifiedStatus {
        self.observe(NOT_FOUND_RAW_STATUS, None, now)
    }
}
