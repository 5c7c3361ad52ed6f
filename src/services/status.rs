//! Translation of vendor job states into [`UnifiedStatus`].
//!
//! Every provider's raw vocabulary is parsed into a provider-scoped enum and
//! then classified in [`map_status`], so the disambiguation rules (the Google
//! cancel tie-break and the Anthropic per-request priority) live in one place.

use chrono::{DateTime, Duration, Utc};
use strum::EnumString;

use crate::models::job::{ProviderKind, RequestCounts, UnifiedStatus};

/// Vendor processing window. A Google cancel observed after this much time
/// since creation is reported as a timeout rather than an operator cancel.
pub const PROCESSING_WINDOW_HOURS: i64 = 24;

/// Job states shared by the Gemini developer API and Vertex AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GoogleJobState {
    Unspecified,
    Queued,
    Pending,
    Running,
    Paused,
    Updating,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelling,
    Cancelled,
    Expired,
}

impl GoogleJobState {
    /// Parse `JOB_STATE_RUNNING`, `BATCH_STATE_RUNNING` or plain `running`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let upper = raw.to_ascii_uppercase();
        let name = ["JOB_STATE_", "BATCH_STATE_"]
            .iter()
            .find_map(|prefix| upper.strip_prefix(prefix))
            .map(str::to_string)
            .unwrap_or_else(|| raw.to_string());
        name.parse().ok()
    }
}

/// OpenAI batch object `status` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OpenAiBatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
}

/// Anthropic message batch `processing_status` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AnthropicProcessingStatus {
    InProgress,
    Canceling,
    Ended,
}

/// Map a provider's raw job status to the unified status.
///
/// Total: anything unrecognized maps to [`UnifiedStatus::Unknown`] (and is
/// logged), which keeps the job in the state file for another pass.
pub fn map_status(
    provider: ProviderKind,
    raw_status: &str,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    breakdown: Option<&RequestCounts>,
) -> UnifiedStatus {
    let mapped = match provider {
        ProviderKind::Google | ProviderKind::GoogleVertexAi => {
            GoogleJobState::parse(raw_status).and_then(|state| {
                map_google(provider, state, created_at, now)
            })
        }
        ProviderKind::OpenAi => raw_status.trim().parse().ok().map(map_openai),
        ProviderKind::Anthropic => raw_status
            .trim()
            .parse()
            .ok()
            .and_then(|state| map_anthropic(state, breakdown)),
    };

    mapped.unwrap_or_else(|| {
        tracing::warn!(
            provider = %provider,
            raw_status = %raw_status,
            "Unrecognized job status, treating as UNKNOWN"
        );
        UnifiedStatus::Unknown
    })
}

fn map_google(
    provider: ProviderKind,
    state: GoogleJobState,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<UnifiedStatus> {
    use GoogleJobState::*;

    let status = match state {
        Succeeded => UnifiedStatus::Succeeded,
        Failed => UnifiedStatus::Failed,
        PartiallySucceeded if provider == ProviderKind::GoogleVertexAi => UnifiedStatus::Failed,
        PartiallySucceeded => return None,
        Expired => UnifiedStatus::CancelledTimedOut,
        // The vendor reports both its own timeout and an operator cancel as
        // "cancelled"; elapsed time since creation tells them apart.
        Cancelled | Cancelling => {
            if now - created_at > Duration::hours(PROCESSING_WINDOW_HOURS) {
                UnifiedStatus::CancelledTimedOut
            } else {
                UnifiedStatus::CancelledOnDemand
            }
        }
        Pending | Running | Queued | Paused | Updating | Unspecified => UnifiedStatus::InProgress,
    };
    Some(status)
}

fn map_openai(status: OpenAiBatchStatus) -> UnifiedStatus {
    use OpenAiBatchStatus::*;

    match status {
        Completed => UnifiedStatus::Succeeded,
        Failed => UnifiedStatus::Failed,
        Expired => UnifiedStatus::CancelledTimedOut,
        Cancelled => UnifiedStatus::CancelledOnDemand,
        Validating | InProgress | Finalizing | Cancelling => UnifiedStatus::InProgress,
    }
}

fn map_anthropic(
    status: AnthropicProcessingStatus,
    breakdown: Option<&RequestCounts>,
) -> Option<UnifiedStatus> {
    match status {
        AnthropicProcessingStatus::InProgress | AnthropicProcessingStatus::Canceling => {
            Some(UnifiedStatus::InProgress)
        }
        // Outcome is only reported per request; the worst one wins.
        AnthropicProcessingStatus::Ended => breakdown.map(|counts| {
            if counts.errored > 0 {
                UnifiedStatus::Failed
            } else if counts.expired > 0 {
                UnifiedStatus::CancelledTimedOut
            } else if counts.canceled > 0 {
                UnifiedStatus::CancelledOnDemand
            } else {
                UnifiedStatus::Succeeded
            }
        }),
    }
}
