//! Fixed clock and state file contents shared by the reconciliation tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Clock used for every pass in the tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 12, 12, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    now() - Duration::hours(hours)
}

/// Time the input state file was written, one polling interval before `now`.
pub fn previous_pass() -> DateTime<Utc> {
    now() - Duration::minutes(1)
}

/// A state file as the job-creation flow writes it, field order varied.
pub const GOOGLE_STATE_FILE: &str = concat!(
    r#"{"provider":"google","job_id":"batches/job-123","raw_status":"JOB_STATE_PENDING","unified_status":"IN_PROGRESS","created_at":"2025-10-12T06:00:00+00:00","extra":{"model":"models/gemini-2.5-flash-lite"}}"#,
    "\n",
    r#"{"job_id":"batches/job-456","unified_status":"IN_PROGRESS","created_at":"2025-10-12T07:00:00Z","raw_status":"JOB_STATE_PENDING","provider":"google"}"#,
    "\n",
    "\n",
);

/// Second line is cut off mid-object.
pub const TRUNCATED_STATE_FILE: &str = concat!(
    r#"{"provider":"openai","job_id":"batch_1","raw_status":"in_progress","unified_status":"IN_PROGRESS","created_at":"2025-10-12T06:00:00Z"}"#,
    "\n",
    r#"{"provider":"openai","job_id":"batch_2","raw_sta"#,
    "\n",
);

/// Stored unified status disagrees with the raw status on both lines.
pub const DRIFTED_STATE_FILE: &str = concat!(
    r#"{"provider":"openai","job_id":"batch_live","raw_status":"in_progress","unified_status":"SUCCEEDED","created_at":"2025-10-12T06:00:00Z"}"#,
    "\n",
    r#"{"provider":"openai","job_id":"batch_done","raw_status":"completed","unified_status":"IN_PROGRESS","created_at":"2025-10-12T06:00:00Z"}"#,
    "\n",
);
