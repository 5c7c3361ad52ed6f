use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::models::job::ProviderKind;
use crate::models::report::JobReport;

/// Default report file for `provider`; never matches the state file prefix.
pub fn default_path(dir: &Path, provider: ProviderKind) -> PathBuf {
    dir.join(format!("{provider}_final_reports.jsonl"))
}

/// Append reports as JSON lines, creating the file if needed.
pub fn append(path: &Path, reports: &[JobReport]) -> Result<(), ReportLogError> {
    if reports.is_empty() {
        return Ok(());
    }

    let mut buf = String::new();
    for report in reports {
        buf.push_str(&serde_json::to_string(report)?);
        buf.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ReportLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(buf.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|source| ReportLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(path = %path.display(), count = reports.len(), "Appended job reports");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ReportLogError {
    #[error("Report log I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to encode job report: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::UnifiedStatus;
    use crate::services::state_file;
    use chrono::{TimeZone, Utc};

    fn report(job_id: &str) -> JobReport {
        JobReport {
            provider: ProviderKind::OpenAi,
            job_id: job_id.to_string(),
            status: UnifiedStatus::Failed,
            raw_status: "failed".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 10, 12, 6, 0, 0).unwrap(),
            ended_at: None,
            latency_seconds: None,
            model: None,
            request_counts: None,
        }
    }

    #[test]
    fn test_appends_across_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_path(dir.path(), ProviderKind::OpenAi);

        append(&path, &[report("batch_1")]).unwrap();
        append(&path, &[]).unwrap();
        append(&path, &[report("batch_2"), report("batch_3")]).unwrap();

        let ids: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<JobReport>(l).unwrap().job_id)
            .collect();
        assert_eq!(ids, ["batch_1", "batch_2", "batch_3"]);
    }

    #[test]
    fn test_nothing_to_append_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_path(dir.path(), ProviderKind::Anthropic);
        append(&path, &[]).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_report_file_is_not_a_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = default_path(dir.path(), ProviderKind::Google);
        append(&path, &[report("batches/1")]).unwrap();
        assert_eq!(state_file::locate_latest(dir.path(), ProviderKind::Google).unwrap(), None);
    }
}
