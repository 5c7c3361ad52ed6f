//! Test helpers: a scripted in-memory provider and state file utilities.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use llm_batch_tracker::models::job::{JobExtra, JobRecord, ProviderKind, RequestCounts};
use llm_batch_tracker::providers::{BatchProvider, JobSnapshot, ProviderError};
use llm_batch_tracker::services::state_file;

/// Canned answer for one job id.
#[derive(Debug, Clone)]
pub enum Scripted {
    Status {
        raw: &'static str,
        counts: Option<RequestCounts>,
        ended_at: Option<DateTime<Utc>>,
    },
    Transient,
    NotFound,
    Unauthorized,
}

impl Scripted {
    pub fn status(raw: &'static str) -> Self {
        Scripted::Status {
            raw,
            counts: None,
            ended_at: None,
        }
    }
}

/// Provider double that answers from a script and records every call.
pub struct ScriptedProvider {
    kind: ProviderKind,
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
    queried: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            script: Mutex::new(HashMap::new()),
            queried: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, job_id: &str, answer: Scripted) -> &Self {
        self.respond_in_turn(job_id, [answer])
    }

    /// One answer per query, in order; the last one repeats.
    pub fn respond_in_turn(
        &self,
        job_id: &str,
        answers: impl IntoIterator<Item = Scripted>,
    ) -> &Self {
        self.script
            .lock()
            .unwrap()
            .insert(job_id.to_string(), answers.into_iter().collect());
        self
    }

    pub fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl BatchProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn get_job_status(
        &self,
        job_id: &str,
        _extra: &JobExtra,
    ) -> Result<JobSnapshot, ProviderError> {
        self.queried.lock().unwrap().push(job_id.to_string());
        let answer = match self.script.lock().unwrap().get_mut(job_id) {
            Some(answers) if answers.len() > 1 => answers.pop_front(),
            Some(answers) => answers.front().cloned(),
            None => None,
        };
        match answer {
            Some(Scripted::Status {
                raw,
                counts,
                ended_at,
            }) => Ok(JobSnapshot {
                job_id: job_id.to_string(),
                raw_status: raw.to_string(),
                request_counts: counts,
                created_at: None,
                ended_at,
                model: None,
            }),
            Some(Scripted::Transient) => {
                Err(ProviderError::Transient("HTTP 429 Too Many Requests".to_string()))
            }
            Some(Scripted::NotFound) | None => Err(ProviderError::UnknownJob(job_id.to_string())),
            Some(Scripted::Unauthorized) => {
                Err(ProviderError::Configuration("HTTP 401 Unauthorized".to_string()))
            }
        }
    }

    async fn cancel_job(&self, job_id: &str) -> Result<(), ProviderError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn list_jobs(&self, _since: DateTime<Utc>) -> Result<Vec<JobSnapshot>, ProviderError> {
        Ok(Vec::new())
    }

    async fn download_results(&self, job_id: &str, _dest: &Path) -> Result<u64, ProviderError> {
        Err(ProviderError::Unsupported(format!("no results for {job_id}")))
    }
}

/// Build a record the way it would look after an earlier pass.
pub fn record(
    provider: ProviderKind,
    job_id: &str,
    raw: &str,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> JobRecord {
    JobRecord::new(provider, job_id, raw, created_at, JobExtra::new(), None, now)
}

/// Write `records` as a stamped state file in `dir`.
pub fn write_state(
    dir: &Path,
    provider: ProviderKind,
    at: DateTime<Utc>,
    records: &[JobRecord],
) -> PathBuf {
    let path = dir.join(state_file::file_name(provider, at));
    state_file::write(&path, records).unwrap();
    path
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn by_id(records: &[JobRecord], job_id: &str) -> JobRecord {
    records
        .iter()
        .find(|r| r.job_id() == job_id)
        .cloned()
        .unwrap_or_else(|| panic!("no record for {job_id}"))
}
