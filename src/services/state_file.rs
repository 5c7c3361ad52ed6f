//! Line-oriented persistence of tracked jobs.
//!
//! A state file holds one JSON-encoded [`JobRecord`] per line. A file with no
//! records is always physically zero bytes: that is the signal the external
//! polling loop waits for.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::models::job::{JobRecord, ProviderKind};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const EXTENSION: &str = "jsonl";

/// Parse every record in a state file.
///
/// Blank lines are skipped. Any other line that fails to parse rejects the
/// whole file.
pub fn read(path: &Path) -> Result<Vec<JobRecord>, StateFileError> {
    let contents = fs::read_to_string(path).map_err(|source| StateFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(path, &contents)
}

fn parse(path: &Path, contents: &str) -> Result<Vec<JobRecord>, StateFileError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| StateFileError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Serialize records to their on-disk form: empty input yields zero bytes.
pub fn encode(records: &[JobRecord]) -> Result<String, StateFileError> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record).map_err(StateFileError::Encode)?);
        out.push('\n');
    }
    Ok(out)
}

/// Write records to `path` atomically.
///
/// The content goes to a hidden temporary file in the same directory which is
/// synced and then renamed over `path`, so a reader never sees a partial file.
pub fn write(path: &Path, records: &[JobRecord]) -> Result<(), StateFileError> {
    let contents = encode(records)?;
    let tmp_path = temp_path_for(path);

    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| StateFileError::Io { path, source }
    };

    let mut file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(io_err(&tmp_path))?;
    drop(file);

    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StateFileError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    tracing::debug!(path = %path.display(), records = records.len(), "Wrote state file");
    Ok(())
}

/// The driver's stop predicate: the file exists and holds zero bytes.
pub fn is_empty(path: &Path) -> Result<bool, StateFileError> {
    let metadata = fs::metadata(path).map_err(|source| StateFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(metadata.len() == 0)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// State file name for `provider` stamped with `at`.
pub fn file_name(provider: ProviderKind, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}.{EXTENSION}",
        provider.state_file_prefix(),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Timestamp encoded in a state file name produced by [`file_name`].
pub fn parse_file_timestamp(provider: ProviderKind, name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(&provider.state_file_prefix())?
        .strip_prefix('_')?
        .strip_suffix(&format!(".{EXTENSION}"))?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Path for the state file that succeeds `previous`.
///
/// Lives next to `previous`. When `previous` is itself a stamped state file the
/// new stamp is strictly later, so the name also sorts after it. Names already
/// taken are skipped.
pub fn successor_path(provider: ProviderKind, previous: &Path, now: DateTime<Utc>) -> PathBuf {
    let dir = previous
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let previous_name = previous
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stamp = now;
    if let Some(previous_stamp) = parse_file_timestamp(provider, &previous_name) {
        if stamp <= previous_stamp {
            stamp = previous_stamp + Duration::microseconds(1);
        }
    }

    loop {
        let candidate = dir.join(file_name(provider, stamp));
        if candidate != previous && !candidate.exists() {
            return candidate;
        }
        stamp += Duration::microseconds(1);
    }
}

/// Most recently modified state file for `provider` in `dir`.
///
/// Only `{prefix}*.jsonl` names count; backups and temp files are ignored.
///
/// Ties on modification time are broken by file name. Returns `None` when no
/// state file has been written yet.
pub fn locate_latest(dir: &Path, provider: ProviderKind) -> Result<Option<PathBuf>, StateFileError> {
    let prefix = provider.state_file_prefix();
    let entries = fs::read_dir(dir).map_err(|source| StateFileError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut latest: Option<(std::time::SystemTime, String, PathBuf)> = None;
    for entry in entries {
        let entry = entry.map_err(|source| StateFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".jsonl") {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            _ => continue,
        };
        let modified = metadata.modified().map_err(|source| StateFileError::Io {
            path: entry.path(),
            source,
        })?;

        let newer = match &latest {
            Some((best_time, best_name, _)) => (modified, &name) > (*best_time, best_name),
            None => true,
        };
        if newer {
            latest = Some((modified, name, entry.path()));
        }
    }

    Ok(latest.map(|(_, _, path)| path))
}

#[derive(Debug, thiserror::Error)]
pub enum StateFileError {
    #[error("State file I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Malformed state file {path} at line {line}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Failed to encode job record: {0}")]
    Encode(serde_json::Error),
}
