use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use super::ProviderError;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("llm-batch-tracker/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ProviderError::Configuration(format!("HTTP client setup failed: {e}")))
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

/// Classify a vendor response; `subject` names the job or listing requested.
pub(crate) async fn ensure_success(
    response: Response,
    subject: &str,
) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, subject, &body))
}

pub(crate) fn classify_status(status: StatusCode, subject: &str, body: &str) -> ProviderError {
    match status {
        StatusCode::NOT_FOUND => ProviderError::UnknownJob(subject.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Configuration(format!("HTTP {status} for {subject}: {body}"))
        }
        _ => ProviderError::Transient(format!("HTTP {status} for {subject}: {body}")),
    }
}

/// Stream a successful response body to `dest`.
pub(crate) async fn write_body(response: Response, dest: &Path) -> Result<u64, ProviderError> {
    let bytes = response.bytes().await?;
    tokio::fs::write(dest, &bytes).await?;
    Ok(bytes.len() as u64)
}

/// Google JSON encodes int64 as strings; accept both forms.
pub(crate) mod int64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
