use std::time::Duration;

use serde::Deserialize;

use crate::models::job::ProviderKind;
use crate::providers::{
    AnthropicClient, GoogleBackend, GoogleBatchClient, OpenAiClient, ProviderClient, ProviderError,
};

/// Vendor credentials and client settings, read from the environment.
#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    /// Gemini developer API key.
    pub google_api_key: Option<String>,

    /// Accepted in place of `GOOGLE_API_KEY`.
    pub gemini_api_key: Option<String>,

    /// Vertex AI project id
    pub google_cloud_project: Option<String>,

    /// Vertex AI region (e.g., "us-central1")
    #[serde(default = "default_location")]
    pub google_cloud_location: String,

    /// OAuth access token for Vertex AI (e.g. `gcloud auth print-access-token`)
    pub google_vertex_access_token: Option<String>,

    pub openai_api_key: Option<String>,

    pub anthropic_api_key: Option<String>,

    /// Per-request timeout for vendor API calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        envy::from_env().map_err(ConfigError::Env)
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build the client for `kind`, failing if its credentials are missing.
    pub fn provider_client(&self, kind: ProviderKind) -> Result<ProviderClient, ConfigError> {
        let timeout = self.http_timeout();
        let client = match kind {
            ProviderKind::Google => {
                let api_key = non_blank(&self.google_api_key)
                    .or_else(|| non_blank(&self.gemini_api_key))
                    .ok_or(ConfigError::MissingCredential("GOOGLE_API_KEY"))?;
                ProviderClient::Google(GoogleBatchClient::new(
                    GoogleBackend::DeveloperApi { api_key },
                    timeout,
                )?)
            }
            ProviderKind::GoogleVertexAi => {
                let project = required(&self.google_cloud_project, "GOOGLE_CLOUD_PROJECT")?;
                let access_token =
                    required(&self.google_vertex_access_token, "GOOGLE_VERTEX_ACCESS_TOKEN")?;
                ProviderClient::Google(GoogleBatchClient::new(
                    GoogleBackend::VertexAi {
                        project,
                        location: self.google_cloud_location.clone(),
                        access_token,
                    },
                    timeout,
                )?)
            }
            ProviderKind::OpenAi => {
                let api_key = required(&self.openai_api_key, "OPENAI_API_KEY")?;
                ProviderClient::OpenAi(OpenAiClient::new(api_key, timeout)?)
            }
            ProviderKind::Anthropic => {
                let api_key = required(&self.anthropic_api_key, "ANTHROPIC_API_KEY")?;
                ProviderClient::Anthropic(AnthropicClient::new(api_key, timeout)?)
            }
        };
        Ok(client)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, var: &'static str) -> Result<String, ConfigError> {
    non_blank(value).ok_or(ConfigError::MissingCredential(var))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Environment variable {0} is not set")]
    MissingCredential(&'static str),

    #[error("Failed to initialize provider client: {0}")]
    Client(#[from] ProviderError),
}
