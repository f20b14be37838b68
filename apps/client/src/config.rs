//! Client configuration.

use anyhow::Context;

/// Connection settings for the hosted backend and evaluation proxy.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_token: String,
}

impl ClientConfig {
    /// Create a config with an explicit base URL and token.
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        }
    }

    /// Load configuration from the environment (and `.env` if present).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url =
            std::env::var("LINGUAFLOW_API_URL").context("LINGUAFLOW_API_URL must be set")?;
        let api_token =
            std::env::var("LINGUAFLOW_API_TOKEN").context("LINGUAFLOW_API_TOKEN must be set")?;

        Ok(Self::new(base_url, api_token))
    }
}
