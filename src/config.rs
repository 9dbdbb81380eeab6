use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::abilities::DuplicatePolicy;

/// Default Gemini API base URL.
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub model: ModelConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    pub site: SiteConfig,
    /// Absent when the host has no content backend
    #[serde(default)]
    pub content: Option<ContentConfig>,
}

#[derive(Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegistryConfig {
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Restrict content search to authenticated callers.
    #[serde(default)]
    pub members_only: bool,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_results() -> usize {
    5
}

// The API key must never end up in logs, so Debug is written by hand.
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl ModelConfig {
    /// Endpoint without trailing slash, defaulting to the public Gemini API.
    pub fn endpoint(&self) -> String {
        self.endpoint
            .as_deref()
            .unwrap_or(DEFAULT_GEMINI_ENDPOINT)
            .trim_end_matches('/')
            .to_string()
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${GEMINI_API_KEY}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would only fail later, at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model.provider != "gemini" {
            anyhow::bail!(
                "Unsupported model provider: '{}'. Supported: 'gemini'.",
                self.model.provider
            );
        }
        if self.model.api_key.trim().is_empty() {
            anyhow::bail!("model.api_key is empty");
        }
        if self.model.model.trim().is_empty() {
            anyhow::bail!("model.model is empty");
        }
        if self.model.request_timeout_secs == 0 {
            anyhow::bail!("model.request_timeout_secs must be greater than 0");
        }

        let endpoint = url::Url::parse(&self.model.endpoint())
            .map_err(|e| anyhow::anyhow!("model.endpoint is not a valid URL: {e}"))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            anyhow::bail!(
                "model.endpoint must use http or https, got '{}'",
                endpoint.scheme()
            );
        }

        if let Some(ref content) = self.content {
            if content.max_results == 0 {
                anyhow::bail!("content.max_results must be greater than 0");
            }
        }

        Ok(())
    }

    /// Human-readable description of the model backend
    pub fn model_description(&self) -> String {
        format!("{} ({})", self.model.provider, self.model.model)
    }
}
