//! Provider connection settings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection settings for one upstream provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name: "openai" or "anthropic".
    pub name: String,

    /// API base URL, e.g. "https://api.openai.com/v1".
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Maximum tokens the model may generate.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f64,

    /// Extra headers attached to every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// TCP connect timeout in seconds.
    pub connect_timeout_seconds: u64,

    /// Read timeout in seconds for blocking calls. Streaming calls run
    /// without a read timeout; the caller owns the end-to-end deadline.
    pub request_timeout_seconds: u64,
}

impl ProviderSettings {
    /// Settings for an OpenAI-compatible endpoint.
    pub fn openai(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "openai".into(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.3,
            headers: HashMap::new(),
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
        }
    }

    /// Settings for the Anthropic messages endpoint.
    pub fn anthropic(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: base_url.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.3,
            headers: HashMap::from([("anthropic-version".into(), "2023-06-01".into())]),
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Base URL with any trailing slash removed.
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
