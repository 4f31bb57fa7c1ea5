//! Anthropic messages-format provider.
//!
//! Uses the `x-api-key` header and base64 image source blocks. Streaming is
//! inherited from the trait default (one blocking call, full text forwarded
//! as a single token).

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::ProviderSettings;
use crate::error::{ProviderError, Result};
use crate::provider::{ImagePayload, VisionProvider};

/// Vision provider speaking the Anthropic messages protocol.
pub struct AnthropicProvider {
    settings: ProviderSettings,
    http: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .unwrap_or_default();
        Self { settings, http }
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.settings.trimmed_base_url())
    }

    fn request_body(&self, image: &ImagePayload, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.media_type,
                            "data": image.base64
                        }
                    },
                    { "type": "text", "text": prompt }
                ]
            }]
        })
    }
}

#[async_trait]
impl VisionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn analyze_image(
        &self,
        image: &ImagePayload,
        prompt: &str,
        api_key: &str,
    ) -> Result<String> {
        let url = self.messages_url();
        debug!(model = %self.settings.model, "sending vision request");

        let mut request = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("Content-Type", "application/json");
        for (k, v) in &self.settings.headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request
            .json(&self.request_body(image, prompt))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "vision request rejected");
            return Err(match status.as_u16() {
                429 => ProviderError::RateLimited,
                401 | 403 => ProviderError::AuthFailed(body),
                _ => ProviderError::RequestFailed(format!("HTTP {status}: {body}")),
            });
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse response: {e}"))
        })?;

        // Concatenate every text block in the content array.
        let mut text = String::new();
        if let Some(blocks) = json["content"].as_array() {
            for block in blocks {
                if block["type"] == "text" {
                    text.push_str(block["text"].as_str().unwrap_or(""));
                }
            }
        }
        if text.is_empty() {
            return Err(ProviderError::EmptyContent);
        }

        info!(chars = text.chars().count(), "vision response received");
        Ok(text)
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}
