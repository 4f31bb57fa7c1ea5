//! OpenAI-compatible chat-completions provider.
//!
//! Works with any endpoint that accepts the OpenAI request format, which in
//! practice covers most vision-capable relays. Supports both a blocking call
//! and SSE token streaming.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ProviderSettings;
use crate::error::{ProviderError, Result};
use crate::provider::{ImagePayload, VisionProvider};
use crate::sse::{SseLine, parse_sse_line};

/// Vision provider speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatProvider {
    settings: ProviderSettings,
    /// Client for blocking calls; carries the configured read timeout.
    http: reqwest::Client,
    /// Client for streaming calls; no read timeout, chunks renew progress
    /// and the caller owns the end-to-end deadline.
    stream_http: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .unwrap_or_default();
        let stream_http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()
            .unwrap_or_default();
        Self {
            settings,
            http,
            stream_http,
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.trimmed_base_url())
    }

    fn request_body(&self, image: &ImagePayload, prompt: &str, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": image.data_uri(), "detail": "high" }
                    }
                ]
            }]
        });
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        body
    }

    fn classify_status(status: reqwest::StatusCode, body: String) -> ProviderError {
        match status.as_u16() {
            429 => ProviderError::RateLimited,
            401 | 403 => ProviderError::AuthFailed(body),
            _ => ProviderError::RequestFailed(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait]
impl VisionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn analyze_image(
        &self,
        image: &ImagePayload,
        prompt: &str,
        api_key: &str,
    ) -> Result<String> {
        let url = self.completions_url();
        debug!(model = %self.settings.model, "sending vision request");

        let mut request = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");
        for (k, v) in &self.settings.headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request
            .json(&self.request_body(image, prompt, false))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "vision request rejected");
            return Err(Self::classify_status(status, body));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse response: {e}"))
        })?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_owned();
        if content.is_empty() {
            return Err(ProviderError::EmptyContent);
        }

        info!(chars = content.chars().count(), "vision response received");
        Ok(content)
    }

    async fn analyze_image_stream(
        &self,
        image: &ImagePayload,
        prompt: &str,
        api_key: &str,
        tokens: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let url = self.completions_url();
        debug!(model = %self.settings.model, "opening vision stream");

        let mut request = self
            .stream_http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");
        for (k, v) in &self.settings.headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request
            .json(&self.request_body(image, prompt, true))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, "vision stream rejected");
            return Err(Self::classify_status(status, body));
        }

        let mut full = String::new();
        // Line boundaries are single bytes, so buffering raw bytes keeps
        // multi-byte characters split across chunks intact.
        let mut buffer: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(&line) {
                    SseLine::Delta(text) => {
                        full.push_str(&text);
                        // A closed receiver means the downstream consumer is
                        // gone; keep draining so the critique completes.
                        let _ = tokens.send(text);
                    }
                    SseLine::Done => {
                        info!(chars = full.chars().count(), "vision stream complete");
                        break 'outer;
                    }
                    SseLine::Skip => {}
                }
            }
        }

        if full.is_empty() {
            warn!("vision stream ended with no content");
            return Err(ProviderError::EmptyContent);
        }
        Ok(full)
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish()
    }
}
