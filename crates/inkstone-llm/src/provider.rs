//! The core [`VisionProvider`] trait.
//!
//! A provider turns one image plus one prompt into a free-text critique,
//! using an API key leased by the caller for exactly this call.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// A base64-encoded image with its media type.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Base64-encoded image bytes (no data-URI prefix).
    pub base64: String,
    /// MIME type, e.g. "image/jpeg".
    pub media_type: String,
}

impl ImagePayload {
    /// A JPEG payload from already-encoded base64 data.
    pub fn jpeg(base64: impl Into<String>) -> Self {
        Self {
            base64: base64.into(),
            media_type: "image/jpeg".into(),
        }
    }

    /// The `data:` URI form used by chat-completions image parts.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

/// A provider that can run a vision prompt against one image.
///
/// Implementations handle protocol details (authentication header shape,
/// request format, response parsing) for a specific upstream API.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Returns the provider name (e.g. "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send the image + prompt and return the complete critique text.
    ///
    /// # Errors
    ///
    /// [`ProviderError`](crate::error::ProviderError) on network failure,
    /// auth rejection, rate limiting, unparseable or empty responses.
    async fn analyze_image(
        &self,
        image: &ImagePayload,
        prompt: &str,
        api_key: &str,
    ) -> Result<String>;

    /// Streaming variant: each content delta is sent through `tokens` as it
    /// arrives; the accumulated full text is returned on completion.
    ///
    /// The default implementation falls back to the blocking call and emits
    /// the whole critique as a single token, for providers without a
    /// streaming endpoint.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`analyze_image`](Self::analyze_image); an
    /// upstream stream that ends with no content at all is
    /// [`ProviderError::EmptyContent`](crate::error::ProviderError::EmptyContent).
    async fn analyze_image_stream(
        &self,
        image: &ImagePayload,
        prompt: &str,
        api_key: &str,
        tokens: mpsc::UnboundedSender<String>,
    ) -> Result<String> {
        let text = self.analyze_image(image, prompt, api_key).await?;
        // Receiver may already be gone; dropped tokens are fine.
        let _ = tokens.send(text.clone());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_shape() {
        let image = ImagePayload::jpeg("QUJD");
        assert_eq!(image.data_uri(), "data:image/jpeg;base64,QUJD");
    }

    struct BlockingOnly;

    #[async_trait]
    impl VisionProvider for BlockingOnly {
        fn name(&self) -> &str {
            "blocking-only"
        }

        async fn analyze_image(
            &self,
            _image: &ImagePayload,
            _prompt: &str,
            _api_key: &str,
        ) -> Result<String> {
            Ok("整体不错".into())
        }
    }

    #[tokio::test]
    async fn default_stream_forwards_whole_text_once() {
        let provider = BlockingOnly;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let full = provider
            .analyze_image_stream(&ImagePayload::jpeg("QUJD"), "prompt", "sk-x", tx)
            .await
            .unwrap();
        assert_eq!(full, "整体不错");
        assert_eq!(rx.recv().await.unwrap(), "整体不错");
        assert!(rx.recv().await.is_none());
    }
}
