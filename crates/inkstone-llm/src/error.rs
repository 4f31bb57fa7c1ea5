//! Provider error types for inkstone-llm.

use thiserror::Error;

/// Errors that can occur when calling an upstream vision model.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP request to the provider failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication with the provider was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider returned success but no content at all.
    #[error("AI 返回空内容")]
    EmptyContent,

    /// The request timed out.
    #[error("timeout")]
    Timeout,

    /// An HTTP-level error from reqwest.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_request_failed() {
        let err = ProviderError::RequestFailed("HTTP 500: oops".into());
        assert_eq!(err.to_string(), "request failed: HTTP 500: oops");
    }

    #[test]
    fn display_empty_content_is_user_facing() {
        assert_eq!(ProviderError::EmptyContent.to_string(), "AI 返回空内容");
    }

    #[test]
    fn from_json_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ProviderError = serde_err.into();
        assert!(err.to_string().starts_with("json error:"));
    }
}
