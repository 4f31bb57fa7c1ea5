//! The `{code, message, data}` envelope wrapping every non-stream response.

use serde::{Deserialize, Serialize};

use crate::error::GradeError;

/// Uniform API response envelope.
///
/// `code` is `"OK"` on success, or a stable error code from
/// [`GradeError::code`] on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// A successful response carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: "OK".into(),
            message: "success".into(),
            data: Some(data),
        }
    }

    /// A successful response with an explicit message.
    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            code: "OK".into(),
            message: message.into(),
            data: Some(data),
        }
    }

    /// An error response with an explicit code and message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            data: None,
        }
    }

    /// True when `code == "OK"`.
    pub fn is_ok(&self) -> bool {
        self.code == "OK"
    }
}

impl<T> From<&GradeError> for ApiResponse<T> {
    fn from(err: &GradeError) -> Self {
        Self::error(err.code(), err.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope() {
        let resp = ApiResponse::ok(42);
        assert!(resp.is_ok());
        assert_eq!(resp.data, Some(42));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""code":"OK""#));
    }

    #[test]
    fn error_envelope_omits_data() {
        let resp: ApiResponse<()> = ApiResponse::error("NOT_FOUND", "missing");
        assert!(!resp.is_ok());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn from_grade_error() {
        let err = GradeError::RateLimited;
        let resp: ApiResponse<()> = (&err).into();
        assert_eq!(resp.code, "RATE_LIMITED");
        assert!(resp.message.contains("频繁"));
    }
}
