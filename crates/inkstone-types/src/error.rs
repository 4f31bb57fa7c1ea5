//! The service-wide error type and its stable wire codes.
//!
//! Every failure that can surface past the grading engine maps onto one
//! [`GradeError`] variant. The variant determines the `code` field of the
//! API envelope, so clients can distinguish retry-worthy failures
//! (`EXHAUSTED`, `AI_ERROR`) from terminal ones (`FILE_TOO_LARGE`).

use thiserror::Error;

/// Errors surfaced by the grading core.
#[derive(Error, Debug)]
pub enum GradeError {
    /// The caller exceeded the per-user flood limit.
    #[error("user flood limit exceeded")]
    RateLimited,

    /// No credential could be leased under the admission constraints.
    #[error("credential pool exhausted: {0}")]
    Exhausted(String),

    /// The upstream model call failed or returned empty content.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Image decoding or transformation failed.
    #[error("image processing failed: {0}")]
    Image(String),

    /// The model reply could not be interpreted at all.
    #[error("parse failure: {0}")]
    Parse(String),

    /// The uploaded file exceeds the configured size limit.
    #[error("uploaded file too large")]
    FileTooLarge,

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for unexpected failures during a request.
    #[error("analyze failed: {0}")]
    AnalyzeFailed(String),

    /// Internal invariant violation or infrastructure failure.
    #[error("system error: {0}")]
    Fatal(String),
}

impl GradeError {
    /// The stable wire code carried in the API envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::RateLimited => "RATE_LIMITED",
            GradeError::Exhausted(_) => "EXHAUSTED",
            GradeError::Upstream(_) => "AI_ERROR",
            GradeError::Image(_) => "IMG_ERROR",
            GradeError::Parse(_) => "ANALYZE_FAILED",
            GradeError::FileTooLarge => "FILE_TOO_LARGE",
            GradeError::NotFound(_) => "NOT_FOUND",
            GradeError::AnalyzeFailed(_) => "ANALYZE_FAILED",
            GradeError::Fatal(_) => "SYSTEM_ERROR",
        }
    }

    /// The localized message shown to end users.
    pub fn user_message(&self) -> String {
        match self {
            GradeError::RateLimited => "操作过于频繁，请 5 分钟后再试".into(),
            GradeError::Exhausted(_) => "AI 通道繁忙，请稍后重试".into(),
            GradeError::Upstream(msg) => format!("批改失败: {msg}"),
            GradeError::Image(msg) => format!("图片处理失败: {msg}"),
            GradeError::Parse(msg) => format!("结果解析失败: {msg}"),
            GradeError::FileTooLarge => "上传文件过大，请压缩后重试（最大 10MB）".into(),
            GradeError::NotFound(what) => format!("未找到批改记录: {what}"),
            GradeError::AnalyzeFailed(msg) => format!("批改失败: {msg}"),
            GradeError::Fatal(_) => "系统内部错误，请稍后重试".into(),
        }
    }

    /// True for failures a client may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GradeError::Exhausted(_) | GradeError::Upstream(_) | GradeError::RateLimited
        )
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, GradeError>;
