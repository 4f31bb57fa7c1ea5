//! Dispatch-layer error types.

use thiserror::Error;

/// Errors produced by the pool, rate budget and dispatcher.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No credential became available within the borrow timeout, or rate
    /// admission kept failing.
    #[error("credential pool exhausted: {0}")]
    Exhausted(String),

    /// All retry attempts for a task failed.
    #[error("task failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Total attempts made (retry_count + 1).
        attempts: u32,
        /// Message of the last failure.
        message: String,
    },

    /// Redis connectivity or command failure (shared-remote variants).
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Convenience alias for dispatch-layer results.
pub type Result<T> = std::result::Result<T, DispatchError>;

impl From<DispatchError> for inkstone_types::GradeError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Exhausted(msg) => inkstone_types::GradeError::Exhausted(msg),
            DispatchError::RetriesExhausted { attempts, message } => {
                inkstone_types::GradeError::Upstream(format!(
                    "任务在 {attempts} 次尝试后仍然失败: {message}"
                ))
            }
            DispatchError::Redis(e) => inkstone_types::GradeError::Fatal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkstone_types::GradeError;

    #[test]
    fn display_exhausted() {
        let err = DispatchError::Exhausted("borrow timed out".into());
        assert_eq!(
            err.to_string(),
            "credential pool exhausted: borrow timed out"
        );
    }

    #[test]
    fn display_retries_exhausted() {
        let err = DispatchError::RetriesExhausted {
            attempts: 4,
            message: "HTTP 500".into(),
        };
        assert_eq!(err.to_string(), "task failed after 4 attempts: HTTP 500");
    }

    #[test]
    fn exhausted_maps_to_exhausted_code() {
        let err: GradeError = DispatchError::Exhausted("empty".into()).into();
        assert_eq!(err.code(), "EXHAUSTED");
    }

    #[test]
    fn retries_exhausted_maps_to_ai_error() {
        let err: GradeError = DispatchError::RetriesExhausted {
            attempts: 4,
            message: "boom".into(),
        }
        .into();
        assert_eq!(err.code(), "AI_ERROR");
    }
}
