//! The `ResultStore` collaborator: persistence of grading outcomes.
//!
//! The grading core only sees this trait. Persistence failures are logged
//! and swallowed by the callers -- a successful grading never turns into a
//! failed response because a write failed.

pub mod jsonl;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use inkstone_types::dto::{
    BatchResult, CharAnalysis, CopybookTemplate, GradeMode, SingleCharResult,
};

pub use jsonl::JsonlResultStore;

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// One homework submission, as listed in a user's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HomeworkRecord {
    pub task_id: String,
    pub user_id: Option<i64>,
    pub original_file_name: String,
    pub copybook_id: Option<String>,
    pub char_count: i32,
    pub avg_score: i32,
    pub status: String,
    pub processing_time_ms: i64,
    pub created_at: String,
}

/// One upstream call, for audit and flood control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyUsageRecord {
    pub task_id: Option<String>,
    pub user_id: Option<i64>,
    pub provider: String,
    pub mode: GradeMode,
    pub char_count: i32,
    pub latency_ms: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Persistence collaborator for grading results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a whole-page result together with its submission metadata.
    async fn save_result(
        &self,
        result: &BatchResult,
        file_name: &str,
        user_id: Option<i64>,
        copybook_id: Option<String>,
    ) -> Result<()>;

    /// Persist a single-character result.
    async fn save_single_result(
        &self,
        result: &SingleCharResult,
        user_id: Option<i64>,
    ) -> Result<()>;

    /// Record one upstream call.
    async fn log_key_usage(&self, record: KeyUsageRecord) -> Result<()>;

    /// Load a stored whole-page result by task id.
    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<BatchResult>>;

    /// A user's submissions, most recent first, at most 10.
    async fn find_recent_homeworks(&self, user_id: i64) -> Result<Vec<HomeworkRecord>>;

    /// Chronological list of a user's past analyses of one character.
    async fn growth_curve(&self, user_id: i64, character: &str) -> Result<Vec<CharAnalysis>>;

    /// Calls logged for this user within the trailing `minutes`.
    async fn count_recent_calls(&self, user_id: i64, minutes: i64) -> Result<u64>;

    /// All known copybook templates.
    async fn list_templates(&self) -> Result<Vec<CopybookTemplate>>;

    /// Look up one template by id.
    async fn find_template(&self, id: i64) -> Result<Option<CopybookTemplate>>;
}
