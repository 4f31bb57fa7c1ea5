//! JSONL-backed result store.
//!
//! Writes are appended as newline-delimited tagged events; on open, the log
//! is replayed to rebuild the in-memory state that serves queries. Invalid
//! lines are skipped with a warning so one bad write never poisons the
//! whole log.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use inkstone_types::dto::{BatchResult, CharAnalysis, CopybookTemplate, SingleCharResult};

use super::{HomeworkRecord, KeyUsageRecord, Result, ResultStore};
use crate::templates::builtin_templates;

/// Event types stored in the JSONL log.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StoreEvent {
    Homework {
        record: HomeworkRecord,
        result: BatchResult,
    },
    SingleAnalysis {
        user_id: Option<i64>,
        result: SingleCharResult,
    },
    KeyUsage {
        record: KeyUsageRecord,
    },
}

#[derive(Default)]
struct StoreState {
    homeworks: Vec<(HomeworkRecord, BatchResult)>,
    singles: Vec<(Option<i64>, SingleCharResult)>,
    key_log: Vec<KeyUsageRecord>,
}

/// Append-only JSONL store with replay-on-open.
pub struct JsonlResultStore {
    path: PathBuf,
    state: Mutex<StoreState>,
    templates: Vec<CopybookTemplate>,
}

impl JsonlResultStore {
    /// Open (or create) a store at `path`, replaying any existing log.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`](super::StoreError::Io) when the log exists but
    /// cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = StoreState::default();

        if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let mut skipped = 0usize;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<StoreEvent>(line) {
                    Ok(event) => apply(&mut state, event),
                    Err(_) => skipped += 1,
                }
            }
            if skipped > 0 {
                warn!(skipped, "store replay skipped invalid lines");
            }
            info!(
                homeworks = state.homeworks.len(),
                singles = state.singles.len(),
                key_log = state.key_log.len(),
                "result store replayed"
            );
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
            templates: builtin_templates(),
        })
    }

    /// A user's stored single-character critiques, most recent first.
    pub async fn recent_single_analyses(&self, user_id: i64) -> Vec<SingleCharResult> {
        let state = self.state.lock().await;
        state
            .singles
            .iter()
            .rev()
            .filter(|(owner, _)| *owner == Some(user_id))
            .map(|(_, result)| result.clone())
            .collect()
    }

    async fn append(&self, event: &StoreEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

fn apply(state: &mut StoreState, event: StoreEvent) {
    match event {
        StoreEvent::Homework { record, result } => state.homeworks.push((record, result)),
        StoreEvent::SingleAnalysis { user_id, result } => state.singles.push((user_id, result)),
        StoreEvent::KeyUsage { record } => state.key_log.push(record),
    }
}

fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn save_result(
        &self,
        result: &BatchResult,
        file_name: &str,
        user_id: Option<i64>,
        copybook_id: Option<String>,
    ) -> Result<()> {
        let record = HomeworkRecord {
            task_id: result.task_id.clone(),
            user_id,
            original_file_name: file_name.to_owned(),
            copybook_id,
            char_count: result.total_characters,
            avg_score: result.avg_overall_score,
            status: "COMPLETED".into(),
            processing_time_ms: result.processing_time_ms,
            created_at: if result.created_at.is_empty() {
                now_timestamp()
            } else {
                result.created_at.clone()
            },
        };
        let event = StoreEvent::Homework {
            record,
            result: result.clone(),
        };
        self.append(&event).await?;
        apply(&mut *self.state.lock().await, event);
        info!(task = %result.task_id, chars = result.total_characters, "homework persisted");
        Ok(())
    }

    async fn save_single_result(
        &self,
        result: &SingleCharResult,
        user_id: Option<i64>,
    ) -> Result<()> {
        let event = StoreEvent::SingleAnalysis {
            user_id,
            result: result.clone(),
        };
        self.append(&event).await?;
        apply(&mut *self.state.lock().await, event);
        info!(task = %result.task_id, recognized = %result.recognized_char, "single analysis persisted");
        Ok(())
    }

    async fn log_key_usage(&self, record: KeyUsageRecord) -> Result<()> {
        let event = StoreEvent::KeyUsage { record };
        self.append(&event).await?;
        apply(&mut *self.state.lock().await, event);
        Ok(())
    }

    async fn find_by_task_id(&self, task_id: &str) -> Result<Option<BatchResult>> {
        let state = self.state.lock().await;
        Ok(state
            .homeworks
            .iter()
            .find(|(record, _)| record.task_id == task_id)
            .map(|(_, result)| result.clone()))
    }

    async fn find_recent_homeworks(&self, user_id: i64) -> Result<Vec<HomeworkRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .homeworks
            .iter()
            .rev()
            .filter(|(record, _)| record.user_id == Some(user_id))
            .map(|(record, _)| record.clone())
            .take(10)
            .collect())
    }

    async fn growth_curve(&self, user_id: i64, character: &str) -> Result<Vec<CharAnalysis>> {
        let state = self.state.lock().await;
        let mut curve = Vec::new();
        for (record, result) in &state.homeworks {
            if record.user_id != Some(user_id) {
                continue;
            }
            for analysis in &result.analyses {
                if analysis.recognized_char == character {
                    let mut entry = analysis.clone();
                    // History views do not need the crop payload.
                    entry.char_image_base64 = None;
                    curve.push(entry);
                }
            }
        }
        Ok(curve)
    }

    async fn count_recent_calls(&self, user_id: i64, minutes: i64) -> Result<u64> {
        // Timestamps are "YYYY-MM-DD HH:MM:SS" strings, which compare
        // correctly as text.
        let since = (chrono::Local::now() - chrono::Duration::minutes(minutes))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let state = self.state.lock().await;
        Ok(state
            .key_log
            .iter()
            .filter(|record| record.user_id == Some(user_id) && record.created_at >= since)
            .count() as u64)
    }

    async fn list_templates(&self) -> Result<Vec<CopybookTemplate>> {
        Ok(self.templates.clone())
    }

    async fn find_template(&self, id: i64) -> Result<Option<CopybookTemplate>> {
        Ok(self.templates.iter().find(|t| t.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkstone_types::dto::{CharAnalysis, GradeMode};

    fn sample_result(task_id: &str, score: i32) -> BatchResult {
        BatchResult {
            task_id: task_id.into(),
            total_characters: 20,
            avg_structure_score: score,
            avg_stroke_score: score,
            avg_overall_score: score,
            summary_comment: "不错".into(),
            processing_time_ms: 1234,
            created_at: now_timestamp(),
            analyses: vec![CharAnalysis {
                char_index: 0,
                recognized_char: "疑".into(),
                overall_score: score - 10,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn temp_store() -> (tempfile::TempDir, JsonlResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlResultStore::open(dir.path().join("store.jsonl"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_and_find_roundtrip() {
        let (_dir, store) = temp_store().await;
        let result = sample_result("task-a", 73);
        store
            .save_result(&result, "page.jpg", Some(7), None)
            .await
            .unwrap();

        let loaded = store.find_by_task_id("task-a").await.unwrap().unwrap();
        assert_eq!(loaded.task_id, result.task_id);
        assert_eq!(loaded.total_characters, result.total_characters);
        assert_eq!(loaded.avg_overall_score, result.avg_overall_score);
        assert_eq!(loaded.summary_comment, result.summary_comment);
        assert_eq!(loaded.processing_time_ms, result.processing_time_ms);

        assert!(store.find_by_task_id("task-zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replay_restores_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");

        {
            let store = JsonlResultStore::open(&path).await.unwrap();
            store
                .save_result(&sample_result("task-b", 80), "a.jpg", Some(1), None)
                .await
                .unwrap();
        }

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        let loaded = reopened.find_by_task_id("task-b").await.unwrap().unwrap();
        assert_eq!(loaded.avg_overall_score, 80);
    }

    #[tokio::test]
    async fn history_is_recent_first_and_capped() {
        let (_dir, store) = temp_store().await;
        for i in 0..12 {
            store
                .save_result(&sample_result(&format!("task-{i}"), 70), "f.jpg", Some(5), None)
                .await
                .unwrap();
        }
        store
            .save_result(&sample_result("task-other", 70), "f.jpg", Some(6), None)
            .await
            .unwrap();

        let history = store.find_recent_homeworks(5).await.unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].task_id, "task-11");
        assert!(history.iter().all(|r| r.user_id == Some(5)));
    }

    #[tokio::test]
    async fn growth_curve_is_chronological() {
        let (_dir, store) = temp_store().await;
        store
            .save_result(&sample_result("task-1", 60), "f.jpg", Some(3), None)
            .await
            .unwrap();
        store
            .save_result(&sample_result("task-2", 75), "f.jpg", Some(3), None)
            .await
            .unwrap();

        let curve = store.growth_curve(3, "疑").await.unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve[0].overall_score, 50);
        assert_eq!(curve[1].overall_score, 65);

        assert!(store.growth_curve(3, "飞").await.unwrap().is_empty());
    }

    fn usage_record(user_id: i64, created_at: String) -> KeyUsageRecord {
        KeyUsageRecord {
            task_id: None,
            user_id: Some(user_id),
            provider: "openai".into(),
            mode: GradeMode::WholePage,
            char_count: 0,
            latency_ms: 10,
            success: true,
            error_message: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn flood_count_sees_recent_calls_only() {
        let (_dir, store) = temp_store().await;
        store
            .log_key_usage(usage_record(9, "2000-01-01 00:00:00".into()))
            .await
            .unwrap();
        store
            .log_key_usage(usage_record(9, now_timestamp()))
            .await
            .unwrap();

        assert_eq!(store.count_recent_calls(9, 5).await.unwrap(), 1);
        assert_eq!(store.count_recent_calls(777, 5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn single_results_survive_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");

        let single = SingleCharResult {
            task_id: "single-abc".into(),
            recognized_char: "永".into(),
            overall_score: 81,
            created_at: now_timestamp(),
            ..Default::default()
        };
        {
            let store = JsonlResultStore::open(&path).await.unwrap();
            store.save_single_result(&single, Some(4)).await.unwrap();
        }

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        let singles = reopened.recent_single_analyses(4).await;
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].recognized_char, "永");
        assert!(reopened.recent_single_analyses(5).await.is_empty());
    }

    #[tokio::test]
    async fn templates_are_seeded() {
        let (_dir, store) = temp_store().await;
        let templates = store.list_templates().await.unwrap();
        assert!(!templates.is_empty());

        let first = store.find_template(templates[0].id).await.unwrap();
        assert!(first.is_some());
        assert!(store.find_template(-1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped_on_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        {
            let store = JsonlResultStore::open(&path).await.unwrap();
            store
                .save_result(&sample_result("task-ok", 70), "f.jpg", None, None)
                .await
                .unwrap();
        }
        // Corrupt the log with a partial line.
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{\"type\":\"homework\",\"rec");
        std::fs::write(&path, content).unwrap();

        let reopened = JsonlResultStore::open(&path).await.unwrap();
        assert!(reopened.find_by_task_id("task-ok").await.unwrap().is_some());
    }
}
