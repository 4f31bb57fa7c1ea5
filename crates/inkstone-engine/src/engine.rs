//! The grading engine: one end-to-end request per call.
//!
//! Blocking calls run through the dispatcher's retry path, so credential
//! pooling, rate admission and back-off all apply. Streaming calls lease a
//! credential through the same admission check, then drive the upstream
//! token stream and the downstream event channel concurrently with a
//! heartbeat filling the silence before the first token.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, info};

use inkstone_dispatch::Dispatcher;
use inkstone_llm::{ImagePayload, ProviderError, VisionProvider};
use inkstone_types::dto::clamp_score;
use inkstone_types::{AiConfig, BatchResult, GradeError, SingleCharResult, id};

use crate::event::{GradeEvent, GradeOutcome};
use crate::heartbeat::{SINGLE_CHAR_THINKING, WHOLE_PAGE_THINKING, spawn_heartbeat};
use crate::now_timestamp;
use crate::parse::{json_repair, parse_single_char, parse_whole_page};
use crate::preprocess;
use crate::prompts;

fn provider_failure(err: ProviderError) -> GradeError {
    GradeError::Upstream(err.to_string())
}

#[derive(Clone, Copy)]
enum StreamMode {
    WholePage,
    SingleChar,
}

/// Orchestrates grading requests over the dispatch and provider layers.
pub struct GradingEngine {
    provider: Arc<dyn VisionProvider>,
    dispatcher: Arc<Dispatcher>,
    config: AiConfig,
}

impl GradingEngine {
    pub fn new(
        provider: Arc<dyn VisionProvider>,
        dispatcher: Arc<Dispatcher>,
        config: AiConfig,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            config,
        }
    }

    /// Name of the configured upstream provider (for audit records).
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Grade a whole worksheet photograph, blocking until the critique is
    /// parsed.
    ///
    /// # Errors
    ///
    /// [`GradeError::Upstream`] when the image is empty or every retry
    /// failed (credential exhaustion is absorbed by the retry loop and
    /// surfaces the same way).
    pub async fn grade_whole_page(&self, image_bytes: &[u8]) -> Result<BatchResult, GradeError> {
        let started = Instant::now();
        let task_id = id::with_prefix("task");
        info!(task = %task_id, bytes = image_bytes.len(), "whole-page grading started");

        if image_bytes.is_empty() {
            return Err(GradeError::Upstream("图片内容为空".into()));
        }

        let payload = Arc::new(preprocess::precondition(
            image_bytes,
            self.config.max_image_size,
        ));
        let provider = Arc::clone(&self.provider);
        let runner = move |image: Arc<ImagePayload>, key: String| {
            let provider = Arc::clone(&provider);
            async move {
                provider
                    .analyze_image(&image, prompts::WHOLE_PAGE_ANALYSIS, &key)
                    .await
                    .map_err(provider_failure)
            }
        };

        let text = self.dispatcher.execute_with_retry(payload, &runner).await?;

        let mut result = parse_whole_page(&text, &task_id);
        result.processing_time_ms = started.elapsed().as_millis() as i64;
        result.created_at = now_timestamp();

        info!(
            task = %task_id,
            elapsed_ms = result.processing_time_ms,
            total = result.total_characters,
            problems = result.analyses.len(),
            overall = result.avg_overall_score,
            "whole-page grading complete"
        );
        Ok(result)
    }

    /// Grade a single-character close-up, blocking.
    ///
    /// Runs the unified single-prompt analysis, or the three-pass
    /// composition when `multi_agent_enabled` is set.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`grade_whole_page`](Self::grade_whole_page).
    pub async fn grade_single_char(
        &self,
        image_bytes: &[u8],
    ) -> Result<SingleCharResult, GradeError> {
        let started = Instant::now();
        let task_id = id::with_prefix("single");
        info!(task = %task_id, bytes = image_bytes.len(), "single-char grading started");

        if image_bytes.is_empty() {
            return Err(GradeError::Upstream("图片内容为空".into()));
        }

        let payload = Arc::new(preprocess::precondition(
            image_bytes,
            self.config.max_image_size,
        ));
        let provider = Arc::clone(&self.provider);
        let multi_agent = self.config.multi_agent_enabled;
        let runner_task_id = task_id.clone();
        let runner = move |image: Arc<ImagePayload>, key: String| {
            let provider = Arc::clone(&provider);
            let task_id = runner_task_id.clone();
            async move {
                if multi_agent {
                    multi_agent_single(provider.as_ref(), &image, &key, &task_id).await
                } else {
                    let text = provider
                        .analyze_image(&image, prompts::SINGLE_CHAR_ANALYSIS, &key)
                        .await
                        .map_err(provider_failure)?;
                    Ok(parse_single_char(&text, &task_id))
                }
            }
        };

        let mut result = self.dispatcher.execute_with_retry(payload, &runner).await?;
        result.processing_time_ms = started.elapsed().as_millis() as i64;
        result.created_at = now_timestamp();

        info!(
            task = %task_id,
            elapsed_ms = result.processing_time_ms,
            recognized = %result.recognized_char,
            overall = result.overall_score,
            "single-char grading complete"
        );
        Ok(result)
    }

    /// Streaming whole-page grading. All outcomes are delivered through
    /// `events`; the future resolves once the terminal event is sent.
    pub async fn grade_whole_page_stream(
        &self,
        image_bytes: Vec<u8>,
        events: UnboundedSender<GradeEvent>,
    ) {
        self.run_stream(image_bytes, events, StreamMode::WholePage)
            .await;
    }

    /// Streaming single-character grading.
    pub async fn grade_single_char_stream(
        &self,
        image_bytes: Vec<u8>,
        events: UnboundedSender<GradeEvent>,
    ) {
        self.run_stream(image_bytes, events, StreamMode::SingleChar)
            .await;
    }

    async fn run_stream(
        &self,
        image_bytes: Vec<u8>,
        events: UnboundedSender<GradeEvent>,
        mode: StreamMode,
    ) {
        let started = Instant::now();
        let (prefix, prompt, thinking) = match mode {
            StreamMode::WholePage => ("task", prompts::WHOLE_PAGE_ANALYSIS, WHOLE_PAGE_THINKING),
            StreamMode::SingleChar => (
                "single",
                prompts::SINGLE_CHAR_ANALYSIS,
                SINGLE_CHAR_THINKING,
            ),
        };
        let task_id = id::with_prefix(prefix);
        info!(task = %task_id, bytes = image_bytes.len(), "streaming grading started");

        let _ = events.send(GradeEvent::Start);

        if image_bytes.is_empty() {
            let _ = events.send(GradeEvent::Error("批改失败: 图片内容为空".into()));
            return;
        }

        let payload = preprocess::precondition(&image_bytes, self.config.max_image_size);

        let key = match self.dispatcher.borrow_with_rate().await {
            Ok(key) => key,
            Err(err) => {
                error!(task = %task_id, error = %err, "credential lease failed");
                let _ = events.send(GradeEvent::Error(GradeError::from(err).user_message()));
                return;
            }
        };

        let first_token = Arc::new(AtomicBool::new(false));
        let beat = spawn_heartbeat(events.clone(), Arc::clone(&first_token), thinking);

        let (token_tx, mut token_rx) = mpsc::unbounded_channel::<String>();
        let forwarder = tokio::spawn({
            let events = events.clone();
            let first_token = Arc::clone(&first_token);
            let task_id = task_id.clone();
            async move {
                while let Some(text) = token_rx.recv().await {
                    if !first_token.swap(true, Ordering::SeqCst) {
                        debug!(
                            task = %task_id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "first token received"
                        );
                    }
                    let _ = events.send(GradeEvent::Token(text));
                }
            }
        });

        let outcome = self
            .provider
            .analyze_image_stream(&payload, prompt, &key, token_tx)
            .await;

        // The flag alone would let the heartbeat sleep one more interval;
        // abort to release it now.
        first_token.store(true, Ordering::SeqCst);
        beat.abort();
        let _ = forwarder.await;

        match outcome {
            Ok(full_text) => {
                self.dispatcher.pool().return_key(key).await;

                let elapsed_ms = started.elapsed().as_millis() as i64;
                let outcome = match mode {
                    StreamMode::WholePage => {
                        let mut result = parse_whole_page(&full_text, &task_id);
                        result.processing_time_ms = elapsed_ms;
                        result.created_at = now_timestamp();
                        info!(
                            task = %task_id,
                            elapsed_ms,
                            total = result.total_characters,
                            "streaming grading complete"
                        );
                        GradeOutcome::WholePage(Box::new(result))
                    }
                    StreamMode::SingleChar => {
                        let mut result = parse_single_char(&full_text, &task_id);
                        result.processing_time_ms = elapsed_ms;
                        result.created_at = now_timestamp();
                        info!(
                            task = %task_id,
                            elapsed_ms,
                            recognized = %result.recognized_char,
                            "streaming grading complete"
                        );
                        GradeOutcome::SingleChar(Box::new(result))
                    }
                };
                let _ = events.send(GradeEvent::Result(outcome));
            }
            Err(err) => {
                error!(task = %task_id, error = %err, "streaming grading failed");
                self.dispatcher.pool().mark_failed(key).await;
                let _ = events.send(GradeEvent::Error(format!("批改失败: {err}")));
            }
        }
    }
}

/// Three-pass single-character analysis with one leased credential:
/// structure specialist, stroke specialist, then a comment composer fed the
/// first two replies.
async fn multi_agent_single(
    provider: &dyn VisionProvider,
    image: &ImagePayload,
    api_key: &str,
    task_id: &str,
) -> Result<SingleCharResult, GradeError> {
    debug!(task = %task_id, "multi-agent single-char analysis");

    let structure_reply = provider
        .analyze_image(image, prompts::STRUCTURE_ANALYSIS, api_key)
        .await
        .map_err(provider_failure)?;
    let stroke_reply = provider
        .analyze_image(image, prompts::STROKE_ANALYSIS, api_key)
        .await
        .map_err(provider_failure)?;
    let comment_prompt = prompts::comment_generator(&structure_reply, &stroke_reply);
    let comment_reply = provider
        .analyze_image(image, &comment_prompt, api_key)
        .await
        .map_err(provider_failure)?;

    Ok(compose_multi_agent(
        task_id,
        &structure_reply,
        &stroke_reply,
        &comment_reply,
    ))
}

fn compose_multi_agent(
    task_id: &str,
    structure_reply: &str,
    stroke_reply: &str,
    comment_reply: &str,
) -> SingleCharResult {
    let structure = json_repair::parse_json_lenient(structure_reply).unwrap_or_default();
    let stroke = json_repair::parse_json_lenient(stroke_reply).unwrap_or_default();
    let comment = json_repair::parse_json_lenient(comment_reply).unwrap_or_default();

    let int = |value: &serde_json::Value, key: &str| clamp_score(value[key].as_i64().unwrap_or(60));
    let text = |value: &serde_json::Value, key: &str, default: &str| {
        value[key]
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| default.to_owned())
    };

    SingleCharResult {
        task_id: task_id.to_owned(),
        recognized_char: "?".into(),
        structure_score: int(&structure, "structureScore"),
        structure_detail: text(&structure, "structureComment", "暂无评价"),
        stroke_score: int(&stroke, "strokeScore"),
        stroke_detail: text(&stroke, "strokeComment", "暂无评价"),
        balance_score: 60,
        spacing_score: 60,
        overall_score: int(&comment, "overallScore"),
        overall_comment: text(&comment, "overallComment", "继续加油！"),
        suggestion: text(&comment, "suggestion", "多加练习"),
        ..Default::default()
    }
}
