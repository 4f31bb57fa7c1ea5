//! HTTP request handlers for homework grading.
//!
//! Three grading modes share this surface: free whole-page (no template),
//! template whole-page (deterministic grid crops attached), and single
//! character deep critique. Each comes in blocking and SSE-streaming form.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use inkstone_engine::attach_character_images;
use inkstone_engine::event::{GradeEvent, GradeOutcome};
use inkstone_types::dto::{BatchResult, CopybookTemplate, GradeMode, SingleCharResult};
use inkstone_types::{ApiResponse, GradeError, id};

use super::{ApiError, AppState};
use crate::store::{HomeworkRecord, KeyUsageRecord};

/// Parsed multipart upload.
#[derive(Default)]
struct UploadForm {
    file_name: String,
    bytes: Vec<u8>,
    template_id: Option<i64>,
    user_id: Option<i64>,
    copybook_id: Option<String>,
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError(GradeError::FileTooLarge)
    } else {
        ApiError(GradeError::AnalyzeFailed(err.body_text()))
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm::default();
    let mut saw_file = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_owned();
        match name.as_str() {
            "file" => {
                saw_file = true;
                form.file_name = field.file_name().unwrap_or("upload.jpg").to_owned();
                form.bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
            }
            "templateId" => {
                form.template_id = field.text().await.ok().and_then(|v| v.trim().parse().ok());
            }
            "userId" => {
                form.user_id = field.text().await.ok().and_then(|v| v.trim().parse().ok());
            }
            "copyBookId" => {
                form.copybook_id = field.text().await.ok().filter(|v| !v.trim().is_empty());
            }
            _ => {}
        }
    }

    if !saw_file {
        return Err(ApiError(GradeError::AnalyzeFailed("缺少 file 字段".into())));
    }
    Ok(form)
}

async fn flood_exceeded(state: &AppState, user_id: Option<i64>) -> bool {
    // Anonymous uploads bypass the flood limiter.
    let Some(user_id) = user_id else {
        return false;
    };
    match state
        .store
        .count_recent_calls(user_id, state.config.flood_window_minutes)
        .await
    {
        Ok(count) => count >= state.config.flood_max_calls,
        Err(err) => {
            warn!(error = %err, "flood check failed, allowing request");
            false
        }
    }
}

async fn flood_check(state: &AppState, user_id: Option<i64>) -> Result<(), ApiError> {
    if flood_exceeded(state, user_id).await {
        Err(ApiError(GradeError::RateLimited))
    } else {
        Ok(())
    }
}

async fn resolve_template(state: &AppState, template_id: Option<i64>) -> Option<CopybookTemplate> {
    let id = template_id?;
    match state.store.find_template(id).await {
        Ok(template) => {
            if template.is_none() {
                warn!(template = id, "unknown template id, grading without crops");
            }
            template
        }
        Err(err) => {
            warn!(error = %err, "template lookup failed, grading without crops");
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn log_usage(
    state: &AppState,
    task_id: Option<String>,
    user_id: Option<i64>,
    mode: GradeMode,
    char_count: i32,
    latency_ms: i64,
    success: bool,
    error_message: Option<String>,
) {
    let record = KeyUsageRecord {
        task_id,
        user_id,
        provider: state.engine.provider_name().to_owned(),
        mode,
        char_count,
        latency_ms,
        success,
        error_message,
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    if let Err(err) = state.store.log_key_usage(record).await {
        warn!(error = %err, "key usage logging failed");
    }
}

async fn persist_whole_page(
    state: &AppState,
    result: &BatchResult,
    file_name: &str,
    user_id: Option<i64>,
    copybook_id: Option<String>,
) {
    if let Err(err) = state
        .store
        .save_result(result, file_name, user_id, copybook_id)
        .await
    {
        warn!(error = %err, "result persistence failed (response unaffected)");
    }
    log_usage(
        state,
        Some(result.task_id.clone()),
        user_id,
        GradeMode::WholePage,
        result.total_characters,
        result.processing_time_ms,
        true,
        None,
    )
    .await;
}

async fn persist_single(state: &AppState, result: &SingleCharResult, user_id: Option<i64>) {
    if let Err(err) = state.store.save_single_result(result, user_id).await {
        warn!(error = %err, "single result persistence failed (response unaffected)");
    }
    log_usage(
        state,
        Some(result.task_id.clone()),
        user_id,
        GradeMode::SingleChar,
        1,
        result.processing_time_ms,
        true,
        None,
    )
    .await;
}

fn sse_response(
    rx: mpsc::UnboundedReceiver<GradeEvent>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = UnboundedReceiverStream::new(rx)
        .map(|event| Ok(Event::default().event(event.name()).data(event.payload())));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

// ── Template listing ────────────────────────────────────────────────────

pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CopybookTemplate>>>, ApiError> {
    state
        .store
        .list_templates()
        .await
        .map(|templates| Json(ApiResponse::ok(templates)))
        .map_err(|err| ApiError(GradeError::Fatal(err.to_string())))
}

// ── Whole-page grading ──────────────────────────────────────────────────

/// Blocking whole-page grading.
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<BatchResult>>, ApiError> {
    let form = read_upload(multipart).await?;
    info!(
        file = %form.file_name,
        bytes = form.bytes.len(),
        template = ?form.template_id,
        user = ?form.user_id,
        "analyze request"
    );

    flood_check(&state, form.user_id).await?;
    let template = resolve_template(&state, form.template_id).await;

    let started = Instant::now();
    match state.engine.grade_whole_page(&form.bytes).await {
        Ok(mut result) => {
            result.image_id = id::with_prefix("img");
            if let Some(template) = &template {
                attach_character_images(&mut result, &form.bytes, template);
            }
            persist_whole_page(
                &state,
                &result,
                &form.file_name,
                form.user_id,
                form.copybook_id,
            )
            .await;
            Ok(Json(ApiResponse::ok_with_message(result, "批改完成")))
        }
        Err(err) => {
            error!(error = %err, "analyze failed");
            log_usage(
                &state,
                None,
                form.user_id,
                GradeMode::WholePage,
                0,
                started.elapsed().as_millis() as i64,
                false,
                Some(err.to_string()),
            )
            .await;
            Err(ApiError(err))
        }
    }
}

/// SSE-streaming whole-page grading.
pub async fn analyze_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let form = read_upload(multipart).await?;
    info!(
        file = %form.file_name,
        bytes = form.bytes.len(),
        template = ?form.template_id,
        user = ?form.user_id,
        "streaming analyze request"
    );

    let (client_tx, client_rx) = mpsc::unbounded_channel();

    if flood_exceeded(&state, form.user_id).await {
        let _ = client_tx.send(GradeEvent::Error(GradeError::RateLimited.user_message()));
        return Ok(sse_response(client_rx));
    }

    let template = resolve_template(&state, form.template_id).await;
    let deadline = Duration::from_secs(state.config.stream_timeout_seconds);

    tokio::spawn(async move {
        let engine = Arc::clone(&state.engine);
        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();

        let run = engine.grade_whole_page_stream(form.bytes.clone(), engine_tx);
        let forward = async {
            while let Some(event) = engine_rx.recv().await {
                let event = match event {
                    GradeEvent::Result(GradeOutcome::WholePage(mut result)) => {
                        result.image_id = id::with_prefix("img");
                        if let Some(template) = &template {
                            attach_character_images(&mut result, &form.bytes, template);
                        }
                        persist_whole_page(
                            &state,
                            &result,
                            &form.file_name,
                            form.user_id,
                            form.copybook_id.clone(),
                        )
                        .await;
                        GradeEvent::Result(GradeOutcome::WholePage(result))
                    }
                    other => other,
                };
                // Send failures mean the client disconnected; keep draining
                // so the upstream call still completes and persists.
                let _ = client_tx.send(event);
            }
        };

        if tokio::time::timeout(deadline, async {
            tokio::join!(run, forward);
        })
        .await
        .is_err()
        {
            warn!("streaming request deadline reached, completing stream");
        }
    });

    Ok(sse_response(client_rx))
}

// ── Single-character grading ────────────────────────────────────────────

/// Blocking single-character grading.
pub async fn analyze_single(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SingleCharResult>>, ApiError> {
    let form = read_upload(multipart).await?;
    info!(file = %form.file_name, bytes = form.bytes.len(), user = ?form.user_id, "single analyze request");

    flood_check(&state, form.user_id).await?;

    let started = Instant::now();
    match state.engine.grade_single_char(&form.bytes).await {
        Ok(result) => {
            persist_single(&state, &result, form.user_id).await;
            Ok(Json(ApiResponse::ok_with_message(result, "单字精批完成")))
        }
        Err(err) => {
            error!(error = %err, "single analyze failed");
            log_usage(
                &state,
                None,
                form.user_id,
                GradeMode::SingleChar,
                0,
                started.elapsed().as_millis() as i64,
                false,
                Some(err.to_string()),
            )
            .await;
            Err(ApiError(err))
        }
    }
}

/// SSE-streaming single-character grading.
pub async fn analyze_single_stream(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let form = read_upload(multipart).await?;
    info!(file = %form.file_name, bytes = form.bytes.len(), user = ?form.user_id, "streaming single analyze request");

    let (client_tx, client_rx) = mpsc::unbounded_channel();

    if flood_exceeded(&state, form.user_id).await {
        let _ = client_tx.send(GradeEvent::Error(GradeError::RateLimited.user_message()));
        return Ok(sse_response(client_rx));
    }

    let deadline = Duration::from_secs(state.config.stream_timeout_seconds);

    tokio::spawn(async move {
        let engine = Arc::clone(&state.engine);
        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();

        let run = engine.grade_single_char_stream(form.bytes.clone(), engine_tx);
        let forward = async {
            while let Some(event) = engine_rx.recv().await {
                let event = match event {
                    GradeEvent::Result(GradeOutcome::SingleChar(result)) => {
                        persist_single(&state, &result, form.user_id).await;
                        GradeEvent::Result(GradeOutcome::SingleChar(result))
                    }
                    other => other,
                };
                let _ = client_tx.send(event);
            }
        };

        if tokio::time::timeout(deadline, async {
            tokio::join!(run, forward);
        })
        .await
        .is_err()
        {
            warn!("streaming request deadline reached, completing stream");
        }
    });

    Ok(sse_response(client_rx))
}

// ── Queries ─────────────────────────────────────────────────────────────

/// Stored whole-page result by task id.
pub async fn get_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<BatchResult>>, ApiError> {
    match state.store.find_by_task_id(&task_id).await {
        Ok(Some(result)) => Ok(Json(ApiResponse::ok(result))),
        Ok(None) => Err(ApiError(GradeError::NotFound(task_id))),
        Err(err) => Err(ApiError(GradeError::Fatal(err.to_string()))),
    }
}

/// A user's recent submissions.
pub async fn get_history(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<HomeworkRecord>>>, ApiError> {
    state
        .store
        .find_recent_homeworks(user_id)
        .await
        .map(|records| Json(ApiResponse::ok(records)))
        .map_err(|err| ApiError(GradeError::Fatal(err.to_string())))
}

/// Score trail for one character across a user's history.
pub async fn get_growth(
    State(state): State<AppState>,
    Path((user_id, char_name)): Path<(i64, String)>,
) -> Result<Json<ApiResponse<Vec<inkstone_types::dto::CharAnalysis>>>, ApiError> {
    state
        .store
        .growth_curve(user_id, &char_name)
        .await
        .map(|curve| Json(ApiResponse::ok(curve)))
        .map_err(|err| ApiError(GradeError::Fatal(err.to_string())))
}
