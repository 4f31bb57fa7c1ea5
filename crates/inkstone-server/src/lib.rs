//! HTTP surface and persistence wiring for the inkstone grading service.
//!
//! All endpoints live under `/api/homework`. Non-stream responses use the
//! `{code, message, data}` envelope; the two `-stream` endpoints speak SSE
//! with `start` / `thinking` / `token` / `result` / `error` events.

pub mod api;
pub mod store;
pub mod templates;

pub use api::{AppState, api_routes};
pub use store::{HomeworkRecord, JsonlResultStore, KeyUsageRecord, ResultStore};
