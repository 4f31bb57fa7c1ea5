//! Per-request grading orchestration.
//!
//! The [`GradingEngine`] drives one end-to-end grading request: image
//! preconditioning, the (streamed or blocking) upstream vision call through
//! the dispatch layer, heartbeat fill during model think time, critique
//! parsing, and deterministic grid cropping.
//!
//! # Event contract (streaming)
//!
//! Per request: `start`, zero or more `thinking` (strictly before any
//! `token`), zero or more `token` in upstream order, then exactly one of
//! `result` / `error`.

pub mod cropper;
pub mod engine;
pub mod event;
pub mod heartbeat;
pub mod parse;
pub mod preprocess;
pub mod prompts;

pub use cropper::attach_character_images;
pub use engine::GradingEngine;
pub use event::{GradeEvent, GradeOutcome};

/// Current time formatted the way results and the store record it.
pub(crate) fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
