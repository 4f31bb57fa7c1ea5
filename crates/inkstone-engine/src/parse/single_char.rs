//! Single-character critique parser.
//!
//! Expected template:
//!
//! ```text
//! 字：永
//! 结构：82 分 | 笔画：78 分 | 重心：85 分 | 间架：80 分 | 综合：81 分
//! 【结构分析】...
//! 【笔画分析】...
//! 【重心分析】...
//! 【间架分析】...
//! 【总评】...
//! 【练习建议】...
//! ```
//!
//! Section bodies are truncated to 500 characters; absent fields fall back
//! to their defaults rather than failing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use inkstone_types::dto::{SingleCharResult, clamp_score};

use crate::parse::{section_after, truncate_chars};

const DEFAULT_SCORE: i64 = 60;
const DEFAULT_CHAR: &str = "?";
const MAX_SECTION_CHARS: usize = 500;

static RECOGNIZED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*字[：:]\s*(\S)").unwrap());
static RECOGNIZED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"字[：:]\s*(\S)").unwrap());
static FIVE_SCORES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"结构[：:]\s*(\d+)\s*分\s*[|│]\s*笔画[：:]\s*(\d+)\s*分\s*[|│]\s*重心[：:]\s*(\d+)\s*分\s*[|│]\s*间架[：:]\s*(\d+)\s*分\s*[|│]\s*综合[：:]\s*(\d+)\s*分",
    )
    .unwrap()
});

/// Parse a single-character critique into a [`SingleCharResult`].
/// Never fails.
pub fn parse_single_char(text: &str, task_id: &str) -> SingleCharResult {
    let recognized = RECOGNIZED_LINE
        .captures(text)
        .or_else(|| RECOGNIZED_ANY.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|| DEFAULT_CHAR.to_owned());

    let scores = FIVE_SCORES.captures(text);
    let score = |group: usize| -> i32 {
        scores
            .as_ref()
            .and_then(|c| c.get(group))
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .map(clamp_score)
            .unwrap_or(DEFAULT_SCORE as i32)
    };

    let section = |marker: &str| -> String {
        truncate_chars(
            &section_after(text, marker).unwrap_or_default(),
            MAX_SECTION_CHARS,
        )
    };

    let result = SingleCharResult {
        task_id: task_id.to_owned(),
        recognized_char: recognized,
        structure_score: score(1),
        structure_detail: section("【结构分析】"),
        stroke_score: score(2),
        stroke_detail: section("【笔画分析】"),
        balance_score: score(3),
        balance_detail: section("【重心分析】"),
        spacing_score: score(4),
        spacing_detail: section("【间架分析】"),
        overall_score: score(5),
        overall_comment: section("【总评】"),
        suggestion: section("【练习建议】"),
        ..Default::default()
    };

    info!(
        recognized = %result.recognized_char,
        overall = result.overall_score,
        "single-char critique parsed"
    );
    result
}
