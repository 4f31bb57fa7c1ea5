//! Repair path for legacy JSON replies.
//!
//! Earlier prompt revisions asked for JSON, and long replies routinely came
//! back truncated mid-string. Recovery runs in three steps: parse as-is,
//! parse after structural repair, then a regex last resort that pulls out
//! whatever top-level `"key": value` pairs survive.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use inkstone_types::dto::{BatchResult, CharAnalysis, clamp_score};

static CHAR_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""char"\s*:\s*"([^"]+)""#).unwrap());
static DANGLING_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#",\s*"[^"]*"\s*:?\s*$"#).unwrap());
static TRAILING_JUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[,:\s]+$").unwrap());

/// Strip markdown fences and leading prose so the payload starts at JSON.
pub fn clean_json_response(response: &str) -> String {
    let mut cleaned = response.trim();

    if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let mut cleaned = cleaned.trim().to_owned();

    if !cleaned.starts_with('{') && !cleaned.starts_with('[') {
        if let Some(brace) = cleaned.find('{') {
            cleaned = cleaned[brace..].to_owned();
        }
    }

    if cleaned.is_empty() {
        "{}".to_owned()
    } else {
        cleaned
    }
}

/// Close a truncated JSON document: terminate an open string, drop a
/// dangling key, then close brackets in LIFO order.
pub fn repair_truncated_json(json: &str) -> String {
    if json.is_empty() {
        return "{}".to_owned();
    }

    let mut work = json.to_owned();

    // Unterminated string at the end of input.
    let mut in_string = false;
    let mut escaped = false;
    for c in work.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }
    if in_string {
        work.push('"');
    }

    // A key with no value, then any trailing comma/colon/whitespace.
    work = DANGLING_KEY.replace(&work, "").into_owned();
    work = TRAILING_JUNK.replace(&work, "").into_owned();

    // Track unclosed brackets with a stack so closers come out inner-first.
    let mut stack: Vec<char> = Vec::new();
    in_string = false;
    escaped = false;
    for c in work.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    while let Some(closer) = stack.pop() {
        work.push(closer);
    }

    work
}

/// Clean + parse, with one repair attempt. `None` when nothing salvages.
pub fn parse_json_lenient(text: &str) -> Option<serde_json::Value> {
    let cleaned = clean_json_response(text);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    debug!("JSON incomplete, attempting structural repair");
    serde_json::from_str(&repair_truncated_json(&cleaned)).ok()
}

/// Regex pull of an integer field: `"key": 42`.
pub fn extract_int(text: &str, key: &str, default: i64) -> i64 {
    Regex::new(&format!(r#""{key}"\s*:\s*(\d+)"#))
        .ok()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(default)
}

/// Regex pull of a string field: `"key": "value"`.
pub fn extract_string(text: &str, key: &str, default: &str) -> String {
    Regex::new(&format!(r#""{key}"\s*:\s*"([^"]+)""#))
        .ok()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .unwrap_or_else(|| default.to_owned())
}

/// Parse a legacy JSON whole-page reply into a [`BatchResult`].
pub fn parse_batch_from_json(text: &str, task_id: &str) -> BatchResult {
    match parse_json_lenient(text) {
        Some(json) => batch_from_value(&json, task_id),
        None => {
            info!("JSON unrecoverable, extracting fields by regex");
            batch_from_regex(&clean_json_response(text), task_id)
        }
    }
}

fn batch_from_value(json: &serde_json::Value, task_id: &str) -> BatchResult {
    let int = |key: &str, default: i64| json[key].as_i64().unwrap_or(default);
    let text = |key: &str, default: &str| {
        json[key]
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| default.to_owned())
    };

    let mut analyses = Vec::new();
    if let Some(problems) = json["problemChars"].as_array() {
        for node in problems {
            // Entries truncated down to nothing useful are skipped.
            let Some(name) = node["char"].as_str().filter(|s| !s.is_empty()) else {
                continue;
            };
            let field_int =
                |key: &str| clamp_score(node[key].as_i64().unwrap_or(60));
            let field_text = |key: &str, default: &str| {
                node[key]
                    .as_str()
                    .map(str::to_owned)
                    .unwrap_or_else(|| default.to_owned())
            };
            analyses.push(CharAnalysis {
                char_index: analyses.len() as i32,
                recognized_char: name.to_owned(),
                structure_score: field_int("structureScore"),
                structure_comment: field_text("structureComment", "暂无详细分析"),
                stroke_score: field_int("strokeScore"),
                stroke_comment: field_text("strokeComment", "暂无详细分析"),
                overall_score: field_int("overallScore"),
                overall_comment: field_text("overallComment", "继续加油"),
                suggestion: field_text("suggestion", "多加练习"),
                ..Default::default()
            });
        }
    }

    BatchResult {
        task_id: task_id.to_owned(),
        total_characters: int("totalCharCount", 0) as i32,
        analyses,
        avg_structure_score: clamp_score(int("overallStructureScore", 60)),
        avg_stroke_score: clamp_score(int("overallStrokeScore", 60)),
        avg_overall_score: clamp_score(int("overallScore", 60)),
        summary_comment: text("summaryComment", "继续加油练习！"),
        ..Default::default()
    }
}

fn batch_from_regex(text: &str, task_id: &str) -> BatchResult {
    let structure = clamp_score(extract_int(text, "overallStructureScore", 60));
    let stroke = clamp_score(extract_int(text, "overallStrokeScore", 60));
    let overall = clamp_score(extract_int(text, "overallScore", 60));

    let mut analyses = Vec::new();
    for captures in CHAR_NAME.captures_iter(text) {
        analyses.push(CharAnalysis {
            char_index: analyses.len() as i32,
            recognized_char: captures[1].to_owned(),
            structure_score: structure,
            structure_comment: "AI 输出被截断，暂无详细分析".into(),
            stroke_score: stroke,
            stroke_comment: "AI 输出被截断，暂无详细分析".into(),
            overall_score: overall,
            overall_comment: "此字需要重点练习".into(),
            suggestion: "建议对照字帖仔细观察后重新书写".into(),
            ..Default::default()
        });
    }

    BatchResult {
        task_id: task_id.to_owned(),
        total_characters: extract_int(text, "totalCharCount", 0) as i32,
        analyses,
        avg_structure_score: structure,
        avg_stroke_score: stroke,
        avg_overall_score: overall,
        summary_comment: extract_string(text, "summaryComment", "AI 分析结果不完整，请重新提交。"),
        ..Default::default()
    }
}
