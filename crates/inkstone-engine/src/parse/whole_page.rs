//! Whole-page critique parser.
//!
//! Expected template (CJK and ASCII punctuation are interchangeable):
//!
//! ```text
//! 共识别 20 个汉字（4 行 5 列）：飞,流,直,...
//! 结构：73 分 | 笔画：71 分 | 综合：73 分
//! 【重点点评】
//! 1.「疑」（第3行第3列，综合 61 分）
//! 结构（62 分）：左右失衡
//! 笔画（60 分）：撇画软弱
//! 建议：对照字帖临摹
//! 【总评】整体有进步，继续努力！
//! ```
//!
//! A problem-character block spans from its numbered header to the next
//! header or the `【总评】` marker. Replies that are JSON (legacy prompt
//! revisions) are routed through the repair path instead.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use inkstone_types::dto::{BatchResult, CharAnalysis, clamp_score};

use crate::parse::json_repair;
use crate::parse::{section_after, truncate_chars};

const DEFAULT_SCORE: i64 = 60;
const DEFAULT_SUMMARY: &str = "继续加油练习！";
const DEFAULT_DETAIL: &str = "暂无分析";
const DEFAULT_SUGGESTION: &str = "多加练习";
const SUMMARY_MARKER: &str = "【总评】";
const MAX_SUMMARY_CHARS: usize = 200;

static OVERVIEW_GRID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"共识别\s*(\d+)\s*个汉字\s*[（(]\s*(\d+)\s*行\s*(\d+)\s*列\s*[）)]").unwrap()
});
static OVERVIEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"共识别\s*(\d+)\s*个汉字").unwrap());
static PAGE_SCORES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"结构[：:]\s*(\d+)\s*分\s*[|│]\s*笔画[：:]\s*(\d+)\s*分\s*[|│]\s*综合[：:]\s*(\d+)\s*分",
    )
    .unwrap()
});
static CHAR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\d+\s*[.、．]\s*「([^」\n]+)」[^\n]*?综合\s*(\d+)\s*分").unwrap()
});
static ROW_COL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*(\d+)\s*行\s*第\s*(\d+)\s*列").unwrap());
static STRUCT_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"结构\s*[（(]\s*(\d+)\s*分\s*[）)]\s*[：:]\s*([^\n]+)").unwrap()
});
static STROKE_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"笔画\s*[（(]\s*(\d+)\s*分\s*[）)]\s*[：:]\s*([^\n]+)").unwrap()
});
static SUGGESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"建议[：:]\s*([^\n]+)").unwrap());

/// Parse a whole-page critique into a [`BatchResult`]. Never fails.
pub fn parse_whole_page(text: &str, task_id: &str) -> BatchResult {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with("```") {
        debug!("reply looks like JSON, using repair path");
        return json_repair::parse_batch_from_json(text, task_id);
    }
    parse_readable(text, task_id)
}

fn parse_readable(text: &str, task_id: &str) -> BatchResult {
    let (total_characters, grid_rows, grid_cols) = parse_overview(text);
    let (avg_structure, avg_stroke, avg_overall) = parse_page_scores(text);
    let summary = parse_summary(text);
    let analyses = parse_problem_chars(text);

    info!(
        total = total_characters,
        rows = grid_rows,
        cols = grid_cols,
        problems = analyses.len(),
        "whole-page critique parsed"
    );

    BatchResult {
        task_id: task_id.to_owned(),
        total_characters,
        grid_rows,
        grid_cols,
        analyses,
        avg_structure_score: avg_structure,
        avg_stroke_score: avg_stroke,
        avg_overall_score: avg_overall,
        summary_comment: summary,
        ..Default::default()
    }
}

fn capture_int(captures: &regex::Captures<'_>, group: usize, default: i64) -> i64 {
    captures
        .get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(default)
}

fn parse_overview(text: &str) -> (i32, i32, i32) {
    if let Some(captures) = OVERVIEW_GRID.captures(text) {
        return (
            capture_int(&captures, 1, 0) as i32,
            capture_int(&captures, 2, 0) as i32,
            capture_int(&captures, 3, 0) as i32,
        );
    }
    if let Some(captures) = OVERVIEW.captures(text) {
        return (capture_int(&captures, 1, 0) as i32, 0, 0);
    }
    (0, 0, 0)
}

fn parse_page_scores(text: &str) -> (i32, i32, i32) {
    match PAGE_SCORES.captures(text) {
        Some(captures) => (
            clamp_score(capture_int(&captures, 1, DEFAULT_SCORE)),
            clamp_score(capture_int(&captures, 2, DEFAULT_SCORE)),
            clamp_score(capture_int(&captures, 3, DEFAULT_SCORE)),
        ),
        None => (
            DEFAULT_SCORE as i32,
            DEFAULT_SCORE as i32,
            DEFAULT_SCORE as i32,
        ),
    }
}

fn parse_summary(text: &str) -> String {
    let summary = section_after(text, SUMMARY_MARKER).unwrap_or_default();
    if summary.is_empty() {
        return DEFAULT_SUMMARY.to_owned();
    }
    truncate_chars(&summary, MAX_SUMMARY_CHARS)
}

fn parse_problem_chars(text: &str) -> Vec<CharAnalysis> {
    // Blocks never extend past the summary.
    let scan_end = text.find(SUMMARY_MARKER).unwrap_or(text.len());
    let scan = &text[..scan_end];

    let headers: Vec<regex::Captures<'_>> = CHAR_HEADER.captures_iter(scan).collect();
    let mut analyses = Vec::with_capacity(headers.len());

    for (index, captures) in headers.iter().enumerate() {
        let whole = captures.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let block_end = headers
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(scan.len());
        let header_text = &scan[whole.0..whole.1];
        let block = &scan[whole.1..block_end];

        let (row, column) = match ROW_COL.captures(header_text) {
            Some(rc) => (
                capture_int(&rc, 1, 0) as i32,
                capture_int(&rc, 2, 0) as i32,
            ),
            None => (0, 0),
        };

        let (structure_score, structure_comment) = detail_of(&STRUCT_DETAIL, block);
        let (stroke_score, stroke_comment) = detail_of(&STROKE_DETAIL, block);
        let suggestion = SUGGESTION
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_owned())
            .unwrap_or_else(|| DEFAULT_SUGGESTION.to_owned());

        analyses.push(CharAnalysis {
            char_index: index as i32,
            recognized_char: captures
                .get(1)
                .map(|m| m.as_str().to_owned())
                .unwrap_or_default(),
            row,
            column,
            structure_score,
            structure_comment,
            stroke_score,
            stroke_comment,
            overall_score: clamp_score(capture_int(captures, 2, DEFAULT_SCORE)),
            suggestion,
            ..Default::default()
        });
    }

    analyses
}

fn detail_of(pattern: &Regex, block: &str) -> (i32, String) {
    match pattern.captures(block) {
        Some(captures) => (
            clamp_score(capture_int(&captures, 1, DEFAULT_SCORE)),
            captures
                .get(2)
                .map(|m| m.as_str().trim().to_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_DETAIL.to_owned()),
        ),
        None => (DEFAULT_SCORE as i32, DEFAULT_DETAIL.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "\
共识别 20 个汉字（4 行 5 列）：飞,流,直,下,三,千,尺,疑,是,银,河,落,九,天,白,日,依,山,尽,黄
结构：73 分 | 笔画：71 分 | 综合：73 分
【重点点评】
1.「疑」（第3行第3列，综合 61 分）
结构（62 分）：左右失衡，\"匕\"偏高
笔画（60 分）：撇画软弱
建议：对照字帖临摹
【总评】整体有进步，继续努力！";

    #[test]
    fn canonical_critique() {
        let result = parse_whole_page(CANONICAL, "task-1");
        assert_eq!(result.task_id, "task-1");
        assert_eq!(result.total_characters, 20);
        assert_eq!(result.grid_rows, 4);
        assert_eq!(result.grid_cols, 5);
        assert_eq!(result.avg_structure_score, 73);
        assert_eq!(result.avg_stroke_score, 71);
        assert_eq!(result.avg_overall_score, 73);
        assert_eq!(result.summary_comment, "整体有进步，继续努力！");

        assert_eq!(result.analyses.len(), 1);
        let analysis = &result.analyses[0];
        assert_eq!(analysis.recognized_char, "疑");
        assert_eq!(analysis.row, 3);
        assert_eq!(analysis.column, 3);
        assert_eq!(analysis.overall_score, 61);
        assert_eq!(analysis.structure_score, 62);
        assert_eq!(analysis.stroke_score, 60);
        assert_eq!(analysis.suggestion, "对照字帖临摹");
    }

    #[test]
    fn parse_is_idempotent() {
        let first = parse_whole_page(CANONICAL, "task-1");
        let second = parse_whole_page(CANONICAL, "task-1");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_overview_defaults_to_zero() {
        let text = "\
结构：80 分 | 笔画：82 分 | 综合：81 分
【重点点评】
1.「永」（第1行第1列，综合 70 分）
建议：注意捺脚
【总评】不错";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.total_characters, 0);
        assert_eq!(result.grid_rows, 0);
        assert_eq!(result.grid_cols, 0);
        // Analyses stay populated independently of the overview.
        assert_eq!(result.analyses.len(), 1);
    }

    #[test]
    fn overview_without_grid_falls_back() {
        let text = "共识别 12 个汉字：永,和,九,年";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.total_characters, 12);
        assert_eq!(result.grid_rows, 0);
        assert_eq!(result.grid_cols, 0);
    }

    #[test]
    fn missing_scores_default_to_sixty() {
        let result = parse_whole_page("共识别 5 个汉字：一,二,三,四,五", "t");
        assert_eq!(result.avg_structure_score, 60);
        assert_eq!(result.avg_stroke_score, 60);
        assert_eq!(result.avg_overall_score, 60);
        assert_eq!(result.summary_comment, "继续加油练习！");
        assert!(result.analyses.is_empty());
    }

    #[test]
    fn header_without_row_col_keeps_zero_position() {
        let text = "\
共识别 3 个汉字：大,小,中
结构：70 分 | 笔画：70 分 | 综合：70 分
1.「大」综合 55 分
建议：横画放平
【总评】加油";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.analyses.len(), 1);
        assert_eq!(result.analyses[0].row, 0);
        assert_eq!(result.analyses[0].column, 0);
        assert_eq!(result.analyses[0].overall_score, 55);
        assert_eq!(result.analyses[0].structure_comment, "暂无分析");
    }

    #[test]
    fn multiple_problem_chars_in_discovery_order() {
        let text = "\
共识别 10 个汉字（2 行 5 列）：山,高,水,长,风,清,月,明,花,好
结构：75 分 | 笔画：74 分 | 综合：75 分
【重点点评】
1.「山」（第1行第1列，综合 60 分）
结构（58 分）：中竖偏右
笔画（61 分）：竖画无力
建议：先写中竖定轴
2.「月」（第2行第3列，综合 65 分）
结构（66 分）：内横间距不匀
笔画（64 分）：竖撇生硬
建议：放慢行笔
【总评】布局整齐，细节需打磨。";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.analyses.len(), 2);
        assert_eq!(result.analyses[0].recognized_char, "山");
        assert_eq!(result.analyses[0].char_index, 0);
        assert_eq!(result.analyses[1].recognized_char, "月");
        assert_eq!(result.analyses[1].char_index, 1);
        assert_eq!(result.analyses[1].row, 2);
        assert_eq!(result.analyses[1].column, 3);
        assert_eq!(result.analyses[1].suggestion, "放慢行笔");
    }

    #[test]
    fn summary_truncated_to_200_chars() {
        let long = "好".repeat(300);
        let text = format!("共识别 1 个汉字：好\n【总评】{long}");
        let result = parse_whole_page(&text, "t");
        assert_eq!(result.summary_comment.chars().count(), 200);
    }

    #[test]
    fn ascii_punctuation_variants_accepted() {
        let text = "\
共识别 4 个汉字(2 行 2 列)：天,地,人,和
结构:68 分 | 笔画:70 分 | 综合:69 分
1.「天」(第1行第2列，综合 62 分)
建议:撇捺对称
【总评】继续保持";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.grid_rows, 2);
        assert_eq!(result.avg_overall_score, 69);
        assert_eq!(result.analyses[0].row, 1);
        assert_eq!(result.analyses[0].column, 2);
    }

    #[test]
    fn scores_clamped_at_dto_boundary() {
        let text = "\
共识别 1 个汉字：一
结构：120 分 | 笔画：71 分 | 综合：73 分";
        let result = parse_whole_page(text, "t");
        assert_eq!(result.avg_structure_score, 100);
    }

    #[test]
    fn json_reply_routes_through_repair_path() {
        let text = r#"{"totalCharCount": 8, "overallScore": 77, "summaryComment": "很棒"}"#;
        let result = parse_whole_page(text, "t");
        assert_eq!(result.total_characters, 8);
        assert_eq!(result.avg_overall_score, 77);
        assert_eq!(result.summary_comment, "很棒");
    }
}
