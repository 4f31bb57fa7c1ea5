//! Grading result DTOs exchanged with clients.
//!
//! Field names serialize in camelCase to match the web frontend. Scores are
//! clamped to `0..=100` here, at the DTO boundary -- the parsers accept
//! whatever integer the model emits and clamp when building these structs.

use serde::{Deserialize, Serialize};

/// Clamp a raw model score into the displayable `0..=100` range.
pub fn clamp_score(raw: i64) -> i32 {
    raw.clamp(0, 100) as i32
}

/// Which grading pipeline a task runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradeMode {
    /// One photograph of a full worksheet, one upstream call.
    WholePage,
    /// A close-up of a single character, deep multi-dimension critique.
    SingleChar,
}

/// Aggregated critique for one whole-page grading task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Grading task id (`task-` prefix).
    pub task_id: String,

    /// Id assigned to the uploaded image (`img-` prefix).
    #[serde(default)]
    pub image_id: String,

    /// Character count parsed from the overview line; 0 when absent.
    /// Never re-derived from `analyses.len()`.
    pub total_characters: i32,

    /// Grid rows parsed from the overview line; 0 when absent.
    #[serde(default)]
    pub grid_rows: i32,

    /// Grid columns parsed from the overview line; 0 when absent.
    #[serde(default)]
    pub grid_cols: i32,

    /// Per-character critiques for the problem characters (typically 0-5).
    pub analyses: Vec<CharAnalysis>,

    /// Page-level structure score (0-100).
    pub avg_structure_score: i32,

    /// Page-level stroke score (0-100).
    pub avg_stroke_score: i32,

    /// Page-level overall score (0-100).
    pub avg_overall_score: i32,

    /// Page-level summary comment (at most 200 chars).
    pub summary_comment: String,

    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: i64,

    /// Creation timestamp, formatted `YYYY-MM-DD HH:MM:SS`.
    pub created_at: String,
}

/// Critique of one character within a whole-page result.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CharAnalysis {
    /// Position of this entry in the problem-character list.
    pub char_index: i32,

    /// The recognized character, when the model could identify it.
    #[serde(default)]
    pub recognized_char: String,

    /// Grid row, 1-based top-down; 0 means unknown.
    #[serde(default)]
    pub row: i32,

    /// Grid column, 1-based left-to-right; 0 means unknown.
    #[serde(default)]
    pub column: i32,

    /// Structure score (0-100): balance, frame, proportion.
    pub structure_score: i32,

    /// Structure critique detail.
    pub structure_comment: String,

    /// Stroke score (0-100): entry, travel, exit quality.
    pub stroke_score: i32,

    /// Stroke critique detail.
    pub stroke_comment: String,

    /// Overall score (0-100).
    pub overall_score: i32,

    /// Overall comment, encouraging in tone.
    #[serde(default)]
    pub overall_comment: String,

    /// Concrete practice suggestion.
    pub suggestion: String,

    /// PNG crop of this character's grid cell, base64-encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_image_base64: Option<String>,
}

/// Deep critique of a single uploaded character.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleCharResult {
    /// Grading task id (`single-` prefix).
    pub task_id: String,

    /// The recognized character; `"?"` when unidentifiable.
    pub recognized_char: String,

    pub structure_score: i32,
    pub structure_detail: String,

    pub stroke_score: i32,
    pub stroke_detail: String,

    /// Center-of-gravity balance.
    pub balance_score: i32,
    pub balance_detail: String,

    /// Frame-and-spacing layout.
    pub spacing_score: i32,
    pub spacing_detail: String,

    pub overall_score: i32,
    pub overall_comment: String,
    pub suggestion: String,

    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: i64,

    /// Creation timestamp, formatted `YYYY-MM-DD HH:MM:SS`.
    pub created_at: String,
}

/// Grid line style of a copybook worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridType {
    /// 田字格
    Tian,
    /// 米字格
    Mi,
    /// 回宫格
    Hui,
    /// 无格线
    Plain,
}

/// Layout descriptor of a copybook worksheet, used for deterministic
/// grid cropping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CopybookTemplate {
    pub id: i64,

    /// Display name, e.g. "田字格 10x10".
    pub name: String,

    pub grid_type: GridType,

    /// Grid rows (>= 1).
    pub grid_rows: u32,

    /// Grid columns (>= 1).
    pub grid_cols: u32,

    /// Fraction of the image height occupied by a non-writing header
    /// (0.0 to 0.3).
    pub header_ratio: f64,

    #[serde(default)]
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_score_bounds() {
        assert_eq!(clamp_score(-5), 0);
        assert_eq!(clamp_score(0), 0);
        assert_eq!(clamp_score(73), 73);
        assert_eq!(clamp_score(100), 100);
        assert_eq!(clamp_score(120), 100);
    }

    #[test]
    fn batch_result_serializes_camel_case() {
        let result = BatchResult {
            task_id: "task-abc".into(),
            total_characters: 20,
            avg_overall_score: 73,
            ..Default::default()
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains(r#""taskId":"task-abc""#));
        assert!(json.contains(r#""totalCharacters":20"#));
        assert!(json.contains(r#""avgOverallScore":73"#));
        // absent crops serialize as nothing, not null
        assert!(!json.contains("charImageBase64"));
    }

    #[test]
    fn char_analysis_roundtrip() {
        let analysis = CharAnalysis {
            char_index: 0,
            recognized_char: "疑".into(),
            row: 3,
            column: 3,
            structure_score: 62,
            stroke_score: 60,
            overall_score: 61,
            suggestion: "对照字帖临摹".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&analysis).unwrap();
        let parsed: CharAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(analysis, parsed);
    }

    #[test]
    fn grid_type_uppercase_wire_format() {
        assert_eq!(serde_json::to_string(&GridType::Tian).unwrap(), r#""TIAN""#);
        assert_eq!(serde_json::to_string(&GridType::Plain).unwrap(), r#""PLAIN""#);
        let parsed: GridType = serde_json::from_str(r#""MI""#).unwrap();
        assert_eq!(parsed, GridType::Mi);
    }

    #[test]
    fn grade_mode_kebab_case() {
        assert_eq!(
            serde_json::to_string(&GradeMode::WholePage).unwrap(),
            r#""whole-page""#
        );
        assert_eq!(
            serde_json::to_string(&GradeMode::SingleChar).unwrap(),
            r#""single-char""#
        );
    }
}
