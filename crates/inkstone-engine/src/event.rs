//! Events emitted by a streaming grading request.

use inkstone_types::{BatchResult, SingleCharResult};

/// The terminal payload of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeOutcome {
    WholePage(Box<BatchResult>),
    SingleChar(Box<SingleCharResult>),
}

impl GradeOutcome {
    /// Serialize the result for the `result` event payload.
    pub fn to_json(&self) -> String {
        let serialized = match self {
            GradeOutcome::WholePage(result) => serde_json::to_string(result),
            GradeOutcome::SingleChar(result) => serde_json::to_string(result),
        };
        serialized.unwrap_or_else(|_| "{}".into())
    }
}

/// One event in a streaming grading request.
///
/// A request emits `Start`, then `Thinking`* strictly before any `Token`,
/// then `Token`* in upstream order, then exactly one of `Result` / `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum GradeEvent {
    /// The task has been accepted.
    Start,
    /// Reassurance message while the model is still thinking.
    Thinking(String),
    /// A raw text fragment from the upstream stream.
    Token(String),
    /// The parsed terminal result.
    Result(GradeOutcome),
    /// Terminal failure, with a user-facing message.
    Error(String),
}

impl GradeEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            GradeEvent::Start => "start",
            GradeEvent::Thinking(_) => "thinking",
            GradeEvent::Token(_) => "token",
            GradeEvent::Result(_) => "result",
            GradeEvent::Error(_) => "error",
        }
    }

    /// SSE event payload.
    pub fn payload(&self) -> String {
        match self {
            GradeEvent::Start => "{}".into(),
            GradeEvent::Thinking(msg) => msg.clone(),
            GradeEvent::Token(text) => text.clone(),
            GradeEvent::Result(outcome) => outcome.to_json(),
            GradeEvent::Error(msg) => msg.clone(),
        }
    }

    /// True for the event that ends a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, GradeEvent::Result(_) | GradeEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names() {
        assert_eq!(GradeEvent::Start.name(), "start");
        assert_eq!(GradeEvent::Thinking("x".into()).name(), "thinking");
        assert_eq!(GradeEvent::Token("x".into()).name(), "token");
        assert_eq!(GradeEvent::Error("x".into()).name(), "error");
    }

    #[test]
    fn start_payload_is_empty_object() {
        assert_eq!(GradeEvent::Start.payload(), "{}");
    }

    #[test]
    fn result_payload_is_camel_case_json() {
        let result = BatchResult {
            task_id: "task-1".into(),
            total_characters: 3,
            ..Default::default()
        };
        let event = GradeEvent::Result(GradeOutcome::WholePage(Box::new(result)));
        assert_eq!(event.name(), "result");
        assert!(event.payload().contains(r#""taskId":"task-1""#));
        assert!(event.is_terminal());
    }

    #[test]
    fn single_char_outcome_serializes() {
        let result = SingleCharResult {
            task_id: "single-1".into(),
            recognized_char: "永".into(),
            ..Default::default()
        };
        let event = GradeEvent::Result(GradeOutcome::SingleChar(Box::new(result)));
        assert!(event.payload().contains(r#""recognizedChar":"永""#));
    }
}
