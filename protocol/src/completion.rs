use crate::range::{Position, RangeInFileWithContents};
use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Clipboard snapshot handed over by the IDE.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardContent {
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub copied_at: u64,
}

/// Everything the completion orchestrator needs about one trigger.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteInput {
    pub completion_id: String,
    pub filepath: String,
    pub pos: Position,
    #[serde(default)]
    pub recently_edited_ranges: Vec<RangeInFileWithContents>,
    #[serde(default)]
    pub recently_visited_ranges: Vec<RangeInFileWithContents>,
    pub clipboard: Option<ClipboardContent>,
    pub manually_pass_prefix: Option<String>,
    /// Set when the IDE's own suggestion pop-up is visible; forces
    /// single-line completions.
    #[serde(default)]
    pub selected_completion_info: bool,
}

/// Terminal state of a displayed completion.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionOutcome {
    Accepted,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Position;
    use pretty_assertions::assert_eq;

    #[test]
    fn input_deserializes_with_defaults() {
        let json = r#"{
            "completionId": "abc",
            "filepath": "file:///ws/main.rs",
            "pos": {"line": 3, "character": 7}
        }"#;
        let input: AutocompleteInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.pos, Position::new(3, 7));
        assert!(input.recently_edited_ranges.is_empty());
        assert!(input.clipboard.is_none());
        assert!(!input.selected_completion_info);
    }
}
