use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Where an indexing run currently stands.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    Loading,
    Indexing,
    Paused,
    Cancelled,
    Done,
    Failed,
    Disabled,
}

/// One progress update emitted while indexing. `progress` is a fraction in
/// `[0, 1]` and is monotonic within a run except across the pause, cancel,
/// and failure transitions.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub progress: f64,
    pub desc: String,
    pub status: IndexingStatus,
    pub should_clear_indexes: Option<bool>,
    pub debug_info: Option<String>,
}

impl ProgressUpdate {
    pub fn new(progress: f64, desc: impl Into<String>, status: IndexingStatus) -> Self {
        Self {
            progress,
            desc: desc.into(),
            status,
            should_clear_indexes: None,
            debug_info: None,
        }
    }

    pub fn loading(desc: impl Into<String>) -> Self {
        Self::new(0.0, desc, IndexingStatus::Loading)
    }

    pub fn done() -> Self {
        Self::new(1.0, "Indexing complete", IndexingStatus::Done)
    }

    pub fn cancelled() -> Self {
        Self::new(0.0, "Indexing cancelled", IndexingStatus::Cancelled)
    }

    pub fn paused(progress: f64) -> Self {
        Self::new(progress, "Indexing paused", IndexingStatus::Paused)
    }

    pub fn failed(
        desc: impl Into<String>,
        should_clear_indexes: bool,
        debug_info: Option<String>,
    ) -> Self {
        Self {
            progress: 0.0,
            desc: desc.into(),
            status: IndexingStatus::Failed,
            should_clear_indexes: Some(should_clear_indexes),
            debug_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&IndexingStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    #[test]
    fn optional_fields_are_omitted_when_none() {
        let update = ProgressUpdate::done();
        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("shouldClearIndexes"));
        assert!(!json.contains("debugInfo"));
    }

    #[test]
    fn failed_carries_clear_flag() {
        let update = ProgressUpdate::failed("disk full", true, Some("trace".into()));
        assert_eq!(update.should_clear_indexes, Some(true));
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"shouldClearIndexes\":true"));
    }
}
