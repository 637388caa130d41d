use crate::completion::AutocompleteInput;
use crate::progress::ProgressUpdate;
use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Generic envelope every messenger payload travels in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    pub message_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Message {
    pub fn new(message_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            message_type: message_type.into(),
            data,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Success,
    Error,
}

/// Envelope for one slice of a streamed response.
#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamEnvelope {
    pub done: bool,
    pub status: StreamStatus,
    pub content: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StreamEnvelope {
    pub fn chunk(content: serde_json::Value) -> Self {
        Self {
            done: false,
            status: StreamStatus::Success,
            content: Some(content),
            error: None,
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            status: StreamStatus::Success,
            content: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            done: true,
            status: StreamStatus::Error,
            content: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ForceReIndexParams {
    pub dirs: Option<Vec<String>>,
    pub should_clear_indexes: bool,
}

/// Messages the core accepts from the IDE, decoded from a [`Message`]
/// envelope by `message_type`.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    ForceReIndex(ForceReIndexParams),
    SetPaused(bool),
    AutocompleteComplete(AutocompleteInput),
    AutocompleteAccept { completion_id: String },
    AutocompleteCancel,
    FilesChanged { uris: Vec<String> },
    FilesCreated { uris: Vec<String> },
    FilesDeleted { uris: Vec<String> },
    FilesClosed { uris: Vec<String> },
    FilesOpened { uris: Vec<String> },
    Abort { message_id: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
struct UriList {
    #[serde(default)]
    uris: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct AcceptParams {
    completion_id: String,
}

impl InboundMessage {
    /// Decode a raw envelope. Returns `None` for message types the core
    /// does not handle (other handlers own them).
    pub fn parse(message: &Message) -> Result<Option<Self>, serde_json::Error> {
        let data = message.data.clone();
        let parsed = match message.message_type.as_str() {
            "index/forceReIndex" => Self::ForceReIndex(serde_json::from_value(data)?),
            "index/setPaused" => Self::SetPaused(serde_json::from_value(data)?),
            "autocomplete/complete" => Self::AutocompleteComplete(serde_json::from_value(data)?),
            "autocomplete/accept" => {
                let params: AcceptParams = serde_json::from_value(data)?;
                Self::AutocompleteAccept {
                    completion_id: params.completion_id,
                }
            }
            "autocomplete/cancel" => Self::AutocompleteCancel,
            "files/changed" => {
                let list: UriList = serde_json::from_value(data)?;
                Self::FilesChanged { uris: list.uris }
            }
            "files/created" => {
                let list: UriList = serde_json::from_value(data)?;
                Self::FilesCreated { uris: list.uris }
            }
            "files/deleted" => {
                let list: UriList = serde_json::from_value(data)?;
                Self::FilesDeleted { uris: list.uris }
            }
            "files/closed" => {
                let list: UriList = serde_json::from_value(data)?;
                Self::FilesClosed { uris: list.uris }
            }
            "files/opened" => {
                let list: UriList = serde_json::from_value(data)?;
                Self::FilesOpened { uris: list.uris }
            }
            "abort" => Self::Abort {
                message_id: message.message_id.clone(),
            },
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

/// Messages the core emits toward the IDE.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "messageType", content = "data", rename_all = "camelCase")]
pub enum OutboundMessage {
    IndexProgress(ProgressUpdate),
    RefreshSubmenuItems { providers: String },
    ToolCallPartialOutput { tool_call_id: String, content: String },
}
