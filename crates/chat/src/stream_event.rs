//! Progress events emitted while a conversation runs.
//!
//! `ToolStatus` tracks each tool call through its lifecycle; the streaming
//! loop wraps those together with content fragments into `ChatStreamPart`
//! so one sink sees everything in arrival order.

use serde::{Deserialize, Serialize};

/// Lifecycle stage of a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCallStatus {
    Started,
    Progress,
    Finished,
    Failed,
}

/// A status update for one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatus {
    /// Call id assigned by the provider
    pub id: String,

    /// Tool name
    pub name: String,

    pub status: ToolCallStatus,

    /// Payload reported by the tool itself; only set for `PROGRESS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolStatus {
    fn new(id: &str, name: &str, status: ToolCallStatus) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status,
            data: None,
        }
    }

    pub fn started(id: &str, name: &str) -> Self {
        Self::new(id, name, ToolCallStatus::Started)
    }

    pub fn progress(id: &str, name: &str, data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(id, name, ToolCallStatus::Progress)
        }
    }

    pub fn finished(id: &str, name: &str) -> Self {
        Self::new(id, name, ToolCallStatus::Finished)
    }

    pub fn failed(id: &str, name: &str) -> Self {
        Self::new(id, name, ToolCallStatus::Failed)
    }
}

/// Events emitted by the streaming loop.
///
/// - `tool`    — a tool call changed status
/// - `message` — partial text from the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamPart {
    /// A tool call changed status.
    Tool(ToolStatus),

    /// Partial text from the model.
    Message { content: String },
}

impl ChatStreamPart {
    /// Event name for this part type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Tool(_) => "tool",
            Self::Message { .. } => "message",
        }
    }

    /// The text fragment, if this is a message part.
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Message { content } => Some(content),
            Self::Tool(_) => None,
        }
    }
}

impl From<ToolStatus> for ChatStreamPart {
    fn from(status: ToolStatus) -> Self {
        Self::Tool(status)
    }
}
