//! Stream events and prompt request/response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A backend-agnostic event produced while a prompt executes.
///
/// This is a closed union: every vendor port maps its native output into
/// these variants and nothing else, and the bridge matches exhaustively so
/// a new variant cannot be silently dropped.
///
/// Ports that stream token deltas use the `*Delta` variants; ports that
/// only report whole blocks use the `*Complete` variants. A port should
/// emit one granularity or the other for a given block, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend finished its own session bootstrap.
    SessionInit,
    /// Incremental assistant text.
    TextDelta { text: String },
    /// A complete assistant text block.
    TextComplete { text: String },
    /// Incremental reasoning text.
    ThinkingDelta { text: String },
    /// A complete reasoning block.
    ThinkingComplete { text: String },
    /// The backend started a tool invocation.
    ToolStart {
        tool_call_id: String,
        name: String,
        input: Value,
    },
    /// A tool invocation finished with a result value.
    ToolComplete {
        tool_call_id: String,
        name: String,
        result: Value,
        success: bool,
    },
    /// A tool invocation failed outright.
    ToolError {
        tool_call_id: String,
        name: String,
        message: String,
    },
    /// The backend is asking for permission to run a tool.
    PermissionRequest {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        tool_name: String,
        tool_input: Value,
    },
    /// The terminal result of the whole turn.
    Result {
        session_id: String,
        text: String,
        duration_ms: u64,
        success: bool,
    },
    /// A backend-reported error.
    Error { message: String },
}

/// A raw permission request routed out of the event stream.
///
/// The bridge passes this through untouched; deciding the outcome is the
/// surrounding tool host's job, never ours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub tool_name: String,
    pub tool_input: Value,
}

/// One block of prompt content, as handed to us by the session layer.
///
/// Only [`ContentBlock::Text`] contributes to the prompt text; the other
/// variants are carried for callers that need them but are ignored when
/// the prompt is flattened for a CLI backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
    ResourceLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Resource {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

/// A prompt submitted to the adapter for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub session_id: String,
    pub content: Vec<ContentBlock>,
}

/// Why a prompt turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The backend produced result text and ended its turn normally.
    EndTurn,
    /// The turn ended without producing any result text.
    Unknown,
}

/// The adapter's answer to a completed prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub stop_reason: StopReason,
}
