//! Externally visible notification and status types.
//!
//! Everything here crosses the boundary to the UI/session layer, so it all
//! derives serde. Rendering and persistence are that layer's concern.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::event::PermissionRequest;

/// Connection status of one adapter instance.
///
/// Transitions are caller-driven and deliberately unvalidated; every change
/// is stored and broadcast as-is. One instance exists per adapter for its
/// whole process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Lifecycle state of a tool call as surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    InProgress,
    Completed,
    Failed,
}

/// Best-effort classification of a tool by its name.
///
/// Used for icons and permission prompts; never for behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Read,
    Edit,
    Delete,
    Move,
    Search,
    Execute,
    Think,
    Fetch,
    Other,
}

impl ToolKind {
    /// Infer a kind from a vendor tool name.
    ///
    /// Matching is on lowercase substrings, so `Bash`, `shell_exec` and
    /// `RunCommand` all classify as [`ToolKind::Execute`]. Unrecognized
    /// names fall back to [`ToolKind::Other`].
    pub fn infer(tool_name: &str) -> Self {
        let name = tool_name.to_lowercase();
        if name.contains("delete") || name.contains("remove") || name == "rm" {
            Self::Delete
        } else if name.contains("move") || name.contains("rename") || name == "mv" {
            Self::Move
        } else if name.contains("read") || name.contains("cat") || name.contains("view") {
            Self::Read
        } else if name.contains("edit")
            || name.contains("write")
            || name.contains("patch")
            || name.contains("create")
        {
            Self::Edit
        } else if name.contains("search")
            || name.contains("grep")
            || name.contains("glob")
            || name.contains("find")
            || name.contains("list")
            || name == "ls"
        {
            Self::Search
        } else if name.contains("bash")
            || name.contains("shell")
            || name.contains("exec")
            || name.contains("command")
            || name.contains("terminal")
            || name.contains("run")
        {
            Self::Execute
        } else if name.contains("fetch")
            || name.contains("web")
            || name.contains("http")
            || name.contains("browser")
        {
            Self::Fetch
        } else if name.contains("think") || name.contains("plan") || name.contains("reason") {
            Self::Think
        } else {
            Self::Other
        }
    }
}

/// One incremental update addressed to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A chunk of assistant message text.
    MessageChunk { text: String },
    /// A chunk of reasoning text.
    ThoughtChunk { text: String },
    /// A tool call was created.
    ToolCallStarted {
        tool_call_id: String,
        name: String,
        tool_kind: ToolKind,
        input: Value,
    },
    /// A previously created tool call changed state.
    ToolCallUpdated {
        tool_call_id: String,
        status: ToolCallStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
}

/// A session-update notification: an update plus the session it addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNotification {
    pub session_id: String,
    pub update: SessionUpdate,
}

/// Emitted alongside a size-limited tool result, carrying the true size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub tool_call_id: String,
    pub original_bytes: usize,
    pub limit_bytes: usize,
}

/// The terminal result of one prompt turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub session_id: String,
    pub text: String,
    pub duration_ms: u64,
    pub success: bool,
}

/// What selecting a permission option means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    RejectOnce,
}

/// One selectable option on a permission prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub option_id: String,
    pub label: String,
    pub kind: PermissionOptionKind,
}

/// A structured permission prompt offered to the session layer.
///
/// This layer offers exactly two options (allow once, reject once); richer
/// option sets belong to the tool host above us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionPrompt {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub tool_name: String,
    pub tool_kind: ToolKind,
    pub tool_input: Value,
    pub options: Vec<PermissionOption>,
}

impl PermissionPrompt {
    /// Build the standard two-option prompt from a raw backend request.
    pub fn from_request(request: PermissionRequest) -> Self {
        Self {
            tool_kind: ToolKind::infer(&request.tool_name),
            request_id: request.request_id,
            session_id: request.session_id,
            tool_name: request.tool_name,
            tool_input: request.tool_input,
            options: vec![
                PermissionOption {
                    option_id: "allow-once".to_string(),
                    label: "Allow once".to_string(),
                    kind: PermissionOptionKind::AllowOnce,
                },
                PermissionOption {
                    option_id: "reject-once".to_string(),
                    label: "Reject".to_string(),
                    kind: PermissionOptionKind::RejectOnce,
                },
            ],
        }
    }
}

/// Summary of one stored backend session, for session listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A management operation callers may probe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagementOp {
    Login,
    Logout,
    Status,
    About,
    Models,
    Mcp,
}

/// Uniform answer for management operations this core does not implement.
///
/// Returned instead of an error so callers can branch on `supported`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagementOutcome {
    pub supported: bool,
    pub operation: ManagementOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ManagementOutcome {
    pub fn unsupported(operation: ManagementOp) -> Self {
        Self {
            supported: false,
            operation,
            message: Some("not supported by this backend adapter".to_string()),
        }
    }
}

/// Everything an adapter can emit to its consumer, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterNotification {
    SessionUpdate(SessionNotification),
    StatusChanged { status: ConnectionStatus },
    PermissionRequested(PermissionPrompt),
    Truncated(TruncationNotice),
    Error { message: String },
}
