//! Supporting types for the [`super::BackendPort`] contract.

use serde::{Deserialize, Serialize};

use crate::protocol::StreamEvent;

/// Result of checking whether the vendor binary is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationInfo {
    pub installed: bool,
    /// The binary the port looked for (e.g. `claude`).
    pub binary_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Shell command a user can run to install the binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
}

/// Result of checking the vendor CLI's authentication state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Models a backend offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelListing {
    pub models: Vec<ModelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

/// One prompt invocation handed to a port.
///
/// Backend invocations are stateless per call, so the resolved mode and
/// model ride along on every input rather than living backend-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptInput {
    pub session_id: String,
    /// Flattened prompt text (text content blocks only).
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Ask the backend for streamed output.
    pub streaming: bool,
}

/// Final outcome a port reports for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub text: String,
    pub session_id: String,
    pub tool_call_count: u32,
    pub success: bool,
}

/// Everything a port produced for one prompt: the terminal result plus the
/// ordered event sequence observed along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTurn {
    pub result: PromptResult,
    pub events: Vec<StreamEvent>,
}
