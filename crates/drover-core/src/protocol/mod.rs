//! Backend-agnostic protocol types.
//!
//! Two halves:
//!
//! - [`event`]: the internal [`StreamEvent`] stream a backend port produces
//!   while a prompt executes, plus the prompt request/response shapes.
//! - [`update`]: the externally visible session-update notifications,
//!   permission prompts, and status values the adapter emits to the
//!   UI/session layer.
//!
//! All types here are plain serde data; behavior lives in the bridge and
//! the adapter.

pub mod event;
pub mod update;

pub use event::{
    ContentBlock, PermissionRequest, PromptRequest, PromptResponse, StopReason, StreamEvent,
};
pub use update::{
    AdapterNotification, ConnectionStatus, ManagementOp, ManagementOutcome, PermissionOption,
    PermissionOptionKind, PermissionPrompt, SessionNotification, SessionSummary, SessionUpdate,
    ToolCallStatus, ToolKind, TruncationNotice, TurnResult,
};
