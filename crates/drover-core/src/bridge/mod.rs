//! Stream-to-protocol bridge.
//!
//! Pure, stateless translation of every [`StreamEvent`] variant into the
//! externally visible emissions: session updates, the terminal turn
//! result, out-of-band permission requests, errors, and truncation
//! notices. The bridge holds no per-session state; the ambient session id
//! is passed in by the caller, and events that need one while none is
//! available translate to nothing.

use serde_json::Value;
use tracing::debug;

use crate::protocol::{
    PermissionRequest, SessionNotification, SessionUpdate, StreamEvent, ToolCallStatus, ToolKind,
    TruncationNotice, TurnResult,
};

/// Default byte budget for a single tool result payload (50 KiB).
pub const TOOL_RESULT_LIMIT: usize = 50 * 1024;

/// One externally visible emission produced from a stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// An incremental session-update notification.
    Update(SessionNotification),
    /// The terminal result of the turn.
    Result(TurnResult),
    /// A permission request routed out-of-band; never decided here.
    Permission(PermissionRequest),
    /// A backend-reported error.
    Error { message: String },
    /// A tool result was cut down to fit the byte budget.
    Truncation(TruncationNotice),
}

/// Outcome of applying the size budget to one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Truncation {
    pub value: Value,
    pub truncated: bool,
    /// Byte length of the value before any cutting.
    pub original_bytes: usize,
}

/// Apply the byte budget to a tool result value.
///
/// Strings are measured by UTF-8 byte length directly; any other value is
/// measured on its serialized form. Over-budget values are rebuilt by
/// appending whole characters until the next one would overflow, so the
/// result never splits a multi-byte character.
pub fn truncate_value(value: &Value, limit: usize) -> Truncation {
    let (text, original_bytes) = match value {
        Value::String(s) => {
            if s.len() <= limit {
                return Truncation {
                    value: value.clone(),
                    truncated: false,
                    original_bytes: s.len(),
                };
            }
            (s.as_str(), s.len())
        }
        other => {
            let serialized = serde_json::to_string(other).unwrap_or_default();
            if serialized.len() <= limit {
                return Truncation {
                    value: value.clone(),
                    truncated: false,
                    original_bytes: serialized.len(),
                };
            }
            return Truncation {
                value: Value::String(take_whole_chars(&serialized, limit)),
                truncated: true,
                original_bytes: serialized.len(),
            };
        }
    };

    Truncation {
        value: Value::String(take_whole_chars(text, limit)),
        truncated: true,
        original_bytes,
    }
}

/// Longest prefix of `text` that fits in `limit` bytes on a character
/// boundary.
fn take_whole_chars(text: &str, limit: usize) -> String {
    let mut kept = String::with_capacity(limit.min(text.len()));
    for ch in text.chars() {
        if kept.len() + ch.len_utf8() > limit {
            break;
        }
        kept.push(ch);
    }
    kept
}

/// Stateless translator from stream events to protocol emissions.
#[derive(Debug, Clone)]
pub struct Bridge {
    tool_result_limit: usize,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            tool_result_limit: TOOL_RESULT_LIMIT,
        }
    }
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge with a custom tool-result byte budget.
    pub fn with_tool_result_limit(limit: usize) -> Self {
        Self {
            tool_result_limit: limit,
        }
    }

    /// Translate one event into zero or more emissions.
    ///
    /// `session_id` is the session the surrounding prompt is addressing.
    /// Variants that need session addressing while `session_id` is `None`
    /// are dropped, never errored: a backend that forgot to report its
    /// session must not take the whole turn down.
    pub fn translate(&self, session_id: Option<&str>, event: StreamEvent) -> Vec<Emission> {
        match event {
            StreamEvent::SessionInit => Vec::new(),

            StreamEvent::TextDelta { text } | StreamEvent::TextComplete { text } => {
                self.addressed(session_id, SessionUpdate::MessageChunk { text })
            }

            StreamEvent::ThinkingDelta { text } | StreamEvent::ThinkingComplete { text } => {
                self.addressed(session_id, SessionUpdate::ThoughtChunk { text })
            }

            StreamEvent::ToolStart {
                tool_call_id,
                name,
                input,
            } => {
                let tool_kind = ToolKind::infer(&name);
                self.addressed(
                    session_id,
                    SessionUpdate::ToolCallStarted {
                        tool_call_id,
                        name,
                        tool_kind,
                        input,
                    },
                )
            }

            StreamEvent::ToolComplete {
                tool_call_id,
                name: _,
                result,
                success,
            } => {
                let Some(session_id) = session_id else {
                    debug!("dropping tool completion without a session id");
                    return Vec::new();
                };
                let sized = truncate_value(&result, self.tool_result_limit);
                let status = if success {
                    ToolCallStatus::Completed
                } else {
                    ToolCallStatus::Failed
                };
                let mut emissions = vec![Emission::Update(SessionNotification {
                    session_id: session_id.to_string(),
                    update: SessionUpdate::ToolCallUpdated {
                        tool_call_id: tool_call_id.clone(),
                        status,
                        output: Some(sized.value),
                    },
                })];
                if sized.truncated {
                    emissions.push(Emission::Truncation(TruncationNotice {
                        session_id: Some(session_id.to_string()),
                        tool_call_id,
                        original_bytes: sized.original_bytes,
                        limit_bytes: self.tool_result_limit,
                    }));
                }
                emissions
            }

            StreamEvent::ToolError {
                tool_call_id,
                name: _,
                message,
            } => self.addressed(
                session_id,
                SessionUpdate::ToolCallUpdated {
                    tool_call_id,
                    status: ToolCallStatus::Failed,
                    output: Some(Value::String(message)),
                },
            ),

            StreamEvent::PermissionRequest {
                request_id,
                session_id: request_session,
                tool_name,
                tool_input,
            } => vec![Emission::Permission(PermissionRequest {
                request_id,
                session_id: request_session.or_else(|| session_id.map(str::to_string)),
                tool_name,
                tool_input,
            })],

            StreamEvent::Result {
                session_id,
                text,
                duration_ms,
                success,
            } => vec![Emission::Result(TurnResult {
                session_id,
                text,
                duration_ms,
                success,
            })],

            StreamEvent::Error { message } => vec![Emission::Error { message }],
        }
    }

    fn addressed(&self, session_id: Option<&str>, update: SessionUpdate) -> Vec<Emission> {
        match session_id {
            Some(session_id) => vec![Emission::Update(SessionNotification {
                session_id: session_id.to_string(),
                update,
            })],
            None => {
                debug!("dropping session-addressed event without a session id");
                Vec::new()
            }
        }
    }
}
