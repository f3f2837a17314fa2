//! The per-vendor backend port contract.
//!
//! Each concrete port wraps one vendor's agent CLI (Claude Code, Codex,
//! Cursor, ...), spawns it through a [`crate::runner::ProcessRunner`], and
//! parses the native output into [`crate::protocol::StreamEvent`]s. That
//! parsing lives entirely in the port; this crate only consumes the
//! contract defined here.
//!
//! # Architecture
//!
//! ```text
//! HarnessAdapter
//!     |
//!     v
//! PortRegistry --get("claude-code")--> Arc<dyn BackendPort>
//!     |                                       |
//!     |   verify_installation() --------------+
//!     |   verify_auth()
//!     |   create_session() --> session id
//!     |   prompt(input) --> PromptTurn { result, events }
//!     |   run_management_command(args)
//!     |   list_sessions()
//!     |   disconnect()
//! ```

pub mod registry;
pub mod trait_def;
pub mod types;

pub use registry::PortRegistry;
pub use trait_def::BackendPort;
pub use types::{
    AuthStatus, InstallationInfo, ModelInfo, ModelListing, PromptInput, PromptResult, PromptTurn,
};
