//! The `BackendPort` trait -- the adapter interface for vendor agent CLIs.
//!
//! Each concrete port (Claude Code, Codex CLI, Cursor, ...) implements
//! this trait. The trait is intentionally object-safe so it can be stored
//! as `Arc<dyn BackendPort>` in the [`super::PortRegistry`] and inside a
//! harness adapter.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{AuthStatus, InstallationInfo, ModelListing, PromptInput, PromptTurn};
use crate::protocol::SessionSummary;
use crate::runner::CommandResult;

/// Adapter interface over one vendor's agent CLI.
///
/// Implementors own everything vendor-specific: the binary invocation, the
/// output format, and the mapping into backend-agnostic
/// [`crate::protocol::StreamEvent`]s. The only obligation toward this core
/// is producing valid events and a final result.
#[async_trait]
pub trait BackendPort: Send + Sync {
    /// Stable name for this port (e.g. "claude-code").
    fn name(&self) -> &str;

    /// Check whether the vendor binary exists and report how to install
    /// it when it does not.
    async fn verify_installation(&self) -> Result<InstallationInfo>;

    /// Check whether the vendor CLI is authenticated.
    async fn verify_auth(&self) -> Result<AuthStatus>;

    /// List the models the backend offers.
    async fn list_models(&self) -> Result<ModelListing>;

    /// Create a new backend session and return its id.
    async fn create_session(&self) -> Result<String>;

    /// Run one prompt to completion, returning the terminal result and
    /// every stream event observed along the way.
    async fn prompt(&self, input: PromptInput) -> Result<PromptTurn>;

    /// Run an arbitrary management subcommand and capture its output.
    async fn run_management_command(&self, args: &[String]) -> Result<CommandResult>;

    /// Structured session listing, for backends that have one.
    ///
    /// `Ok(None)` means the backend has no native listing; the adapter
    /// then falls back to parsing a generic `list` management command.
    async fn list_sessions(&self) -> Result<Option<Vec<SessionSummary>>> {
        Ok(None)
    }

    /// Terminate whatever backend process is currently active.
    async fn disconnect(&self) -> Result<()>;
}

// Compile-time assertion: BackendPort must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn BackendPort) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::types::PromptResult;

    /// A trivial port that answers with fixed values, used only to prove
    /// the trait can be implemented and used as `dyn BackendPort`.
    struct NoopPort;

    #[async_trait]
    impl BackendPort for NoopPort {
        fn name(&self) -> &str {
            "noop"
        }

        async fn verify_installation(&self) -> Result<InstallationInfo> {
            Ok(InstallationInfo {
                installed: true,
                binary_name: "noop".to_string(),
                version: None,
                install_command: None,
            })
        }

        async fn verify_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus {
                authenticated: true,
                method: None,
                email: None,
            })
        }

        async fn list_models(&self) -> Result<ModelListing> {
            Ok(ModelListing {
                models: vec![],
                default_model: None,
            })
        }

        async fn create_session(&self) -> Result<String> {
            Ok("session-0".to_string())
        }

        async fn prompt(&self, input: PromptInput) -> Result<PromptTurn> {
            Ok(PromptTurn {
                result: PromptResult {
                    text: String::new(),
                    session_id: input.session_id,
                    tool_call_count: 0,
                    success: true,
                },
                events: vec![],
            })
        }

        async fn run_management_command(&self, _args: &[String]) -> Result<CommandResult> {
            Ok(CommandResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn backend_port_is_object_safe() {
        let port: Box<dyn BackendPort> = Box::new(NoopPort);
        assert_eq!(port.name(), "noop");
    }

    #[tokio::test]
    async fn default_list_sessions_is_unsupported() {
        let port = NoopPort;
        assert!(port.list_sessions().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn noop_port_round_trip() {
        let port: Box<dyn BackendPort> = Box::new(NoopPort);
        assert!(port.verify_installation().await.unwrap().installed);
        assert!(port.verify_auth().await.unwrap().authenticated);
        let turn = port
            .prompt(PromptInput {
                session_id: "s-1".to_string(),
                text: "hello".to_string(),
                mode: None,
                model: None,
                streaming: true,
            })
            .await
            .unwrap();
        assert_eq!(turn.result.session_id, "s-1");
        assert!(turn.events.is_empty());
    }
}
