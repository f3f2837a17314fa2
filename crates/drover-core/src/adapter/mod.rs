//! Harness adapter: the composition root of the bridge.
//!
//! One [`HarnessAdapter`] binds one [`BackendPort`], the
//! [`Bridge`](crate::bridge::Bridge) translator, and an [`AdapterState`]
//! into the surface the session layer consumes: `connect`, `prompt`,
//! permission remapping, and session listing. Notifications flow out
//! through an unbounded channel handed back at construction; the consumer
//! renders and persists them, we do not.

mod listing;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::bridge::{Bridge, Emission};
use crate::port::{BackendPort, PromptInput};
use crate::protocol::{
    AdapterNotification, ConnectionStatus, ManagementOp, ManagementOutcome, PermissionPrompt,
    PromptRequest, PromptResponse, SessionSummary, StopReason,
};
use crate::state::{AdapterState, PromptInProgress, extract_prompt_text};

/// Adapter-level failures, with human-actionable text where a user can do
/// something about it.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The vendor binary is not installed.
    #[error("{binary} is not installed. Install it with: {install_command}")]
    InstallationMissing {
        binary: String,
        install_command: String,
    },

    /// The vendor CLI is installed but not authenticated.
    #[error("{binary} is not authenticated. Run the vendor's login flow, then reconnect")]
    AuthenticationMissing { binary: String },

    /// A prompt is already in flight on this adapter.
    #[error(transparent)]
    PromptInProgress(#[from] PromptInProgress),

    /// The backend turn failed and produced no usable result text.
    #[error("backend prompt failed and produced no result text")]
    PromptFailed,

    /// Neither listing path worked for this backend.
    #[error("session listing is not available for this backend")]
    SessionListingUnavailable,

    /// A failure surfaced by the port itself.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// The externally consumed protocol surface over one backend.
pub struct HarnessAdapter {
    port: Arc<dyn BackendPort>,
    bridge: Bridge,
    state: AdapterState,
    notify_tx: mpsc::UnboundedSender<AdapterNotification>,
}

impl HarnessAdapter {
    /// Build an adapter over `port`, returning it together with the
    /// stream of notifications it will emit.
    pub fn new(
        port: Arc<dyn BackendPort>,
    ) -> (Self, UnboundedReceiverStream<AdapterNotification>) {
        Self::with_bridge(port, Bridge::new())
    }

    /// Like [`HarnessAdapter::new`] with a custom bridge (e.g. a smaller
    /// tool-result budget).
    pub fn with_bridge(
        port: Arc<dyn BackendPort>,
        bridge: Bridge,
    ) -> (Self, UnboundedReceiverStream<AdapterNotification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        (
            Self {
                port,
                bridge,
                state: AdapterState::new(),
                notify_tx,
            },
            UnboundedReceiverStream::new(notify_rx),
        )
    }

    /// The backend port this adapter drives.
    pub fn port_name(&self) -> &str {
        self.port.name()
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.status()
    }

    /// Subscribe to status changes directly (they are also mirrored into
    /// the notification stream).
    pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<ConnectionStatus> {
        self.state.subscribe_status()
    }

    /// Verify the backend is usable and mark the adapter connected.
    ///
    /// No-op when already connected or connecting. Any failure reverts the
    /// status to disconnected so a later attempt starts clean; there is no
    /// partial-success state.
    pub async fn connect(&self) -> Result<(), AdapterError> {
        match self.state.status() {
            ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                debug!(port = self.port.name(), "connect is a no-op in this status");
                return Ok(());
            }
            ConnectionStatus::Disconnected | ConnectionStatus::Error => {}
        }

        self.set_status(ConnectionStatus::Connecting);
        match self.try_connect().await {
            Ok(()) => {
                self.set_status(ConnectionStatus::Connected);
                info!(port = self.port.name(), "backend connected");
                Ok(())
            }
            Err(e) => {
                self.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    async fn try_connect(&self) -> Result<(), AdapterError> {
        let install = self.port.verify_installation().await?;
        if !install.installed {
            let install_command = install.install_command.unwrap_or_else(|| {
                format!("see the {} installation docs", install.binary_name)
            });
            return Err(AdapterError::InstallationMissing {
                binary: install.binary_name,
                install_command,
            });
        }

        let port = Arc::clone(&self.port);
        let authenticated = self
            .state
            .verify_auth_cached(move || async move {
                Ok(port.verify_auth().await?.authenticated)
            })
            .await?;
        if !authenticated {
            return Err(AdapterError::AuthenticationMissing {
                binary: install.binary_name,
            });
        }
        Ok(())
    }

    /// Terminate any active backend process and mark disconnected.
    pub async fn disconnect(&self) {
        if let Err(e) = self.port.disconnect().await {
            warn!(port = self.port.name(), error = %e, "backend disconnect failed");
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Create a new backend session and return its id.
    pub async fn new_session(&self) -> Result<String, AdapterError> {
        let session_id = self.port.create_session().await?;
        debug!(port = self.port.name(), session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Remember the mode to inject into future prompts for this session.
    pub fn set_session_mode(&self, session_id: &str, mode: impl Into<String>) {
        self.state.set_session_mode(session_id, mode);
    }

    /// Remember the model to inject into future prompts for this session.
    pub fn set_session_model(&self, session_id: &str, model: impl Into<String>) {
        self.state.set_session_model(session_id, model);
    }

    /// Capability answer for management operations this core leaves to
    /// the vendor CLI.
    pub fn management(&self, operation: ManagementOp) -> ManagementOutcome {
        self.state.management_outcome(operation)
    }

    /// Run one prompt turn under the single-flight guard.
    ///
    /// Emits every bridged notification on the adapter's stream as it
    /// walks the backend's event sequence, then answers with a stop
    /// reason: `end_turn` when any result text was produced, the generic
    /// fallback otherwise.
    pub async fn prompt(&self, request: PromptRequest) -> Result<PromptResponse, AdapterError> {
        self.state.with_prompt_guard(self.prompt_inner(request)).await
    }

    async fn prompt_inner(&self, request: PromptRequest) -> Result<PromptResponse, AdapterError> {
        let text = extract_prompt_text(&request.content);
        let settings = self.state.session_settings(&request.session_id);
        info!(
            port = self.port.name(),
            session_id = %request.session_id,
            prompt_bytes = text.len(),
            "dispatching prompt"
        );

        let turn = self
            .port
            .prompt(PromptInput {
                session_id: request.session_id.clone(),
                text,
                mode: settings.mode,
                model: settings.model,
                streaming: true,
            })
            .await?;

        let mut produced_text = !turn.result.text.is_empty();
        for event in turn.events {
            for emission in self.bridge.translate(Some(&request.session_id), event) {
                match emission {
                    Emission::Update(notification) => {
                        self.emit(AdapterNotification::SessionUpdate(notification));
                    }
                    Emission::Result(result) => {
                        if !result.text.is_empty() {
                            produced_text = true;
                        }
                    }
                    Emission::Permission(request) => {
                        self.emit(AdapterNotification::PermissionRequested(
                            PermissionPrompt::from_request(request),
                        ));
                    }
                    Emission::Error { message } => {
                        warn!(port = self.port.name(), message = %message, "backend error event");
                        self.emit(AdapterNotification::Error { message });
                    }
                    Emission::Truncation(notice) => {
                        self.emit(AdapterNotification::Truncated(notice));
                    }
                }
            }
        }

        if !turn.result.success && !produced_text {
            return Err(AdapterError::PromptFailed);
        }

        let stop_reason = if produced_text {
            StopReason::EndTurn
        } else {
            StopReason::Unknown
        };
        Ok(PromptResponse { stop_reason })
    }

    /// List stored backend sessions, newest first.
    ///
    /// Prefers the port's structured listing; falls back to running a
    /// generic `list` management command and parsing its free text. Both
    /// paths are de-duplicated and recency-sorted identically.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, AdapterError> {
        if let Some(sessions) = self.port.list_sessions().await? {
            return Ok(listing::dedupe_and_sort(sessions));
        }

        debug!(port = self.port.name(), "no native session listing; trying `list`");
        let output = self
            .port
            .run_management_command(&["list".to_string()])
            .await
            .map_err(|e| {
                warn!(port = self.port.name(), error = %e, "list fallback failed");
                AdapterError::SessionListingUnavailable
            })?;
        if output.exit_code != Some(0) {
            return Err(AdapterError::SessionListingUnavailable);
        }
        Ok(listing::dedupe_and_sort(listing::parse_session_list(
            &output.stdout,
        )))
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.state.set_status(status);
        self.emit(AdapterNotification::StatusChanged { status });
    }

    fn emit(&self, notification: AdapterNotification) {
        if self.notify_tx.send(notification).is_err() {
            // The consumer hung up; keep running, the prompt result still
            // goes back to the caller.
            debug!(port = self.port.name(), "notification receiver dropped");
        }
    }
}

impl std::fmt::Debug for HarnessAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessAdapter")
            .field("port", &self.port.name())
            .field("status", &self.status())
            .finish()
    }
}
