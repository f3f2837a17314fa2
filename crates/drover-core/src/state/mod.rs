//! Connection and prompt state for one adapter instance.
//!
//! [`AdapterState`] owns the connection status (broadcast on every change,
//! transitions deliberately unvalidated), the single-flight prompt guard,
//! the per-instance auth cache, and the per-session mode/model memory that
//! compensates for backends being stateless across invocations.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::debug;

use crate::protocol::{ConnectionStatus, ContentBlock, ManagementOp, ManagementOutcome};

/// Rejection from the single-flight prompt guard.
///
/// Deliberately immediate: a second prompt is refused, never queued.
#[derive(Debug, thiserror::Error)]
#[error("Prompt already in progress")]
pub struct PromptInProgress;

/// Mode and model remembered for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSettings {
    pub mode: Option<String>,
    pub model: Option<String>,
}

/// Connection, guard, and session memory for one adapter.
pub struct AdapterState {
    status_tx: watch::Sender<ConnectionStatus>,
    prompt_in_flight: AtomicBool,
    auth_cache: Mutex<Option<bool>>,
    sessions: Mutex<HashMap<String, SessionSettings>>,
}

impl Default for AdapterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight flag when dropped, so the guard releases on every
/// exit path, including unwinding.
struct InFlightClear<'a>(&'a AtomicBool);

impl Drop for InFlightClear<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AdapterState {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            status_tx,
            prompt_in_flight: AtomicBool::new(false),
            auth_cache: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Store and broadcast a status change.
    ///
    /// No legality checking: callers drive the transitions, and every call
    /// notifies subscribers even when the value is unchanged.
    pub fn set_status(&self, status: ConnectionStatus) {
        debug!(?status, "connection status change");
        self.status_tx.send_replace(status);
    }

    /// Subscribe to status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Whether a prompt currently holds the guard.
    pub fn prompt_in_flight(&self) -> bool {
        self.prompt_in_flight.load(Ordering::Acquire)
    }

    /// Run `task` under the single-flight prompt guard.
    ///
    /// If a prompt is already in flight the call fails immediately with
    /// [`PromptInProgress`]; there is no queue. The flag clears on success,
    /// failure, and unwind alike.
    pub async fn with_prompt_guard<F, T, E>(&self, task: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<PromptInProgress>,
    {
        if self
            .prompt_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PromptInProgress.into());
        }
        let _clear = InFlightClear(&self.prompt_in_flight);
        task.await
    }

    /// Auth verification with per-instance caching.
    ///
    /// A cached `true` short-circuits without re-invoking the backend.
    /// There is no TTL and no automatic invalidation.
    pub async fn verify_auth_cached<F, Fut>(&self, verify: F) -> anyhow::Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        if let Some(true) = *lock(&self.auth_cache) {
            debug!("auth verified from cache");
            return Ok(true);
        }
        let fresh = verify().await?;
        *lock(&self.auth_cache) = Some(fresh);
        Ok(fresh)
    }

    /// Remember the mode for a session.
    pub fn set_session_mode(&self, session_id: &str, mode: impl Into<String>) {
        lock(&self.sessions)
            .entry(session_id.to_string())
            .or_default()
            .mode = Some(mode.into());
    }

    /// Remember the model for a session.
    pub fn set_session_model(&self, session_id: &str, model: impl Into<String>) {
        lock(&self.sessions)
            .entry(session_id.to_string())
            .or_default()
            .model = Some(model.into());
    }

    /// Settings to re-inject into the next prompt for this session.
    pub fn session_settings(&self, session_id: &str) -> SessionSettings {
        lock(&self.sessions)
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Uniform answer for management operations this core does not
    /// implement; callers branch on the `supported` flag instead of
    /// catching errors.
    pub fn management_outcome(&self, operation: ManagementOp) -> ManagementOutcome {
        ManagementOutcome::unsupported(operation)
    }
}

impl std::fmt::Debug for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterState")
            .field("status", &self.status())
            .field("prompt_in_flight", &self.prompt_in_flight())
            .finish()
    }
}

/// Flatten a prompt's content blocks into the text a CLI backend accepts.
///
/// Text blocks concatenate in order; every other block type is ignored.
/// A prompt with no text blocks flattens to the empty string.
pub fn extract_prompt_text(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        if let ContentBlock::Text { text } = block {
            out.push_str(text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn starts_disconnected() {
        let state = AdapterState::new();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(!state.prompt_in_flight());
    }

    #[tokio::test]
    async fn status_changes_are_broadcast() {
        let state = AdapterState::new();
        let mut rx = state.subscribe_status();
        state.set_status(ConnectionStatus::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Connecting);
    }

    #[tokio::test]
    async fn same_value_status_change_still_notifies() {
        let state = AdapterState::new();
        let mut rx = state.subscribe_status();
        state.set_status(ConnectionStatus::Disconnected);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn illegal_transitions_are_allowed_silently() {
        // error -> connected without disconnecting first: stored as-is.
        let state = AdapterState::new();
        state.set_status(ConnectionStatus::Error);
        state.set_status(ConnectionStatus::Connected);
        assert_eq!(state.status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn second_guarded_prompt_rejects_while_first_is_pending() {
        let state = Arc::new(AdapterState::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let first = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                state
                    .with_prompt_guard::<_, _, PromptInProgress>(async move {
                        let _ = release_rx.await;
                        Ok("first")
                    })
                    .await
            })
        };

        // Wait for the first prompt to take the guard.
        while !state.prompt_in_flight() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second: Result<&str, PromptInProgress> =
            state.with_prompt_guard(async { Ok("second") }).await;
        let err = second.unwrap_err();
        assert!(err.to_string().contains("already in progress"));

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "first");

        // Once the first settles, a third call succeeds.
        let third: Result<&str, PromptInProgress> =
            state.with_prompt_guard(async { Ok("third") }).await;
        assert_eq!(third.unwrap(), "third");
    }

    #[tokio::test]
    async fn guard_clears_after_task_failure() {
        let state = AdapterState::new();
        let failed: Result<(), PromptInProgress> =
            state.with_prompt_guard(async { Err(PromptInProgress) }).await;
        assert!(failed.is_err());
        assert!(!state.prompt_in_flight());

        let ok: Result<i32, PromptInProgress> = state.with_prompt_guard(async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn cached_true_short_circuits_auth_verification() {
        let state = AdapterState::new();
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let authed = state
                .verify_auth_cached(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                })
                .await
                .unwrap();
            assert!(authed);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_false_retries_verification() {
        let state = AdapterState::new();
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        for expected in [false, true] {
            let calls = Arc::clone(&calls);
            let authed = state
                .verify_auth_cached(move || async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Ok(n > 0)
                })
                .await
                .unwrap();
            assert_eq!(authed, expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn session_settings_default_to_empty() {
        let state = AdapterState::new();
        assert_eq!(state.session_settings("s-1"), SessionSettings::default());
    }

    #[test]
    fn session_mode_and_model_are_remembered_independently() {
        let state = AdapterState::new();
        state.set_session_mode("s-1", "plan");
        state.set_session_model("s-1", "fast-1");
        state.set_session_model("s-2", "big-9");

        let s1 = state.session_settings("s-1");
        assert_eq!(s1.mode.as_deref(), Some("plan"));
        assert_eq!(s1.model.as_deref(), Some("fast-1"));

        let s2 = state.session_settings("s-2");
        assert_eq!(s2.mode, None);
        assert_eq!(s2.model.as_deref(), Some("big-9"));
    }

    #[test]
    fn extract_text_concatenates_in_order() {
        let blocks = vec![
            ContentBlock::Text {
                text: "Fix ".to_string(),
            },
            ContentBlock::Image {
                mime_type: Some("image/png".to_string()),
                uri: None,
            },
            ContentBlock::Text {
                text: "the bug".to_string(),
            },
        ];
        assert_eq!(extract_prompt_text(&blocks), "Fix the bug");
    }

    #[test]
    fn extract_text_from_non_text_only_prompt_is_empty() {
        let blocks = vec![ContentBlock::ResourceLink {
            uri: "file:///tmp/notes.md".to_string(),
            name: None,
        }];
        assert_eq!(extract_prompt_text(&blocks), "");
    }

    #[test]
    fn extract_text_from_empty_prompt_is_empty() {
        assert_eq!(extract_prompt_text(&[]), "");
    }

    #[test]
    fn management_operations_report_unsupported() {
        let state = AdapterState::new();
        for op in [
            ManagementOp::Login,
            ManagementOp::Logout,
            ManagementOp::Status,
            ManagementOp::About,
            ManagementOp::Models,
            ManagementOp::Mcp,
        ] {
            let outcome = state.management_outcome(op);
            assert!(!outcome.supported);
            assert_eq!(outcome.operation, op);
        }
    }
}
