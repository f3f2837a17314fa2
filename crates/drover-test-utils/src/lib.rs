//! Shared test utilities for drover integration tests.
//!
//! Provides fake agent binaries (shell scripts written into a test's temp
//! dir) for exercising the process runner, and a fully scripted
//! [`BackendPort`] for exercising the adapter without any subprocess.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use drover_core::port::{
    AuthStatus, BackendPort, InstallationInfo, ModelListing, PromptInput, PromptResult, PromptTurn,
};
use drover_core::protocol::{SessionSummary, StreamEvent};
use drover_core::runner::CommandResult;

/// Initialize test logging once per process; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write an executable shell script into `dir` and return its path.
///
/// The body is wrapped with a `#!/bin/sh` shebang, so tests only supply
/// the interesting lines.
pub fn fake_agent_bin(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!("#!/bin/sh\n{body}\n");
    std::fs::write(&path, script).expect("failed to write fake agent script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("failed to mark fake agent script executable");
    }

    path
}

/// A fully scripted backend port.
///
/// Every answer is configured up front with the `with_*` builders; every
/// prompt is recorded for later assertions.
pub struct ScriptedPort {
    name: String,
    installation: InstallationInfo,
    auth: AuthStatus,
    auth_checks: AtomicU32,
    events: Vec<StreamEvent>,
    result_text: String,
    result_success: bool,
    prompt_delay: Option<Duration>,
    prompt_error: Option<String>,
    native_sessions: Option<Vec<SessionSummary>>,
    management: HashMap<String, CommandResult>,
    recorded_prompts: Mutex<Vec<PromptInput>>,
    sessions_created: AtomicU32,
    disconnects: AtomicU32,
}

impl ScriptedPort {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            installation: InstallationInfo {
                installed: true,
                binary_name: name.to_string(),
                version: Some("1.0.0".to_string()),
                install_command: None,
            },
            auth: AuthStatus {
                authenticated: true,
                method: None,
                email: None,
            },
            auth_checks: AtomicU32::new(0),
            events: Vec::new(),
            result_text: String::new(),
            result_success: true,
            prompt_delay: None,
            prompt_error: None,
            native_sessions: None,
            management: HashMap::new(),
            recorded_prompts: Mutex::new(Vec::new()),
            sessions_created: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
        }
    }

    pub fn with_missing_installation(mut self, install_command: Option<&str>) -> Self {
        self.installation.installed = false;
        self.installation.install_command = install_command.map(str::to_string);
        self
    }

    pub fn with_unauthenticated(mut self) -> Self {
        self.auth.authenticated = false;
        self
    }

    pub fn with_events(mut self, events: Vec<StreamEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_result(mut self, text: &str, success: bool) -> Self {
        self.result_text = text.to_string();
        self.result_success = success;
        self
    }

    /// Delay every prompt, so tests can overlap calls deterministically.
    pub fn with_prompt_delay(mut self, delay: Duration) -> Self {
        self.prompt_delay = Some(delay);
        self
    }

    pub fn with_prompt_error(mut self, message: &str) -> Self {
        self.prompt_error = Some(message.to_string());
        self
    }

    pub fn with_native_sessions(mut self, sessions: Vec<SessionSummary>) -> Self {
        self.native_sessions = Some(sessions);
        self
    }

    /// Script the output of a management subcommand (keyed by first arg).
    pub fn with_management_output(mut self, subcommand: &str, result: CommandResult) -> Self {
        self.management.insert(subcommand.to_string(), result);
        self
    }

    pub fn recorded_prompts(&self) -> Vec<PromptInput> {
        self.recorded_prompts
            .lock()
            .expect("prompt record poisoned")
            .clone()
    }

    pub fn auth_check_count(&self) -> u32 {
        self.auth_checks.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendPort for ScriptedPort {
    fn name(&self) -> &str {
        &self.name
    }

    async fn verify_installation(&self) -> Result<InstallationInfo> {
        Ok(self.installation.clone())
    }

    async fn verify_auth(&self) -> Result<AuthStatus> {
        self.auth_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.auth.clone())
    }

    async fn list_models(&self) -> Result<ModelListing> {
        Ok(ModelListing {
            models: vec![],
            default_model: None,
        })
    }

    async fn create_session(&self) -> Result<String> {
        let n = self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(format!("scripted-session-{n}"))
    }

    async fn prompt(&self, input: PromptInput) -> Result<PromptTurn> {
        let session_id = input.session_id.clone();
        self.recorded_prompts
            .lock()
            .expect("prompt record poisoned")
            .push(input);

        if let Some(delay) = self.prompt_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.prompt_error {
            return Err(anyhow!("{message}"));
        }

        let tool_call_count = self
            .events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ToolStart { .. }))
            .count() as u32;
        Ok(PromptTurn {
            result: PromptResult {
                text: self.result_text.clone(),
                session_id,
                tool_call_count,
                success: self.result_success,
            },
            events: self.events.clone(),
        })
    }

    async fn run_management_command(&self, args: &[String]) -> Result<CommandResult> {
        let subcommand = args.first().map(String::as_str).unwrap_or_default();
        self.management
            .get(subcommand)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted output for management command `{subcommand}`"))
    }

    async fn list_sessions(&self) -> Result<Option<Vec<SessionSummary>>> {
        Ok(self.native_sessions.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
