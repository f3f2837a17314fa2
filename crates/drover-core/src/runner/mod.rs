//! Generic subprocess execution for agent CLIs.
//!
//! [`ProcessRunner`] owns one configured external binary and runs it in two
//! shapes: one-shot capture ([`ProcessRunner::run_command`]) and long-lived
//! streaming ([`ProcessRunner::run_streaming_command`]). Both spawn
//! base-args + call-args with the live environment overrides applied; the
//! one-shot form enforces a wall-clock timeout with escalating termination.
//!
//! Non-zero exit codes are not failures at this layer. Only spawn errors
//! and timeouts reject; everything else resolves with whatever the child
//! produced.

mod kill;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use kill::TermSignal;

/// Default grace period between the termination and kill signals.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

/// Errors from the process runner.
///
/// Deliberately small: a child that exits non-zero, or dies from a signal,
/// still resolves into a [`CommandResult`] / [`StreamingResult`].
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The OS could not start the binary (missing, not executable, ...).
    #[error("failed to spawn `{binary}`: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not close within its wall-clock bound.
    #[error("command `{command}` timed out after {timeout_ms} ms")]
    CommandTimeout { command: String, timeout_ms: u64 },

    /// I/O failure while waiting on an already-spawned child.
    #[error("i/o failure while supervising `{command}`: {source}")]
    Supervise {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// How to invoke the backend binary.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Binary name or path, resolved via `$PATH` when bare.
    pub binary: String,
    /// Arguments prepended to every invocation.
    pub base_args: Vec<String>,
    /// Default wall-clock bound for [`ProcessRunner::run_command`] calls
    /// that do not set their own. `None` means unbounded.
    pub default_timeout: Option<Duration>,
    /// How long to wait between TERM and KILL when escalating.
    pub kill_grace: Duration,
}

impl RunnerConfig {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            base_args: Vec::new(),
            default_timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

/// Options for a one-shot command.
#[derive(Default)]
pub struct CommandOptions {
    /// Written to the child's stdin, which is then closed. When `None`,
    /// stdin is closed immediately so the child never blocks on it.
    pub stdin_text: Option<String>,
    /// Wall-clock bound for this call; falls back to the config default.
    pub timeout: Option<Duration>,
}

/// Captured output of a one-shot command.
///
/// `exit_code` is the OS-level close code; `None` means the child was
/// terminated by a signal. A timeout never resolves into this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Live chunk callback for streaming commands. Chunks arrive in emission
/// order with no buffering; boundaries are arbitrary.
pub type ChunkHandler = Box<dyn FnMut(&str) + Send>;

/// Options for a streaming command.
#[derive(Default)]
pub struct StreamingOptions {
    pub stdin_text: Option<String>,
    pub on_stdout: Option<ChunkHandler>,
    pub on_stderr: Option<ChunkHandler>,
}

/// Outcome of a streaming command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingResult {
    /// Accumulated stderr (also forwarded live when a handler was given).
    pub stderr: String,
    /// OS-level close code; `None` when the child died from a signal.
    pub exit_code: Option<i32>,
    /// The signal that killed the child, when one did.
    pub signal: Option<i32>,
}

/// Executes one configured agent binary.
///
/// The environment override map is the only shared mutable state; it is
/// snapshotted at each spawn and never applied retroactively to a running
/// child. At most one streaming command's child is "active" at a time, and
/// host SIGINT/SIGTERM are forwarded to it while it is.
pub struct ProcessRunner {
    config: RunnerConfig,
    env: Mutex<HashMap<String, String>>,
    /// Pid of the active streaming child, if any.
    active_pid: Arc<Mutex<Option<u32>>>,
    /// Host-signal forwarding task; attached lazily, detached on disconnect.
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("binary", &self.config.binary)
            .field("base_args", &self.config.base_args)
            .finish()
    }
}

/// Lock a std mutex, recovering the data from a poisoned guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            env: Mutex::new(HashMap::new()),
            active_pid: Arc::new(Mutex::new(None)),
            forwarder: Mutex::new(None),
        }
    }

    /// Merge `overrides` into the live environment map.
    ///
    /// Affects subsequently spawned processes only.
    pub fn set_env(&self, overrides: HashMap<String, String>) {
        lock(&self.env).extend(overrides);
    }

    /// Run base-args + `args` to completion, capturing both streams.
    pub async fn run_command(
        &self,
        args: &[String],
        options: CommandOptions,
    ) -> Result<CommandResult, RunnerError> {
        let (mut cmd, command_line) = self.build_command(args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            binary: self.config.binary.clone(),
            source,
        })?;
        debug!(command = %command_line, "spawned command");

        write_stdin(&mut child, options.stdin_text).await;

        let stdout_task = tokio::spawn(read_to_string_lossy(child.stdout.take()));
        let stderr_task = tokio::spawn(read_to_string_lossy(child.stderr.take()));

        let status = match options.timeout.or(self.config.default_timeout) {
            Some(bound) => match tokio::time::timeout(bound, child.wait()).await {
                Ok(waited) => waited.map_err(|source| RunnerError::Supervise {
                    command: command_line.clone(),
                    source,
                })?,
                Err(_elapsed) => {
                    warn!(command = %command_line, timeout_ms = bound.as_millis() as u64,
                        "command timed out; escalating kill");
                    self.kill_and_reap(&mut child).await;
                    stdout_task.abort();
                    stderr_task.abort();
                    return Err(RunnerError::CommandTimeout {
                        command: command_line,
                        timeout_ms: bound.as_millis() as u64,
                    });
                }
            },
            None => child.wait().await.map_err(|source| RunnerError::Supervise {
                command: command_line.clone(),
                source,
            })?,
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        debug!(command = %command_line, exit_code = ?status.code(), "command closed");

        Ok(CommandResult {
            stdout,
            stderr,
            exit_code: status.code(),
        })
    }

    /// Run base-args + `args`, forwarding stdout chunks live.
    ///
    /// The child is marked active for the duration of the call, so host
    /// termination signals reach it and [`ProcessRunner::disconnect`] can
    /// find it. There is no timeout at this level; callers bound their
    /// own waits.
    pub async fn run_streaming_command(
        &self,
        args: &[String],
        options: StreamingOptions,
    ) -> Result<StreamingResult, RunnerError> {
        let (mut cmd, command_line) = self.build_command(args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            binary: self.config.binary.clone(),
            source,
        })?;
        debug!(command = %command_line, pid = ?child.id(), "spawned streaming command");

        write_stdin(&mut child, options.stdin_text).await;

        *lock(&self.active_pid) = child.id();
        self.attach_signal_forwarding();

        let stdout_task = tokio::spawn(forward_chunks(child.stdout.take(), options.on_stdout));
        let stderr_task = tokio::spawn(accumulate_chunks(child.stderr.take(), options.on_stderr));

        let waited = child.wait().await;
        // The child is gone either way; release the active slot before
        // surfacing any error.
        *lock(&self.active_pid) = None;

        let status = waited.map_err(|source| RunnerError::Supervise {
            command: command_line.clone(),
            source,
        })?;

        let _ = stdout_task.await;
        let stderr = stderr_task.await.unwrap_or_default();

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        debug!(command = %command_line, exit_code = ?status.code(), signal = ?signal,
            "streaming command closed");

        Ok(StreamingResult {
            stderr,
            exit_code: status.code(),
            signal,
        })
    }

    /// Terminate any active streaming child and detach signal forwarding.
    ///
    /// Sends TERM to the child's process group, waits up to the configured
    /// grace period for it to disappear, then KILLs. Distinct from a single
    /// command's own timeout handling. Pid-only termination is POSIX-only;
    /// on other platforms this detaches the forwarder and logs, and the
    /// child exits with the runner via `kill_on_drop`.
    pub async fn disconnect(&self) {
        if let Some(handle) = lock(&self.forwarder).take() {
            handle.abort();
        }

        let Some(pid) = lock(&self.active_pid).take() else {
            return;
        };

        info!(pid, "terminating active agent process");
        kill::terminate_pid(pid, TermSignal::Term);

        let deadline = tokio::time::Instant::now() + self.config.kill_grace;
        while kill::is_alive(pid) {
            if tokio::time::Instant::now() >= deadline {
                warn!(pid, "process survived TERM past grace period; sending KILL");
                kill::terminate_pid(pid, TermSignal::Kill);
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        debug!(pid, "process exited after TERM");
    }

    /// TERM the child, wait out the grace period, then KILL and reap.
    async fn kill_and_reap(&self, child: &mut Child) {
        kill::terminate(child, TermSignal::Term);
        match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
            Ok(_) => {}
            Err(_elapsed) => {
                kill::terminate(child, TermSignal::Kill);
                let _ = child.wait().await;
            }
        }
    }

    fn build_command(&self, args: &[String]) -> (Command, String) {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&self.config.base_args);
        cmd.args(args);
        cmd.envs(lock(&self.env).clone());
        cmd.kill_on_drop(true);
        // Own process group, so group-wide signals take descendants too.
        #[cfg(unix)]
        cmd.process_group(0);

        let command_line = std::iter::once(self.config.binary.as_str())
            .chain(self.config.base_args.iter().map(String::as_str))
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        (cmd, command_line)
    }

    /// Start the host-signal forwarding task, once per runner.
    fn attach_signal_forwarding(&self) {
        let mut slot = lock(&self.forwarder);
        if slot.is_some() {
            return;
        }
        let active = Arc::clone(&self.active_pid);
        *slot = Some(tokio::spawn(forward_host_signals(active)));
    }
}

/// Write `text` to the child's stdin and close it. Always closes stdin,
/// even when there is nothing to write.
async fn write_stdin(child: &mut Child, text: Option<String>) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    if let Some(text) = text {
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            warn!(error = %e, "failed to write to child stdin");
        }
    }
    // Dropping the handle closes the pipe.
}

/// Drain a stream into a lossily decoded string.
async fn read_to_string_lossy<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        warn!(error = %e, "error draining child stream");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Incremental UTF-8 decoding across read boundaries.
///
/// A multi-byte character can straddle two reads; decoding each read in
/// isolation would hand the callback a replacement character instead. The
/// carry keeps a trailing partial sequence until its remaining bytes
/// arrive. Genuinely invalid bytes still decode to U+FFFD.
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append `bytes` and return every complete character decoded so far.
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(bad) => {
                            out.push('\u{FFFD}');
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete trailing sequence; hold it back.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        let keep = rest.to_vec();
        self.pending = keep;
        out
    }

    /// Decode whatever is still pending at end of stream.
    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Forward raw chunks to a handler as they arrive, without accumulating.
async fn forward_chunks<R: AsyncRead + Unpin>(reader: Option<R>, mut handler: Option<ChunkHandler>) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut carry = Utf8Carry::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = carry.push(&buf[..n]);
                if !chunk.is_empty() {
                    if let Some(handler) = handler.as_mut() {
                        handler(&chunk);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "error reading child stream");
                break;
            }
        }
    }
    let tail = carry.finish();
    if !tail.is_empty() {
        if let Some(handler) = handler.as_mut() {
            handler(&tail);
        }
    }
}

/// Accumulate a stream, also forwarding chunks live when a handler exists.
async fn accumulate_chunks<R: AsyncRead + Unpin>(
    reader: Option<R>,
    mut handler: Option<ChunkHandler>,
) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut carry = Utf8Carry::new();
    let mut collected = String::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = carry.push(&buf[..n]);
                if !chunk.is_empty() {
                    if let Some(handler) = handler.as_mut() {
                        handler(&chunk);
                    }
                    collected.push_str(&chunk);
                }
            }
            Err(e) => {
                warn!(error = %e, "error reading child stream");
                break;
            }
        }
    }
    collected.push_str(&carry.finish());
    collected
}

/// Forward host SIGINT/SIGTERM to whichever child is currently active.
#[cfg(unix)]
async fn forward_host_signals(active: Arc<Mutex<Option<u32>>>) {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut int)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        warn!("failed to install signal handlers; host signals will not be forwarded");
        return;
    };

    loop {
        let sig = tokio::select! {
            _ = term.recv() => libc::SIGTERM,
            _ = int.recv() => libc::SIGINT,
        };
        if let Some(pid) = *lock(&active) {
            info!(pid, sig, "forwarding host signal to agent process");
            kill::forward_signal(pid, sig);
        }
    }
}

#[cfg(not(unix))]
async fn forward_host_signals(active: Arc<Mutex<Option<u32>>>) {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if let Some(pid) = *lock(&active) {
            info!(pid, "ctrl-c received; terminating agent process");
            kill::terminate_pid(pid, TermSignal::Term);
        }
    }
}
