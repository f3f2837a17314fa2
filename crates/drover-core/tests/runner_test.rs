//! Integration tests for the process runner, driven by fake agent
//! binaries (shell scripts in a temp dir).

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use drover_core::runner::{
    CommandOptions, ProcessRunner, RunnerConfig, RunnerError, StreamingOptions,
};
use drover_test_utils::{fake_agent_bin, init_test_logging};

fn runner_for(script: &Path) -> ProcessRunner {
    let mut config = RunnerConfig::new(script.to_str().unwrap());
    config.kill_grace = Duration::from_millis(300);
    ProcessRunner::new(config)
}

/// Read a pidfile written by a script, waiting for it to appear.
async fn wait_for_pid(path: &Path) -> u32 {
    for _ in 0..100 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if let Ok(pid) = content.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pidfile never appeared at {}", path.display());
}

fn process_alive(pid: u32) -> bool {
    std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn wait_until_dead(pid: u32) {
    for _ in 0..100 {
        if !process_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid {pid} still alive");
}

#[tokio::test]
async fn run_command_captures_stdout_stderr_exit_code_and_stdin() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let script = fake_agent_bin(
        tmp.path(),
        "stub_agent.sh",
        r#"cat > "$(dirname "$0")/recorded-stdin.txt"
printf 'ok'
printf 'warn' >&2
exit 0"#,
    );

    let runner = runner_for(&script);
    let result = runner
        .run_command(
            &["status".to_string()],
            CommandOptions {
                stdin_text: Some("payload\n".to_string()),
                timeout: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.stdout, "ok");
    assert_eq!(result.stderr, "warn");
    assert_eq!(result.exit_code, Some(0));

    let recorded = std::fs::read_to_string(tmp.path().join("recorded-stdin.txt")).unwrap();
    assert_eq!(recorded, "payload\n");
}

#[tokio::test]
async fn set_env_overrides_reach_subsequent_spawns() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let script = fake_agent_bin(tmp.path(), "env_agent.sh", r#"printf '%s' "$DROVER_KEY""#);

    let runner = runner_for(&script);
    runner.set_env(HashMap::from([(
        "DROVER_KEY".to_string(),
        "on".to_string(),
    )]));

    let result = runner
        .run_command(&[], CommandOptions::default())
        .await
        .unwrap();
    assert_eq!(result.stdout, "on");
}

#[tokio::test]
async fn base_args_are_prepended_to_every_invocation() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let script = fake_agent_bin(tmp.path(), "args_agent.sh", r#"printf '%s ' "$@""#);

    let mut config = RunnerConfig::new(script.to_str().unwrap());
    config.base_args = vec!["--json".to_string()];
    let runner = ProcessRunner::new(config);

    let result = runner
        .run_command(&["list".to_string()], CommandOptions::default())
        .await
        .unwrap();
    assert_eq!(result.stdout, "--json list ");
}

#[tokio::test]
async fn command_timeout_rejects_and_kills_the_child() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let pidfile = tmp.path().join("pid");
    let script = fake_agent_bin(
        tmp.path(),
        "sleepy_agent.sh",
        &format!("echo $$ > {}\nsleep 3600", pidfile.display()),
    );

    let runner = runner_for(&script);
    let started = std::time::Instant::now();
    let err = runner
        .run_command(
            &["work".to_string()],
            CommandOptions {
                stdin_text: None,
                timeout: Some(Duration::from_millis(200)),
            },
        )
        .await
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(
        err.to_string().contains("timed out"),
        "expected a timeout error, got: {err}"
    );
    match &err {
        RunnerError::CommandTimeout {
            command,
            timeout_ms,
        } => {
            assert!(command.contains("work"));
            assert_eq!(*timeout_ms, 200);
        }
        other => panic!("expected CommandTimeout, got: {other}"),
    }

    let pid = wait_for_pid(&pidfile).await;
    wait_until_dead(pid).await;
}

#[tokio::test]
async fn streaming_command_forwards_chunks_live() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let script = fake_agent_bin(
        tmp.path(),
        "chatty_agent.sh",
        r#"printf 'one\n'
sleep 0.1
printf 'two\n'
printf 'errbit' >&2
exit 0"#,
    );

    let runner = runner_for(&script);
    let collected = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&collected);

    let result = runner
        .run_streaming_command(
            &[],
            StreamingOptions {
                stdin_text: None,
                on_stdout: Some(Box::new(move |chunk| {
                    sink.lock().unwrap().push_str(chunk);
                })),
                on_stderr: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(collected.lock().unwrap().as_str(), "one\ntwo\n");
    assert_eq!(result.stderr, "errbit");
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.signal, None);
}

#[tokio::test]
async fn streaming_preserves_characters_split_across_writes() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    // U+2603 SNOWMAN is e2 98 83; the pause forces the reader to see the
    // first two bytes and the last one in separate reads.
    let script = fake_agent_bin(
        tmp.path(),
        "split_agent.sh",
        r#"printf '\342\230'
sleep 0.2
printf '\203\n'"#,
    );

    let runner = runner_for(&script);
    let collected = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&collected);

    runner
        .run_streaming_command(
            &[],
            StreamingOptions {
                stdin_text: None,
                on_stdout: Some(Box::new(move |chunk| {
                    sink.lock().unwrap().push_str(chunk);
                })),
                on_stderr: None,
            },
        )
        .await
        .unwrap();

    let text = collected.lock().unwrap().clone();
    assert_eq!(text, "\u{2603}\n");
    assert!(!text.contains('\u{FFFD}'));
}

#[tokio::test]
async fn signal_death_reports_signal_not_exit_code() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let script = fake_agent_bin(tmp.path(), "suicidal_agent.sh", "kill -TERM $$\nsleep 10");

    let runner = runner_for(&script);
    let result = runner
        .run_streaming_command(&[], StreamingOptions::default())
        .await
        .unwrap();

    assert_eq!(result.exit_code, None);
    assert_eq!(result.signal, Some(libc_sigterm()));
}

fn libc_sigterm() -> i32 {
    15
}

#[tokio::test]
async fn disconnect_terminates_a_cooperative_child_with_term_only() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let pidfile = tmp.path().join("pid");
    let marker = tmp.path().join("got-term");
    let script = fake_agent_bin(
        tmp.path(),
        "cooperative_agent.sh",
        &format!(
            "trap 'echo yes > {marker}; exit 0' TERM\necho $$ > {pidfile}\nwhile :; do sleep 0.02; done",
            marker = marker.display(),
            pidfile = pidfile.display(),
        ),
    );

    let runner = Arc::new(runner_for(&script));
    let streaming = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            runner
                .run_streaming_command(&[], StreamingOptions::default())
                .await
        })
    };

    let pid = wait_for_pid(&pidfile).await;
    assert!(process_alive(pid));

    runner.disconnect().await;
    wait_until_dead(pid).await;
    streaming.await.unwrap().unwrap();

    // The TERM handler ran: no KILL was needed.
    assert_eq!(
        std::fs::read_to_string(&marker).unwrap().trim(),
        "yes",
        "child should have seen TERM and exited on its own"
    );
}

#[tokio::test]
async fn disconnect_escalates_to_kill_when_term_is_ignored() {
    init_test_logging();
    let tmp = tempfile::tempdir().unwrap();
    let pidfile = tmp.path().join("pid");
    let script = fake_agent_bin(
        tmp.path(),
        "stubborn_agent.sh",
        &format!(
            "trap '' TERM\necho $$ > {}\nwhile :; do sleep 0.02; done",
            pidfile.display()
        ),
    );

    let runner = Arc::new(runner_for(&script));
    let streaming = {
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            runner
                .run_streaming_command(&[], StreamingOptions::default())
                .await
        })
    };

    let pid = wait_for_pid(&pidfile).await;
    runner.disconnect().await;
    wait_until_dead(pid).await;

    // The child ignored TERM, so it must have died from the escalated KILL.
    let result = streaming.await.unwrap().unwrap();
    assert_eq!(result.exit_code, None);
    assert_eq!(result.signal, Some(9));
}

#[tokio::test]
async fn disconnect_with_no_active_child_is_a_no_op() {
    init_test_logging();
    let runner = ProcessRunner::new(RunnerConfig::new("true"));
    runner.disconnect().await;
}

#[tokio::test]
async fn streaming_spawn_failure_surfaces_os_error() {
    init_test_logging();
    let runner = ProcessRunner::new(RunnerConfig::new("/nonexistent/agent"));
    let err = runner
        .run_streaming_command(&[], StreamingOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Spawn { .. }));
}
