//! Lifecycle script execution
//!
//! Scripts are opaque external programs: the harness only looks at the exit
//! code and the wall-clock time. stdout goes straight to the harness's own
//! stdout. stderr is forwarded line by line as it arrives and also kept so a
//! failure can report it.
//!
//! On unix every script runs in its own process group. A timeout kills the
//! whole group, so children started by the script do not outlive it. SIGINT
//! and SIGTERM sent to the harness while a script runs are passed on to the
//! script's group.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use ozone_harness_core::error::ScriptError;
use ozone_harness_core::metrics as m;

/// How long to wait for the stderr reader once the script has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval of [`ScriptRunner::run_blocking`].
const BLOCKING_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs lifecycle scripts with a fixed set of injected environment variables.
#[derive(Debug, Clone, Default)]
pub struct ScriptRunner {
    env: BTreeMap<String, String>,
}

impl ScriptRunner {
    /// `env` is merged into the inherited environment of every script.
    pub fn new(env: BTreeMap<String, String>) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Runs `script` from `dir` and waits up to `timeout` for it to exit.
    ///
    /// - exit code 0: `Ok(())`
    /// - non-zero exit: [`ScriptError::Failed`] with the captured stderr
    /// - deadline passed: the process group is killed and
    ///   [`ScriptError::Timeout`] returned; there is no retry
    pub async fn run(&self, script: &str, dir: &Path, timeout: Duration) -> Result<(), ScriptError> {
        info!(script, dir = %dir.display(), "executing script");
        let started = Instant::now();

        let mut child = tokio::process::Command::from(self.command(script, dir))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                script: script.to_owned(),
                source,
            })?;

        // kills the group if this future is dropped before the script exits
        let mut group = GroupGuard::new(child.id());
        #[cfg(unix)]
        let _interrupts = child.id().and_then(crate::interrupt::register);
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_stderr(stderr)));

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        let result = match waited {
            Ok(Ok(status)) => {
                group.disarm();
                let stderr = drain_stderr(stderr_task).await;
                check_status(script, status, stderr)
            }
            Ok(Err(source)) => Err(ScriptError::Wait {
                script: script.to_owned(),
                source,
            }),
            Err(_) => {
                error!(script, timeout_secs = timeout.as_secs(), "script timed out");
                group.kill();
                if let Err(e) = child.kill().await {
                    debug!(script, error = %e, "kill after timeout failed");
                }
                drain_stderr(stderr_task).await;
                Err(ScriptError::Timeout {
                    script: script.to_owned(),
                    timeout,
                })
            }
        };

        record(script, &result, started.elapsed());
        result
    }

    /// Synchronous [`run`](Self::run), for teardown paths that cannot await.
    ///
    /// stderr is passed through rather than captured.
    pub fn run_blocking(&self, script: &str, dir: &Path, timeout: Duration) -> Result<(), ScriptError> {
        info!(script, dir = %dir.display(), "executing script (blocking)");
        let started = Instant::now();

        let mut command = self.command(script, dir);
        command.stderr(Stdio::inherit());
        let mut child = command.spawn().map_err(|source| ScriptError::Spawn {
            script: script.to_owned(),
            source,
        })?;
        #[cfg(unix)]
        let _interrupts = crate::interrupt::register(child.id());

        let deadline = started + timeout;
        let result = loop {
            match child.try_wait() {
                Ok(Some(status)) => break check_status(script, status, String::new()),
                Ok(None) if Instant::now() >= deadline => {
                    error!(script, timeout_secs = timeout.as_secs(), "script timed out");
                    kill_group(Some(child.id()));
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(ScriptError::Timeout {
                        script: script.to_owned(),
                        timeout,
                    });
                }
                Ok(None) => std::thread::sleep(BLOCKING_POLL_INTERVAL),
                Err(source) => {
                    break Err(ScriptError::Wait {
                        script: script.to_owned(),
                        source,
                    });
                }
            }
        };

        record(script, &result, started.elapsed());
        result
    }

    fn command(&self, script: &str, dir: &Path) -> std::process::Command {
        let mut command = std::process::Command::new(dir.join(script));
        command
            .current_dir(dir)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
    }
}

fn check_status(script: &str, status: ExitStatus, stderr: String) -> Result<(), ScriptError> {
    match status.code() {
        Some(0) => {
            info!(script, "script executed successfully");
            Ok(())
        }
        Some(code) => {
            error!(script, code, stderr = %stderr.trim_end(), "script failed");
            Err(ScriptError::Failed {
                script: script.to_owned(),
                code,
                stderr,
            })
        }
        None => {
            error!(script, status = %status, "script terminated by signal");
            Err(ScriptError::Killed {
                script: script.to_owned(),
                stderr,
            })
        }
    }
}

fn record(script: &str, result: &Result<(), ScriptError>, elapsed: Duration) {
    let outcome = match result {
        Ok(()) => "success",
        Err(e) if e.is_timeout() => "timeout",
        Err(_) => "failure",
    };
    metrics::counter!(
        m::SCRIPT_RUNS_TOTAL,
        m::LABEL_SCRIPT => script.to_owned(),
        m::LABEL_RESULT => outcome
    )
    .increment(1);
    metrics::histogram!(m::SCRIPT_DURATION_SECONDS, m::LABEL_SCRIPT => script.to_owned())
        .record(elapsed.as_secs_f64());
}

/// Echoes stderr lines as they arrive and returns everything read.
async fn forward_stderr(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                eprintln!("{line}");
                captured.push_str(&line);
                captured.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "stderr read failed");
                break;
            }
        }
    }
    captured
}

/// Waits briefly for the stderr reader. A grandchild that escaped the
/// process group can hold the pipe open indefinitely.
async fn drain_stderr(task: Option<JoinHandle<String>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            debug!(error = %e, "stderr reader task failed");
            String::new()
        }
        Err(_) => {
            task.abort();
            String::new()
        }
    }
}

/// Process group of a running script, killed on drop unless disarmed.
struct GroupGuard {
    pid: Option<u32>,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }

    fn kill(&mut self) {
        kill_group(self.pid.take());
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal. The group id is the child's pid,
    // set by process_group(0) at spawn.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(dir: &Path, name: &str, body: &str) {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    fn runner() -> ScriptRunner {
        let mut env = BTreeMap::new();
        env.insert("TERM".to_owned(), "xterm-256color".to_owned());
        ScriptRunner::new(env)
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "ok.sh", "exit 0");
        runner()
            .run("ok.sh", tmp.path(), Duration::from_secs(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code_and_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "fail.sh", "echo 'compose exploded' >&2\nexit 2");

        let err = runner()
            .run("fail.sh", tmp.path(), Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_eq!(err.exit_code(), Some(2));
        match err {
            ScriptError::Failed { stderr, .. } => assert!(stderr.contains("compose exploded")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn runs_in_given_directory_with_env() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "env.sh", "printf '%s' \"$TERM\" > term.txt");

        runner()
            .run("env.sh", tmp.path(), Duration::from_secs(10))
            .await
            .unwrap();

        let term = std::fs::read_to_string(tmp.path().join("term.txt")).unwrap();
        assert_eq!(term, "xterm-256color");
    }

    #[tokio::test]
    async fn missing_script_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = runner()
            .run("absent.sh", tmp.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_script() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "start.sh", "echo $$ > pid\nsleep 5");

        let started = Instant::now();
        let err = runner()
            .run("start.sh", tmp.path(), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));

        let pid: libc::pid_t = std::fs::read_to_string(tmp.path().join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // SAFETY: signal 0 only checks for existence
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive, "script process {pid} still alive");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_the_run_kills_the_script() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "start.sh", "echo $$ > pid\nsleep 30");

        let runner = runner();
        let run = runner.run("start.sh", tmp.path(), Duration::from_secs(60));
        let cut = tokio::time::timeout(Duration::from_millis(500), run).await;
        assert!(cut.is_err(), "run should still be waiting");

        let pid: libc::pid_t = std::fs::read_to_string(tmp.path().join("pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // the killed shell may linger briefly as a zombie until reaped
        let mut gone = false;
        for _ in 0..50 {
            let mut status = 0;
            // SAFETY: non-blocking reap of our own child, then existence check
            unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
            if unsafe { libc::kill(pid, 0) } != 0 {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone, "script process {pid} still alive");
    }

    #[test]
    fn blocking_run_reports_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "fail.sh", "exit 3");
        let err = runner()
            .run_blocking("fail.sh", tmp.path(), Duration::from_secs(10))
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn blocking_run_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        script(tmp.path(), "slow.sh", "sleep 5");
        let err = runner()
            .run_blocking("slow.sh", tmp.path(), Duration::from_millis(300))
            .unwrap_err();
        assert!(err.is_timeout());
    }
}
