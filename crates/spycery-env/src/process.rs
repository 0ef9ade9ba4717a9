//! Run provisioning subprocesses under a time budget.

use anyhow::{Context, Result};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting for a child.
pub const WAIT_CHECK_INTERVAL_MS: u64 = 50;

/// Captured result of a bounded child process.
#[derive(Debug)]
pub struct BoundedOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl BoundedOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Spawn `cmd` with piped output and wait at most `timeout`.
pub fn run_bounded(cmd: &mut Command, timeout: Duration) -> Result<BoundedOutput> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", program))?;
    wait_with_timeout(&mut child, timeout)
}

/// Wait for `child`, killing it once `timeout` has elapsed.
///
/// Output is drained on background threads while the child runs; otherwise a
/// child writing more than the pipe buffer would block and never exit.
pub fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<BoundedOutput> {
    let start = Instant::now();
    let check_interval = Duration::from_millis(WAIT_CHECK_INTERVAL_MS);

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = out.read_to_string(&mut s);
            s
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut s = String::new();
            let _ = err.read_to_string(&mut s);
            s
        })
    });

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                let stdout = stdout_handle
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                let stderr = stderr_handle
                    .map(|h| h.join().unwrap_or_default())
                    .unwrap_or_default();
                return Ok(BoundedOutput {
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    timed_out: false,
                });
            }
            Ok(None) => {}
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_handle.map(|h| h.join());
                let _ = stderr_handle.map(|h| h.join());
                return Err(anyhow::anyhow!("Failed to wait for process: {}", e));
            }
        }

        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            // Grandchildren may still hold the pipes; leave the reader threads detached.
            drop(stdout_handle);
            drop(stderr_handle);
            return Ok(BoundedOutput {
                stdout: String::new(),
                stderr: format!(
                    "Process killed: exceeded timeout of {} seconds",
                    timeout.as_secs_f64()
                ),
                exit_code: None,
                timed_out: true,
            });
        }

        thread::sleep(check_interval);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);
        let out = run_bounded(&mut cmd, Duration::from_secs(10)).unwrap();
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.success());
    }

    #[test]
    fn test_kills_on_timeout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exec sleep 5"]);
        let start = Instant::now();
        let out = run_bounded(&mut cmd, Duration::from_millis(200)).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
