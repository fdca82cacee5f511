//! External process execution.
//!
//! Every component that shells out (evaluation, build, profile update,
//! activation, unit fingerprinting) goes through [`CommandRunner`], so the
//! pipeline can be driven by a scripted double in tests.
//!
//! Two shapes of invocation exist:
//! - `output`: queries. Stdout is captured and returned, stderr is kept for
//!   the error message. An optional timeout is enforced; on expiry the child
//!   is killed.
//! - `stream`: long-running mutations (build, activation). Output is forwarded
//!   line by line to the log and no timeout applies: killing
//!   `switch-to-configuration` halfway leaves the machine in a worse state
//!   than waiting for it.

use std::collections::VecDeque;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{DeployError, Result};

// ---------------------------------------------------------------------------
// CommandLine
// ---------------------------------------------------------------------------

/// A program and its arguments. `Display` renders the exact command line used
/// in logs and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a query and return its stdout. Non-zero exit is an error.
    async fn output(&self, cmd: &CommandLine) -> Result<Vec<u8>>;

    /// Run a command, forwarding its output to the log. Non-zero exit is an error.
    async fn stream(&self, cmd: &CommandLine) -> Result<()>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioCommandRunner {
    query_timeout: Option<Duration>,
}

impl TokioCommandRunner {
    pub fn new(query_timeout: Option<Duration>) -> Self {
        Self { query_timeout }
    }

    fn spawn_error(cmd: &CommandLine, source: std::io::Error) -> DeployError {
        DeployError::ToolSpawn {
            command: cmd.to_string(),
            source,
        }
    }

    fn check_status(cmd: &CommandLine, status: ExitStatus, stderr: &[u8]) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        Err(DeployError::ToolFailed {
            command: cmd.to_string(),
            code: status.code(),
            stderr: tail(&String::from_utf8_lossy(stderr), 2000),
        })
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn output(&self, cmd: &CommandLine) -> Result<Vec<u8>> {
        info!("Running '{cmd}'");
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_error(cmd, e))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Drain both pipes while waiting, otherwise a chatty child blocks on a
        // full pipe buffer and wait() never resolves.
        let collect = async {
            tokio::join!(
                child.wait(),
                drain(stdout_handle.as_mut()),
                drain(stderr_handle.as_mut()),
            )
        };

        let waited = match self.query_timeout {
            Some(timeout) => tokio::time::timeout(timeout, collect)
                .await
                .map_err(|_| timeout),
            None => Ok(collect.await),
        };
        let (status, stdout, stderr) = match waited {
            Ok(done) => done,
            Err(timeout) => {
                let _ = child.kill().await;
                return Err(DeployError::ToolTimeout {
                    command: cmd.to_string(),
                    timeout,
                });
            }
        };

        let status = status.map_err(|e| Self::spawn_error(cmd, e))?;
        let stdout = stdout.map_err(|e| Self::spawn_error(cmd, e))?;
        let stderr = stderr.map_err(|e| Self::spawn_error(cmd, e))?;
        Self::check_status(cmd, status, &stderr)?;
        Ok(stdout)
    }

    async fn stream(&self, cmd: &CommandLine) -> Result<()> {
        info!("Running '{cmd}'");
        let mut child = Command::new(&cmd.program)
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::spawn_error(cmd, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            if let Some(out) = stdout {
                forward_lines(out, "stdout", |_| {}).await;
            }
        });

        // Keep the last stderr lines around for the error message.
        let stderr_task = tokio::spawn(async move {
            let mut recent: VecDeque<String> = VecDeque::new();
            if let Some(err) = stderr {
                forward_lines(err, "stderr", |line| {
                    if recent.len() == 20 {
                        recent.pop_front();
                    }
                    recent.push_back(line.to_string());
                })
                .await;
            }
            Vec::from(recent).join("\n")
        });

        let status = child.wait().await.map_err(|e| Self::spawn_error(cmd, e))?;
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();
        Self::check_status(cmd, status, stderr_tail.as_bytes())?;
        info!("Command '{cmd}' succeeded");
        Ok(())
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Log every line of `pipe` until EOF. Lines need not be UTF-8, and a read
/// error stops logging but keeps draining so the child never sees a closed
/// pipe.
async fn forward_lines<R, F>(pipe: R, stream: &'static str, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                info!(stream, "{line}");
                on_line(line);
            }
            Err(e) => {
                warn!(stream, "can not read command output: {e}");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                return;
            }
        }
    }
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_renders_exact_invocation() {
        let cmd = CommandLine::new("nix-env").args(["--profile", "/nix/var/nix/profiles/system"]);
        let cmd = cmd.arg("--set").arg("/nix/store/abc-web1");
        assert_eq!(
            cmd.to_string(),
            "nix-env --profile /nix/var/nix/profiles/system --set /nix/store/abc-web1"
        );
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[tokio::test]
    async fn output_returns_stdout() {
        let runner = TokioCommandRunner::new(Some(Duration::from_secs(10)));
        let out = runner
            .output(&CommandLine::new("sh").args(["-c", "printf hello"]))
            .await
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn output_drains_both_pipes_past_buffer_size() {
        let runner = TokioCommandRunner::new(Some(Duration::from_secs(10)));
        let script = "head -c 200000 /dev/zero; head -c 200000 /dev/zero >&2";
        let out = runner
            .output(&CommandLine::new("sh").args(["-c", script]))
            .await
            .unwrap();
        assert_eq!(out.len(), 200_000);
    }

    #[tokio::test]
    async fn non_zero_exit_reports_command_and_stderr() {
        let runner = TokioCommandRunner::new(None);
        let cmd = CommandLine::new("sh").args(["-c", "echo broken >&2; exit 3"]);
        let err = runner.output(&cmd).await.unwrap_err();
        match err {
            DeployError::ToolFailed {
                command,
                code,
                stderr,
            } => {
                assert_eq!(command, "sh -c echo broken >&2; exit 3");
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = TokioCommandRunner::new(None);
        let err = runner
            .stream(&CommandLine::new("/nonexistent/nixcd-test-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ToolSpawn { .. }));
    }

    #[tokio::test]
    async fn query_timeout_kills_the_child() {
        let runner = TokioCommandRunner::new(Some(Duration::from_millis(200)));
        let err = runner
            .output(&CommandLine::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::ToolTimeout { .. }));
    }

    #[tokio::test]
    async fn stream_failure_keeps_stderr_tail() {
        let runner = TokioCommandRunner::new(None);
        let cmd = CommandLine::new("sh").args(["-c", "echo progress; echo fatal >&2; exit 1"]);
        let err = runner.stream(&cmd).await.unwrap_err();
        assert!(err.to_string().contains("fatal"));
    }

    #[tokio::test]
    async fn stream_survives_output_that_is_not_utf8() {
        let runner = TokioCommandRunner::new(None);
        let cmd = CommandLine::new("sh").args([
            "-c",
            "printf '\\377\\n' >&2; sleep 0.3; i=0; while [ $i -lt 2000 ]; do echo line$i >&2; i=$((i+1)); done; printf 'caf\\351\\n'; exit 0",
        ]);
        runner.stream(&cmd).await.unwrap();
    }

    #[tokio::test]
    async fn stream_failure_tail_is_lossy_utf8() {
        let runner = TokioCommandRunner::new(None);
        let cmd = CommandLine::new("sh").args(["-c", "printf 'bad \\377 byte\\n' >&2; exit 2"]);
        let err = runner.stream(&cmd).await.unwrap_err();
        assert!(err.to_string().contains("bad \u{FFFD} byte"));
    }
}
