//! The sandboxed shell process and its pipes.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::SandboxConfig;
use crate::error::SessionError;

/// One long-running sandboxed shell with line-oriented pipe access.
///
/// The process is force-killed when the handle is dropped; callers that
/// want a graceful shutdown call [`SandboxProcess::terminate`] first.
pub struct SandboxProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl SandboxProcess {
    /// Launches the sandbox runtime with piped stdin/stdout.
    pub fn spawn(config: &SandboxConfig) -> Result<Self, SessionError> {
        let mut command = Command::new(config.program());
        command
            .args(config.launch_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if !config.use_isolation {
            // No --pwd flag outside the container runtime.
            command.current_dir(&config.workdir);
        }

        let mut child = command.spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| {
            SessionError::Spawn(std::io::Error::other("sandbox stdin pipe missing"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            SessionError::Spawn(std::io::Error::other("sandbox stdout pipe missing"))
        })?;

        debug!(
            pid = child.id(),
            program = %config.program(),
            "Sandbox process spawned"
        );

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    /// True iff the process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// OS process id, when still running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Writes one line to the shell's stdin and flushes.
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    /// Reads one line from the shell's stdout. `None` means EOF.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.stdout.next_line().await
    }

    /// Best-effort shutdown: request `exit`, wait up to `grace`, then
    /// force-kill. Never fails; safe on an already-dead process.
    pub async fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }

        if let Err(e) = self.write_line("exit").await {
            debug!(error = %e, "Exit request failed, proceeding to kill");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "Sandbox process exited"),
            Ok(Err(e)) => {
                debug!(error = %e, "Wait failed, forcing kill");
                if let Err(e) = self.child.kill().await {
                    debug!(error = %e, "Force kill failed");
                }
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "Sandbox did not exit within grace period, killing"
                );
                if let Err(e) = self.child.kill().await {
                    debug!(error = %e, "Force kill failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{SandboxConfig, SENTINEL};

    fn bare_config() -> SandboxConfig {
        SandboxConfig::new("unused.sif").without_isolation()
    }

    #[tokio::test]
    async fn test_spawn_and_exchange() {
        let mut process = SandboxProcess::spawn(&bare_config()).unwrap();
        assert!(process.is_alive());

        process.write_line("echo hello").await.unwrap();
        assert_eq!(process.read_line().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(
            process.read_line().await.unwrap().as_deref(),
            Some(SENTINEL)
        );

        process.terminate(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_stderr_folded_into_stdout() {
        let mut process = SandboxProcess::spawn(&bare_config()).unwrap();

        process.write_line("echo oops >&2").await.unwrap();
        assert_eq!(process.read_line().await.unwrap().as_deref(), Some("oops"));
        assert_eq!(
            process.read_line().await.unwrap().as_deref(),
            Some(SENTINEL)
        );

        process.terminate(Duration::from_secs(2)).await;
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut process = SandboxProcess::spawn(&bare_config()).unwrap();
        process.terminate(Duration::from_secs(2)).await;
        assert!(!process.is_alive());
        // Second call on a dead process is a no-op.
        process.terminate(Duration::from_secs(2)).await;
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn test_eof_after_exit_command() {
        let mut process = SandboxProcess::spawn(&bare_config()).unwrap();
        process.write_line("exit").await.unwrap();
        assert_eq!(process.read_line().await.unwrap(), None);
    }
}
