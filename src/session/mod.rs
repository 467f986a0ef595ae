//! Command/response protocol and project bootstrap.
//!
//! [`ExecutionSession`] drives a live [`SandboxProcess`] through the
//! sentinel-framed protocol: one command line in, accumulated output lines
//! back until the sentinel (or EOF). There is exactly one command in
//! flight at a time; the `&mut self` receivers enforce that by ownership.

use std::time::Duration;

use tracing::{debug, warn};

use crate::dataset::ProjectRecord;
use crate::error::SessionError;
use crate::sandbox::{SandboxProcess, SENTINEL};

/// In-sandbox mount point of the host tool directory.
pub const TOOLS_MOUNT: &str = "/mnt/tools";

/// Protocol-level settings for a session.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Optional deadline on each command exchange. `None` (the default)
    /// waits for the sentinel indefinitely; a hung command then blocks
    /// the session until it is torn down.
    pub command_timeout: Option<Duration>,
}

impl SessionConfig {
    /// Arms a per-command deadline.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

/// An agent tool installable inside the sandbox.
///
/// Under the bound tool directory, each tool provides an `install.sh` and
/// a `bin/` subdirectory whose files are made executable and put on PATH.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Directory name of the tool under the tool mount.
    pub name: String,
}

impl ToolSpec {
    /// Creates a tool spec by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// In-sandbox path of the install script.
    pub fn install_script(&self) -> String {
        format!("{}/{}/install.sh", TOOLS_MOUNT, self.name)
    }

    /// In-sandbox path of the tool's bin directory.
    pub fn bin_dir(&self) -> String {
        format!("{}/{}/bin", TOOLS_MOUNT, self.name)
    }
}

/// Result of one command exchange.
///
/// Pipe failures mid-exchange degrade into [`ExecOutcome::IoError`] so the
/// episode continues with a visibly broken observation instead of
/// aborting; [`ExecOutcome::into_text`] renders the observation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Accumulated output lines up to (excluding) the sentinel.
    Ok(String),
    /// A pipe read or write failed mid-exchange.
    IoError(String),
}

impl ExecOutcome {
    /// True for [`ExecOutcome::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, ExecOutcome::Ok(_))
    }

    /// The observation text: command output, or `"[ERROR] <detail>"`.
    pub fn into_text(self) -> String {
        match self {
            ExecOutcome::Ok(text) => text,
            ExecOutcome::IoError(detail) => format!("[ERROR] {}", detail),
        }
    }
}

/// The command/response session over one sandbox process.
pub struct ExecutionSession {
    process: SandboxProcess,
    config: SessionConfig,
}

impl ExecutionSession {
    /// Wraps a live sandbox process with default protocol settings.
    pub fn new(process: SandboxProcess) -> Self {
        Self::with_config(process, SessionConfig::default())
    }

    /// Wraps a live sandbox process with explicit protocol settings.
    pub fn with_config(process: SandboxProcess, config: SessionConfig) -> Self {
        Self { process, config }
    }

    /// True iff the underlying process has not exited.
    pub fn is_alive(&mut self) -> bool {
        self.process.is_alive()
    }

    /// Sends one command and accumulates output until the sentinel.
    ///
    /// EOF on the output pipe ends the exchange with whatever was read so
    /// far. Fails with [`SessionError::ProcessTerminated`] when the
    /// process has already exited, and with
    /// [`SessionError::CommandTimeout`] when an armed deadline elapses.
    /// After a timeout the command may still be running in the shell, so
    /// the session must be torn down and reset.
    pub async fn execute(&mut self, command: &str) -> Result<ExecOutcome, SessionError> {
        if !self.process.is_alive() {
            return Err(SessionError::ProcessTerminated);
        }

        match self.config.command_timeout {
            None => Ok(self.exchange(command).await),
            Some(limit) => match tokio::time::timeout(limit, self.exchange(command)).await {
                Ok(outcome) => Ok(outcome),
                Err(_) => Err(SessionError::CommandTimeout {
                    seconds: limit.as_secs(),
                }),
            },
        }
    }

    /// One request/response exchange. Pipe failures become `IoError`.
    async fn exchange(&mut self, command: &str) -> ExecOutcome {
        if let Err(e) = self.process.write_line(command).await {
            return ExecOutcome::IoError(e.to_string());
        }

        let mut output = String::new();
        loop {
            match self.process.read_line().await {
                Ok(Some(line)) => {
                    if line.trim() == SENTINEL {
                        break;
                    }
                    output.push_str(&line);
                    output.push('\n');
                }
                // EOF: end of readable output, not a protocol violation.
                Ok(None) => break,
                Err(e) => return ExecOutcome::IoError(e.to_string()),
            }
        }
        ExecOutcome::Ok(output)
    }

    /// Clones the project, enters it, checks out the base commit, and
    /// installs the given tools.
    ///
    /// Order matters: later steps assume the cwd/PATH state left by
    /// earlier ones, since the shell instance persists across commands.
    /// A failing step produces error text as its observation rather than
    /// an error here; only process death aborts the bootstrap.
    pub async fn bootstrap(
        &mut self,
        project: &ProjectRecord,
        tools: &[ToolSpec],
    ) -> Result<(), SessionError> {
        self.run_setup_step(&format!("git clone {}", project.url)).await?;
        self.run_setup_step(&format!("cd {}", project.name())).await?;
        if let Some(commit) = &project.base_commit {
            self.run_setup_step(&format!("git checkout {}", commit)).await?;
        }
        for tool in tools {
            self.run_setup_step(&format!("bash {}", tool.install_script())).await?;
            self.run_setup_step(&format!("export PATH=$PATH:{}", tool.bin_dir())).await?;
            self.run_setup_step(&format!("chmod +x {}/*", tool.bin_dir())).await?;
        }
        Ok(())
    }

    async fn run_setup_step(&mut self, command: &str) -> Result<(), SessionError> {
        let outcome = self.execute(command).await?;
        match &outcome {
            ExecOutcome::Ok(output) => {
                debug!(command, output_bytes = output.len(), "Bootstrap step")
            }
            ExecOutcome::IoError(detail) => {
                warn!(command, detail, "Bootstrap step hit an I/O failure")
            }
        }
        Ok(())
    }

    /// Current working directory of the sandboxed shell.
    pub async fn current_location(&mut self) -> Result<String, SessionError> {
        Ok(self.execute("pwd").await?.into_text().trim().to_string())
    }

    /// Diff of the project working copy against its base commit.
    ///
    /// Afterwards `cd -` restores the previous working directory on a
    /// best-effort basis; its output (including the `OLDPWD not set`
    /// failure when no prior directory is recorded) is discarded.
    pub async fn extract_patch(&mut self, project: &ProjectRecord) -> Result<String, SessionError> {
        let command = match &project.base_commit {
            Some(commit) => format!("cd {} && git diff {}", project.base_dir(), commit),
            None => format!("cd {} && git diff", project.base_dir()),
        };
        let diff = self.execute(&command).await?.into_text();
        let _ = self.execute("cd -").await?;
        Ok(diff)
    }

    /// Discards all working-tree changes and restores the base commit,
    /// without respawning the sandbox. Returns the reset command output.
    pub async fn reset_to_base_commit(
        &mut self,
        project: &ProjectRecord,
    ) -> Result<String, SessionError> {
        let base_dir = project.base_dir();
        self.execute(&format!("cd {}", base_dir)).await?;
        let command = match &project.base_commit {
            Some(commit) => format!("cd {} && git reset --hard {}", base_dir, commit),
            None => format!("cd {} && git reset --hard", base_dir),
        };
        let output = self.execute(&command).await?.into_text();
        let _ = self.execute("cd -").await?;
        Ok(output)
    }

    /// Shuts down the underlying process (see [`SandboxProcess::terminate`]).
    pub async fn terminate(&mut self, grace: Duration) {
        self.process.terminate(grace).await;
    }
}
