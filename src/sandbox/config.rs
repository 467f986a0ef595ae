//! Configuration for the sandbox process.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::SENTINEL;

/// Configuration for launching the sandboxed shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container image to execute (a `.sif` file).
    pub image: PathBuf,
    /// Container runtime binary ("apptainer" or "singularity").
    pub runtime: String,
    /// Working directory the shell starts in.
    pub workdir: PathBuf,
    /// Host directories bound into the sandbox.
    pub binds: Vec<BindMount>,
    /// Grace period between the exit request and a forced kill.
    pub grace_timeout: Duration,
    /// Whether to wrap the shell in the container runtime. Disabled only
    /// for tests and local debugging, where a plain `/bin/bash` runs the
    /// same read-eval loop without isolation.
    pub use_isolation: bool,
}

impl SandboxConfig {
    /// Creates a configuration for the given image with defaults.
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            runtime: "apptainer".to_string(),
            workdir: PathBuf::from("/tmp"),
            binds: Vec::new(),
            grace_timeout: Duration::from_secs(3),
            use_isolation: true,
        }
    }

    /// Sets the container runtime binary.
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Sets the initial working directory.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Adds a bind mount.
    pub fn with_bind(mut self, bind: BindMount) -> Self {
        self.binds.push(bind);
        self
    }

    /// Sets the termination grace period.
    pub fn with_grace_timeout(mut self, grace: Duration) -> Self {
        self.grace_timeout = grace;
        self
    }

    /// Runs a plain local bash instead of the container runtime.
    pub fn without_isolation(mut self) -> Self {
        self.use_isolation = false;
        self
    }

    /// The program to spawn.
    pub fn program(&self) -> String {
        if self.use_isolation {
            self.runtime.clone()
        } else {
            "/bin/bash".to_string()
        }
    }

    /// Arguments for the program returned by [`Self::program`].
    ///
    /// Isolation flags follow the apptainer contract: no host filesystem,
    /// home directory, or environment beyond the declared binds, with the
    /// working directory pinned inside the container.
    pub fn launch_args(&self) -> Vec<String> {
        let repl = read_eval_loop();
        if !self.use_isolation {
            return vec!["-c".to_string(), repl];
        }

        let mut args = vec![
            "exec".to_string(),
            "--containall".to_string(),
            "--no-home".to_string(),
            "--cleanenv".to_string(),
            "--pwd".to_string(),
            self.workdir.to_string_lossy().to_string(),
        ];
        for bind in &self.binds {
            args.push("--bind".to_string());
            args.push(bind.to_bind_arg());
        }
        args.push(self.image.to_string_lossy().to_string());
        args.extend([
            "/bin/bash".to_string(),
            "-c".to_string(),
            repl,
        ]);
        args
    }
}

/// The persistent shell loop: evaluate each stdin line with stderr folded
/// into stdout, then print the sentinel. Note `read` without `-r`:
/// backslashes in the incoming line are escape-processed before eval.
fn read_eval_loop() -> String {
    format!(
        r#"while read line; do eval "$line" 2>&1; echo {}; done"#,
        SENTINEL
    )
}

/// A host directory exposed inside the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path.
    pub host_path: PathBuf,
    /// In-sandbox path.
    pub container_path: PathBuf,
}

impl BindMount {
    /// Creates a new bind mount.
    pub fn new(host: impl Into<PathBuf>, container: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host.into(),
            container_path: container.into(),
        }
    }

    /// Returns the `--bind` argument format.
    pub fn to_bind_arg(&self) -> String {
        format!(
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SandboxConfig::new("env.sif");
        assert_eq!(config.runtime, "apptainer");
        assert_eq!(config.workdir, PathBuf::from("/tmp"));
        assert_eq!(config.grace_timeout, Duration::from_secs(3));
        assert!(config.use_isolation);
    }

    #[test]
    fn test_launch_args_isolated() {
        let config = SandboxConfig::new("/images/env.sif")
            .with_bind(BindMount::new("/srv/tools", "/mnt/tools"));
        assert_eq!(config.program(), "apptainer");

        let args = config.launch_args();
        assert_eq!(args[0], "exec");
        assert!(args.contains(&"--containall".to_string()));
        assert!(args.contains(&"--no-home".to_string()));
        assert!(args.contains(&"--cleanenv".to_string()));
        assert!(args.contains(&"/srv/tools:/mnt/tools".to_string()));
        assert!(args.contains(&"/images/env.sif".to_string()));
        assert!(args.last().unwrap().contains(SENTINEL));
    }

    #[test]
    fn test_launch_args_pwd_precedes_image() {
        let config = SandboxConfig::new("env.sif").with_workdir("/work");
        let args = config.launch_args();
        let pwd_pos = args.iter().position(|a| a == "--pwd").unwrap();
        assert_eq!(args[pwd_pos + 1], "/work");
        let image_pos = args.iter().position(|a| a == "env.sif").unwrap();
        assert!(pwd_pos < image_pos);
    }

    #[test]
    fn test_launch_args_bare_shell() {
        let config = SandboxConfig::new("unused.sif").without_isolation();
        assert_eq!(config.program(), "/bin/bash");
        let args = config.launch_args();
        assert_eq!(args[0], "-c");
        assert!(args[1].starts_with("while read line"));
    }

    #[test]
    fn test_bind_mount_arg() {
        let bind = BindMount::new("/host/tools", "/mnt/tools");
        assert_eq!(bind.to_bind_arg(), "/host/tools:/mnt/tools");
    }
}
