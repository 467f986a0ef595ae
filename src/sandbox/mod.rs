//! Sandbox process ownership.
//!
//! Owns one long-running isolated shell process executing a fixed
//! read-eval loop: each stdin line is evaluated in a persistent shell
//! instance, then a sentinel line is printed to mark end-of-response.
//! Working directory and exported variables persist across commands.

mod config;
mod process;

pub use config::{BindMount, SandboxConfig};
pub use process::SandboxProcess;

/// Literal line the sandboxed shell prints after evaluating each command.
pub const SENTINEL: &str = "__END__";
