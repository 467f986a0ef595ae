//! Error types for swe-env operations.
//!
//! Defines error types for the major subsystems:
//! - Execution session protocol (sandbox spawn, liveness, timeouts)
//! - Episode orchestration
//! - Project record loading and fetching

use thiserror::Error;

/// Errors that can occur on the command/response protocol.
///
/// I/O failures *during* an exchange are intentionally not represented
/// here: they are degraded into [`crate::session::ExecOutcome::IoError`]
/// observations so the episode can continue.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("sandbox process has terminated; reset the episode to continue")]
    ProcessTerminated,

    #[error("command did not produce the end-of-response sentinel within {seconds}s")]
    CommandTimeout { seconds: u64 },

    #[error("failed to spawn sandbox process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors that can occur during episode orchestration.
#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("episode is not running; call reset() first")]
    NotRunning,

    #[error("project pool is empty")]
    EmptyPool,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors that can occur while loading or fetching project records.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("datasets server returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse dataset row: {0}")]
    Parse(String),
}
