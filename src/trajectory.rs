//! Episode trajectory recording.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step of an episode: the command issued, what came back, and the
/// score attached at append time. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryStep {
    /// Shell command the agent issued.
    pub command: String,
    /// Observation returned for the command.
    pub output: String,
    /// Working directory after the command ran.
    pub location_after: String,
    /// Accumulated diff against the base commit at this point.
    pub diff: String,
    /// Score computed for this step.
    pub score: f64,
    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Append-only ordered record of the current episode.
#[derive(Debug, Default, Clone)]
pub struct TrajectoryLog {
    steps: Vec<TrajectoryStep>,
}

impl TrajectoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn append(&mut self, step: TrajectoryStep) {
        self.steps.push(step);
    }

    /// All steps in order.
    pub fn all(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    /// Discards all steps.
    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no steps have been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(command: &str, score: f64) -> TrajectoryStep {
        TrajectoryStep {
            command: command.to_string(),
            output: String::new(),
            location_after: "/tmp".to_string(),
            diff: String::new(),
            score,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut log = TrajectoryLog::new();
        log.append(step("ls", 0.5));
        log.append(step("pwd", 1.5));

        let steps = log.all();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].command, "ls");
        assert_eq!(steps[1].command, "pwd");
        assert_eq!(steps[1].score, 1.5);
    }

    #[test]
    fn test_clear_empties_log() {
        let mut log = TrajectoryLog::new();
        log.append(step("ls", 0.0));
        assert!(!log.is_empty());

        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn test_step_serialization_round_trip() {
        let original = step("git diff", 31.0);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: TrajectoryStep = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.command, "git diff");
        assert_eq!(parsed.score, 31.0);
    }
}
