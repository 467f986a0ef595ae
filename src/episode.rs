//! Episode orchestration: the reset/step/close state machine.

use chrono::Utc;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dataset::ProjectRecord;
use crate::error::EpisodeError;
use crate::reward::{DistanceToPatch, RewardStrategy};
use crate::sandbox::{SandboxConfig, SandboxProcess};
use crate::session::{ExecutionSession, SessionConfig, ToolSpec};
use crate::trajectory::{TrajectoryLog, TrajectoryStep};

/// Score at or above which a step completes the episode.
pub const DONE_SCORE_THRESHOLD: f64 = 10.0;

/// Strategy for choosing the next project out of the pool.
pub trait ProjectPicker: Send {
    /// Picks one record from a non-empty pool.
    fn pick<'a>(&mut self, pool: &'a [ProjectRecord]) -> &'a ProjectRecord;
}

/// Uniformly random project selection, optionally seeded.
pub struct RandomPicker {
    rng: ChaCha8Rng,
}

impl RandomPicker {
    /// Picker seeded from the thread rng.
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Deterministic picker for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomPicker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectPicker for RandomPicker {
    fn pick<'a>(&mut self, pool: &'a [ProjectRecord]) -> &'a ProjectRecord {
        pool.choose(&mut self.rng)
            .expect("pool emptiness is checked before picking")
    }
}

/// What one `step` returns to the caller.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Observation text for the command.
    pub output: String,
    /// Score attached to this step.
    pub score: f64,
    /// True when the score reached [`DONE_SCORE_THRESHOLD`].
    pub done: bool,
    /// Snapshot of the episode trajectory including this step.
    pub trajectory: Vec<TrajectoryStep>,
}

enum State {
    Unstarted,
    Running {
        session: ExecutionSession,
        project: ProjectRecord,
        episode: Uuid,
    },
    Closed,
}

/// Drives episodes over a project pool.
///
/// Construction does not touch any OS resource; the sandbox is acquired
/// in [`EpisodeController::reset`] and released in
/// [`EpisodeController::close`] (or on drop, as a force-kill fallback).
pub struct EpisodeController {
    projects: Vec<ProjectRecord>,
    sandbox_config: SandboxConfig,
    session_config: SessionConfig,
    tools: Vec<ToolSpec>,
    picker: Box<dyn ProjectPicker>,
    scorer: Box<dyn RewardStrategy>,
    trajectory: TrajectoryLog,
    state: State,
}

impl EpisodeController {
    /// Creates a controller in the `Unstarted` state.
    pub fn new(projects: Vec<ProjectRecord>, sandbox_config: SandboxConfig) -> Self {
        Self {
            projects,
            sandbox_config,
            session_config: SessionConfig::default(),
            tools: Vec::new(),
            picker: Box::new(RandomPicker::new()),
            scorer: Box::new(DistanceToPatch::new()),
            trajectory: TrajectoryLog::new(),
            state: State::Unstarted,
        }
    }

    /// Sets the tools installed during bootstrap.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the protocol settings for spawned sessions.
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Replaces the project selection strategy.
    pub fn with_picker(mut self, picker: Box<dyn ProjectPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Replaces the scoring strategy.
    pub fn with_scorer(mut self, scorer: Box<dyn RewardStrategy>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Tears down any prior episode, spawns a fresh sandbox, and
    /// bootstraps a newly picked project. Clears the trajectory.
    pub async fn reset(&mut self) -> Result<(), EpisodeError> {
        self.close().await;
        self.trajectory.clear();

        if self.projects.is_empty() {
            return Err(EpisodeError::EmptyPool);
        }
        let project = self.picker.pick(&self.projects).clone();

        let process = SandboxProcess::spawn(&self.sandbox_config).map_err(EpisodeError::Session)?;
        let mut session = ExecutionSession::with_config(process, self.session_config.clone());
        session.bootstrap(&project, &self.tools).await?;

        let episode = Uuid::new_v4();
        info!(episode = %episode, project = %project.name(), "Episode ready");
        self.state = State::Running {
            session,
            project,
            episode,
        };
        Ok(())
    }

    /// Executes one agent command, scores the resulting state, and
    /// appends the step to the trajectory.
    ///
    /// Valid only while running. `done = true` is the sole termination
    /// signal; the controller does not close itself on completion.
    pub async fn step(&mut self, command: &str) -> Result<StepOutcome, EpisodeError> {
        let State::Running {
            session, project, ..
        } = &mut self.state
        else {
            return Err(EpisodeError::NotRunning);
        };

        let output = session.execute(command).await?.into_text();
        let location = session.current_location().await?;
        let diff = session.extract_patch(project).await?;
        let score = self.scorer.score(command, &output, &location, &diff, project);
        debug!(command, score, location = %location, "Step scored");

        self.trajectory.append(TrajectoryStep {
            command: command.to_string(),
            output: output.clone(),
            location_after: location,
            diff,
            score,
            timestamp: Utc::now(),
        });

        Ok(StepOutcome {
            output,
            score,
            done: score >= DONE_SCORE_THRESHOLD,
            trajectory: self.trajectory.all().to_vec(),
        })
    }

    /// Restores the current project to its base commit without
    /// respawning the sandbox. Returns the reset command output.
    pub async fn reset_project(&mut self) -> Result<String, EpisodeError> {
        let State::Running {
            session, project, ..
        } = &mut self.state
        else {
            return Err(EpisodeError::NotRunning);
        };
        Ok(session.reset_to_base_commit(project).await?)
    }

    /// Terminates the sandbox if one is running. Idempotent; never
    /// fails. The trajectory survives until the next `reset`.
    pub async fn close(&mut self) {
        if let State::Running {
            mut session,
            episode,
            ..
        } = std::mem::replace(&mut self.state, State::Closed)
        {
            session.terminate(self.sandbox_config.grace_timeout).await;
            info!(episode = %episode, "Episode closed");
        }
    }

    /// True while an episode is running.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// The project of the running episode, if any.
    pub fn current_project(&self) -> Option<&ProjectRecord> {
        match &self.state {
            State::Running { project, .. } => Some(project),
            _ => None,
        }
    }

    /// The trajectory recorded so far this episode.
    pub fn trajectory(&self) -> &[TrajectoryStep] {
        self.trajectory.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Local non-existent clone sources: bootstrap's `git clone` fails
    // fast and its error text becomes the observation, which is exactly
    // the degrade-and-continue contract under test.
    fn pool(names: &[&str]) -> Vec<ProjectRecord> {
        names
            .iter()
            .map(|name| ProjectRecord {
                url: format!("/nonexistent/{}", name),
                base_commit: None,
                problem_statement: String::new(),
                hint: String::new(),
                patch: String::new(),
            })
            .collect()
    }

    fn bare_controller(projects: Vec<ProjectRecord>) -> EpisodeController {
        let config = SandboxConfig::new("unused.sif").without_isolation();
        EpisodeController::new(projects, config).with_picker(Box::new(RandomPicker::seeded(7)))
    }

    #[test]
    fn test_seeded_picker_is_deterministic() {
        let projects = pool(&["a", "b", "c", "d", "e"]);
        let mut first = RandomPicker::seeded(42);
        let mut second = RandomPicker::seeded(42);
        for _ in 0..20 {
            assert_eq!(first.pick(&projects).url, second.pick(&projects).url);
        }
    }

    #[tokio::test]
    async fn test_step_before_reset_fails() {
        let mut controller = bare_controller(pool(&["proj"]));
        let err = controller.step("ls").await.unwrap_err();
        assert!(matches!(err, EpisodeError::NotRunning));
    }

    #[tokio::test]
    async fn test_reset_with_empty_pool_fails() {
        let mut controller = bare_controller(Vec::new());
        let err = controller.reset().await.unwrap_err();
        assert!(matches!(err, EpisodeError::EmptyPool));
    }

    #[tokio::test]
    async fn test_reset_enters_running_with_empty_trajectory() {
        let mut controller = bare_controller(pool(&["proj"]));
        controller.reset().await.unwrap();
        assert!(controller.is_running());
        assert!(controller.trajectory().is_empty());
        assert_eq!(controller.current_project().unwrap().name(), "proj");
        controller.close().await;
    }

    #[tokio::test]
    async fn test_step_appends_to_trajectory() {
        let mut controller = bare_controller(pool(&["proj"]));
        controller.reset().await.unwrap();

        let outcome = controller.step("echo hello").await.unwrap();
        assert_eq!(outcome.output, "hello\n");
        // Empty reference patch: score is always zero, never done.
        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.done);
        assert_eq!(outcome.trajectory.len(), 1);
        assert_eq!(controller.trajectory().len(), 1);
        assert_eq!(controller.trajectory()[0].command, "echo hello");

        controller.close().await;
    }

    #[tokio::test]
    async fn test_reset_discards_prior_trajectory() {
        let mut controller = bare_controller(pool(&["proj"]));
        controller.reset().await.unwrap();
        controller.step("echo one").await.unwrap();
        assert_eq!(controller.trajectory().len(), 1);

        controller.reset().await.unwrap();
        assert!(controller.trajectory().is_empty());
        controller.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut controller = bare_controller(pool(&["proj"]));
        controller.reset().await.unwrap();

        controller.close().await;
        assert!(!controller.is_running());
        controller.close().await;
        assert!(!controller.is_running());

        let err = controller.step("ls").await.unwrap_err();
        assert!(matches!(err, EpisodeError::NotRunning));
    }

    #[tokio::test]
    async fn test_close_on_unstarted_is_noop() {
        let mut controller = bare_controller(pool(&["proj"]));
        controller.close().await;
        assert!(!controller.is_running());
    }
}
