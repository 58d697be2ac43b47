use std::time::Duration;

use anyhow::Result;

use super::state::{GameState, GameType};
use crate::level::Solution;

/// Pacing for engines that are stepped live.
pub const STEP_FRAME_DELAY: Duration = Duration::from_millis(50);
/// Pacing for engines whose run is replayed from a trace.
pub const BATCH_FRAME_DELAY: Duration = Duration::from_millis(150);

/// What `execute` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The interpreter is installed; call `step` to advance.
    Live,
    /// The whole run was computed up front. The first frame is the start
    /// state, the last one is finished.
    Trace(Vec<GameState>),
}

/// One unit of observable progress.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// The run is over; the engine will not mutate again until `execute`.
    pub done: bool,
    pub state: GameState,
    pub highlighted_block_id: Option<String>,
    /// An action happened that presentation must animate and acknowledge.
    pub awaits_animation: bool,
}

/// Why `step` had nothing to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    NoInterpreter,
    AlreadyFinished,
    TraceOnly,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Advanced(StepResult),
    Idle(IdleReason),
}

/// A game simulation driven by a learner script.
///
/// Engines are single-threaded and own their state exclusively; everything
/// handed out is a snapshot.
pub trait Engine {
    fn game_type(&self) -> GameType;

    /// The configured start, freshly built on every call.
    fn initial_state(&self) -> GameState;

    /// The current state.
    fn snapshot(&self) -> GameState;

    /// Resets to the start and installs `script` in a fresh interpreter.
    ///
    /// A script that does not compile leaves the engine finished with an
    /// `Error` result and is reported as `Err`.
    fn execute(&mut self, script: &str) -> Result<Execution>;

    fn step(&mut self) -> Step;

    fn check_win(&self, state: &GameState, solution: &Solution) -> bool;

    /// Drops the interpreter and returns to the initial state.
    fn reset(&mut self);

    /// Called after an action animation completes. Returns `true` when the
    /// player just arrived on something that starts a teleport.
    fn trigger_interaction(&mut self) -> bool {
        false
    }

    /// Called after the teleport-out animation completes.
    fn complete_teleport(&mut self) -> bool {
        false
    }

    fn frame_delay(&self) -> Duration {
        STEP_FRAME_DELAY
    }
}
