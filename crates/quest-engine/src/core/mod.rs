//! Engine contract shared by every game.
//!
//! - [`Engine`]: the object-safe trait the driver and registry talk to.
//! - [`GameState`]: value snapshots that leave an engine.
//! - [`natives`]: wiring from script calls to per-game bindings.

mod engine;
pub mod natives;
mod state;

pub use engine::{
    BATCH_FRAME_DELAY, Engine, Execution, IdleReason, STEP_FRAME_DELAY, Step, StepResult,
};
pub use state::{GameState, GameType, Outcome, RunStatus};
