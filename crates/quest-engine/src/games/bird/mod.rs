//! Bird: steer toward the worm, then the nest, without touching walls.
//!
//! The script runs to completion inside `execute`; every `heading` call
//! records a frame, and the whole flight is handed back as a trace.

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use quest_script::{Interpreter, NativeError, RunOutcome, ScriptError, Value, compile_looped};
use serde::Serialize;

use crate::core::natives::{Binding, NativeApi, NativeArgs, NativeCall};
use crate::core::{
    BATCH_FRAME_DELAY, Engine, Execution, GameState, GameType, IdleReason, Outcome, RunStatus, Step,
};
use crate::level::{BirdConfig, Point, Solution};

/// Interpreter steps before the flight is a `Timeout`.
pub const MAX_TICKS: u64 = 100_000;
/// Closer than this to a wall is a crash.
pub const WALL_ACCURACY: f64 = 2.0;
/// Closer than this to the worm or nest counts as reaching it.
pub const BIRD_ACCURACY: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BirdState {
    pub x: f64,
    pub y: f64,
    /// Degrees counter-clockwise from +x.
    pub angle: f64,
    pub has_worm: bool,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl BirdState {
    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Binding context for one flight.
pub struct Flight {
    config: Rc<BirdConfig>,
    state: BirdState,
    trace: Vec<GameState>,
}

impl Flight {
    fn new(config: Rc<BirdConfig>) -> Self {
        let state = initial(&config);
        Self { trace: vec![GameState::Bird(state.clone())], state, config }
    }

    fn record(&mut self) {
        self.trace.push(GameState::Bird(self.state.clone()));
        self.state.status.highlighted_block_id = None;
    }

    /// Flies one unit toward `angle`. Crashing or landing ends the script
    /// by throwing `false` or `true`.
    pub fn heading(&mut self, angle: f64, block_id: Option<&str>) -> Result<(), NativeError> {
        let angle = if angle.is_finite() { angle } else { 0.0 };
        let r = angle.to_radians();
        self.state.x += r.cos();
        self.state.y += r.sin();
        self.state.angle = angle;
        self.state.status.highlighted_block_id = block_id.map(str::to_string);
        self.record();

        let here = self.state.position();
        if self.config.walls.iter().any(|w| w.distance_to(here) < WALL_ACCURACY) {
            return Err(NativeError::Throw(Value::Bool(false)));
        }
        if !self.state.has_worm
            && self.config.worm.is_some_and(|worm| here.distance(worm) < BIRD_ACCURACY)
        {
            self.state.has_worm = true;
            self.record();
        }
        if self.state.has_worm && here.distance(self.config.nest) < BIRD_ACCURACY {
            return Err(NativeError::Throw(Value::Bool(true)));
        }
        Ok(())
    }

    fn api_heading(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.heading(args.number(0), args.block_id())?;
        Ok(Value::Undefined)
    }

    fn api_no_worm(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(!self.state.has_worm))
    }

    fn api_get_x(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.state.x))
    }

    fn api_get_y(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.state.y))
    }
}

pub static BIRD_API: &[Binding<Flight>] = &[
    Binding::action("heading", 1, Flight::api_heading),
    Binding::query("noWorm", 0, Flight::api_no_worm),
    Binding::query("getX", 0, Flight::api_get_x),
    Binding::query("getY", 0, Flight::api_get_y),
];

fn initial(config: &BirdConfig) -> BirdState {
    let start = config.player.start;
    BirdState {
        x: start.x,
        y: start.y,
        angle: start.angle,
        has_worm: config.worm.is_none(),
        status: RunStatus::default(),
    }
}

/// Maps how the wrapped script ended to a result.
fn outcome(run: Result<RunOutcome, ScriptError>) -> Outcome {
    match run {
        Ok(RunOutcome::BudgetExhausted) => Outcome::Timeout,
        Ok(RunOutcome::Completed) => Outcome::Failure,
        Err(err) => match err.thrown() {
            Some(Value::Bool(true)) => Outcome::Success,
            Some(Value::Bool(false)) => Outcome::Failure,
            _ => {
                log::warn!("bird script error: {err}");
                Outcome::Error
            }
        },
    }
}

pub struct BirdEngine {
    config: Rc<BirdConfig>,
    api: NativeApi<Flight>,
    state: BirdState,
}

impl BirdEngine {
    pub fn new(config: &BirdConfig) -> Result<Self> {
        let config = Rc::new(config.clone());
        Ok(Self { state: initial(&config), config, api: NativeApi::new(BIRD_API) })
    }
}

impl Engine for BirdEngine {
    fn game_type(&self) -> GameType {
        GameType::Bird
    }

    fn initial_state(&self) -> GameState {
        GameState::Bird(initial(&self.config))
    }

    fn snapshot(&self) -> GameState {
        GameState::Bird(self.state.clone())
    }

    fn execute(&mut self, script: &str) -> Result<Execution> {
        self.reset();
        let program = match compile_looped(script) {
            Ok(program) => program,
            Err(err) => {
                log::warn!("bird script rejected: {err}");
                self.state.status.finish(Outcome::Error);
                return Err(err).context("bird script does not compile");
            }
        };

        let mut flight = Flight::new(Rc::clone(&self.config));
        let mut interp = Interpreter::new(Rc::new(program), self.api.table());
        let run = interp.run(&mut NativeCall::new(&self.api, &mut flight), MAX_TICKS);
        let result = outcome(run);

        flight.state.status.finish(result);
        flight.record();
        log::debug!("bird: {:?} after {} steps, {} frames", result, interp.steps(), flight.trace.len());
        self.state = flight.state.clone();
        self.state.status.highlighted_block_id = None;
        Ok(Execution::Trace(flight.trace))
    }

    fn step(&mut self) -> Step {
        Step::Idle(IdleReason::TraceOnly)
    }

    fn check_win(&self, state: &GameState, _solution: &Solution) -> bool {
        state.result() == Outcome::Success
    }

    fn reset(&mut self) {
        self.state = initial(&self.config);
    }

    fn frame_delay(&self) -> Duration {
        BATCH_FRAME_DELAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{BirdPlayer, BirdStart, SolutionKind, Wall};

    fn config(worm: Option<Point>, walls: Vec<Wall>) -> BirdConfig {
        BirdConfig {
            player: BirdPlayer { start: BirdStart { x: 10.0, y: 50.0, angle: 0.0 } },
            worm,
            nest: Point::new(80.0, 50.0),
            walls,
        }
    }

    fn fly(config: &BirdConfig, script: &str) -> (BirdEngine, Vec<GameState>) {
        let mut engine = BirdEngine::new(config).unwrap();
        match engine.execute(script).unwrap() {
            Execution::Trace(frames) => (engine, frames),
            Execution::Live => panic!("bird runs are traced"),
        }
    }

    fn bird(state: &GameState) -> &BirdState {
        match state {
            GameState::Bird(s) => s,
            _ => panic!("not a bird state"),
        }
    }

    // ── Outcomes ──────────────────────────────────────────────────────────

    #[test]
    fn reaching_the_nest_with_the_worm_wins() {
        let (engine, frames) = fly(&config(Some(Point::new(40.0, 50.0)), Vec::new()), "heading(0);");
        let last = frames.last().unwrap();
        assert_eq!(last.result(), Outcome::Success);
        assert!(last.is_finished());
        assert!(bird(last).has_worm);
        assert!(engine.check_win(last, &Solution::of_kind(SolutionKind::ReachTarget)));
        assert_eq!(engine.snapshot().result(), Outcome::Success);
    }

    #[test]
    fn worm_pickup_records_an_extra_frame() {
        let (_, frames) = fly(&config(Some(Point::new(40.0, 50.0)), Vec::new()), "heading(0);");
        let pickup = frames.iter().position(|f| bird(f).has_worm).unwrap();
        assert_eq!(bird(&frames[pickup]).x, bird(&frames[pickup - 1]).x);
    }

    #[test]
    fn touching_a_wall_fails() {
        let wall = Wall { x0: 20.0, y0: 0.0, x1: 20.0, y1: 100.0 };
        let (_, frames) = fly(&config(None, vec![wall]), "heading(0);");
        let last = bird(frames.last().unwrap());
        assert_eq!(last.status.result, Outcome::Failure);
        assert!((last.x - 19.0).abs() < 1e-9);
    }

    #[test]
    fn never_flying_times_out() {
        let (_, frames) = fly(&config(None, Vec::new()), "var x = 0;");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].result(), Outcome::Timeout);
    }

    #[test]
    fn breaking_out_without_landing_fails() {
        let (_, frames) = fly(&config(None, Vec::new()), "heading(90);\nbreak;");
        assert_eq!(frames.last().unwrap().result(), Outcome::Failure);
    }

    #[test]
    fn other_throws_are_errors() {
        let (_, frames) = fly(&config(None, Vec::new()), "throw 'lost';");
        assert_eq!(frames.last().unwrap().result(), Outcome::Error);
    }

    #[test]
    fn helper_functions_can_fly() {
        let worm = Some(Point::new(40.0, 50.0));
        let (_, frames) = fly(&config(worm, Vec::new()), "function fly() {\n  heading(0);\n}\nfly();");
        assert_eq!(frames.last().unwrap().result(), Outcome::Success);
    }

    // ── Trace ─────────────────────────────────────────────────────────────

    #[test]
    fn trace_starts_at_the_start_and_carries_highlights() {
        let (engine, frames) = fly(&config(None, Vec::new()), "heading(90, 'block_id_up');\nbreak;");
        assert_eq!(frames[0], engine.initial_state());
        assert_eq!(frames[1].highlighted_block_id(), Some("up"));
        assert!((bird(&frames[1]).y - 51.0).abs() < 1e-9);
        assert_eq!(frames[2].highlighted_block_id(), None);
    }

    #[test]
    fn compile_errors_are_reported() {
        let mut engine = BirdEngine::new(&config(None, Vec::new())).unwrap();
        assert!(engine.execute("heading(").is_err());
        assert_eq!(engine.snapshot().result(), Outcome::Error);
        assert_eq!(engine.step(), Step::Idle(IdleReason::TraceOnly));
    }

    #[test]
    fn compile_errors_point_at_the_learner_line() {
        let mut engine = BirdEngine::new(&config(None, Vec::new())).unwrap();
        let err = engine.execute("heading(0);\nheading(").unwrap_err();
        assert!(format!("{err:#}").contains("syntax error at 2:"), "{err:#}");
    }
}
