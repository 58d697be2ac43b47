//! Turtle graphics: a pen that draws while it moves.
//!
//! Drawing primitives append to a command log; presentation replays the log
//! on a canvas. Winning compares the rendered log against the rendering of a
//! reference script run headless with the same primitives.

pub mod canvas;

use std::rc::Rc;

use anyhow::{Context, Result, bail};
use quest_script::{Interpreter, NativeError, RunOutcome, Value, compile};
use serde::Serialize;

use crate::core::natives::{Binding, NativeApi, NativeArgs, NativeCall, Slice, run_slice};
use crate::core::{
    Engine, Execution, GameState, GameType, IdleReason, Outcome, RunStatus, Step, StepResult,
};
use crate::level::{Solution, TurtleConfig, TurtleStart};

/// Ops per `step` when the script draws nothing.
pub const PAUSE_EVERY: u64 = 1_000;
/// Ops per run before the result is `Timeout`.
pub const MAX_OPS: u64 = 100_000;
/// Colour every log starts with.
pub const DEFAULT_PEN_COLOUR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum DrawCommand {
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    PenWidth { width: f64 },
    PenColour { colour: String },
    Stroke,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurtlePose {
    pub x: f64,
    pub y: f64,
    /// Degrees clockwise from north.
    pub heading: f64,
    pub pen_down: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurtleState {
    pub turtle: TurtlePose,
    pub commands: Vec<DrawCommand>,
    #[serde(flatten)]
    pub status: RunStatus,
}

fn finite(n: f64) -> f64 {
    if n.is_finite() { n } else { 0.0 }
}

/// The turtle and its command log; what the bindings draw on.
#[derive(Debug, Clone)]
pub struct Sketch {
    pub turtle: TurtlePose,
    pub commands: Vec<DrawCommand>,
}

impl Sketch {
    pub fn new(start: &TurtleStart) -> Self {
        Self {
            turtle: TurtlePose {
                x: start.x,
                y: start.y,
                heading: start.direction,
                pen_down: start.pen_down,
                visible: true,
            },
            commands: vec![DrawCommand::PenColour { colour: DEFAULT_PEN_COLOUR.to_string() }],
        }
    }

    pub fn advance(&mut self, distance: f64) {
        let distance = finite(distance);
        let t = &mut self.turtle;
        if t.pen_down {
            self.commands.push(DrawCommand::MoveTo { x: t.x, y: t.y });
        }
        let r = t.heading.to_radians();
        t.x += distance * r.sin();
        t.y -= distance * r.cos();
        if t.pen_down {
            self.commands.push(DrawCommand::LineTo { x: t.x, y: t.y });
            self.commands.push(DrawCommand::Stroke);
        }
    }

    pub fn turn(&mut self, degrees: f64) {
        self.turtle.heading = (self.turtle.heading + finite(degrees)).rem_euclid(360.0);
    }

    fn api_move_forward(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.advance(args.number(0));
        Ok(Value::Undefined)
    }

    fn api_move_backward(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.advance(-args.number(0));
        Ok(Value::Undefined)
    }

    fn api_turn_right(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turn(args.number(0));
        Ok(Value::Undefined)
    }

    fn api_turn_left(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turn(-args.number(0));
        Ok(Value::Undefined)
    }

    fn api_pen_up(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turtle.pen_down = false;
        Ok(Value::Undefined)
    }

    fn api_pen_down(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turtle.pen_down = true;
        Ok(Value::Undefined)
    }

    fn api_pen_width(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.commands.push(DrawCommand::PenWidth { width: finite(args.number(0)) });
        Ok(Value::Undefined)
    }

    fn api_pen_colour(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.commands.push(DrawCommand::PenColour { colour: args.text(0) });
        Ok(Value::Undefined)
    }

    fn api_hide_turtle(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turtle.visible = false;
        Ok(Value::Undefined)
    }

    fn api_show_turtle(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turtle.visible = true;
        Ok(Value::Undefined)
    }

    // Text output is not rendered.
    fn api_ignored(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Undefined)
    }
}

pub static TURTLE_API: &[Binding<Sketch>] = &[
    Binding::action("moveForward", 1, Sketch::api_move_forward),
    Binding::action("moveBackward", 1, Sketch::api_move_backward),
    Binding::action("turnRight", 1, Sketch::api_turn_right),
    Binding::action("turnLeft", 1, Sketch::api_turn_left),
    Binding::action("penUp", 0, Sketch::api_pen_up),
    Binding::action("penDown", 0, Sketch::api_pen_down),
    Binding::action("penWidth", 1, Sketch::api_pen_width),
    Binding::action("penColour", 1, Sketch::api_pen_colour),
    Binding::action("hideTurtle", 0, Sketch::api_hide_turtle),
    Binding::action("showTurtle", 0, Sketch::api_show_turtle),
    Binding::query("print", 1, Sketch::api_ignored),
    Binding::query("font", 3, Sketch::api_ignored),
];

pub struct TurtleEngine {
    start: TurtleStart,
    api: NativeApi<Sketch>,
    sketch: Sketch,
    status: RunStatus,
    interpreter: Option<Interpreter>,
    ops_left: u64,
}

impl TurtleEngine {
    pub fn new(config: &TurtleConfig) -> Result<Self> {
        let start = config.player.start;
        Ok(Self {
            sketch: Sketch::new(&start),
            start,
            api: NativeApi::new(TURTLE_API),
            status: RunStatus::default(),
            interpreter: None,
            ops_left: MAX_OPS,
        })
    }

    /// Runs `script` to completion on a fresh turtle and returns its log.
    pub fn run_headless(&self, script: &str) -> Result<Vec<DrawCommand>> {
        let program = compile(script).context("reference drawing does not compile")?;
        let mut sketch = Sketch::new(&self.start);
        let mut interp = Interpreter::new(Rc::new(program), self.api.table());
        let run = interp.run(&mut NativeCall::new(&self.api, &mut sketch), MAX_OPS);
        match run {
            Ok(RunOutcome::Completed) => Ok(sketch.commands),
            Ok(RunOutcome::BudgetExhausted) => bail!("reference drawing ran out of steps"),
            Err(err) => bail!("reference drawing failed: {err}"),
        }
    }

    fn state(&self) -> TurtleState {
        TurtleState {
            turtle: self.sketch.turtle.clone(),
            commands: self.sketch.commands.clone(),
            status: self.status.clone(),
        }
    }

    fn advance(&mut self) -> StepResult {
        let mut highlight = None;
        let mut awaits_animation = false;

        if let Some(interp) = self.interpreter.as_mut() {
            if self.ops_left == 0 {
                self.status.finish(Outcome::Timeout);
            } else {
                let budget = PAUSE_EVERY.min(self.ops_left);
                let (slice, used) = run_slice(interp, &self.api, &mut self.sketch, budget);
                self.ops_left -= used;
                match slice {
                    // The win check decides the result of a completed drawing.
                    Slice::Acted { block_id } => {
                        highlight = block_id;
                        awaits_animation = true;
                        if !interp.has_more_code() {
                            self.status.finish(Outcome::Unset);
                        }
                    }
                    Slice::Exhausted => self.status.finish(Outcome::Unset),
                    Slice::Paused if self.ops_left == 0 => self.status.finish(Outcome::Timeout),
                    Slice::Paused => {}
                    Slice::Failed(err) => {
                        log::warn!("turtle script error: {err}");
                        self.status.finish(Outcome::Error);
                    }
                }
            }
        }

        self.status.highlighted_block_id = highlight.clone();
        if self.status.is_finished {
            let commands = self.sketch.commands.len();
            log::debug!("turtle: finished with {:?}, {commands} commands", self.status.result);
        }
        StepResult {
            done: self.status.is_finished,
            state: GameState::Turtle(self.state()),
            highlighted_block_id: highlight,
            awaits_animation,
        }
    }
}

impl Engine for TurtleEngine {
    fn game_type(&self) -> GameType {
        GameType::Turtle
    }

    fn initial_state(&self) -> GameState {
        let sketch = Sketch::new(&self.start);
        GameState::Turtle(TurtleState {
            turtle: sketch.turtle,
            commands: sketch.commands,
            status: RunStatus::default(),
        })
    }

    fn snapshot(&self) -> GameState {
        GameState::Turtle(self.state())
    }

    fn execute(&mut self, script: &str) -> Result<Execution> {
        self.reset();
        let program = match compile(script) {
            Ok(program) => program,
            Err(err) => {
                log::warn!("turtle script rejected: {err}");
                self.status.finish(Outcome::Error);
                return Err(err).context("turtle script does not compile");
            }
        };
        self.interpreter = Some(Interpreter::new(Rc::new(program), self.api.table()));
        log::debug!("turtle: script installed");
        Ok(Execution::Live)
    }

    fn step(&mut self) -> Step {
        if self.interpreter.is_none() {
            return Step::Idle(IdleReason::NoInterpreter);
        }
        if self.status.is_finished {
            return Step::Idle(IdleReason::AlreadyFinished);
        }
        Step::Advanced(self.advance())
    }

    fn check_win(&self, state: &GameState, solution: &Solution) -> bool {
        let GameState::Turtle(state) = state else {
            return false;
        };
        let Some(script) = solution.solution_script.as_deref() else {
            log::warn!("turtle: no reference drawing to compare against");
            return false;
        };
        let reference = match self.run_headless(script) {
            Ok(commands) => commands,
            Err(err) => {
                log::warn!("turtle: {err:#}");
                return false;
            }
        };
        match (canvas::render(&state.commands), canvas::render(&reference)) {
            (Some(user), Some(expected)) => {
                let delta = canvas::pixel_delta(&user, &expected);
                log::debug!("turtle: {delta} pixels differ from the reference");
                delta <= solution.pixel_tolerance.unwrap_or(0)
            }
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.sketch = Sketch::new(&self.start);
        self.status = RunStatus::default();
        self.interpreter = None;
        self.ops_left = MAX_OPS;
    }
}
