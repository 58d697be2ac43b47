//! Step/animation synchronization.
//!
//! The [`Driver`] sits between an [`Engine`] and whatever presents its
//! frames. It is ticked once per host frame, advances the engine at most
//! once per tick at the pace of the current [`Mode`], and never advances
//! while presentation still owes an acknowledgement for an animation.
//!
//! Presentation drains [`DriverEvent`]s with [`Driver::take_events`] and
//! answers with [`Driver::action_complete`] after animating a frame, and
//! [`Driver::teleport_complete`] after a teleport-out animation.

use std::mem;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::core::{Engine, Execution, GameState, Outcome, Step};
use crate::level::Solution;
use crate::time::FrameTime;

/// Pace of the debug mode.
pub const DEBUG_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Advance at the engine's own frame delay.
    #[default]
    Run,
    /// Advance at `debug_interval`, slow enough to follow highlights.
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    pub mode: Mode,
    pub debug_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { mode: Mode::Run, debug_interval: DEBUG_INTERVAL }
    }
}

impl DriverConfig {
    pub fn debug() -> Self {
        Self { mode: Mode::Debug, ..Self::default() }
    }
}

/// What presentation should play for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Animation {
    /// Show the state; nothing to acknowledge.
    None,
    /// Animate, then call [`Driver::action_complete`].
    Action,
    /// Animate leaving a portal, then call [`Driver::teleport_complete`].
    TeleportOut,
    /// Animate arriving from a portal, then call [`Driver::action_complete`].
    TeleportIn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    Frame {
        state: GameState,
        highlighted_block_id: Option<String>,
        animation: Animation,
    },
    Finished {
        success: bool,
        state: GameState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Idle,
    Running,
    Paused,
    Finished,
}

enum Playback {
    Live,
    Trace { frames: Vec<GameState>, next: usize },
}

pub struct Driver {
    engine: Box<dyn Engine>,
    solution: Solution,
    config: DriverConfig,
    status: Status,
    playback: Option<Playback>,
    /// Presentation owes an `action_complete`.
    waiting_for_animation: bool,
    /// Presentation owes a `teleport_complete`.
    teleporting: bool,
    /// The engine is done; finish once the last animation is acknowledged.
    finish_pending: bool,
    since_advance: Duration,
    events: Vec<DriverEvent>,
}

impl Driver {
    pub fn new(engine: Box<dyn Engine>, solution: Solution, config: DriverConfig) -> Self {
        Self {
            engine,
            solution,
            config,
            status: Status::Idle,
            playback: None,
            waiting_for_animation: false,
            teleporting: false,
            finish_pending: false,
            since_advance: Duration::ZERO,
            events: Vec::new(),
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn config(&self) -> DriverConfig {
        self.config
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config.mode = mode;
    }

    pub fn is_waiting_for_animation(&self) -> bool {
        self.waiting_for_animation || self.teleporting
    }

    /// Time between two advances in the current mode.
    pub fn interval(&self) -> Duration {
        match self.config.mode {
            Mode::Run => self.engine.frame_delay(),
            Mode::Debug => self.config.debug_interval,
        }
    }

    /// Drains everything published since the last call.
    pub fn take_events(&mut self) -> Vec<DriverEvent> {
        mem::take(&mut self.events)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Starts a run of `script`. The first tick advances immediately.
    ///
    /// A script the engine rejects finishes the run at once with
    /// `success: false` and is reported as `Err`.
    pub fn run(&mut self, script: &str) -> Result<()> {
        self.clear_run();
        let execution = match self.engine.execute(script) {
            Ok(execution) => execution,
            Err(err) => {
                let state = self.engine.snapshot();
                self.publish(state, Animation::None);
                self.finish();
                return Err(err).context("run aborted");
            }
        };
        self.playback = Some(match execution {
            Execution::Live => Playback::Live,
            Execution::Trace(frames) => {
                log::debug!("driver: replaying {} traced frames", frames.len());
                Playback::Trace { frames, next: 0 }
            }
        });
        self.status = Status::Running;
        self.since_advance = self.interval();
        log::debug!("driver: running {} in {:?} mode", self.engine.game_type(), self.config.mode);
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.status == Status::Running {
            self.status = Status::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == Status::Paused {
            self.status = Status::Running;
        }
    }

    /// Abandons any run and publishes the initial state.
    pub fn reset(&mut self) {
        self.clear_run();
        self.engine.reset();
        self.status = Status::Idle;
        let initial = self.engine.initial_state();
        self.publish(initial, Animation::None);
    }

    fn clear_run(&mut self) {
        self.playback = None;
        self.waiting_for_animation = false;
        self.teleporting = false;
        self.finish_pending = false;
        self.since_advance = Duration::ZERO;
    }

    // ── Pacing ────────────────────────────────────────────────────────────

    /// Advances at most once, when the interval has elapsed and no
    /// acknowledgement is outstanding.
    pub fn tick(&mut self, frame: &FrameTime) {
        if self.status != Status::Running || self.is_waiting_for_animation() {
            return;
        }
        self.since_advance += Duration::try_from_secs_f32(frame.dt).unwrap_or(Duration::ZERO);
        if self.since_advance < self.interval() {
            return;
        }
        self.since_advance = Duration::ZERO;
        self.advance();
    }

    fn advance(&mut self) {
        match &mut self.playback {
            Some(Playback::Live) => match self.engine.step() {
                Step::Advanced(result) => {
                    let animation =
                        if result.awaits_animation { Animation::Action } else { Animation::None };
                    self.waiting_for_animation = result.awaits_animation;
                    self.events.push(DriverEvent::Frame {
                        state: result.state,
                        highlighted_block_id: result.highlighted_block_id,
                        animation,
                    });
                    if result.done {
                        self.settle();
                    }
                }
                Step::Idle(reason) => {
                    log::debug!("driver: engine idle ({reason:?})");
                    self.finish();
                }
            },
            Some(Playback::Trace { frames, next }) => {
                let Some(frame) = frames.get(*next).cloned() else {
                    self.finish();
                    return;
                };
                *next += 1;
                let last = *next == frames.len();
                self.waiting_for_animation = true;
                self.publish(frame, Animation::Action);
                if last {
                    self.settle();
                }
            }
            None => {}
        }
    }

    /// Finishes now, or after the outstanding animation.
    fn settle(&mut self) {
        if self.is_waiting_for_animation() {
            self.finish_pending = true;
        } else {
            self.finish();
        }
    }

    // ── Acknowledgements ──────────────────────────────────────────────────

    /// Presentation finished animating an `Action` or `TeleportIn` frame.
    pub fn action_complete(&mut self) {
        if !self.waiting_for_animation {
            return;
        }
        self.waiting_for_animation = false;

        let live = matches!(self.playback, Some(Playback::Live));
        if live && self.engine.trigger_interaction() {
            self.teleporting = true;
            let state = self.engine.snapshot();
            self.publish(state, Animation::TeleportOut);
            return;
        }
        if self.finish_pending {
            self.finish();
        }
    }

    /// Presentation finished animating a `TeleportOut` frame.
    pub fn teleport_complete(&mut self) {
        if !self.teleporting {
            return;
        }
        self.teleporting = false;
        if self.engine.complete_teleport() {
            self.waiting_for_animation = true;
            let state = self.engine.snapshot();
            self.publish(state, Animation::TeleportIn);
        } else if self.finish_pending {
            self.finish();
        }
    }

    // ── Results ───────────────────────────────────────────────────────────

    fn publish(&mut self, state: GameState, animation: Animation) {
        let highlighted_block_id = state.highlighted_block_id().map(str::to_string);
        self.events.push(DriverEvent::Frame { state, highlighted_block_id, animation });
    }

    fn final_state(&self) -> GameState {
        match &self.playback {
            Some(Playback::Trace { frames, .. }) => match frames.last() {
                Some(last) => last.clone(),
                None => self.engine.snapshot(),
            },
            _ => self.engine.snapshot(),
        }
    }

    /// Judges the final state. Timeouts and errors stand; anything else is
    /// decided by the win check.
    fn finish(&mut self) {
        let mut state = self.final_state();
        let result = state.result();
        let success = !result.is_abnormal() && self.engine.check_win(&state, &self.solution);
        if !result.is_abnormal() {
            state.status_mut().finish(if success { Outcome::Success } else { Outcome::Failure });
        } else {
            state.status_mut().is_finished = true;
        }
        log::debug!("driver: {} finished, success = {success}", self.engine.game_type());

        self.status = Status::Finished;
        self.finish_pending = false;
        self.playback = None;
        self.events.push(DriverEvent::Finished { success, state });
    }
}
