//! Grid maze: walk, jump and turn a character to the finish.
//!
//! The level is a set of solid blocks in 3D (legacy 2D maps are converted
//! on load) plus collectibles, portals and switches. Each `step` runs the
//! script until the character does something visible.

mod actions;
mod state;
mod world;

use std::rc::Rc;

use anyhow::{Context, Result};
use quest_script::{Interpreter, compile};

pub use actions::{MAZE_API, MazeWorld};
pub use state::{Direction, MazeState, PlayerState, Pose};
pub use world::{CellKind, MazeLevel, WorldCell, WorldGrid};

use crate::core::natives::{NativeApi, Slice, run_slice};
use crate::core::{Engine, Execution, GameState, GameType, IdleReason, Outcome, Step, StepResult};
use crate::level::{MazeConfig, Solution};

/// Interpreter ops per `step` before yielding without an action.
pub const STEPS_PER_FRAME: u64 = 100;
/// Interpreter ops per run before the result is `Timeout`.
pub const MAX_TOTAL_OPS: u64 = 100_000;

pub struct MazeEngine {
    level: Rc<MazeLevel>,
    api: NativeApi<MazeWorld>,
    world: MazeWorld,
    interpreter: Option<Interpreter>,
    ops_left: u64,
}

impl MazeEngine {
    pub fn new(config: &MazeConfig) -> Result<Self> {
        let level = Rc::new(MazeLevel::from_config(config).context("invalid maze level")?);
        Ok(Self {
            world: MazeWorld::new(Rc::clone(&level)),
            api: NativeApi::new(MAZE_API),
            interpreter: None,
            ops_left: MAX_TOTAL_OPS,
            level,
        })
    }

    pub fn level(&self) -> &MazeLevel {
        &self.level
    }

    pub fn world(&self) -> &MazeWorld {
        &self.world
    }

    fn advance(&mut self) -> StepResult {
        let mut highlight = None;
        let mut awaits_animation = false;
        self.world.state.status.highlighted_block_id = None;
        self.world.state.player.pose = Pose::Idle;

        if let Some(interp) = self.interpreter.as_mut() {
            if self.ops_left == 0 {
                self.world.state.status.finish(Outcome::Timeout);
            } else {
                let budget = STEPS_PER_FRAME.min(self.ops_left);
                let (slice, used) = run_slice(interp, &self.api, &mut self.world, budget);
                self.ops_left -= used;
                match slice {
                    Slice::Acted { block_id } => {
                        highlight = block_id;
                        awaits_animation = true;
                        if !interp.has_more_code() {
                            self.world.conclude();
                        }
                    }
                    Slice::Exhausted => self.world.conclude(),
                    Slice::Paused if self.ops_left == 0 => {
                        log::debug!("maze: op budget exhausted");
                        self.world.state.status.finish(Outcome::Timeout);
                    }
                    Slice::Paused => {}
                    Slice::Failed(err) => {
                        log::warn!("maze script error: {err}");
                        self.world.state.status.finish(Outcome::Error);
                    }
                }
            }
        }

        let status = &mut self.world.state.status;
        status.highlighted_block_id = highlight.clone();
        if status.is_finished {
            log::debug!("maze: finished with {:?}", status.result);
        }
        StepResult {
            done: status.is_finished,
            state: GameState::Maze(self.world.state.clone()),
            highlighted_block_id: highlight,
            awaits_animation,
        }
    }
}

impl Engine for MazeEngine {
    fn game_type(&self) -> GameType {
        GameType::Maze
    }

    fn initial_state(&self) -> GameState {
        GameState::Maze(self.level.initial_state())
    }

    fn snapshot(&self) -> GameState {
        GameState::Maze(self.world.state.clone())
    }

    fn execute(&mut self, script: &str) -> Result<Execution> {
        self.reset();
        let program = match compile(script) {
            Ok(program) => program,
            Err(err) => {
                log::warn!("maze script rejected: {err}");
                self.world.state.status.finish(Outcome::Error);
                return Err(err).context("maze script does not compile");
            }
        };
        self.interpreter = Some(Interpreter::new(Rc::new(program), self.api.table()));
        log::debug!("maze: script installed");
        Ok(Execution::Live)
    }

    fn step(&mut self) -> Step {
        if self.interpreter.is_none() {
            return Step::Idle(IdleReason::NoInterpreter);
        }
        if self.world.state.status.is_finished {
            return Step::Idle(IdleReason::AlreadyFinished);
        }
        Step::Advanced(self.advance())
    }

    fn check_win(&self, state: &GameState, _solution: &Solution) -> bool {
        match state {
            GameState::Maze(s) => s.player.position == self.level.finish,
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.interpreter = None;
        self.world = MazeWorld::new(Rc::clone(&self.level));
        self.ops_left = MAX_TOTAL_OPS;
    }

    fn trigger_interaction(&mut self) -> bool {
        let triggered = self.world.trigger_interaction();
        if triggered {
            log::debug!("maze: teleport out at {:?}", self.world.state.player.position);
        }
        triggered
    }

    fn complete_teleport(&mut self) -> bool {
        let done = self.world.complete_teleport();
        if done {
            log::debug!("maze: teleport in at {:?}", self.world.state.player.position);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{CollectibleSpec, Coord, PortalSpec, SolutionKind, SwitchSpec};

    fn corridor() -> MazeConfig {
        MazeConfig {
            map: Some(vec![
                vec![0, 0, 0, 0, 0, 0],
                vec![0, 2, 1, 1, 3, 0],
                vec![0, 0, 0, 0, 0, 0],
            ]),
            blocks: None,
            collectibles: Vec::new(),
            portals: Vec::new(),
            switches: Vec::new(),
            player: None,
            finish: None,
        }
    }

    fn engine(config: &MazeConfig, script: &str) -> MazeEngine {
        let mut engine = MazeEngine::new(config).unwrap();
        engine.execute(script).unwrap();
        engine
    }

    fn advanced(engine: &mut MazeEngine) -> StepResult {
        match engine.step() {
            Step::Advanced(r) => r,
            Step::Idle(reason) => panic!("unexpected idle: {:?}", reason),
        }
    }

    fn maze(state: &GameState) -> &MazeState {
        match state {
            GameState::Maze(s) => s,
            _ => panic!("not a maze state"),
        }
    }

    // ── Movement ──────────────────────────────────────────────────────────

    #[test]
    fn walks_until_bump() {
        let mut e = engine(&corridor(), "moveForward(); turnLeft(); moveForward();");
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).player.position, Coord::new(2, 1, 1));
        assert_eq!(maze(&r.state).player.pose, Pose::Walking);
        advanced(&mut e);
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).player.pose, Pose::Bump);
        assert_eq!(maze(&r.state).player.position, Coord::new(2, 1, 1));
        assert!(r.done);
        assert_eq!(r.state.result(), Outcome::Failure);
    }

    #[test]
    fn cannot_walk_up_a_step() {
        let blocks = [(0, 0), (1, 0), (2, 0), (2, 1)]
            .into_iter()
            .flat_map(|(x, top)| (0..=top).map(move |y| Coord::new(x, y, 0)))
            .map(|position| crate::level::BlockSpec { model_key: String::new(), position })
            .collect();
        let config = MazeConfig {
            map: None,
            blocks: Some(blocks),
            collectibles: Vec::new(),
            portals: Vec::new(),
            switches: Vec::new(),
            player: Some(crate::level::MazePlayer {
                start: crate::level::MazeStart { x: 0, y: 1, z: Some(0), direction: 1 },
            }),
            finish: Some(crate::level::GridPoint { x: 2, y: 2, z: Some(0) }),
        };
        let mut e = engine(&config, "moveForward(); moveForward(); jump();");
        assert_eq!(maze(&advanced(&mut e).state).player.position, Coord::new(1, 1, 0));
        assert_eq!(maze(&advanced(&mut e).state).player.pose, Pose::Bump);
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).player.position, Coord::new(2, 2, 0));
        assert_eq!(r.state.result(), Outcome::Success);
    }

    #[test]
    fn queries_do_not_yield() {
        let mut e = engine(&corridor(), "var a = isPathForward(); var b = isPathLeft(); moveForward();");
        let r = advanced(&mut e);
        assert!(r.awaits_animation);
        assert_eq!(maze(&r.state).player.position, Coord::new(2, 1, 1));
    }

    // ── Results ───────────────────────────────────────────────────────────

    #[test]
    fn corridor_takes_exactly_three_steps() {
        let mut e = engine(&corridor(), "moveForward('block_id_a');\nmoveForward('block_id_b');\nmoveForward('block_id_c');");
        let first = advanced(&mut e);
        assert!(!first.done);
        assert_eq!(first.highlighted_block_id.as_deref(), Some("a"));
        assert!(!advanced(&mut e).done);
        let last = advanced(&mut e);
        assert!(last.done);
        assert_eq!(last.state.result(), Outcome::Success);
        assert_eq!(maze(&last.state).player.pose, Pose::Victory);
        assert_eq!(e.step(), Step::Idle(IdleReason::AlreadyFinished));
    }

    #[test]
    fn while_not_done_loop_reaches_finish() {
        let mut e = engine(&corridor(), "while (notDone()) { moveForward(); }");
        let mut steps = 0;
        loop {
            steps += 1;
            if advanced(&mut e).done {
                break;
            }
        }
        assert!(steps <= 4);
        assert!(e.check_win(&e.snapshot(), &Solution::of_kind(SolutionKind::ReachTarget)));
    }

    #[test]
    fn infinite_loop_times_out() {
        let mut e = engine(&corridor(), "while (true) { var x = 1; }");
        let mut frames = 0;
        let last = loop {
            frames += 1;
            let r = advanced(&mut e);
            if r.done {
                break r;
            }
        };
        assert_eq!(last.state.result(), Outcome::Timeout);
        assert_eq!(frames, (MAX_TOTAL_OPS / STEPS_PER_FRAME) as usize);
    }

    #[test]
    fn runtime_error_finishes_with_error() {
        let mut e = engine(&corridor(), "moveForward();\nfly();");
        advanced(&mut e);
        let r = advanced(&mut e);
        assert!(r.done);
        assert_eq!(r.state.result(), Outcome::Error);
    }

    #[test]
    fn compile_error_is_reported_and_recorded() {
        let mut e = MazeEngine::new(&corridor()).unwrap();
        assert!(e.execute("moveForward(").is_err());
        assert_eq!(e.snapshot().result(), Outcome::Error);
        assert_eq!(e.step(), Step::Idle(IdleReason::NoInterpreter));
    }

    #[test]
    fn step_without_execute_is_idle() {
        let mut e = MazeEngine::new(&corridor()).unwrap();
        assert_eq!(e.step(), Step::Idle(IdleReason::NoInterpreter));
    }

    // ── Objects ───────────────────────────────────────────────────────────

    #[test]
    fn collecting_updates_ids_and_grid() {
        let mut config = corridor();
        config.collectibles = vec![CollectibleSpec { id: "gem".into(), position: Coord::new(2, 1, 1) }];
        let mut e = engine(&config, "moveForward(); var on = isOnCollectible(); collectItem(); collectItem();");
        advanced(&mut e);
        assert_eq!(e.world().grid().get(Coord::new(2, 1, 1)).map(|c| c.kind), Some(CellKind::Collectible));
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).collected_ids, vec!["gem".to_string()]);
        assert!(e.world().grid().get(Coord::new(2, 1, 1)).is_none());
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).player.pose, Pose::Bump);
    }

    #[test]
    fn switches_toggle() {
        let mut config = corridor();
        config.switches = vec![SwitchSpec { id: "s".into(), position: Coord::new(1, 1, 1), initially_on: false }];
        let mut e = engine(&config, "toggleSwitch();");
        let r = advanced(&mut e);
        assert_eq!(maze(&r.state).switch_states.get("s"), Some(&true));
    }

    #[test]
    fn portal_triggers_once_per_arrival() {
        let mut config = corridor();
        config.portals = vec![
            PortalSpec { id: "in".into(), position: Coord::new(2, 1, 1), target_id: "out".into() },
            PortalSpec { id: "out".into(), position: Coord::new(4, 1, 1), target_id: "in".into() },
        ];
        let mut e = engine(&config, "moveForward(); turnLeft();");
        advanced(&mut e);
        assert!(e.trigger_interaction());
        assert_eq!(maze(&e.snapshot()).player.pose, Pose::TeleportOut);
        assert!(e.complete_teleport());
        let s = e.snapshot();
        assert_eq!(maze(&s).player.position, Coord::new(4, 1, 1));
        assert_eq!(maze(&s).player.pose, Pose::TeleportIn);
        assert!(!e.trigger_interaction());
        let r = advanced(&mut e);
        assert!(r.done);
        assert!(!e.trigger_interaction());
        assert_eq!(r.state.result(), Outcome::Success);
    }

    #[test]
    fn complete_teleport_requires_teleport_out() {
        let mut e = engine(&corridor(), "moveForward();");
        advanced(&mut e);
        assert!(!e.complete_teleport());
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    #[test]
    fn initial_state_is_independent() {
        let e = MazeEngine::new(&corridor()).unwrap();
        let mut a = e.initial_state();
        if let GameState::Maze(s) = &mut a {
            s.player.position = Coord::new(9, 9, 9);
        }
        assert_eq!(maze(&e.initial_state()).player.position, Coord::new(1, 1, 1));
    }

    #[test]
    fn reset_discards_progress() {
        let mut e = engine(&corridor(), "moveForward(); moveForward();");
        advanced(&mut e);
        e.reset();
        assert_eq!(e.snapshot(), e.initial_state());
        assert_eq!(e.step(), Step::Idle(IdleReason::NoInterpreter));
    }
}
