//! Pond battle: scripted avatars swim, scan and shoot in a 100×100 arena.
//!
//! Every frame each living avatar's script gets a fixed number of
//! interpreter steps, then missiles, movement and collisions are integrated.
//! The learner controls the one avatar flagged `isPlayer`; the others run
//! the code from the level.

mod api;
pub mod physics;
mod state;

use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use quest_script::{Interpreter, Program, compile};

pub use api::{MAX_TURN_SPEED, POND_API, PondArena, RELOAD_TIME};
pub use state::{AvatarState, Missile, MissileState, PondEvent, PondState, ranking};

use crate::core::natives::{NativeApi, NativeCall};
use crate::core::{
    Engine, Execution, GameState, GameType, IdleReason, Outcome, RunStatus, Step, StepResult,
};
use crate::level::{AvatarSpec, PondConfig, Solution, SolutionKind};
use crate::time::{Clock, SystemClock};

/// Interpreter steps per living avatar per frame.
pub const STEPS_PER_FRAME: u64 = 100;
/// Frames before a battle is called a `Timeout`.
pub const MAX_FRAMES: u64 = 15_000;
pub const FRAME_DELAY: Duration = Duration::from_millis(20);

pub struct PondEngine {
    roster: Vec<AvatarSpec>,
    /// Compiled opponent scripts; `None` at the player's slot.
    programs: Vec<Option<Rc<Program>>>,
    primary: usize,
    api: NativeApi<PondArena>,
    clock: Rc<dyn Clock>,
    arena: PondArena,
    interpreters: Vec<Option<Interpreter>>,
    installed: bool,
    ticks: u64,
    status: RunStatus,
}

impl PondEngine {
    pub fn new(config: &PondConfig) -> Result<Self> {
        Self::with_clock(config, Rc::new(SystemClock::new()))
    }

    /// Uses `clock` for cannon reloads.
    pub fn with_clock(config: &PondConfig, clock: Rc<dyn Clock>) -> Result<Self> {
        let players: Vec<usize> = config
            .avatars
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.is_player.then_some(i))
            .collect();
        let [primary] = players[..] else {
            bail!("pond needs exactly one player avatar, found {}", players.len());
        };

        let programs = config
            .avatars
            .iter()
            .enumerate()
            .map(|(i, avatar)| -> Result<Option<Rc<Program>>> {
                if i == primary {
                    return Ok(None);
                }
                let program = compile(&avatar.code)
                    .with_context(|| format!("script of opponent {:?}", avatar.name))?;
                Ok(Some(Rc::new(program)))
            })
            .collect::<Result<Vec<_>>>()?;

        let roster = config.avatars.clone();
        let arena = PondArena::new(fresh_avatars(&roster), Rc::clone(&clock));
        Ok(Self {
            interpreters: roster.iter().map(|_| None).collect(),
            roster,
            programs,
            primary,
            api: NativeApi::new(POND_API),
            clock,
            arena,
            installed: false,
            ticks: 0,
            status: RunStatus::default(),
        })
    }

    fn state(&self) -> PondState {
        PondState {
            avatars: self.arena.avatars.clone(),
            missiles: self.arena.missiles.iter().map(Missile::view).collect(),
            events: self.arena.events.clone(),
            ticks: self.ticks,
            rank: ranking(&self.arena.avatars),
            status: self.status.clone(),
        }
    }

    fn opponents_dead(&self) -> bool {
        self.arena.avatars.iter().enumerate().all(|(i, a)| i == self.primary || a.dead)
    }

    /// Runs every script for one frame. Returns the player's highlight.
    fn run_scripts(&mut self) -> Option<String> {
        let mut highlight = None;
        for _ in 0..STEPS_PER_FRAME {
            for i in 0..self.interpreters.len() {
                if self.arena.avatars[i].dead {
                    continue;
                }
                let Some(interp) = self.interpreters[i].as_mut() else { continue };
                if interp.is_finished() {
                    continue;
                }
                self.arena.active = i;
                let mut call = NativeCall::new(&self.api, &mut self.arena);
                let stepped = interp.step(&mut call);
                let (_, block_id) = call.finish();
                if i == self.primary && block_id.is_some() {
                    highlight = block_id;
                }
                if let Err(err) = stepped {
                    if i == self.primary {
                        log::warn!("pond script error: {err}");
                        self.status.finish(Outcome::Error);
                        return highlight;
                    }
                    log::warn!("pond: opponent {} stopped: {err}", self.roster[i].name);
                    self.interpreters[i] = None;
                }
            }
        }
        highlight
    }

    fn advance(&mut self) -> StepResult {
        self.arena.events.clear();
        let highlight = self.run_scripts();

        if !self.status.is_finished {
            let arena = &mut self.arena;
            physics::update_missiles(&mut arena.missiles, &mut arena.avatars, &mut arena.events);
            physics::move_avatars(&mut arena.avatars, &mut arena.events);
            physics::collide_avatars(&mut arena.avatars, &mut arena.events);
            physics::reap(&mut arena.avatars, &mut arena.events);
            self.ticks += 1;

            if self.arena.avatars[self.primary].dead {
                self.status.finish(Outcome::Failure);
            } else if self.opponents_dead() {
                self.status.finish(Outcome::Success);
            } else if self.ticks >= MAX_FRAMES {
                self.status.finish(Outcome::Timeout);
            }
            if self.status.is_finished {
                log::debug!("pond: finished with {:?} after {} frames", self.status.result, self.ticks);
            }
        }

        self.status.highlighted_block_id = highlight.clone();
        StepResult {
            done: self.status.is_finished,
            state: GameState::Pond(self.state()),
            highlighted_block_id: highlight,
            awaits_animation: false,
        }
    }
}

fn fresh_avatars(roster: &[AvatarSpec]) -> Vec<AvatarState> {
    roster.iter().enumerate().map(|(i, spec)| AvatarState::from_spec(spec, i)).collect()
}

impl Engine for PondEngine {
    fn game_type(&self) -> GameType {
        GameType::Pond
    }

    fn initial_state(&self) -> GameState {
        let avatars = fresh_avatars(&self.roster);
        GameState::Pond(PondState {
            rank: ranking(&avatars),
            avatars,
            missiles: Vec::new(),
            events: Vec::new(),
            ticks: 0,
            status: RunStatus::default(),
        })
    }

    fn snapshot(&self) -> GameState {
        GameState::Pond(self.state())
    }

    fn execute(&mut self, script: &str) -> Result<Execution> {
        self.reset();
        let program = match compile(script) {
            Ok(program) => Rc::new(program),
            Err(err) => {
                log::warn!("pond script rejected: {err}");
                self.status.finish(Outcome::Error);
                return Err(err).context("pond script does not compile");
            }
        };
        for (i, slot) in self.interpreters.iter_mut().enumerate() {
            let program = match &self.programs[i] {
                Some(opponent) => Rc::clone(opponent),
                None => Rc::clone(&program),
            };
            *slot = Some(Interpreter::new(program, self.api.table()).with_seed(i as u64 + 1));
        }
        self.installed = true;
        log::debug!("pond: {} scripts installed", self.interpreters.len());
        Ok(Execution::Live)
    }

    fn step(&mut self) -> Step {
        if !self.installed {
            return Step::Idle(IdleReason::NoInterpreter);
        }
        if self.status.is_finished {
            return Step::Idle(IdleReason::AlreadyFinished);
        }
        Step::Advanced(self.advance())
    }

    fn check_win(&self, state: &GameState, solution: &Solution) -> bool {
        let GameState::Pond(state) = state else {
            return false;
        };
        let player_alive = state.avatars.iter().any(|a| a.is_player && !a.dead);
        match solution.kind {
            SolutionKind::SurviveBattle => player_alive,
            _ => player_alive && state.avatars.iter().all(|a| a.is_player || a.dead),
        }
    }

    fn reset(&mut self) {
        self.arena = PondArena::new(fresh_avatars(&self.roster), Rc::clone(&self.clock));
        self.interpreters.iter_mut().for_each(|slot| *slot = None);
        self.installed = false;
        self.ticks = 0;
        self.status = RunStatus::default();
    }

    fn frame_delay(&self) -> Duration {
        FRAME_DELAY
    }
}
