//! Game registry: maps a [`GameType`] to the engine that plays it.
//!
//! Each game is described once by a [`GameDescriptor`]. Loading a quest
//! prepares the game's module on first use (its native catalogue is
//! validated) through a [`SingleFlight`] cache, then builds a fresh engine
//! for the quest's config.

mod single_flight;

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

pub use single_flight::{FlightState, SingleFlight};

use crate::core::natives::validate_catalogue;
use crate::core::{BATCH_FRAME_DELAY, Engine, GameType, STEP_FRAME_DELAY};
use crate::games::{BirdEngine, MazeEngine, PondEngine, TurtleEngine, bird, maze, pond, turtle};
use crate::level::{GameConfig, Quest};

/// How a game's frames reach presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// One frame per engine step.
    Live,
    /// The whole run is computed up front and replayed.
    Trace,
}

/// What presentation must support to show a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererContract {
    pub playback: Playback,
    /// Whether the teleport handshake can occur.
    pub teleports: bool,
    pub frame_delay: Duration,
}

pub type EngineFactory = fn(&GameConfig) -> Result<Box<dyn Engine>>;

pub struct GameDescriptor {
    pub game_type: GameType,
    pub factory: EngineFactory,
    pub contract: RendererContract,
    /// Names of the natives scripts of this game may call.
    pub catalogue: fn() -> Vec<&'static str>,
}

/// Result of one-time module preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameModule {
    pub game_type: GameType,
    pub primitives: Vec<&'static str>,
}

pub struct LoadedGame {
    pub engine: Box<dyn Engine>,
    pub contract: RendererContract,
}

pub struct Registry {
    games: HashMap<GameType, GameDescriptor>,
    modules: SingleFlight<GameType, GameModule>,
}

impl Registry {
    pub fn new() -> Self {
        Self { games: HashMap::new(), modules: SingleFlight::new() }
    }

    pub fn with_builtin_games() -> Self {
        let mut registry = Self::new();
        registry.register(GameDescriptor {
            game_type: GameType::Maze,
            factory: build_maze,
            contract: RendererContract {
                playback: Playback::Live,
                teleports: true,
                frame_delay: STEP_FRAME_DELAY,
            },
            catalogue: || maze::MAZE_API.iter().map(|b| b.name).collect(),
        });
        registry.register(GameDescriptor {
            game_type: GameType::Pond,
            factory: build_pond,
            contract: RendererContract {
                playback: Playback::Live,
                teleports: false,
                frame_delay: pond::FRAME_DELAY,
            },
            catalogue: || pond::POND_API.iter().map(|b| b.name).collect(),
        });
        registry.register(GameDescriptor {
            game_type: GameType::Bird,
            factory: build_bird,
            contract: RendererContract {
                playback: Playback::Trace,
                teleports: false,
                frame_delay: BATCH_FRAME_DELAY,
            },
            catalogue: || bird::BIRD_API.iter().map(|b| b.name).collect(),
        });
        registry.register(GameDescriptor {
            game_type: GameType::Turtle,
            factory: build_turtle,
            contract: RendererContract {
                playback: Playback::Live,
                teleports: false,
                frame_delay: STEP_FRAME_DELAY,
            },
            catalogue: || turtle::TURTLE_API.iter().map(|b| b.name).collect(),
        });
        registry
    }

    /// Adds or replaces a game. Replacing drops its prepared module.
    pub fn register(&mut self, descriptor: GameDescriptor) {
        let game_type = descriptor.game_type;
        if self.games.insert(game_type, descriptor).is_some() {
            log::debug!("registry: replacing {game_type}");
            self.modules.invalidate(&game_type);
        }
    }

    pub fn game_types(&self) -> impl Iterator<Item = GameType> + '_ {
        self.games.keys().copied()
    }

    pub fn contract(&self, game_type: GameType) -> Option<RendererContract> {
        self.games.get(&game_type).map(|d| d.contract)
    }

    pub fn module_state(&self, game_type: GameType) -> Option<FlightState> {
        self.modules.state(&game_type)
    }

    /// Prepares `game_type` once; later calls share the result.
    pub fn prepare(&self, game_type: GameType) -> Result<Rc<GameModule>> {
        let descriptor = self
            .games
            .get(&game_type)
            .ok_or_else(|| anyhow!("no engine registered for {game_type}"))?;
        self.modules.get_or_init(&game_type, || {
            let primitives = (descriptor.catalogue)();
            let count = validate_catalogue(primitives.iter().copied())
                .with_context(|| format!("{game_type} catalogue is invalid"))?;
            log::debug!("registry: prepared {game_type} with {count} primitives");
            Ok(GameModule { game_type, primitives })
        })
    }

    pub fn create(&self, config: &GameConfig) -> Result<LoadedGame> {
        let game_type = config.game_type();
        self.prepare(game_type)?;
        let descriptor = self
            .games
            .get(&game_type)
            .ok_or_else(|| anyhow!("no engine registered for {game_type}"))?;
        let engine = (descriptor.factory)(config)
            .with_context(|| format!("failed to build the {game_type} engine"))?;
        Ok(LoadedGame { engine, contract: descriptor.contract })
    }

    pub fn load(&self, quest: &Quest) -> Result<LoadedGame> {
        log::info!("loading quest {} ({})", quest.id, quest.game_type);
        self.create(&quest.game_config).with_context(|| format!("quest {}", quest.id))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtin_games()
    }
}

fn build_maze(config: &GameConfig) -> Result<Box<dyn Engine>> {
    let GameConfig::Maze(config) = config else {
        bail!("expected a maze config, got {}", config.game_type());
    };
    Ok(Box::new(MazeEngine::new(config)?))
}

fn build_pond(config: &GameConfig) -> Result<Box<dyn Engine>> {
    let GameConfig::Pond(config) = config else {
        bail!("expected a pond config, got {}", config.game_type());
    };
    Ok(Box::new(PondEngine::new(config)?))
}

fn build_bird(config: &GameConfig) -> Result<Box<dyn Engine>> {
    let GameConfig::Bird(config) = config else {
        bail!("expected a bird config, got {}", config.game_type());
    };
    Ok(Box::new(BirdEngine::new(config)?))
}

fn build_turtle(config: &GameConfig) -> Result<Box<dyn Engine>> {
    let GameConfig::Turtle(config) = config else {
        bail!("expected a turtle config, got {}", config.game_type());
    };
    Ok(Box::new(TurtleEngine::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{BirdConfig, BirdPlayer, BirdStart, Point};

    fn turtle_quest() -> Quest {
        Quest::from_json(
            r#"{ "id": "t-1", "gameType": "turtle", "gameConfig": { "type": "turtle" },
                 "solution": { "type": "match_drawing", "solutionScript": "moveForward(10);" } }"#,
        )
        .unwrap()
    }

    // ── Loading ───────────────────────────────────────────────────────────

    #[test]
    fn builtin_games_are_all_registered() {
        let registry = Registry::with_builtin_games();
        let mut types: Vec<_> = registry.game_types().collect();
        types.sort_by_key(|t| t.to_string());
        let mut expected = GameType::ALL.to_vec();
        expected.sort_by_key(|t| t.to_string());
        assert_eq!(types, expected);
    }

    #[test]
    fn load_builds_the_declared_engine() {
        let registry = Registry::with_builtin_games();
        let loaded = registry.load(&turtle_quest()).unwrap();
        assert_eq!(loaded.engine.game_type(), GameType::Turtle);
        assert_eq!(loaded.contract.playback, Playback::Live);
        assert_eq!(registry.module_state(GameType::Turtle), Some(FlightState::Ready));
    }

    #[test]
    fn bird_is_traced() {
        let registry = Registry::with_builtin_games();
        let config = GameConfig::Bird(BirdConfig {
            player: BirdPlayer { start: BirdStart { x: 10.0, y: 10.0, angle: 0.0 } },
            worm: None,
            nest: Point::new(90.0, 90.0),
            walls: Vec::new(),
        });
        let loaded = registry.create(&config).unwrap();
        assert_eq!(loaded.contract.playback, Playback::Trace);
        assert_eq!(loaded.engine.frame_delay(), loaded.contract.frame_delay);
    }

    #[test]
    fn unregistered_games_are_errors() {
        let registry = Registry::new();
        let err = registry.load(&turtle_quest()).err().unwrap();
        assert!(format!("{err:#}").contains("no engine registered for turtle"));
    }

    #[test]
    fn mismatched_configs_are_rejected() {
        let mut registry = Registry::new();
        registry.register(GameDescriptor {
            game_type: GameType::Turtle,
            factory: build_maze,
            contract: RendererContract {
                playback: Playback::Live,
                teleports: false,
                frame_delay: STEP_FRAME_DELAY,
            },
            catalogue: Vec::new,
        });
        assert!(registry.load(&turtle_quest()).is_err());
    }

    // ── Preparation ───────────────────────────────────────────────────────

    #[test]
    fn preparation_is_shared() {
        let registry = Registry::with_builtin_games();
        let a = registry.prepare(GameType::Maze).unwrap();
        let b = registry.prepare(GameType::Maze).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(a.primitives.contains(&"moveForward"));
    }

    #[test]
    fn invalid_catalogues_fail_and_are_retried() {
        let mut registry = Registry::new();
        registry.register(GameDescriptor {
            game_type: GameType::Turtle,
            factory: build_turtle,
            contract: RendererContract {
                playback: Playback::Live,
                teleports: false,
                frame_delay: STEP_FRAME_DELAY,
            },
            catalogue: || vec!["penUp", "penUp"],
        });
        assert!(registry.prepare(GameType::Turtle).is_err());
        assert!(registry.prepare(GameType::Turtle).is_err());
        assert!(matches!(
            registry.module_state(GameType::Turtle),
            Some(FlightState::Failed { attempts: 2, .. })
        ));
    }
}
