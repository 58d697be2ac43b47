//! Quest engine: educational game engines driven by learner scripts.
//!
//! A [`level::Quest`] names a game and carries its config. The
//! [`registry::Registry`] turns it into an [`core::Engine`], and a
//! [`driver::Driver`] paces the engine against whatever presents it.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use quest_engine::prelude::*;
//!
//! let quest = Quest::load("levels/maze-1.json")?;
//! let loaded = Registry::with_builtin_games().load(&quest)?;
//! let mut driver = Driver::new(loaded.engine, quest.solution.clone(), DriverConfig::default());
//! driver.run("moveForward();\nmoveForward();")?;
//!
//! let mut clock = FrameClock::new();
//! loop {
//!     driver.tick(&clock.step(Duration::from_millis(16)));
//!     for event in driver.take_events() {
//!         // present, then acknowledge
//!     }
//!     if driver.status() == Status::Finished {
//!         break;
//!     }
//! }
//! ```
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`core`] | `Engine`, `GameState`, native bindings |
//! | [`driver`] | `Driver`, the step/animation handshake |
//! | [`games`] | Maze, Pond, Bird and Turtle |
//! | [`level`] | `Quest` documents |
//! | [`logging`] | `init_logging` |
//! | [`registry`] | `Registry`, `SingleFlight` |
//! | [`time`] | `FrameClock`, `Clock` |

pub mod core;
pub mod driver;
pub mod games;
pub mod level;
pub mod logging;
pub mod registry;
pub mod time;

/// The types a host needs to load and drive a quest.
pub mod prelude {
    pub use crate::core::{Engine, GameState, GameType, Outcome};
    pub use crate::driver::{Animation, Driver, DriverConfig, DriverEvent, Mode, Status};
    pub use crate::level::{Quest, Solution};
    pub use crate::logging::{LoggingConfig, init_logging};
    pub use crate::registry::{LoadedGame, Registry, RendererContract};
    pub use crate::time::{FrameClock, FrameTime};
    pub use std::time::Duration;
}
