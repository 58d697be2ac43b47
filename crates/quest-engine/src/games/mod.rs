//! The four game engines.

pub mod bird;
pub mod maze;
pub mod pond;
pub mod turtle;

pub use bird::BirdEngine;
pub use maze::MazeEngine;
pub use pond::PondEngine;
pub use turtle::TurtleEngine;
