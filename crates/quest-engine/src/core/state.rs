use std::fmt;

use serde::{Deserialize, Serialize};

use crate::games::bird::BirdState;
use crate::games::maze::MazeState;
use crate::games::pond::PondState;
use crate::games::turtle::TurtleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    Maze,
    Pond,
    Bird,
    Turtle,
}

impl GameType {
    pub const ALL: [GameType; 4] = [GameType::Maze, GameType::Pond, GameType::Bird, GameType::Turtle];
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameType::Maze => "maze",
            GameType::Pond => "pond",
            GameType::Bird => "bird",
            GameType::Turtle => "turtle",
        })
    }
}

/// How a run ended, or `Unset` while it is still going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Unset,
    Success,
    Failure,
    Timeout,
    Error,
}

impl Outcome {
    /// Timeouts and errors are never overridden by the win check.
    pub fn is_abnormal(self) -> bool {
        matches!(self, Outcome::Timeout | Outcome::Error)
    }
}

/// Fields every game state carries.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub result: Outcome,
    pub is_finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_block_id: Option<String>,
}

impl RunStatus {
    pub fn finish(&mut self, result: Outcome) {
        self.result = result;
        self.is_finished = true;
    }
}

/// A deep-copied snapshot of one engine's simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "game", rename_all = "lowercase")]
pub enum GameState {
    Maze(MazeState),
    Pond(PondState),
    Bird(BirdState),
    Turtle(TurtleState),
}

impl GameState {
    pub fn game_type(&self) -> GameType {
        match self {
            GameState::Maze(_) => GameType::Maze,
            GameState::Pond(_) => GameType::Pond,
            GameState::Bird(_) => GameType::Bird,
            GameState::Turtle(_) => GameType::Turtle,
        }
    }

    pub fn status(&self) -> &RunStatus {
        match self {
            GameState::Maze(s) => &s.status,
            GameState::Pond(s) => &s.status,
            GameState::Bird(s) => &s.status,
            GameState::Turtle(s) => &s.status,
        }
    }

    pub fn status_mut(&mut self) -> &mut RunStatus {
        match self {
            GameState::Maze(s) => &mut s.status,
            GameState::Pond(s) => &mut s.status,
            GameState::Bird(s) => &mut s.status,
            GameState::Turtle(s) => &mut s.status,
        }
    }

    pub fn result(&self) -> Outcome {
        self.status().result
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_finished
    }

    pub fn highlighted_block_id(&self) -> Option<&str> {
        self.status().highlighted_block_id.as_deref()
    }
}
