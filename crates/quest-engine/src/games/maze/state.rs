use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::RunStatus;
use crate::level::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub fn from_index(index: i32) -> Self {
        match index.rem_euclid(4) {
            0 => Direction::North,
            1 => Direction::East,
            2 => Direction::South,
            _ => Direction::West,
        }
    }

    pub fn index(self) -> i32 {
        self as i32
    }

    /// Rotates by `delta` quarter turns clockwise.
    pub fn turned(self, delta: i32) -> Self {
        Self::from_index(self.index() + delta)
    }

    /// Grid step `(dx, dz)` when moving this way.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Pose {
    #[default]
    Idle,
    Walking,
    Jumping,
    Bump,
    Victory,
    TeleportOut,
    TeleportIn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub position: Coord,
    /// Grid column before the last move; differs from `position.x`/`z` only
    /// right after arriving somewhere.
    pub x_prev: i32,
    pub z_prev: i32,
    pub direction: Direction,
    pub pose: Pose,
}

impl PlayerState {
    pub fn new(position: Coord, direction: Direction) -> Self {
        Self { position, x_prev: position.x, z_prev: position.z, direction, pose: Pose::Idle }
    }

    pub fn just_arrived(&self) -> bool {
        (self.position.x, self.position.z) != (self.x_prev, self.z_prev)
    }

    /// Moves to `to`, remembering where the player came from.
    pub fn relocate(&mut self, to: Coord, pose: Pose) {
        self.x_prev = self.position.x;
        self.z_prev = self.position.z;
        self.position = to;
        self.pose = pose;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MazeState {
    pub player: PlayerState,
    pub collected_ids: Vec<String>,
    pub switch_states: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub status: RunStatus,
}
