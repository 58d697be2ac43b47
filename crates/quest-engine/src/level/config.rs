use serde::{Deserialize, Serialize};

// ── Shared ────────────────────────────────────────────────────────────────

/// Integer grid coordinate. `y` is height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn below(self) -> Self {
        Self { y: self.y - 1, ..self }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, z: self.z + dz }
    }
}

/// Continuous 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

// ── Maze ──────────────────────────────────────────────────────────────────

/// A start or finish location. Legacy map levels give `(x, y)` as
/// column/row and omit `z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazeStart {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub z: Option<i32>,
    /// 0 north, 1 east, 2 south, 3 west.
    #[serde(default)]
    pub direction: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MazePlayer {
    pub start: MazeStart,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSpec {
    /// Presentation asset; irrelevant to the rules.
    #[serde(default)]
    pub model_key: String,
    pub position: Coord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectibleSpec {
    pub id: String,
    pub position: Coord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalSpec {
    pub id: String,
    pub position: Coord,
    pub target_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSpec {
    pub id: String,
    pub position: Coord,
    #[serde(default)]
    pub initially_on: bool,
}

/// Exactly one of `map` and `blocks` must be present. Legacy maps may encode
/// the start (2) and finish (3) cells instead of giving `player`/`finish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MazeConfig {
    #[serde(default)]
    pub map: Option<Vec<Vec<u8>>>,
    #[serde(default)]
    pub blocks: Option<Vec<BlockSpec>>,
    #[serde(default)]
    pub collectibles: Vec<CollectibleSpec>,
    #[serde(default)]
    pub portals: Vec<PortalSpec>,
    #[serde(default)]
    pub switches: Vec<SwitchSpec>,
    #[serde(default)]
    pub player: Option<MazePlayer>,
    #[serde(default)]
    pub finish: Option<GridPoint>,
}

// ── Pond ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarSpec {
    pub name: String,
    #[serde(default)]
    pub is_player: bool,
    pub start: Point,
    /// Damage already taken at the start of the battle.
    #[serde(default)]
    pub damage: f64,
    /// Script for computer-controlled avatars; ignored for the player.
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PondConfig {
    pub avatars: Vec<AvatarSpec>,
}

// ── Bird ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Wall {
    /// Shortest distance from `p` to this segment.
    pub fn distance_to(&self, p: Point) -> f64 {
        let (dx, dy) = (self.x1 - self.x0, self.y1 - self.y0);
        let len2 = dx * dx + dy * dy;
        let t = if len2 == 0.0 {
            0.0
        } else {
            (((p.x - self.x0) * dx + (p.y - self.y0) * dy) / len2).clamp(0.0, 1.0)
        };
        p.distance(Point::new(self.x0 + t * dx, self.y0 + t * dy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BirdStart {
    pub x: f64,
    pub y: f64,
    /// Degrees, counter-clockwise from +x.
    #[serde(default)]
    pub angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BirdPlayer {
    pub start: BirdStart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirdConfig {
    pub player: BirdPlayer,
    #[serde(default)]
    pub worm: Option<Point>,
    pub nest: Point,
    #[serde(default)]
    pub walls: Vec<Wall>,
}

// ── Turtle ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurtleStart {
    pub x: f64,
    pub y: f64,
    /// Degrees clockwise from north.
    #[serde(default)]
    pub direction: f64,
    #[serde(default = "pen_down_by_default")]
    pub pen_down: bool,
}

fn pen_down_by_default() -> bool {
    true
}

impl Default for TurtleStart {
    fn default() -> Self {
        Self { x: 200.0, y: 200.0, direction: 0.0, pen_down: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TurtlePlayer {
    pub start: TurtleStart,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurtleConfig {
    #[serde(default)]
    pub player: TurtlePlayer,
}
