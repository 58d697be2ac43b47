//! Quest documents: the JSON a level is loaded from.

mod config;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub use config::{
    AvatarSpec, BirdConfig, BirdPlayer, BirdStart, BlockSpec, CollectibleSpec, Coord, GridPoint,
    MazeConfig, MazePlayer, MazeStart, Point, PondConfig, PortalSpec, SwitchSpec, TurtleConfig,
    TurtlePlayer, TurtleStart, Wall,
};

use crate::core::GameType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GameConfig {
    Maze(MazeConfig),
    Pond(PondConfig),
    Bird(BirdConfig),
    Turtle(TurtleConfig),
}

impl GameConfig {
    pub fn game_type(&self) -> GameType {
        match self {
            GameConfig::Maze(_) => GameType::Maze,
            GameConfig::Pond(_) => GameType::Pond,
            GameConfig::Bird(_) => GameType::Bird,
            GameConfig::Turtle(_) => GameType::Turtle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionKind {
    ReachTarget,
    MatchDrawing,
    SurviveBattle,
    DestroyTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(rename = "type")]
    pub kind: SolutionKind,
    #[serde(default)]
    pub pixel_tolerance: Option<usize>,
    #[serde(default)]
    pub solution_script: Option<String>,
}

impl Solution {
    pub fn of_kind(kind: SolutionKind) -> Self {
        Self { kind, pixel_tolerance: None, solution_script: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub game_type: GameType,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub title_key: Option<String>,
    pub game_config: GameConfig,
    pub solution: Solution,
}

impl Quest {
    pub fn from_json(src: &str) -> Result<Self> {
        let quest: Quest = serde_json::from_str(src).context("malformed quest document")?;
        quest.validate()?;
        Ok(quest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path)
            .with_context(|| format!("failed to read quest {}", path.display()))?;
        Self::from_json(&src).with_context(|| format!("in {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let declared = self.game_type;
        let configured = self.game_config.game_type();
        if declared != configured {
            bail!("quest {} declares gameType {declared} but carries a {configured} config", self.id);
        }
        if self.solution.kind == SolutionKind::MatchDrawing && self.solution.solution_script.is_none() {
            bail!("quest {}: match_drawing needs a solutionScript", self.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAZE: &str = r#"{
        "id": "maze-1", "gameType": "maze", "level": 1,
        "gameConfig": {
            "type": "maze",
            "map": [[0,0,0,0,0],[0,2,1,3,0],[0,0,0,0,0]],
            "player": { "start": { "x": 1, "y": 1, "direction": 1 } },
            "finish": { "x": 3, "y": 1 }
        },
        "solution": { "type": "reach_target" }
    }"#;

    #[test]
    fn parses_legacy_maze() {
        let quest = Quest::from_json(MAZE).unwrap();
        assert_eq!(quest.game_type, GameType::Maze);
        let GameConfig::Maze(cfg) = &quest.game_config else { panic!() };
        assert_eq!(cfg.map.as_ref().unwrap().len(), 3);
        assert_eq!(cfg.player.as_ref().unwrap().start.direction, 1);
    }

    #[test]
    fn turtle_solution_fields() {
        let quest = Quest::from_json(
            r#"{ "id": "t", "gameType": "turtle", "gameConfig": { "type": "turtle" },
                 "solution": { "type": "match_drawing", "pixelTolerance": 40,
                               "solutionScript": "moveForward(50);" } }"#,
        )
        .unwrap();
        assert_eq!(quest.solution.pixel_tolerance, Some(40));
    }

    #[test]
    fn rejects_mismatched_game_type() {
        let src = MAZE.replace(r#""gameType": "maze""#, r#""gameType": "pond""#);
        assert!(Quest::from_json(&src).is_err());
    }

    #[test]
    fn rejects_drawing_without_reference() {
        let src = r#"{ "id": "t", "gameType": "turtle", "gameConfig": { "type": "turtle" },
                       "solution": { "type": "match_drawing" } }"#;
        assert!(Quest::from_json(src).is_err());
    }
}
