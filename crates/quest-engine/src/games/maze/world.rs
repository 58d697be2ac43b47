use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, bail};

use super::state::{Direction, MazeState, PlayerState};
use crate::core::RunStatus;
use crate::level::{
    BlockSpec, CollectibleSpec, Coord, GridPoint, MazeConfig, MazeStart, PortalSpec, SwitchSpec,
};

// Legacy map cell codes.
const WALL: u8 = 0;
const START: u8 = 2;
const FINISH: u8 = 3;

// ── Grid ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Block,
    Collectible,
    Portal,
    Switch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldCell {
    pub kind: CellKind,
    pub solid: bool,
    pub id: Option<String>,
}

/// Coordinate index over everything in the world.
///
/// Derived data: rebuilt from the authoritative object lists whenever they
/// change.
#[derive(Debug, Clone, Default)]
pub struct WorldGrid {
    cells: HashMap<Coord, WorldCell>,
}

impl WorldGrid {
    pub fn build(
        blocks: &[BlockSpec],
        collectibles: &[CollectibleSpec],
        portals: &[PortalSpec],
        switches: &[SwitchSpec],
    ) -> Self {
        let mut cells = HashMap::with_capacity(blocks.len() + collectibles.len());
        for block in blocks {
            cells.insert(block.position, WorldCell { kind: CellKind::Block, solid: true, id: None });
        }
        let objects = collectibles
            .iter()
            .map(|c| (c.position, CellKind::Collectible, &c.id))
            .chain(portals.iter().map(|p| (p.position, CellKind::Portal, &p.id)))
            .chain(switches.iter().map(|s| (s.position, CellKind::Switch, &s.id)));
        // Objects never displace terrain.
        for (position, kind, id) in objects {
            cells
                .entry(position)
                .or_insert_with(|| WorldCell { kind, solid: false, id: Some(id.clone()) });
        }
        Self { cells }
    }

    pub fn get(&self, at: Coord) -> Option<&WorldCell> {
        self.cells.get(&at)
    }

    pub fn is_solid(&self, at: Coord) -> bool {
        self.cells.get(&at).is_some_and(|c| c.solid)
    }

    /// Open space with solid ground underneath.
    pub fn is_walkable(&self, at: Coord) -> bool {
        !self.is_solid(at) && self.is_solid(at.below())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ── Level ─────────────────────────────────────────────────────────────────

/// A validated maze configuration in 3D form.
#[derive(Debug, Clone)]
pub struct MazeLevel {
    pub blocks: Vec<BlockSpec>,
    pub collectibles: Vec<CollectibleSpec>,
    pub portals: Vec<PortalSpec>,
    pub switches: Vec<SwitchSpec>,
    pub start: Coord,
    pub start_direction: Direction,
    pub finish: Coord,
}

impl MazeLevel {
    pub fn from_config(config: &MazeConfig) -> Result<Self> {
        let (blocks, start, finish) = match (&config.map, &config.blocks) {
            (Some(_), Some(_)) => bail!("maze config cannot have both 'map' and 'blocks'"),
            (None, None) => bail!("maze config must have either 'map' or 'blocks'"),
            (Some(map), None) => from_legacy_map(map, config)?,
            (None, Some(blocks)) => {
                let Some(player) = config.player else {
                    bail!("3D maze config needs a player start");
                };
                let Some(finish) = config.finish else {
                    bail!("3D maze config needs a finish");
                };
                let start = (spatial(player.start.x, player.start.y, player.start.z, "start")?,
                             player.start.direction);
                let finish = spatial(finish.x, finish.y, finish.z, "finish")?;
                (blocks.clone(), start, finish)
            }
        };

        let level = Self {
            blocks,
            collectibles: config.collectibles.clone(),
            portals: config.portals.clone(),
            switches: config.switches.clone(),
            start: start.0,
            start_direction: Direction::from_index(i32::from(start.1)),
            finish,
        };
        level.validate()?;
        Ok(level)
    }

    fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let all_ids = self
            .collectibles
            .iter()
            .map(|c| &c.id)
            .chain(self.portals.iter().map(|p| &p.id))
            .chain(self.switches.iter().map(|s| &s.id));
        for id in all_ids {
            if !ids.insert(id.as_str()) {
                bail!("duplicate maze object id {id:?}");
            }
        }

        for portal in &self.portals {
            if portal.target_id == portal.id {
                bail!("portal {:?} targets itself", portal.id);
            }
            if !self.portals.iter().any(|p| p.id == portal.target_id) {
                bail!("portal {:?} targets missing portal {:?}", portal.id, portal.target_id);
            }
        }

        if self.blocks.iter().any(|b| b.position == self.start) {
            bail!("maze start {:?} is inside a block", self.start);
        }
        Ok(())
    }

    pub fn grid(&self) -> WorldGrid {
        WorldGrid::build(&self.blocks, &self.collectibles, &self.portals, &self.switches)
    }

    pub fn initial_state(&self) -> MazeState {
        MazeState {
            player: PlayerState::new(self.start, self.start_direction),
            collected_ids: Vec::new(),
            switch_states: self
                .switches
                .iter()
                .map(|s| (s.id.clone(), s.initially_on))
                .collect::<BTreeMap<_, _>>(),
            status: RunStatus::default(),
        }
    }

    pub fn portal_at(&self, at: Coord) -> Option<&PortalSpec> {
        self.portals.iter().find(|p| p.position == at)
    }

    pub fn switch_at(&self, at: Coord) -> Option<&SwitchSpec> {
        self.switches.iter().find(|s| s.position == at)
    }
}

fn spatial(x: i32, y: i32, z: Option<i32>, what: &str) -> Result<Coord> {
    match z {
        Some(z) => Ok(Coord::new(x, y, z)),
        None => bail!("3D maze {what} needs a z coordinate"),
    }
}

/// Walls become two-high columns; every other cell is ground. Players walk
/// at height 1.
fn from_legacy_map(
    map: &[Vec<u8>],
    config: &MazeConfig,
) -> Result<(Vec<BlockSpec>, (Coord, u8), Coord)> {
    let mut blocks = Vec::new();
    let mut start_cell = None;
    let mut finish_cell = None;

    for (row, cells) in map.iter().enumerate() {
        for (col, &cell) in cells.iter().enumerate() {
            let (x, z) = (col as i32, row as i32);
            if cell == WALL {
                blocks.push(block("wall", Coord::new(x, 0, z)));
                blocks.push(block("wall", Coord::new(x, 1, z)));
            } else {
                blocks.push(block("ground", Coord::new(x, 0, z)));
                match cell {
                    START => start_cell = Some(GridPoint { x, y: z, z: None }),
                    FINISH => finish_cell = Some(GridPoint { x, y: z, z: None }),
                    _ => {}
                }
            }
        }
    }

    let start = match config.player {
        Some(player) => player.start,
        None => match start_cell {
            Some(p) => MazeStart { x: p.x, y: p.y, z: None, direction: Direction::East as u8 },
            None => bail!("maze map has no start cell and no player start"),
        },
    };
    let Some(finish) = config.finish.or(finish_cell) else {
        bail!("maze map has no finish cell and no finish");
    };

    Ok((
        blocks,
        (Coord::new(start.x, 1, start.y), start.direction),
        Coord::new(finish.x, 1, finish.y),
    ))
}

fn block(model_key: &str, position: Coord) -> BlockSpec {
    BlockSpec { model_key: model_key.to_string(), position }
}
