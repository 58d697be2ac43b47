use std::rc::Rc;

use quest_script::{NativeError, Value};

use super::state::{MazeState, Pose};
use super::world::{CellKind, MazeLevel, WorldGrid};
use crate::core::Outcome;
use crate::core::natives::{Binding, NativeArgs};
use crate::level::{CollectibleSpec, Coord};

/// Mutable maze world the bindings operate on.
pub struct MazeWorld {
    level: Rc<MazeLevel>,
    /// Collectibles still lying around; the grid is derived from this.
    collectibles: Vec<CollectibleSpec>,
    grid: WorldGrid,
    pub(super) state: MazeState,
}

impl MazeWorld {
    pub fn new(level: Rc<MazeLevel>) -> Self {
        Self {
            collectibles: level.collectibles.clone(),
            grid: level.grid(),
            state: level.initial_state(),
            level,
        }
    }

    pub fn state(&self) -> &MazeState {
        &self.state
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    fn rebuild_grid(&mut self) {
        self.grid = WorldGrid::build(
            &self.level.blocks,
            &self.collectibles,
            &self.level.portals,
            &self.level.switches,
        );
    }

    fn position(&self) -> Coord {
        self.state.player.position
    }

    fn ahead(&self, quarter_turns: i32) -> Coord {
        let (dx, dz) = self.state.player.direction.turned(quarter_turns).offset();
        self.position().offset(dx, 0, dz)
    }

    pub fn at_finish(&self) -> bool {
        self.position() == self.level.finish
    }

    fn bump(&mut self) {
        self.state.player.pose = Pose::Bump;
    }

    /// Settles the result once the script has nothing left to do.
    pub(super) fn conclude(&mut self) {
        if self.at_finish() {
            self.state.player.pose = Pose::Victory;
            self.state.status.finish(Outcome::Success);
        } else {
            self.state.status.finish(Outcome::Failure);
        }
    }

    // ── Primitives ────────────────────────────────────────────────────────

    pub fn move_forward(&mut self) {
        let ahead = self.ahead(0);
        if self.grid.is_solid(ahead) {
            return self.bump();
        }
        match [ahead, ahead.below()].into_iter().find(|&c| self.grid.is_walkable(c)) {
            Some(landing) => self.state.player.relocate(landing, Pose::Walking),
            None => self.bump(),
        }
    }

    pub fn jump(&mut self) {
        let target = self.ahead(0).offset(0, 1, 0);
        if self.grid.is_walkable(target) {
            self.state.player.relocate(target, Pose::Jumping);
        } else {
            self.bump();
        }
    }

    pub fn turn(&mut self, quarter_turns: i32) {
        let player = &mut self.state.player;
        player.direction = player.direction.turned(quarter_turns);
        player.pose = Pose::Idle;
    }

    /// Walkable one up, level, or one down in the given relative direction.
    pub fn is_path(&self, quarter_turns: i32) -> bool {
        let ahead = self.ahead(quarter_turns);
        [1, 0, -1].into_iter().any(|dy| self.grid.is_walkable(ahead.offset(0, dy, 0)))
    }

    pub fn collect_item(&mut self) {
        let here = self.position();
        match self.collectibles.iter().position(|c| c.position == here) {
            Some(index) => {
                let item = self.collectibles.remove(index);
                log::debug!("maze: collected {}", item.id);
                self.state.collected_ids.push(item.id);
                self.rebuild_grid();
            }
            None => self.bump(),
        }
    }

    pub fn toggle_switch(&mut self) {
        let Some(switch) = self.level.switch_at(self.position()) else {
            return self.bump();
        };
        let on = self.state.switch_states.entry(switch.id.clone()).or_insert(false);
        *on = !*on;
    }

    pub fn is_on_collectible(&self) -> bool {
        let here = self.position();
        self.collectibles.iter().any(|c| c.position == here)
    }

    pub fn is_switch_on(&self) -> bool {
        self.level
            .switch_at(self.position())
            .is_some_and(|s| self.state.switch_states.get(&s.id).copied().unwrap_or(false))
    }

    // ── Teleport ──────────────────────────────────────────────────────────

    /// Starts a teleport if the player just stepped onto a portal.
    pub fn trigger_interaction(&mut self) -> bool {
        let player = &self.state.player;
        if !player.just_arrived() {
            return false;
        }
        let on_portal = self.grid.get(player.position).is_some_and(|c| c.kind == CellKind::Portal);
        if on_portal {
            self.state.player.pose = Pose::TeleportOut;
        }
        on_portal
    }

    pub fn complete_teleport(&mut self) -> bool {
        if self.state.player.pose != Pose::TeleportOut {
            return false;
        }
        let target = self
            .level
            .portal_at(self.position())
            .and_then(|from| self.level.portals.iter().find(|p| p.id == from.target_id))
            .map(|to| to.position);
        let Some(target) = target else {
            return false;
        };

        let player = &mut self.state.player;
        player.position = target;
        player.x_prev = target.x;
        player.z_prev = target.z;
        player.pose = Pose::TeleportIn;

        if self.state.status.is_finished && !self.state.status.result.is_abnormal() {
            self.conclude();
        }
        true
    }

    // ── Bindings ──────────────────────────────────────────────────────────

    fn api_move_forward(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.move_forward();
        Ok(Value::Undefined)
    }

    fn api_jump(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.jump();
        Ok(Value::Undefined)
    }

    fn api_turn_left(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turn(-1);
        Ok(Value::Undefined)
    }

    fn api_turn_right(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.turn(1);
        Ok(Value::Undefined)
    }

    fn api_collect_item(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.collect_item();
        Ok(Value::Undefined)
    }

    fn api_toggle_switch(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.toggle_switch();
        Ok(Value::Undefined)
    }

    fn api_is_path_forward(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.is_path(0)))
    }

    fn api_is_path_left(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.is_path(-1)))
    }

    fn api_is_path_right(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.is_path(1)))
    }

    fn api_not_done(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(!self.at_finish()))
    }

    fn api_is_on_collectible(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.is_on_collectible()))
    }

    fn api_is_switch_on(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.is_switch_on()))
    }

    fn api_highlight_block(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Undefined)
    }
}

pub static MAZE_API: &[Binding<MazeWorld>] = &[
    Binding::action("moveForward", 0, MazeWorld::api_move_forward),
    Binding::action("jump", 0, MazeWorld::api_jump),
    Binding::action("turnLeft", 0, MazeWorld::api_turn_left),
    Binding::action("turnRight", 0, MazeWorld::api_turn_right),
    Binding::action("collectItem", 0, MazeWorld::api_collect_item),
    Binding::action("toggleSwitch", 0, MazeWorld::api_toggle_switch),
    Binding::query("isPathForward", 0, MazeWorld::api_is_path_forward),
    Binding::query("isPathLeft", 0, MazeWorld::api_is_path_left),
    Binding::query("isPathRight", 0, MazeWorld::api_is_path_right),
    Binding::query("notDone", 0, MazeWorld::api_not_done),
    Binding::query("isOnCollectible", 0, MazeWorld::api_is_on_collectible),
    Binding::query("isSwitchOn", 0, MazeWorld::api_is_switch_on),
    Binding::marker("highlightBlock", MazeWorld::api_highlight_block),
];
