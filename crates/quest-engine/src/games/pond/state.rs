use std::time::Duration;

use serde::Serialize;

use crate::core::RunStatus;
use crate::level::{AvatarSpec, Point};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarState {
    pub id: String,
    pub name: String,
    pub is_player: bool,
    pub x: f64,
    pub y: f64,
    pub damage: f64,
    pub speed: f64,
    pub desired_speed: f64,
    /// Direction of travel, degrees.
    pub heading: f64,
    /// Direction of the cannon, degrees.
    pub facing: f64,
    pub dead: bool,
    /// Roster position, used for colours.
    pub visualization_index: usize,
    /// Earliest clock reading at which the cannon may fire again.
    #[serde(skip)]
    pub reload_at: Option<Duration>,
}

impl AvatarState {
    pub fn from_spec(spec: &AvatarSpec, index: usize) -> Self {
        Self {
            id: format!("{}-{index}", spec.name),
            name: spec.name.clone(),
            is_player: spec.is_player,
            x: spec.start.x,
            y: spec.start.y,
            damage: spec.damage,
            speed: 0.0,
            desired_speed: 0.0,
            heading: 0.0,
            facing: 0.0,
            dead: false,
            visualization_index: index,
            reload_at: None,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn health(&self) -> f64 {
        (100.0 - self.damage).max(0.0)
    }
}

/// A shell in flight. `progress` runs from 0 to `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct Missile {
    pub owner_id: String,
    pub start: Point,
    pub end: Point,
    pub range: f64,
    pub progress: f64,
}

impl Missile {
    /// Display height above the ground track; peaks at the midpoint.
    pub fn parabola(&self) -> f64 {
        if self.range <= 0.0 {
            return 0.0;
        }
        let half = self.range / 2.0;
        let t = (self.progress - half) / half;
        self.range * 0.15 * (1.0 - t * t)
    }

    pub fn view(&self) -> MissileState {
        let f = if self.range > 0.0 { (self.progress / self.range).min(1.0) } else { 1.0 };
        let x = self.start.x + (self.end.x - self.start.x) * f;
        let shadow_y = self.start.y + (self.end.y - self.start.y) * f;
        let parabola = self.parabola();
        MissileState { owner_id: self.owner_id.clone(), x, y: shadow_y - parabola, shadow_y, parabola }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissileState {
    pub owner_id: String,
    pub x: f64,
    pub y: f64,
    pub shadow_y: f64,
    pub parabola: f64,
}

/// One-frame notifications for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum PondEvent {
    #[serde(rename_all = "camelCase")]
    Scan { avatar_id: String, degree: f64, resolution: f64 },
    #[serde(rename_all = "camelCase")]
    Crash { avatar_id: String, damage: f64 },
    Boom { x: f64, y: f64, damage: f64 },
    #[serde(rename_all = "camelCase")]
    Die { avatar_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PondState {
    pub avatars: Vec<AvatarState>,
    pub missiles: Vec<MissileState>,
    pub events: Vec<PondEvent>,
    /// Frames simulated so far.
    pub ticks: u64,
    /// Avatar ids from best to worst.
    pub rank: Vec<String>,
    #[serde(flatten)]
    pub status: RunStatus,
}

/// Living avatars first, then ascending damage.
pub fn ranking(avatars: &[AvatarState]) -> Vec<String> {
    let mut order: Vec<&AvatarState> = avatars.iter().collect();
    order.sort_by(|a, b| a.dead.cmp(&b.dead).then(a.damage.total_cmp(&b.damage)));
    order.into_iter().map(|a| a.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avatar(name: &str, damage: f64, dead: bool) -> AvatarState {
        let spec = AvatarSpec {
            name: name.into(),
            is_player: false,
            start: Point::new(0.0, 0.0),
            damage,
            code: String::new(),
        };
        AvatarState { dead, ..AvatarState::from_spec(&spec, 0) }
    }

    #[test]
    fn rank_puts_dead_last() {
        let avatars = [avatar("a", 10.0, true), avatar("b", 50.0, false), avatar("c", 20.0, false)];
        assert_eq!(ranking(&avatars), vec!["c-0", "b-0", "a-0"]);
    }

    #[test]
    fn parabola_peaks_mid_flight() {
        let mut m = Missile {
            owner_id: "a".into(),
            start: Point::new(0.0, 0.0),
            end: Point::new(40.0, 0.0),
            range: 40.0,
            progress: 0.0,
        };
        assert_eq!(m.parabola(), 0.0);
        m.progress = 20.0;
        assert!((m.parabola() - 6.0).abs() < 1e-9);
        m.progress = 40.0;
        assert!(m.parabola().abs() < 1e-9);
        assert_eq!(m.view().shadow_y, 0.0);
    }

    #[test]
    fn events_serialize_with_upper_case_tag() {
        let json = serde_json::to_value(PondEvent::Die { avatar_id: "x".into() }).unwrap();
        assert_eq!(json["type"], "DIE");
        assert_eq!(json["avatarId"], "x");
    }
}
