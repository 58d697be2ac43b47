use std::rc::Rc;
use std::time::Duration;

use quest_script::{NativeError, Value};

use super::physics::{self, MAX_RANGE};
use super::state::{AvatarState, Missile, PondEvent};
use crate::core::natives::{Binding, NativeArgs};
use crate::level::Point;
use crate::time::Clock;

/// Minimum wall-clock time between two shots of one avatar.
pub const RELOAD_TIME: Duration = Duration::from_millis(500);
/// Turning is only possible at or below this speed.
pub const MAX_TURN_SPEED: f64 = 50.0;
const DEFAULT_SWIM_SPEED: f64 = 50.0;
const DEFAULT_SCAN_RESOLUTION: f64 = 5.0;
const MAX_SCAN_RESOLUTION: f64 = 20.0;

/// Everything scripts can reach in the pond. `active` selects the avatar
/// whose script is being stepped.
pub struct PondArena {
    pub avatars: Vec<AvatarState>,
    pub missiles: Vec<Missile>,
    pub events: Vec<PondEvent>,
    pub active: usize,
    clock: Rc<dyn Clock>,
}

fn finite_or_zero(n: f64) -> f64 {
    if n.is_finite() { n } else { 0.0 }
}

impl PondArena {
    pub fn new(avatars: Vec<AvatarState>, clock: Rc<dyn Clock>) -> Self {
        Self { avatars, missiles: Vec::new(), events: Vec::new(), active: 0, clock }
    }

    fn me(&mut self) -> &mut AvatarState {
        &mut self.avatars[self.active]
    }

    /// Fires a shell toward `angle`; returns whether the cannon was loaded.
    pub fn cannon(&mut self, angle: f64, range: f64) -> bool {
        let now = self.clock.now();
        let angle = finite_or_zero(angle).rem_euclid(360.0);
        let range = finite_or_zero(range).clamp(0.0, MAX_RANGE);
        let me = self.me();
        if me.reload_at.is_some_and(|t| now < t) {
            return false;
        }
        me.reload_at = Some(now + RELOAD_TIME);
        me.facing = angle;

        let start = me.position();
        let (dx, dy) = physics::unit(angle);
        let end = Point::new(start.x + dx * range, start.y + dy * range);
        let owner_id = me.id.clone();
        self.missiles.push(Missile { owner_id, start, end, range, progress: 0.0 });
        true
    }

    /// Distance to the nearest other living avatar within `resolution`
    /// degrees centred on `angle`, or infinity.
    pub fn scan(&mut self, angle: f64, resolution: f64) -> f64 {
        let angle = finite_or_zero(angle).rem_euclid(360.0);
        let resolution = finite_or_zero(resolution).clamp(0.0, MAX_SCAN_RESOLUTION);
        let me = &self.avatars[self.active];
        let here = me.position();
        self.events.push(PondEvent::Scan { avatar_id: me.id.clone(), degree: angle, resolution });

        self.avatars
            .iter()
            .enumerate()
            .filter(|&(i, other)| i != self.active && !other.dead)
            .filter(|(_, other)| {
                let bearing = physics::bearing(here, other.position());
                physics::angle_between(angle, bearing).abs() <= resolution / 2.0
            })
            .map(|(_, other)| here.distance(other.position()))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn swim(&mut self, angle: f64, speed: f64) {
        let angle = finite_or_zero(angle).rem_euclid(360.0);
        let speed = finite_or_zero(speed).clamp(0.0, 100.0);
        let me = self.me();
        if me.speed <= MAX_TURN_SPEED {
            me.heading = angle;
            me.facing = angle;
        }
        me.desired_speed = speed;
    }

    pub fn stop(&mut self) {
        self.me().desired_speed = 0.0;
    }

    fn api_cannon(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Bool(self.cannon(args.number(0), args.number(1))))
    }

    fn api_scan(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        let range = self.scan(args.number(0), args.number_or(1, DEFAULT_SCAN_RESOLUTION));
        Ok(Value::Number(range))
    }

    fn api_swim(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.swim(args.number(0), args.number_or(1, DEFAULT_SWIM_SPEED));
        Ok(Value::Undefined)
    }

    fn api_stop(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        self.stop();
        Ok(Value::Undefined)
    }

    fn api_get_x(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.me().x))
    }

    fn api_get_y(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.me().y))
    }

    fn api_health(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.me().health()))
    }

    fn api_speed(&mut self, _: &NativeArgs<'_>) -> Result<Value, NativeError> {
        Ok(Value::Number(self.me().speed))
    }

    fn api_log(&mut self, args: &NativeArgs<'_>) -> Result<Value, NativeError> {
        log::info!(target: "quest_engine::pond", "[{}] {}", self.me().name, args.text(0));
        Ok(Value::Undefined)
    }
}

pub static POND_API: &[Binding<PondArena>] = &[
    Binding::action("cannon", 2, PondArena::api_cannon),
    Binding::action("swim", 2, PondArena::api_swim),
    Binding::action("stop", 0, PondArena::api_stop),
    Binding::query("scan", 2, PondArena::api_scan),
    Binding::query("getX", 0, PondArena::api_get_x),
    Binding::query("getY", 0, PondArena::api_get_y),
    Binding::query("health", 0, PondArena::api_health),
    Binding::query("speed", 0, PondArena::api_speed),
    Binding::query("log", 1, PondArena::api_log),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::AvatarSpec;
    use crate::time::ManualClock;

    fn arena(positions: &[(f64, f64)], clock: ManualClock) -> PondArena {
        let avatars = positions
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let spec = AvatarSpec {
                    name: format!("a{i}"),
                    is_player: i == 0,
                    start: Point::new(x, y),
                    damage: 0.0,
                    code: String::new(),
                };
                AvatarState::from_spec(&spec, i)
            })
            .collect();
        PondArena::new(avatars, Rc::new(clock))
    }

    // ── Scan ──────────────────────────────────────────────────────────────

    #[test]
    fn scan_on_bearing_returns_distance() {
        let mut a = arena(&[(20.0, 20.0), (50.0, 60.0)], ManualClock::new());
        let bearing = physics::bearing(Point::new(20.0, 20.0), Point::new(50.0, 60.0));
        assert!((a.scan(bearing, 0.0) - 50.0).abs() < 1e-9);
        assert!(matches!(a.events[0], PondEvent::Scan { .. }));
    }

    #[test]
    fn scan_away_finds_nothing() {
        let mut a = arena(&[(50.0, 50.0), (80.0, 50.0)], ManualClock::new());
        assert_eq!(a.scan(180.0, 5.0), f64::INFINITY);
    }

    #[test]
    fn scan_window_wraps_at_zero() {
        let mut a = arena(&[(50.0, 50.0), (80.0, 49.0)], ManualClock::new());
        assert!(a.scan(1.0, 10.0).is_finite());
    }

    #[test]
    fn scan_ignores_the_dead() {
        let mut a = arena(&[(50.0, 50.0), (80.0, 50.0)], ManualClock::new());
        a.avatars[1].dead = true;
        assert_eq!(a.scan(0.0, 20.0), f64::INFINITY);
    }

    // ── Cannon ────────────────────────────────────────────────────────────

    #[test]
    fn cannon_reloads_on_the_clock() {
        let clock = ManualClock::new();
        let mut a = arena(&[(50.0, 50.0)], clock.clone());
        assert!(a.cannon(0.0, 500.0));
        assert_eq!(a.missiles[0].range, MAX_RANGE);
        assert!(!a.cannon(0.0, 10.0));
        clock.advance(RELOAD_TIME);
        assert!(a.cannon(f64::NAN, 10.0));
        assert_eq!(a.missiles.len(), 2);
        assert_eq!(a.avatars[0].facing, 0.0);
    }

    // ── Swim ──────────────────────────────────────────────────────────────

    #[test]
    fn fast_avatars_cannot_turn() {
        let mut a = arena(&[(50.0, 50.0)], ManualClock::new());
        a.swim(90.0, 100.0);
        assert_eq!(a.avatars[0].heading, 90.0);
        a.avatars[0].speed = 80.0;
        a.swim(180.0, 30.0);
        assert_eq!(a.avatars[0].heading, 90.0);
        assert_eq!(a.avatars[0].desired_speed, 30.0);
        a.stop();
        assert_eq!(a.avatars[0].desired_speed, 0.0);
    }
}
