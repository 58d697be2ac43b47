//! Tick-based pond physics. Angles are degrees counter-clockwise from +x.

use std::collections::HashMap;

use super::state::{AvatarState, Missile, PondEvent};
use crate::level::Point;

/// Arena side length; positions are clamped into `[0, ARENA_SIZE]²`.
pub const ARENA_SIZE: f64 = 100.0;
/// Speed change per tick while easing toward the desired speed.
pub const ACCELERATION: f64 = 5.0;
/// Distance per tick at speed 100.
pub const MAX_STEP: f64 = 1.0;
pub const COLLISION_RADIUS: f64 = 5.0;
/// Damage from a collision at speed 100.
pub const COLLISION_DAMAGE: f64 = 3.0;
pub const MISSILE_SPEED: f64 = 3.0;
pub const BLAST_MARGIN: f64 = 2.0;
pub const HIT_DAMAGE: f64 = 10.0;
pub const MAX_RANGE: f64 = 70.0;

pub fn unit(degrees: f64) -> (f64, f64) {
    let r = degrees.to_radians();
    (r.cos(), r.sin())
}

/// Signed angular difference in `[-180, 180)`.
pub fn angle_between(from: f64, to: f64) -> f64 {
    (to - from + 180.0).rem_euclid(360.0) - 180.0
}

/// Bearing from `a` to `b` in `[0, 360)`.
pub fn bearing(a: Point, b: Point) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees().rem_euclid(360.0)
}

// ── Missiles ──────────────────────────────────────────────────────────────

/// Advances missiles, detonating those that reached their range. Each
/// living avatar inside a blast takes the largest hit of the frame.
pub fn update_missiles(
    missiles: &mut Vec<Missile>,
    avatars: &mut [AvatarState],
    events: &mut Vec<PondEvent>,
) {
    let mut hits: HashMap<usize, f64> = HashMap::new();
    missiles.retain_mut(|m| {
        m.progress += MISSILE_SPEED;
        if m.progress < m.range {
            return true;
        }
        events.push(PondEvent::Boom { x: m.end.x, y: m.end.y, damage: HIT_DAMAGE });
        for (i, avatar) in avatars.iter().enumerate() {
            if !avatar.dead && avatar.position().distance(m.end) < COLLISION_RADIUS + BLAST_MARGIN {
                let hit = hits.entry(i).or_insert(0.0);
                *hit = hit.max(HIT_DAMAGE);
            }
        }
        false
    });
    for (i, damage) in hits {
        avatars[i].damage += damage;
    }
}

// ── Movement ──────────────────────────────────────────────────────────────

/// Eases speed, moves along the heading and resolves wall hits.
pub fn move_avatars(avatars: &mut [AvatarState], events: &mut Vec<PondEvent>) {
    for avatar in avatars.iter_mut().filter(|a| !a.dead) {
        let gap = avatar.desired_speed - avatar.speed;
        avatar.speed += gap.clamp(-ACCELERATION, ACCELERATION);
        if avatar.speed <= 0.0 {
            continue;
        }

        let (dx, dy) = unit(avatar.heading);
        let step = avatar.speed / 100.0 * MAX_STEP;
        avatar.x += dx * step;
        avatar.y += dy * step;

        let clamped = (avatar.x.clamp(0.0, ARENA_SIZE), avatar.y.clamp(0.0, ARENA_SIZE));
        if clamped != (avatar.x, avatar.y) {
            (avatar.x, avatar.y) = clamped;
            let damage = avatar.speed / 100.0 * COLLISION_DAMAGE;
            avatar.damage += damage;
            avatar.speed = 0.0;
            avatar.desired_speed = 0.0;
            events.push(PondEvent::Crash { avatar_id: avatar.id.clone(), damage });
        }
    }
}

/// Resolves one pair of overlapping avatars. Both take damage scaled by the
/// faster speed, stop, and are pushed apart by half the overlap each.
/// Returns the damage dealt, or `None` when they do not touch.
pub fn collide_pair(a: &mut AvatarState, b: &mut AvatarState) -> Option<f64> {
    let distance = a.position().distance(b.position());
    if distance >= COLLISION_RADIUS {
        return None;
    }
    let damage = a.speed.max(b.speed) / 100.0 * COLLISION_DAMAGE;
    for avatar in [&mut *a, &mut *b] {
        avatar.damage += damage;
        avatar.speed = 0.0;
        avatar.desired_speed = 0.0;
    }

    let (ux, uy) = if distance > 0.0 {
        ((b.x - a.x) / distance, (b.y - a.y) / distance)
    } else {
        (1.0, 0.0)
    };
    let push = (COLLISION_RADIUS - distance) / 2.0;
    a.x -= ux * push;
    a.y -= uy * push;
    b.x += ux * push;
    b.y += uy * push;
    Some(damage)
}

pub fn collide_avatars(avatars: &mut [AvatarState], events: &mut Vec<PondEvent>) {
    for i in 0..avatars.len() {
        for j in i + 1..avatars.len() {
            let (left, right) = avatars.split_at_mut(j);
            let (a, b) = (&mut left[i], &mut right[0]);
            if a.dead || b.dead {
                continue;
            }
            if let Some(damage) = collide_pair(a, b) {
                events.push(PondEvent::Crash { avatar_id: a.id.clone(), damage });
                events.push(PondEvent::Crash { avatar_id: b.id.clone(), damage });
            }
        }
    }
}

/// Marks avatars at 100 damage or more as dead.
pub fn reap(avatars: &mut [AvatarState], events: &mut Vec<PondEvent>) {
    for avatar in avatars.iter_mut().filter(|a| !a.dead && a.damage >= 100.0) {
        avatar.dead = true;
        avatar.speed = 0.0;
        avatar.desired_speed = 0.0;
        events.push(PondEvent::Die { avatar_id: avatar.id.clone() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::AvatarSpec;

    fn avatar(name: &str, x: f64, y: f64) -> AvatarState {
        let spec = AvatarSpec {
            name: name.into(),
            is_player: false,
            start: Point::new(x, y),
            damage: 0.0,
            code: String::new(),
        };
        AvatarState::from_spec(&spec, 0)
    }

    // ── Angles ────────────────────────────────────────────────────────────

    #[test]
    fn angles_wrap_into_one_branch() {
        assert_eq!(angle_between(350.0, 10.0), 20.0);
        assert_eq!(angle_between(10.0, 350.0), -20.0);
        assert!((bearing(Point::new(0.0, 0.0), Point::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    // ── Movement ──────────────────────────────────────────────────────────

    #[test]
    fn speed_eases_toward_desired() {
        let mut avatars = [avatar("a", 50.0, 50.0)];
        avatars[0].desired_speed = 12.0;
        let mut events = Vec::new();
        move_avatars(&mut avatars, &mut events);
        assert_eq!(avatars[0].speed, 5.0);
        move_avatars(&mut avatars, &mut events);
        move_avatars(&mut avatars, &mut events);
        assert_eq!(avatars[0].speed, 12.0);
    }

    #[test]
    fn moves_along_heading_not_facing() {
        let mut avatars = [avatar("a", 50.0, 50.0)];
        avatars[0].speed = 100.0;
        avatars[0].desired_speed = 100.0;
        avatars[0].heading = 90.0;
        avatars[0].facing = 0.0;
        move_avatars(&mut avatars, &mut Vec::new());
        assert!((avatars[0].x - 50.0).abs() < 1e-9);
        assert!((avatars[0].y - 51.0).abs() < 1e-9);
    }

    #[test]
    fn wall_hit_clamps_and_damages() {
        let mut avatars = [avatar("a", 99.8, 50.0)];
        avatars[0].speed = 50.0;
        avatars[0].desired_speed = 50.0;
        let mut events = Vec::new();
        move_avatars(&mut avatars, &mut events);
        assert_eq!(avatars[0].x, ARENA_SIZE);
        assert_eq!(avatars[0].speed, 0.0);
        assert_eq!(avatars[0].damage, 1.5);
        assert_eq!(events, vec![PondEvent::Crash { avatar_id: "a-0".into(), damage: 1.5 }]);
    }

    // ── Collisions ────────────────────────────────────────────────────────

    #[test]
    fn head_on_collision_is_symmetric() {
        let mut a = avatar("a", 48.0, 50.0);
        let mut b = avatar("b", 52.0, 50.0);
        a.speed = 40.0;
        b.speed = 40.0;
        let damage = collide_pair(&mut a, &mut b).unwrap();
        assert_eq!(a.damage, damage);
        assert_eq!(b.damage, damage);
        assert!(((50.0 - a.x) - (b.x - 50.0)).abs() < 1e-9);
        assert!((b.x - a.x - COLLISION_RADIUS).abs() < 1e-9);
        assert_eq!((a.speed, b.speed), (0.0, 0.0));
    }

    #[test]
    fn distant_avatars_do_not_collide() {
        let mut a = avatar("a", 10.0, 10.0);
        let mut b = avatar("b", 20.0, 10.0);
        assert_eq!(collide_pair(&mut a, &mut b), None);
    }

    // ── Missiles ──────────────────────────────────────────────────────────

    #[test]
    fn blast_takes_the_largest_hit_once() {
        let mut avatars = [avatar("a", 10.0, 10.0), avatar("b", 90.0, 90.0)];
        let shell = Missile {
            owner_id: "b-0".into(),
            start: Point::new(50.0, 10.0),
            end: Point::new(11.0, 10.0),
            range: 3.0,
            progress: 0.0,
        };
        let mut missiles = vec![shell.clone(), shell];
        let mut events = Vec::new();
        update_missiles(&mut missiles, &mut avatars, &mut events);
        assert!(missiles.is_empty());
        assert_eq!(avatars[0].damage, HIT_DAMAGE);
        assert_eq!(avatars[1].damage, 0.0);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn reaping_emits_die_once() {
        let mut avatars = [avatar("a", 0.0, 0.0)];
        avatars[0].damage = 100.0;
        let mut events = Vec::new();
        reap(&mut avatars, &mut events);
        reap(&mut avatars, &mut events);
        assert!(avatars[0].dead);
        assert_eq!(events.len(), 1);
    }
}
