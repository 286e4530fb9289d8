//! Movement system (§4.H). Grounded on the teacher's mode→multiplier
//! and order→velocity shape (`sim/src/systems/movement.rs`), rewritten
//! from continuous per-tick integration to a per-turn distance budget
//! walked along an A* path and truncated at the first collision.

use crate::components::{Faction, MoveMode, Position, WoundEffects};
use crate::config::{ENGAGEMENT_RANGE, MIN_UNIT_SEPARATION};
use crate::ecs::{ComponentKind, EntityId, Store};
use crate::pathfinding::{self, Blocker, Point};

/// Effective speed: `max(1, baseSpeed - movementPenalty)`, halved again
/// if any wound effect halves movement.
pub fn effective_speed(base_speed: f32, wound_effects: &WoundEffects) -> f32 {
    let penalized = (base_speed - wound_effects.total_movement_penalty() as f32).max(1.0);
    if wound_effects.any_halves_movement() {
        penalized / 2.0
    } else {
        penalized
    }
}

/// `modeApPerTurn` from §4.H: walk 1, advance 2, run 4 (sprint consumes
/// all remaining AP and is handled separately by the turn resolver).
fn mode_ap_per_turn(mode: MoveMode) -> i32 {
    match mode {
        MoveMode::Walk => 1,
        MoveMode::Advance => 2,
        MoveMode::Run => 4,
        MoveMode::Sprint => 1,
    }
}

/// AP cost to cover `distance_m` at `mode`, given `base_speed`:
/// `ceil(distance / (baseSpeed * modeMultiplier / modeApPerTurn))`.
pub fn ap_cost_for_distance(distance_m: f32, base_speed: f32, mode: MoveMode) -> i32 {
    if distance_m <= 0.0 {
        return 0;
    }
    let per_ap = base_speed * mode.speed_multiplier() / mode_ap_per_turn(mode) as f32;
    if per_ap <= 0.0 {
        return i32::MAX;
    }
    (distance_m / per_ap).ceil() as i32
}

/// Movement budget in world units for one turn at `mode`, given the
/// unit's effective base speed and the product of any crossed
/// passable-terrain speed multipliers.
pub fn movement_budget(base_speed: f32, mode: MoveMode, terrain_factor: f32) -> f32 {
    base_speed * mode.speed_multiplier() * terrain_factor
}

/// Turning cost: rotations of <=90 degrees are free, otherwise 1 AP.
pub fn turning_cost(current_facing: f32, new_facing: f32) -> i32 {
    let mut delta = (new_facing - current_facing).abs() % (2.0 * std::f32::consts::PI);
    if delta > std::f32::consts::PI {
        delta = 2.0 * std::f32::consts::PI - delta;
    }
    if delta.to_degrees() <= 90.0 {
        0
    } else {
        1
    }
}

/// Walk `path` up to `budget` world units, stopping at the last point
/// that keeps `MIN_UNIT_SEPARATION` from every blocker (live units and
/// non-passable obstacles already encoded as blockers). Returns the
/// truncated path actually traveled (always at least `[start]`).
pub fn step_along_path(path: &[Point], budget: f32, blockers: &[Blocker]) -> Vec<Point> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut traveled = vec![path[0]];
    let mut remaining = budget;
    for window in path.windows(2) {
        let (from, to) = (window[0], window[1]);
        let seg_len = from.distance_to(&to);
        if seg_len < 1e-9 {
            continue;
        }
        let usable = remaining.min(seg_len);
        let t = usable / seg_len;
        let candidate = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);

        if would_violate_separation(candidate, blockers) {
            // Back off in small increments until separation holds or we
            // give up and stay at the last valid point.
            let mut lo = 0.0f32;
            let mut hi = usable;
            for _ in 0..20 {
                let mid = (lo + hi) / 2.0;
                let probe = Point::new(from.x + (to.x - from.x) * (mid / seg_len), from.y + (to.y - from.y) * (mid / seg_len));
                if would_violate_separation(probe, blockers) {
                    hi = mid;
                } else {
                    lo = mid;
                }
            }
            let safe_t = lo / seg_len;
            let safe_point = Point::new(from.x + (to.x - from.x) * safe_t, from.y + (to.y - from.y) * safe_t);
            traveled.push(safe_point);
            return traveled;
        }

        traveled.push(candidate);
        remaining -= usable;
        if remaining <= 1e-6 {
            break;
        }
    }
    traveled
}

fn would_violate_separation(p: Point, blockers: &[Blocker]) -> bool {
    blockers.iter().any(|b| p.distance_to(&b.center) < b.radius)
}

/// Recompute `Engagement.engaged_with` globally: for every live pair of
/// opposing-faction units within `ENGAGEMENT_RANGE`, add each to the
/// other's list (deduped, never self, never a downed entity).
pub fn recompute_engagement_global(store: &mut Store) {
    let ids = store.query(&[ComponentKind::Position, ComponentKind::Faction, ComponentKind::Health]);
    let mut snapshot: Vec<(EntityId, Position, Faction)> = ids
        .iter()
        .filter(|id| store.is_alive(**id))
        .filter_map(|id| Some((*id, *store.position(*id)?, *store.faction(*id)?)))
        .collect();
    snapshot.sort_by_key(|(id, ..)| id.0);

    let mut engaged_pairs: Vec<(EntityId, EntityId)> = Vec::new();
    for i in 0..snapshot.len() {
        for j in (i + 1)..snapshot.len() {
            let (id_a, pos_a, fac_a) = snapshot[i];
            let (id_b, pos_b, fac_b) = snapshot[j];
            if fac_a.opposes(&fac_b) && pos_a.distance_to(&pos_b) <= ENGAGEMENT_RANGE {
                engaged_pairs.push((id_a, id_b));
            }
        }
    }

    for (id, ..) in &snapshot {
        if store.has(*id, ComponentKind::Engagement) {
            store.engagement_mut(*id).unwrap().engaged_with.clear();
        }
    }
    for (a, b) in engaged_pairs {
        if let Some(eng) = store.engagement_mut(a) {
            if !eng.engaged_with.contains(&b) {
                eng.engaged_with.push(b);
            }
        }
        if let Some(eng) = store.engagement_mut(b) {
            if !eng.engaged_with.contains(&a) {
                eng.engaged_with.push(a);
            }
        }
    }
}

pub fn is_separated(a: Point, b: Point) -> bool {
    a.distance_to(&b) >= MIN_UNIT_SEPARATION
}

/// Clears engagement entries that have fallen outside range at the
/// unit's current position (used by explicit `disengage`).
pub fn disengage(store: &mut Store, id: EntityId) {
    let Some(pos) = store.position(id).copied() else { return };
    let partners = store.engagement(id).map(|e| e.engaged_with.clone()).unwrap_or_default();
    let still_engaged: Vec<EntityId> = partners
        .into_iter()
        .filter(|p| store.position(*p).map(|pp| pp.distance_to(&pos) <= ENGAGEMENT_RANGE).unwrap_or(false))
        .collect();
    if let Some(eng) = store.engagement_mut(id) {
        eng.engaged_with = still_engaged;
    }
}

pub fn unit_radius_blocker(pos: Position, unit_radius: f32, clearance: f32) -> Blocker {
    Blocker { center: Point::new(pos.x, pos.y), radius: unit_radius + clearance }
}

pub use pathfinding::find_path;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_cost_matches_advance_rate() {
        // advance gives 1.5 m per AP at baseSpeed derived such that
        // base_speed * 0.5 / 2 == 1.5  => base_speed = 6.0
        let cost = ap_cost_for_distance(6.0, 6.0, MoveMode::Advance);
        assert_eq!(cost, 4);
    }

    #[test]
    fn turning_under_90_is_free() {
        assert_eq!(turning_cost(0.0, std::f32::consts::FRAC_PI_4), 0);
        assert_eq!(turning_cost(0.0, std::f32::consts::PI), 1);
    }

    #[test]
    fn step_along_path_stops_before_collision() {
        let path = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let blocker = Blocker { center: Point::new(5.0, 0.0), radius: MIN_UNIT_SEPARATION };
        let traveled = step_along_path(&path, 20.0, &[blocker]);
        let last = *traveled.last().unwrap();
        assert!(last.distance_to(&blocker.center) >= blocker.radius - 1e-2);
        assert!(last.x < 5.0);
    }

    #[test]
    fn step_along_path_respects_budget_when_clear() {
        let path = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let traveled = step_along_path(&path, 3.0, &[]);
        let last = *traveled.last().unwrap();
        assert!((last.x - 3.0).abs() < 1e-4);
    }

    #[test]
    fn effective_speed_halved_by_leg_wound() {
        let mut we = WoundEffects::default();
        we.effects.push(crate::components::WoundEffect {
            location: crate::components::HitLocation::Legs,
            severity: crate::components::WoundSeverity::Moderate,
            skill_penalty: 0,
            movement_penalty: 0,
            bleeding_per_turn: 0,
            disables_two_handed: false,
            restricts_move_mode: false,
            halves_movement: true,
        });
        assert_eq!(effective_speed(6.0, &we), 3.0);
    }

    #[test]
    fn minor_leg_wound_reduces_rather_than_increases_speed() {
        let effect = crate::systems::wounds::wound_effect_for_hit(crate::components::HitLocation::Legs, 3, 0).unwrap();
        let mut we = WoundEffects::default();
        we.effects.push(effect);
        assert_eq!(effective_speed(6.0, &we), 5.0);
    }
}
