//! AI battlefield analysis and per-personality planners (§4.O).
//!
//! Grounded on the teacher's `sim/src/systems/ai.rs` threat-scoring and
//! behavior-state approach (higher-threat enemies score worse,
//! behavior picked from a small priority ladder rather than full
//! utility AI), adapted from the teacher's continuous steering output
//! to this crate's discrete `Command` queue.

use crate::components::*;
use crate::config::{ENGAGEMENT_RANGE, MELEE_ATTACK_RANGE};
use crate::ecs::{ComponentKind, EntityId, Store};
use crate::prng::Rng;
use crate::systems::movement;
use crate::systems::turn::{Command, QueuedCommand};

/// One candidate target, scored from the planning unit's perspective.
#[derive(Debug, Clone, Copy)]
pub struct ThreatAssessment {
    pub target: EntityId,
    pub distance: f32,
    pub threat_level: f32,
    pub is_wounded: bool,
    pub is_engaged: bool,
    pub can_reach: bool,
}

/// Snapshot of what a unit can see before it plans, gathered once per
/// planning pass so every personality branch works from the same read.
#[derive(Debug, Clone)]
pub struct BattlefieldAnalysis {
    pub nearest_enemy: Option<EntityId>,
    pub threats: Vec<ThreatAssessment>,
    pub allies_nearby: usize,
    pub self_hp_fraction: f32,
}

fn unit_type_bonus(unit_type: &str) -> f32 {
    match unit_type {
        "knight" => 30.0,
        "healer" => 25.0,
        "archer" => 15.0,
        _ => 0.0,
    }
}

fn avg_weapon_damage(store: &Store, id: EntityId) -> f32 {
    store
        .weapon(id)
        .map(|w| w.damage.dice as f32 * (w.damage.sides as f32 + 1.0) / 2.0 + w.damage.bonus as f32)
        .unwrap_or(4.0)
}

/// `threatLevel = 50 - 20*wounded + 2*avgWeaponDamage + (meleeSkill-50)/2
/// + unitTypeBonus + (closestDist<3 ? 20 : 0)`.
fn threat_level(store: &Store, target: EntityId, distance: f32, is_wounded: bool) -> f32 {
    let avg_damage = avg_weapon_damage(store, target);
    let melee_skill = store.skills(target).map(|s| s.melee).unwrap_or(50) as f32;
    let type_bonus = store.identity(target).map(|i| unit_type_bonus(&i.unit_type)).unwrap_or(0.0);
    let close_bonus = if distance < 3.0 { 20.0 } else { 0.0 };
    50.0 - 20.0 * if is_wounded { 1.0 } else { 0.0 } + 2.0 * avg_damage + (melee_skill - 50.0) / 2.0 + type_bonus + close_bonus
}

fn attack_type_for(store: &Store, unit: EntityId) -> AttackType {
    if store.weapon(unit).map(|w| w.range > MELEE_ATTACK_RANGE).unwrap_or(false) {
        AttackType::Ranged
    } else {
        AttackType::Melee
    }
}

fn in_weapon_range(store: &Store, unit: EntityId, target: EntityId) -> bool {
    let (Some(a), Some(b)) = (store.position(unit), store.position(target)) else { return false };
    let required = store.weapon(unit).map(|w| w.range.max(MELEE_ATTACK_RANGE)).unwrap_or(MELEE_ATTACK_RANGE);
    a.distance_to(b) <= required
}

fn attack_command(store: &Store, unit: EntityId, target: EntityId) -> Command {
    Command::Attack { target_id: target, attack_type: attack_type_for(store, unit), chosen_location: None, ap_cost: 2, priority: 0 }
}

pub fn analyze(store: &Store, unit: EntityId) -> BattlefieldAnalysis {
    let pos = store.position(unit).copied();
    let faction = store.faction(unit).copied();
    let mut threats = Vec::new();
    let mut allies_nearby = 0;

    let base_speed = store.speed(unit).map(|s| s.0).unwrap_or(6.0);
    let wound_effects = store.wound_effects(unit).cloned().unwrap_or_default();
    let move_reach = movement::movement_budget(movement::effective_speed(base_speed, &wound_effects), MoveMode::Run, 1.0);
    let weapon_reach = store.weapon(unit).map(|w| w.range.max(MELEE_ATTACK_RANGE)).unwrap_or(MELEE_ATTACK_RANGE);

    if let (Some(pos), Some(faction)) = (pos, faction) {
        for other in store.query(&[ComponentKind::Position, ComponentKind::Faction, ComponentKind::Health]) {
            if other == unit || !store.is_alive(other) {
                continue;
            }
            let Some(other_pos) = store.position(other) else { continue };
            let Some(other_faction) = store.faction(other) else { continue };
            let distance = pos.distance_to(other_pos);
            if other_faction.opposes(&faction) {
                let is_wounded = store.health(other).map(|h| h.wound_state != WoundState::Healthy).unwrap_or(false);
                let is_engaged = store.engagement(other).map(|e| !e.engaged_with.is_empty()).unwrap_or(false);
                let can_reach = distance <= move_reach + weapon_reach;
                let threat_level = threat_level(store, other, distance, is_wounded);
                threats.push(ThreatAssessment { target: other, distance, threat_level, is_wounded, is_engaged, can_reach });
            } else if distance <= ENGAGEMENT_RANGE * 3.0 {
                allies_nearby += 1;
            }
        }
    }

    threats.sort_by(|a, b| b.threat_level.partial_cmp(&a.threat_level).unwrap_or(std::cmp::Ordering::Equal));
    let nearest_enemy = threats.iter().min_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal)).map(|t| t.target);
    let self_hp_fraction = store.health(unit).map(|h| h.current as f32 / h.max.max(1) as f32).unwrap_or(1.0);

    BattlefieldAnalysis { nearest_enemy, threats, allies_nearby, self_hp_fraction }
}

/// Clamp a move destination to the map and away from the unit itself
/// collapsing onto its own position (a zero-length move wastes the
/// queue slot).
fn move_toward(store: &Store, unit: EntityId, target: EntityId, stop_short: f32, map_width: f32, map_height: f32) -> Option<(f32, f32)> {
    let pos = store.position(unit)?;
    let target_pos = store.position(target)?;
    let dx = target_pos.x - pos.x;
    let dy = target_pos.y - pos.y;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist <= stop_short {
        return None;
    }
    let travel = dist - stop_short;
    let (ux, uy) = (dx / dist, dy / dist);
    let x = (pos.x + ux * travel).clamp(-map_width / 2.0, map_width / 2.0);
    let y = (pos.y + uy * travel).clamp(-map_height / 2.0, map_height / 2.0);
    Some((x, y))
}

/// A point offset perpendicular to the attacker->target line, used by
/// the cunning planner to seek a flank instead of a head-on approach.
fn flank_point(store: &Store, unit: EntityId, target: EntityId, offset: f32) -> Option<(f32, f32)> {
    let pos = store.position(unit)?;
    let target_pos = store.position(target)?;
    let dx = target_pos.x - pos.x;
    let dy = target_pos.y - pos.y;
    let dist = (dx * dx + dy * dy).sqrt().max(0.01);
    let (ux, uy) = (dx / dist, dy / dist);
    // Perpendicular to the approach vector.
    let (px, py) = (-uy, ux);
    Some((target_pos.x - ux * MELEE_ATTACK_RANGE * 0.8 + px * offset, target_pos.y - uy * MELEE_ATTACK_RANGE * 0.8 + py * offset))
}

/// Centroid of the enemies a unit currently sees, used by `cautious` to
/// pick a retreat heading away from the whole group rather than just
/// the nearest one.
fn enemy_centroid(store: &Store, threats: &[ThreatAssessment]) -> Option<(f32, f32)> {
    let positions: Vec<Position> = threats.iter().filter_map(|t| store.position(t.target).copied()).collect();
    if positions.is_empty() {
        return None;
    }
    let n = positions.len() as f32;
    let sx: f32 = positions.iter().map(|p| p.x).sum();
    let sy: f32 = positions.iter().map(|p| p.y).sum();
    Some((sx / n, sy / n))
}

fn is_shaken(store: &Store, unit: EntityId) -> bool {
    store.morale_state(unit).map(|m| m.status == MoraleStatus::Shaken).unwrap_or(false)
}

fn plan_aggressive(store: &Store, unit: EntityId, analysis: &BattlefieldAnalysis, map_width: f32, map_height: f32) -> Vec<Command> {
    if is_shaken(store, unit) {
        return vec![Command::Rally { ap_cost: 1, priority: 0 }];
    }
    let Some(target) = analysis.nearest_enemy else { return vec![Command::Wait { ap_cost: 0, priority: 0 }] };
    if in_weapon_range(store, unit, target) {
        let current_ap = store.action_points(unit).map(|a| a.current).unwrap_or(0);
        let mut commands = vec![attack_command(store, unit, target)];
        if current_ap >= 4 {
            commands.push(attack_command(store, unit, target));
        }
        return commands;
    }
    let mut commands = Vec::new();
    if let Some((x, y)) = move_toward(store, unit, target, MELEE_ATTACK_RANGE * 0.8, map_width, map_height) {
        commands.push(Command::Move { target_x: x, target_y: y, mode: MoveMode::Run, ap_cost: 4, priority: -1 });
    }
    commands
}

fn plan_cunning(store: &Store, unit: EntityId, analysis: &BattlefieldAnalysis, map_width: f32, map_height: f32) -> Vec<Command> {
    let target = analysis
        .threats
        .iter()
        .filter(|t| t.is_wounded && t.can_reach)
        .max_by(|a, b| a.threat_level.partial_cmp(&b.threat_level).unwrap_or(std::cmp::Ordering::Equal))
        .or_else(|| analysis.threats.first())
        .map(|t| t.target);
    let Some(target) = target else { return vec![Command::Wait { ap_cost: 0, priority: 0 }] };
    if in_weapon_range(store, unit, target) {
        return vec![attack_command(store, unit, target)];
    }
    let mut commands = Vec::new();
    if let Some((x, y)) = flank_point(store, unit, target, 2.0) {
        let x = x.clamp(-map_width / 2.0, map_width / 2.0);
        let y = y.clamp(-map_height / 2.0, map_height / 2.0);
        commands.push(Command::Move { target_x: x, target_y: y, mode: MoveMode::Advance, ap_cost: 2, priority: -1 });
    }
    commands
}

fn plan_cautious(store: &Store, unit: EntityId, analysis: &BattlefieldAnalysis, map_width: f32, map_height: f32) -> Vec<Command> {
    let losing = analysis.self_hp_fraction <= 0.5;
    if losing || is_shaken(store, unit) {
        let Some(pos) = store.position(unit) else { return vec![Command::Rally { ap_cost: 1, priority: 0 }] };
        let mut commands = Vec::new();
        if let Some((cx, cy)) = enemy_centroid(store, &analysis.threats) {
            let dx = pos.x - cx;
            let dy = pos.y - cy;
            let dist = (dx * dx + dy * dy).sqrt().max(0.01);
            let x = (pos.x + dx / dist * 4.0).clamp(-map_width / 2.0, map_width / 2.0);
            let y = (pos.y + dy / dist * 4.0).clamp(-map_height / 2.0, map_height / 2.0);
            commands.push(Command::Move { target_x: x, target_y: y, mode: MoveMode::Walk, ap_cost: 1, priority: -1 });
        }
        commands.push(Command::Rally { ap_cost: 1, priority: 0 });
        return commands;
    }
    let Some(target) = analysis.threats.first().map(|t| t.target) else { return vec![Command::Wait { ap_cost: 0, priority: 0 }] };
    if in_weapon_range(store, unit, target) {
        return vec![attack_command(store, unit, target)];
    }
    vec![Command::Wait { ap_cost: 0, priority: 0 }]
}

fn plan_brutal(store: &Store, unit: EntityId, analysis: &BattlefieldAnalysis, map_width: f32, map_height: f32) -> Vec<Command> {
    let target = analysis
        .threats
        .iter()
        .filter_map(|t| store.health(t.target).map(|h| (t.target, h.current as f32 / h.max.max(1) as f32)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(id, _)| id);
    let Some(target) = target else { return vec![Command::Wait { ap_cost: 0, priority: 0 }] };
    if in_weapon_range(store, unit, target) {
        let current_ap = store.action_points(unit).map(|a| a.current).unwrap_or(0);
        let mut commands = vec![attack_command(store, unit, target)];
        if current_ap >= 4 {
            commands.push(attack_command(store, unit, target));
        }
        return commands;
    }
    let mut commands = Vec::new();
    if let Some((x, y)) = move_toward(store, unit, target, MELEE_ATTACK_RANGE * 0.8, map_width, map_height) {
        commands.push(Command::Move { target_x: x, target_y: y, mode: MoveMode::Sprint, ap_cost: 1, priority: -1 });
    }
    commands
}

fn plan_honorable(store: &Store, unit: EntityId, analysis: &BattlefieldAnalysis, map_width: f32, map_height: f32) -> Vec<Command> {
    let target = analysis
        .threats
        .iter()
        .filter(|t| !t.is_engaged && t.can_reach)
        .max_by(|a, b| a.threat_level.partial_cmp(&b.threat_level).unwrap_or(std::cmp::Ordering::Equal))
        .or_else(|| analysis.threats.first())
        .map(|t| t.target);
    let Some(target) = target else { return vec![Command::Wait { ap_cost: 0, priority: 0 }] };
    if in_weapon_range(store, unit, target) {
        return vec![attack_command(store, unit, target)];
    }
    let mut commands = Vec::new();
    if let Some((x, y)) = move_toward(store, unit, target, MELEE_ATTACK_RANGE * 0.8, map_width, map_height) {
        commands.push(Command::Move { target_x: x, target_y: y, mode: MoveMode::Advance, ap_cost: 2, priority: -1 });
    }
    commands
}

/// Produce the commands one AI-controlled unit wants to queue this
/// turn. Unrecognized/missing personality defaults to aggressive.
pub fn plan(store: &Store, unit: EntityId, map_width: f32, map_height: f32) -> Vec<Command> {
    let analysis = analyze(store, unit);
    let personality = store.ai_controller(unit).and_then(|c| c.personality).unwrap_or(AiPersonality::Aggressive);
    match personality {
        AiPersonality::Aggressive => plan_aggressive(store, unit, &analysis, map_width, map_height),
        AiPersonality::Cunning => plan_cunning(store, unit, &analysis, map_width, map_height),
        AiPersonality::Cautious => plan_cautious(store, unit, &analysis, map_width, map_height),
        AiPersonality::Brutal => plan_brutal(store, unit, &analysis, map_width, map_height),
        AiPersonality::Honorable => plan_honorable(store, unit, &analysis, map_width, map_height),
    }
}

/// Run planning for every AI-controlled, living unit and enqueue
/// whatever commands fit its remaining AP budget this turn. Commands
/// that don't fit are simply dropped rather than erroring — an AI
/// over-planning is not a caller mistake the way a malformed player
/// command is.
pub fn run_ai_turn(store: &mut Store, _rng: &mut Rng, map_width: f32, map_height: f32) {
    let units: Vec<EntityId> = store
        .query(&[ComponentKind::AIController, ComponentKind::Health])
        .into_iter()
        .filter(|id| store.is_alive(*id))
        .collect();

    for unit in units {
        let commands = plan(store, unit, map_width, map_height);
        let current_ap = store.action_points(unit).map(|ap| ap.current).unwrap_or(0);
        let mut queue = store.command_queue(unit).cloned().unwrap_or_default();
        for command in commands {
            let qc = QueuedCommand { command, condition: None };
            let _ = queue.try_enqueue(current_ap, qc);
        }
        store.set_command_queue(unit, queue);
    }
}
