//! Turn resolution kernel (§4.M) — the hardest and largest module.
//!
//! Grounded on the teacher's collect-then-apply two-pass pattern in
//! `sim/src/systems/combat.rs::combat_system` (gather attacker data in
//! one pass, mutate in a second to dodge borrow conflicts), generalized
//! from a continuous per-tick fire-rate loop into the spec's discrete
//! command-queue dispatch: collect eligible commands from every unit's
//! queue, sort once, then execute in order with reactions/overwatch
//! inlined at the point they trigger.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::combat::{self, DefenseOptions};
use crate::components::*;
use crate::config::{ENGAGEMENT_RANGE, MELEE_ATTACK_RANGE, MIN_UNIT_SEPARATION, SHIELD_WALL_RANGE};
use crate::ecs::{ComponentKind, EntityId, Store};
use crate::events::{EventKind, EventLog};
use crate::pathfinding::{self, Blocker, Point};
use crate::prng::Rng;
use crate::systems::{ammo, morale, movement, stamina, wounds};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CommandCondition {
    TargetDead(EntityId),
    InRange(EntityId, f32),
    HpBelow(f32),
    EnemyApproaches(f32),
}

impl CommandCondition {
    fn evaluate(&self, store: &Store, owner: EntityId) -> bool {
        match *self {
            CommandCondition::TargetDead(target) => !store.is_alive(target),
            CommandCondition::InRange(target, range) => {
                match (store.position(owner), store.position(target)) {
                    (Some(a), Some(b)) => a.distance_to(b) <= range,
                    _ => false,
                }
            }
            CommandCondition::HpBelow(threshold) => store
                .health(owner)
                .map(|h| (h.current as f32 / h.max.max(1) as f32) < threshold)
                .unwrap_or(false),
            CommandCondition::EnemyApproaches(range) => {
                let Some(pos) = store.position(owner) else { return false };
                let Some(faction) = store.faction(owner) else { return false };
                store
                    .query(&[ComponentKind::Position, ComponentKind::Faction, ComponentKind::Health])
                    .iter()
                    .filter(|id| **id != owner && store.is_alive(**id))
                    .any(|id| {
                        store.faction(*id).map(|f| f.opposes(faction)).unwrap_or(false)
                            && store.position(*id).map(|p| p.distance_to(pos) <= range).unwrap_or(false)
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Move { target_x: f32, target_y: f32, mode: MoveMode, ap_cost: i32, priority: i32 },
    Attack { target_id: EntityId, attack_type: AttackType, chosen_location: Option<HitLocation>, ap_cost: i32, priority: i32 },
    Defend { ap_cost: i32, priority: i32 },
    Aim { target_id: EntityId, aim_bonus: i32, ap_cost: i32, priority: i32 },
    Reload { slot_index: usize, ap_cost: i32, priority: i32 },
    Rally { ap_cost: i32, priority: i32 },
    Wait { ap_cost: i32, priority: i32 },
    Overwatch { attack_type: AttackType, watch_direction: Option<f32>, watch_arc: Option<f32>, ap_cost: i32, priority: i32 },
}

impl Command {
    pub fn ap_cost(&self) -> i32 {
        match self {
            Command::Move { ap_cost, .. }
            | Command::Attack { ap_cost, .. }
            | Command::Defend { ap_cost, .. }
            | Command::Aim { ap_cost, .. }
            | Command::Reload { ap_cost, .. }
            | Command::Rally { ap_cost, .. }
            | Command::Wait { ap_cost, .. }
            | Command::Overwatch { ap_cost, .. } => *ap_cost,
        }
    }

    pub fn priority(&self) -> i32 {
        match self {
            Command::Move { priority, .. }
            | Command::Attack { priority, .. }
            | Command::Defend { priority, .. }
            | Command::Aim { priority, .. }
            | Command::Reload { priority, .. }
            | Command::Rally { priority, .. }
            | Command::Wait { priority, .. }
            | Command::Overwatch { priority, .. } => *priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedCommand {
    pub command: Command,
    pub condition: Option<CommandCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandQueue {
    pub commands: Vec<QueuedCommand>,
}

impl CommandQueue {
    /// Queue admission: reject if already-queued + this command's AP
    /// cost would exceed `current_ap`.
    pub fn try_enqueue(&mut self, current_ap: i32, qc: QueuedCommand) -> Result<(), crate::error::EngineError> {
        let queued: i32 = self.commands.iter().map(|c| c.command.ap_cost()).sum();
        let needed = queued + qc.command.ap_cost();
        if needed > current_ap {
            return Err(crate::error::EngineError::InsufficientActionPoints { needed, available: current_ap });
        }
        self.commands.push(qc);
        Ok(())
    }
}

/// Per-turn bookkeeping that doesn't belong on any persistent
/// component: reaction budgets, aim bonuses granted this turn, and
/// which units took damage (for end-of-turn stamina recovery).
struct TurnContext {
    reactions_remaining: HashMap<EntityId, u32>,
    aim_bonus: HashMap<(EntityId, EntityId), i32>,
    damaged_this_turn: HashSet<EntityId>,
    map_width: f32,
    map_height: f32,
}

impl TurnContext {
    fn reactions_for(&mut self, store: &Store, defender: EntityId) -> &mut u32 {
        self.reactions_remaining.entry(defender).or_insert_with(|| {
            1 + store.defensive_stance(defender).map(|s| s.extra_reactions).unwrap_or(0)
        })
    }
}

/// Resolve one full turn: collect, sort, dispatch, end-of-turn. Returns
/// the number of actions resolved (for the `TurnEnded` event).
pub fn resolve_turn(store: &mut Store, log: &mut EventLog, rng: &mut Rng, turn: u64, map_width: f32, map_height: f32) -> u32 {
    let span = tracing::info_span!("turn", turn);
    let _enter = span.enter();
    log.push(turn, None, None, EventKind::ResolutionPhaseStarted);

    let mut ctx = TurnContext {
        reactions_remaining: HashMap::new(),
        aim_bonus: HashMap::new(),
        damaged_this_turn: HashSet::new(),
        map_width,
        map_height,
    };

    let entries = collect_and_sort(store);
    let mut actions_resolved = 0u32;

    for (owner, slot_index) in entries {
        if !store.is_alive(owner) {
            continue;
        }
        if store.morale_state(owner).map(|m| m.status == MoraleStatus::Routed).unwrap_or(false) {
            continue;
        }
        let Some(qc) = store.command_queue(owner).and_then(|q| q.commands.get(slot_index)).cloned() else { continue };

        dispatch(store, log, rng, turn, owner, &qc.command, false, &mut ctx);
        mark_dispatched(store, owner, slot_index);
        actions_resolved += 1;
    }

    // Remove every command that was dispatched this turn; anything
    // whose condition failed to pass collection stays queued (order
    // persistence, §4.M).
    remove_dispatched(store);

    end_of_turn(store, log, rng, turn, &ctx.damaged_this_turn);

    log.push(turn, None, None, EventKind::TurnEnded { actions_resolved });
    actions_resolved
}

/// Collect eligible (condition-passing) commands from every alive,
/// non-routed unit's queue, tagged with their queue slot, then sort by
/// `(priority, insertion index)` — a stable sort so ties keep queue
/// collection order.
fn collect_and_sort(store: &Store) -> Vec<(EntityId, usize)> {
    let mut global: Vec<(EntityId, usize, i32)> = Vec::new();
    for owner in store.query(&[ComponentKind::CommandQueue]) {
        if !store.is_alive(owner) {
            continue;
        }
        if store.morale_state(owner).map(|m| m.status == MoraleStatus::Routed).unwrap_or(false) {
            continue;
        }
        let Some(queue) = store.command_queue(owner) else { continue };
        for (idx, qc) in queue.commands.iter().enumerate() {
            let passes = qc.condition.map(|c| c.evaluate(store, owner)).unwrap_or(true);
            if passes {
                global.push((owner, idx, qc.command.priority()));
            }
        }
    }
    // Stable sort ascending by priority; ties preserve the order
    // commands were pushed into `global` (insertion order).
    global.sort_by_key(|(_, _, priority)| *priority);
    global.into_iter().map(|(owner, idx, _)| (owner, idx)).collect()
}

/// Marker left on dispatched slots so they can be pruned from queues
/// after the sweep without disturbing indices mid-iteration.
fn remove_dispatched(store: &mut Store) {
    for owner in store.query(&[ComponentKind::CommandQueue]) {
        if let Some(queue) = store.command_queue_mut(owner) {
            queue.commands.retain(|qc| !qc_marked_dispatched(qc));
        }
    }
}

fn qc_marked_dispatched(qc: &QueuedCommand) -> bool {
    matches!(qc.condition, Some(CommandCondition::TargetDead(id)) if id == DISPATCHED_SENTINEL)
}

const DISPATCHED_SENTINEL: EntityId = EntityId(u64::MAX);

fn mark_dispatched(store: &mut Store, owner: EntityId, slot_index: usize) {
    if let Some(queue) = store.command_queue_mut(owner) {
        if let Some(qc) = queue.commands.get_mut(slot_index) {
            qc.condition = Some(CommandCondition::TargetDead(DISPATCHED_SENTINEL));
        }
    }
}

fn dispatch(
    store: &mut Store,
    log: &mut EventLog,
    rng: &mut Rng,
    turn: u64,
    owner: EntityId,
    command: &Command,
    is_provoke: bool,
    ctx: &mut TurnContext,
) {
    match *command {
        Command::Move { target_x, target_y, mode, ap_cost, .. } => {
            dispatch_move(store, log, rng, turn, owner, target_x, target_y, mode, ap_cost, ctx);
        }
        Command::Attack { target_id, attack_type, chosen_location, ap_cost, .. } => {
            dispatch_attack(store, log, rng, turn, owner, target_id, attack_type, chosen_location, ap_cost, is_provoke, ctx);
        }
        Command::Defend { .. } => {
            store.set_defensive_stance(owner, DefensiveStance { bonus_percent: 20, extra_reactions: 1 });
        }
        Command::Aim { target_id, aim_bonus, .. } => {
            ctx.aim_bonus.insert((owner, target_id), aim_bonus);
        }
        Command::Reload { slot_index, .. } => {
            if let Some(ammo_comp) = store.ammo_mut(owner) {
                ammo_comp.switch_slot(slot_index);
            }
        }
        Command::Rally { .. } => {
            dispatch_rally(store, log, rng, turn, owner);
        }
        Command::Wait { .. } => {}
        Command::Overwatch { attack_type, watch_direction, watch_arc, .. } => {
            store.set_overwatch(owner, Overwatch { attack_type, watch_direction, watch_arc, triggered: false });
            log.push(turn, Some(owner), None, EventKind::OverwatchSet);
        }
    }

    if let Some(ap) = store.action_points_mut(owner) {
        if matches!(command, Command::Move { mode: MoveMode::Sprint, .. }) {
            // Sprint consumes the whole remaining budget rather than a
            // fixed per-command cost (§4.H).
            ap.current = 0;
        } else {
            ap.current = (ap.current - command.ap_cost()).max(0);
        }
    }
}

fn dispatch_rally(store: &mut Store, log: &mut EventLog, rng: &mut Rng, turn: u64, owner: EntityId) {
    let Some(status) = store.morale_state(owner).map(|m| m.status) else { return };
    if !morale::can_rally(status) {
        return;
    }
    let Some(base) = store.skills(owner).map(|s| s.morale) else { return };
    let pos = store.position(owner).copied();
    let nearby_steady = pos
        .map(|p| {
            store
                .query(&[ComponentKind::Position, ComponentKind::Faction, ComponentKind::MoraleState])
                .iter()
                .filter(|id| **id != owner)
                .filter(|id| store.faction(**id) == store.faction(owner))
                .filter(|id| store.morale_state(**id).map(|m| m.status == MoraleStatus::Steady).unwrap_or(false))
                .filter(|id| store.position(**id).map(|pp| morale::is_within_leadership_range(pp.distance_to(&p))).unwrap_or(false))
                .count() as u32
        })
        .unwrap_or(0);
    let bonus = morale::leadership_bonus(nearby_steady);
    let result = morale::test(base, bonus, rng);
    log.push(turn, Some(owner), None, EventKind::MoraleChecked { effective: result.effective, roll: result.roll, passed: result.passed });
    if result.passed {
        let new_status = status.improve_one_step();
        if let Some(m) = store.morale_state_mut(owner) {
            m.status = new_status;
        }
        log.push(turn, Some(owner), None, EventKind::UnitRallied { new_status });
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_move(
    store: &mut Store,
    log: &mut EventLog,
    rng: &mut Rng,
    turn: u64,
    owner: EntityId,
    target_x: f32,
    target_y: f32,
    mode: MoveMode,
    _ap_cost: i32,
    ctx: &mut TurnContext,
) {
    let Some(start) = store.position(owner).copied() else { return };
    let effective_mode = if store.wound_effects(owner).map(|w| w.any_restricts_move_mode()).unwrap_or(false) {
        mode.downgraded()
    } else {
        mode
    };

    let base_speed = store.speed(owner).map(|s| s.0).unwrap_or(6.0);
    let wound_effects = store.wound_effects(owner).cloned().unwrap_or_default();
    let speed = movement::effective_speed(base_speed, &wound_effects);
    let budget = movement::movement_budget(speed, effective_mode, 1.0);

    let prior_engaged = store.engagement(owner).map(|e| e.engaged_with.clone()).unwrap_or_default();

    let obstacles: Vec<(Position, Obstacle)> = store
        .query(&[ComponentKind::Position, ComponentKind::Obstacle])
        .iter()
        .filter_map(|id| Some((*store.position(*id)?, *store.obstacle(*id)?)))
        .collect();
    let other_units: Vec<Position> = store
        .query(&[ComponentKind::Position, ComponentKind::Health])
        .iter()
        .filter(|id| **id != owner && store.is_alive(**id))
        .filter_map(|id| store.position(*id).copied())
        .collect();
    let blockers = pathfinding::collect_blockers(&obstacles, &other_units, crate::config::UNIT_RADIUS, crate::config::PATHFINDER_CLEARANCE);

    let path = pathfinding::find_path(Point::new(start.x, start.y), Point::new(target_x, target_y), &blockers, ctx.map_width, ctx.map_height);
    let traveled = movement::step_along_path(&path, budget, &blockers);
    let dest = *traveled.last().unwrap_or(&Point::new(start.x, start.y));

    let new_facing = if dest.distance_to(&Point::new(start.x, start.y)) > 1e-4 {
        (dest.y - start.y).atan2(dest.x - start.x)
    } else {
        start.facing
    };
    let turn_ap_cost = movement::turning_cost(start.facing, new_facing);

    if let Some(p) = store.position_mut(owner) {
        p.x = dest.x.clamp(-ctx.map_width / 2.0, ctx.map_width / 2.0);
        p.y = dest.y.clamp(-ctx.map_height / 2.0, ctx.map_height / 2.0);
        p.facing = new_facing;
    }

    if (new_facing - start.facing).abs() > 1e-4 {
        if turn_ap_cost > 0 {
            if let Some(ap) = store.action_points_mut(owner) {
                ap.current = (ap.current - turn_ap_cost).max(0);
            }
        }
        log.push(turn, Some(owner), None, EventKind::UnitTurned { new_facing, ap_cost: turn_ap_cost });
    }

    log.push(
        turn,
        Some(owner),
        None,
        EventKind::UnitMoved { from_x: start.x, from_y: start.y, to_x: dest.x, to_y: dest.y, path_len: traveled.len() },
    );

    movement::recompute_engagement_global(store);

    let still_engaged = store.engagement(owner).map(|e| e.engaged_with.clone()).unwrap_or_default();
    let left_engagement: Vec<EntityId> = prior_engaged.into_iter().filter(|p| !still_engaged.contains(p)).collect();

    if !left_engagement.is_empty() && matches!(effective_mode, MoveMode::Sprint) {
        for engager in left_engagement {
            if !store.is_alive(engager) {
                continue;
            }
            // `dispatch_attack` itself emits `AttackDeclared{is_provoke:
            // true}`; the free attack is the only observable event here.
            dispatch_attack(store, log, rng, turn, engager, owner, AttackType::Melee, None, 0, true, ctx);
        }
    }

    check_overwatchers(store, log, rng, turn, owner, start, ctx);
}

fn check_overwatchers(store: &mut Store, log: &mut EventLog, rng: &mut Rng, turn: u64, mover: EntityId, old_pos: Position, ctx: &mut TurnContext) {
    let Some(mover_pos) = store.position(mover).copied() else { return };
    let Some(mover_faction) = store.faction(mover).copied() else { return };

    let watchers: Vec<EntityId> = store
        .query(&[ComponentKind::Overwatch, ComponentKind::Position, ComponentKind::Faction])
        .into_iter()
        .filter(|id| store.faction(*id).map(|f| f.opposes(&mover_faction)).unwrap_or(false))
        .filter(|id| store.overwatch(*id).map(|o| !o.triggered).unwrap_or(false))
        .collect();

    for watcher in watchers {
        let Some(weapon) = store.weapon(watcher).cloned() else { continue };
        let Some(watcher_pos) = store.position(watcher).copied() else { continue };
        let old_distance = watcher_pos.distance_to(&old_pos);
        let new_distance = watcher_pos.distance_to(&mover_pos);
        if !(old_distance > weapon.range && new_distance <= weapon.range) {
            continue;
        }
        let arc_ok = match (store.overwatch(watcher).and_then(|o| o.watch_direction), store.overwatch(watcher).and_then(|o| o.watch_arc)) {
            (Some(dir), Some(arc)) => {
                let angle_to_mover = (mover_pos.y - watcher_pos.y).atan2(mover_pos.x - watcher_pos.x);
                let mut delta = (angle_to_mover - dir).abs() % (2.0 * std::f32::consts::PI);
                if delta > std::f32::consts::PI {
                    delta = 2.0 * std::f32::consts::PI - delta;
                }
                delta <= arc / 2.0
            }
            _ => true,
        };
        if !arc_ok {
            continue;
        }
        let attack_type = store.overwatch(watcher).map(|o| o.attack_type).unwrap_or(AttackType::Ranged);
        if let Some(o) = store.overwatch_mut(watcher) {
            o.triggered = true;
        }
        log.push(turn, Some(watcher), Some(mover), EventKind::OverwatchTriggered);
        dispatch_attack(store, log, rng, turn, watcher, mover, attack_type, None, 0, true, ctx);
        if !store.is_alive(mover) {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch_attack(
    store: &mut Store,
    log: &mut EventLog,
    rng: &mut Rng,
    turn: u64,
    attacker: EntityId,
    target_id: EntityId,
    attack_type: AttackType,
    chosen_location: Option<HitLocation>,
    _ap_cost: i32,
    is_provoke: bool,
    ctx: &mut TurnContext,
) -> bool {
    // Step 1: validate, already-down target is a silent no-op (§7 class 2).
    if !store.is_alive(target_id) {
        return true;
    }
    let Some(attacker_skills) = store.skills(attacker).cloned() else { return true };
    let Some(weapon) = store.weapon(attacker).cloned() else { return true };

    // Step 2: melee range check, one advance attempt if short.
    if attack_type == AttackType::Melee {
        let required_range = weapon.range.max(MELEE_ATTACK_RANGE);
        let distance = match (store.position(attacker), store.position(target_id)) {
            (Some(a), Some(b)) => a.distance_to(b),
            _ => return true,
        };
        if distance > required_range {
            let can_close = store.action_points(attacker).map(|ap| ap.current >= 2).unwrap_or(false);
            if can_close {
                dispatch_move(
                    store,
                    log,
                    rng,
                    turn,
                    attacker,
                    store.position(target_id).unwrap().x,
                    store.position(target_id).unwrap().y,
                    MoveMode::Advance,
                    2,
                    ctx,
                );
            }
            let new_distance = match (store.position(attacker), store.position(target_id)) {
                (Some(a), Some(b)) => a.distance_to(b),
                _ => return true,
            };
            if new_distance > required_range {
                log.push(turn, Some(attacker), Some(target_id), EventKind::AttackOutOfRange { distance: new_distance, required_range });
                return false;
            }
        }
    }

    // Step 3: attacker modifiers.
    let wound_penalty = wound_state_penalty(store.health(attacker).map(|h| h.wound_state).unwrap_or(WoundState::Healthy));
    let wound_effect_penalty = store.wound_effects(attacker).map(|w| w.total_skill_penalty()).unwrap_or(0);
    let morale_penalty = store.morale_state(attacker).map(|m| morale_check_penalty(m.status)).unwrap_or(0);
    let flanking_bonus = compute_flanking_bonus(store, attacker, target_id);
    let facing_bonus = compute_facing_arc_bonus(store, attacker, target_id);
    let height_bonus = compute_height_bonus(store, attacker, target_id);
    let aim_bonus = ctx.aim_bonus.remove(&(attacker, target_id)).unwrap_or(0);
    let provoke_bonus = if is_provoke { 20 } else { 0 };

    let base_skill = match attack_type {
        AttackType::Melee => attacker_skills.melee,
        AttackType::Ranged => attacker_skills.ranged,
    };
    let modifiers = wound_penalty + wound_effect_penalty + morale_penalty + flanking_bonus + facing_bonus + height_bonus + aim_bonus + provoke_bonus;

    log.push(turn, Some(attacker), Some(target_id), EventKind::AttackDeclared { attack_type, is_provoke });
    let attack_roll = combat::roll_attack(base_skill, modifiers, rng);
    log.push(
        turn,
        Some(attacker),
        Some(target_id),
        EventKind::AttackRolled { base_skill: attack_roll.base_skill, effective_skill: attack_roll.effective_skill, roll: attack_roll.roll, hit: attack_roll.hit },
    );

    // Step 5: spend resources unless this is a free reaction/provoke attack.
    if !is_provoke {
        if let Some(ap) = store.action_points_mut(attacker) {
            ap.current = (ap.current - _ap_cost).max(0);
        }
        if attack_type == AttackType::Ranged {
            if let Some(ammo_comp) = store.ammo_mut(attacker) {
                let (spent, slot) = ammo::consume_with_autoswitch(ammo_comp);
                if spent {
                    log.push(turn, Some(attacker), None, EventKind::AmmoSpent { slot });
                } else {
                    return false; // ammo exhausted, §7 class 2 no-op
                }
            }
        }
        drain_stamina(store, log, turn, attacker, 2);
    }

    // Step 6: miss ends the command.
    if !attack_roll.hit {
        return true;
    }

    // Step 7: defender reaction.
    let reactions_left = *ctx.reactions_for(store, target_id);
    if reactions_left > 0 {
        if let Some(defense_result) = attempt_defense(store, log, rng, turn, attacker, target_id, attack_type) {
            *ctx.reactions_remaining.get_mut(&target_id).unwrap() -= 1;
            if defense_result {
                return true;
            }
        }
    }

    // Step 8: hit location.
    let location = chosen_location.unwrap_or_else(|| combat::roll_hit_location(rng));
    log.push(turn, Some(attacker), Some(target_id), EventKind::HitLocationRolled { location });

    let armor_at_location = store.armor(target_id).map(|a| a.at_location(location)).unwrap_or(0);
    let (raw_damage, final_damage_pre_mult) = combat::roll_damage(weapon.damage, armor_at_location, rng);

    if location == HitLocation::Weapon {
        log.push(turn, Some(attacker), Some(target_id), EventKind::WeaponHitDeflected);
        drain_stamina(store, log, turn, target_id, (raw_damage + 1) / 2);
        if combat::roll_weapon_break(raw_damage, rng) {
            if let Some(off_hand) = store.off_hand_mut(target_id) {
                if off_hand.item_type == OffHandKind::Shield {
                    off_hand.block_bonus = 0;
                }
            }
            if let Some(w) = store.weapon_mut(target_id) {
                w.damage.bonus = (w.damage.bonus - 1).max(0);
            }
            log.push(turn, Some(attacker), Some(target_id), EventKind::WeaponBroken);
        }
        return true;
    }

    let multiplier = combat::location_multiplier(location);
    let elevation_diff = match (store.position(attacker), store.position(target_id)) {
        (Some(a), Some(b)) => a.elevation > b.elevation,
        _ => false,
    };
    let final_damage = (final_damage_pre_mult as f32 * multiplier).floor() as i32 + if elevation_diff { 1 } else { 0 };

    let armor_impact_drain = stamina::armor_impact_drain(armor_at_location.min(raw_damage));
    drain_stamina(store, log, turn, target_id, armor_impact_drain);
    log.push(turn, Some(attacker), Some(target_id), EventKind::ArmorImpact { absorbed: armor_at_location.min(raw_damage) });

    let new_state = store.health_mut(target_id).map(|h| h.apply_damage(final_damage)).unwrap_or(WoundState::Down);
    ctx.damaged_this_turn.insert(target_id);
    log.push(turn, Some(attacker), Some(target_id), EventKind::DamageDealt { damage: final_damage, location });

    if new_state == WoundState::Down {
        log.push(turn, Some(attacker), Some(target_id), EventKind::UnitDown { reason: "damage".to_string() });
    } else if matches!(new_state, WoundState::Wounded | WoundState::Critical) {
        log.push(turn, Some(attacker), Some(target_id), EventKind::UnitWounded);
    }

    if let Some(effect) = wounds::wound_effect_for_hit(location, final_damage, armor_at_location) {
        if let Some(we) = store.wound_effects_mut(target_id) {
            we.effects.push(effect);
        } else {
            store.set_wound_effects(target_id, WoundEffects { effects: vec![effect] });
        }
        log.push(turn, Some(attacker), Some(target_id), EventKind::WoundEffectApplied { location, severity: effect.severity });
    }

    if wounds::triggers_toughness_check(location, raw_damage) {
        let toughness = store.skills(target_id).map(|s| s.toughness).unwrap_or(40);
        let check = combat::roll_attack(toughness, 0, rng);
        if !check.hit {
            if let Some(h) = store.health_mut(target_id) {
                h.knock_down();
            }
            log.push(turn, Some(attacker), Some(target_id), EventKind::UnitDown { reason: "toughness".to_string() });
        }
    }

    if final_damage >= 20 {
        let base = store.skills(target_id).map(|s| s.morale).unwrap_or(50);
        let result = morale::test(base, -10, rng);
        log.push(turn, Some(target_id), None, EventKind::MoraleChecked { effective: result.effective, roll: result.roll, passed: result.passed });
        if !result.passed {
            if let Some(m) = store.morale_state_mut(target_id) {
                let before = m.status;
                m.status = morale::apply_failure(m.status, result.failure_margin);
                emit_morale_transition(log, turn, target_id, before, m.status);
            }
        }
    }

    true
}

fn emit_morale_transition(log: &mut EventLog, turn: u64, entity: EntityId, before: MoraleStatus, after: MoraleStatus) {
    if before == after {
        return;
    }
    match after {
        MoraleStatus::Shaken => log.push(turn, Some(entity), None, EventKind::UnitShaken),
        MoraleStatus::Broken => log.push(turn, Some(entity), None, EventKind::UnitBroken),
        MoraleStatus::Routed => log.push(turn, Some(entity), None, EventKind::UnitRouted),
        MoraleStatus::Steady => {}
    }
}

fn attempt_defense(store: &mut Store, log: &mut EventLog, rng: &mut Rng, turn: u64, attacker: EntityId, defender: EntityId, attack_type: AttackType) -> Option<bool> {
    let skills = store.skills(defender).cloned()?;
    let armor = store.armor(defender).copied().unwrap_or_default();
    let has_shield = store.off_hand(defender).map(|o| o.item_type == OffHandKind::Shield).unwrap_or(false);

    let wound_penalty = wound_state_penalty(store.health(defender).map(|h| h.wound_state).unwrap_or(WoundState::Healthy));
    let wound_effect_penalty = store.wound_effects(defender).map(|w| w.total_skill_penalty()).unwrap_or(0);
    let stance_bonus = store.defensive_stance(defender).map(|s| s.bonus_percent).unwrap_or(0);
    let height_bonus = if compute_height_bonus(store, defender, attacker) > 0 { 10 } else { 0 };
    let stamina_penalty = store.stamina(defender).map(|s| s.defense_penalty()).unwrap_or(0);

    let armor_class = armor.armor_class();
    let defense_type = combat::select_defense_type(
        attack_type,
        DefenseOptions { has_shield, block_skill: skills.block, parry_skill: skills.melee, dodge_skill: skills.dodge, armor_class },
    );

    let dodge_penalty = if defense_type == DefenseType::Dodge { armor_class.dodge_penalty().unwrap_or(0) } else { 0 };
    let shield_wall_bonus = if defense_type == DefenseType::Block && has_shield && nearby_shielded_ally(store, defender) { 10 } else { 0 };

    let base_skill = match defense_type {
        DefenseType::Block => skills.block,
        DefenseType::Parry => skills.melee,
        DefenseType::Dodge => skills.dodge,
    };
    let modifiers = wound_penalty + wound_effect_penalty + stance_bonus + height_bonus + stamina_penalty + dodge_penalty + shield_wall_bonus;

    let result = combat::roll_defense(defense_type, base_skill, modifiers, rng);
    log.push(
        turn,
        Some(defender),
        Some(attacker),
        EventKind::DefenseRolled { defense_type: result.defense_type, base_skill: result.base_skill, effective_skill: result.effective_skill, roll: result.roll, success: result.success },
    );
    Some(result.success)
}

/// Drain `amount` stamina from `id`, emitting `StaminaDrained` and, on
/// the turn exhaustion first sets in, `Exhausted`.
fn drain_stamina(store: &mut Store, log: &mut EventLog, turn: u64, id: EntityId, amount: i32) {
    let Some(mut s) = store.stamina(id).copied() else { return };
    let was_exhausted = s.exhausted;
    s.drain(amount);
    store.set_stamina(id, s);
    log.push(turn, Some(id), None, EventKind::StaminaDrained { amount });
    if s.exhausted && !was_exhausted {
        log.push(turn, Some(id), None, EventKind::Exhausted);
    }
}

fn nearby_shielded_ally(store: &Store, unit: EntityId) -> bool {
    let Some(pos) = store.position(unit) else { return false };
    let Some(faction) = store.faction(unit) else { return false };
    store
        .query(&[ComponentKind::Position, ComponentKind::Faction, ComponentKind::OffHand])
        .iter()
        .filter(|id| **id != unit)
        .filter(|id| store.faction(**id) == Some(faction))
        .filter(|id| store.off_hand(**id).map(|o| o.item_type == OffHandKind::Shield).unwrap_or(false))
        .any(|id| store.position(*id).map(|p| p.distance_to(pos) <= SHIELD_WALL_RANGE).unwrap_or(false))
}

fn wound_state_penalty(state: WoundState) -> i32 {
    match state {
        WoundState::Healthy => 0,
        WoundState::Bloodied => -5,
        WoundState::Wounded => -15,
        WoundState::Critical => -30,
        WoundState::Down => -100,
    }
}

fn morale_check_penalty(status: MoraleStatus) -> i32 {
    match status {
        MoraleStatus::Routed => -100,
        other => other.check_penalty(),
    }
}

fn compute_flanking_bonus(store: &Store, attacker: EntityId, target: EntityId) -> i32 {
    let Some(faction) = store.faction(attacker) else { return 0 };
    let extra_engagers = store
        .engagement(target)
        .map(|e| {
            e.engaged_with
                .iter()
                .filter(|id| **id != attacker)
                .filter(|id| store.faction(**id) == Some(faction))
                .count() as i32
        })
        .unwrap_or(0);
    (extra_engagers * 10).min(crate::config::FLANKING_BONUS_CAP)
}

fn compute_facing_arc_bonus(store: &Store, attacker: EntityId, target: EntityId) -> i32 {
    let (Some(att_pos), Some(def_pos)) = (store.position(attacker), store.position(target)) else { return 0 };
    let angle_to_attacker = (att_pos.y - def_pos.y).atan2(att_pos.x - def_pos.x);
    let mut delta = (angle_to_attacker - def_pos.facing).abs() % (2.0 * std::f32::consts::PI);
    if delta > std::f32::consts::PI {
        delta = 2.0 * std::f32::consts::PI - delta;
    }
    let degrees = delta.to_degrees();
    if degrees <= 45.0 {
        0
    } else if degrees <= 135.0 {
        10
    } else {
        20
    }
}

fn compute_height_bonus(store: &Store, attacker: EntityId, target: EntityId) -> i32 {
    match (store.position(attacker), store.position(target)) {
        (Some(a), Some(b)) if a.elevation > b.elevation => 10,
        _ => 0,
    }
}

fn end_of_turn(store: &mut Store, log: &mut EventLog, _rng: &mut Rng, turn: u64, damaged_this_turn: &HashSet<EntityId>) {
    let ids = store.query(&[ComponentKind::Health, ComponentKind::Faction]);
    for id in ids {
        if !store.is_alive(id) {
            continue;
        }
        // Bleeding tick.
        let bleed = store.wound_effects(id).map(|w| w.total_bleed_per_turn()).unwrap_or(0);
        if bleed > 0 {
            let new_state = store.health_mut(id).map(|h| h.apply_damage(bleed)).unwrap_or(WoundState::Down);
            log.push(turn, Some(id), None, EventKind::BleedingDamage { amount: bleed });
            if new_state == WoundState::Down {
                log.push(turn, Some(id), None, EventKind::UnitDown { reason: "bleeding".to_string() });
            }
        }

        store.remove_component(id, ComponentKind::DefensiveStance);
        store.remove_component(id, ComponentKind::Overwatch);

        if !store.is_alive(id) {
            continue;
        }

        let was_hit = damaged_this_turn.contains(&id);
        if let (Some(mut stamina), Some(mut ap)) = (store.stamina(id).copied(), store.action_points(id).copied()) {
            stamina::recover_and_sync_ap(&mut stamina, &mut ap, was_hit);
            store.set_stamina(id, stamina);
            ap.reset_to_max();
            store.set_action_points(id, ap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Store;

    fn warrior(store: &mut Store, x: f32, y: f32, faction: Faction) -> EntityId {
        let id = store.create();
        store.set_position(id, Position::new(x, y));
        store.set_faction(id, faction);
        store.set_health(id, Health::new(100));
        store.set_skills(id, Skills { melee: 60, ranged: 60, block: 50, dodge: 40, morale: 60, perception: 45, toughness: 40 });
        store.set_action_points(id, ActionPoints::new(6, 0, 0));
        store.set_stamina(id, Stamina::new(20));
        store.set_armor(id, Armor::default());
        store.set_weapon(id, Weapon { name: "sword".into(), damage: DamageDice { dice: 1, sides: 6, bonus: 2 }, speed: 10, range: 1.0, ap_cost: 2, two_handed: false });
        store.set_morale_state(id, MoraleState::steady());
        store.set_engagement(id, Engagement::default());
        id
    }

    #[test]
    fn stable_priority_ties_resolve_by_insertion_order() {
        let mut store = Store::new();
        let a = warrior(&mut store, 0.0, 0.0, Faction::Player);
        let b = warrior(&mut store, 1.0, 0.0, Faction::Enemy);

        store.set_command_queue(
            a,
            CommandQueue { commands: vec![QueuedCommand { command: Command::Attack { target_id: b, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 2, priority: 5 }, condition: None }] },
        );
        store.set_command_queue(
            b,
            CommandQueue { commands: vec![QueuedCommand { command: Command::Attack { target_id: a, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 2, priority: 5 }, condition: None }] },
        );

        let mut log = EventLog::new();
        let mut rng = Rng::new(42);
        resolve_turn(&mut store, &mut log, &mut rng, 0, 40.0, 40.0);

        let declared: Vec<EntityId> = log
            .all()
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::AttackDeclared { .. } => e.entity_id,
                _ => None,
            })
            .collect();
        assert_eq!(declared.len(), 2);
        assert_eq!(declared[0], a);
    }

    #[test]
    fn duel_is_deterministic_across_runs() {
        fn run_once() -> Vec<EventKind> {
            let mut store = Store::new();
            let a = warrior(&mut store, 0.0, 0.0, Faction::Player);
            let b = warrior(&mut store, 1.0, 0.0, Faction::Enemy);
            store.set_command_queue(a, CommandQueue { commands: vec![QueuedCommand { command: Command::Attack { target_id: b, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 2, priority: 5 }, condition: None }] });
            store.set_command_queue(b, CommandQueue { commands: vec![QueuedCommand { command: Command::Attack { target_id: a, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 2, priority: 5 }, condition: None }] });
            let mut log = EventLog::new();
            let mut rng = Rng::new(42);
            resolve_turn(&mut store, &mut log, &mut rng, 0, 40.0, 40.0);
            log.all().iter().map(|e| e.kind.clone()).collect()
        }
        assert_eq!(run_once(), run_once());
    }

    #[test]
    fn reaction_budget_is_never_exceeded() {
        let mut store = Store::new();
        let attacker = warrior(&mut store, 0.0, 0.0, Faction::Player);
        let defender = warrior(&mut store, 0.5, 0.0, Faction::Enemy);
        store.set_command_queue(
            attacker,
            CommandQueue {
                commands: vec![
                    QueuedCommand { command: Command::Attack { target_id: defender, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 1, priority: 1 }, condition: None },
                    QueuedCommand { command: Command::Attack { target_id: defender, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 1, priority: 2 }, condition: None },
                    QueuedCommand { command: Command::Attack { target_id: defender, attack_type: AttackType::Melee, chosen_location: None, ap_cost: 1, priority: 3 }, condition: None },
                ],
            },
        );
        let mut log = EventLog::new();
        let mut rng = Rng::new(7);
        resolve_turn(&mut store, &mut log, &mut rng, 0, 40.0, 40.0);

        let defense_rolls = log.all().iter().filter(|e| matches!(e.kind, EventKind::DefenseRolled { .. })).count();
        assert!(defense_rolls <= 1);
    }
}
