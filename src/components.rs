//! Concrete component types (§3 of SPEC_FULL.md).
//!
//! Each component is a plain data struct with inherent methods for the
//! small derivations the spec calls out (wound-state thresholds,
//! exhaustion, morale status checks) — the same struct-with-methods
//! style the teacher uses for `Health`, `Morale`, and `Suppression` in
//! `sim/src/components.rs`, just keyed into a sum type instead of
//! bevy's per-type dense storage.

use serde::{Deserialize, Serialize};

use crate::ecs::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub unit_type: String,
    pub short_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub facing: f32,
    pub elevation: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, facing: 0.0, elevation: 0.0 }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Faction {
    Player,
    Enemy,
}

impl Faction {
    pub fn opposes(&self, other: &Faction) -> bool {
        self != other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WoundState {
    Healthy,
    Bloodied,
    Wounded,
    Critical,
    Down,
}

impl WoundState {
    /// `woundState = f(current/max)` per the Health invariant.
    pub fn from_fraction(current: i32, max: i32) -> Self {
        if current <= 0 {
            return WoundState::Down;
        }
        if max <= 0 {
            return WoundState::Down;
        }
        let frac = current as f32 / max as f32;
        if frac > 0.75 {
            WoundState::Healthy
        } else if frac > 0.50 {
            WoundState::Bloodied
        } else if frac > 0.25 {
            WoundState::Wounded
        } else {
            WoundState::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: i32,
    pub max: i32,
    pub wound_state: WoundState,
}

impl Health {
    pub fn new(max: i32) -> Self {
        Self { current: max, max, wound_state: WoundState::Healthy }
    }

    pub fn is_alive(&self) -> bool {
        self.wound_state != WoundState::Down
    }

    /// Apply damage and resync `wound_state`. Returns the resulting state.
    pub fn apply_damage(&mut self, amount: i32) -> WoundState {
        self.current = (self.current - amount).max(0).min(self.max);
        self.wound_state = WoundState::from_fraction(self.current, self.max);
        self.wound_state
    }

    /// Force the unit down regardless of remaining HP (toughness-check knockout).
    pub fn knock_down(&mut self) {
        self.current = 0;
        self.wound_state = WoundState::Down;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Skills {
    pub melee: i32,
    pub ranged: i32,
    pub block: i32,
    pub dodge: i32,
    pub morale: i32,
    pub perception: i32,
    pub toughness: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPoints {
    pub current: i32,
    pub max: i32,
    pub base_value: i32,
    pub armor_penalty: i32,
    pub experience_bonus: i32,
}

impl ActionPoints {
    pub fn new(base_value: i32, experience_bonus: i32, armor_penalty: i32) -> Self {
        let max = base_value + experience_bonus - armor_penalty;
        Self { current: max, max, base_value, armor_penalty, experience_bonus }
    }

    /// Recompute `max` factoring in exhaustion's −1 penalty, clamp `current`.
    pub fn recompute_max(&mut self, exhausted: bool) {
        self.max = self.base_value + self.experience_bonus - self.armor_penalty
            - if exhausted { 1 } else { 0 };
        self.current = self.current.min(self.max);
    }

    pub fn reset_to_max(&mut self) {
        self.current = self.max;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamina {
    pub current: i32,
    pub max: i32,
    pub exhausted: bool,
}

impl Stamina {
    pub fn new(max: i32) -> Self {
        Self { current: max, max, exhausted: false }
    }

    pub fn drain(&mut self, n: i32) {
        self.current = (self.current - n).max(0);
        if self.current <= 0 {
            self.exhausted = true;
        }
    }

    pub fn recover(&mut self, was_hit: bool) {
        let amount = if was_hit {
            crate::config::STAMINA_RECOVER_HIT
        } else {
            crate::config::STAMINA_RECOVER_UNHIT
        };
        self.current = (self.current + amount).min(self.max);
        if self.current > 0 {
            self.exhausted = false;
        }
    }

    /// Defense-roll penalty by percentage of max stamina remaining.
    pub fn defense_penalty(&self) -> i32 {
        if self.exhausted || self.current <= 0 {
            return -40;
        }
        let frac = self.current as f32 / self.max.max(1) as f32;
        if frac >= 0.75 {
            0
        } else if frac >= 0.50 {
            -10
        } else if frac >= 0.25 {
            -20
        } else {
            -30
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Armor {
    pub head: i32,
    pub torso: i32,
    pub arms: i32,
    pub legs: i32,
    pub ap_penalty: i32,
    pub stamina_penalty: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmorClass {
    Unarmored,
    Light,
    Medium,
    Heavy,
}

impl Armor {
    pub fn total(&self) -> i32 {
        self.head + self.torso + self.arms + self.legs
    }

    pub fn armor_class(&self) -> ArmorClass {
        let total = self.total();
        if total <= 4 {
            ArmorClass::Unarmored
        } else if total <= 8 {
            ArmorClass::Light
        } else if total <= 14 {
            ArmorClass::Medium
        } else {
            ArmorClass::Heavy
        }
    }

    pub fn at_location(&self, location: HitLocation) -> i32 {
        match location {
            HitLocation::Head => self.head,
            HitLocation::Torso => self.torso,
            HitLocation::Arms => self.arms,
            HitLocation::Legs => self.legs,
            HitLocation::Weapon => 0,
        }
    }
}

impl ArmorClass {
    /// Dodge defense penalty by class; `None` means dodge is forbidden.
    pub fn dodge_penalty(&self) -> Option<i32> {
        match self {
            ArmorClass::Unarmored => Some(0),
            ArmorClass::Light => Some(-15),
            ArmorClass::Medium => Some(-30),
            ArmorClass::Heavy => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitLocation {
    Head,
    Torso,
    Arms,
    Legs,
    Weapon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageDice {
    pub dice: u32,
    pub sides: u32,
    pub bonus: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weapon {
    pub name: String,
    pub damage: DamageDice,
    pub speed: i32,
    pub range: f32,
    pub ap_cost: i32,
    pub two_handed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffHandKind {
    Shield,
    Weapon,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffHand {
    pub item_type: OffHandKind,
    pub block_bonus: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmoSlot {
    pub ammo_type: u32,
    pub quantity: i32,
    pub max_quantity: i32,
    pub armor_piercing: bool,
    pub damage_bonus: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ammo {
    pub slots: Vec<AmmoSlot>,
    pub current_slot: usize,
}

impl Ammo {
    pub fn consume(&mut self) -> bool {
        match self.slots.get_mut(self.current_slot) {
            Some(slot) if slot.quantity > 0 => {
                slot.quantity -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn switch_slot(&mut self, index: usize) -> bool {
        if index < self.slots.len() {
            self.current_slot = index;
            true
        } else {
            false
        }
    }

    pub fn auto_switch_if_empty(&mut self) -> bool {
        if self.slots.get(self.current_slot).map(|s| s.quantity > 0).unwrap_or(false) {
            return true;
        }
        if let Some(idx) = self.find_slot_with_ammo() {
            self.current_slot = idx;
            true
        } else {
            false
        }
    }

    pub fn find_slot_with_ammo(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.quantity > 0)
    }

    pub fn total_ammo(&self) -> i32 {
        self.slots.iter().map(|s| s.quantity).sum()
    }

    pub fn has_ammo(&self) -> bool {
        self.slots.get(self.current_slot).map(|s| s.quantity > 0).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, PartialOrd, Ord)]
pub enum MoraleStatus {
    Steady,
    Shaken,
    Broken,
    Routed,
}

impl MoraleStatus {
    pub fn worsen(self, steps: u32) -> Self {
        let order = [MoraleStatus::Steady, MoraleStatus::Shaken, MoraleStatus::Broken, MoraleStatus::Routed];
        let idx = order.iter().position(|s| *s == self).unwrap_or(0);
        order[(idx + steps as usize).min(order.len() - 1)]
    }

    pub fn improve_one_step(self) -> Self {
        match self {
            MoraleStatus::Routed => MoraleStatus::Routed,
            MoraleStatus::Broken => MoraleStatus::Shaken,
            MoraleStatus::Shaken => MoraleStatus::Steady,
            MoraleStatus::Steady => MoraleStatus::Steady,
        }
    }

    pub fn check_penalty(&self) -> i32 {
        match self {
            MoraleStatus::Steady => 0,
            MoraleStatus::Shaken => -10,
            MoraleStatus::Broken => -20,
            MoraleStatus::Routed => i32::MIN, // blocks all action; callers must check separately
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoraleState {
    pub status: MoraleStatus,
}

impl MoraleState {
    pub fn steady() -> Self {
        Self { status: MoraleStatus::Steady }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Engagement {
    pub engaged_with: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveMode {
    Walk,
    Advance,
    Run,
    Sprint,
}

impl MoveMode {
    pub fn speed_multiplier(&self) -> f32 {
        match self {
            MoveMode::Walk => 0.25,
            MoveMode::Advance => 0.50,
            MoveMode::Run => 0.75,
            MoveMode::Sprint => 1.00,
        }
    }

    pub fn ap_per_turn(&self) -> i32 {
        match self {
            MoveMode::Walk => 1,
            MoveMode::Advance => 2,
            MoveMode::Run => 4,
            MoveMode::Sprint => 1, // sprint consumes all remaining AP instead
        }
    }

    /// Wound `restrictsMoveMode` downgrades sprint/run to advance.
    pub fn downgraded(&self) -> MoveMode {
        match self {
            MoveMode::Sprint | MoveMode::Run => MoveMode::Advance,
            other => *other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackType {
    Melee,
    Ranged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefenseType {
    Block,
    Parry,
    Dodge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DefensiveStance {
    pub bonus_percent: i32,
    pub extra_reactions: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overwatch {
    pub attack_type: AttackType,
    pub watch_direction: Option<f32>,
    pub watch_arc: Option<f32>,
    pub triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WoundSeverity {
    Minor,
    Moderate,
    Severe,
}

impl WoundSeverity {
    pub fn from_excess(excess: i32) -> Option<Self> {
        if excess <= 0 {
            None
        } else if excess <= 3 {
            Some(WoundSeverity::Minor)
        } else if excess <= 7 {
            Some(WoundSeverity::Moderate)
        } else {
            Some(WoundSeverity::Severe)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WoundEffect {
    pub location: HitLocation,
    pub severity: WoundSeverity,
    pub skill_penalty: i32,
    pub movement_penalty: i32,
    pub bleeding_per_turn: i32,
    pub disables_two_handed: bool,
    pub restricts_move_mode: bool,
    pub halves_movement: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WoundEffects {
    pub effects: Vec<WoundEffect>,
}

impl WoundEffects {
    pub fn total_skill_penalty(&self) -> i32 {
        self.effects.iter().map(|e| e.skill_penalty).sum()
    }

    pub fn total_bleed_per_turn(&self) -> i32 {
        self.effects.iter().map(|e| e.bleeding_per_turn).sum()
    }

    pub fn total_movement_penalty(&self) -> i32 {
        self.effects.iter().map(|e| e.movement_penalty).sum()
    }

    pub fn any_disables_two_handed(&self) -> bool {
        self.effects.iter().any(|e| e.disables_two_handed)
    }

    pub fn any_restricts_move_mode(&self) -> bool {
        self.effects.iter().any(|e| e.restricts_move_mode)
    }

    pub fn any_halves_movement(&self) -> bool {
        self.effects.iter().any(|e| e.halves_movement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ObstacleShape {
    Circle { radius: f32 },
    Rect { half_length: f32, half_width: f32, rotation: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub shape: ObstacleShape,
    pub is_passable: bool,
    pub speed_multiplier: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiPersonality {
    Aggressive,
    Cunning,
    Cautious,
    Brutal,
    Honorable,
}

/// Base movement speed in world units per turn at `MoveMode::Sprint`
/// (i.e. before the mode multiplier is applied), set once by the unit
/// template and otherwise untouched by combat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speed(pub f32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AIController {
    pub personality: Option<AiPersonality>,
    pub current_goal: Option<EntityId>,
    pub target_id: Option<EntityId>,
    pub fear_target: Option<EntityId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wound_state_thresholds() {
        assert_eq!(WoundState::from_fraction(100, 100), WoundState::Healthy);
        assert_eq!(WoundState::from_fraction(76, 100), WoundState::Healthy);
        assert_eq!(WoundState::from_fraction(75, 100), WoundState::Bloodied);
        assert_eq!(WoundState::from_fraction(51, 100), WoundState::Bloodied);
        assert_eq!(WoundState::from_fraction(50, 100), WoundState::Wounded);
        assert_eq!(WoundState::from_fraction(26, 100), WoundState::Wounded);
        assert_eq!(WoundState::from_fraction(25, 100), WoundState::Critical);
        assert_eq!(WoundState::from_fraction(1, 100), WoundState::Critical);
        assert_eq!(WoundState::from_fraction(0, 100), WoundState::Down);
    }

    #[test]
    fn health_apply_damage_updates_state() {
        let mut h = Health::new(100);
        h.apply_damage(30);
        assert_eq!(h.current, 70);
        assert_eq!(h.wound_state, WoundState::Bloodied);
    }

    #[test]
    fn stamina_exhaustion_invariant() {
        let mut s = Stamina::new(10);
        s.drain(10);
        assert!(s.exhausted);
        assert_eq!(s.current, 0);
        s.recover(false);
        assert!(!s.exhausted);
    }

    #[test]
    fn armor_class_thresholds() {
        assert_eq!(Armor { head: 1, torso: 1, arms: 1, legs: 1, ..Default::default() }.armor_class(), ArmorClass::Unarmored);
        assert_eq!(Armor { head: 2, torso: 2, arms: 2, legs: 2, ..Default::default() }.armor_class(), ArmorClass::Light);
        assert_eq!(Armor { head: 4, torso: 4, arms: 3, legs: 3, ..Default::default() }.armor_class(), ArmorClass::Medium);
        assert_eq!(Armor { head: 5, torso: 5, arms: 5, legs: 5, ..Default::default() }.armor_class(), ArmorClass::Heavy);
    }

    #[test]
    fn heavy_armor_forbids_dodge() {
        let armor = Armor { head: 5, torso: 5, arms: 5, legs: 5, ..Default::default() };
        assert_eq!(armor.armor_class().dodge_penalty(), None);
    }

    #[test]
    fn ammo_consume_and_autoswitch() {
        let mut ammo = Ammo {
            slots: vec![
                AmmoSlot { ammo_type: 0, quantity: 1, max_quantity: 10, armor_piercing: false, damage_bonus: 0 },
                AmmoSlot { ammo_type: 1, quantity: 5, max_quantity: 10, armor_piercing: true, damage_bonus: 1 },
            ],
            current_slot: 0,
        };
        assert!(ammo.consume());
        assert!(!ammo.consume()); // now empty
        assert!(ammo.auto_switch_if_empty());
        assert_eq!(ammo.current_slot, 1);
    }

    #[test]
    fn morale_status_monotone_worsen() {
        assert_eq!(MoraleStatus::Steady.worsen(1), MoraleStatus::Shaken);
        assert_eq!(MoraleStatus::Steady.worsen(2), MoraleStatus::Broken);
        assert_eq!(MoraleStatus::Steady.worsen(3), MoraleStatus::Routed);
        assert_eq!(MoraleStatus::Routed.improve_one_step(), MoraleStatus::Routed);
    }
}
