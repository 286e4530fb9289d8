//! Append-only event log (§4.B) and the closed event tag set (§6).
//!
//! Mirrors the teacher's flat, fully-serializable state-projection
//! idiom (`sim/src/world.rs::Snapshot`): every observable mutation gets
//! a typed payload here rather than a generic `{type, data: Value}`
//! bag, so consumers pattern-match instead of parsing untyped JSON.

use serde::{Deserialize, Serialize};

use crate::components::{AttackType, DefenseType, HitLocation, MoraleStatus, WoundSeverity};
use crate::ecs::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    ResolutionPhaseStarted,
    TurnEnded { actions_resolved: u32 },
    UnitMoved { from_x: f32, from_y: f32, to_x: f32, to_y: f32, path_len: usize },
    UnitTurned { new_facing: f32, ap_cost: i32 },
    AttackDeclared { attack_type: AttackType, is_provoke: bool },
    AttackRolled { base_skill: i32, effective_skill: i32, roll: u32, hit: bool },
    DefenseRolled { defense_type: DefenseType, base_skill: i32, effective_skill: i32, roll: u32, success: bool },
    HitLocationRolled { location: HitLocation },
    DamageDealt { damage: i32, location: HitLocation },
    UnitWounded,
    UnitDown { reason: String },
    AttackOutOfRange { distance: f32, required_range: f32 },
    WeaponHitDeflected,
    WeaponBroken,
    ArmorImpact { absorbed: i32 },
    StaminaDrained { amount: i32 },
    Exhausted,
    AmmoSpent { slot: usize },
    MoraleChecked { effective: i32, roll: u32, passed: bool },
    UnitShaken,
    UnitBroken,
    UnitRouted,
    UnitRallied { new_status: MoraleStatus },
    OverwatchSet,
    OverwatchTriggered,
    WoundEffectApplied { location: HitLocation, severity: WoundSeverity },
    BleedingDamage { amount: i32 },
    VictoryAchieved,
    DefeatSuffered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub turn: u64,
    /// Logical, monotonically increasing index — not a wall-clock value.
    pub timestamp: u64,
    pub entity_id: Option<EntityId>,
    pub target_id: Option<EntityId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
    next_timestamp: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: u64, entity_id: Option<EntityId>, target_id: Option<EntityId>, kind: EventKind) {
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;
        self.events.push(Event { kind, turn, timestamp, entity_id, target_id });
    }

    pub fn all(&self) -> &[Event] {
        &self.events
    }

    pub fn for_turn(&self, turn: u64) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(move |e| e.turn == turn)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_insertion_order_and_turn_filter() {
        let mut log = EventLog::new();
        log.push(0, None, None, EventKind::ResolutionPhaseStarted);
        log.push(0, None, None, EventKind::TurnEnded { actions_resolved: 1 });
        log.push(1, None, None, EventKind::ResolutionPhaseStarted);

        assert_eq!(log.len(), 3);
        assert_eq!(log.for_turn(0).count(), 2);
        assert_eq!(log.for_turn(1).count(), 1);
    }

    #[test]
    fn timestamps_are_monotonic() {
        let mut log = EventLog::new();
        for _ in 0..5 {
            log.push(0, None, None, EventKind::ResolutionPhaseStarted);
        }
        let timestamps: Vec<u64> = log.all().iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
    }
}
