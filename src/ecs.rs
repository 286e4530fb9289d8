//! Sparse tagged-component entity store (§4.C, §9 Design Notes).
//!
//! The spec's `query(kinds...)`, `snapshot(id)`, and `loadEntity(id,
//! mapping)` operations need fully dynamic, serializable component
//! access with monotonic, never-recycled entity ids — the dense
//! archetype storage the teacher crate uses (`bevy_ecs::World`) can't
//! give us that without reflection machinery this crate has no other
//! use for. So entities here are bare ids, and each one owns an
//! ordered map from component kind to component value, same shape as
//! the teacher's serializable `Snapshot` (`sim/src/world.rs`) but as
//! the live, mutable store itself rather than a read-only projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Identity,
    Position,
    Faction,
    Health,
    Skills,
    ActionPoints,
    Stamina,
    Armor,
    Weapon,
    OffHand,
    Ammo,
    MoraleState,
    Engagement,
    CommandQueue,
    DefensiveStance,
    Overwatch,
    WoundEffects,
    Obstacle,
    AIController,
    Speed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Component {
    Identity(Identity),
    Position(Position),
    Faction(Faction),
    Health(Health),
    Skills(Skills),
    ActionPoints(ActionPoints),
    Stamina(Stamina),
    Armor(Armor),
    Weapon(Weapon),
    OffHand(OffHand),
    Ammo(Ammo),
    MoraleState(MoraleState),
    Engagement(Engagement),
    CommandQueue(crate::systems::turn::CommandQueue),
    DefensiveStance(DefensiveStance),
    Overwatch(Overwatch),
    WoundEffects(WoundEffects),
    Obstacle(Obstacle),
    AIController(AIController),
    Speed(Speed),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Identity(_) => ComponentKind::Identity,
            Component::Position(_) => ComponentKind::Position,
            Component::Faction(_) => ComponentKind::Faction,
            Component::Health(_) => ComponentKind::Health,
            Component::Skills(_) => ComponentKind::Skills,
            Component::ActionPoints(_) => ComponentKind::ActionPoints,
            Component::Stamina(_) => ComponentKind::Stamina,
            Component::Armor(_) => ComponentKind::Armor,
            Component::Weapon(_) => ComponentKind::Weapon,
            Component::OffHand(_) => ComponentKind::OffHand,
            Component::Ammo(_) => ComponentKind::Ammo,
            Component::MoraleState(_) => ComponentKind::MoraleState,
            Component::Engagement(_) => ComponentKind::Engagement,
            Component::CommandQueue(_) => ComponentKind::CommandQueue,
            Component::DefensiveStance(_) => ComponentKind::DefensiveStance,
            Component::Overwatch(_) => ComponentKind::Overwatch,
            Component::WoundEffects(_) => ComponentKind::WoundEffects,
            Component::Obstacle(_) => ComponentKind::Obstacle,
            Component::AIController(_) => ComponentKind::AIController,
            Component::Speed(_) => ComponentKind::Speed,
        }
    }
}

/// Generates `Component::Foo(x)` wrapping and `as_foo`/`as_foo_mut`
/// unwrapping accessors so call sites read `store.get_health(id)`
/// instead of matching on the sum type everywhere.
macro_rules! component_accessors {
    ($( $variant:ident, $ty:ty, $get:ident, $get_mut:ident, $set:ident );* $(;)?) => {
        impl Component {
            $(
                pub fn $get(&self) -> Option<&$ty> {
                    match self {
                        Component::$variant(v) => Some(v),
                        _ => None,
                    }
                }
                pub fn $get_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        Component::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )*
        }

        impl Store {
            $(
                pub fn $get(&self, id: EntityId) -> Option<&$ty> {
                    self.get(id, ComponentKind::$variant).and_then(Component::$get)
                }
                pub fn $get_mut(&mut self, id: EntityId) -> Option<&mut $ty> {
                    self.get_mut(id, ComponentKind::$variant).and_then(Component::$get_mut)
                }
                pub fn $set(&mut self, id: EntityId, value: $ty) {
                    self.set(id, Component::$variant(value));
                }
            )*
        }
    };
}

component_accessors! {
    Identity, Identity, identity, identity_mut, set_identity;
    Position, Position, position, position_mut, set_position;
    Faction, Faction, faction, faction_mut, set_faction;
    Health, Health, health, health_mut, set_health;
    Skills, Skills, skills, skills_mut, set_skills;
    ActionPoints, ActionPoints, action_points, action_points_mut, set_action_points;
    Stamina, Stamina, stamina, stamina_mut, set_stamina;
    Armor, Armor, armor, armor_mut, set_armor;
    Weapon, Weapon, weapon, weapon_mut, set_weapon;
    OffHand, OffHand, off_hand, off_hand_mut, set_off_hand;
    Ammo, Ammo, ammo, ammo_mut, set_ammo;
    MoraleState, MoraleState, morale_state, morale_state_mut, set_morale_state;
    Engagement, Engagement, engagement, engagement_mut, set_engagement;
    CommandQueue, crate::systems::turn::CommandQueue, command_queue, command_queue_mut, set_command_queue;
    DefensiveStance, DefensiveStance, defensive_stance, defensive_stance_mut, set_defensive_stance;
    Overwatch, Overwatch, overwatch, overwatch_mut, set_overwatch;
    WoundEffects, WoundEffects, wound_effects, wound_effects_mut, set_wound_effects;
    Obstacle, Obstacle, obstacle, obstacle_mut, set_obstacle;
    AIController, AIController, ai_controller, ai_controller_mut, set_ai_controller;
    Speed, Speed, speed, speed_mut, set_speed;
}

/// One entity's components, ordered by kind so serialization and
/// iteration order are deterministic.
pub type EntityComponents = BTreeMap<ComponentKind, Component>;

/// The entity-component store (§4.C). Owns every entity's components
/// and a monotonic id counter so `create`/`loadEntity` always agree on
/// "next free id >= max previously seen + 1".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Store {
    entities: BTreeMap<EntityId, EntityComponents>,
    next_id: u64,
}

impl Store {
    pub fn new() -> Self {
        Self { entities: BTreeMap::new(), next_id: 1 }
    }

    pub fn create(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, BTreeMap::new());
        id
    }

    pub fn remove(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn set(&mut self, id: EntityId, component: Component) {
        self.entities.entry(id).or_default().insert(component.kind(), component);
    }

    pub fn get(&self, id: EntityId, kind: ComponentKind) -> Option<&Component> {
        self.entities.get(&id).and_then(|m| m.get(&kind))
    }

    pub fn get_mut(&mut self, id: EntityId, kind: ComponentKind) -> Option<&mut Component> {
        self.entities.get_mut(&id).and_then(|m| m.get_mut(&kind))
    }

    pub fn has(&self, id: EntityId, kind: ComponentKind) -> bool {
        self.entities.get(&id).map(|m| m.contains_key(&kind)).unwrap_or(false)
    }

    pub fn remove_component(&mut self, id: EntityId, kind: ComponentKind) {
        if let Some(m) = self.entities.get_mut(&id) {
            m.remove(&kind);
        }
    }

    /// All entity ids possessing every listed kind.
    pub fn query(&self, kinds: &[ComponentKind]) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, comps)| kinds.iter().all(|k| comps.contains_key(k)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn all_ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn snapshot_entity(&self, id: EntityId) -> Option<EntityComponents> {
        self.entities.get(&id).cloned()
    }

    /// Load (or overwrite) an entity under `id` with exactly `mapping`.
    /// Advances `next_id` so further `create()` calls never collide
    /// with restored ids, preserving the "next free id >= max seen + 1"
    /// rule across a snapshot round-trip.
    pub fn load_entity(&mut self, id: EntityId, mapping: EntityComponents) {
        self.entities.insert(id, mapping);
        self.next_id = self.next_id.max(id.0 + 1);
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.health(id).map(|h| h.is_alive()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_monotonic_ids() {
        let mut store = Store::new();
        let a = store.create();
        let b = store.create();
        assert!(b.0 > a.0);
    }

    #[test]
    fn set_get_has_roundtrip() {
        let mut store = Store::new();
        let id = store.create();
        store.set_health(id, Health::new(100));
        assert!(store.has(id, ComponentKind::Health));
        assert_eq!(store.health(id).unwrap().current, 100);
    }

    #[test]
    fn query_matches_all_kinds() {
        let mut store = Store::new();
        let a = store.create();
        let b = store.create();
        store.set_health(a, Health::new(10));
        store.set_health(b, Health::new(10));
        store.set_position(a, Position::new(0.0, 0.0));

        let matched = store.query(&[ComponentKind::Health, ComponentKind::Position]);
        assert_eq!(matched, vec![a]);
    }

    #[test]
    fn snapshot_and_load_entity_round_trips() {
        let mut store = Store::new();
        let id = store.create();
        store.set_health(id, Health::new(42));
        let snap = store.snapshot_entity(id).unwrap();

        let mut fresh = Store::new();
        fresh.load_entity(id, snap);
        assert_eq!(fresh.health(id).unwrap().current, 42);

        // next create() must not collide with the restored id
        let next = fresh.create();
        assert!(next.0 > id.0);
    }

    #[test]
    fn remove_drops_entity() {
        let mut store = Store::new();
        let id = store.create();
        store.set_health(id, Health::new(1));
        store.remove(id);
        assert!(!store.exists(id));
    }
}
