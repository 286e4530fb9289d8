//! Unit templates and the entity factory (§4.D).
//!
//! A small static table keyed by unit-type string, the same shape as
//! the teacher's `UnitType` catalogue in `sim/src/components.rs`, just
//! trading bevy bundle-spawning for direct `Store::set_*` calls.

use serde::{Deserialize, Serialize};

use crate::components::*;
use crate::ecs::{EntityId, Store};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTemplate {
    pub unit_type: String,
    pub base_ap: i32,
    pub base_speed: f32,
    pub skills: Skills,
    pub stamina_max: i32,
    pub health_max: i32,
    pub armor: Armor,
    pub weapon: Weapon,
    pub off_hand: Option<OffHand>,
    pub ammo: Option<Ammo>,
    pub point_value: i32,
}

fn sword_and_board() -> UnitTemplate {
    UnitTemplate {
        unit_type: "militia".into(),
        base_ap: 6,
        base_speed: 6.0,
        skills: Skills { melee: 45, ranged: 30, block: 40, dodge: 35, morale: 50, perception: 45, toughness: 40 },
        stamina_max: 18,
        health_max: 80,
        armor: Armor { head: 1, torso: 2, arms: 1, legs: 1, ap_penalty: 0, stamina_penalty: 0 },
        weapon: Weapon { name: "short sword".into(), damage: DamageDice { dice: 1, sides: 6, bonus: 1 }, speed: 10, range: 1.0, ap_cost: 2, two_handed: false },
        off_hand: Some(OffHand { item_type: OffHandKind::Shield, block_bonus: 10 }),
        ammo: None,
        point_value: 10,
    }
}

fn man_at_arms() -> UnitTemplate {
    UnitTemplate {
        unit_type: "man_at_arms".into(),
        base_ap: 6,
        base_speed: 5.5,
        skills: Skills { melee: 65, ranged: 35, block: 55, dodge: 30, morale: 65, perception: 45, toughness: 45 },
        stamina_max: 22,
        health_max: 100,
        armor: Armor { head: 3, torso: 5, arms: 3, legs: 3, ap_penalty: 1, stamina_penalty: 1 },
        weapon: Weapon { name: "longsword".into(), damage: DamageDice { dice: 1, sides: 8, bonus: 2 }, speed: 8, range: 1.2, ap_cost: 2, two_handed: false },
        off_hand: Some(OffHand { item_type: OffHandKind::Shield, block_bonus: 15 }),
        ammo: None,
        point_value: 18,
    }
}

fn two_handed_brute() -> UnitTemplate {
    UnitTemplate {
        unit_type: "berserker".into(),
        base_ap: 6,
        base_speed: 6.5,
        skills: Skills { melee: 60, ranged: 20, block: 20, dodge: 45, morale: 55, perception: 40, toughness: 55 },
        stamina_max: 24,
        health_max: 110,
        armor: Armor { head: 0, torso: 2, arms: 1, legs: 1, ap_penalty: 0, stamina_penalty: 0 },
        weapon: Weapon { name: "greataxe".into(), damage: DamageDice { dice: 1, sides: 10, bonus: 4 }, speed: 6, range: 1.3, ap_cost: 3, two_handed: true },
        off_hand: None,
        ammo: None,
        point_value: 22,
    }
}

fn archer() -> UnitTemplate {
    UnitTemplate {
        unit_type: "archer".into(),
        base_ap: 6,
        base_speed: 6.0,
        skills: Skills { melee: 30, ranged: 60, block: 25, dodge: 45, morale: 50, perception: 60, toughness: 35 },
        stamina_max: 18,
        health_max: 70,
        armor: Armor { head: 0, torso: 1, arms: 0, legs: 1, ap_penalty: 0, stamina_penalty: 0 },
        weapon: Weapon { name: "longbow".into(), damage: DamageDice { dice: 1, sides: 6, bonus: 1 }, speed: 9, range: 16.0, ap_cost: 2, two_handed: true },
        off_hand: None,
        ammo: Some(Ammo {
            slots: vec![
                AmmoSlot { ammo_type: 0, quantity: 20, max_quantity: 20, armor_piercing: false, damage_bonus: 0 },
                AmmoSlot { ammo_type: 1, quantity: 6, max_quantity: 6, armor_piercing: true, damage_bonus: -1 },
            ],
            current_slot: 0,
        }),
        point_value: 16,
    }
}

fn heavy_knight() -> UnitTemplate {
    UnitTemplate {
        unit_type: "knight".into(),
        base_ap: 6,
        base_speed: 5.0,
        skills: Skills { melee: 70, ranged: 25, block: 60, dodge: 15, morale: 70, perception: 40, toughness: 55 },
        stamina_max: 20,
        health_max: 120,
        armor: Armor { head: 4, torso: 6, arms: 4, legs: 4, ap_penalty: 1, stamina_penalty: 2 },
        weapon: Weapon { name: "arming sword".into(), damage: DamageDice { dice: 1, sides: 8, bonus: 3 }, speed: 7, range: 1.2, ap_cost: 2, two_handed: false },
        off_hand: Some(OffHand { item_type: OffHandKind::Shield, block_bonus: 20 }),
        ammo: None,
        point_value: 26,
    }
}

/// Resolve the static template table. A `match` rather than a
/// `HashMap` since the set is fixed and small, same as the teacher's
/// `UnitType::stats()` match in `sim/src/components.rs`.
pub fn lookup(unit_type: &str) -> Option<UnitTemplate> {
    match unit_type {
        "militia" => Some(sword_and_board()),
        "man_at_arms" => Some(man_at_arms()),
        "berserker" => Some(two_handed_brute()),
        "archer" => Some(archer()),
        "knight" => Some(heavy_knight()),
        _ => None,
    }
}

pub fn point_value(unit_type: &str) -> i32 {
    lookup(unit_type).map(|t| t.point_value).unwrap_or(0)
}

/// Instantiate a fully-populated entity from a template at `position`
/// for `faction`, naming it `name` (e.g. `"Player 3"`).
pub fn spawn(store: &mut Store, unit_type: &str, name: String, position: Position, faction: Faction) -> EngineResult<EntityId> {
    let template = lookup(unit_type).ok_or_else(|| EngineError::UnknownUnitType(unit_type.to_string()))?;
    let id = store.create();

    store.set_identity(id, Identity { name, unit_type: template.unit_type.clone(), short_id: format!("{:?}", id) });
    store.set_position(id, position);
    store.set_faction(id, faction);
    store.set_health(id, Health::new(template.health_max));
    store.set_skills(id, template.skills);
    store.set_action_points(id, ActionPoints::new(template.base_ap, 0, template.armor.ap_penalty));
    store.set_stamina(id, Stamina::new(template.stamina_max));
    store.set_armor(id, template.armor);
    store.set_weapon(id, template.weapon.clone());
    if let Some(off_hand) = template.off_hand {
        store.set_off_hand(id, off_hand);
    }
    if let Some(ammo) = template.ammo.clone() {
        store.set_ammo(id, ammo);
    }
    store.set_morale_state(id, MoraleState::steady());
    store.set_engagement(id, Engagement::default());
    store.set_speed(id, Speed(template.base_speed));

    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_unit_type_rejected() {
        let mut store = Store::new();
        let result = spawn(&mut store, "dragon", "x".into(), Position::new(0.0, 0.0), Faction::Player);
        assert!(matches!(result, Err(EngineError::UnknownUnitType(_))));
    }

    #[test]
    fn spawn_populates_every_required_component() {
        let mut store = Store::new();
        let id = spawn(&mut store, "knight", "Sir Roland".into(), Position::new(1.0, 2.0), Faction::Player).unwrap();
        assert!(store.has(id, crate::ecs::ComponentKind::Health));
        assert!(store.has(id, crate::ecs::ComponentKind::Weapon));
        assert!(store.has(id, crate::ecs::ComponentKind::OffHand));
        assert_eq!(store.health(id).unwrap().current, 120);
        assert_eq!(store.action_points(id).unwrap().max, 5); // base 6 - armor_penalty 1
    }

    #[test]
    fn archer_gets_two_ammo_slots() {
        let mut store = Store::new();
        let id = spawn(&mut store, "archer", "Finn".into(), Position::new(0.0, 0.0), Faction::Enemy).unwrap();
        assert_eq!(store.ammo(id).unwrap().slots.len(), 2);
    }

    #[test]
    fn point_values_are_positive_for_known_types() {
        for t in ["militia", "man_at_arms", "berserker", "archer", "knight"] {
            assert!(point_value(t) > 0);
        }
        assert_eq!(point_value("nonexistent"), 0);
    }
}
