//! Pure combat resolver (§4.F). Every function here is a pure
//! function of its inputs plus PRNG draws — no component store access
//! — mirroring the teacher's pattern in `sim/src/systems/combat.rs` of
//! keeping a constants block up top and small free functions below,
//! just with the continuous per-tick fire-rate model replaced by
//! discrete per-command dice resolution.

use crate::components::{ArmorClass, AttackType, DamageDice, DefenseType, HitLocation, OffHandKind};
use crate::prng::Rng;

/// Clamp an effective skill into the legal roll-chance band.
pub fn clamp_skill(value: i32) -> i32 {
    value.clamp(5, 95)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackRollResult {
    pub base_skill: i32,
    pub effective_skill: i32,
    pub roll: u32,
    pub hit: bool,
}

pub fn roll_attack(base_skill: i32, modifiers: i32, rng: &mut Rng) -> AttackRollResult {
    let effective_skill = clamp_skill(base_skill + modifiers);
    let roll = rng.roll_d100();
    AttackRollResult { base_skill, effective_skill, roll, hit: (roll as i32) <= effective_skill }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefenseRollResult {
    pub defense_type: DefenseType,
    pub base_skill: i32,
    pub effective_skill: i32,
    pub roll: u32,
    pub success: bool,
}

pub fn roll_defense(defense_type: DefenseType, base_skill: i32, modifiers: i32, rng: &mut Rng) -> DefenseRollResult {
    let effective_skill = clamp_skill(base_skill + modifiers);
    let roll = rng.roll_d100();
    DefenseRollResult {
        defense_type,
        base_skill,
        effective_skill,
        roll,
        success: (roll as i32) <= effective_skill,
    }
}

pub fn roll_hit_location(rng: &mut Rng) -> HitLocation {
    match rng.roll_d100() {
        1..=15 => HitLocation::Head,
        16..=35 => HitLocation::Torso,
        36..=55 => HitLocation::Arms,
        56..=80 => HitLocation::Legs,
        _ => HitLocation::Weapon,
    }
}

/// `raw = dice roll + bonus`; `final = max(0, raw - armor)`. Armor for
/// a weapon hit is always 0 (handled by the caller not calling this
/// for weapon locations, or passing `armor = 0`).
pub fn roll_damage(weapon_damage: DamageDice, armor_at_location: i32, rng: &mut Rng) -> (i32, i32) {
    let raw = rng.roll(weapon_damage.dice, weapon_damage.sides, weapon_damage.bonus);
    let final_damage = (raw - armor_at_location).max(0);
    (raw, final_damage)
}

pub fn location_multiplier(location: HitLocation) -> f32 {
    match location {
        HitLocation::Head => 3.0,
        HitLocation::Weapon => 0.0,
        _ => 1.0,
    }
}

/// Weapon/shield break chance, only meaningful when `location == Weapon`.
pub fn weapon_break_chance(raw_damage: i32) -> u32 {
    (raw_damage * 5).clamp(0, 30) as u32
}

pub fn roll_weapon_break(raw_damage: i32, rng: &mut Rng) -> bool {
    let chance = weapon_break_chance(raw_damage);
    rng.roll_d100() <= chance
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefenseOptions {
    pub has_shield: bool,
    pub block_skill: i32,
    pub parry_skill: i32,
    pub dodge_skill: i32,
    pub armor_class: ArmorClass,
}

/// Defense-type selection, §4.F. Returns `None` only if the attack
/// type is ranged and a dodge/block choice can still be made — in
/// practice this never returns `None`; kept `Option` purely so a
/// future defense option (e.g. a parry-only ranged weapon) can signal
/// "no valid defense" without changing the signature.
pub fn select_defense_type(attack_type: AttackType, opts: DefenseOptions) -> DefenseType {
    let dodge_allowed = opts.armor_class.dodge_penalty().is_some();
    match attack_type {
        AttackType::Ranged => {
            if opts.has_shield && opts.block_skill >= opts.dodge_skill {
                DefenseType::Block
            } else if dodge_allowed {
                DefenseType::Dodge
            } else {
                DefenseType::Block
            }
        }
        AttackType::Melee => {
            // Rank {block (if shield), parry, dodge} by effective skill,
            // tie-break block > parry > dodge; if dodge is forbidden,
            // choose block when shielded else parry.
            if !dodge_allowed {
                return if opts.has_shield { DefenseType::Block } else { DefenseType::Parry };
            }
            let mut candidates = vec![(DefenseType::Parry, opts.parry_skill), (DefenseType::Dodge, opts.dodge_skill)];
            if opts.has_shield {
                candidates.push((DefenseType::Block, opts.block_skill));
            }
            // Stable max-by-skill with tie-break order block > parry > dodge.
            let rank = |d: DefenseType| match d {
                DefenseType::Block => 0,
                DefenseType::Parry => 1,
                DefenseType::Dodge => 2,
            };
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then(rank(a.0).cmp(&rank(b.0))));
            candidates[0].0
        }
    }
}

pub fn off_hand_is_shield(kind: OffHandKind) -> bool {
    matches!(kind, OffHandKind::Shield)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attack_roll_hits_iff_roll_le_effective() {
        let mut rng = Rng::new(42);
        let result = roll_attack(50, 0, &mut rng);
        assert_eq!(result.hit, (result.roll as i32) <= result.effective_skill);
    }

    #[test]
    fn effective_skill_clamped_to_band() {
        assert_eq!(clamp_skill(-50), 5);
        assert_eq!(clamp_skill(500), 95);
        assert_eq!(clamp_skill(50), 50);
    }

    #[test]
    fn hit_location_bands() {
        // Spot-check location band boundaries with a rng wired to return
        // specific rolls would require hook injection; instead check the
        // pure mapping function directly via roll_d100 range coverage.
        let mut rng = Rng::new(1);
        for _ in 0..200 {
            let loc = roll_hit_location(&mut rng);
            assert!(matches!(
                loc,
                HitLocation::Head | HitLocation::Torso | HitLocation::Arms | HitLocation::Legs | HitLocation::Weapon
            ));
        }
    }

    #[test]
    fn damage_floors_at_zero_after_armor() {
        let mut rng = Rng::new(3);
        let (_raw, final_damage) = roll_damage(DamageDice { dice: 1, sides: 1, bonus: 0 }, 100, &mut rng);
        assert_eq!(final_damage, 0);
    }

    #[test]
    fn triple_head_damage_multiplier() {
        assert_eq!(location_multiplier(HitLocation::Head), 3.0);
        assert_eq!(location_multiplier(HitLocation::Weapon), 0.0);
        assert_eq!(location_multiplier(HitLocation::Torso), 1.0);
    }

    #[test]
    fn weapon_break_chance_caps_at_30() {
        assert_eq!(weapon_break_chance(1), 5);
        assert_eq!(weapon_break_chance(10), 30);
        assert_eq!(weapon_break_chance(100), 30);
    }

    #[test]
    fn heavy_armor_never_selected_to_dodge() {
        let opts = DefenseOptions {
            has_shield: true,
            block_skill: 40,
            parry_skill: 40,
            dodge_skill: 99,
            armor_class: ArmorClass::Heavy,
        };
        let choice = select_defense_type(AttackType::Melee, opts);
        assert_ne!(choice, DefenseType::Dodge);
        let choice_ranged = select_defense_type(AttackType::Ranged, opts);
        assert_ne!(choice_ranged, DefenseType::Dodge);
    }

    #[test]
    fn melee_defense_tiebreak_prefers_block_then_parry_then_dodge() {
        let opts = DefenseOptions {
            has_shield: true,
            block_skill: 50,
            parry_skill: 50,
            dodge_skill: 50,
            armor_class: ArmorClass::Unarmored,
        };
        assert_eq!(select_defense_type(AttackType::Melee, opts), DefenseType::Block);
    }
}
