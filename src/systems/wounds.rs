//! Wound effects system (§4.K). The location x severity table is
//! fixed data, expressed as a match rather than a runtime table since
//! the spec calls it out as fixed — same spirit as the teacher's
//! `CoverType::damage_reduction` match arms in `sim/src/systems/
//! cover.rs`.

use crate::components::{HitLocation, WoundEffect, WoundSeverity};

/// `threshold = 2 * locationArmor`; `excess = finalDamage - threshold`.
pub fn excess_damage(final_damage: i32, location_armor: i32) -> i32 {
    final_damage - 2 * location_armor
}

/// Build the wound effect for a hit, or `None` if the location never
/// produces one (head, weapon) or the excess is non-positive.
pub fn wound_effect_for_hit(location: HitLocation, final_damage: i32, location_armor: i32) -> Option<WoundEffect> {
    if matches!(location, HitLocation::Head | HitLocation::Weapon) {
        return None;
    }
    let severity = WoundSeverity::from_excess(excess_damage(final_damage, location_armor))?;

    let (skill_penalty, movement_penalty, bleeding_per_turn, disables_two_handed, restricts_move_mode, halves_movement) =
        match (location, severity) {
            (HitLocation::Arms, WoundSeverity::Minor) => (-5, 0, 0, false, false, false),
            (HitLocation::Arms, WoundSeverity::Moderate) => (-15, 0, 0, false, false, false),
            (HitLocation::Arms, WoundSeverity::Severe) => (-30, 0, 0, true, false, false),
            (HitLocation::Legs, WoundSeverity::Minor) => (0, 1, 0, false, false, false),
            (HitLocation::Legs, WoundSeverity::Moderate) => (0, 0, 0, false, false, true),
            (HitLocation::Legs, WoundSeverity::Severe) => (0, 0, 0, false, true, true),
            (HitLocation::Torso, WoundSeverity::Minor) => (0, 0, 1, false, false, false),
            (HitLocation::Torso, WoundSeverity::Moderate) => (0, 0, 3, false, false, false),
            (HitLocation::Torso, WoundSeverity::Severe) => (-10, 0, 5, false, false, false),
            _ => unreachable!("head/weapon filtered above"),
        };

    Some(WoundEffect {
        location,
        severity,
        skill_penalty,
        movement_penalty,
        bleeding_per_turn,
        disables_two_handed,
        restricts_move_mode,
        halves_movement,
    })
}

/// Head hit knockout check: triggers a Toughness D100 test when
/// `rawDamage * 3 > 5`.
pub fn triggers_toughness_check(location: HitLocation, raw_damage: i32) -> bool {
    location == HitLocation::Head && raw_damage * 3 > 5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torso_minor_bleeds_one() {
        let effect = wound_effect_for_hit(HitLocation::Torso, 3, 0).unwrap();
        assert_eq!(effect.bleeding_per_turn, 1);
        assert_eq!(effect.severity, WoundSeverity::Minor);
    }

    #[test]
    fn torso_severe_bleeds_five_and_skill_penalty() {
        let effect = wound_effect_for_hit(HitLocation::Torso, 10, 0).unwrap();
        assert_eq!(effect.severity, WoundSeverity::Severe);
        assert_eq!(effect.bleeding_per_turn, 5);
        assert_eq!(effect.skill_penalty, -10);
    }

    #[test]
    fn arms_severe_disables_two_handed() {
        let effect = wound_effect_for_hit(HitLocation::Arms, 10, 0).unwrap();
        assert!(effect.disables_two_handed);
        assert_eq!(effect.skill_penalty, -30);
    }

    #[test]
    fn legs_severe_halves_and_restricts() {
        let effect = wound_effect_for_hit(HitLocation::Legs, 10, 0).unwrap();
        assert!(effect.halves_movement);
        assert!(effect.restricts_move_mode);
    }

    #[test]
    fn head_and_weapon_never_produce_effects() {
        assert!(wound_effect_for_hit(HitLocation::Head, 50, 0).is_none());
        assert!(wound_effect_for_hit(HitLocation::Weapon, 50, 0).is_none());
    }

    #[test]
    fn non_positive_excess_produces_no_effect() {
        assert!(wound_effect_for_hit(HitLocation::Torso, 4, 5).is_none());
    }

    #[test]
    fn toughness_check_threshold() {
        assert!(!triggers_toughness_check(HitLocation::Head, 1));
        assert!(triggers_toughness_check(HitLocation::Head, 2));
        assert!(!triggers_toughness_check(HitLocation::Torso, 100));
    }
}
