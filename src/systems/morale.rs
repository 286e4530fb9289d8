//! Morale system (§4.J). Discrete D100-test ladder — a different
//! mechanic than the teacher's continuous per-tick float decay in
//! `sim/src/systems/morale.rs`, but kept in the same module shape:
//! a small constants block, free functions, and inline tests.

use crate::components::MoraleStatus;
use crate::config::LEADERSHIP_AURA_RANGE;
use crate::prng::Rng;

pub const RALLY_LEADERSHIP_BONUS_PER_ALLY: i32 = 5;
pub const RALLY_LEADERSHIP_BONUS_CAP: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoraleTestResult {
    pub effective: i32,
    pub roll: u32,
    pub passed: bool,
    pub failure_margin: i32,
}

/// `effective = clamp(5, 95, base + sum(mods))`; pass iff `D100 <= effective`.
pub fn test(base: i32, modifiers: i32, rng: &mut Rng) -> MoraleTestResult {
    let effective = crate::combat::clamp_skill(base + modifiers);
    let roll = rng.roll_d100();
    let passed = (roll as i32) <= effective;
    MoraleTestResult { effective, roll, passed, failure_margin: roll as i32 - effective }
}

/// Failure-margin -> status ladder. Status only ever worsens via this path.
pub fn apply_failure(current: MoraleStatus, failure_margin: i32) -> MoraleStatus {
    let worsened = if failure_margin >= 41 {
        MoraleStatus::Routed
    } else if failure_margin >= 21 {
        MoraleStatus::Broken
    } else if failure_margin >= 1 {
        MoraleStatus::Shaken
    } else {
        return current; // the test passed; no failure to apply
    };
    current.max(worsened)
}

/// Rally: only possible from shaken/broken, never from routed.
pub fn can_rally(status: MoraleStatus) -> bool {
    matches!(status, MoraleStatus::Shaken | MoraleStatus::Broken)
}

/// Leadership aura bonus to a rally check: +5 per nearby steady ally
/// within `LEADERSHIP_AURA_RANGE`, capped at +20.
pub fn leadership_bonus(nearby_steady_allies: u32) -> i32 {
    (nearby_steady_allies as i32 * RALLY_LEADERSHIP_BONUS_PER_ALLY).min(RALLY_LEADERSHIP_BONUS_CAP)
}

pub fn is_within_leadership_range(distance: f32) -> bool {
    distance <= LEADERSHIP_AURA_RANGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_ladder_thresholds() {
        assert_eq!(apply_failure(MoraleStatus::Steady, 1), MoraleStatus::Shaken);
        assert_eq!(apply_failure(MoraleStatus::Steady, 20), MoraleStatus::Shaken);
        assert_eq!(apply_failure(MoraleStatus::Steady, 21), MoraleStatus::Broken);
        assert_eq!(apply_failure(MoraleStatus::Steady, 40), MoraleStatus::Broken);
        assert_eq!(apply_failure(MoraleStatus::Steady, 41), MoraleStatus::Routed);
    }

    #[test]
    fn status_never_improves_via_apply_failure() {
        // Even a "mild" failure margin must not downgrade an already
        // worse status back up.
        assert_eq!(apply_failure(MoraleStatus::Broken, 1), MoraleStatus::Broken);
        assert_eq!(apply_failure(MoraleStatus::Routed, 1), MoraleStatus::Routed);
    }

    #[test]
    fn routed_cannot_rally() {
        assert!(!can_rally(MoraleStatus::Routed));
        assert!(can_rally(MoraleStatus::Shaken));
        assert!(can_rally(MoraleStatus::Broken));
    }

    #[test]
    fn leadership_bonus_caps_at_20() {
        assert_eq!(leadership_bonus(1), 5);
        assert_eq!(leadership_bonus(4), 20);
        assert_eq!(leadership_bonus(10), 20);
    }

    #[test]
    fn test_uses_single_rng_draw() {
        let mut rng = Rng::new(5);
        let before = rng.call_count();
        test(50, 0, &mut rng);
        assert_eq!(rng.call_count(), before + 1);
    }
}
