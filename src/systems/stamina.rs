//! Stamina system (§4.I). Most of the arithmetic lives on
//! [`crate::components::Stamina`] itself (drain/recover/defense
//! penalty), matching the teacher's convention of putting simple
//! derivations as inherent methods on the component
//! (`sim/src/components.rs::Health::fraction`). This module holds the
//! cross-component glue: armor-impact drain and the exhaustion → AP
//! coupling.

use crate::components::{ActionPoints, Stamina};

/// Stamina drained per point of armor-absorbed damage: `ceil(absorbed/2)`.
pub fn armor_impact_drain(absorbed: i32) -> i32 {
    if absorbed <= 0 {
        0
    } else {
        (absorbed + 1) / 2
    }
}

/// Apply stamina drain and keep `ActionPoints.max` in sync with the
/// exhaustion penalty (§4.I: "exhaustion additionally reduces
/// ActionPoints.max by 1").
pub fn drain_and_sync_ap(stamina: &mut Stamina, ap: &mut ActionPoints, amount: i32) {
    stamina.drain(amount);
    ap.recompute_max(stamina.exhausted);
}

pub fn recover_and_sync_ap(stamina: &mut Stamina, ap: &mut ActionPoints, was_hit: bool) {
    stamina.recover(was_hit);
    ap.recompute_max(stamina.exhausted);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armor_impact_drain_rounds_up() {
        assert_eq!(armor_impact_drain(0), 0);
        assert_eq!(armor_impact_drain(1), 1);
        assert_eq!(armor_impact_drain(2), 1);
        assert_eq!(armor_impact_drain(3), 2);
    }

    #[test]
    fn exhaustion_reduces_ap_max() {
        let mut stamina = Stamina::new(5);
        let mut ap = ActionPoints::new(6, 0, 0);
        assert_eq!(ap.max, 6);
        drain_and_sync_ap(&mut stamina, &mut ap, 5);
        assert!(stamina.exhausted);
        assert_eq!(ap.max, 5);
    }
}
