//! Ammo system (§4.L). The bookkeeping lives on
//! [`crate::components::Ammo`] itself; this module is the thin
//! event-emitting edge the turn resolver calls through, matching the
//! teacher's `systems/serialization.rs` pattern of a module that's
//! mostly a documented pass-through over a richer component type.

use crate::components::Ammo;

/// Consume one round from the current slot, auto-switching first if it
/// was already empty. Returns `(spent, slot_used)`.
pub fn consume_with_autoswitch(ammo: &mut Ammo) -> (bool, usize) {
    ammo.auto_switch_if_empty();
    let slot = ammo.current_slot;
    (ammo.consume(), slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AmmoSlot;

    #[test]
    fn autoswitch_then_consume() {
        let mut ammo = Ammo {
            slots: vec![
                AmmoSlot { ammo_type: 0, quantity: 0, max_quantity: 10, armor_piercing: false, damage_bonus: 0 },
                AmmoSlot { ammo_type: 1, quantity: 3, max_quantity: 10, armor_piercing: false, damage_bonus: 0 },
            ],
            current_slot: 0,
        };
        let (spent, slot) = consume_with_autoswitch(&mut ammo);
        assert!(spent);
        assert_eq!(slot, 1);
        assert_eq!(ammo.slots[1].quantity, 2);
    }

    #[test]
    fn no_ammo_anywhere_fails_to_spend() {
        let mut ammo = Ammo {
            slots: vec![AmmoSlot { ammo_type: 0, quantity: 0, max_quantity: 10, armor_piercing: false, damage_bonus: 0 }],
            current_slot: 0,
        };
        let (spent, _) = consume_with_autoswitch(&mut ammo);
        assert!(!spent);
    }
}
