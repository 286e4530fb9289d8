//! Engine-wide tunables.
//!
//! Mirrors the teacher's `SimConfig` (`systems/performance.rs`): a
//! plain struct with a `Default` impl, holding the handful of numeric
//! constants a host might plausibly want to vary per scenario. Values
//! the spec calls out as "must be reproduced bit-exact" and that have
//! no sane reason to vary stay as free-standing `const`s instead (see
//! below).

use serde::{Deserialize, Serialize};

pub const UNIT_RADIUS: f32 = 0.5;
pub const MIN_UNIT_SEPARATION: f32 = 1.0;
pub const MELEE_ATTACK_RANGE: f32 = 1.2;
pub const ENGAGEMENT_RANGE: f32 = 1.5;
pub const SHIELD_WALL_RANGE: f32 = 2.5;
pub const PATHFINDER_CELL_SIZE: f32 = 0.5;
pub const PATHFINDER_CLEARANCE: f32 = 0.15;
pub const LEADERSHIP_AURA_RANGE: f32 = 6.0;
pub const FLANKING_BONUS_CAP: i32 = 30;
pub const STAMINA_RECOVER_UNHIT: i32 = 3;
pub const STAMINA_RECOVER_HIT: i32 = 1;
pub const EXHAUSTION_AP_PENALTY: i32 = 1;

/// Host-tunable engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Initial PRNG seed for a fresh engine (not used by `load_snapshot`).
    pub seed: u32,
    /// Map half-extents derive from the loaded scenario's `mapSize`,
    /// but the engine keeps a fallback for engines built without one.
    pub default_map_width: f32,
    pub default_map_height: f32,
    /// Reaction budget granted to every defender each turn, before
    /// `DefensiveStance.extra_reactions` is added.
    pub base_reactions_per_turn: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            default_map_width: 40.0,
            default_map_height: 40.0,
            base_reactions_per_turn: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.default_map_width > 0.0);
        assert_eq!(cfg.base_reactions_per_turn, 1);
    }
}
