//! Systems acting on the entity-component store.
//!
//! Unlike the teacher's per-tick `bevy_ecs::Schedule` (`sim/src/api.rs`),
//! resolution here is turn-based and driven explicitly by
//! [`crate::engine::Engine::resolve_turn`] rather than a scheduler
//! running every frame — so these modules export plain functions
//! invoked in a fixed order instead of `fn system(Query<...>)` handlers
//! registered with a schedule. The module layout itself still follows
//! the teacher's one-file-per-concern shape.
//!
//! | Module | Concern |
//! |---|---|
//! | `movement` | mode→speed, pathing, collision stepping, engagement refresh |
//! | `stamina` | drain/recover, defense penalty tiers |
//! | `morale` | morale tests, failure ladder, rally, leadership aura |
//! | `wounds` | critical table, bleed tick |
//! | `ammo` | slot consumption/switching (thin wrapper over `components::Ammo`) |
//! | `turn` | the resolution kernel: queues, priority sort, dispatch, reactions |
//! | `victory` | condition evaluation |
//! | `ai` | battlefield analysis, per-personality planners |

pub mod ai;
pub mod ammo;
pub mod morale;
pub mod movement;
pub mod stamina;
pub mod turn;
pub mod victory;
pub mod wounds;
