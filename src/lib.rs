//! Skirmish Kernel
//!
//! A deterministic, turn-based tactical combat simulation kernel for
//! small-squad skirmishes. Commands are queued per unit during a
//! planning phase, then resolved in priority order against a seeded
//! PRNG so identical command sequences always produce byte-identical
//! event streams.

pub mod combat;
pub mod components;
pub mod config;
pub mod ecs;
pub mod engine;
pub mod error;
pub mod events;
pub mod pathfinding;
pub mod prng;
pub mod profiler;
pub mod scenario;
pub mod systems;
pub mod templates;

pub use components::*;
pub use config::EngineConfig;
pub use ecs::{Component, ComponentKind, EntityId, Store};
pub use engine::{Engine, Snapshot, TurnReport};
pub use error::{EngineError, EngineResult};
pub use events::{Event, EventKind, EventLog};
pub use prng::Rng;
pub use scenario::{LoadedScenario, Scenario};
