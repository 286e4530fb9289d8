//! Typed errors for the invalid-command error class (see §7 of
//! SPEC_FULL.md). The no-op and invariant-violation classes never
//! surface as `Result::Err`: they degrade to an emitted `Event` (and,
//! for invariant violations, a `tracing::warn!`) and let resolution
//! continue.

use crate::ecs::{ComponentKind, EntityId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("entity {0:?} does not exist")]
    UnknownEntity(EntityId),

    #[error("entity {0:?} has no component of kind {1:?}")]
    MissingComponent(EntityId, ComponentKind),

    #[error("command rejected: would need {needed} AP but only {available} available")]
    InsufficientActionPoints { needed: i32, available: i32 },

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("ammo slot index {0} out of range")]
    InvalidAmmoSlot(usize),

    #[error("scenario references unknown unit type {0:?}")]
    UnknownUnitType(String),

    #[error("snapshot could not be deserialized: {0}")]
    SnapshotDecode(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
