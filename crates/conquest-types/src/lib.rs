//! Shared type definitions for the Conquest warfare core.
//!
//! This crate is the single source of truth for the identifiers, enums, and
//! entity structs used across the Conquest workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Status, goal, side, and role enumerations with storage codes
//! - [`structs`] -- Core entity structs (wars, battles, sieges, relations, elections)

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    BattleStatus, BattleType, ElectionPosition, ElectionStatus, GovernmentType, NationRole,
    RelationKind, SiegeEquipment, UnknownCode, WarEventType, WarGoal, WarSide, WarStatus,
};
pub use ids::{BattleId, CandidateId, ElectionId, NationId, PlayerId, WarEventId, WarId};
pub use structs::{
    Battle, BattleParticipant, BattleZone, Election, ElectionCandidate, ElectionVote,
    NationRelation, Position, Siege, War, WarEvent, WarParticipant,
};
