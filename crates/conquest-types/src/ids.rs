//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity in the warfare core has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. All IDs use UUID v7
//! (time-ordered) for efficient database indexing.
//!
//! Nation and player IDs are owned by the nation directory; the core only
//! carries them. The `new()` constructors exist for cases where app-side
//! generation is needed (e.g. tests, seed data).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a nation (owned by the nation directory).
    NationId
}

define_id! {
    /// Unique identifier for a player (owned by the identity service).
    PlayerId
}

define_id! {
    /// Unique identifier for a war between two nations.
    WarId
}

define_id! {
    /// Unique identifier for a battle fought under a war.
    BattleId
}

define_id! {
    /// Unique identifier for an election held by a nation.
    ElectionId
}

define_id! {
    /// Unique identifier for a candidate registration in an election.
    CandidateId
}

define_id! {
    /// Unique identifier for an entry in the war event ledger.
    WarEventId
}
