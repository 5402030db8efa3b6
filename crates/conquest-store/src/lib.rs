//! Persistent store boundary for the Conquest warfare core.
//!
//! Managers never talk to a database directly. They build a [`Changeset`]
//! per transition and hand it to a [`Store`], which applies it atomically:
//! either every row lands or none does. Live caches are rebuilt at startup
//! from a [`StoreSnapshot`].
//!
//! # Architecture
//!
//! ```text
//! Manager transition
//!     |
//!     +-- Changeset --> Store::commit
//!                          |-- MemoryStore  (tests, demo host)
//!                          +-- PgStore      (PostgreSQL via sqlx)
//! ```
//!
//! # Modules
//!
//! - [`changeset`] -- Unit-of-work and snapshot types
//! - [`memory`] -- In-memory transactional store with uniqueness checks
//! - [`postgres`] -- `PostgreSQL` connection pool and the [`PgStore`] backend
//! - [`rows`] -- One row struct per entity, with entity conversions
//! - [`error`] -- Shared error types

pub mod changeset;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod rows;

use futures::future::BoxFuture;

use conquest_types::{ElectionId, ElectionVote, War, WarEvent, WarId};

// Re-export primary types for convenience.
pub use changeset::{Changeset, RelationRemoval, StoreSnapshot};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::{PgStore, PostgresConfig, PostgresPool};

/// Constraint names shared by both backends.
pub mod constraints {
    /// At most one non-terminal war per unordered nation pair.
    pub const WARS_OPEN_PAIR: &str = "wars_open_pair";
    /// At most one live election per nation.
    pub const ELECTIONS_LIVE_NATION: &str = "elections_live_nation";
    /// A player registers at most once per election.
    pub const CANDIDATES_ELECTION_PLAYER: &str = "election_candidates_election_player";
    /// One vote per voter per election.
    pub const VOTES_ELECTION_VOTER: &str = "election_votes_pkey";
    /// War events are insert-only.
    pub const WAR_EVENTS_ID: &str = "war_events_pkey";
}

/// Durable storage for wars, battles, relations, and elections.
///
/// Returns boxed futures so the trait stays dyn-compatible and can be
/// injected as `Arc<dyn Store>`.
pub trait Store: Send + Sync {
    /// Apply every row in `changes` atomically.
    ///
    /// A uniqueness violation yields [`StoreError::Conflict`] and writes
    /// nothing.
    fn commit(&self, changes: Changeset) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Load everything needed to rebuild the live caches.
    fn load_snapshot(&self) -> BoxFuture<'_, Result<StoreSnapshot, StoreError>>;

    /// Look up a war in any status.
    fn find_war(&self, id: WarId) -> BoxFuture<'_, Result<Option<War>, StoreError>>;

    /// All events of a war, oldest first.
    fn war_events(&self, id: WarId) -> BoxFuture<'_, Result<Vec<WarEvent>, StoreError>>;

    /// All votes cast in an election.
    fn election_votes(
        &self,
        id: ElectionId,
    ) -> BoxFuture<'_, Result<Vec<ElectionVote>, StoreError>>;
}
