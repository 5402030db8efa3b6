//! War, battle, siege, empire, and election managers for the Conquest
//! warfare core.
//!
//! This crate holds every state machine of the core. Each manager owns a
//! live cache behind a `tokio::sync::RwLock`, commits one
//! [`Changeset`](conquest_store::Changeset) per transition, and only then
//! updates its cache. Nation data is reached through the
//! [`NationDirectory`] trait and time through the [`Clock`] trait, so both
//! can be swapped in tests.
//!
//! # Modules
//!
//! - [`war`] -- War lifecycle, scoring, peace, and truces ([`WarManager`])
//! - [`battle`] -- Battles, rosters, kills, and settlement ([`BattleManager`])
//! - [`siege`] -- Wall and gate health for SIEGE battles ([`SiegeManager`])
//! - [`empire`] -- Vassalage, liberation, and tribute ([`EmpireManager`])
//! - [`election`] -- Election phases, candidacy, and voting ([`ElectionManager`])
//! - [`zone`] -- Movement, death, and disconnect events ([`ZoneMonitor`])
//! - [`schedule`] -- Cancellable delayed tasks ([`TaskScheduler`])
//! - [`directory`] -- The nation directory boundary
//! - [`clock`] -- Wall-clock and manual clocks
//! - [`config`] -- Rule sections ([`WarfareConfig`])
//! - [`error`] -- Error types for every manager
//!
//! # Dependencies between managers
//!
//! ```text
//! ZoneMonitor --> BattleManager --> WarManager
//!                      ^
//! SiegeManager --------+
//! EmpireManager, ElectionManager: independent
//! ```

pub mod battle;
pub mod clock;
pub mod config;
pub mod directory;
pub mod election;
pub mod empire;
pub mod error;
pub mod schedule;
pub mod siege;
pub mod war;
pub mod zone;

// Re-export primary types at crate root for convenience.
pub use battle::{BattleManager, BattleOutcome, BattlePlan, SideCounts, battle_award};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BattleRules, ElectionRules, EmpireRules, SiegeRules, WarRules, WarfareConfig};
pub use directory::{
    DirectoryError, Membership, NationDirectory, NationProfile, StaticDirectory,
};
pub use election::{ElectionAdvance, ElectionManager, ElectionTransition, leading_candidate};
pub use empire::{
    EmpireManager, TributeOutcome, TributePayment, TributeReport, VassalEligibility,
};
pub use error::{
    BattleError, CandidacyError, ElectionError, EmpireError, SiegeError, VoteError, WarError,
};
pub use schedule::{TaskPurpose, TaskScheduler};
pub use siege::{Fortification, SiegeManager, defense_bonus};
pub use war::{WarManager, apply_multiplier, decide_winner, end_condition_met};
pub use zone::{ZoneCheck, ZoneMonitor};
