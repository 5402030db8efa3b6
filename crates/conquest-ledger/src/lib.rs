//! Append-only war history for the Conquest warfare core.
//!
//! Every state change of a war produces one or more [`WarEvent`] records.
//! Events are never modified or deleted once recorded; the live ledger only
//! evicts a war's history when the war leaves the live cache, after which
//! the store is the source of truth.
//!
//! # Architecture
//!
//! - [`ledger`] -- The [`WarLedger`]: per-war append-only event lists.
//! - [`event`] -- The [`WarEventBuilder`] for validated event construction.
//! - [`audit`] -- Score audit: recomputes a war's scores from its events.
//!
//! # Score Audit
//!
//! For every live war W and side S:
//!
//! ```text
//! W.attacker_score == sum(score_delta of W's events with side ATTACKER)
//! W.defender_score == sum(score_delta of W's events with side DEFENDER)
//! ```
//!
//! A mismatch produces [`ScoreAudit::Drift`]. The ledger never panics; it
//! returns errors.
//!
//! # Usage
//!
//! ```
//! use chrono::Utc;
//! use conquest_ledger::{WarEventBuilder, WarLedger};
//! use conquest_types::{WarEventType, WarId, WarSide};
//!
//! let war = WarId::new();
//! let mut ledger = WarLedger::new();
//!
//! let event = WarEventBuilder::new(war, WarEventType::ScoreAdded, Utc::now())
//!     .side(WarSide::Attacker)
//!     .score_delta(30)
//!     .description("Captured the bridge")
//!     .build();
//!
//! assert!(event.is_ok());
//! if let Ok(event) = event {
//!     ledger.append(event);
//! }
//! assert_eq!(ledger.events_for(war).len(), 1);
//! ```

pub mod audit;
pub mod event;
pub mod ledger;

// Re-export primary types at crate root.
pub use audit::{ScoreAudit, ScoreDrift, audit_scores};
pub use event::WarEventBuilder;
pub use ledger::WarLedger;

use conquest_types::WarEventType;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when building war events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The event has no description.
    #[error("war event description must not be blank")]
    BlankDescription,

    /// A score delta was supplied without saying which side it applies to.
    #[error("{event_type} event carries a score delta of {delta} but no side")]
    ScoreWithoutSide {
        /// The event type being built.
        event_type: WarEventType,
        /// The unattributed delta.
        delta: i64,
    },
}
