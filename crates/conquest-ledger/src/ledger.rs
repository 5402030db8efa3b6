//! The war ledger: append-only event lists for every live war.
//!
//! # Design
//!
//! - **Append-only**: events are never modified once recorded.
//! - **Per war**: events are grouped by [`WarId`] in insertion order.
//! - **Evictable**: a war's whole history is dropped at once when the war
//!   leaves the live cache; the store keeps the durable copy.

use std::collections::BTreeMap;

use tracing::debug;

use conquest_types::{War, WarEvent, WarId};

use crate::audit::{ScoreAudit, audit_scores};

/// In-memory history of every live war.
#[derive(Debug, Default)]
pub struct WarLedger {
    events: BTreeMap<WarId, Vec<WarEvent>>,
}

impl WarLedger {
    /// Create a new empty ledger.
    pub const fn new() -> Self {
        Self {
            events: BTreeMap::new(),
        }
    }

    /// Total number of events across all wars.
    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    /// Whether the ledger holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.values().all(Vec::is_empty)
    }

    /// Number of wars with recorded history.
    pub fn war_count(&self) -> usize {
        self.events.len()
    }

    /// Append one event to its war's history.
    pub fn append(&mut self, event: WarEvent) {
        self.events.entry(event.war_id).or_default().push(event);
    }

    /// Append events in order.
    pub fn extend(&mut self, events: impl IntoIterator<Item = WarEvent>) {
        for event in events {
            self.append(event);
        }
    }

    /// All events of `war`, oldest first.
    pub fn events_for(&self, war: WarId) -> &[WarEvent] {
        self.events.get(&war).map_or(&[][..], Vec::as_slice)
    }

    /// Drop the history of `war`, returning what was held.
    pub fn evict(&mut self, war: WarId) -> Vec<WarEvent> {
        let evicted = self.events.remove(&war).unwrap_or_default();
        debug!(war_id = %war, events = evicted.len(), "evicted war history from ledger");
        evicted
    }

    /// Recompute `war`'s scores from its recorded events.
    pub fn audit(&self, war: &War) -> ScoreAudit {
        audit_scores(war, self.events_for(war.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use conquest_types::{WarEventType, WarSide};

    use super::*;
    use crate::WarEventBuilder;

    fn event(war: WarId, event_type: WarEventType) -> Option<WarEvent> {
        WarEventBuilder::new(war, event_type, Utc::now())
            .description("test event")
            .build()
            .ok()
    }

    #[test]
    fn new_ledger_is_empty() {
        let ledger = WarLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
        assert_eq!(ledger.war_count(), 0);
    }

    #[test]
    fn events_grouped_per_war_in_order() {
        let mut ledger = WarLedger::new();
        let war_a = WarId::new();
        let war_b = WarId::new();

        ledger.extend(event(war_a, WarEventType::WarDeclared));
        ledger.extend(event(war_b, WarEventType::WarDeclared));
        ledger.extend(event(war_a, WarEventType::WarStarted));

        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.war_count(), 2);
        let types: Vec<_> = ledger
            .events_for(war_a)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![WarEventType::WarDeclared, WarEventType::WarStarted]
        );
    }

    #[test]
    fn unknown_war_has_no_events() {
        let ledger = WarLedger::new();
        assert!(ledger.events_for(WarId::new()).is_empty());
    }

    #[test]
    fn evict_removes_only_that_war() {
        let mut ledger = WarLedger::new();
        let war_a = WarId::new();
        let war_b = WarId::new();
        ledger.extend(event(war_a, WarEventType::WarDeclared));
        ledger.extend(event(war_b, WarEventType::WarDeclared));

        let evicted = ledger.evict(war_a);
        assert_eq!(evicted.len(), 1);
        assert!(ledger.events_for(war_a).is_empty());
        assert_eq!(ledger.events_for(war_b).len(), 1);
    }

    #[test]
    fn scored_events_carry_side() {
        let mut ledger = WarLedger::new();
        let war = WarId::new();
        ledger.extend(
            WarEventBuilder::new(war, WarEventType::ScoreAdded, Utc::now())
                .side(WarSide::Attacker)
                .score_delta(25)
                .description("Raid")
                .build()
                .ok(),
        );
        assert_eq!(
            ledger.events_for(war).first().and_then(|e| e.side),
            Some(WarSide::Attacker)
        );
    }
}
