//! Event builder and validation for the war ledger.
//!
//! Provides a [`WarEventBuilder`] that enforces the attribution rule: every
//! event that moves score names the side the score belongs to. Builders
//! validate inputs before producing a [`WarEvent`].

use chrono::{DateTime, Utc};

use conquest_types::{NationId, WarEvent, WarEventId, WarEventType, WarId, WarSide};

use crate::LedgerError;

/// Builder for constructing validated [`WarEvent`] values.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use conquest_ledger::WarEventBuilder;
/// use conquest_types::{NationId, WarEventType, WarId};
///
/// let event = WarEventBuilder::new(WarId::new(), WarEventType::AllyJoined, Utc::now())
///     .nation(NationId::new())
///     .description("Northmark joined the defenders")
///     .build();
///
/// assert!(event.is_ok());
/// ```
#[derive(Debug)]
pub struct WarEventBuilder {
    war_id: WarId,
    event_type: WarEventType,
    occurred_at: DateTime<Utc>,
    nation_id: Option<NationId>,
    side: Option<WarSide>,
    score_delta: i64,
    description: Option<String>,
}

impl WarEventBuilder {
    /// Start building an event of `event_type` for `war_id`.
    pub const fn new(war_id: WarId, event_type: WarEventType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            war_id,
            event_type,
            occurred_at,
            nation_id: None,
            side: None,
            score_delta: 0,
            description: None,
        }
    }

    /// Set the nation the event concerns.
    #[must_use]
    pub const fn nation(mut self, nation: NationId) -> Self {
        self.nation_id = Some(nation);
        self
    }

    /// Set the side the event concerns.
    #[must_use]
    pub const fn side(mut self, side: WarSide) -> Self {
        self.side = Some(side);
        self
    }

    /// Set the score credited to the event's side.
    #[must_use]
    pub const fn score_delta(mut self, delta: i64) -> Self {
        self.score_delta = delta;
        self
    }

    /// Set the human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate inputs and produce a [`WarEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::BlankDescription`] if no non-blank description
    /// was set, and [`LedgerError::ScoreWithoutSide`] if a non-zero score
    /// delta has no side.
    pub fn build(self) -> Result<WarEvent, LedgerError> {
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .ok_or(LedgerError::BlankDescription)?;

        if self.score_delta != 0 && self.side.is_none() {
            return Err(LedgerError::ScoreWithoutSide {
                event_type: self.event_type,
                delta: self.score_delta,
            });
        }

        Ok(WarEvent {
            id: WarEventId::new(),
            war_id: self.war_id,
            event_type: self.event_type,
            nation_id: self.nation_id,
            side: self.side,
            description,
            score_delta: self.score_delta,
            occurred_at: self.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_event_with_all_fields() {
        let war = WarId::new();
        let nation = NationId::new();
        let now = Utc::now();
        let result = WarEventBuilder::new(war, WarEventType::BattleWon, now)
            .nation(nation)
            .side(WarSide::Defender)
            .score_delta(80)
            .description("Held the pass")
            .build();

        assert!(result.is_ok());
        let event = result.ok();
        assert_eq!(event.as_ref().map(|e| e.war_id), Some(war));
        assert_eq!(event.as_ref().and_then(|e| e.nation_id), Some(nation));
        assert_eq!(event.as_ref().and_then(|e| e.side), Some(WarSide::Defender));
        assert_eq!(event.as_ref().map(|e| e.score_delta), Some(80));
        assert_eq!(event.as_ref().map(|e| e.occurred_at), Some(now));
    }

    #[test]
    fn blank_description_rejected() {
        let result = WarEventBuilder::new(WarId::new(), WarEventType::WarStarted, Utc::now())
            .description("   ")
            .build();
        assert_eq!(result.err(), Some(LedgerError::BlankDescription));
    }

    #[test]
    fn missing_description_rejected() {
        let result =
            WarEventBuilder::new(WarId::new(), WarEventType::WarStarted, Utc::now()).build();
        assert_eq!(result.err(), Some(LedgerError::BlankDescription));
    }

    #[test]
    fn score_without_side_rejected() {
        let result = WarEventBuilder::new(WarId::new(), WarEventType::ScoreAdded, Utc::now())
            .score_delta(10)
            .description("Unattributed")
            .build();
        assert!(matches!(
            result.err(),
            Some(LedgerError::ScoreWithoutSide { delta: 10, .. })
        ));
    }

    #[test]
    fn events_serialize_with_storage_codes() {
        let result = WarEventBuilder::new(WarId::new(), WarEventType::TruceEstablished, Utc::now())
            .description("Truce for 7 days")
            .build();
        let json = result
            .ok()
            .and_then(|event| serde_json::to_string(&event).ok())
            .unwrap_or_default();
        assert!(json.contains("\"TRUCE_ESTABLISHED\""));
    }
}
