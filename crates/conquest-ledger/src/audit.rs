//! Score audit for the war ledger.
//!
//! A war's recorded scores must equal the sum of the score deltas its events
//! credited to each side. Score only moves through events written in the
//! same store transaction as the war row, so the audit passes by
//! construction; it exists to catch corrupted rows or a partial restore.

use tracing::warn;

use conquest_types::{War, WarEvent, WarId, WarSide};

/// A mismatch between a war's scores and its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDrift {
    /// The war that drifted.
    pub war_id: WarId,
    /// Attacker score on the war row.
    pub recorded_attacker: i64,
    /// Attacker score summed from events.
    pub ledger_attacker: i64,
    /// Defender score on the war row.
    pub recorded_defender: i64,
    /// Defender score summed from events.
    pub ledger_defender: i64,
}

impl core::fmt::Display for ScoreDrift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "war {} score drift: attacker {} (ledger {}), defender {} (ledger {})",
            self.war_id,
            self.recorded_attacker,
            self.ledger_attacker,
            self.recorded_defender,
            self.ledger_defender
        )
    }
}

/// The result of auditing one war.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoreAudit {
    /// Scores match the ledger.
    Consistent,
    /// Scores disagree with the ledger.
    Drift(ScoreDrift),
}

impl ScoreAudit {
    /// Whether the audit found no drift.
    pub const fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Audit `war` against `events`.
///
/// Events belonging to other wars are ignored. A sum that overflows `i64`
/// is reported as drift since no legitimate history can reach it.
pub fn audit_scores(war: &War, events: &[WarEvent]) -> ScoreAudit {
    let mut attacker: Option<i64> = Some(0);
    let mut defender: Option<i64> = Some(0);

    for event in events.iter().filter(|e| e.war_id == war.id) {
        match event.side {
            Some(WarSide::Attacker) => {
                attacker = attacker.and_then(|s| s.checked_add(event.score_delta));
            }
            Some(WarSide::Defender) => {
                defender = defender.and_then(|s| s.checked_add(event.score_delta));
            }
            None => {}
        }
    }

    let ledger_attacker = attacker.unwrap_or(i64::MAX);
    let ledger_defender = defender.unwrap_or(i64::MAX);

    if attacker == Some(war.attacker_score) && defender == Some(war.defender_score) {
        return ScoreAudit::Consistent;
    }

    let drift = ScoreDrift {
        war_id: war.id,
        recorded_attacker: war.attacker_score,
        ledger_attacker,
        recorded_defender: war.defender_score,
        ledger_defender,
    };
    warn!(war_id = %war.id, %drift, "war score audit failed");
    ScoreAudit::Drift(drift)
}
