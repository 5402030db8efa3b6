//! Tick cycle: the periodic sweep over every time-bounded transition.
//!
//! Each tick runs these steps in order:
//!
//! 1. **Wars** -- start declared wars whose delay has elapsed, resume
//!    expired ceasefires.
//! 2. **Battles** -- start scheduled battles that are due, cancel battles
//!    whose war is no longer live.
//! 3. **Sieges** -- end siege battles whose siege is complete (the
//!    attacker wins), then drop sieges whose battle is gone.
//! 4. **War ends** -- conclude wars whose end condition holds.
//! 5. **Elections** -- advance every live election through its phases.
//! 6. **Empire** -- drop lapsed liberation cooldowns, collect due tribute.
//! 7. **Upkeep** -- drop expired truces, audit war scores against the
//!    ledger.
//!
//! A failure in one step is logged and recorded in the [`TickSummary`];
//! the remaining steps still run. Every step is idempotent, so a tick
//! missed or repeated after a restart does no harm.

use std::sync::Arc;

use tracing::{debug, info, warn};

use conquest_ledger::ScoreDrift;
use conquest_types::{BattleId, ElectionId, WarId};
use conquest_warfare::{
    BattleError, ElectionError, ElectionTransition, EmpireError, SiegeError, TributeOutcome,
    TributeReport, WarError,
};

use crate::services::Conquest;

/// A step of the tick that failed.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A war transition failed.
    #[error("war {war_id}: {source}")]
    War {
        /// The war being advanced.
        war_id: WarId,
        /// The underlying war error.
        source: WarError,
    },

    /// A battle transition failed.
    #[error("battle {battle_id}: {source}")]
    Battle {
        /// The battle being advanced.
        battle_id: BattleId,
        /// The underlying battle error.
        source: BattleError,
    },

    /// Truce upkeep failed.
    #[error("truce upkeep: {source}")]
    Truces {
        /// The underlying war error.
        source: WarError,
    },

    /// Siege upkeep failed.
    #[error("siege upkeep: {source}")]
    Siege {
        /// The underlying siege error.
        #[from]
        source: SiegeError,
    },

    /// Empire upkeep failed.
    #[error("empire upkeep: {source}")]
    Empire {
        /// The underlying empire error.
        #[from]
        source: EmpireError,
    },

    /// An election transition failed.
    #[error("election {election_id}: {source}")]
    Election {
        /// The election being advanced.
        election_id: ElectionId,
        /// The underlying election error.
        source: ElectionError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Wars that moved from DECLARED to ACTIVE.
    pub wars_started: Vec<WarId>,
    /// Ceasefires that ran out.
    pub ceasefires_resumed: Vec<WarId>,
    /// Scheduled battles that opened.
    pub battles_started: Vec<BattleId>,
    /// Battles cancelled because their war ended.
    pub battles_cancelled: Vec<BattleId>,
    /// Siege battles won by breaching the defenses.
    pub sieges_concluded: Vec<BattleId>,
    /// Siege records dropped with their battle.
    pub sieges_pruned: usize,
    /// Wars concluded by their end condition.
    pub wars_concluded: Vec<WarId>,
    /// Election phase changes.
    pub election_transitions: Vec<ElectionTransition>,
    /// Liberation cooldowns that lapsed.
    pub cooldowns_pruned: usize,
    /// Tribute collected this tick, one report per overlord.
    pub tributes: Vec<TributeReport>,
    /// Truces that expired.
    pub truces_pruned: usize,
    /// Wars whose recorded scores disagree with their ledger.
    pub drifts: Vec<ScoreDrift>,
    /// Steps that failed.
    pub failures: Vec<TickError>,
}

impl TickSummary {
    /// Number of tribute payments that reached their overlord.
    pub fn tributes_paid(&self) -> usize {
        self.tributes
            .iter()
            .flat_map(|r| &r.payments)
            .filter(|p| p.outcome == TributeOutcome::Paid)
            .count()
    }

    /// Whether the tick changed nothing and found nothing wrong.
    pub fn is_quiet(&self) -> bool {
        self.wars_started.is_empty()
            && self.ceasefires_resumed.is_empty()
            && self.battles_started.is_empty()
            && self.battles_cancelled.is_empty()
            && self.sieges_concluded.is_empty()
            && self.sieges_pruned == 0
            && self.wars_concluded.is_empty()
            && self.election_transitions.is_empty()
            && self.cooldowns_pruned == 0
            && self.tributes.is_empty()
            && self.truces_pruned == 0
            && self.drifts.is_empty()
            && self.failures.is_empty()
    }
}

/// Runs the tick steps against a [`Conquest`] container.
pub struct TickDriver {
    conquest: Arc<Conquest>,
}

impl TickDriver {
    /// Create a driver over `conquest`.
    pub const fn new(conquest: Arc<Conquest>) -> Self {
        Self { conquest }
    }

    /// Run one tick.
    pub async fn run_tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();
        self.advance_wars(&mut summary).await;
        self.advance_battles(&mut summary).await;
        self.advance_sieges(&mut summary).await;
        self.conclude_wars(&mut summary).await;
        self.advance_elections(&mut summary).await;
        self.advance_empire(&mut summary).await;
        self.upkeep(&mut summary).await;

        for failure in &summary.failures {
            warn!(error = %failure, "tick step failed");
        }
        if summary.is_quiet() {
            debug!("tick complete, nothing due");
        } else {
            info!(
                wars_started = summary.wars_started.len(),
                battles_started = summary.battles_started.len(),
                battles_cancelled = summary.battles_cancelled.len(),
                sieges_concluded = summary.sieges_concluded.len(),
                wars_concluded = summary.wars_concluded.len(),
                election_transitions = summary.election_transitions.len(),
                tributes_paid = summary.tributes_paid(),
                failures = summary.failures.len(),
                "tick complete"
            );
        }
        summary
    }

    async fn advance_wars(&self, summary: &mut TickSummary) {
        let wars = &self.conquest.wars;
        for war_id in wars.wars_due_to_start().await {
            match wars.start_war(war_id).await {
                Ok(_) => summary.wars_started.push(war_id),
                Err(source) => summary.failures.push(TickError::War { war_id, source }),
            }
        }
        for war_id in wars.expired_ceasefires().await {
            match wars.resume_war(war_id).await {
                Ok(_) => summary.ceasefires_resumed.push(war_id),
                Err(source) => summary.failures.push(TickError::War { war_id, source }),
            }
        }
    }

    async fn advance_battles(&self, summary: &mut TickSummary) {
        let battles = &self.conquest.battles;
        for battle_id in battles.battles_due_to_start().await {
            match battles.start_battle(battle_id).await {
                Ok(_) => summary.battles_started.push(battle_id),
                Err(source) => summary
                    .failures
                    .push(TickError::Battle { battle_id, source }),
            }
        }
        for battle_id in battles.orphaned_battles().await {
            match battles.cancel_battle(battle_id).await {
                Ok(_) => summary.battles_cancelled.push(battle_id),
                Err(source) => summary
                    .failures
                    .push(TickError::Battle { battle_id, source }),
            }
        }
    }

    async fn advance_sieges(&self, summary: &mut TickSummary) {
        let battles = &self.conquest.battles;
        for battle_id in self.conquest.sieges.completed_sieges().await {
            let Some(battle) = battles.get_battle(battle_id).await else {
                continue;
            };
            match battles.end_battle(battle_id, Some(battle.attacker_id)).await {
                Ok(_) => summary.sieges_concluded.push(battle_id),
                Err(source) => summary
                    .failures
                    .push(TickError::Battle { battle_id, source }),
            }
        }
        match self.conquest.sieges.prune().await {
            Ok(pruned) => summary.sieges_pruned = pruned,
            Err(err) => summary.failures.push(err.into()),
        }
    }

    async fn conclude_wars(&self, summary: &mut TickSummary) {
        let wars = &self.conquest.wars;
        for war_id in wars.wars_ready_to_end().await {
            match wars.conclude_war(war_id).await {
                Ok(_) => summary.wars_concluded.push(war_id),
                Err(source) => summary.failures.push(TickError::War { war_id, source }),
            }
        }
    }

    async fn advance_elections(&self, summary: &mut TickSummary) {
        let report = self.conquest.elections.advance().await;
        summary.election_transitions = report.transitions;
        summary.failures.extend(
            report
                .failures
                .into_iter()
                .map(|(election_id, source)| TickError::Election { election_id, source }),
        );
    }

    async fn advance_empire(&self, summary: &mut TickSummary) {
        let empire = &self.conquest.empire;
        match empire.prune_cooldowns().await {
            Ok(pruned) => summary.cooldowns_pruned = pruned,
            Err(err) => summary.failures.push(err.into()),
        }
        summary.tributes = empire.collect_due_tributes().await;
    }

    async fn upkeep(&self, summary: &mut TickSummary) {
        let wars = &self.conquest.wars;
        match wars.prune_truces().await {
            Ok(pruned) => summary.truces_pruned = pruned,
            Err(source) => summary.failures.push(TickError::Truces { source }),
        }
        summary.drifts = wars.audit().await;
        for drift in &summary.drifts {
            warn!(
                war_id = %drift.war_id,
                recorded_attacker = drift.recorded_attacker,
                ledger_attacker = drift.ledger_attacker,
                recorded_defender = drift.recorded_defender,
                ledger_defender = drift.ledger_defender,
                "war score drifted from ledger"
            );
        }
    }
}
