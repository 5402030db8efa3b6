//! Empire hierarchy: vassalage, liberation, and tribute.
//!
//! A vassal pair is stored as two mirrored relation rows, `VASSAL` from the
//! vassal's side and `OVERLORD` from the overlord's. The manager keeps a
//! vassal-to-overlord index rebuilt from those rows at startup. Hierarchies
//! are one level deep: a vassal has no vassals and an overlord serves no
//! one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use conquest_store::{Changeset, Store, StoreSnapshot};
use conquest_types::{NationId, NationRelation, RelationKind};

use crate::clock::{self, Clock};
use crate::config::EmpireRules;
use crate::directory::{DirectoryError, NationDirectory};
use crate::error::EmpireError;

/// Relation kinds replaced when a pair's vassalage changes.
const PAIR_KINDS: &[RelationKind] = &[
    RelationKind::Vassal,
    RelationKind::Overlord,
    RelationKind::LiberationCooldown,
];

/// Result of a vassalization check, in the order the checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VassalEligibility {
    /// Overlord and target are the same nation.
    SelfTarget,
    /// One of the nations is unknown to the directory.
    UnknownNation,
    /// The target already serves an overlord.
    AlreadyVassal,
    /// The target holds vassals of its own.
    TargetHasVassals,
    /// The overlord is itself a vassal.
    OverlordIsVassal,
    /// The overlord holds the maximum number of vassals.
    MaxVassals,
    /// The overlord is not strong enough.
    InsufficientPower,
    /// The target was recently liberated.
    OnCooldown,
    /// Vassalization may proceed.
    Eligible,
}

/// What happened to one vassal's tribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TributeOutcome {
    /// Moved from vassal to overlord.
    Paid,
    /// The vassal could not be debited; nothing moved.
    Skipped(DirectoryError),
    /// The overlord could not be credited; the vassal was refunded.
    Refunded(DirectoryError),
    /// Neither the credit nor the refund went through.
    RefundFailed {
        /// Why the overlord could not be credited.
        credit: DirectoryError,
        /// Why the vassal could not be refunded.
        refund: DirectoryError,
    },
}

/// One vassal's line in a [`TributeReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TributePayment {
    /// The paying vassal.
    pub vassal: NationId,
    /// Tribute owed.
    pub amount: Decimal,
    /// What happened.
    pub outcome: TributeOutcome,
}

/// Outcome of one tribute collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TributeReport {
    /// The collecting overlord.
    pub overlord: NationId,
    /// Total actually paid.
    pub total: Decimal,
    /// One entry per vassal.
    pub payments: Vec<TributePayment>,
}

#[derive(Debug, Default)]
struct EmpireState {
    /// Vassal to overlord.
    overlords: HashMap<NationId, NationId>,
    /// Cooldown rows keyed by (vassal, former overlord).
    cooldowns: HashMap<(NationId, NationId), NationRelation>,
    /// Last collection per overlord; in memory only.
    last_tribute: HashMap<NationId, DateTime<Utc>>,
}

impl EmpireState {
    fn vassals_of(&self, overlord: NationId) -> Vec<NationId> {
        let mut vassals: Vec<NationId> = self
            .overlords
            .iter()
            .filter(|(_, o)| **o == overlord)
            .map(|(v, _)| *v)
            .collect();
        vassals.sort_unstable();
        vassals
    }

    fn is_overlord(&self, nation: NationId) -> bool {
        self.overlords.values().any(|o| *o == nation)
    }

    fn on_cooldown(&self, nation: NationId, now: DateTime<Utc>) -> bool {
        self.cooldowns
            .values()
            .any(|c| c.nation_id == nation && c.is_in_force(now))
    }
}

/// Owns the vassal index and runs tribute collection.
pub struct EmpireManager {
    store: Arc<dyn Store>,
    directory: Arc<dyn NationDirectory>,
    clock: Arc<dyn Clock>,
    rules: EmpireRules,
    state: RwLock<EmpireState>,
}

impl EmpireManager {
    /// Create a manager with an empty index.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn NationDirectory>,
        clock: Arc<dyn Clock>,
        rules: EmpireRules,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            rules,
            state: RwLock::new(EmpireState::default()),
        }
    }

    /// Rebuild the index from the relation rows in `snapshot`.
    ///
    /// Tribute timers restart from now.
    pub async fn restore(&self, snapshot: &StoreSnapshot) {
        let now = self.clock.now();
        let mut state = EmpireState::default();
        for relation in &snapshot.relations {
            match relation.kind {
                RelationKind::Vassal => {
                    state.overlords.insert(relation.nation_id, relation.other_id);
                    state.last_tribute.insert(relation.other_id, now);
                }
                RelationKind::LiberationCooldown => {
                    state
                        .cooldowns
                        .insert((relation.nation_id, relation.other_id), relation.clone());
                }
                RelationKind::Overlord | RelationKind::Truce => {}
            }
        }
        info!(
            vassals = state.overlords.len(),
            cooldowns = state.cooldowns.len(),
            "restored empire index"
        );
        *self.state.write().await = state;
    }

    fn eligibility(
        &self,
        state: &EmpireState,
        overlord: NationId,
        target: NationId,
    ) -> VassalEligibility {
        if overlord == target {
            return VassalEligibility::SelfTarget;
        }
        let (Some(lord), Some(subject)) =
            (self.directory.profile(overlord), self.directory.profile(target))
        else {
            return VassalEligibility::UnknownNation;
        };
        if state.overlords.contains_key(&target) {
            return VassalEligibility::AlreadyVassal;
        }
        if state.is_overlord(target) {
            return VassalEligibility::TargetHasVassals;
        }
        if state.overlords.contains_key(&overlord) {
            return VassalEligibility::OverlordIsVassal;
        }
        if state.vassals_of(overlord).len() >= self.rules.max_vassals {
            return VassalEligibility::MaxVassals;
        }
        let required = subject.power.checked_mul(self.rules.power_ratio);
        if required.is_none_or(|required| lord.power < required) {
            return VassalEligibility::InsufficientPower;
        }
        if state.on_cooldown(target, self.clock.now()) {
            return VassalEligibility::OnCooldown;
        }
        VassalEligibility::Eligible
    }

    /// Whether `overlord` may vassalize `target`, and if not, why.
    pub async fn can_vassalize(&self, overlord: NationId, target: NationId) -> VassalEligibility {
        let state = self.state.read().await;
        self.eligibility(&state, overlord, target)
    }

    /// Make `vassal` a vassal of `overlord`.
    pub async fn vassalize(&self, overlord: NationId, vassal: NationId) -> Result<(), EmpireError> {
        let mut state = self.state.write().await;
        let eligibility = self.eligibility(&state, overlord, vassal);
        if eligibility != VassalEligibility::Eligible {
            warn!(%overlord, %vassal, ?eligibility, "vassalization refused");
            return Err(EmpireError::NotEligible {
                target: vassal,
                reason: eligibility,
            });
        }

        let now = self.clock.now();
        let row = |nation_id, other_id, kind| NationRelation {
            nation_id,
            other_id,
            kind,
            established_at: now,
            expires_at: None,
        };
        let changes = Changeset::new()
            .without_relations(overlord, vassal, PAIR_KINDS)
            .with_relations([
                row(vassal, overlord, RelationKind::Vassal),
                row(overlord, vassal, RelationKind::Overlord),
            ]);
        self.store.commit(changes).await?;

        state.cooldowns.remove(&(vassal, overlord));
        state.cooldowns.remove(&(overlord, vassal));
        state.overlords.insert(vassal, overlord);
        state.last_tribute.entry(overlord).or_insert(now);
        info!(%overlord, %vassal, "nation vassalized");
        Ok(())
    }

    /// Free `vassal` from its overlord.
    ///
    /// A forceful liberation protects the vassal from vassalization by any
    /// overlord for the liberation cooldown.
    pub async fn liberate_vassal(&self, vassal: NationId, forceful: bool) -> Result<(), EmpireError> {
        let mut state = self.state.write().await;
        let overlord = *state
            .overlords
            .get(&vassal)
            .ok_or(EmpireError::NotVassal(vassal))?;

        let now = self.clock.now();
        let mut changes =
            Changeset::new().without_relations(vassal, overlord, &[RelationKind::Vassal, RelationKind::Overlord]);
        let cooldown = forceful.then(|| NationRelation {
            nation_id: vassal,
            other_id: overlord,
            kind: RelationKind::LiberationCooldown,
            established_at: now,
            expires_at: Some(clock::after(now, self.rules.liberation_cooldown())),
        });
        if let Some(row) = &cooldown {
            changes = changes.with_relations([row.clone()]);
        }
        self.store.commit(changes).await?;

        state.overlords.remove(&vassal);
        if !state.is_overlord(overlord) {
            state.last_tribute.remove(&overlord);
        }
        if let Some(row) = cooldown {
            state.cooldowns.insert((vassal, overlord), row);
        }
        info!(%overlord, %vassal, forceful, "vassal liberated");
        Ok(())
    }

    /// Collect tribute from every vassal of `overlord`.
    ///
    /// Each vassal is settled on its own: a failed credit is refunded to
    /// the vassal before the next one is processed.
    pub async fn collect_tributes(&self, overlord: NationId) -> TributeReport {
        let mut state = self.state.write().await;
        let report = self.collect(&state, overlord);
        state.last_tribute.insert(overlord, self.clock.now());
        report
    }

    fn collect(&self, state: &EmpireState, overlord: NationId) -> TributeReport {
        let mut total = Decimal::ZERO;
        let mut payments = Vec::new();
        for vassal in state.vassals_of(overlord) {
            let amount = self
                .directory
                .profile(vassal)
                .and_then(|p| p.balance.checked_mul(self.rules.tribute_rate))
                .map_or(Decimal::ZERO, |a| a.round_dp(2));
            let outcome = self.pay(vassal, overlord, amount);
            if outcome == TributeOutcome::Paid {
                total = total.saturating_add(amount);
            }
            payments.push(TributePayment {
                vassal,
                amount,
                outcome,
            });
        }
        info!(%overlord, %total, vassals = payments.len(), "tribute collected");
        TributeReport {
            overlord,
            total,
            payments,
        }
    }

    fn pay(&self, vassal: NationId, overlord: NationId, amount: Decimal) -> TributeOutcome {
        if let Err(err) = self.directory.debit(vassal, amount) {
            debug!(%vassal, %amount, %err, "tribute skipped");
            return TributeOutcome::Skipped(err);
        }
        let Err(credit) = self.directory.credit(overlord, amount) else {
            return TributeOutcome::Paid;
        };
        match self.directory.credit(vassal, amount) {
            Ok(()) => {
                warn!(%vassal, %overlord, %amount, err = %credit, "tribute refunded");
                TributeOutcome::Refunded(credit)
            }
            Err(refund) => {
                error!(
                    %vassal,
                    %overlord,
                    %amount,
                    credit_err = %credit,
                    refund_err = %refund,
                    "tribute refund failed"
                );
                TributeOutcome::RefundFailed { credit, refund }
            }
        }
    }

    // -- Queries ------------------------------------------------------------

    /// Whether `nation` serves an overlord.
    pub async fn is_vassal(&self, nation: NationId) -> bool {
        self.state.read().await.overlords.contains_key(&nation)
    }

    /// Whether `nation` holds any vassals.
    pub async fn is_overlord(&self, nation: NationId) -> bool {
        self.state.read().await.is_overlord(nation)
    }

    /// The vassals of `overlord`.
    pub async fn vassals_of(&self, overlord: NationId) -> Vec<NationId> {
        self.state.read().await.vassals_of(overlord)
    }

    /// The overlord `vassal` serves.
    pub async fn overlord_of(&self, vassal: NationId) -> Option<NationId> {
        self.state.read().await.overlords.get(&vassal).copied()
    }

    /// A nation's own power plus half the power of each vassal.
    pub async fn empire_power(&self, nation: NationId) -> Option<Decimal> {
        let own = self.directory.profile(nation)?.power;
        let half = Decimal::new(5, 1);
        let vassals = self.vassals_of(nation).await;
        vassals
            .into_iter()
            .filter_map(|v| self.directory.profile(v))
            .try_fold(own, |acc, p| acc.checked_add(p.power.checked_mul(half)?))
    }

    /// Whether two nations share the same top-level overlord.
    pub async fn are_in_same_empire(&self, a: NationId, b: NationId) -> bool {
        let state = self.state.read().await;
        let root = |n: NationId| state.overlords.get(&n).copied().unwrap_or(n);
        root(a) == root(b)
    }

    // -- Tick helpers -------------------------------------------------------

    /// Collect tribute for every overlord whose interval has elapsed.
    pub async fn collect_due_tributes(&self) -> Vec<TributeReport> {
        let now = self.clock.now();
        let interval = self.rules.tribute_interval();
        let mut state = self.state.write().await;
        let mut due: Vec<NationId> = state
            .last_tribute
            .iter()
            .filter(|(_, last)| clock::after(**last, interval) <= now)
            .map(|(overlord, _)| *overlord)
            .collect();
        due.sort_unstable();
        let mut reports = Vec::with_capacity(due.len());
        for overlord in due {
            reports.push(self.collect(&state, overlord));
            state.last_tribute.insert(overlord, now);
        }
        reports
    }

    /// Delete cooldown rows that have lapsed.
    pub async fn prune_cooldowns(&self) -> Result<usize, EmpireError> {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let expired: Vec<(NationId, NationId)> = state
            .cooldowns
            .iter()
            .filter(|(_, c)| !c.is_in_force(now))
            .map(|(key, _)| *key)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        let changes = expired.iter().fold(Changeset::new(), |changes, (a, b)| {
            changes.without_relations(*a, *b, &[RelationKind::LiberationCooldown])
        });
        self.store.commit(changes).await?;
        for key in &expired {
            state.cooldowns.remove(key);
        }
        debug!(pruned = expired.len(), "pruned liberation cooldowns");
        Ok(expired.len())
    }
}
