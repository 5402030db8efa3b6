//! War lifecycle manager.
//!
//! Owns every non-terminal [`War`], its participants, the truces between
//! nation pairs, and the live [`WarLedger`]. Each transition takes the write
//! lock, validates against the cached war, commits one [`Changeset`], and
//! only then updates the cache. Terminal wars are evicted on commit; queries
//! for them fall back to the store.
//!
//! # State machine
//!
//! ```text
//! DECLARED --start--> ACTIVE --propose--> NEGOTIATING --accept--> ENDED
//!                       ^  |                   |
//!                       |  +--reject----<------+
//!                       |  +--ceasefire--> CEASEFIRE --resume--+
//!                       +--------------------------------------+
//! ACTIVE --surrender--> SURRENDERED
//! ACTIVE | NEGOTIATING | CEASEFIRE --conclude--> ENDED
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use conquest_ledger::{ScoreAudit, ScoreDrift, WarEventBuilder, WarLedger};
use conquest_store::{Changeset, Store, StoreSnapshot};
use conquest_types::{
    Battle, BattleParticipant, NationId, NationRelation, RelationKind, War, WarEvent,
    WarEventType, WarGoal, WarId, WarParticipant, WarSide, WarStatus,
};

use crate::clock::{self, Clock};
use crate::config::WarRules;
use crate::directory::NationDirectory;
use crate::error::WarError;

/// An unordered nation pair, smaller ID first.
type NationPair = (NationId, NationId);

fn pair(a: NationId, b: NationId) -> NationPair {
    if a <= b { (a, b) } else { (b, a) }
}

// ---------------------------------------------------------------------------
// Pure evaluation
// ---------------------------------------------------------------------------

/// Whether a war may end: the score lead reached the threshold or either
/// side is at the weariness cap.
pub fn end_condition_met(war: &War, rules: &WarRules) -> bool {
    war.score_lead().saturating_abs() >= rules.end_score_threshold
        || war.attacker_weariness >= rules.weariness_cap
        || war.defender_weariness >= rules.weariness_cap
}

/// The side that wins if the war ends now, or `None` for a white peace.
///
/// A decisive lead wins outright. Otherwise a side at the weariness cap
/// loses; if both are spent the score leader wins and a level score keeps
/// the status quo (defender). Without any end condition the score leader
/// wins, then the less weary side.
pub fn decide_winner(war: &War, rules: &WarRules) -> Option<WarSide> {
    let lead = war.score_lead();
    let leader = match lead.signum() {
        1 => Some(WarSide::Attacker),
        -1 => Some(WarSide::Defender),
        _ => None,
    };
    if leader.is_some() && lead.saturating_abs() >= rules.end_score_threshold {
        return leader;
    }

    let attacker_spent = war.attacker_weariness >= rules.weariness_cap;
    let defender_spent = war.defender_weariness >= rules.weariness_cap;
    match (attacker_spent, defender_spent) {
        (true, true) => Some(leader.unwrap_or(WarSide::Defender)),
        (true, false) => Some(WarSide::Defender),
        (false, true) => Some(WarSide::Attacker),
        (false, false) => leader.or_else(|| {
            match war.attacker_weariness.cmp(&war.defender_weariness) {
                core::cmp::Ordering::Less => Some(WarSide::Attacker),
                core::cmp::Ordering::Greater => Some(WarSide::Defender),
                core::cmp::Ordering::Equal => None,
            }
        }),
    }
}

/// `points` scaled by the goal's multiplier, rounded toward zero.
pub fn apply_multiplier(points: i64, goal: WarGoal) -> i64 {
    points
        .saturating_mul(goal.score_multiplier_pct())
        .checked_div(100)
        .unwrap_or_default()
}

fn add_weariness(current: u8, amount: u8, cap: u8) -> u8 {
    current.saturating_add(amount).min(cap)
}

// ---------------------------------------------------------------------------
// Battle settlement
// ---------------------------------------------------------------------------

/// A finished battle handed to the war for scoring.
#[derive(Debug, Clone)]
pub(crate) struct BattleSettlement {
    /// The battle, already marked completed.
    pub battle: Battle,
    /// The final roster.
    pub roster: Vec<BattleParticipant>,
    /// Raw points per battle side, before the goal multiplier.
    pub credits: Vec<(WarSide, i64)>,
    /// The losing battle side, if the battle was decided.
    pub loser: Option<WarSide>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// One war transition: the rows to commit and then cache.
#[derive(Debug)]
struct WarUpdate {
    war: War,
    participants: Vec<WarParticipant>,
    events: Vec<WarEvent>,
    truces: Vec<NationRelation>,
}

impl WarUpdate {
    const fn new(war: War) -> Self {
        Self {
            war,
            participants: Vec::new(),
            events: Vec::new(),
            truces: Vec::new(),
        }
    }

    fn changeset(&self, base: Changeset) -> Changeset {
        base.with_war(self.war.clone())
            .with_war_participants(self.participants.iter().cloned())
            .with_war_events(self.events.iter().cloned())
            .with_relations(self.truces.iter().cloned())
    }
}

#[derive(Debug, Default)]
struct WarState {
    wars: HashMap<WarId, War>,
    participants: HashMap<WarId, Vec<WarParticipant>>,
    truces: HashMap<NationPair, NationRelation>,
    ledger: WarLedger,
}

impl WarState {
    fn open_war_between(&self, a: NationId, b: NationId) -> Option<&War> {
        self.wars.values().find(|w| w.is_between(a, b))
    }

    fn truce_until(&self, a: NationId, b: NationId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.truces
            .get(&pair(a, b))
            .filter(|t| t.is_in_force(now))
            .map(|t| t.expires_at.unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    fn side_of(&self, war: WarId, nation: NationId) -> Option<WarSide> {
        self.participants
            .get(&war)?
            .iter()
            .find(|p| p.nation_id == nation)
            .map(|p| p.side)
    }

    fn apply(&mut self, update: WarUpdate) -> War {
        let WarUpdate {
            war,
            participants,
            events,
            truces,
        } = update;

        for truce in truces {
            self.truces
                .insert(pair(truce.nation_id, truce.other_id), truce);
        }

        if war.status.is_terminal() {
            self.wars.remove(&war.id);
            self.participants.remove(&war.id);
            let evicted = self.ledger.evict(war.id);
            debug!(war_id = %war.id, events = evicted.len(), "evicted terminal war");
            return war;
        }

        let roster = self.participants.entry(war.id).or_default();
        for participant in participants {
            match roster
                .iter_mut()
                .find(|p| p.nation_id == participant.nation_id)
            {
                Some(existing) => *existing = participant,
                None => roster.push(participant),
            }
        }
        self.ledger.extend(events);
        self.wars.insert(war.id, war.clone());
        war
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Owns the lifecycle of every live war.
pub struct WarManager {
    store: Arc<dyn Store>,
    directory: Arc<dyn NationDirectory>,
    clock: Arc<dyn Clock>,
    rules: WarRules,
    state: RwLock<WarState>,
}

impl WarManager {
    /// Create a manager with an empty cache.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn NationDirectory>,
        clock: Arc<dyn Clock>,
        rules: WarRules,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            rules,
            state: RwLock::new(WarState::default()),
        }
    }

    /// The rules this manager enforces.
    pub const fn rules(&self) -> &WarRules {
        &self.rules
    }

    /// Replace the cache with the open wars, participants, events, and
    /// truces in `snapshot`.
    pub async fn restore(&self, snapshot: &StoreSnapshot) {
        let now = self.clock.now();
        let mut state = WarState::default();
        for war in snapshot.wars.iter().filter(|w| w.status.is_open()) {
            state.wars.insert(war.id, war.clone());
        }
        for participant in &snapshot.war_participants {
            if state.wars.contains_key(&participant.war_id) {
                state
                    .participants
                    .entry(participant.war_id)
                    .or_default()
                    .push(participant.clone());
            }
        }
        state.ledger.extend(
            snapshot
                .war_events
                .iter()
                .filter(|e| state.wars.contains_key(&e.war_id))
                .cloned(),
        );
        for truce in snapshot
            .relations
            .iter()
            .filter(|r| r.kind == RelationKind::Truce && r.is_in_force(now))
        {
            state
                .truces
                .insert(pair(truce.nation_id, truce.other_id), truce.clone());
        }

        info!(
            wars = state.wars.len(),
            truces = state.truces.len(),
            events = state.ledger.len(),
            "restored war cache"
        );
        *self.state.write().await = state;
    }

    fn label(&self, nation: NationId) -> String {
        self.directory
            .profile(nation)
            .map_or_else(|| nation.to_string(), |p| p.name)
    }

    /// The cached war, or the reason it cannot be changed.
    async fn live_war(
        &self,
        state: &WarState,
        id: WarId,
        action: &'static str,
    ) -> Result<War, WarError> {
        if let Some(war) = state.wars.get(&id) {
            return Ok(war.clone());
        }
        match self.store.find_war(id).await? {
            Some(war) => Err(WarError::InvalidTransition {
                war: id,
                status: war.status,
                action,
            }),
            None => Err(WarError::WarNotFound(id)),
        }
    }

    fn require(war: &War, allowed: &[WarStatus], action: &'static str) -> Result<(), WarError> {
        if allowed.contains(&war.status) {
            Ok(())
        } else {
            Err(WarError::InvalidTransition {
                war: war.id,
                status: war.status,
                action,
            })
        }
    }

    async fn commit(
        &self,
        state: &mut WarState,
        update: WarUpdate,
        base: Changeset,
    ) -> Result<War, WarError> {
        self.store.commit(update.changeset(base)).await?;
        Ok(state.apply(update))
    }

    fn truce_rows(&self, war: &War, now: DateTime<Utc>) -> Vec<NationRelation> {
        let expires_at = Some(clock::after(now, self.rules.truce_duration()));
        [
            (war.attacker_id, war.defender_id),
            (war.defender_id, war.attacker_id),
        ]
        .into_iter()
        .map(|(nation_id, other_id)| NationRelation {
            nation_id,
            other_id,
            kind: RelationKind::Truce,
            established_at: now,
            expires_at,
        })
        .collect()
    }

    /// Close the war with `status`, record the ending, and add the truce.
    fn finish(
        &self,
        update: &mut WarUpdate,
        status: WarStatus,
        winner: Option<WarSide>,
        now: DateTime<Utc>,
    ) -> Result<(), WarError> {
        let war = &mut update.war;
        war.status = status;
        war.ended_at = Some(now);
        war.winner_id = winner.map(|side| war.nation_on(side));
        war.peace_terms = None;
        war.peace_proposer = None;
        war.ceasefire_until = None;

        let outcome = war.winner_id.map_or_else(
            || "white peace".to_owned(),
            |nation| format!("{} victorious", self.label(nation)),
        );
        let mut ended = WarEventBuilder::new(war.id, WarEventType::WarEnded, now)
            .description(format!("War ended: {outcome}"));
        if let Some(side) = winner {
            ended = ended.side(side).nation(war.nation_on(side));
        }
        update.events.push(ended.build()?);
        update.events.push(
            WarEventBuilder::new(war.id, WarEventType::TruceEstablished, now)
                .description(format!(
                    "Truce for {} days",
                    self.rules.truce_days
                ))
                .build()?,
        );
        update.truces = self.truce_rows(&update.war, now);
        Ok(())
    }

    // -- Declaration -----------------------------------------------------

    /// Declare war. Hostilities begin after the start delay.
    pub async fn declare_war(
        &self,
        attacker: NationId,
        defender: NationId,
        goal: WarGoal,
        reason: &str,
    ) -> Result<War, WarError> {
        if attacker == defender {
            return Err(WarError::SelfWar(attacker));
        }
        let attacker_profile = self
            .directory
            .profile(attacker)
            .ok_or(WarError::UnknownNation(attacker))?;
        let defender_profile = self
            .directory
            .profile(defender)
            .ok_or(WarError::UnknownNation(defender))?;
        let len = reason.chars().count();
        if reason.trim().is_empty() || len > self.rules.max_reason_len {
            return Err(WarError::InvalidReason {
                len,
                max: self.rules.max_reason_len,
            });
        }

        let mut state = self.state.write().await;
        let now = self.clock.now();
        if state.open_war_between(attacker, defender).is_some() {
            return Err(WarError::AlreadyAtWar {
                a: attacker,
                b: defender,
            });
        }
        if let Some(until) = state.truce_until(attacker, defender, now) {
            return Err(WarError::TruceInForce { until });
        }

        let war = War {
            id: WarId::new(),
            attacker_id: attacker,
            defender_id: defender,
            status: WarStatus::Declared,
            goal,
            reason: reason.to_owned(),
            declared_at: now,
            starts_at: clock::after(now, self.rules.start_delay()),
            started_at: None,
            ended_at: None,
            attacker_score: 0,
            defender_score: 0,
            attacker_weariness: 0,
            defender_weariness: 0,
            peace_terms: None,
            peace_proposer: None,
            ceasefire_until: None,
            winner_id: None,
        };
        let mut update = WarUpdate::new(war);
        update.participants = [
            (attacker, WarSide::Attacker),
            (defender, WarSide::Defender),
        ]
        .into_iter()
        .map(|(nation_id, side)| WarParticipant {
            war_id: update.war.id,
            nation_id,
            side,
            joined_at: now,
            contribution: 0,
            casualties: 0,
            is_original: true,
        })
        .collect();
        update.events.push(
            WarEventBuilder::new(update.war.id, WarEventType::WarDeclared, now)
                .nation(attacker)
                .side(WarSide::Attacker)
                .description(format!(
                    "{} declared {goal} war on {}: {reason}",
                    attacker_profile.name, defender_profile.name
                ))
                .build()?,
        );

        let war = match self.commit(&mut state, update, Changeset::new()).await {
            Err(WarError::Store(e)) if e.is_conflict() => {
                return Err(WarError::AlreadyAtWar {
                    a: attacker,
                    b: defender,
                });
            }
            other => other?,
        };
        info!(
            war_id = %war.id,
            attacker = %attacker,
            defender = %defender,
            goal = %goal,
            starts_at = %war.starts_at,
            "war declared"
        );
        Ok(war)
    }

    /// Begin hostilities in a declared war.
    pub async fn start_war(&self, id: WarId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "start").await?;
        Self::require(&war, &[WarStatus::Declared], "start")?;
        let now = self.clock.now();

        let mut update = WarUpdate::new(War {
            status: WarStatus::Active,
            started_at: Some(now),
            ..war
        });
        update.events.push(
            WarEventBuilder::new(id, WarEventType::WarStarted, now)
                .description("Hostilities began")
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, "war started");
        Ok(war)
    }

    // -- Score and weariness ----------------------------------------------

    /// Add `points` (before the goal multiplier) to `side`.
    pub async fn add_score(
        &self,
        id: WarId,
        side: WarSide,
        points: i64,
        reason: &str,
    ) -> Result<War, WarError> {
        if points <= 0 {
            return Err(WarError::InvalidAmount(points));
        }
        let mut state = self.state.write().await;
        let mut war = self.live_war(&state, id, "add score to").await?;
        Self::require(
            &war,
            &[WarStatus::Active, WarStatus::Negotiating],
            "add score to",
        )?;
        let now = self.clock.now();

        let applied = apply_multiplier(points, war.goal);
        match side {
            WarSide::Attacker => war.attacker_score = war.attacker_score.saturating_add(applied),
            WarSide::Defender => war.defender_score = war.defender_score.saturating_add(applied),
        }
        let nation = war.nation_on(side);
        let mut update = WarUpdate::new(war);
        update.events.push(
            WarEventBuilder::new(id, WarEventType::ScoreAdded, now)
                .nation(nation)
                .side(side)
                .score_delta(applied)
                .description(format!("{side} +{applied}: {reason}"))
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, side = %side, points, applied, "score added");
        self.report_end_condition(&war);
        Ok(war)
    }

    /// Add weariness to `side`, clamped at the cap.
    pub async fn add_war_weariness(
        &self,
        id: WarId,
        side: WarSide,
        amount: u8,
    ) -> Result<War, WarError> {
        if amount == 0 {
            return Err(WarError::InvalidAmount(0));
        }
        let mut state = self.state.write().await;
        let mut war = self.live_war(&state, id, "add weariness to").await?;
        Self::require(
            &war,
            &[WarStatus::Active, WarStatus::Negotiating, WarStatus::Ceasefire],
            "add weariness to",
        )?;
        let now = self.clock.now();

        let cap = self.rules.weariness_cap;
        let total = match side {
            WarSide::Attacker => {
                war.attacker_weariness = add_weariness(war.attacker_weariness, amount, cap);
                war.attacker_weariness
            }
            WarSide::Defender => {
                war.defender_weariness = add_weariness(war.defender_weariness, amount, cap);
                war.defender_weariness
            }
        };
        let nation = war.nation_on(side);
        let mut update = WarUpdate::new(war);
        update.events.push(
            WarEventBuilder::new(id, WarEventType::WearinessAdded, now)
                .nation(nation)
                .side(side)
                .description(format!("{side} weariness now {total}"))
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, side = %side, amount, total, "weariness added");
        self.report_end_condition(&war);
        Ok(war)
    }

    fn report_end_condition(&self, war: &War) {
        if end_condition_met(war, &self.rules) {
            let winner = decide_winner(war, &self.rules);
            info!(
                war_id = %war.id,
                attacker_score = war.attacker_score,
                defender_score = war.defender_score,
                winner = ?winner,
                "war end condition reached"
            );
        }
    }

    /// Whether the war's end condition holds.
    pub async fn can_end_war(&self, id: WarId) -> Result<bool, WarError> {
        let state = self.state.read().await;
        let war = self.live_war(&state, id, "evaluate").await?;
        Ok(end_condition_met(&war, &self.rules))
    }

    /// The nation that would win if the war ended now.
    pub async fn winner(&self, id: WarId) -> Result<Option<NationId>, WarError> {
        let state = self.state.read().await;
        let war = self.live_war(&state, id, "evaluate").await?;
        Ok(decide_winner(&war, &self.rules).map(|side| war.nation_on(side)))
    }

    /// Whether the leading side's margin meets the war goal.
    pub async fn goal_achieved(&self, id: WarId) -> Result<bool, WarError> {
        let state = self.state.read().await;
        let war = self.live_war(&state, id, "evaluate").await?;
        Ok(war.score_lead().saturating_abs() >= war.goal.required_score())
    }

    // -- Peace ------------------------------------------------------------

    /// Put peace terms on the table.
    pub async fn propose_peace(
        &self,
        id: WarId,
        proposer: NationId,
        terms: &str,
    ) -> Result<War, WarError> {
        let len = terms.chars().count();
        if terms.trim().is_empty() || len > self.rules.max_terms_len {
            return Err(WarError::InvalidTerms {
                len,
                max: self.rules.max_terms_len,
            });
        }
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "propose peace in").await?;
        Self::require(&war, &[WarStatus::Active], "propose peace in")?;
        let side = war
            .original_side_of(proposer)
            .ok_or(WarError::NotOriginalNation {
                war: id,
                nation: proposer,
            })?;
        let now = self.clock.now();

        let mut update = WarUpdate::new(War {
            status: WarStatus::Negotiating,
            peace_terms: Some(terms.to_owned()),
            peace_proposer: Some(proposer),
            ..war
        });
        update.events.push(
            WarEventBuilder::new(id, WarEventType::PeaceProposed, now)
                .nation(proposer)
                .side(side)
                .description(format!("{} proposed peace: {terms}", self.label(proposer)))
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, proposer = %proposer, "peace proposed");
        Ok(war)
    }

    /// Accept the pending peace. The war ends with the computed winner.
    pub async fn accept_peace(&self, id: WarId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "accept peace in").await?;
        Self::require(&war, &[WarStatus::Negotiating], "accept peace in")?;
        let now = self.clock.now();
        let winner = decide_winner(&war, &self.rules);
        let terms = war.peace_terms.clone().unwrap_or_default();

        let mut update = WarUpdate::new(war);
        update.events.push(
            WarEventBuilder::new(id, WarEventType::PeaceAccepted, now)
                .description(format!("Peace accepted: {terms}"))
                .build()?,
        );
        self.finish(&mut update, WarStatus::Ended, winner, now)?;
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, winner = ?war.winner_id, "peace accepted");
        Ok(war)
    }

    /// Reject the pending peace and resume hostilities.
    pub async fn reject_peace(&self, id: WarId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "reject peace in").await?;
        Self::require(&war, &[WarStatus::Negotiating], "reject peace in")?;
        let now = self.clock.now();

        let mut update = WarUpdate::new(War {
            status: WarStatus::Active,
            peace_terms: None,
            peace_proposer: None,
            ..war
        });
        update.events.push(
            WarEventBuilder::new(id, WarEventType::PeaceRejected, now)
                .description("Peace terms rejected")
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, "peace rejected");
        Ok(war)
    }

    /// Surrender on behalf of an original nation; the other side wins.
    pub async fn surrender(&self, id: WarId, nation: NationId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "surrender in").await?;
        Self::require(&war, &[WarStatus::Active], "surrender in")?;
        let side = war
            .original_side_of(nation)
            .ok_or(WarError::NotOriginalNation { war: id, nation })?;
        let now = self.clock.now();

        let mut update = WarUpdate::new(war);
        update.events.push(
            WarEventBuilder::new(id, WarEventType::Surrendered, now)
                .nation(nation)
                .side(side)
                .description(format!("{} surrendered", self.label(nation)))
                .build()?,
        );
        self.finish(&mut update, WarStatus::Surrendered, Some(side.opposite()), now)?;
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, nation = %nation, "war surrendered");
        Ok(war)
    }

    /// End a war whose end condition holds.
    pub async fn conclude_war(&self, id: WarId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "conclude").await?;
        Self::require(
            &war,
            &[WarStatus::Active, WarStatus::Negotiating, WarStatus::Ceasefire],
            "conclude",
        )?;
        if !end_condition_met(&war, &self.rules) {
            return Err(WarError::EndConditionNotMet(id));
        }
        let now = self.clock.now();
        let winner = decide_winner(&war, &self.rules);

        let mut update = WarUpdate::new(war);
        self.finish(&mut update, WarStatus::Ended, winner, now)?;
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, winner = ?war.winner_id, "war concluded");
        Ok(war)
    }

    // -- Allies -----------------------------------------------------------

    /// Add a non-original nation to `side`.
    pub async fn join_war(
        &self,
        id: WarId,
        nation: NationId,
        side: WarSide,
    ) -> Result<WarParticipant, WarError> {
        let name = self
            .directory
            .profile(nation)
            .ok_or(WarError::UnknownNation(nation))?
            .name;
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "join").await?;
        if war.original_side_of(nation).is_some() {
            return Err(WarError::AlreadyParticipant { war: id, nation });
        }
        match state.side_of(id, nation) {
            Some(current) if current == side => {
                return Err(WarError::AlreadyParticipant { war: id, nation });
            }
            Some(current) => {
                return Err(WarError::SideSwitch {
                    war: id,
                    nation,
                    current,
                });
            }
            None => {}
        }
        let now = self.clock.now();

        let participant = WarParticipant {
            war_id: id,
            nation_id: nation,
            side,
            joined_at: now,
            contribution: 0,
            casualties: 0,
            is_original: false,
        };
        let mut update = WarUpdate::new(war);
        update.participants.push(participant.clone());
        update.events.push(
            WarEventBuilder::new(id, WarEventType::AllyJoined, now)
                .nation(nation)
                .side(side)
                .description(format!("{name} joined as {side}"))
                .build()?,
        );
        self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, nation = %nation, side = %side, "ally joined war");
        Ok(participant)
    }

    // -- Ceasefire --------------------------------------------------------

    /// Pause hostilities for `hours`.
    pub async fn declare_ceasefire(&self, id: WarId, hours: i64) -> Result<War, WarError> {
        let max = self.rules.max_ceasefire_hours;
        if !(1..=max).contains(&hours) {
            return Err(WarError::InvalidCeasefire { hours, max });
        }
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "declare ceasefire in").await?;
        Self::require(&war, &[WarStatus::Active], "declare ceasefire in")?;
        let now = self.clock.now();
        let until = clock::after(now, TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX));

        let mut update = WarUpdate::new(War {
            status: WarStatus::Ceasefire,
            ceasefire_until: Some(until),
            ..war
        });
        update.events.push(
            WarEventBuilder::new(id, WarEventType::CeasefireDeclared, now)
                .description(format!("Ceasefire until {until}"))
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, until = %until, "ceasefire declared");
        Ok(war)
    }

    /// Lift a ceasefire and resume hostilities.
    pub async fn resume_war(&self, id: WarId) -> Result<War, WarError> {
        let mut state = self.state.write().await;
        let war = self.live_war(&state, id, "resume").await?;
        Self::require(&war, &[WarStatus::Ceasefire], "resume")?;
        let now = self.clock.now();

        let mut update = WarUpdate::new(War {
            status: WarStatus::Active,
            ceasefire_until: None,
            ..war
        });
        update.events.push(
            WarEventBuilder::new(id, WarEventType::CeasefireEnded, now)
                .description("Ceasefire ended")
                .build()?,
        );
        let war = self.commit(&mut state, update, Changeset::new()).await?;
        info!(war_id = %id, "war resumed");
        Ok(war)
    }

    // -- Battle settlement --------------------------------------------------

    /// Commit a finished battle together with its effect on the war.
    ///
    /// Score is only credited while the war is ACTIVE or NEGOTIATING; in
    /// any other state the battle is recorded with no award.
    pub(crate) async fn settle_battle(
        &self,
        settlement: BattleSettlement,
    ) -> Result<Battle, WarError> {
        let BattleSettlement {
            mut battle,
            roster,
            credits,
            loser,
        } = settlement;
        let mut state = self.state.write().await;

        let Some(war) = state.wars.get(&battle.war_id).cloned() else {
            battle.awarded_score = 0;
            self.store
                .commit(
                    Changeset::new()
                        .with_battle(battle.clone())
                        .with_battle_participants(roster),
                )
                .await?;
            warn!(battle_id = %battle.id, war_id = %battle.war_id, "battle settled without a live war");
            return Ok(battle);
        };

        let now = self.clock.now();
        let scoring = matches!(war.status, WarStatus::Active | WarStatus::Negotiating);
        // Battle sides are local to the battle; its attacker may be defending
        // the war.
        let flipped = state.side_of(war.id, battle.attacker_id) == Some(WarSide::Defender);
        let to_war_side = |side: WarSide| if flipped { side.opposite() } else { side };
        let credits: Vec<(WarSide, i64)> = credits
            .into_iter()
            .map(|(side, points)| (to_war_side(side), points))
            .collect();
        let loser = loser.map(to_war_side);
        let participants = contributions(
            state.participants.get(&war.id).map_or(&[][..], Vec::as_slice),
            &roster,
        );
        let mut update = WarUpdate::new(war);
        update.participants = participants;
        battle.awarded_score = 0;

        if scoring {
            self.credit_battle(&mut update, &mut battle, &credits, loser, now)?;
        }

        let base = Changeset::new()
            .with_battle(battle.clone())
            .with_battle_participants(roster);
        let war = self.commit(&mut state, update, base).await?;
        info!(
            battle_id = %battle.id,
            war_id = %war.id,
            awarded = battle.awarded_score,
            winner = ?battle.winner_id,
            "battle settled"
        );
        if scoring {
            self.report_end_condition(&war);
        }
        Ok(battle)
    }

    fn credit_battle(
        &self,
        update: &mut WarUpdate,
        battle: &mut Battle,
        credits: &[(WarSide, i64)],
        loser: Option<WarSide>,
        now: DateTime<Utc>,
    ) -> Result<(), WarError> {
        let war = &mut update.war;
        let event_type = if loser.is_some() {
            WarEventType::BattleWon
        } else {
            WarEventType::BattleDrawn
        };
        for &(side, points) in credits {
            let applied = apply_multiplier(points, war.goal);
            match side {
                WarSide::Attacker => {
                    war.attacker_score = war.attacker_score.saturating_add(applied);
                }
                WarSide::Defender => {
                    war.defender_score = war.defender_score.saturating_add(applied);
                }
            }
            battle.awarded_score = battle.awarded_score.max(applied);
            update.events.push(
                WarEventBuilder::new(war.id, event_type, now)
                    .nation(war.nation_on(side))
                    .side(side)
                    .score_delta(applied)
                    .description(format!(
                        "{} in {}: {side} +{applied}",
                        battle.battle_type, battle.region
                    ))
                    .build()?,
            );
        }

        if let Some(side) = loser {
            let amount = self.rules.weariness_per_defeat;
            let cap = self.rules.weariness_cap;
            let total = match side {
                WarSide::Attacker => {
                    war.attacker_weariness = add_weariness(war.attacker_weariness, amount, cap);
                    war.attacker_weariness
                }
                WarSide::Defender => {
                    war.defender_weariness = add_weariness(war.defender_weariness, amount, cap);
                    war.defender_weariness
                }
            };
            update.events.push(
                WarEventBuilder::new(war.id, WarEventType::WearinessAdded, now)
                    .nation(war.nation_on(side))
                    .side(side)
                    .description(format!("{side} lost a battle; weariness now {total}"))
                    .build()?,
            );
        }
        Ok(())
    }

    // -- Queries ------------------------------------------------------------

    /// Look up a war, falling back to the store for ended wars.
    pub async fn get_war(&self, id: WarId) -> Result<Option<War>, WarError> {
        if let Some(war) = self.state.read().await.wars.get(&id) {
            return Ok(Some(war.clone()));
        }
        Ok(self.store.find_war(id).await?)
    }

    /// Open wars `nation` takes part in, oldest first.
    pub async fn get_active_wars(&self, nation: NationId) -> Vec<War> {
        let state = self.state.read().await;
        let mut wars: Vec<War> = state
            .wars
            .values()
            .filter(|w| state.side_of(w.id, nation).is_some())
            .cloned()
            .collect();
        wars.sort_by_key(|w| (w.declared_at, w.id));
        wars
    }

    /// Every open war, oldest first.
    pub async fn live_wars(&self) -> Vec<War> {
        let mut wars: Vec<War> = self.state.read().await.wars.values().cloned().collect();
        wars.sort_by_key(|w| (w.declared_at, w.id));
        wars
    }

    /// Whether `a` and `b` fight on opposite sides of a war that has started
    /// and not ended.
    pub async fn are_at_war(&self, a: NationId, b: NationId) -> bool {
        let state = self.state.read().await;
        state.wars.values().any(|w| {
            w.status.is_hostile()
                && matches!(
                    (state.side_of(w.id, a), state.side_of(w.id, b)),
                    (Some(x), Some(y)) if x != y
                )
        })
    }

    /// Whether the pair has a non-terminal war.
    pub async fn has_open_war(&self, a: NationId, b: NationId) -> bool {
        self.state.read().await.open_war_between(a, b).is_some()
    }

    /// Whether a post-war truce between the pair is still in force.
    pub async fn has_truce(&self, a: NationId, b: NationId) -> bool {
        let now = self.clock.now();
        self.state.read().await.truce_until(a, b, now).is_some()
    }

    /// The side `nation` fights on in a live war.
    pub async fn side_of(&self, war: WarId, nation: NationId) -> Option<WarSide> {
        self.state.read().await.side_of(war, nation)
    }

    /// Participants of a live war.
    pub async fn participants(&self, war: WarId) -> Vec<WarParticipant> {
        self.state
            .read()
            .await
            .participants
            .get(&war)
            .cloned()
            .unwrap_or_default()
    }

    /// A war's events, oldest first; ended wars are read from the store.
    pub async fn war_history(&self, war: WarId) -> Result<Vec<WarEvent>, WarError> {
        {
            let state = self.state.read().await;
            if state.wars.contains_key(&war) {
                return Ok(state.ledger.events_for(war).to_vec());
            }
        }
        Ok(self.store.war_events(war).await?)
    }

    /// Recompute every live war's scores from its ledger.
    pub async fn audit(&self) -> Vec<ScoreDrift> {
        let state = self.state.read().await;
        state
            .wars
            .values()
            .filter_map(|war| match state.ledger.audit(war) {
                ScoreAudit::Consistent => None,
                ScoreAudit::Drift(drift) => Some(drift),
            })
            .collect()
    }

    // -- Tick helpers -------------------------------------------------------

    /// Declared wars whose start delay has elapsed.
    pub async fn wars_due_to_start(&self) -> Vec<WarId> {
        let now = self.clock.now();
        self.collect_ids(|w| w.status == WarStatus::Declared && w.starts_at <= now)
            .await
    }

    /// Ceasefires whose time has run out.
    pub async fn expired_ceasefires(&self) -> Vec<WarId> {
        let now = self.clock.now();
        self.collect_ids(|w| {
            w.status == WarStatus::Ceasefire && w.ceasefire_until.is_some_and(|until| until <= now)
        })
        .await
    }

    /// Started wars whose end condition holds.
    pub async fn wars_ready_to_end(&self) -> Vec<WarId> {
        self.collect_ids(|w| w.status.is_hostile() && end_condition_met(w, &self.rules))
            .await
    }

    async fn collect_ids(&self, predicate: impl Fn(&War) -> bool) -> Vec<WarId> {
        let state = self.state.read().await;
        let mut wars: Vec<&War> = state.wars.values().filter(|w| predicate(w)).collect();
        wars.sort_by_key(|w| (w.declared_at, w.id));
        wars.into_iter().map(|w| w.id).collect()
    }

    /// Drop expired truces from the cache and the store.
    pub async fn prune_truces(&self) -> Result<usize, WarError> {
        let mut state = self.state.write().await;
        let now = self.clock.now();
        let expired: Vec<NationPair> = state
            .truces
            .iter()
            .filter(|(_, truce)| !truce.is_in_force(now))
            .map(|(key, _)| *key)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let changes = expired.iter().fold(Changeset::new(), |changes, (a, b)| {
            changes.without_relations(*a, *b, &[RelationKind::Truce])
        });
        self.store.commit(changes).await?;
        for key in &expired {
            state.truces.remove(key);
        }
        debug!(pruned = expired.len(), "expired truces pruned");
        Ok(expired.len())
    }
}

/// Participant rows with the roster's kills and deaths added, for every
/// war participant that fielded players.
fn contributions(
    participants: &[WarParticipant],
    roster: &[BattleParticipant],
) -> Vec<WarParticipant> {
    participants
        .iter()
        .filter_map(|participant| {
            let fielded: Vec<&BattleParticipant> = roster
                .iter()
                .filter(|p| p.nation_id == participant.nation_id)
                .collect();
            if fielded.is_empty() {
                return None;
            }
            let kills = fielded
                .iter()
                .fold(0_i64, |acc, p| acc.saturating_add(i64::from(p.kills)));
            let deaths = fielded
                .iter()
                .fold(0_u32, |acc, p| acc.saturating_add(p.deaths));
            Some(WarParticipant {
                contribution: participant.contribution.saturating_add(kills),
                casualties: participant.casualties.saturating_add(deaths),
                ..participant.clone()
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use conquest_store::MemoryStore;
    use conquest_types::GovernmentType;
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{NationProfile, StaticDirectory};

    struct Fixture {
        wars: WarManager,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        a: NationId,
        b: NationId,
        c: NationId,
    }

    fn nation(directory: &StaticDirectory, name: &str) -> NationId {
        let id = NationId::new();
        directory.add_nation(NationProfile {
            id,
            name: name.to_owned(),
            power: Decimal::new(100, 0),
            balance: Decimal::ZERO,
            leader: None,
            government: GovernmentType::Monarchy,
        });
        id
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::default());
        let a = nation(&directory, "Avalon");
        let b = nation(&directory, "Brython");
        let c = nation(&directory, "Cymru");
        let wars = WarManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            directory,
            Arc::clone(&clock) as Arc<dyn Clock>,
            WarRules::default(),
        );
        Fixture {
            wars,
            store,
            clock,
            a,
            b,
            c,
        }
    }

    async fn active_war(f: &Fixture, goal: WarGoal) -> War {
        let war = f.wars.declare_war(f.a, f.b, goal, "border").await.unwrap();
        f.wars.start_war(war.id).await.unwrap()
    }

    fn bare_war() -> War {
        let now = Utc::now();
        War {
            id: WarId::new(),
            attacker_id: NationId::new(),
            defender_id: NationId::new(),
            status: WarStatus::Active,
            goal: WarGoal::Conquest,
            reason: "test".to_owned(),
            declared_at: now,
            starts_at: now,
            started_at: Some(now),
            ended_at: None,
            attacker_score: 0,
            defender_score: 0,
            attacker_weariness: 0,
            defender_weariness: 0,
            peace_terms: None,
            peace_proposer: None,
            ceasefire_until: None,
            winner_id: None,
        }
    }

    #[test]
    fn winner_by_decisive_lead() {
        let rules = WarRules::default();
        let war = War {
            attacker_score: 40,
            defender_score: 150,
            ..bare_war()
        };
        assert!(end_condition_met(&war, &rules));
        assert_eq!(decide_winner(&war, &rules), Some(WarSide::Defender));
    }

    #[test]
    fn exhausted_side_loses() {
        let rules = WarRules::default();
        let war = War {
            attacker_score: 90,
            attacker_weariness: 100,
            ..bare_war()
        };
        assert!(end_condition_met(&war, &rules));
        assert_eq!(decide_winner(&war, &rules), Some(WarSide::Defender));
    }

    #[test]
    fn both_exhausted_level_score_keeps_status_quo() {
        let rules = WarRules::default();
        let war = War {
            attacker_weariness: 100,
            defender_weariness: 100,
            ..bare_war()
        };
        assert_eq!(decide_winner(&war, &rules), Some(WarSide::Defender));

        let war = War {
            attacker_score: 10,
            ..war
        };
        assert_eq!(decide_winner(&war, &rules), Some(WarSide::Attacker));
    }

    #[test]
    fn early_peace_falls_back_to_weariness_then_white_peace() {
        let rules = WarRules::default();
        let war = War {
            attacker_weariness: 30,
            defender_weariness: 10,
            ..bare_war()
        };
        assert!(!end_condition_met(&war, &rules));
        assert_eq!(decide_winner(&war, &rules), Some(WarSide::Defender));
        assert_eq!(decide_winner(&bare_war(), &rules), None);
    }

    #[test]
    fn multiplier_rounds_toward_zero() {
        assert_eq!(apply_multiplier(100, WarGoal::TotalWar), 150);
        assert_eq!(apply_multiplier(5, WarGoal::Humiliation), 3);
        assert_eq!(apply_multiplier(i64::MAX, WarGoal::TotalWar), i64::MAX / 100);
    }

    #[tokio::test]
    async fn declaration_sets_start_delay_and_originals() {
        let f = fixture();
        let war = f
            .wars
            .declare_war(f.a, f.b, WarGoal::Conquest, "border dispute")
            .await
            .unwrap();

        assert_eq!(war.status, WarStatus::Declared);
        assert_eq!(war.starts_at, clock::after(war.declared_at, TimeDelta::hours(24)));
        let participants = f.wars.participants(war.id).await;
        assert_eq!(participants.len(), 2);
        assert!(participants.iter().all(|p| p.is_original));
        let history = f.wars.war_history(war.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.first().map(|e| e.event_type), Some(WarEventType::WarDeclared));
    }

    #[tokio::test]
    async fn declaration_rejects_bad_input() {
        let f = fixture();
        let result = f.wars.declare_war(f.a, f.a, WarGoal::Conquest, "x").await;
        assert!(matches!(result, Err(WarError::SelfWar(_))));

        let ghost = NationId::new();
        let result = f.wars.declare_war(f.a, ghost, WarGoal::Conquest, "x").await;
        assert!(matches!(result, Err(WarError::UnknownNation(n)) if n == ghost));

        let result = f.wars.declare_war(f.a, f.b, WarGoal::Conquest, "   ").await;
        assert!(matches!(result, Err(WarError::InvalidReason { .. })));

        let long = "x".repeat(257);
        let result = f.wars.declare_war(f.a, f.b, WarGoal::Conquest, &long).await;
        assert!(matches!(result, Err(WarError::InvalidReason { len: 257, max: 256 })));
    }

    #[tokio::test]
    async fn second_war_for_pair_rejected_in_either_order() {
        let f = fixture();
        f.wars
            .declare_war(f.a, f.b, WarGoal::Conquest, "first")
            .await
            .unwrap();
        let result = f.wars.declare_war(f.b, f.a, WarGoal::Conquest, "again").await;
        assert!(matches!(result, Err(WarError::AlreadyAtWar { .. })));
    }

    #[tokio::test]
    async fn start_requires_declared() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        assert!(war.started_at.is_some());
        let result = f.wars.start_war(war.id).await;
        assert!(matches!(
            result,
            Err(WarError::InvalidTransition {
                status: WarStatus::Active,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn score_uses_goal_multiplier() {
        let f = fixture();
        let war = active_war(&f, WarGoal::TotalWar).await;
        let war = f
            .wars
            .add_score(war.id, WarSide::Attacker, 40, "raid")
            .await
            .unwrap();
        assert_eq!(war.attacker_score, 60);
        assert!(f.wars.audit().await.is_empty());
    }

    #[tokio::test]
    async fn score_rejected_before_start_and_for_non_positive_points() {
        let f = fixture();
        let war = f
            .wars
            .declare_war(f.a, f.b, WarGoal::Conquest, "x")
            .await
            .unwrap();
        let result = f.wars.add_score(war.id, WarSide::Attacker, 10, "early").await;
        assert!(matches!(result, Err(WarError::InvalidTransition { .. })));
        let result = f.wars.add_score(war.id, WarSide::Attacker, 0, "nothing").await;
        assert!(matches!(result, Err(WarError::InvalidAmount(0))));
    }

    #[tokio::test]
    async fn weariness_is_clamped() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        f.wars
            .add_war_weariness(war.id, WarSide::Defender, 90)
            .await
            .unwrap();
        let war = f
            .wars
            .add_war_weariness(war.id, WarSide::Defender, 30)
            .await
            .unwrap();
        assert_eq!(war.defender_weariness, 100);
        assert!(f.wars.can_end_war(war.id).await.unwrap());
        assert_eq!(f.wars.winner(war.id).await.unwrap(), Some(f.a));
    }

    #[tokio::test]
    async fn peace_ends_war_and_establishes_truce() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        f.wars
            .add_score(war.id, WarSide::Defender, 20, "ambush")
            .await
            .unwrap();
        f.wars
            .propose_peace(war.id, f.a, "status quo")
            .await
            .unwrap();
        let ended = f.wars.accept_peace(war.id).await.unwrap();

        assert_eq!(ended.status, WarStatus::Ended);
        assert_eq!(ended.winner_id, Some(f.b));
        assert!(f.wars.has_truce(f.a, f.b).await);
        assert!(!f.wars.has_open_war(f.a, f.b).await);

        let result = f.wars.declare_war(f.b, f.a, WarGoal::Conquest, "revenge").await;
        assert!(matches!(result, Err(WarError::TruceInForce { .. })));

        f.clock.advance(TimeDelta::days(7));
        assert!(!f.wars.has_truce(f.a, f.b).await);
        assert_eq!(f.wars.prune_truces().await.unwrap(), 1);
        assert!(
            f.wars
                .declare_war(f.b, f.a, WarGoal::Conquest, "revenge")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn ended_war_history_comes_from_store() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        f.wars.surrender(war.id, f.b).await.unwrap();

        assert!(f.wars.live_wars().await.is_empty());
        let stored = f.wars.get_war(war.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WarStatus::Surrendered);
        assert_eq!(stored.winner_id, Some(f.a));

        let kinds: Vec<WarEventType> = f
            .wars
            .war_history(war.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            kinds,
            vec![
                WarEventType::WarDeclared,
                WarEventType::WarStarted,
                WarEventType::Surrendered,
                WarEventType::WarEnded,
                WarEventType::TruceEstablished,
            ]
        );

        let result = f.wars.start_war(war.id).await;
        assert!(matches!(
            result,
            Err(WarError::InvalidTransition {
                status: WarStatus::Surrendered,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn peace_rules() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        let result = f.wars.propose_peace(war.id, f.c, "terms").await;
        assert!(matches!(result, Err(WarError::NotOriginalNation { .. })));
        let result = f.wars.propose_peace(war.id, f.a, "").await;
        assert!(matches!(result, Err(WarError::InvalidTerms { .. })));

        f.wars.propose_peace(war.id, f.b, "terms").await.unwrap();
        let result = f.wars.surrender(war.id, f.b).await;
        assert!(matches!(result, Err(WarError::InvalidTransition { .. })));

        let war = f.wars.reject_peace(war.id).await.unwrap();
        assert_eq!(war.status, WarStatus::Active);
        assert_eq!(war.peace_terms, None);
    }

    #[tokio::test]
    async fn allies_join_once_and_cannot_switch() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        f.wars
            .join_war(war.id, f.c, WarSide::Defender)
            .await
            .unwrap();

        let result = f.wars.join_war(war.id, f.c, WarSide::Defender).await;
        assert!(matches!(result, Err(WarError::AlreadyParticipant { .. })));
        let result = f.wars.join_war(war.id, f.c, WarSide::Attacker).await;
        assert!(matches!(
            result,
            Err(WarError::SideSwitch {
                current: WarSide::Defender,
                ..
            })
        ));
        let result = f.wars.join_war(war.id, f.a, WarSide::Defender).await;
        assert!(matches!(result, Err(WarError::AlreadyParticipant { .. })));

        assert!(f.wars.are_at_war(f.a, f.c).await);
        assert!(!f.wars.are_at_war(f.b, f.c).await);
    }

    #[tokio::test]
    async fn declared_war_is_not_yet_at_war() {
        let f = fixture();
        f.wars
            .declare_war(f.a, f.b, WarGoal::Conquest, "x")
            .await
            .unwrap();
        assert!(f.wars.has_open_war(f.a, f.b).await);
        assert!(!f.wars.are_at_war(f.a, f.b).await);
        assert_eq!(f.wars.wars_due_to_start().await.len(), 0);

        f.clock.advance(TimeDelta::hours(24));
        assert_eq!(f.wars.wars_due_to_start().await.len(), 1);
    }

    #[tokio::test]
    async fn ceasefire_round_trip() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        let result = f.wars.declare_ceasefire(war.id, 0).await;
        assert!(matches!(result, Err(WarError::InvalidCeasefire { .. })));

        let paused = f.wars.declare_ceasefire(war.id, 12).await.unwrap();
        assert_eq!(paused.status, WarStatus::Ceasefire);
        let result = f.wars.add_score(war.id, WarSide::Attacker, 10, "x").await;
        assert!(matches!(result, Err(WarError::InvalidTransition { .. })));
        assert!(f.wars.are_at_war(f.a, f.b).await);

        assert!(f.wars.expired_ceasefires().await.is_empty());
        f.clock.advance(TimeDelta::hours(12));
        assert_eq!(f.wars.expired_ceasefires().await, vec![war.id]);

        let resumed = f.wars.resume_war(war.id).await.unwrap();
        assert_eq!(resumed.status, WarStatus::Active);
        assert_eq!(resumed.ceasefire_until, None);
    }

    #[tokio::test]
    async fn conclude_requires_end_condition() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        let result = f.wars.conclude_war(war.id).await;
        assert!(matches!(result, Err(WarError::EndConditionNotMet(_))));

        f.wars
            .add_score(war.id, WarSide::Attacker, 100, "capital taken")
            .await
            .unwrap();
        assert!(f.wars.goal_achieved(war.id).await.unwrap());
        assert_eq!(f.wars.wars_ready_to_end().await, vec![war.id]);
        let ended = f.wars.conclude_war(war.id).await.unwrap();
        assert_eq!(ended.winner_id, Some(f.a));
        assert!(f.wars.has_truce(f.b, f.a).await);
    }

    #[tokio::test]
    async fn failed_commit_leaves_cache_untouched() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        let commits = f.store.commit_count();

        f.store.fail_next_commit();
        let result = f.wars.add_score(war.id, WarSide::Attacker, 30, "x").await;
        assert!(matches!(result, Err(WarError::Store(_))));
        assert_eq!(f.store.commit_count(), commits);

        let cached = f.wars.get_war(war.id).await.unwrap().unwrap();
        assert_eq!(cached.attacker_score, 0);
        assert_eq!(f.wars.war_history(war.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn restore_rebuilds_cache_from_store() {
        let f = fixture();
        let war = active_war(&f, WarGoal::Conquest).await;
        f.wars
            .add_score(war.id, WarSide::Defender, 25, "x")
            .await
            .unwrap();

        let snapshot = f.store.load_snapshot().await.unwrap();
        let directory = Arc::new(StaticDirectory::new());
        let fresh = WarManager::new(
            Arc::clone(&f.store) as Arc<dyn Store>,
            directory,
            Arc::clone(&f.clock) as Arc<dyn Clock>,
            WarRules::default(),
        );
        fresh.restore(&snapshot).await;

        assert!(fresh.are_at_war(f.a, f.b).await);
        assert_eq!(fresh.participants(war.id).await.len(), 2);
        assert_eq!(fresh.war_history(war.id).await.unwrap().len(), 3);
        assert!(fresh.audit().await.is_empty());
    }
}
