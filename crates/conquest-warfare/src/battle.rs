//! Battle manager.
//!
//! Battles are fought under an ACTIVE war inside a spherical zone. Sides
//! are local to the battle: `Attacker` is the side of `battle.attacker_id`,
//! which need not be the side that declared the war. A player joins the
//! side whose battle nation fights on the same war side as their own.
//!
//! Ending a battle hands it to [`WarManager`] for settlement, so the battle,
//! its roster, the war score, and the ledger land in one commit. The battle
//! lock is taken before the war lock, never the other way round.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use conquest_store::{Changeset, Store, StoreSnapshot};
use conquest_types::{
    Battle, BattleId, BattleParticipant, BattleStatus, BattleType, BattleZone, NationId,
    PlayerId, Position, WarId, WarSide, WarStatus,
};

use crate::clock::Clock;
use crate::config::BattleRules;
use crate::error::{BattleError, WarError};
use crate::war::{BattleSettlement, WarManager};

/// Everything needed to create a battle.
#[derive(Debug, Clone, PartialEq)]
pub struct BattlePlan {
    /// The parent war; must be ACTIVE.
    pub war_id: WarId,
    /// Kind of battle.
    pub battle_type: BattleType,
    /// Region identifier from the territory system.
    pub region: String,
    /// Nation leading the attack.
    pub attacker: NationId,
    /// Nation holding the ground.
    pub defender: NationId,
    /// Where the battle is fought.
    pub zone: BattleZone,
    /// Planned start; a future time schedules the battle.
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    /// One side won.
    Winner(WarSide),
    /// Nobody won; both sides share a reduced award.
    Draw,
}

impl BattleOutcome {
    /// The outcome by kill count; level kills are a draw.
    pub fn by_kills(battle: &Battle) -> Self {
        match battle.attacker_kills.cmp(&battle.defender_kills) {
            core::cmp::Ordering::Greater => Self::Winner(WarSide::Attacker),
            core::cmp::Ordering::Less => Self::Winner(WarSide::Defender),
            core::cmp::Ordering::Equal => Self::Draw,
        }
    }
}

/// Present, living participants per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideCounts {
    /// Active attackers.
    pub attacker: usize,
    /// Active defenders.
    pub defender: usize,
}

impl SideCounts {
    /// Active participants on `side`.
    pub const fn on(&self, side: WarSide) -> usize {
        match side {
            WarSide::Attacker => self.attacker,
            WarSide::Defender => self.defender,
        }
    }
}

/// Score each side earns from `outcome`.
///
/// A winner earns the base score, the kill margin times the kill score,
/// and the victory bonus. A draw gives both sides half the base score.
pub fn battle_award(
    battle: &Battle,
    outcome: BattleOutcome,
    rules: &BattleRules,
) -> Vec<(WarSide, i64)> {
    let base = battle.battle_type.base_score();
    match outcome {
        BattleOutcome::Winner(side) => {
            let margin = i64::from(battle.kills(side))
                .saturating_sub(i64::from(battle.kills(side.opposite())))
                .max(0);
            let award = base
                .saturating_add(margin.saturating_mul(rules.kill_score))
                .saturating_add(rules.victory_bonus);
            vec![(side, award)]
        }
        BattleOutcome::Draw => {
            let half = base.checked_div(2).unwrap_or_default();
            vec![(WarSide::Attacker, half), (WarSide::Defender, half)]
        }
    }
}

#[derive(Debug, Default)]
struct BattleState {
    battles: HashMap<BattleId, Battle>,
    rosters: HashMap<BattleId, HashMap<PlayerId, BattleParticipant>>,
    player_battle: HashMap<PlayerId, BattleId>,
}

impl BattleState {
    fn battle(&self, id: BattleId) -> Result<&Battle, BattleError> {
        self.battles.get(&id).ok_or(BattleError::BattleNotFound(id))
    }

    fn present(&self, battle: BattleId, player: PlayerId) -> Result<&BattleParticipant, BattleError> {
        self.rosters
            .get(&battle)
            .and_then(|roster| roster.get(&player))
            .filter(|p| p.is_present())
            .ok_or(BattleError::NotInBattle { battle, player })
    }

    fn counts(&self, battle: BattleId) -> SideCounts {
        self.rosters
            .get(&battle)
            .into_iter()
            .flat_map(HashMap::values)
            .filter(|p| p.is_active())
            .fold(SideCounts::default(), |mut counts, p| {
                match p.side {
                    WarSide::Attacker => counts.attacker = counts.attacker.saturating_add(1),
                    WarSide::Defender => counts.defender = counts.defender.saturating_add(1),
                }
                counts
            })
    }

    fn roster(&self, battle: BattleId) -> Vec<BattleParticipant> {
        let mut roster: Vec<BattleParticipant> = self
            .rosters
            .get(&battle)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        roster.sort_by_key(|p| (p.joined_at, p.player_id));
        roster
    }

    fn upsert(&mut self, participant: BattleParticipant) {
        if participant.is_present() {
            self.player_battle
                .insert(participant.player_id, participant.battle_id);
        } else if self.player_battle.get(&participant.player_id) == Some(&participant.battle_id) {
            self.player_battle.remove(&participant.player_id);
        }
        self.rosters
            .entry(participant.battle_id)
            .or_default()
            .insert(participant.player_id, participant);
    }

    fn evict(&mut self, battle: BattleId) {
        self.battles.remove(&battle);
        if let Some(roster) = self.rosters.remove(&battle) {
            for player in roster.keys() {
                if self.player_battle.get(player) == Some(&battle) {
                    self.player_battle.remove(player);
                }
            }
        }
        debug!(battle_id = %battle, "evicted battle");
    }
}

fn require(battle: &Battle, allowed: &[BattleStatus], action: &'static str) -> Result<(), BattleError> {
    if allowed.contains(&battle.status) {
        Ok(())
    } else {
        Err(BattleError::InvalidTransition {
            battle: battle.id,
            status: battle.status,
            action,
        })
    }
}

/// Owns every live battle and its roster.
pub struct BattleManager {
    store: Arc<dyn Store>,
    wars: Arc<WarManager>,
    clock: Arc<dyn Clock>,
    rules: BattleRules,
    state: RwLock<BattleState>,
}

impl BattleManager {
    /// Create a manager with an empty cache.
    pub fn new(
        store: Arc<dyn Store>,
        wars: Arc<WarManager>,
        clock: Arc<dyn Clock>,
        rules: BattleRules,
    ) -> Self {
        Self {
            store,
            wars,
            clock,
            rules,
            state: RwLock::new(BattleState::default()),
        }
    }

    /// The rules this manager enforces.
    pub const fn rules(&self) -> &BattleRules {
        &self.rules
    }

    /// Replace the cache with the live battles and rosters in `snapshot`.
    pub async fn restore(&self, snapshot: &StoreSnapshot) {
        let mut state = BattleState::default();
        for battle in snapshot.battles.iter().filter(|b| b.status.is_live()) {
            state.battles.insert(battle.id, battle.clone());
        }
        for participant in &snapshot.battle_participants {
            if state.battles.contains_key(&participant.battle_id) {
                state.upsert(participant.clone());
            }
        }
        info!(
            battles = state.battles.len(),
            players = state.player_battle.len(),
            "restored battle cache"
        );
        *self.state.write().await = state;
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Create a battle under an active war.
    pub async fn create_battle(&self, plan: BattlePlan) -> Result<Battle, BattleError> {
        let radius = plan.zone.radius;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(BattleError::InvalidZone(radius));
        }
        let war = self
            .wars
            .get_war(plan.war_id)
            .await?
            .ok_or(WarError::WarNotFound(plan.war_id))?;
        if war.status != WarStatus::Active {
            return Err(BattleError::WarNotActive {
                war: war.id,
                status: war.status,
            });
        }
        let attacker_side = self.war_side(war.id, plan.attacker).await?;
        let defender_side = self.war_side(war.id, plan.defender).await?;
        if attacker_side == defender_side {
            return Err(BattleError::SameSide {
                a: plan.attacker,
                b: plan.defender,
            });
        }

        let mut state = self.state.write().await;
        let now = self.clock.now();
        let status = match plan.scheduled_at {
            Some(at) if at > now => BattleStatus::Scheduled,
            _ => BattleStatus::Preparation,
        };
        let battle = Battle {
            id: BattleId::new(),
            war_id: war.id,
            battle_type: plan.battle_type,
            status,
            region: plan.region,
            attacker_id: plan.attacker,
            defender_id: plan.defender,
            zone: plan.zone,
            created_at: now,
            scheduled_at: plan.scheduled_at,
            started_at: None,
            ended_at: None,
            attacker_kills: 0,
            defender_kills: 0,
            attacker_deaths: 0,
            defender_deaths: 0,
            winner_id: None,
            awarded_score: 0,
        };
        self.store
            .commit(Changeset::new().with_battle(battle.clone()))
            .await?;
        state.battles.insert(battle.id, battle.clone());
        info!(
            battle_id = %battle.id,
            war_id = %war.id,
            battle_type = %battle.battle_type,
            region = %battle.region,
            status = %status,
            "battle created"
        );
        Ok(battle)
    }

    async fn war_side(&self, war: WarId, nation: NationId) -> Result<WarSide, BattleError> {
        self.wars
            .side_of(war, nation)
            .await
            .ok_or(BattleError::NotWarParticipant { war, nation })
    }

    /// Begin fighting.
    pub async fn start_battle(&self, id: BattleId) -> Result<Battle, BattleError> {
        let mut state = self.state.write().await;
        let battle = state.battle(id)?;
        require(
            battle,
            &[BattleStatus::Scheduled, BattleStatus::Preparation],
            "start",
        )?;
        let battle = Battle {
            status: BattleStatus::InProgress,
            started_at: Some(self.clock.now()),
            ..battle.clone()
        };
        self.store
            .commit(Changeset::new().with_battle(battle.clone()))
            .await?;
        state.battles.insert(id, battle.clone());
        info!(battle_id = %id, "battle started");
        Ok(battle)
    }

    /// Call off a live battle without any award.
    pub async fn cancel_battle(&self, id: BattleId) -> Result<Battle, BattleError> {
        let mut state = self.state.write().await;
        let battle = state.battle(id)?.clone();
        let now = self.clock.now();
        let battle = Battle {
            status: BattleStatus::Cancelled,
            ended_at: Some(now),
            awarded_score: 0,
            ..battle
        };
        let roster: Vec<BattleParticipant> = state
            .roster(id)
            .into_iter()
            .map(|p| BattleParticipant {
                left_at: p.left_at.or(Some(now)),
                ..p
            })
            .collect();
        self.store
            .commit(
                Changeset::new()
                    .with_battle(battle.clone())
                    .with_battle_participants(roster),
            )
            .await?;
        state.evict(id);
        info!(battle_id = %id, war_id = %battle.war_id, "battle cancelled");
        Ok(battle)
    }

    /// End a battle in progress. Without a supplied winner the side with
    /// more kills wins; level kills are a draw.
    pub async fn end_battle(
        &self,
        id: BattleId,
        winner: Option<NationId>,
    ) -> Result<Battle, BattleError> {
        let mut state = self.state.write().await;
        let battle = state.battle(id)?;
        let outcome = match winner {
            Some(nation) if nation == battle.attacker_id => BattleOutcome::Winner(WarSide::Attacker),
            Some(nation) if nation == battle.defender_id => BattleOutcome::Winner(WarSide::Defender),
            Some(nation) => return Err(BattleError::InvalidWinner { battle: id, nation }),
            None => BattleOutcome::by_kills(battle),
        };
        self.finish(&mut state, id, outcome).await
    }

    /// End the battle if one side has no active participants left.
    ///
    /// The side still standing wins; if nobody is left it is a draw.
    pub async fn conclude_if_side_empty(&self, id: BattleId) -> Result<Option<Battle>, BattleError> {
        let mut state = self.state.write().await;
        let in_progress = state
            .battles
            .get(&id)
            .is_some_and(|b| b.status == BattleStatus::InProgress);
        if !in_progress {
            return Ok(None);
        }
        let counts = state.counts(id);
        let outcome = match (counts.attacker, counts.defender) {
            (0, 0) => BattleOutcome::Draw,
            (0, _) => BattleOutcome::Winner(WarSide::Defender),
            (_, 0) => BattleOutcome::Winner(WarSide::Attacker),
            _ => return Ok(None),
        };
        debug!(battle_id = %id, ?counts, "side emptied");
        self.finish(&mut state, id, outcome).await.map(Some)
    }

    async fn finish(
        &self,
        state: &mut BattleState,
        id: BattleId,
        outcome: BattleOutcome,
    ) -> Result<Battle, BattleError> {
        let battle = state.battle(id)?;
        require(battle, &[BattleStatus::InProgress], "end")?;
        let battle = Battle {
            status: BattleStatus::Completed,
            ended_at: Some(self.clock.now()),
            winner_id: match outcome {
                BattleOutcome::Winner(side) => Some(battle.nation_on(side)),
                BattleOutcome::Draw => None,
            },
            ..battle.clone()
        };
        let credits = battle_award(&battle, outcome, &self.rules);
        let loser = match outcome {
            BattleOutcome::Winner(side) => Some(side.opposite()),
            BattleOutcome::Draw => None,
        };

        let settled = self
            .wars
            .settle_battle(BattleSettlement {
                battle,
                roster: state.roster(id),
                credits,
                loser,
            })
            .await?;
        state.evict(id);
        info!(
            battle_id = %id,
            winner = ?settled.winner_id,
            attacker_kills = settled.attacker_kills,
            defender_kills = settled.defender_kills,
            awarded = settled.awarded_score,
            "battle ended"
        );
        Ok(settled)
    }

    // -- Roster -------------------------------------------------------------

    /// Put `player` of `nation` on `side` of a battle.
    ///
    /// Rejoining the same battle on the same side after leaving it brings
    /// the player back alive. Joining again while still on the roster
    /// returns the existing row unchanged.
    pub async fn join_battle(
        &self,
        id: BattleId,
        player: PlayerId,
        nation: NationId,
        side: WarSide,
    ) -> Result<BattleParticipant, BattleError> {
        let mut state = self.state.write().await;
        let battle = state.battle(id)?.clone();
        if !battle.status.accepts_participants() {
            return Err(BattleError::InvalidTransition {
                battle: id,
                status: battle.status,
                action: "join",
            });
        }
        if let Some(current) = state.player_battle.get(&player).filter(|b| **b != id) {
            return Err(BattleError::AlreadyInBattle {
                player,
                battle: *current,
            });
        }
        let nation_side = self.war_side(battle.war_id, nation).await?;
        let expected = self.war_side(battle.war_id, battle.nation_on(side)).await?;
        if nation_side != expected {
            return Err(BattleError::WrongSide { nation, side });
        }

        let now = self.clock.now();
        let existing = state.rosters.get(&id).and_then(|r| r.get(&player)).cloned();
        let participant = match existing {
            Some(previous) if previous.side != side => {
                return Err(BattleError::WrongSide { nation, side });
            }
            // Still on the field: nothing changes, a dead player waits for
            // the respawn.
            Some(previous) if previous.left_at.is_none() => return Ok(previous),
            Some(previous) => BattleParticipant {
                joined_at: now,
                left_at: None,
                is_alive: true,
                ..previous
            },
            None => BattleParticipant {
                battle_id: id,
                player_id: player,
                nation_id: nation,
                side,
                joined_at: now,
                left_at: None,
                kills: 0,
                deaths: 0,
                damage_dealt: 0,
                damage_taken: 0,
                is_alive: true,
            },
        };
        self.store
            .commit(Changeset::new().with_battle_participants([participant.clone()]))
            .await?;
        state.upsert(participant.clone());
        info!(battle_id = %id, player = %player, nation = %nation, side = %side, "player joined battle");
        Ok(participant)
    }

    /// Take `player` off the field.
    pub async fn leave_battle(
        &self,
        id: BattleId,
        player: PlayerId,
    ) -> Result<BattleParticipant, BattleError> {
        let mut state = self.state.write().await;
        state.battle(id)?;
        let participant = BattleParticipant {
            left_at: Some(self.clock.now()),
            ..state.present(id, player)?.clone()
        };
        self.store
            .commit(Changeset::new().with_battle_participants([participant.clone()]))
            .await?;
        state.upsert(participant.clone());
        info!(battle_id = %id, player = %player, "player left battle");
        Ok(participant)
    }

    /// Credit `killer` with killing `victim`.
    pub async fn register_kill(
        &self,
        id: BattleId,
        killer: PlayerId,
        victim: PlayerId,
    ) -> Result<Battle, BattleError> {
        let mut state = self.state.write().await;
        let mut battle = state.battle(id)?.clone();
        require(&battle, &[BattleStatus::InProgress], "register a kill in")?;
        let mut killer_row = state.present(id, killer)?.clone();
        let mut victim_row = state.present(id, victim)?.clone();
        if killer_row.side == victim_row.side {
            return Err(BattleError::SameSideKill { killer, victim });
        }
        if !victim_row.is_alive {
            return Err(BattleError::VictimAlreadyDead(victim));
        }

        killer_row.kills = killer_row.kills.saturating_add(1);
        victim_row.deaths = victim_row.deaths.saturating_add(1);
        victim_row.is_alive = false;
        match killer_row.side {
            WarSide::Attacker => {
                battle.attacker_kills = battle.attacker_kills.saturating_add(1);
                battle.defender_deaths = battle.defender_deaths.saturating_add(1);
            }
            WarSide::Defender => {
                battle.defender_kills = battle.defender_kills.saturating_add(1);
                battle.attacker_deaths = battle.attacker_deaths.saturating_add(1);
            }
        }

        self.store
            .commit(
                Changeset::new()
                    .with_battle(battle.clone())
                    .with_battle_participants([killer_row.clone(), victim_row.clone()]),
            )
            .await?;
        state.battles.insert(id, battle.clone());
        state.upsert(killer_row);
        state.upsert(victim_row);
        debug!(battle_id = %id, killer = %killer, victim = %victim, "kill registered");
        Ok(battle)
    }

    /// Add `amount` to the damage dealt by `attacker` and taken by `victim`.
    pub async fn record_damage(
        &self,
        id: BattleId,
        attacker: PlayerId,
        victim: PlayerId,
        amount: u64,
    ) -> Result<(), BattleError> {
        let mut state = self.state.write().await;
        require(state.battle(id)?, &[BattleStatus::InProgress], "record damage in")?;
        let mut dealer = state.present(id, attacker)?.clone();
        let mut taker = state.present(id, victim)?.clone();
        if attacker == victim {
            dealer.damage_taken = dealer.damage_taken.saturating_add(amount);
            taker = dealer.clone();
        } else {
            dealer.damage_dealt = dealer.damage_dealt.saturating_add(amount);
            taker.damage_taken = taker.damage_taken.saturating_add(amount);
        }
        self.store
            .commit(Changeset::new().with_battle_participants([dealer.clone(), taker.clone()]))
            .await?;
        state.upsert(dealer);
        state.upsert(taker);
        Ok(())
    }

    /// Bring a dead participant back to life.
    pub async fn respawn_player(
        &self,
        id: BattleId,
        player: PlayerId,
    ) -> Result<BattleParticipant, BattleError> {
        let mut state = self.state.write().await;
        state.battle(id)?;
        let participant = BattleParticipant {
            is_alive: true,
            ..state.present(id, player)?.clone()
        };
        self.store
            .commit(Changeset::new().with_battle_participants([participant.clone()]))
            .await?;
        state.upsert(participant.clone());
        debug!(battle_id = %id, player = %player, "player respawned");
        Ok(participant)
    }

    // -- Queries --------------------------------------------------------------

    /// A live battle.
    pub async fn get_battle(&self, id: BattleId) -> Option<Battle> {
        self.state.read().await.battles.get(&id).cloned()
    }

    /// The live battle whose zone contains `position`; the oldest wins if
    /// zones overlap.
    pub async fn get_battle_at(&self, position: &Position) -> Option<Battle> {
        self.state
            .read()
            .await
            .battles
            .values()
            .filter(|b| b.zone.contains(position))
            .min_by_key(|b| (b.created_at, b.id))
            .cloned()
    }

    /// Whether `player` is present in any live battle.
    pub async fn is_in_battle(&self, player: PlayerId) -> bool {
        self.state.read().await.player_battle.contains_key(&player)
    }

    /// The live battle `player` is present in.
    pub async fn battle_of(&self, player: PlayerId) -> Option<BattleId> {
        self.state.read().await.player_battle.get(&player).copied()
    }

    /// A roster entry, present or not.
    pub async fn participant(&self, id: BattleId, player: PlayerId) -> Option<BattleParticipant> {
        self.state
            .read()
            .await
            .rosters
            .get(&id)
            .and_then(|r| r.get(&player))
            .cloned()
    }

    /// A battle's full roster, in join order.
    pub async fn roster(&self, id: BattleId) -> Vec<BattleParticipant> {
        self.state.read().await.roster(id)
    }

    /// Present, living participants per side.
    pub async fn count_active_participants(&self, id: BattleId) -> SideCounts {
        self.state.read().await.counts(id)
    }

    /// Every live battle, oldest first.
    pub async fn live_battles(&self) -> Vec<Battle> {
        let mut battles: Vec<Battle> = self.state.read().await.battles.values().cloned().collect();
        battles.sort_by_key(|b| (b.created_at, b.id));
        battles
    }

    // -- Tick helpers -----------------------------------------------------------

    /// Scheduled battles whose start time has passed.
    pub async fn battles_due_to_start(&self) -> Vec<BattleId> {
        let now = self.clock.now();
        self.live_battles()
            .await
            .into_iter()
            .filter(|b| {
                b.status == BattleStatus::Scheduled && b.scheduled_at.is_none_or(|at| at <= now)
            })
            .map(|b| b.id)
            .collect()
    }

    /// Live battles whose war is no longer live.
    pub async fn orphaned_battles(&self) -> Vec<BattleId> {
        let live_wars: Vec<WarId> = self.wars.live_wars().await.iter().map(|w| w.id).collect();
        self.live_battles()
            .await
            .into_iter()
            .filter(|b| !live_wars.contains(&b.war_id))
            .map(|b| b.id)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;
    use conquest_store::MemoryStore;
    use conquest_types::{GovernmentType, WarEventType, WarGoal};
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::WarRules;
    use crate::directory::{NationProfile, StaticDirectory};

    struct Fixture {
        battles: BattleManager,
        wars: Arc<WarManager>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        a: NationId,
        b: NationId,
        ally: NationId,
        war: WarId,
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

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::default());
        let a = nation(&directory, "Avalon");
        let b = nation(&directory, "Brython");
        let ally = nation(&directory, "Cymru");
        let wars = Arc::new(WarManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            directory,
            Arc::clone(&clock) as Arc<dyn Clock>,
            WarRules::default(),
        ));
        let war = wars
            .declare_war(a, b, WarGoal::Conquest, "border")
            .await
            .unwrap();
        wars.start_war(war.id).await.unwrap();
        wars.join_war(war.id, ally, WarSide::Defender).await.unwrap();
        let battles = BattleManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&wars),
            Arc::clone(&clock) as Arc<dyn Clock>,
            BattleRules::default(),
        );
        Fixture {
            battles,
            wars,
            store,
            clock,
            a,
            b,
            ally,
            war: war.id,
        }
    }

    fn plan(f: &Fixture, battle_type: BattleType) -> BattlePlan {
        BattlePlan {
            war_id: f.war,
            battle_type,
            region: "riverlands".to_owned(),
            attacker: f.a,
            defender: f.b,
            zone: BattleZone {
                center: Position::new("world", 0.0, 64.0, 0.0),
                radius: 50.0,
            },
            scheduled_at: None,
        }
    }

    /// A battle in progress with one player per side.
    async fn skirmish(f: &Fixture) -> (BattleId, PlayerId, PlayerId) {
        let battle = f.battles.create_battle(plan(f, BattleType::Skirmish)).await.unwrap();
        let attacker = PlayerId::new();
        let defender = PlayerId::new();
        f.battles
            .join_battle(battle.id, attacker, f.a, WarSide::Attacker)
            .await
            .unwrap();
        f.battles
            .join_battle(battle.id, defender, f.b, WarSide::Defender)
            .await
            .unwrap();
        f.battles.start_battle(battle.id).await.unwrap();
        (battle.id, attacker, defender)
    }

    #[test]
    fn award_for_winner_and_draw() {
        let rules = BattleRules::default();
        let battle = Battle {
            id: BattleId::new(),
            war_id: WarId::new(),
            battle_type: BattleType::FieldBattle,
            status: BattleStatus::InProgress,
            region: "r".to_owned(),
            attacker_id: NationId::new(),
            defender_id: NationId::new(),
            zone: BattleZone {
                center: Position::new("world", 0.0, 0.0, 0.0),
                radius: 1.0,
            },
            created_at: Utc::now(),
            scheduled_at: None,
            started_at: None,
            ended_at: None,
            attacker_kills: 1,
            defender_kills: 4,
            attacker_deaths: 4,
            defender_deaths: 1,
            winner_id: None,
            awarded_score: 0,
        };
        assert_eq!(
            battle_award(&battle, BattleOutcome::Winner(WarSide::Defender), &rules),
            vec![(WarSide::Defender, 30 + 15 + 50)]
        );
        // A supplied winner with fewer kills earns no margin.
        assert_eq!(
            battle_award(&battle, BattleOutcome::Winner(WarSide::Attacker), &rules),
            vec![(WarSide::Attacker, 80)]
        );
        assert_eq!(
            battle_award(&battle, BattleOutcome::Draw, &rules),
            vec![(WarSide::Attacker, 15), (WarSide::Defender, 15)]
        );
    }

    #[tokio::test]
    async fn skirmish_awards_kill_margin_to_war() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;

        f.battles.register_kill(battle, attacker, defender).await.unwrap();
        f.battles.respawn_player(battle, defender).await.unwrap();
        f.battles.register_kill(battle, attacker, defender).await.unwrap();

        let ended = f.battles.end_battle(battle, None).await.unwrap();
        assert_eq!(ended.winner_id, Some(f.a));
        assert_eq!(ended.awarded_score, 70);

        let war = f.wars.get_war(f.war).await.unwrap().unwrap();
        assert_eq!(war.attacker_score, 70);
        assert_eq!(war.defender_weariness, 5);
        assert!(f.wars.audit().await.is_empty());

        let attackers = f
            .wars
            .participants(f.war)
            .await
            .into_iter()
            .find(|p| p.nation_id == f.a)
            .unwrap();
        assert_eq!(attackers.contribution, 2);

        let stored = f.store.find_battle(battle).await.unwrap();
        assert_eq!(stored.status, BattleStatus::Completed);
        assert!(!f.battles.is_in_battle(attacker).await);
    }

    #[tokio::test]
    async fn second_end_never_double_awards() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;
        f.battles.register_kill(battle, attacker, defender).await.unwrap();
        f.battles.end_battle(battle, None).await.unwrap();

        let result = f.battles.end_battle(battle, None).await;
        assert!(matches!(result, Err(BattleError::BattleNotFound(_))));
        let war = f.wars.get_war(f.war).await.unwrap().unwrap();
        assert_eq!(war.attacker_score, 10 + 5 + 50);
    }

    #[tokio::test]
    async fn level_kills_draw_credits_both_sides() {
        let f = fixture().await;
        let (battle, _, _) = skirmish(&f).await;
        let ended = f.battles.end_battle(battle, None).await.unwrap();
        assert_eq!(ended.winner_id, None);

        let war = f.wars.get_war(f.war).await.unwrap().unwrap();
        assert_eq!(war.attacker_score, 5);
        assert_eq!(war.defender_score, 5);
        assert_eq!(war.attacker_weariness, 0);
        let drawn = f
            .wars
            .war_history(f.war)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.event_type == WarEventType::BattleDrawn)
            .count();
        assert_eq!(drawn, 2);
    }

    #[tokio::test]
    async fn counter_attack_credits_war_defender() {
        let f = fixture().await;
        let battle = f
            .battles
            .create_battle(BattlePlan {
                attacker: f.ally,
                defender: f.a,
                ..plan(&f, BattleType::Raid)
            })
            .await
            .unwrap();
        let raider = PlayerId::new();
        f.battles
            .join_battle(battle.id, raider, f.b, WarSide::Attacker)
            .await
            .unwrap();
        f.battles.start_battle(battle.id).await.unwrap();

        let ended = f.battles.end_battle(battle.id, Some(f.ally)).await.unwrap();
        assert_eq!(ended.awarded_score, 70);
        let war = f.wars.get_war(f.war).await.unwrap().unwrap();
        assert_eq!(war.defender_score, 70);
        assert_eq!(war.attacker_weariness, 5);
    }

    #[tokio::test]
    async fn creation_validates_war_and_sides() {
        let f = fixture().await;
        let result = f
            .battles
            .create_battle(BattlePlan {
                defender: f.a,
                ..plan(&f, BattleType::Skirmish)
            })
            .await;
        assert!(matches!(result, Err(BattleError::SameSide { .. })));

        let outsider = NationId::new();
        let result = f
            .battles
            .create_battle(BattlePlan {
                defender: outsider,
                ..plan(&f, BattleType::Skirmish)
            })
            .await;
        assert!(matches!(result, Err(BattleError::NotWarParticipant { .. })));

        let mut bad_zone = plan(&f, BattleType::Skirmish);
        bad_zone.zone.radius = 0.0;
        let result = f.battles.create_battle(bad_zone).await;
        assert!(matches!(result, Err(BattleError::InvalidZone(_))));

        f.wars.declare_ceasefire(f.war, 6).await.unwrap();
        let result = f.battles.create_battle(plan(&f, BattleType::Skirmish)).await;
        assert!(matches!(
            result,
            Err(BattleError::WarNotActive {
                status: WarStatus::Ceasefire,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn scheduled_battle_waits_for_its_time() {
        let f = fixture().await;
        let at = f.clock.now().checked_add_signed(TimeDelta::hours(1)).unwrap();
        let battle = f
            .battles
            .create_battle(BattlePlan {
                scheduled_at: Some(at),
                ..plan(&f, BattleType::FieldBattle)
            })
            .await
            .unwrap();
        assert_eq!(battle.status, BattleStatus::Scheduled);
        let result = f
            .battles
            .join_battle(battle.id, PlayerId::new(), f.a, WarSide::Attacker)
            .await;
        assert!(matches!(result, Err(BattleError::InvalidTransition { .. })));

        assert!(f.battles.battles_due_to_start().await.is_empty());
        f.clock.advance(TimeDelta::hours(1));
        assert_eq!(f.battles.battles_due_to_start().await, vec![battle.id]);
    }

    #[tokio::test]
    async fn roster_rules() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;

        let result = f
            .battles
            .join_battle(battle, PlayerId::new(), f.a, WarSide::Defender)
            .await;
        assert!(matches!(result, Err(BattleError::WrongSide { .. })));

        let other = f.battles.create_battle(plan(&f, BattleType::Raid)).await.unwrap();
        let result = f
            .battles
            .join_battle(other.id, attacker, f.a, WarSide::Attacker)
            .await;
        assert!(matches!(result, Err(BattleError::AlreadyInBattle { .. })));

        let ally_player = PlayerId::new();
        f.battles
            .join_battle(battle, ally_player, f.ally, WarSide::Defender)
            .await
            .unwrap();
        let result = f.battles.register_kill(battle, defender, ally_player).await;
        assert!(matches!(result, Err(BattleError::SameSideKill { .. })));

        f.battles.register_kill(battle, attacker, defender).await.unwrap();
        let result = f.battles.register_kill(battle, attacker, defender).await;
        assert!(matches!(result, Err(BattleError::VictimAlreadyDead(_))));

        let counts = f.battles.count_active_participants(battle).await;
        assert_eq!(counts, SideCounts { attacker: 1, defender: 1 });
    }

    #[tokio::test]
    async fn rejoin_revives_player() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;
        f.battles.register_kill(battle, attacker, defender).await.unwrap();
        f.battles.leave_battle(battle, defender).await.unwrap();
        assert!(!f.battles.is_in_battle(defender).await);

        let back = f
            .battles
            .join_battle(battle, defender, f.b, WarSide::Defender)
            .await
            .unwrap();
        assert!(back.is_alive);
        assert_eq!(back.deaths, 1);
        assert_eq!(f.battles.battle_of(defender).await, Some(battle));
    }

    #[tokio::test]
    async fn join_while_present_keeps_the_row() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;
        f.battles.register_kill(battle, attacker, defender).await.unwrap();
        let before = f.battles.participant(battle, defender).await.unwrap();

        let again = f
            .battles
            .join_battle(battle, defender, f.b, WarSide::Defender)
            .await
            .unwrap();
        assert_eq!(again, before);
        assert!(!again.is_alive);

        let revived = f.battles.respawn_player(battle, defender).await.unwrap();
        assert!(revived.is_alive);
    }

    #[tokio::test]
    async fn empty_side_concludes_battle() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;
        assert!(f.battles.conclude_if_side_empty(battle).await.unwrap().is_none());

        f.battles.record_damage(battle, attacker, defender, 12).await.unwrap();
        f.battles.leave_battle(battle, defender).await.unwrap();
        let ended = f.battles.conclude_if_side_empty(battle).await.unwrap().unwrap();
        assert_eq!(ended.winner_id, Some(f.a));
        assert_eq!(ended.awarded_score, 60);
    }

    #[tokio::test]
    async fn position_lookup_and_orphans() {
        let f = fixture().await;
        let battle = f.battles.create_battle(plan(&f, BattleType::Skirmish)).await.unwrap();
        let inside = Position::new("world", 10.0, 64.0, 10.0);
        let outside = Position::new("world", 100.0, 64.0, 0.0);
        assert_eq!(f.battles.get_battle_at(&inside).await.map(|b| b.id), Some(battle.id));
        assert!(f.battles.get_battle_at(&outside).await.is_none());

        assert!(f.battles.orphaned_battles().await.is_empty());
        f.wars.surrender(f.war, f.b).await.unwrap();
        assert_eq!(f.battles.orphaned_battles().await, vec![battle.id]);
        let cancelled = f.battles.cancel_battle(battle.id).await.unwrap();
        assert_eq!(cancelled.status, BattleStatus::Cancelled);
        assert!(f.battles.live_battles().await.is_empty());
    }

    #[tokio::test]
    async fn failed_settlement_keeps_battle_live() {
        let f = fixture().await;
        let (battle, attacker, defender) = skirmish(&f).await;
        f.battles.register_kill(battle, attacker, defender).await.unwrap();

        f.store.fail_next_commit();
        let result = f.battles.end_battle(battle, None).await;
        assert!(matches!(result, Err(BattleError::War(WarError::Store(_)))));
        let live = f.battles.get_battle(battle).await.unwrap();
        assert_eq!(live.status, BattleStatus::InProgress);
        let war = f.wars.get_war(f.war).await.unwrap().unwrap();
        assert_eq!(war.attacker_score, 0);

        let ended = f.battles.end_battle(battle, None).await.unwrap();
        assert_eq!(ended.awarded_score, 65);
    }
}
