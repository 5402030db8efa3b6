//! In-memory transactional store.
//!
//! Used by tests and the demo host. Commits are applied to a copy of the
//! tables, checked against the same uniqueness rules the `PostgreSQL`
//! schema enforces, and swapped in only when every check passes.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::BoxFuture;
use tokio::sync::Mutex;

use conquest_types::{
    Battle, BattleId, BattleParticipant, CandidateId, Election, ElectionCandidate, ElectionId,
    ElectionVote, NationId, NationRelation, PlayerId, RelationKind, Siege, War, WarEvent,
    WarEventId, WarId, WarParticipant,
};

use crate::changeset::{Changeset, StoreSnapshot};
use crate::constraints;
use crate::error::StoreError;
use crate::Store;

#[derive(Debug, Clone, Default)]
struct Tables {
    wars: BTreeMap<WarId, War>,
    war_participants: BTreeMap<(WarId, NationId), WarParticipant>,
    war_events: Vec<WarEvent>,
    war_event_ids: BTreeSet<WarEventId>,
    battles: BTreeMap<BattleId, Battle>,
    battle_participants: BTreeMap<(BattleId, PlayerId), BattleParticipant>,
    sieges: BTreeMap<BattleId, Siege>,
    relations: BTreeMap<(NationId, NationId, RelationKind), NationRelation>,
    elections: BTreeMap<ElectionId, Election>,
    candidates: BTreeMap<CandidateId, ElectionCandidate>,
    votes: BTreeMap<(ElectionId, PlayerId), ElectionVote>,
}

/// A [`Store`] that keeps every table in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_next: AtomicBool,
    commits: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with [`StoreError::Unavailable`].
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Look up a battle in any status.
    pub async fn find_battle(&self, id: BattleId) -> Option<Battle> {
        self.tables.lock().await.battles.get(&id).cloned()
    }

    /// Look up an election in any status.
    pub async fn find_election(&self, id: ElectionId) -> Option<Election> {
        self.tables.lock().await.elections.get(&id).cloned()
    }

    /// Every participant row of a war.
    pub async fn war_participants(&self, id: WarId) -> Vec<WarParticipant> {
        self.tables
            .lock()
            .await
            .war_participants
            .values()
            .filter(|p| p.war_id == id)
            .cloned()
            .collect()
    }

    async fn apply(&self, changes: Changeset) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_owned()));
        }

        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        apply_changes(&mut next, changes)?;
        check_unique(&next)?;
        *tables = next;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.lock().await;

        let wars: Vec<War> = tables
            .wars
            .values()
            .filter(|w| !w.status.is_terminal())
            .cloned()
            .collect();
        let open_wars: HashSet<WarId> = wars.iter().map(|w| w.id).collect();

        let battles: Vec<Battle> = tables
            .battles
            .values()
            .filter(|b| b.status.is_live())
            .cloned()
            .collect();
        let live_battles: HashSet<BattleId> = battles.iter().map(|b| b.id).collect();

        let elections: Vec<Election> = tables
            .elections
            .values()
            .filter(|e| e.status.is_live())
            .cloned()
            .collect();
        let live_elections: HashSet<ElectionId> = elections.iter().map(|e| e.id).collect();

        let mut candidates: Vec<ElectionCandidate> = tables
            .candidates
            .values()
            .filter(|c| live_elections.contains(&c.election_id))
            .cloned()
            .collect();
        candidates.sort_by_key(|c| (c.registered_at, c.id));

        StoreSnapshot {
            war_participants: tables
                .war_participants
                .values()
                .filter(|p| open_wars.contains(&p.war_id))
                .cloned()
                .collect(),
            war_events: tables
                .war_events
                .iter()
                .filter(|e| open_wars.contains(&e.war_id))
                .cloned()
                .collect(),
            battle_participants: tables
                .battle_participants
                .values()
                .filter(|p| live_battles.contains(&p.battle_id))
                .cloned()
                .collect(),
            sieges: tables
                .sieges
                .values()
                .filter(|s| live_battles.contains(&s.battle_id))
                .cloned()
                .collect(),
            relations: tables.relations.values().cloned().collect(),
            votes: tables
                .votes
                .values()
                .filter(|v| live_elections.contains(&v.election_id))
                .cloned()
                .collect(),
            wars,
            battles,
            elections,
            candidates,
        }
    }
}

fn apply_changes(tables: &mut Tables, changes: Changeset) -> Result<(), StoreError> {
    for battle in &changes.removed_sieges {
        tables.sieges.remove(battle);
    }
    for removal in &changes.removed_relations {
        tables.relations.retain(|_, r| !removal.matches(r));
    }

    for war in changes.wars {
        tables.wars.insert(war.id, war);
    }
    for participant in changes.war_participants {
        tables
            .war_participants
            .insert((participant.war_id, participant.nation_id), participant);
    }
    for event in changes.war_events {
        if !tables.war_event_ids.insert(event.id) {
            return Err(conflict(constraints::WAR_EVENTS_ID));
        }
        tables.war_events.push(event);
    }
    for battle in changes.battles {
        tables.battles.insert(battle.id, battle);
    }
    for participant in changes.battle_participants {
        tables
            .battle_participants
            .insert((participant.battle_id, participant.player_id), participant);
    }
    for siege in changes.sieges {
        tables.sieges.insert(siege.battle_id, siege);
    }
    for relation in changes.relations {
        tables.relations.insert(
            (relation.nation_id, relation.other_id, relation.kind),
            relation,
        );
    }
    for election in changes.elections {
        tables.elections.insert(election.id, election);
    }
    for candidate in changes.candidates {
        tables.candidates.insert(candidate.id, candidate);
    }
    for vote in changes.votes {
        let key = (vote.election_id, vote.voter_id);
        if tables.votes.contains_key(&key) {
            return Err(conflict(constraints::VOTES_ELECTION_VOTER));
        }
        tables.votes.insert(key, vote);
    }
    Ok(())
}

fn check_unique(tables: &Tables) -> Result<(), StoreError> {
    let mut open_pairs = HashSet::new();
    for war in tables.wars.values().filter(|w| !w.status.is_terminal()) {
        let pair = if war.attacker_id <= war.defender_id {
            (war.attacker_id, war.defender_id)
        } else {
            (war.defender_id, war.attacker_id)
        };
        if !open_pairs.insert(pair) {
            return Err(conflict(constraints::WARS_OPEN_PAIR));
        }
    }

    let mut live_nations = HashSet::new();
    for election in tables.elections.values().filter(|e| e.status.is_live()) {
        if !live_nations.insert(election.nation_id) {
            return Err(conflict(constraints::ELECTIONS_LIVE_NATION));
        }
    }

    let mut registrations = HashSet::new();
    for candidate in tables.candidates.values() {
        if !registrations.insert((candidate.election_id, candidate.player_id)) {
            return Err(conflict(constraints::CANDIDATES_ELECTION_PLAYER));
        }
    }
    Ok(())
}

fn conflict(constraint: &str) -> StoreError {
    StoreError::Conflict {
        constraint: constraint.to_owned(),
    }
}

impl Store for MemoryStore {
    fn commit(&self, changes: Changeset) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.apply(changes))
    }

    fn load_snapshot(&self) -> BoxFuture<'_, Result<StoreSnapshot, StoreError>> {
        Box::pin(async move { Ok(self.snapshot().await) })
    }

    fn find_war(&self, id: WarId) -> BoxFuture<'_, Result<Option<War>, StoreError>> {
        Box::pin(async move { Ok(self.tables.lock().await.wars.get(&id).cloned()) })
    }

    fn war_events(&self, id: WarId) -> BoxFuture<'_, Result<Vec<WarEvent>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .await
                .war_events
                .iter()
                .filter(|e| e.war_id == id)
                .cloned()
                .collect())
        })
    }

    fn election_votes(
        &self,
        id: ElectionId,
    ) -> BoxFuture<'_, Result<Vec<ElectionVote>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .tables
                .lock()
                .await
                .votes
                .values()
                .filter(|v| v.election_id == id)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};
    use conquest_types::{ElectionPosition, ElectionStatus, WarGoal, WarStatus};

    use super::*;

    fn war(attacker: NationId, defender: NationId, status: WarStatus) -> War {
        let now = Utc::now();
        War {
            id: WarId::new(),
            attacker_id: attacker,
            defender_id: defender,
            status,
            goal: WarGoal::Conquest,
            reason: "claims".to_owned(),
            declared_at: now,
            starts_at: now,
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
        }
    }

    fn election(nation: NationId, status: ElectionStatus) -> Election {
        let now = Utc::now();
        Election {
            id: ElectionId::new(),
            nation_id: nation,
            status,
            position: ElectionPosition::Leader,
            started_at: now,
            registration_ends_at: now,
            voting_ends_at: now,
            ended_at: None,
            winner_id: None,
            total_votes: 0,
        }
    }

    #[tokio::test]
    async fn commit_then_find() {
        let store = MemoryStore::new();
        let w = war(NationId::new(), NationId::new(), WarStatus::Declared);
        let result = store.commit(Changeset::new().with_war(w.clone())).await;
        assert!(result.is_ok());
        assert_eq!(store.commit_count(), 1);

        let found = store.find_war(w.id).await.ok().flatten();
        assert_eq!(found, Some(w));
    }

    #[tokio::test]
    async fn second_open_war_for_pair_conflicts() {
        let store = MemoryStore::new();
        let a = NationId::new();
        let b = NationId::new();
        let first = store
            .commit(Changeset::new().with_war(war(a, b, WarStatus::Active)))
            .await;
        assert!(first.is_ok());

        // Reversed roles are the same unordered pair.
        let second = store
            .commit(Changeset::new().with_war(war(b, a, WarStatus::Declared)))
            .await;
        assert!(matches!(second, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn ended_war_frees_the_pair() {
        let store = MemoryStore::new();
        let a = NationId::new();
        let b = NationId::new();
        let _ = store
            .commit(Changeset::new().with_war(war(a, b, WarStatus::Ended)))
            .await;
        let result = store
            .commit(Changeset::new().with_war(war(a, b, WarStatus::Declared)))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        let a = NationId::new();
        let b = NationId::new();
        let _ = store
            .commit(Changeset::new().with_war(war(a, b, WarStatus::Active)))
            .await;

        // The first war in the set is fine; the second conflicts with it.
        let fresh = war(NationId::new(), NationId::new(), WarStatus::Active);
        let changes = Changeset::new()
            .with_war(fresh.clone())
            .with_war(war(a, b, WarStatus::Active));
        let result = store.commit(changes).await;
        assert!(result.is_err());
        assert_eq!(store.find_war(fresh.id).await.ok().flatten(), None);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let store = MemoryStore::new();
        store.fail_next_commit();
        let w = war(NationId::new(), NationId::new(), WarStatus::Declared);
        let first = store.commit(Changeset::new().with_war(w.clone())).await;
        assert!(matches!(first, Err(StoreError::Unavailable(_))));
        let second = store.commit(Changeset::new().with_war(w)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn duplicate_vote_conflicts() {
        let store = MemoryStore::new();
        let vote = ElectionVote {
            election_id: ElectionId::new(),
            voter_id: PlayerId::new(),
            candidate_id: CandidateId::new(),
            cast_at: Utc::now(),
        };
        let first = store.commit(Changeset::new().with_vote(vote.clone())).await;
        assert!(first.is_ok());
        let second = store.commit(Changeset::new().with_vote(vote)).await;
        assert!(second.is_err_and(|e| e.is_conflict()));
    }

    #[tokio::test]
    async fn one_live_election_per_nation() {
        let store = MemoryStore::new();
        let nation = NationId::new();
        let _ = store
            .commit(Changeset::new().with_election(election(nation, ElectionStatus::Voting)))
            .await;
        let result = store
            .commit(Changeset::new().with_election(election(nation, ElectionStatus::Registration)))
            .await;
        assert!(result.is_err_and(|e| e.is_conflict()));
    }

    #[tokio::test]
    async fn snapshot_excludes_terminal_rows() {
        let store = MemoryStore::new();
        let open = war(NationId::new(), NationId::new(), WarStatus::Active);
        let closed = war(NationId::new(), NationId::new(), WarStatus::Surrendered);
        let _ = store
            .commit(
                Changeset::new()
                    .with_war(open.clone())
                    .with_war(closed)
                    .with_election(election(NationId::new(), ElectionStatus::Completed)),
            )
            .await;

        let snapshot = store.load_snapshot().await.unwrap_or_default();
        assert_eq!(snapshot.wars, vec![open]);
        assert!(snapshot.elections.is_empty());
    }

    #[tokio::test]
    async fn removals_apply_before_upserts() {
        let store = MemoryStore::new();
        let a = NationId::new();
        let b = NationId::new();
        let now = Utc::now();
        let relation = |nation_id, other_id, kind| NationRelation {
            nation_id,
            other_id,
            kind,
            established_at: now,
            expires_at: Some(now + TimeDelta::days(1)),
        };
        let _ = store
            .commit(Changeset::new().with_relations([relation(a, b, RelationKind::Truce)]))
            .await;

        let replaced = relation(a, b, RelationKind::Truce);
        let result = store
            .commit(
                Changeset::new()
                    .without_relations(a, b, &[RelationKind::Truce])
                    .with_relations([replaced.clone()]),
            )
            .await;
        assert!(result.is_ok());
        let snapshot = store.load_snapshot().await.unwrap_or_default();
        assert_eq!(snapshot.relations, vec![replaced]);
    }
}
