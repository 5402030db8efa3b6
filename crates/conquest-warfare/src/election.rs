//! Election cycle manager.
//!
//! ```text
//! REGISTRATION --enough candidates--> VOTING --> COUNTING --> COMPLETED
//!      |                                            |
//!      +--too few candidates--> CANCELLED <--no votes+
//! ```
//!
//! Phase changes are driven by [`ElectionManager::advance`] on each tick.
//! A nation has at most one live election; the store's uniqueness
//! constraints back up the cache for elections, candidacies, and votes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use conquest_store::{Changeset, Store, StoreSnapshot};
use conquest_types::{
    CandidateId, Election, ElectionCandidate, ElectionId, ElectionPosition, ElectionStatus,
    ElectionVote, NationId, PlayerId,
};

use crate::clock::{self, Clock};
use crate::config::ElectionRules;
use crate::directory::NationDirectory;
use crate::error::{CandidacyError, ElectionError, VoteError};

/// A phase change made by [`ElectionManager::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionTransition {
    /// The election.
    pub election: ElectionId,
    /// Its nation.
    pub nation: NationId,
    /// Status before.
    pub from: ElectionStatus,
    /// Status after.
    pub to: ElectionStatus,
}

/// Result of one [`ElectionManager::advance`] sweep.
#[derive(Debug, Default)]
pub struct ElectionAdvance {
    /// Phase changes that were committed.
    pub transitions: Vec<ElectionTransition>,
    /// Elections that could not advance this time.
    pub failures: Vec<(ElectionId, ElectionError)>,
}

/// Pick the winner among `candidates`: most votes, then earliest
/// registration, then lowest candidate ID. Withdrawn candidates never win.
pub fn leading_candidate(candidates: &[ElectionCandidate]) -> Option<&ElectionCandidate> {
    candidates
        .iter()
        .filter(|c| !c.withdrawn)
        .min_by(|a, b| {
            b.vote_count
                .cmp(&a.vote_count)
                .then(a.registered_at.cmp(&b.registered_at))
                .then(a.id.cmp(&b.id))
        })
}

#[derive(Debug, Default)]
struct ElectionState {
    elections: HashMap<ElectionId, Election>,
    by_nation: HashMap<NationId, ElectionId>,
    candidates: HashMap<ElectionId, Vec<ElectionCandidate>>,
    voters: HashMap<ElectionId, HashSet<PlayerId>>,
}

impl ElectionState {
    fn live(&self, nation: NationId) -> Option<&Election> {
        self.by_nation
            .get(&nation)
            .and_then(|id| self.elections.get(id))
    }

    fn candidate(&self, election: ElectionId, player: PlayerId) -> Option<&ElectionCandidate> {
        self.candidates
            .get(&election)?
            .iter()
            .find(|c| c.player_id == player)
    }

    fn candidates(&self, election: ElectionId) -> &[ElectionCandidate] {
        self.candidates.get(&election).map_or(&[], Vec::as_slice)
    }

    fn upsert_candidate(&mut self, candidate: ElectionCandidate) {
        let roster = self.candidates.entry(candidate.election_id).or_default();
        match roster.iter_mut().find(|c| c.id == candidate.id) {
            Some(existing) => *existing = candidate,
            None => roster.push(candidate),
        }
    }

    fn put(&mut self, election: Election) {
        if election.status.is_live() {
            self.by_nation.insert(election.nation_id, election.id);
            self.elections.insert(election.id, election);
        } else {
            self.by_nation.remove(&election.nation_id);
            self.elections.remove(&election.id);
            self.candidates.remove(&election.id);
            self.voters.remove(&election.id);
            debug!(election_id = %election.id, "evicted election");
        }
    }
}

/// Owns every live election.
pub struct ElectionManager {
    store: Arc<dyn Store>,
    directory: Arc<dyn NationDirectory>,
    clock: Arc<dyn Clock>,
    rules: ElectionRules,
    state: RwLock<ElectionState>,
}

impl ElectionManager {
    /// Create a manager with an empty cache.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn NationDirectory>,
        clock: Arc<dyn Clock>,
        rules: ElectionRules,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            rules,
            state: RwLock::new(ElectionState::default()),
        }
    }

    /// Replace the cache with the live elections in `snapshot`.
    pub async fn restore(&self, snapshot: &StoreSnapshot) {
        let mut state = ElectionState::default();
        for election in snapshot.elections.iter().filter(|e| e.status.is_live()) {
            state.put(election.clone());
        }
        for candidate in &snapshot.candidates {
            if state.elections.contains_key(&candidate.election_id) {
                state.upsert_candidate(candidate.clone());
            }
        }
        for vote in &snapshot.votes {
            if state.elections.contains_key(&vote.election_id) {
                state
                    .voters
                    .entry(vote.election_id)
                    .or_default()
                    .insert(vote.voter_id);
            }
        }
        info!(elections = state.elections.len(), "restored election cache");
        *self.state.write().await = state;
    }

    /// Call an election in `nation` for `position`.
    pub async fn start_election(
        &self,
        nation: NationId,
        position: ElectionPosition,
    ) -> Result<Election, ElectionError> {
        let profile = self
            .directory
            .profile(nation)
            .ok_or(ElectionError::UnknownNation(nation))?;
        if !profile.government.has_elections() {
            return Err(ElectionError::NoElectoralGovernment(nation));
        }
        let mut state = self.state.write().await;
        if let Some(live) = state.live(nation) {
            return Err(ElectionError::ElectionAlreadyLive {
                nation,
                election: live.id,
            });
        }

        let now = self.clock.now();
        let registration_ends_at = clock::after(now, self.rules.registration_period());
        let election = Election {
            id: ElectionId::new(),
            nation_id: nation,
            status: ElectionStatus::Registration,
            position,
            started_at: now,
            registration_ends_at,
            voting_ends_at: clock::after(registration_ends_at, self.rules.voting_period()),
            ended_at: None,
            winner_id: None,
            total_votes: 0,
        };
        self.store
            .commit(Changeset::new().with_election(election.clone()))
            .await?;
        state.put(election.clone());
        info!(
            election_id = %election.id,
            nation = %profile.name,
            position = %position,
            registration_ends_at = %election.registration_ends_at,
            "election started"
        );
        Ok(election)
    }

    /// Call off a nation's live election.
    pub async fn cancel_election(&self, nation: NationId) -> Result<Election, ElectionError> {
        let mut state = self.state.write().await;
        let live = state
            .live(nation)
            .cloned()
            .ok_or(ElectionError::NoLiveElection(nation))?;
        let election = Election {
            status: ElectionStatus::Cancelled,
            ended_at: Some(self.clock.now()),
            ..live
        };
        self.store
            .commit(Changeset::new().with_election(election.clone()))
            .await?;
        state.put(election.clone());
        info!(election_id = %election.id, %nation, "election cancelled");
        Ok(election)
    }

    // -- Candidacy ----------------------------------------------------------

    /// Register `player` as a candidate in their nation's election.
    pub async fn register_candidate(
        &self,
        nation: NationId,
        player: PlayerId,
        slogan: Option<&str>,
    ) -> Result<ElectionCandidate, CandidacyError> {
        let mut state = self.state.write().await;
        let election = state
            .live(nation)
            .cloned()
            .ok_or(CandidacyError::NoLiveElection(nation))?;
        if election.status != ElectionStatus::Registration {
            return Err(CandidacyError::ElectionNotInRegistration(election.status));
        }
        let membership = self
            .directory
            .membership(player)
            .filter(|m| m.nation == nation)
            .ok_or(CandidacyError::NotMember { player, nation })?;
        let required = self.rules.min_candidate_role;
        if membership.role.rank() < required.rank() {
            return Err(CandidacyError::InsufficientRank {
                role: membership.role,
                required,
            });
        }
        if state.candidate(election.id, player).is_some() {
            return Err(CandidacyError::AlreadyRegistered(player));
        }
        if let Some(len) = slogan
            .map(|s| s.chars().count())
            .filter(|len| *len > self.rules.max_slogan_len)
        {
            return Err(CandidacyError::SloganTooLong {
                len,
                max: self.rules.max_slogan_len,
            });
        }

        let candidate = ElectionCandidate {
            id: CandidateId::new(),
            election_id: election.id,
            player_id: player,
            registered_at: self.clock.now(),
            slogan: slogan.map(str::to_owned),
            vote_count: 0,
            withdrawn: false,
        };
        match self
            .store
            .commit(Changeset::new().with_candidates([candidate.clone()]))
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_conflict() => return Err(CandidacyError::AlreadyRegistered(player)),
            Err(err) => return Err(err.into()),
        }
        state.upsert_candidate(candidate.clone());
        info!(election_id = %election.id, %player, "candidate registered");
        Ok(candidate)
    }

    /// Withdraw `player` from their nation's election.
    pub async fn withdraw_candidate(
        &self,
        nation: NationId,
        player: PlayerId,
    ) -> Result<ElectionCandidate, CandidacyError> {
        let mut state = self.state.write().await;
        let election = state
            .live(nation)
            .cloned()
            .ok_or(CandidacyError::NoLiveElection(nation))?;
        if !matches!(
            election.status,
            ElectionStatus::Registration | ElectionStatus::Voting
        ) {
            return Err(CandidacyError::WithdrawalClosed(election.status));
        }
        let current = state
            .candidate(election.id, player)
            .ok_or(CandidacyError::NotRegistered(player))?;
        if current.withdrawn {
            return Err(CandidacyError::AlreadyWithdrawn(player));
        }
        let candidate = ElectionCandidate {
            withdrawn: true,
            ..current.clone()
        };
        self.store
            .commit(Changeset::new().with_candidates([candidate.clone()]))
            .await?;
        state.upsert_candidate(candidate.clone());
        info!(election_id = %election.id, %player, "candidate withdrew");
        Ok(candidate)
    }

    // -- Voting -------------------------------------------------------------

    /// Cast `voter`'s vote for `candidate` in their nation's election.
    pub async fn vote(
        &self,
        nation: NationId,
        voter: PlayerId,
        candidate: PlayerId,
    ) -> Result<ElectionVote, VoteError> {
        let mut state = self.state.write().await;
        let election = state
            .live(nation)
            .cloned()
            .ok_or(VoteError::NoLiveElection(nation))?;
        if election.status != ElectionStatus::Voting {
            return Err(VoteError::ElectionNotInVoting(election.status));
        }
        if self
            .directory
            .membership(voter)
            .is_none_or(|m| m.nation != nation)
        {
            return Err(VoteError::NotMember {
                player: voter,
                nation,
            });
        }
        if state
            .voters
            .get(&election.id)
            .is_some_and(|voters| voters.contains(&voter))
        {
            return Err(VoteError::AlreadyVoted(voter));
        }
        let chosen = state
            .candidate(election.id, candidate)
            .ok_or(VoteError::CandidateNotFound(candidate))?;
        if chosen.withdrawn {
            return Err(VoteError::CandidateWithdrawn(candidate));
        }

        let vote = ElectionVote {
            election_id: election.id,
            voter_id: voter,
            candidate_id: chosen.id,
            cast_at: self.clock.now(),
        };
        let chosen = ElectionCandidate {
            vote_count: chosen.vote_count.saturating_add(1),
            ..chosen.clone()
        };
        let changes = Changeset::new()
            .with_vote(vote.clone())
            .with_candidates([chosen.clone()]);
        match self.store.commit(changes).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                let votes = self.store.election_votes(election.id).await?;
                let voters = votes.into_iter().map(|v| v.voter_id).collect();
                state.voters.insert(election.id, voters);
                warn!(election_id = %election.id, %voter, "duplicate vote reconciled from store");
                return Err(VoteError::AlreadyVoted(voter));
            }
            Err(err) => return Err(err.into()),
        }
        state.upsert_candidate(chosen);
        state.voters.entry(election.id).or_default().insert(voter);
        debug!(election_id = %election.id, %voter, %candidate, "vote cast");
        Ok(vote)
    }

    // -- Tick ---------------------------------------------------------------

    /// Move every live election whose phase has ended to its next status.
    ///
    /// A failed election stays where it was and is retried on the next
    /// call; the others still advance.
    pub async fn advance(&self) -> ElectionAdvance {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let mut due: Vec<Election> = state.elections.values().cloned().collect();
        due.sort_by_key(|e| (e.started_at, e.id));

        let mut report = ElectionAdvance::default();
        for election in due {
            let id = election.id;
            if let Err(err) = self
                .advance_one(&mut state, election, now, &mut report.transitions)
                .await
            {
                warn!(election_id = %id, %err, "election advance failed");
                report.failures.push((id, err));
            }
        }
        report
    }

    async fn advance_one(
        &self,
        state: &mut ElectionState,
        mut election: Election,
        now: DateTime<Utc>,
        transitions: &mut Vec<ElectionTransition>,
    ) -> Result<(), ElectionError> {
        if election.status == ElectionStatus::Registration && now >= election.registration_ends_at {
            let standing = state
                .candidates(election.id)
                .iter()
                .filter(|c| !c.withdrawn)
                .count();
            let to = if standing >= self.rules.min_candidates {
                ElectionStatus::Voting
            } else {
                ElectionStatus::Cancelled
            };
            transitions.push(self.transition(state, election, to, now).await?);
            return Ok(());
        }
        if election.status == ElectionStatus::Voting && now >= election.voting_ends_at {
            let transition = self
                .transition(state, election.clone(), ElectionStatus::Counting, now)
                .await?;
            transitions.push(transition);
            election.status = ElectionStatus::Counting;
        }
        if election.status == ElectionStatus::Counting {
            transitions.push(self.tally(state, election, now).await?);
        }
        Ok(())
    }

    async fn transition(
        &self,
        state: &mut ElectionState,
        election: Election,
        to: ElectionStatus,
        now: DateTime<Utc>,
    ) -> Result<ElectionTransition, ElectionError> {
        let from = election.status;
        let election = Election {
            status: to,
            ended_at: (!to.is_live()).then_some(now),
            ..election
        };
        self.store
            .commit(Changeset::new().with_election(election.clone()))
            .await?;
        info!(election_id = %election.id, %from, %to, "election advanced");
        let transition = ElectionTransition {
            election: election.id,
            nation: election.nation_id,
            from,
            to,
        };
        state.put(election);
        Ok(transition)
    }

    async fn tally(
        &self,
        state: &mut ElectionState,
        election: Election,
        now: DateTime<Utc>,
    ) -> Result<ElectionTransition, ElectionError> {
        let candidates = state.candidates(election.id);
        let total_votes = candidates
            .iter()
            .filter(|c| !c.withdrawn)
            .fold(0_u32, |acc, c| acc.saturating_add(c.vote_count));
        let winner = leading_candidate(candidates)
            .filter(|_| total_votes > 0)
            .map(|c| c.player_id);
        let to = if winner.is_some() {
            ElectionStatus::Completed
        } else {
            ElectionStatus::Cancelled
        };
        let position = election.position;
        let election = Election {
            winner_id: winner,
            total_votes,
            ..election
        };
        let transition = self.transition(state, election, to, now).await?;

        let Some(winner) = winner else {
            return Ok(transition);
        };
        info!(
            election_id = %transition.election,
            %winner,
            %position,
            total_votes,
            "election won"
        );
        let transfer = (position == ElectionPosition::Leader)
            .then(|| self.directory.transfer_leadership(transition.nation, winner));
        if let Some(Err(err)) = transfer {
            warn!(
                election_id = %transition.election,
                %winner,
                %err,
                "leadership transfer failed"
            );
        }
        Ok(transition)
    }

    // -- Queries ------------------------------------------------------------

    /// A nation's live election.
    pub async fn get_election(&self, nation: NationId) -> Option<Election> {
        self.state.read().await.live(nation).cloned()
    }

    /// Candidates of a nation's live election, in registration order.
    pub async fn candidates(&self, nation: NationId) -> Vec<ElectionCandidate> {
        let state = self.state.read().await;
        state
            .live(nation)
            .map(|e| state.candidates(e.id).to_vec())
            .unwrap_or_default()
    }

    /// Whether `player` has voted in their nation's live election.
    pub async fn has_voted(&self, nation: NationId, player: PlayerId) -> bool {
        let state = self.state.read().await;
        state
            .live(nation)
            .and_then(|e| state.voters.get(&e.id))
            .is_some_and(|voters| voters.contains(&player))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use chrono::TimeDelta;
    use conquest_store::MemoryStore;
    use conquest_types::{GovernmentType, NationRole};
    use rust_decimal::Decimal;

    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{NationProfile, StaticDirectory};

    struct Fixture {
        elections: ElectionManager,
        directory: Arc<StaticDirectory>,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        nation: NationId,
    }

    fn fixture(government: GovernmentType) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::default());
        let nation = NationId::new();
        directory.add_nation(NationProfile {
            id: nation,
            name: "Avalon".to_owned(),
            power: Decimal::new(100, 0),
            balance: Decimal::ZERO,
            leader: None,
            government,
        });
        let elections = ElectionManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&directory) as Arc<dyn NationDirectory>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            ElectionRules::default(),
        );
        Fixture {
            elections,
            directory,
            store,
            clock,
            nation,
        }
    }

    impl Fixture {
        fn member(&self, role: NationRole) -> PlayerId {
            let player = PlayerId::new();
            self.directory.add_member(player, self.nation, role);
            player
        }

        /// An election in VOTING with two candidates.
        async fn voting(&self) -> (PlayerId, PlayerId) {
            self.elections
                .start_election(self.nation, ElectionPosition::Treasurer)
                .await
                .unwrap();
            let first = self.member(NationRole::Citizen);
            let second = self.member(NationRole::Officer);
            self.elections
                .register_candidate(self.nation, first, Some("coin for all"))
                .await
                .unwrap();
            self.clock.advance(TimeDelta::minutes(1));
            self.elections
                .register_candidate(self.nation, second, None)
                .await
                .unwrap();
            self.clock.advance(TimeDelta::days(2));
            assert!(self.elections.advance().await.failures.is_empty());
            (first, second)
        }
    }

    fn candidate(votes: u32, registered_at: DateTime<Utc>) -> ElectionCandidate {
        ElectionCandidate {
            id: CandidateId::new(),
            election_id: ElectionId::new(),
            player_id: PlayerId::new(),
            registered_at,
            slogan: None,
            vote_count: votes,
            withdrawn: false,
        }
    }

    #[test]
    fn tie_goes_to_earliest_registration() {
        let now = Utc::now();
        let early = candidate(3, now);
        let late = candidate(3, now + TimeDelta::hours(1));
        let behind = candidate(2, now - TimeDelta::hours(1));
        let mut withdrawn = candidate(9, now);
        withdrawn.withdrawn = true;

        let pool = vec![late.clone(), behind, withdrawn, early.clone()];
        assert_eq!(leading_candidate(&pool).map(|c| c.id), Some(early.id));
    }

    #[test]
    fn same_instant_tie_goes_to_lowest_id() {
        let now = Utc::now();
        let a = candidate(1, now);
        let b = candidate(1, now);
        let lowest = a.id.min(b.id);
        assert_eq!(leading_candidate(&[a, b]).map(|c| c.id), Some(lowest));
    }

    #[tokio::test]
    async fn start_requires_electoral_government() {
        let f = fixture(GovernmentType::Monarchy);
        let result = f
            .elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await;
        assert!(matches!(result, Err(ElectionError::NoElectoralGovernment(_))));

        let result = f
            .elections
            .start_election(NationId::new(), ElectionPosition::Leader)
            .await;
        assert!(matches!(result, Err(ElectionError::UnknownNation(_))));
    }

    #[tokio::test]
    async fn one_live_election_per_nation() {
        let f = fixture(GovernmentType::Republic);
        let election = f
            .elections
            .start_election(f.nation, ElectionPosition::Marshal)
            .await
            .unwrap();
        assert_eq!(election.voting_ends_at - election.started_at, TimeDelta::days(5));
        let result = f
            .elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await;
        assert!(matches!(result, Err(ElectionError::ElectionAlreadyLive { .. })));

        f.elections.cancel_election(f.nation).await.unwrap();
        assert!(f.elections.get_election(f.nation).await.is_none());
        f.elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn registration_rules() {
        let f = fixture(GovernmentType::Democracy);
        f.elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await
            .unwrap();

        let recruit = f.member(NationRole::Recruit);
        let result = f.elections.register_candidate(f.nation, recruit, None).await;
        assert!(matches!(result, Err(CandidacyError::InsufficientRank { .. })));

        let outsider = PlayerId::new();
        let result = f.elections.register_candidate(f.nation, outsider, None).await;
        assert!(matches!(result, Err(CandidacyError::NotMember { .. })));

        let citizen = f.member(NationRole::Citizen);
        let long = "x".repeat(65);
        let result = f
            .elections
            .register_candidate(f.nation, citizen, Some(&long))
            .await;
        assert!(matches!(result, Err(CandidacyError::SloganTooLong { len: 65, max: 64 })));

        f.elections
            .register_candidate(f.nation, citizen, Some("bread"))
            .await
            .unwrap();
        let result = f.elections.register_candidate(f.nation, citizen, None).await;
        assert!(matches!(result, Err(CandidacyError::AlreadyRegistered(_))));

        f.elections.withdraw_candidate(f.nation, citizen).await.unwrap();
        let result = f.elections.withdraw_candidate(f.nation, citizen).await;
        assert!(matches!(result, Err(CandidacyError::AlreadyWithdrawn(_))));
    }

    #[tokio::test]
    async fn too_few_candidates_cancels() {
        let f = fixture(GovernmentType::Democracy);
        f.elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await
            .unwrap();
        let only = f.member(NationRole::Minister);
        f.elections.register_candidate(f.nation, only, None).await.unwrap();

        assert!(f.elections.advance().await.transitions.is_empty());
        f.clock.advance(TimeDelta::days(2));
        let transitions = f.elections.advance().await.transitions;
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].to, ElectionStatus::Cancelled);
        assert!(f.elections.get_election(f.nation).await.is_none());
    }

    #[tokio::test]
    async fn phase_boundaries_are_enforced() {
        let f = fixture(GovernmentType::Democracy);
        let result = f.elections.vote(f.nation, PlayerId::new(), PlayerId::new()).await;
        assert!(matches!(result, Err(VoteError::NoLiveElection(_))));

        f.elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await
            .unwrap();
        let voter = f.member(NationRole::Recruit);
        let result = f.elections.vote(f.nation, voter, PlayerId::new()).await;
        assert!(matches!(
            result,
            Err(VoteError::ElectionNotInVoting(ElectionStatus::Registration))
        ));
        f.elections.cancel_election(f.nation).await.unwrap();

        let (first, _) = f.voting().await;
        let late = f.member(NationRole::Citizen);
        let result = f.elections.register_candidate(f.nation, late, None).await;
        assert!(matches!(
            result,
            Err(CandidacyError::ElectionNotInRegistration(ElectionStatus::Voting))
        ));
        let result = f.elections.vote(f.nation, voter, late).await;
        assert!(matches!(result, Err(VoteError::CandidateNotFound(_))));

        f.elections.vote(f.nation, voter, first).await.unwrap();
        let result = f.elections.vote(f.nation, voter, first).await;
        assert!(matches!(result, Err(VoteError::AlreadyVoted(_))));
        assert!(f.elections.has_voted(f.nation, voter).await);
    }

    #[tokio::test]
    async fn withdrawn_candidate_cannot_receive_votes_or_win() {
        let f = fixture(GovernmentType::Democracy);
        let (first, second) = f.voting().await;
        let voters: Vec<PlayerId> = (0..3).map(|_| f.member(NationRole::Citizen)).collect();
        for voter in &voters {
            f.elections.vote(f.nation, *voter, first).await.unwrap();
        }
        f.elections.withdraw_candidate(f.nation, first).await.unwrap();
        let late = f.member(NationRole::Citizen);
        let result = f.elections.vote(f.nation, late, first).await;
        assert!(matches!(result, Err(VoteError::CandidateWithdrawn(_))));
        f.elections.vote(f.nation, late, second).await.unwrap();

        f.clock.advance(TimeDelta::days(3));
        let transitions = f.elections.advance().await.transitions;
        let last = transitions.last().unwrap();
        assert_eq!(last.to, ElectionStatus::Completed);
        let stored = f.store.find_election(last.election).await.unwrap();
        assert_eq!(stored.winner_id, Some(second));
        assert_eq!(stored.total_votes, 1);
    }

    #[tokio::test]
    async fn no_votes_cancels_after_counting() {
        let f = fixture(GovernmentType::Democracy);
        f.voting().await;
        f.clock.advance(TimeDelta::days(3));
        let to: Vec<ElectionStatus> = f
            .elections
            .advance()
            .await
            .transitions
            .iter()
            .map(|t| t.to)
            .collect();
        assert_eq!(to, vec![ElectionStatus::Counting, ElectionStatus::Cancelled]);
    }

    #[tokio::test]
    async fn failed_election_does_not_hold_back_the_others() {
        let f = fixture(GovernmentType::Democracy);
        let first = f
            .elections
            .start_election(f.nation, ElectionPosition::Leader)
            .await
            .unwrap();
        for _ in 0..2 {
            let player = f.member(NationRole::Citizen);
            f.elections.register_candidate(f.nation, player, None).await.unwrap();
        }

        f.clock.advance(TimeDelta::minutes(1));
        let other = NationId::new();
        f.directory.add_nation(NationProfile {
            id: other,
            name: "Brython".to_owned(),
            power: Decimal::new(100, 0),
            balance: Decimal::ZERO,
            leader: None,
            government: GovernmentType::Republic,
        });
        let second = f
            .elections
            .start_election(other, ElectionPosition::Leader)
            .await
            .unwrap();
        for _ in 0..2 {
            let player = PlayerId::new();
            f.directory.add_member(player, other, NationRole::Citizen);
            f.elections.register_candidate(other, player, None).await.unwrap();
        }

        f.clock.advance(TimeDelta::days(2));
        f.store.fail_next_commit();
        let report = f.elections.advance().await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, first.id);
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].election, second.id);
        assert_eq!(report.transitions[0].to, ElectionStatus::Voting);
        let stuck = f.elections.get_election(f.nation).await.unwrap();
        assert_eq!(stuck.status, ElectionStatus::Registration);

        let report = f.elections.advance().await;
        assert!(report.failures.is_empty());
        assert_eq!(report.transitions.len(), 1);
        assert_eq!(report.transitions[0].election, first.id);
        assert_eq!(report.transitions[0].to, ElectionStatus::Voting);
    }

    #[tokio::test]
    async fn duplicate_vote_in_store_is_reconciled() {
        let f = fixture(GovernmentType::Democracy);
        let (first, _) = f.voting().await;
        let voter = f.member(NationRole::Citizen);
        let election = f.elections.get_election(f.nation).await.unwrap();
        let candidate_id = f.elections.candidates(f.nation).await[0].id;
        f.store
            .commit(Changeset::new().with_vote(ElectionVote {
                election_id: election.id,
                voter_id: voter,
                candidate_id,
                cast_at: f.clock.now(),
            }))
            .await
            .unwrap();

        let result = f.elections.vote(f.nation, voter, first).await;
        assert!(matches!(result, Err(VoteError::AlreadyVoted(_))));
        assert!(f.elections.has_voted(f.nation, voter).await);
        assert_eq!(f.elections.candidates(f.nation).await[0].vote_count, 0);
    }

    #[tokio::test]
    async fn counting_election_is_tallied_after_restart() {
        let f = fixture(GovernmentType::Democracy);
        let (first, _) = f.voting().await;
        let voter = f.member(NationRole::Citizen);
        f.elections.vote(f.nation, voter, first).await.unwrap();

        let election = f.elections.get_election(f.nation).await.unwrap();
        f.store
            .commit(Changeset::new().with_election(Election {
                status: ElectionStatus::Counting,
                ..election
            }))
            .await
            .unwrap();

        let restarted = ElectionManager::new(
            Arc::clone(&f.store) as Arc<dyn Store>,
            Arc::clone(&f.directory) as Arc<dyn NationDirectory>,
            Arc::clone(&f.clock) as Arc<dyn Clock>,
            ElectionRules::default(),
        );
        restarted
            .restore(&f.store.load_snapshot().await.unwrap())
            .await;
        assert!(restarted.has_voted(f.nation, voter).await);
        let transitions = restarted.advance().await.transitions;
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from, ElectionStatus::Counting);
        assert_eq!(transitions[0].to, ElectionStatus::Completed);
    }
}
