//! Unit-of-work types exchanged with a [`Store`](crate::Store).
//!
//! A manager collects every row a transition touches into one
//! [`Changeset`] and commits it atomically. Removals are applied before
//! upserts so a changeset can replace a relation in one step.

use conquest_types::{
    Battle, BattleId, BattleParticipant, Election, ElectionCandidate, ElectionVote, NationId,
    NationRelation, RelationKind, Siege, War, WarEvent, WarParticipant,
};

/// Deletes relation rows between two nations, in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRemoval {
    /// One end of the pair.
    pub a: NationId,
    /// The other end of the pair.
    pub b: NationId,
    /// Only rows of these kinds are removed.
    pub kinds: Vec<RelationKind>,
}

impl RelationRemoval {
    /// Whether `relation` falls under this removal.
    pub fn matches(&self, relation: &NationRelation) -> bool {
        let pair = (relation.nation_id == self.a && relation.other_id == self.b)
            || (relation.nation_id == self.b && relation.other_id == self.a);
        pair && self.kinds.contains(&relation.kind)
    }
}

/// Every row written by one transition.
///
/// Entity rows are upserts keyed by their natural key. Events and votes are
/// insert-only; writing an existing one is a conflict.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    /// Wars to upsert.
    pub wars: Vec<War>,
    /// War participants to upsert, keyed by (war, nation).
    pub war_participants: Vec<WarParticipant>,
    /// War events to insert.
    pub war_events: Vec<WarEvent>,
    /// Battles to upsert.
    pub battles: Vec<Battle>,
    /// Battle participants to upsert, keyed by (battle, player).
    pub battle_participants: Vec<BattleParticipant>,
    /// Sieges to upsert, keyed by battle.
    pub sieges: Vec<Siege>,
    /// Sieges to delete.
    pub removed_sieges: Vec<BattleId>,
    /// Relations to upsert, keyed by (nation, other, kind).
    pub relations: Vec<NationRelation>,
    /// Relation rows to delete.
    pub removed_relations: Vec<RelationRemoval>,
    /// Elections to upsert.
    pub elections: Vec<Election>,
    /// Candidates to upsert.
    pub candidates: Vec<ElectionCandidate>,
    /// Votes to insert.
    pub votes: Vec<ElectionVote>,
}

impl Changeset {
    /// Create an empty changeset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing would be written.
    pub const fn is_empty(&self) -> bool {
        self.wars.is_empty()
            && self.war_participants.is_empty()
            && self.war_events.is_empty()
            && self.battles.is_empty()
            && self.battle_participants.is_empty()
            && self.sieges.is_empty()
            && self.removed_sieges.is_empty()
            && self.relations.is_empty()
            && self.removed_relations.is_empty()
            && self.elections.is_empty()
            && self.candidates.is_empty()
            && self.votes.is_empty()
    }

    /// Add a war.
    #[must_use]
    pub fn with_war(mut self, war: War) -> Self {
        self.wars.push(war);
        self
    }

    /// Add war participants.
    #[must_use]
    pub fn with_war_participants(
        mut self,
        participants: impl IntoIterator<Item = WarParticipant>,
    ) -> Self {
        self.war_participants.extend(participants);
        self
    }

    /// Add war events.
    #[must_use]
    pub fn with_war_events(mut self, events: impl IntoIterator<Item = WarEvent>) -> Self {
        self.war_events.extend(events);
        self
    }

    /// Add a battle.
    #[must_use]
    pub fn with_battle(mut self, battle: Battle) -> Self {
        self.battles.push(battle);
        self
    }

    /// Add battle participants.
    #[must_use]
    pub fn with_battle_participants(
        mut self,
        participants: impl IntoIterator<Item = BattleParticipant>,
    ) -> Self {
        self.battle_participants.extend(participants);
        self
    }

    /// Add a siege.
    #[must_use]
    pub fn with_siege(mut self, siege: Siege) -> Self {
        self.sieges.push(siege);
        self
    }

    /// Delete a siege.
    #[must_use]
    pub fn without_siege(mut self, battle: BattleId) -> Self {
        self.removed_sieges.push(battle);
        self
    }

    /// Add relations.
    #[must_use]
    pub fn with_relations(mut self, relations: impl IntoIterator<Item = NationRelation>) -> Self {
        self.relations.extend(relations);
        self
    }

    /// Delete relation rows of `kinds` between `a` and `b`.
    #[must_use]
    pub fn without_relations(mut self, a: NationId, b: NationId, kinds: &[RelationKind]) -> Self {
        self.removed_relations.push(RelationRemoval {
            a,
            b,
            kinds: kinds.to_vec(),
        });
        self
    }

    /// Add an election.
    #[must_use]
    pub fn with_election(mut self, election: Election) -> Self {
        self.elections.push(election);
        self
    }

    /// Add candidates.
    #[must_use]
    pub fn with_candidates(
        mut self,
        candidates: impl IntoIterator<Item = ElectionCandidate>,
    ) -> Self {
        self.candidates.extend(candidates);
        self
    }

    /// Add a vote.
    #[must_use]
    pub fn with_vote(mut self, vote: ElectionVote) -> Self {
        self.votes.push(vote);
        self
    }
}

/// Everything the managers need to rebuild their live caches.
///
/// Only non-terminal wars and live battles and elections are included,
/// along with their child rows. Relations are included in full.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    /// Non-terminal wars.
    pub wars: Vec<War>,
    /// Participants of those wars.
    pub war_participants: Vec<WarParticipant>,
    /// Events of those wars, oldest first.
    pub war_events: Vec<WarEvent>,
    /// Live battles.
    pub battles: Vec<Battle>,
    /// Rosters of those battles.
    pub battle_participants: Vec<BattleParticipant>,
    /// Sieges of those battles.
    pub sieges: Vec<Siege>,
    /// All relation rows.
    pub relations: Vec<NationRelation>,
    /// Live elections.
    pub elections: Vec<Election>,
    /// Candidates of those elections.
    pub candidates: Vec<ElectionCandidate>,
    /// Votes cast in those elections.
    pub votes: Vec<ElectionVote>,
}
