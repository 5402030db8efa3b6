//! Core entity structs for the Conquest warfare core.
//!
//! These are the strongly-typed rows the managers cache and the store
//! persists. Methods here are pure accessors over a single entity; policy
//! (thresholds, durations, scoring) lives with the managers that own the
//! entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{
    BattleStatus, BattleType, ElectionPosition, ElectionStatus, RelationKind, SiegeEquipment,
    WarEventType, WarGoal, WarSide, WarStatus,
};
use crate::ids::{
    BattleId, CandidateId, ElectionId, NationId, PlayerId, WarEventId, WarId,
};

// ---------------------------------------------------------------------------
// War
// ---------------------------------------------------------------------------

/// A war between two nations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct War {
    /// Unique war identifier.
    pub id: WarId,
    /// The declaring nation.
    pub attacker_id: NationId,
    /// The nation war was declared on.
    pub defender_id: NationId,
    /// Current lifecycle status.
    pub status: WarStatus,
    /// Strategic objective.
    pub goal: WarGoal,
    /// Free-text casus belli.
    pub reason: String,
    /// When the war was declared.
    pub declared_at: DateTime<Utc>,
    /// When the start delay elapses.
    pub starts_at: DateTime<Utc>,
    /// When hostilities began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the war ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Accumulated attacker score.
    pub attacker_score: i64,
    /// Accumulated defender score.
    pub defender_score: i64,
    /// Attacker fatigue, 0 to the weariness cap.
    pub attacker_weariness: u8,
    /// Defender fatigue, 0 to the weariness cap.
    pub defender_weariness: u8,
    /// Terms of the pending peace proposal.
    pub peace_terms: Option<String>,
    /// Nation that proposed the pending peace.
    pub peace_proposer: Option<NationId>,
    /// When the current ceasefire lapses.
    pub ceasefire_until: Option<DateTime<Utc>>,
    /// The winning nation, once decided.
    pub winner_id: Option<NationId>,
}

impl War {
    /// The original nation fighting on `side`.
    pub const fn nation_on(&self, side: WarSide) -> NationId {
        match side {
            WarSide::Attacker => self.attacker_id,
            WarSide::Defender => self.defender_id,
        }
    }

    /// The side an original nation fights on, if it is one of the two.
    pub fn original_side_of(&self, nation: NationId) -> Option<WarSide> {
        if nation == self.attacker_id {
            Some(WarSide::Attacker)
        } else if nation == self.defender_id {
            Some(WarSide::Defender)
        } else {
            None
        }
    }

    /// Whether the two original nations are `a` and `b`, in either order.
    pub fn is_between(&self, a: NationId, b: NationId) -> bool {
        (self.attacker_id == a && self.defender_id == b)
            || (self.attacker_id == b && self.defender_id == a)
    }

    /// Attacker score minus defender score.
    pub const fn score_lead(&self) -> i64 {
        self.attacker_score.saturating_sub(self.defender_score)
    }
}

/// A nation taking part in a war.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarParticipant {
    /// The war.
    pub war_id: WarId,
    /// The participating nation.
    pub nation_id: NationId,
    /// The side it fights on.
    pub side: WarSide,
    /// When it joined.
    pub joined_at: DateTime<Utc>,
    /// Kills credited to the nation's players across the war's battles.
    pub contribution: i64,
    /// Deaths suffered by the nation's players across the war's battles.
    pub casualties: u32,
    /// Whether it is one of the two declaring/declared nations.
    pub is_original: bool,
}

/// An immutable entry in a war's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarEvent {
    /// Unique event identifier.
    pub id: WarEventId,
    /// The war this event belongs to.
    pub war_id: WarId,
    /// What happened.
    pub event_type: WarEventType,
    /// The nation the event concerns, if any.
    pub nation_id: Option<NationId>,
    /// The side the event concerns, if any.
    pub side: Option<WarSide>,
    /// Human-readable description.
    pub description: String,
    /// Score applied to `side` by this event.
    pub score_delta: i64,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Battle
// ---------------------------------------------------------------------------

/// A point in the game world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// World (dimension) name.
    pub world: String,
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Position {
    /// Create a position in `world`.
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Squared distance to `other`, or `None` across worlds.
    pub fn distance_squared(&self, other: &Self) -> Option<f64> {
        if self.world != other.world {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some(dz.mul_add(dz, dx.mul_add(dx, dy * dy)))
    }
}

/// The spherical region where a battle is fought.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleZone {
    /// Centre of the sphere.
    pub center: Position,
    /// Radius in blocks.
    pub radius: f64,
}

impl BattleZone {
    /// Whether `point` lies inside the zone (boundary included).
    pub fn contains(&self, point: &Position) -> bool {
        self.center
            .distance_squared(point)
            .is_some_and(|d| d <= self.radius * self.radius)
    }
}

/// A battle fought under a war.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    /// Unique battle identifier.
    pub id: BattleId,
    /// The parent war.
    pub war_id: WarId,
    /// Kind of battle.
    pub battle_type: BattleType,
    /// Current lifecycle status.
    pub status: BattleStatus,
    /// Region identifier from the territory system.
    pub region: String,
    /// Nation leading the attack.
    pub attacker_id: NationId,
    /// Nation holding the ground.
    pub defender_id: NationId,
    /// Where participation and combat effects apply.
    pub zone: BattleZone,
    /// When the battle was created.
    pub created_at: DateTime<Utc>,
    /// Planned start, for scheduled battles.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// When fighting began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the battle ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Kills scored by attacking players.
    pub attacker_kills: u32,
    /// Kills scored by defending players.
    pub defender_kills: u32,
    /// Deaths suffered by attacking players.
    pub attacker_deaths: u32,
    /// Deaths suffered by defending players.
    pub defender_deaths: u32,
    /// Winning nation, if the battle was decided.
    pub winner_id: Option<NationId>,
    /// Score forwarded to the war.
    pub awarded_score: i64,
}

impl Battle {
    /// The nation leading `side`.
    pub const fn nation_on(&self, side: WarSide) -> NationId {
        match side {
            WarSide::Attacker => self.attacker_id,
            WarSide::Defender => self.defender_id,
        }
    }

    /// Kills scored by `side`.
    pub const fn kills(&self, side: WarSide) -> u32 {
        match side {
            WarSide::Attacker => self.attacker_kills,
            WarSide::Defender => self.defender_kills,
        }
    }
}

/// A player on a battle roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleParticipant {
    /// The battle.
    pub battle_id: BattleId,
    /// The player.
    pub player_id: PlayerId,
    /// The player's nation.
    pub nation_id: NationId,
    /// The side the player fights on.
    pub side: WarSide,
    /// When the player (last) joined.
    pub joined_at: DateTime<Utc>,
    /// When the player left, deserted, or disconnected.
    pub left_at: Option<DateTime<Utc>>,
    /// Kills scored.
    pub kills: u32,
    /// Deaths suffered.
    pub deaths: u32,
    /// Damage dealt.
    pub damage_dealt: u64,
    /// Damage taken.
    pub damage_taken: u64,
    /// Whether the player is currently alive.
    pub is_alive: bool,
}

impl BattleParticipant {
    /// Whether the player is still on the field.
    pub const fn is_present(&self) -> bool {
        self.left_at.is_none()
    }

    /// Whether the player counts toward their side's strength.
    pub const fn is_active(&self) -> bool {
        self.is_present() && self.is_alive
    }
}

/// Structural-health model of a siege battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Siege {
    /// The siege battle (1:1).
    pub battle_id: BattleId,
    /// Fortification level of the defended structure.
    pub fortification_level: u8,
    /// Current wall health.
    pub walls_health: u32,
    /// Maximum wall health.
    pub walls_max: u32,
    /// Current gate health.
    pub gates_health: u32,
    /// Maximum gate health.
    pub gates_max: u32,
    /// Attacker progress, 0-100.
    pub progress: u8,
    /// Equipment used, in order.
    pub equipment_used: Vec<SiegeEquipment>,
    /// When the siege was set up.
    pub created_at: DateTime<Utc>,
}

impl Siege {
    /// Whether the walls or the gates are down.
    pub const fn is_breached(&self) -> bool {
        self.walls_health == 0 || self.gates_health == 0
    }

    /// Whether the attackers have taken the fortification.
    pub const fn is_complete(&self) -> bool {
        self.progress >= 100
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// A directed relation row between two nations.
///
/// Vassal/overlord pairs and truces are stored as two mirrored rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NationRelation {
    /// The nation the row describes.
    pub nation_id: NationId,
    /// The nation on the other end.
    pub other_id: NationId,
    /// What the relation is.
    pub kind: RelationKind,
    /// When it was established.
    pub established_at: DateTime<Utc>,
    /// When it lapses; `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
}

impl NationRelation {
    /// Whether the relation still applies at `now`.
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }
}

// ---------------------------------------------------------------------------
// Elections
// ---------------------------------------------------------------------------

/// An election held by a nation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    /// Unique election identifier.
    pub id: ElectionId,
    /// The nation holding the election.
    pub nation_id: NationId,
    /// Current lifecycle status.
    pub status: ElectionStatus,
    /// Office being filled.
    pub position: ElectionPosition,
    /// When the election was called.
    pub started_at: DateTime<Utc>,
    /// When registration closes.
    pub registration_ends_at: DateTime<Utc>,
    /// When voting closes.
    pub voting_ends_at: DateTime<Utc>,
    /// When the election was completed or cancelled.
    pub ended_at: Option<DateTime<Utc>>,
    /// The elected player.
    pub winner_id: Option<PlayerId>,
    /// Votes counted for eligible candidates.
    pub total_votes: u32,
}

/// A candidate registered in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCandidate {
    /// Unique registration identifier.
    pub id: CandidateId,
    /// The election.
    pub election_id: ElectionId,
    /// The candidate player.
    pub player_id: PlayerId,
    /// When the candidate registered; earlier wins ties.
    pub registered_at: DateTime<Utc>,
    /// Campaign slogan.
    pub slogan: Option<String>,
    /// Votes received.
    pub vote_count: u32,
    /// Whether the candidate withdrew.
    pub withdrawn: bool,
}

/// A vote cast in an election. One per voter per election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionVote {
    /// The election.
    pub election_id: ElectionId,
    /// The voting player.
    pub voter_id: PlayerId,
    /// The chosen candidate.
    pub candidate_id: CandidateId,
    /// When the vote was cast.
    pub cast_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(radius: f64) -> BattleZone {
        BattleZone {
            center: Position::new("world", 0.0, 64.0, 0.0),
            radius,
        }
    }

    #[test]
    fn zone_contains_boundary_point() {
        let z = zone(10.0);
        assert!(z.contains(&Position::new("world", 10.0, 64.0, 0.0)));
        assert!(!z.contains(&Position::new("world", 10.5, 64.0, 0.0)));
    }

    #[test]
    fn zone_excludes_other_worlds() {
        let z = zone(100.0);
        assert!(!z.contains(&Position::new("world_nether", 0.0, 64.0, 0.0)));
    }

    #[test]
    fn zone_uses_all_three_axes() {
        let z = zone(5.0);
        // 3-4-0 on x/z is exactly 5 away; lifting y pushes it out.
        assert!(z.contains(&Position::new("world", 3.0, 64.0, 4.0)));
        assert!(!z.contains(&Position::new("world", 3.0, 66.0, 4.0)));
    }

    #[test]
    fn relation_without_expiry_is_permanent() {
        let now = Utc::now();
        let relation = NationRelation {
            nation_id: NationId::new(),
            other_id: NationId::new(),
            kind: RelationKind::Vassal,
            established_at: now,
            expires_at: None,
        };
        assert!(relation.is_in_force(now));
    }

    #[test]
    fn relation_lapses_at_expiry() {
        let now = Utc::now();
        let relation = NationRelation {
            nation_id: NationId::new(),
            other_id: NationId::new(),
            kind: RelationKind::Truce,
            established_at: now,
            expires_at: Some(now),
        };
        assert!(!relation.is_in_force(now));
    }

    #[test]
    fn siege_breach_requires_walls_or_gates_down() {
        let mut siege = Siege {
            battle_id: BattleId::new(),
            fortification_level: 2,
            walls_health: 100,
            walls_max: 100,
            gates_health: 50,
            gates_max: 50,
            progress: 0,
            equipment_used: Vec::new(),
            created_at: Utc::now(),
        };
        assert!(!siege.is_breached());
        siege.gates_health = 0;
        assert!(siege.is_breached());
    }
}
