//! Row structs for the `PostgreSQL` schema.
//!
//! Each entity has exactly one row struct. Writing goes through
//! `From<&Entity>`, reading through `TryFrom<Row>`, so enum codes and
//! unsigned counters are mapped in one place. Enum columns hold the stable
//! storage codes from [`conquest_types::enums`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use conquest_types::{
    Battle, BattleParticipant, BattleZone, Election, ElectionCandidate, ElectionVote,
    NationRelation, Position, Siege, SiegeEquipment, War, WarEvent, WarParticipant, WarSide,
};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Integer column helpers
// ---------------------------------------------------------------------------

fn to_i16(value: u8) -> i16 {
    i16::from(value)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u8(column: &'static str, value: i16) -> Result<u8, StoreError> {
    u8::try_from(value).map_err(|e| StoreError::InvalidRow(format!("{column}={value}: {e}")))
}

fn to_u32(column: &'static str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|e| StoreError::InvalidRow(format!("{column}={value}: {e}")))
}

fn to_u64(column: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|e| StoreError::InvalidRow(format!("{column}={value}: {e}")))
}

// ---------------------------------------------------------------------------
// Wars
// ---------------------------------------------------------------------------

/// A row in the `wars` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WarRow {
    /// War ID.
    pub id: Uuid,
    /// Attacking nation.
    pub attacker_id: Uuid,
    /// Defending nation.
    pub defender_id: Uuid,
    /// Status code.
    pub status: String,
    /// Goal code.
    pub goal: String,
    /// Casus belli.
    pub reason: String,
    /// Declaration time.
    pub declared_at: DateTime<Utc>,
    /// Scheduled start.
    pub starts_at: DateTime<Utc>,
    /// Actual start.
    pub started_at: Option<DateTime<Utc>>,
    /// End time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Attacker score.
    pub attacker_score: i64,
    /// Defender score.
    pub defender_score: i64,
    /// Attacker weariness.
    pub attacker_weariness: i16,
    /// Defender weariness.
    pub defender_weariness: i16,
    /// Pending peace terms.
    pub peace_terms: Option<String>,
    /// Pending peace proposer.
    pub peace_proposer: Option<Uuid>,
    /// Ceasefire expiry.
    pub ceasefire_until: Option<DateTime<Utc>>,
    /// Winner.
    pub winner_id: Option<Uuid>,
}

impl From<&War> for WarRow {
    fn from(war: &War) -> Self {
        Self {
            id: war.id.into_inner(),
            attacker_id: war.attacker_id.into_inner(),
            defender_id: war.defender_id.into_inner(),
            status: war.status.code().to_owned(),
            goal: war.goal.code().to_owned(),
            reason: war.reason.clone(),
            declared_at: war.declared_at,
            starts_at: war.starts_at,
            started_at: war.started_at,
            ended_at: war.ended_at,
            attacker_score: war.attacker_score,
            defender_score: war.defender_score,
            attacker_weariness: to_i16(war.attacker_weariness),
            defender_weariness: to_i16(war.defender_weariness),
            peace_terms: war.peace_terms.clone(),
            peace_proposer: war.peace_proposer.map(Into::into),
            ceasefire_until: war.ceasefire_until,
            winner_id: war.winner_id.map(Into::into),
        }
    }
}

impl TryFrom<WarRow> for War {
    type Error = StoreError;

    fn try_from(row: WarRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            attacker_id: row.attacker_id.into(),
            defender_id: row.defender_id.into(),
            status: row.status.parse()?,
            goal: row.goal.parse()?,
            reason: row.reason,
            declared_at: row.declared_at,
            starts_at: row.starts_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            attacker_score: row.attacker_score,
            defender_score: row.defender_score,
            attacker_weariness: to_u8("attacker_weariness", row.attacker_weariness)?,
            defender_weariness: to_u8("defender_weariness", row.defender_weariness)?,
            peace_terms: row.peace_terms,
            peace_proposer: row.peace_proposer.map(Into::into),
            ceasefire_until: row.ceasefire_until,
            winner_id: row.winner_id.map(Into::into),
        })
    }
}

/// A row in the `war_participants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WarParticipantRow {
    /// War ID.
    pub war_id: Uuid,
    /// Nation ID.
    pub nation_id: Uuid,
    /// Side code.
    pub side: String,
    /// Join time.
    pub joined_at: DateTime<Utc>,
    /// Kills credited.
    pub contribution: i64,
    /// Deaths suffered.
    pub casualties: i32,
    /// Declaring/declared nation flag.
    pub is_original: bool,
}

impl From<&WarParticipant> for WarParticipantRow {
    fn from(p: &WarParticipant) -> Self {
        Self {
            war_id: p.war_id.into_inner(),
            nation_id: p.nation_id.into_inner(),
            side: p.side.code().to_owned(),
            joined_at: p.joined_at,
            contribution: p.contribution,
            casualties: to_i32(p.casualties),
            is_original: p.is_original,
        }
    }
}

impl TryFrom<WarParticipantRow> for WarParticipant {
    type Error = StoreError;

    fn try_from(row: WarParticipantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            war_id: row.war_id.into(),
            nation_id: row.nation_id.into(),
            side: row.side.parse()?,
            joined_at: row.joined_at,
            contribution: row.contribution,
            casualties: to_u32("casualties", row.casualties)?,
            is_original: row.is_original,
        })
    }
}

/// A row in the `war_events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WarEventRow {
    /// Event ID.
    pub id: Uuid,
    /// War ID.
    pub war_id: Uuid,
    /// Event type code.
    pub event_type: String,
    /// Concerned nation.
    pub nation_id: Option<Uuid>,
    /// Concerned side code.
    pub side: Option<String>,
    /// Description.
    pub description: String,
    /// Score credited to `side`.
    pub score_delta: i64,
    /// Event time.
    pub occurred_at: DateTime<Utc>,
}

impl From<&WarEvent> for WarEventRow {
    fn from(e: &WarEvent) -> Self {
        Self {
            id: e.id.into_inner(),
            war_id: e.war_id.into_inner(),
            event_type: e.event_type.code().to_owned(),
            nation_id: e.nation_id.map(Into::into),
            side: e.side.map(|s| s.code().to_owned()),
            description: e.description.clone(),
            score_delta: e.score_delta,
            occurred_at: e.occurred_at,
        }
    }
}

impl TryFrom<WarEventRow> for WarEvent {
    type Error = StoreError;

    fn try_from(row: WarEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            war_id: row.war_id.into(),
            event_type: row.event_type.parse()?,
            nation_id: row.nation_id.map(Into::into),
            side: row.side.map(|s| s.parse::<WarSide>()).transpose()?,
            description: row.description,
            score_delta: row.score_delta,
            occurred_at: row.occurred_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

/// A row in the `battles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BattleRow {
    /// Battle ID.
    pub id: Uuid,
    /// Parent war.
    pub war_id: Uuid,
    /// Battle type code.
    pub battle_type: String,
    /// Status code.
    pub status: String,
    /// Region identifier.
    pub region: String,
    /// Attacking nation.
    pub attacker_id: Uuid,
    /// Defending nation.
    pub defender_id: Uuid,
    /// Zone world name.
    pub zone_world: String,
    /// Zone centre X.
    pub zone_x: f64,
    /// Zone centre Y.
    pub zone_y: f64,
    /// Zone centre Z.
    pub zone_z: f64,
    /// Zone radius.
    pub zone_radius: f64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Planned start.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Actual start.
    pub started_at: Option<DateTime<Utc>>,
    /// End time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Attacker kills.
    pub attacker_kills: i32,
    /// Defender kills.
    pub defender_kills: i32,
    /// Attacker deaths.
    pub attacker_deaths: i32,
    /// Defender deaths.
    pub defender_deaths: i32,
    /// Winner.
    pub winner_id: Option<Uuid>,
    /// Score forwarded to the war.
    pub awarded_score: i64,
}

impl From<&Battle> for BattleRow {
    fn from(b: &Battle) -> Self {
        Self {
            id: b.id.into_inner(),
            war_id: b.war_id.into_inner(),
            battle_type: b.battle_type.code().to_owned(),
            status: b.status.code().to_owned(),
            region: b.region.clone(),
            attacker_id: b.attacker_id.into_inner(),
            defender_id: b.defender_id.into_inner(),
            zone_world: b.zone.center.world.clone(),
            zone_x: b.zone.center.x,
            zone_y: b.zone.center.y,
            zone_z: b.zone.center.z,
            zone_radius: b.zone.radius,
            created_at: b.created_at,
            scheduled_at: b.scheduled_at,
            started_at: b.started_at,
            ended_at: b.ended_at,
            attacker_kills: to_i32(b.attacker_kills),
            defender_kills: to_i32(b.defender_kills),
            attacker_deaths: to_i32(b.attacker_deaths),
            defender_deaths: to_i32(b.defender_deaths),
            winner_id: b.winner_id.map(Into::into),
            awarded_score: b.awarded_score,
        }
    }
}

impl TryFrom<BattleRow> for Battle {
    type Error = StoreError;

    fn try_from(row: BattleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            war_id: row.war_id.into(),
            battle_type: row.battle_type.parse()?,
            status: row.status.parse()?,
            region: row.region,
            attacker_id: row.attacker_id.into(),
            defender_id: row.defender_id.into(),
            zone: BattleZone {
                center: Position::new(row.zone_world, row.zone_x, row.zone_y, row.zone_z),
                radius: row.zone_radius,
            },
            created_at: row.created_at,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            attacker_kills: to_u32("attacker_kills", row.attacker_kills)?,
            defender_kills: to_u32("defender_kills", row.defender_kills)?,
            attacker_deaths: to_u32("attacker_deaths", row.attacker_deaths)?,
            defender_deaths: to_u32("defender_deaths", row.defender_deaths)?,
            winner_id: row.winner_id.map(Into::into),
            awarded_score: row.awarded_score,
        })
    }
}

/// A row in the `battle_participants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BattleParticipantRow {
    /// Battle ID.
    pub battle_id: Uuid,
    /// Player ID.
    pub player_id: Uuid,
    /// Nation ID.
    pub nation_id: Uuid,
    /// Side code.
    pub side: String,
    /// Join time.
    pub joined_at: DateTime<Utc>,
    /// Leave time.
    pub left_at: Option<DateTime<Utc>>,
    /// Kills.
    pub kills: i32,
    /// Deaths.
    pub deaths: i32,
    /// Damage dealt.
    pub damage_dealt: i64,
    /// Damage taken.
    pub damage_taken: i64,
    /// Alive flag.
    pub is_alive: bool,
}

impl From<&BattleParticipant> for BattleParticipantRow {
    fn from(p: &BattleParticipant) -> Self {
        Self {
            battle_id: p.battle_id.into_inner(),
            player_id: p.player_id.into_inner(),
            nation_id: p.nation_id.into_inner(),
            side: p.side.code().to_owned(),
            joined_at: p.joined_at,
            left_at: p.left_at,
            kills: to_i32(p.kills),
            deaths: to_i32(p.deaths),
            damage_dealt: to_i64(p.damage_dealt),
            damage_taken: to_i64(p.damage_taken),
            is_alive: p.is_alive,
        }
    }
}

impl TryFrom<BattleParticipantRow> for BattleParticipant {
    type Error = StoreError;

    fn try_from(row: BattleParticipantRow) -> Result<Self, Self::Error> {
        Ok(Self {
            battle_id: row.battle_id.into(),
            player_id: row.player_id.into(),
            nation_id: row.nation_id.into(),
            side: row.side.parse()?,
            joined_at: row.joined_at,
            left_at: row.left_at,
            kills: to_u32("kills", row.kills)?,
            deaths: to_u32("deaths", row.deaths)?,
            damage_dealt: to_u64("damage_dealt", row.damage_dealt)?,
            damage_taken: to_u64("damage_taken", row.damage_taken)?,
            is_alive: row.is_alive,
        })
    }
}

/// A row in the `sieges` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SiegeRow {
    /// Battle ID.
    pub battle_id: Uuid,
    /// Fortification level.
    pub fortification_level: i16,
    /// Wall health.
    pub walls_health: i32,
    /// Maximum wall health.
    pub walls_max: i32,
    /// Gate health.
    pub gates_health: i32,
    /// Maximum gate health.
    pub gates_max: i32,
    /// Progress 0-100.
    pub progress: i16,
    /// Equipment codes in use order.
    pub equipment_used: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<&Siege> for SiegeRow {
    fn from(s: &Siege) -> Self {
        Self {
            battle_id: s.battle_id.into_inner(),
            fortification_level: to_i16(s.fortification_level),
            walls_health: to_i32(s.walls_health),
            walls_max: to_i32(s.walls_max),
            gates_health: to_i32(s.gates_health),
            gates_max: to_i32(s.gates_max),
            progress: to_i16(s.progress),
            equipment_used: s
                .equipment_used
                .iter()
                .map(|e| e.code().to_owned())
                .collect(),
            created_at: s.created_at,
        }
    }
}

impl TryFrom<SiegeRow> for Siege {
    type Error = StoreError;

    fn try_from(row: SiegeRow) -> Result<Self, Self::Error> {
        let equipment_used = row
            .equipment_used
            .iter()
            .map(|code| code.parse::<SiegeEquipment>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            battle_id: row.battle_id.into(),
            fortification_level: to_u8("fortification_level", row.fortification_level)?,
            walls_health: to_u32("walls_health", row.walls_health)?,
            walls_max: to_u32("walls_max", row.walls_max)?,
            gates_health: to_u32("gates_health", row.gates_health)?,
            gates_max: to_u32("gates_max", row.gates_max)?,
            progress: to_u8("progress", row.progress)?,
            equipment_used,
            created_at: row.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// A row in the `nation_relations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RelationRow {
    /// Nation the row describes.
    pub nation_id: Uuid,
    /// Nation on the other end.
    pub other_id: Uuid,
    /// Kind code.
    pub kind: String,
    /// Establishment time.
    pub established_at: DateTime<Utc>,
    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&NationRelation> for RelationRow {
    fn from(r: &NationRelation) -> Self {
        Self {
            nation_id: r.nation_id.into_inner(),
            other_id: r.other_id.into_inner(),
            kind: r.kind.code().to_owned(),
            established_at: r.established_at,
            expires_at: r.expires_at,
        }
    }
}

impl TryFrom<RelationRow> for NationRelation {
    type Error = StoreError;

    fn try_from(row: RelationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            nation_id: row.nation_id.into(),
            other_id: row.other_id.into(),
            kind: row.kind.parse()?,
            established_at: row.established_at,
            expires_at: row.expires_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Elections
// ---------------------------------------------------------------------------

/// A row in the `elections` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ElectionRow {
    /// Election ID.
    pub id: Uuid,
    /// Nation ID.
    pub nation_id: Uuid,
    /// Status code.
    pub status: String,
    /// Position code.
    pub position: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Registration close.
    pub registration_ends_at: DateTime<Utc>,
    /// Voting close.
    pub voting_ends_at: DateTime<Utc>,
    /// Completion or cancellation time.
    pub ended_at: Option<DateTime<Utc>>,
    /// Elected player.
    pub winner_id: Option<Uuid>,
    /// Counted votes.
    pub total_votes: i32,
}

impl From<&Election> for ElectionRow {
    fn from(e: &Election) -> Self {
        Self {
            id: e.id.into_inner(),
            nation_id: e.nation_id.into_inner(),
            status: e.status.code().to_owned(),
            position: e.position.code().to_owned(),
            started_at: e.started_at,
            registration_ends_at: e.registration_ends_at,
            voting_ends_at: e.voting_ends_at,
            ended_at: e.ended_at,
            winner_id: e.winner_id.map(Into::into),
            total_votes: to_i32(e.total_votes),
        }
    }
}

impl TryFrom<ElectionRow> for Election {
    type Error = StoreError;

    fn try_from(row: ElectionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            nation_id: row.nation_id.into(),
            status: row.status.parse()?,
            position: row.position.parse()?,
            started_at: row.started_at,
            registration_ends_at: row.registration_ends_at,
            voting_ends_at: row.voting_ends_at,
            ended_at: row.ended_at,
            winner_id: row.winner_id.map(Into::into),
            total_votes: to_u32("total_votes", row.total_votes)?,
        })
    }
}

/// A row in the `election_candidates` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateRow {
    /// Registration ID.
    pub id: Uuid,
    /// Election ID.
    pub election_id: Uuid,
    /// Player ID.
    pub player_id: Uuid,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
    /// Slogan.
    pub slogan: Option<String>,
    /// Votes received.
    pub vote_count: i32,
    /// Withdrawn flag.
    pub withdrawn: bool,
}

impl From<&ElectionCandidate> for CandidateRow {
    fn from(c: &ElectionCandidate) -> Self {
        Self {
            id: c.id.into_inner(),
            election_id: c.election_id.into_inner(),
            player_id: c.player_id.into_inner(),
            registered_at: c.registered_at,
            slogan: c.slogan.clone(),
            vote_count: to_i32(c.vote_count),
            withdrawn: c.withdrawn,
        }
    }
}

impl TryFrom<CandidateRow> for ElectionCandidate {
    type Error = StoreError;

    fn try_from(row: CandidateRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            election_id: row.election_id.into(),
            player_id: row.player_id.into(),
            registered_at: row.registered_at,
            slogan: row.slogan,
            vote_count: to_u32("vote_count", row.vote_count)?,
            withdrawn: row.withdrawn,
        })
    }
}

/// A row in the `election_votes` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VoteRow {
    /// Election ID.
    pub election_id: Uuid,
    /// Voting player.
    pub voter_id: Uuid,
    /// Chosen candidate registration.
    pub candidate_id: Uuid,
    /// Cast time.
    pub cast_at: DateTime<Utc>,
}

impl From<&ElectionVote> for VoteRow {
    fn from(v: &ElectionVote) -> Self {
        Self {
            election_id: v.election_id.into_inner(),
            voter_id: v.voter_id.into_inner(),
            candidate_id: v.candidate_id.into_inner(),
            cast_at: v.cast_at,
        }
    }
}

impl From<VoteRow> for ElectionVote {
    fn from(row: VoteRow) -> Self {
        Self {
            election_id: row.election_id.into(),
            voter_id: row.voter_id.into(),
            candidate_id: row.candidate_id.into(),
            cast_at: row.cast_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use conquest_types::{BattleId, RelationKind};

    use super::*;

    #[test]
    fn negative_counter_is_invalid() {
        assert!(matches!(
            to_u32("kills", -1),
            Err(StoreError::InvalidRow(_))
        ));
    }

    #[test]
    fn oversized_counter_saturates_on_write() {
        assert_eq!(to_i32(u32::MAX), i32::MAX);
        assert_eq!(to_i64(u64::MAX), i64::MAX);
    }

    #[test]
    fn unknown_code_is_rejected() {
        let row = RelationRow {
            nation_id: Uuid::now_v7(),
            other_id: Uuid::now_v7(),
            kind: "ALLY".to_owned(),
            established_at: Utc::now(),
            expires_at: None,
        };
        assert!(matches!(
            NationRelation::try_from(row),
            Err(StoreError::Code(_))
        ));
    }

    #[test]
    fn relation_kind_stored_as_code() {
        let relation = NationRelation {
            nation_id: Uuid::now_v7().into(),
            other_id: Uuid::now_v7().into(),
            kind: RelationKind::LiberationCooldown,
            established_at: Utc::now(),
            expires_at: None,
        };
        assert_eq!(RelationRow::from(&relation).kind, "LIBERATION_COOLDOWN");
    }

    #[test]
    fn siege_equipment_order_preserved() {
        let siege = Siege {
            battle_id: BattleId::new(),
            fortification_level: 3,
            walls_health: 10,
            walls_max: 100,
            gates_health: 5,
            gates_max: 50,
            progress: 40,
            equipment_used: vec![SiegeEquipment::Trebuchet, SiegeEquipment::BatteringRam],
            created_at: Utc::now(),
        };
        let row = SiegeRow::from(&siege);
        assert_eq!(row.equipment_used, vec!["TREBUCHET", "BATTERING_RAM"]);
        assert_eq!(Siege::try_from(row).ok(), Some(siege));
    }

    #[test]
    fn event_without_side_maps_to_null() {
        let event = WarEvent {
            id: Uuid::now_v7().into(),
            war_id: Uuid::now_v7().into(),
            event_type: conquest_types::WarEventType::WarStarted,
            nation_id: None,
            side: None,
            description: "started".to_owned(),
            score_delta: 0,
            occurred_at: Utc::now(),
        };
        let row = WarEventRow::from(&event);
        assert_eq!(row.side, None);
        let scored = WarEvent {
            side: Some(WarSide::Defender),
            ..event
        };
        assert_eq!(
            WarEventRow::from(&scored).side.as_deref(),
            Some("DEFENDER")
        );
    }
}
