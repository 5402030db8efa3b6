//! Error types for the conquest-warfare crate.
//!
//! Every manager operation that can fail returns one of these typed errors.
//! Illegal transitions carry the status the entity was in. Store failures
//! propagate unchanged; when one occurs the manager's cache is untouched.

use chrono::{DateTime, Utc};

use conquest_ledger::LedgerError;
use conquest_store::StoreError;
use conquest_types::{
    BattleId, BattleStatus, BattleType, ElectionId, ElectionStatus, NationId, NationRole,
    PlayerId, WarId, WarSide, WarStatus,
};

/// Errors from the war lifecycle manager.
#[derive(Debug, thiserror::Error)]
pub enum WarError {
    /// A nation tried to declare war on itself.
    #[error("nation {0} cannot declare war on itself")]
    SelfWar(NationId),

    /// The nation is not known to the directory.
    #[error("unknown nation: {0}")]
    UnknownNation(NationId),

    /// The casus belli is blank or too long.
    #[error("war reason must be 1..={max} characters, got {len}")]
    InvalidReason {
        /// Length supplied.
        len: usize,
        /// Longest accepted.
        max: usize,
    },

    /// The peace terms are blank or too long.
    #[error("peace terms must be 1..={max} characters, got {len}")]
    InvalidTerms {
        /// Length supplied.
        len: usize,
        /// Longest accepted.
        max: usize,
    },

    /// The pair already has an open war.
    #[error("nations {a} and {b} are already at war")]
    AlreadyAtWar {
        /// First nation.
        a: NationId,
        /// Second nation.
        b: NationId,
    },

    /// A post-war truce forbids a new declaration.
    #[error("truce in force until {until}")]
    TruceInForce {
        /// When the truce lapses.
        until: DateTime<Utc>,
    },

    /// No war with this ID exists.
    #[error("war not found: {0}")]
    WarNotFound(WarId),

    /// The operation is not allowed in the war's current status.
    #[error("cannot {action} war {war} while {status}")]
    InvalidTransition {
        /// The war.
        war: WarId,
        /// Its current status.
        status: WarStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// Only the declaring and declared-upon nations may do this.
    #[error("nation {nation} is not an original party to war {war}")]
    NotOriginalNation {
        /// The war.
        war: WarId,
        /// The nation that tried.
        nation: NationId,
    },

    /// The nation already fights in this war on the requested side.
    #[error("nation {nation} already takes part in war {war}")]
    AlreadyParticipant {
        /// The war.
        war: WarId,
        /// The nation.
        nation: NationId,
    },

    /// The nation fights on the other side and may not switch.
    #[error("nation {nation} already fights as {current} in war {war}")]
    SideSwitch {
        /// The war.
        war: WarId,
        /// The nation.
        nation: NationId,
        /// The side it is on.
        current: WarSide,
    },

    /// Ceasefire duration out of range.
    #[error("ceasefire must last 1..={max} hours, got {hours}")]
    InvalidCeasefire {
        /// Hours requested.
        hours: i64,
        /// Longest accepted.
        max: i64,
    },

    /// Score and weariness amounts must be positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// The war cannot be concluded yet.
    #[error("war {0} has not met an end condition")]
    EndConditionNotMet(WarId),

    /// An event failed validation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the battle manager.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    /// No live battle with this ID exists.
    #[error("battle not found: {0}")]
    BattleNotFound(BattleId),

    /// Battles can only be created under an active war.
    #[error("war {war} is {status}; battles need an active war")]
    WarNotActive {
        /// The parent war.
        war: WarId,
        /// Its status.
        status: WarStatus,
    },

    /// The nation does not fight in the parent war.
    #[error("nation {nation} does not take part in war {war}")]
    NotWarParticipant {
        /// The parent war.
        war: WarId,
        /// The nation.
        nation: NationId,
    },

    /// Attacker and defender must be on opposite sides.
    #[error("nations {a} and {b} fight on the same side")]
    SameSide {
        /// First nation.
        a: NationId,
        /// Second nation.
        b: NationId,
    },

    /// The zone radius must be positive and finite.
    #[error("invalid battle zone radius: {0}")]
    InvalidZone(f64),

    /// The operation is not allowed in the battle's current status.
    #[error("cannot {action} battle {battle} while {status}")]
    InvalidTransition {
        /// The battle.
        battle: BattleId,
        /// Its current status.
        status: BattleStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// The player is already in another live battle.
    #[error("player {player} is already in battle {battle}")]
    AlreadyInBattle {
        /// The player.
        player: PlayerId,
        /// The battle they are in.
        battle: BattleId,
    },

    /// The player's nation does not fight on the requested side.
    #[error("nation {nation} does not fight as {side}")]
    WrongSide {
        /// The nation.
        nation: NationId,
        /// The side requested.
        side: WarSide,
    },

    /// The player is not present on the roster.
    #[error("player {player} is not in battle {battle}")]
    NotInBattle {
        /// The battle.
        battle: BattleId,
        /// The player.
        player: PlayerId,
    },

    /// Killer and victim fight on the same side.
    #[error("players {killer} and {victim} fight on the same side")]
    SameSideKill {
        /// The killer.
        killer: PlayerId,
        /// The victim.
        victim: PlayerId,
    },

    /// The victim is already dead.
    #[error("player {0} is already dead")]
    VictimAlreadyDead(PlayerId),

    /// The supplied winner is not one of the battle's nations.
    #[error("nation {nation} is not a side of battle {battle}")]
    InvalidWinner {
        /// The battle.
        battle: BattleId,
        /// The nation supplied.
        nation: NationId,
    },

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The parent war rejected the settlement.
    #[error(transparent)]
    War(#[from] WarError),
}

/// Errors from the siege extension.
#[derive(Debug, thiserror::Error)]
pub enum SiegeError {
    /// No live battle with this ID exists.
    #[error("battle not found: {0}")]
    BattleNotFound(BattleId),

    /// Sieges attach only to SIEGE battles.
    #[error("battle {battle} is a {battle_type}, not a siege")]
    NotSiegeBattle {
        /// The battle.
        battle: BattleId,
        /// Its type.
        battle_type: BattleType,
    },

    /// The battle already carries a siege.
    #[error("battle {0} already has a siege")]
    SiegeExists(BattleId),

    /// The battle carries no siege.
    #[error("no siege for battle {0}")]
    SiegeNotFound(BattleId),

    /// Fortification level out of range.
    #[error("fortification level must be 1..={max}, got {level}")]
    InvalidLevel {
        /// Level supplied.
        level: u8,
        /// Highest accepted.
        max: u8,
    },

    /// Wall and gate health must be positive.
    #[error("siege health must be positive")]
    InvalidHealth,

    /// The operation is not allowed in the battle's current status.
    #[error("cannot {action} siege {battle} while {status}")]
    InvalidTransition {
        /// The battle.
        battle: BattleId,
        /// Its current status.
        status: BattleStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the empire hierarchy manager.
#[derive(Debug, thiserror::Error)]
pub enum EmpireError {
    /// Vassalization was refused.
    #[error("cannot vassalize {target}: {reason:?}")]
    NotEligible {
        /// The would-be vassal.
        target: NationId,
        /// Why not.
        reason: crate::empire::VassalEligibility,
    },

    /// The nation is not a vassal.
    #[error("nation {0} is not a vassal")]
    NotVassal(NationId),

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from starting, advancing, or cancelling elections.
#[derive(Debug, thiserror::Error)]
pub enum ElectionError {
    /// The nation is not known to the directory.
    #[error("unknown nation: {0}")]
    UnknownNation(NationId),

    /// The nation's government does not hold elections.
    #[error("nation {0} does not hold elections")]
    NoElectoralGovernment(NationId),

    /// The nation already has a live election.
    #[error("nation {nation} already has live election {election}")]
    ElectionAlreadyLive {
        /// The nation.
        nation: NationId,
        /// The live election.
        election: ElectionId,
    },

    /// The nation has no live election.
    #[error("nation {0} has no live election")]
    NoLiveElection(NationId),

    /// No live election with this ID exists.
    #[error("election not found: {0}")]
    ElectionNotFound(ElectionId),

    /// The operation is not allowed in the election's current status.
    #[error("cannot {action} election {election} while {status}")]
    InvalidTransition {
        /// The election.
        election: ElectionId,
        /// Its current status.
        status: ElectionStatus,
        /// What was attempted.
        action: &'static str,
    },

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from registering or withdrawing a candidate.
#[derive(Debug, thiserror::Error)]
pub enum CandidacyError {
    /// The nation has no live election.
    #[error("nation {0} has no live election")]
    NoLiveElection(NationId),

    /// Registration is closed.
    #[error("election is {0}, not in registration")]
    ElectionNotInRegistration(ElectionStatus),

    /// Withdrawal is closed.
    #[error("election is {0}; withdrawal is closed")]
    WithdrawalClosed(ElectionStatus),

    /// The player does not belong to the nation.
    #[error("player {player} is not a member of nation {nation}")]
    NotMember {
        /// The player.
        player: PlayerId,
        /// The nation.
        nation: NationId,
    },

    /// The player's role is too junior to stand.
    #[error("role {role} is below the required {required}")]
    InsufficientRank {
        /// The player's role.
        role: NationRole,
        /// Lowest role allowed.
        required: NationRole,
    },

    /// The player has already registered.
    #[error("player {0} is already registered")]
    AlreadyRegistered(PlayerId),

    /// The slogan is too long.
    #[error("slogan must be at most {max} characters, got {len}")]
    SloganTooLong {
        /// Length supplied.
        len: usize,
        /// Longest accepted.
        max: usize,
    },

    /// The player never registered.
    #[error("player {0} is not a candidate")]
    NotRegistered(PlayerId),

    /// The candidate already withdrew.
    #[error("player {0} has already withdrawn")]
    AlreadyWithdrawn(PlayerId),

    /// The store rejected the transition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from casting a vote.
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    /// The nation has no live election.
    #[error("nation {0} has no live election")]
    NoLiveElection(NationId),

    /// Voting is not open.
    #[error("election is {0}, not in voting")]
    ElectionNotInVoting(ElectionStatus),

    /// The voter does not belong to the nation.
    #[error("player {player} is not a member of nation {nation}")]
    NotMember {
        /// The voter.
        player: PlayerId,
        /// The nation.
        nation: NationId,
    },

    /// The voter has already voted.
    #[error("player {0} has already voted")]
    AlreadyVoted(PlayerId),

    /// The chosen player is not a candidate.
    #[error("player {0} is not a candidate")]
    CandidateNotFound(PlayerId),

    /// The chosen candidate withdrew.
    #[error("candidate {0} has withdrawn")]
    CandidateWithdrawn(PlayerId),

    /// The store rejected the vote.
    #[error(transparent)]
    Store(#[from] StoreError),
}
