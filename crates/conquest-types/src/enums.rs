//! Enumeration types for the Conquest warfare core.
//!
//! Every enum here has a stable SCREAMING_SNAKE storage code. The same code
//! is used by serde and by the persistence layer, so a row written by one
//! build can always be read back by the next.

use serde::{Deserialize, Serialize};

/// A storage code that does not match any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} code: {code:?}")]
pub struct UnknownCode {
    /// The enum being parsed.
    pub kind: &'static str,
    /// The code that failed to parse.
    pub code: String,
}

/// Generates an enum with a stable storage code per variant.
///
/// Produces `code()`, `ALL`, [`core::str::FromStr`], and
/// [`core::fmt::Display`] so the persistence layer never hand-maps strings.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $code:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stable storage code for this variant.
            pub const fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }
        }

        impl core::str::FromStr for $name {
            type Err = UnknownCode;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok(Self::$variant),)+
                    other => Err(UnknownCode {
                        kind: stringify!($name),
                        code: other.to_owned(),
                    }),
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// War
// ---------------------------------------------------------------------------

coded_enum! {
    /// Lifecycle status of a war.
    ///
    /// `DECLARED -> ACTIVE -> {NEGOTIATING <-> ACTIVE} -> {ENDED | SURRENDERED}`,
    /// with `CEASEFIRE` as a resumable pause entered from `ACTIVE`.
    WarStatus {
        /// Declared, waiting out the start delay.
        Declared => "DECLARED",
        /// Hostilities in progress.
        Active => "ACTIVE",
        /// A peace proposal is on the table.
        Negotiating => "NEGOTIATING",
        /// Hostilities paused until the ceasefire expires or is lifted.
        Ceasefire => "CEASEFIRE",
        /// Ended by peace or by reaching an end condition.
        Ended => "ENDED",
        /// Ended by one side surrendering.
        Surrendered => "SURRENDERED",
    }
}

impl WarStatus {
    /// Whether the war is over and can no longer change.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Surrendered)
    }

    /// Whether the war still occupies its nation pair.
    pub const fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Whether hostilities have begun and not yet ended.
    pub const fn is_hostile(self) -> bool {
        matches!(self, Self::Active | Self::Negotiating | Self::Ceasefire)
    }
}

coded_enum! {
    /// The strategic objective of a war.
    WarGoal {
        /// Seize territory from the defender.
        Conquest => "CONQUEST",
        /// Force the defender into vassalage.
        Subjugation => "SUBJUGATION",
        /// Unlimited war; scores count for more.
        TotalWar => "TOTAL_WAR",
        /// Break free from an overlord.
        Independence => "INDEPENDENCE",
        /// Extract a humiliating peace; scores count for less.
        Humiliation => "HUMILIATION",
    }
}

impl WarGoal {
    /// Score lead the winner needs for the goal to count as achieved.
    pub const fn required_score(self) -> i64 {
        match self {
            Self::Conquest => 100,
            Self::Subjugation => 150,
            Self::TotalWar => 200,
            Self::Independence => 75,
            Self::Humiliation => 50,
        }
    }

    /// Percentage applied to every score added to a war with this goal.
    pub const fn score_multiplier_pct(self) -> i64 {
        match self {
            Self::Conquest | Self::Subjugation | Self::Independence => 100,
            Self::TotalWar => 150,
            Self::Humiliation => 75,
        }
    }
}

coded_enum! {
    /// Which side of a war a nation or player fights on.
    WarSide {
        /// The declaring side.
        Attacker => "ATTACKER",
        /// The side war was declared on.
        Defender => "DEFENDER",
    }
}

impl WarSide {
    /// The other side.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }
}

coded_enum! {
    /// Type of an entry in the war event ledger.
    WarEventType {
        /// War declared.
        WarDeclared => "WAR_DECLARED",
        /// Start delay elapsed; hostilities began.
        WarStarted => "WAR_STARTED",
        /// A non-original nation joined a side.
        AllyJoined => "ALLY_JOINED",
        /// Score added to a side.
        ScoreAdded => "SCORE_ADDED",
        /// Weariness added to a side.
        WearinessAdded => "WEARINESS_ADDED",
        /// A battle ended with a winner.
        BattleWon => "BATTLE_WON",
        /// A battle ended without a winner.
        BattleDrawn => "BATTLE_DRAWN",
        /// Peace terms proposed.
        PeaceProposed => "PEACE_PROPOSED",
        /// Peace terms rejected.
        PeaceRejected => "PEACE_REJECTED",
        /// Peace terms accepted.
        PeaceAccepted => "PEACE_ACCEPTED",
        /// Ceasefire declared.
        CeasefireDeclared => "CEASEFIRE_DECLARED",
        /// Ceasefire lifted or expired.
        CeasefireEnded => "CEASEFIRE_ENDED",
        /// One side surrendered.
        Surrendered => "SURRENDERED",
        /// The war ended.
        WarEnded => "WAR_ENDED",
        /// A truce was established between the original nations.
        TruceEstablished => "TRUCE_ESTABLISHED",
    }
}

// ---------------------------------------------------------------------------
// Battle and siege
// ---------------------------------------------------------------------------

coded_enum! {
    /// Kind of battle; determines its base score.
    BattleType {
        /// Small clash.
        Skirmish => "SKIRMISH",
        /// Strike on enemy territory.
        Raid => "RAID",
        /// Open-field engagement.
        FieldBattle => "FIELD_BATTLE",
        /// Assault on a fortification; carries a siege model.
        Siege => "SIEGE",
    }
}

impl BattleType {
    /// Base score awarded for a decided battle of this type.
    pub const fn base_score(self) -> i64 {
        match self {
            Self::Skirmish => 10,
            Self::Raid => 20,
            Self::FieldBattle => 30,
            Self::Siege => 50,
        }
    }
}

coded_enum! {
    /// Lifecycle status of a battle.
    BattleStatus {
        /// Created with a future start time.
        Scheduled => "SCHEDULED",
        /// Created without a start time; players may gather.
        Preparation => "PREPARATION",
        /// Fighting in progress.
        InProgress => "IN_PROGRESS",
        /// Ended and scored.
        Completed => "COMPLETED",
        /// Called off without a score.
        Cancelled => "CANCELLED",
    }
}

impl BattleStatus {
    /// Whether the battle is still in the live cache.
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether players may join the roster.
    pub const fn accepts_participants(self) -> bool {
        matches!(self, Self::Preparation | Self::InProgress)
    }
}

coded_enum! {
    /// Siege equipment with fixed structural damage.
    SiegeEquipment {
        /// Gate breaker.
        BatteringRam => "BATTERING_RAM",
        /// Light wall damage.
        Catapult => "CATAPULT",
        /// Heavy wall damage.
        Trebuchet => "TREBUCHET",
        /// Lets troops over the walls.
        SiegeTower => "SIEGE_TOWER",
        /// Undermines the walls.
        Sappers => "SAPPERS",
    }
}

impl SiegeEquipment {
    /// Damage dealt to the walls per use.
    pub const fn wall_damage(self) -> u32 {
        match self {
            Self::BatteringRam => 0,
            Self::Catapult => 30,
            Self::Trebuchet => 60,
            Self::SiegeTower => 10,
            Self::Sappers => 40,
        }
    }

    /// Damage dealt to the gates per use.
    pub const fn gate_damage(self) -> u32 {
        match self {
            Self::BatteringRam => 50,
            Self::Catapult => 10,
            Self::Trebuchet => 15,
            Self::SiegeTower | Self::Sappers => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

coded_enum! {
    /// Kind of a directed relation row between two nations.
    RelationKind {
        /// `nation` is a vassal of `other`.
        Vassal => "VASSAL",
        /// `nation` is the overlord of `other`.
        Overlord => "OVERLORD",
        /// `nation` and `other` may not go to war until expiry.
        Truce => "TRUCE",
        /// `nation` may not be vassalized until expiry.
        LiberationCooldown => "LIBERATION_COOLDOWN",
    }
}

// ---------------------------------------------------------------------------
// Politics
// ---------------------------------------------------------------------------

coded_enum! {
    /// Lifecycle status of an election.
    ElectionStatus {
        /// Candidates may register.
        Registration => "REGISTRATION",
        /// Members may vote.
        Voting => "VOTING",
        /// Votes are being tallied.
        Counting => "COUNTING",
        /// A winner was elected.
        Completed => "COMPLETED",
        /// Called off or failed for lack of candidates or votes.
        Cancelled => "CANCELLED",
    }
}

impl ElectionStatus {
    /// Whether the election still occupies its nation's election slot.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Registration | Self::Voting | Self::Counting)
    }
}

coded_enum! {
    /// Office an election fills.
    ElectionPosition {
        /// Head of the nation; winning transfers leadership.
        Leader => "LEADER",
        /// Keeper of the treasury.
        Treasurer => "TREASURER",
        /// Commander of the armies.
        Marshal => "MARSHAL",
    }
}

coded_enum! {
    /// Form of government of a nation.
    GovernmentType {
        /// Rule by elected leaders.
        Democracy => "DEMOCRACY",
        /// Rule by elected representatives.
        Republic => "REPUBLIC",
        /// Hereditary rule.
        Monarchy => "MONARCHY",
        /// Rule by force.
        Dictatorship => "DICTATORSHIP",
        /// Rule by religious authority.
        Theocracy => "THEOCRACY",
        /// Rule by chieftain.
        Tribal => "TRIBAL",
    }
}

impl GovernmentType {
    /// Whether this government holds elections.
    pub const fn has_elections(self) -> bool {
        matches!(self, Self::Democracy | Self::Republic)
    }
}

coded_enum! {
    /// A player's role within their nation, ordered by rank.
    NationRole {
        /// Newly admitted.
        Recruit => "RECRUIT",
        /// Full member.
        Citizen => "CITIZEN",
        /// Trusted member.
        Officer => "OFFICER",
        /// Member of the government.
        Minister => "MINISTER",
        /// Head of the nation.
        Leader => "LEADER",
    }
}

impl NationRole {
    /// Numeric rank; higher outranks lower.
    pub const fn rank(self) -> u8 {
        match self {
            Self::Recruit => 0,
            Self::Citizen => 1,
            Self::Officer => 2,
            Self::Minister => 3,
            Self::Leader => 4,
        }
    }

    /// The role one rank below this one (recruits stay recruits).
    pub const fn demoted(self) -> Self {
        match self {
            Self::Recruit | Self::Citizen => Self::Recruit,
            Self::Officer => Self::Citizen,
            Self::Minister => Self::Officer,
            Self::Leader => Self::Minister,
        }
    }
}
