//! Tunable rules for wars, battles, sieges, empires, and elections.
//!
//! These values mirror the `warfare` section of `conquest-config.yaml`.
//! Every field has a serde default, so a partial (or missing) section
//! yields the standard rules.

use chrono::TimeDelta;
use rust_decimal::Decimal;
use serde::Deserialize;

use conquest_types::NationRole;

/// All warfare rules, one section per manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WarfareConfig {
    /// War lifecycle rules.
    #[serde(default)]
    pub war: WarRules,

    /// Battle scoring and timer rules.
    #[serde(default)]
    pub battle: BattleRules,

    /// Siege fortification rules.
    #[serde(default)]
    pub siege: SiegeRules,

    /// Vassalage and tribute rules.
    #[serde(default)]
    pub empire: EmpireRules,

    /// Election cycle rules.
    #[serde(default)]
    pub election: ElectionRules,
}

// ---------------------------------------------------------------------------
// War
// ---------------------------------------------------------------------------

/// War lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WarRules {
    /// Hours between declaration and the start of hostilities.
    #[serde(default = "default_start_delay_hours")]
    pub start_delay_hours: i64,

    /// Score lead that ends a war.
    #[serde(default = "default_end_score_threshold")]
    pub end_score_threshold: i64,

    /// Weariness at which a side can no longer fight.
    #[serde(default = "default_weariness_cap")]
    pub weariness_cap: u8,

    /// Weariness a side gains for each lost battle.
    #[serde(default = "default_weariness_per_defeat")]
    pub weariness_per_defeat: u8,

    /// Days of mandatory truce after a war ends.
    #[serde(default = "default_truce_days")]
    pub truce_days: i64,

    /// Longest ceasefire that may be declared, in hours.
    #[serde(default = "default_max_ceasefire_hours")]
    pub max_ceasefire_hours: i64,

    /// Longest accepted casus belli.
    #[serde(default = "default_max_reason_len")]
    pub max_reason_len: usize,

    /// Longest accepted peace terms.
    #[serde(default = "default_max_terms_len")]
    pub max_terms_len: usize,
}

impl WarRules {
    /// Delay between declaration and start.
    pub fn start_delay(&self) -> TimeDelta {
        TimeDelta::try_hours(self.start_delay_hours).unwrap_or(TimeDelta::MAX)
    }

    /// Length of the post-war truce.
    pub fn truce_duration(&self) -> TimeDelta {
        TimeDelta::try_days(self.truce_days).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for WarRules {
    fn default() -> Self {
        Self {
            start_delay_hours: default_start_delay_hours(),
            end_score_threshold: default_end_score_threshold(),
            weariness_cap: default_weariness_cap(),
            weariness_per_defeat: default_weariness_per_defeat(),
            truce_days: default_truce_days(),
            max_ceasefire_hours: default_max_ceasefire_hours(),
            max_reason_len: default_max_reason_len(),
            max_terms_len: default_max_terms_len(),
        }
    }
}

const fn default_start_delay_hours() -> i64 {
    24
}

const fn default_end_score_threshold() -> i64 {
    100
}

const fn default_weariness_cap() -> u8 {
    100
}

const fn default_weariness_per_defeat() -> u8 {
    5
}

const fn default_truce_days() -> i64 {
    7
}

const fn default_max_ceasefire_hours() -> i64 {
    72
}

const fn default_max_reason_len() -> usize {
    256
}

const fn default_max_terms_len() -> usize {
    512
}

// ---------------------------------------------------------------------------
// Battle
// ---------------------------------------------------------------------------

/// Battle scoring and timer rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BattleRules {
    /// Score per kill of margin for the winning side.
    #[serde(default = "default_kill_score")]
    pub kill_score: i64,

    /// Flat bonus for winning a battle.
    #[serde(default = "default_victory_bonus")]
    pub victory_bonus: i64,

    /// Seconds a participant may spend outside the zone before deserting.
    #[serde(default = "default_desertion_grace_secs")]
    pub desertion_grace_secs: u64,

    /// Seconds between death and automatic respawn.
    #[serde(default = "default_respawn_delay_secs")]
    pub respawn_delay_secs: u64,
}

impl BattleRules {
    /// Desertion grace period.
    pub const fn desertion_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.desertion_grace_secs)
    }

    /// Respawn delay.
    pub const fn respawn_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.respawn_delay_secs)
    }
}

impl Default for BattleRules {
    fn default() -> Self {
        Self {
            kill_score: default_kill_score(),
            victory_bonus: default_victory_bonus(),
            desertion_grace_secs: default_desertion_grace_secs(),
            respawn_delay_secs: default_respawn_delay_secs(),
        }
    }
}

const fn default_kill_score() -> i64 {
    5
}

const fn default_victory_bonus() -> i64 {
    50
}

const fn default_desertion_grace_secs() -> u64 {
    30
}

const fn default_respawn_delay_secs() -> u64 {
    5
}

// ---------------------------------------------------------------------------
// Siege
// ---------------------------------------------------------------------------

/// Siege fortification rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiegeRules {
    /// Highest fortification level.
    #[serde(default = "default_max_fortification_level")]
    pub max_fortification_level: u8,

    /// Defense bonus per fortification level at full health.
    #[serde(default = "default_defense_per_level")]
    pub defense_per_level: Decimal,

    /// Share of the bonus carried by the walls; the gates carry the rest.
    #[serde(default = "default_walls_weight")]
    pub walls_weight: Decimal,
}

impl Default for SiegeRules {
    fn default() -> Self {
        Self {
            max_fortification_level: default_max_fortification_level(),
            defense_per_level: default_defense_per_level(),
            walls_weight: default_walls_weight(),
        }
    }
}

const fn default_max_fortification_level() -> u8 {
    5
}

fn default_defense_per_level() -> Decimal {
    Decimal::new(10, 2)
}

fn default_walls_weight() -> Decimal {
    Decimal::new(7, 1)
}

// ---------------------------------------------------------------------------
// Empire
// ---------------------------------------------------------------------------

/// Vassalage and tribute rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmpireRules {
    /// Most vassals one overlord may hold.
    #[serde(default = "default_max_vassals")]
    pub max_vassals: usize,

    /// Overlord power must be at least this multiple of the target's.
    #[serde(default = "default_power_ratio")]
    pub power_ratio: Decimal,

    /// Share of a vassal's balance paid per tribute collection.
    #[serde(default = "default_tribute_rate")]
    pub tribute_rate: Decimal,

    /// Days a forcefully liberated vassal is protected.
    #[serde(default = "default_liberation_cooldown_days")]
    pub liberation_cooldown_days: i64,

    /// Hours between automatic tribute collections.
    #[serde(default = "default_tribute_interval_hours")]
    pub tribute_interval_hours: i64,
}

impl EmpireRules {
    /// Length of the liberation cooldown.
    pub fn liberation_cooldown(&self) -> TimeDelta {
        TimeDelta::try_days(self.liberation_cooldown_days).unwrap_or(TimeDelta::MAX)
    }

    /// Interval between tribute collections.
    pub fn tribute_interval(&self) -> TimeDelta {
        TimeDelta::try_hours(self.tribute_interval_hours).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for EmpireRules {
    fn default() -> Self {
        Self {
            max_vassals: default_max_vassals(),
            power_ratio: default_power_ratio(),
            tribute_rate: default_tribute_rate(),
            liberation_cooldown_days: default_liberation_cooldown_days(),
            tribute_interval_hours: default_tribute_interval_hours(),
        }
    }
}

const fn default_max_vassals() -> usize {
    5
}

fn default_power_ratio() -> Decimal {
    Decimal::new(15, 1)
}

fn default_tribute_rate() -> Decimal {
    Decimal::new(10, 2)
}

const fn default_liberation_cooldown_days() -> i64 {
    14
}

const fn default_tribute_interval_hours() -> i64 {
    24
}

// ---------------------------------------------------------------------------
// Election
// ---------------------------------------------------------------------------

/// Election cycle rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ElectionRules {
    /// Days candidates may register.
    #[serde(default = "default_registration_days")]
    pub registration_days: i64,

    /// Days members may vote.
    #[serde(default = "default_voting_days")]
    pub voting_days: i64,

    /// Non-withdrawn candidates needed to open voting.
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Lowest role allowed to stand.
    #[serde(default = "default_min_candidate_role")]
    pub min_candidate_role: NationRole,

    /// Longest accepted campaign slogan.
    #[serde(default = "default_max_slogan_len")]
    pub max_slogan_len: usize,
}

impl ElectionRules {
    /// Length of the registration phase.
    pub fn registration_period(&self) -> TimeDelta {
        TimeDelta::try_days(self.registration_days).unwrap_or(TimeDelta::MAX)
    }

    /// Length of the voting phase.
    pub fn voting_period(&self) -> TimeDelta {
        TimeDelta::try_days(self.voting_days).unwrap_or(TimeDelta::MAX)
    }
}

impl Default for ElectionRules {
    fn default() -> Self {
        Self {
            registration_days: default_registration_days(),
            voting_days: default_voting_days(),
            min_candidates: default_min_candidates(),
            min_candidate_role: default_min_candidate_role(),
            max_slogan_len: default_max_slogan_len(),
        }
    }
}

const fn default_registration_days() -> i64 {
    2
}

const fn default_voting_days() -> i64 {
    3
}

const fn default_min_candidates() -> usize {
    2
}

const fn default_min_candidate_role() -> NationRole {
    NationRole::Citizen
}

const fn default_max_slogan_len() -> usize {
    64
}
