//! The nation directory boundary.
//!
//! Nation identity, membership, power, and treasury are owned by the host
//! game. The warfare core reaches them only through [`NationDirectory`],
//! injected as `Arc<dyn NationDirectory>`. [`StaticDirectory`] is an
//! in-memory implementation for tests and the demo host.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;

use conquest_types::{GovernmentType, NationId, NationRole, PlayerId};

/// What the core needs to know about a nation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NationProfile {
    /// Nation ID.
    pub id: NationId,
    /// Display name.
    pub name: String,
    /// Military power used for vassalization checks.
    pub power: Decimal,
    /// Treasury balance.
    pub balance: Decimal,
    /// Current leader, if any.
    pub leader: Option<PlayerId>,
    /// Form of government.
    pub government: GovernmentType,
}

/// A player's membership in a nation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// The player's nation.
    pub nation: NationId,
    /// The player's role within it.
    pub role: NationRole,
}

/// Errors returned by a [`NationDirectory`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The nation does not exist.
    #[error("unknown nation: {0}")]
    UnknownNation(NationId),

    /// The player belongs to no nation, or to a different one.
    #[error("player {player} is not a member of nation {nation}")]
    NotMember {
        /// The player.
        player: PlayerId,
        /// The nation they were expected to belong to.
        nation: NationId,
    },

    /// A debit exceeded the balance.
    #[error("nation {nation} cannot pay {requested}: balance is {available}")]
    InsufficientFunds {
        /// The nation being debited.
        nation: NationId,
        /// Requested amount.
        requested: Decimal,
        /// Current balance.
        available: Decimal,
    },

    /// Amounts must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// A balance calculation overflowed.
    #[error("balance overflow for nation {0}")]
    Overflow(NationId),
}

/// Access to nation state owned by the host game.
pub trait NationDirectory: Send + Sync {
    /// Look up a nation.
    fn profile(&self, nation: NationId) -> Option<NationProfile>;

    /// Look up a player's nation and role.
    fn membership(&self, player: PlayerId) -> Option<Membership>;

    /// Remove `amount` from a nation's treasury.
    fn debit(&self, nation: NationId, amount: Decimal) -> Result<(), DirectoryError>;

    /// Add `amount` to a nation's treasury.
    fn credit(&self, nation: NationId, amount: Decimal) -> Result<(), DirectoryError>;

    /// Make `new_leader` the nation's leader, demoting the previous leader
    /// and any other member holding the leader role one rank.
    fn transfer_leadership(
        &self,
        nation: NationId,
        new_leader: PlayerId,
    ) -> Result<(), DirectoryError>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    nations: HashMap<NationId, NationProfile>,
    members: HashMap<PlayerId, Membership>,
}

/// In-memory [`NationDirectory`].
#[derive(Debug, Default)]
pub struct StaticDirectory {
    state: Mutex<DirectoryState>,
}

impl StaticDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a nation.
    pub fn add_nation(&self, profile: NationProfile) {
        self.lock().nations.insert(profile.id, profile);
    }

    /// Remove a nation and every membership in it.
    pub fn remove_nation(&self, nation: NationId) -> Option<NationProfile> {
        let mut state = self.lock();
        state.members.retain(|_, m| m.nation != nation);
        state.nations.remove(&nation)
    }

    /// Add a player to a nation with `role`.
    pub fn add_member(&self, player: PlayerId, nation: NationId, role: NationRole) {
        self.lock()
            .members
            .insert(player, Membership { nation, role });
    }

    /// Set a nation's power.
    pub fn set_power(&self, nation: NationId, power: Decimal) {
        if let Some(profile) = self.lock().nations.get_mut(&nation) {
            profile.power = power;
        }
    }

    /// A nation's treasury balance.
    pub fn balance(&self, nation: NationId) -> Option<Decimal> {
        self.lock().nations.get(&nation).map(|p| p.balance)
    }

    /// A player's role, if they belong to any nation.
    pub fn role_of(&self, player: PlayerId) -> Option<NationRole> {
        self.lock().members.get(&player).map(|m| m.role)
    }
}

impl NationDirectory for StaticDirectory {
    fn profile(&self, nation: NationId) -> Option<NationProfile> {
        self.lock().nations.get(&nation).cloned()
    }

    fn membership(&self, player: PlayerId) -> Option<Membership> {
        self.lock().members.get(&player).copied()
    }

    fn debit(&self, nation: NationId, amount: Decimal) -> Result<(), DirectoryError> {
        if amount <= Decimal::ZERO {
            return Err(DirectoryError::InvalidAmount(amount));
        }
        let mut state = self.lock();
        let profile = state
            .nations
            .get_mut(&nation)
            .ok_or(DirectoryError::UnknownNation(nation))?;
        if profile.balance < amount {
            return Err(DirectoryError::InsufficientFunds {
                nation,
                requested: amount,
                available: profile.balance,
            });
        }
        profile.balance = profile
            .balance
            .checked_sub(amount)
            .ok_or(DirectoryError::Overflow(nation))?;
        Ok(())
    }

    fn credit(&self, nation: NationId, amount: Decimal) -> Result<(), DirectoryError> {
        if amount <= Decimal::ZERO {
            return Err(DirectoryError::InvalidAmount(amount));
        }
        let mut state = self.lock();
        let profile = state
            .nations
            .get_mut(&nation)
            .ok_or(DirectoryError::UnknownNation(nation))?;
        profile.balance = profile
            .balance
            .checked_add(amount)
            .ok_or(DirectoryError::Overflow(nation))?;
        Ok(())
    }

    fn transfer_leadership(
        &self,
        nation: NationId,
        new_leader: PlayerId,
    ) -> Result<(), DirectoryError> {
        let mut state = self.lock();
        let is_member = state
            .members
            .get(&new_leader)
            .is_some_and(|m| m.nation == nation);
        if !is_member {
            return Err(DirectoryError::NotMember {
                player: new_leader,
                nation,
            });
        }

        let profile = state
            .nations
            .get_mut(&nation)
            .ok_or(DirectoryError::UnknownNation(nation))?;
        let previous = profile.leader.replace(new_leader);

        // The recorded leader and anyone else still holding the role step
        // down, each once.
        for (player, member) in &mut state.members {
            if member.nation != nation {
                continue;
            }
            if *player == new_leader {
                member.role = NationRole::Leader;
            } else if member.role == NationRole::Leader || previous == Some(*player) {
                member.role = member.role.demoted();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nation(balance: i64) -> NationProfile {
        NationProfile {
            id: NationId::new(),
            name: "Avalon".to_owned(),
            power: Decimal::new(100, 0),
            balance: Decimal::new(balance, 0),
            leader: None,
            government: GovernmentType::Democracy,
        }
    }

    #[test]
    fn debit_and_credit_move_balance() {
        let directory = StaticDirectory::new();
        let n = nation(100);
        let id = n.id;
        directory.add_nation(n);

        assert!(directory.debit(id, Decimal::new(30, 0)).is_ok());
        assert!(directory.credit(id, Decimal::new(5, 0)).is_ok());
        assert_eq!(directory.balance(id), Some(Decimal::new(75, 0)));
    }

    #[test]
    fn overdraft_rejected() {
        let directory = StaticDirectory::new();
        let n = nation(10);
        let id = n.id;
        directory.add_nation(n);

        let result = directory.debit(id, Decimal::new(11, 0));
        assert!(matches!(
            result,
            Err(DirectoryError::InsufficientFunds { .. })
        ));
        assert_eq!(directory.balance(id), Some(Decimal::new(10, 0)));
    }

    #[test]
    fn credit_to_removed_nation_fails() {
        let directory = StaticDirectory::new();
        let n = nation(10);
        let id = n.id;
        directory.add_nation(n);
        directory.remove_nation(id);

        assert_eq!(
            directory.credit(id, Decimal::ONE),
            Err(DirectoryError::UnknownNation(id))
        );
    }

    #[test]
    fn leadership_transfer_demotes_previous_leader() {
        let directory = StaticDirectory::new();
        let mut n = nation(0);
        let old = PlayerId::new();
        let new = PlayerId::new();
        n.leader = Some(old);
        let id = n.id;
        directory.add_nation(n);
        directory.add_member(old, id, NationRole::Leader);
        directory.add_member(new, id, NationRole::Citizen);

        assert!(directory.transfer_leadership(id, new).is_ok());
        assert_eq!(directory.role_of(old), Some(NationRole::Minister));
        assert_eq!(directory.role_of(new), Some(NationRole::Leader));
        assert_eq!(directory.profile(id).and_then(|p| p.leader), Some(new));
    }

    #[test]
    fn unrecorded_leader_role_is_demoted_too() {
        let directory = StaticDirectory::new();
        let n = nation(0);
        let id = n.id;
        directory.add_nation(n);
        let stray = PlayerId::new();
        let new = PlayerId::new();
        let bystander = PlayerId::new();
        directory.add_member(stray, id, NationRole::Leader);
        directory.add_member(new, id, NationRole::Citizen);
        directory.add_member(bystander, id, NationRole::Officer);

        assert!(directory.transfer_leadership(id, new).is_ok());
        assert_eq!(directory.role_of(stray), Some(NationRole::Minister));
        assert_eq!(directory.role_of(new), Some(NationRole::Leader));
        assert_eq!(directory.role_of(bystander), Some(NationRole::Officer));
    }

    #[test]
    fn leadership_requires_membership() {
        let directory = StaticDirectory::new();
        let n = nation(0);
        let id = n.id;
        directory.add_nation(n);

        let outsider = PlayerId::new();
        assert!(matches!(
            directory.transfer_leadership(id, outsider),
            Err(DirectoryError::NotMember { .. })
        ));
    }
}
