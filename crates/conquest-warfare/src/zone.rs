//! Game-event adapter for battle zones.
//!
//! The host forwards movement, deaths, and disconnects here. Leaving a
//! battle zone starts a desertion timer; returning before it fires cancels
//! it. A killed participant respawns after a fixed delay.

use std::sync::Arc;

use tracing::{debug, info, warn};

use conquest_types::{Battle, BattleId, PlayerId, Position};

use crate::battle::BattleManager;
use crate::config::BattleRules;
use crate::error::BattleError;
use crate::schedule::{TaskPurpose, TaskScheduler};

/// Result of checking a player's position against their battle zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneCheck {
    /// The player is not in any live battle.
    NotInBattle,
    /// Inside the zone.
    Inside,
    /// Back inside before the grace period ran out.
    Returned,
    /// Just left the zone; the desertion timer started.
    Left,
    /// Still outside with the timer running.
    Outside,
}

/// Routes player events to the battle manager and owns their timers.
pub struct ZoneMonitor {
    battles: Arc<BattleManager>,
    scheduler: Arc<TaskScheduler>,
    rules: BattleRules,
}

impl ZoneMonitor {
    /// Create a monitor over `battles`.
    pub fn new(battles: Arc<BattleManager>, scheduler: Arc<TaskScheduler>) -> Self {
        let rules = battles.rules().clone();
        Self {
            battles,
            scheduler,
            rules,
        }
    }

    /// Check a moved player against their battle zone.
    pub async fn player_moved(&self, player: PlayerId, position: &Position) -> ZoneCheck {
        let Some(battle) = self.current_battle(player).await else {
            return ZoneCheck::NotInBattle;
        };
        // A timer left over from a battle that has since ended no longer
        // applies to the player.
        let stale = self.scheduler.cancel_matching(player, |purpose| {
            matches!(purpose, TaskPurpose::Desertion(other) if other != battle.id)
        });
        if stale > 0 {
            debug!(battle_id = %battle.id, %player, stale, "dropped stale desertion timer");
        }
        let purpose = TaskPurpose::Desertion(battle.id);
        let pending = self.scheduler.is_pending(player, purpose);

        if battle.zone.contains(position) {
            if pending {
                self.scheduler.cancel(player, purpose);
                debug!(battle_id = %battle.id, %player, "returned to battle zone");
                return ZoneCheck::Returned;
            }
            return ZoneCheck::Inside;
        }
        if pending {
            return ZoneCheck::Outside;
        }

        let battles = Arc::clone(&self.battles);
        let id = battle.id;
        self.scheduler.schedule(
            player,
            purpose,
            self.rules.desertion_grace(),
            async move { desert(&battles, id, player).await },
        );
        info!(
            battle_id = %id,
            %player,
            grace_secs = self.rules.desertion_grace_secs,
            "player left battle zone"
        );
        ZoneCheck::Left
    }

    /// Register a kill and schedule the victim's respawn.
    pub async fn player_killed(
        &self,
        battle: BattleId,
        killer: PlayerId,
        victim: PlayerId,
    ) -> Result<Battle, BattleError> {
        let updated = self.battles.register_kill(battle, killer, victim).await?;
        let battles = Arc::clone(&self.battles);
        self.scheduler.schedule(
            victim,
            TaskPurpose::Respawn(battle),
            self.rules.respawn_delay(),
            async move {
                if let Err(err) = battles.respawn_player(battle, victim).await {
                    debug!(battle_id = %battle, player = %victim, %err, "respawn skipped");
                }
            },
        );
        Ok(updated)
    }

    /// Take a disconnected player off the field.
    ///
    /// Returns the battle if their departure ended it.
    pub async fn player_disconnected(&self, player: PlayerId) -> Result<Option<Battle>, BattleError> {
        let cancelled = self.scheduler.cancel_all(player);
        let Some(battle) = self.battles.battle_of(player).await else {
            return Ok(None);
        };
        self.battles.leave_battle(battle, player).await?;
        info!(battle_id = %battle, %player, cancelled, "player disconnected from battle");
        self.battles.conclude_if_side_empty(battle).await
    }

    async fn current_battle(&self, player: PlayerId) -> Option<Battle> {
        let id = self.battles.battle_of(player).await?;
        self.battles.get_battle(id).await
    }
}

async fn desert(battles: &BattleManager, battle: BattleId, player: PlayerId) {
    if let Err(err) = battles.leave_battle(battle, player).await {
        debug!(battle_id = %battle, %player, %err, "desertion skipped");
        return;
    }
    info!(battle_id = %battle, %player, "player deserted");
    match battles.conclude_if_side_empty(battle).await {
        Ok(Some(ended)) => {
            info!(battle_id = %battle, winner = ?ended.winner_id, "battle ended by desertion");
        }
        Ok(None) => {}
        Err(err) => warn!(battle_id = %battle, %err, "failed to conclude battle after desertion"),
    }
}
