//! Siege extension for SIEGE battles.
//!
//! A siege tracks wall and gate health, attacker progress, and the
//! equipment brought to bear. Its structural damage feeds a defense bonus
//! that combat code applies to the defenders.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use conquest_store::{Changeset, Store, StoreSnapshot};
use conquest_types::{Battle, BattleId, BattleStatus, BattleType, Siege, SiegeEquipment};

use crate::battle::BattleManager;
use crate::clock::Clock;
use crate::config::SiegeRules;
use crate::error::SiegeError;

/// Initial structural health of a siege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fortification {
    /// Fortification level of the defended structure.
    pub level: u8,
    /// Full wall health.
    pub walls: u32,
    /// Full gate health.
    pub gates: u32,
}

/// Defense bonus granted by a fortification in its current state.
///
/// Each level is worth `defense_per_level` at full health. The walls carry
/// `walls_weight` of it and the gates the rest, each scaled by remaining
/// health.
pub fn defense_bonus(siege: &Siege, rules: &SiegeRules) -> Option<Decimal> {
    let ratio = |health: u32, max: u32| {
        if max == 0 {
            Some(Decimal::ZERO)
        } else {
            Decimal::from(health).checked_div(Decimal::from(max))
        }
    };
    let walls = ratio(siege.walls_health, siege.walls_max)?;
    let gates = ratio(siege.gates_health, siege.gates_max)?;
    let gates_weight = Decimal::ONE.checked_sub(rules.walls_weight)?;
    let integrity = walls
        .checked_mul(rules.walls_weight)?
        .checked_add(gates.checked_mul(gates_weight)?)?;
    Decimal::from(siege.fortification_level)
        .checked_mul(rules.defense_per_level)?
        .checked_mul(integrity)
}

/// Which structure a hit lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Structure {
    Walls,
    Gates,
}

/// Owns the siege model of every live SIEGE battle.
pub struct SiegeManager {
    store: Arc<dyn Store>,
    battles: Arc<BattleManager>,
    clock: Arc<dyn Clock>,
    rules: SiegeRules,
    sieges: RwLock<HashMap<BattleId, Siege>>,
}

impl SiegeManager {
    /// Create a manager with an empty cache.
    pub fn new(
        store: Arc<dyn Store>,
        battles: Arc<BattleManager>,
        clock: Arc<dyn Clock>,
        rules: SiegeRules,
    ) -> Self {
        Self {
            store,
            battles,
            clock,
            rules,
            sieges: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the cache with the sieges in `snapshot`.
    pub async fn restore(&self, snapshot: &StoreSnapshot) {
        let sieges: HashMap<BattleId, Siege> = snapshot
            .sieges
            .iter()
            .map(|s| (s.battle_id, s.clone()))
            .collect();
        info!(sieges = sieges.len(), "restored siege cache");
        *self.sieges.write().await = sieges;
    }

    async fn live_battle(&self, id: BattleId) -> Result<Battle, SiegeError> {
        self.battles
            .get_battle(id)
            .await
            .ok_or(SiegeError::BattleNotFound(id))
    }

    fn require(battle: &Battle, allowed: &[BattleStatus], action: &'static str) -> Result<(), SiegeError> {
        if allowed.contains(&battle.status) {
            Ok(())
        } else {
            Err(SiegeError::InvalidTransition {
                battle: battle.id,
                status: battle.status,
                action,
            })
        }
    }

    async fn save(
        &self,
        sieges: &mut HashMap<BattleId, Siege>,
        siege: Siege,
    ) -> Result<Siege, SiegeError> {
        self.store
            .commit(Changeset::new().with_siege(siege.clone()))
            .await?;
        sieges.insert(siege.battle_id, siege.clone());
        Ok(siege)
    }

    /// Attach a siege to a live SIEGE battle.
    pub async fn create_siege(
        &self,
        battle: BattleId,
        fortification: Fortification,
    ) -> Result<Siege, SiegeError> {
        let live = self.live_battle(battle).await?;
        if live.battle_type != BattleType::Siege {
            return Err(SiegeError::NotSiegeBattle {
                battle,
                battle_type: live.battle_type,
            });
        }
        let max = self.rules.max_fortification_level;
        if fortification.level == 0 || fortification.level > max {
            return Err(SiegeError::InvalidLevel {
                level: fortification.level,
                max,
            });
        }
        if fortification.walls == 0 || fortification.gates == 0 {
            return Err(SiegeError::InvalidHealth);
        }

        let mut sieges = self.sieges.write().await;
        if sieges.contains_key(&battle) {
            return Err(SiegeError::SiegeExists(battle));
        }
        let siege = Siege {
            battle_id: battle,
            fortification_level: fortification.level,
            walls_health: fortification.walls,
            walls_max: fortification.walls,
            gates_health: fortification.gates,
            gates_max: fortification.gates,
            progress: 0,
            equipment_used: Vec::new(),
            created_at: self.clock.now(),
        };
        let siege = self.save(&mut sieges, siege).await?;
        info!(
            battle_id = %battle,
            level = fortification.level,
            walls = fortification.walls,
            gates = fortification.gates,
            "siege created"
        );
        Ok(siege)
    }

    async fn damage(
        &self,
        battle: BattleId,
        structure: Structure,
        amount: u32,
    ) -> Result<Siege, SiegeError> {
        let live = self.live_battle(battle).await?;
        Self::require(&live, &[BattleStatus::InProgress], "damage")?;
        let mut sieges = self.sieges.write().await;
        let mut siege = sieges
            .get(&battle)
            .cloned()
            .ok_or(SiegeError::SiegeNotFound(battle))?;
        let was_breached = siege.is_breached();
        match structure {
            Structure::Walls => siege.walls_health = siege.walls_health.saturating_sub(amount),
            Structure::Gates => siege.gates_health = siege.gates_health.saturating_sub(amount),
        }
        let siege = self.save(&mut sieges, siege).await?;
        if siege.is_breached() && !was_breached {
            info!(battle_id = %battle, ?structure, "fortification breached");
        }
        Ok(siege)
    }

    async fn repair(
        &self,
        battle: BattleId,
        structure: Structure,
        amount: u32,
    ) -> Result<Siege, SiegeError> {
        self.live_battle(battle).await?;
        let mut sieges = self.sieges.write().await;
        let mut siege = sieges
            .get(&battle)
            .cloned()
            .ok_or(SiegeError::SiegeNotFound(battle))?;
        match structure {
            Structure::Walls => {
                siege.walls_health = siege.walls_health.saturating_add(amount).min(siege.walls_max);
            }
            Structure::Gates => {
                siege.gates_health = siege.gates_health.saturating_add(amount).min(siege.gates_max);
            }
        }
        debug!(battle_id = %battle, ?structure, amount, "fortification repaired");
        self.save(&mut sieges, siege).await
    }

    /// Damage the walls; health floors at zero.
    pub async fn damage_walls(&self, battle: BattleId, amount: u32) -> Result<Siege, SiegeError> {
        self.damage(battle, Structure::Walls, amount).await
    }

    /// Damage the gates; health floors at zero.
    pub async fn damage_gates(&self, battle: BattleId, amount: u32) -> Result<Siege, SiegeError> {
        self.damage(battle, Structure::Gates, amount).await
    }

    /// Repair the walls; health caps at the maximum.
    pub async fn repair_walls(&self, battle: BattleId, amount: u32) -> Result<Siege, SiegeError> {
        self.repair(battle, Structure::Walls, amount).await
    }

    /// Repair the gates; health caps at the maximum.
    pub async fn repair_gates(&self, battle: BattleId, amount: u32) -> Result<Siege, SiegeError> {
        self.repair(battle, Structure::Gates, amount).await
    }

    /// Record a use of `equipment` and apply its structural damage.
    pub async fn use_equipment(
        &self,
        battle: BattleId,
        equipment: SiegeEquipment,
    ) -> Result<Siege, SiegeError> {
        let live = self.live_battle(battle).await?;
        Self::require(&live, &[BattleStatus::InProgress], "use equipment in")?;
        let mut sieges = self.sieges.write().await;
        let mut siege = sieges
            .get(&battle)
            .cloned()
            .ok_or(SiegeError::SiegeNotFound(battle))?;
        siege.walls_health = siege.walls_health.saturating_sub(equipment.wall_damage());
        siege.gates_health = siege.gates_health.saturating_sub(equipment.gate_damage());
        siege.equipment_used.push(equipment);
        debug!(battle_id = %battle, %equipment, "siege equipment used");
        self.save(&mut sieges, siege).await
    }

    /// Move attacker progress by `delta`, clamped to 0-100.
    pub async fn update_progress(&self, battle: BattleId, delta: i32) -> Result<Siege, SiegeError> {
        let live = self.live_battle(battle).await?;
        Self::require(&live, &[BattleStatus::InProgress], "update progress of")?;
        let mut sieges = self.sieges.write().await;
        let mut siege = sieges
            .get(&battle)
            .cloned()
            .ok_or(SiegeError::SiegeNotFound(battle))?;
        let progress = i32::from(siege.progress).saturating_add(delta).clamp(0, 100);
        siege.progress = u8::try_from(progress).unwrap_or(100);
        let siege = self.save(&mut sieges, siege).await?;
        if siege.is_complete() {
            info!(battle_id = %battle, "siege complete");
        }
        Ok(siege)
    }

    // -- Queries ------------------------------------------------------------

    /// The siege attached to a battle.
    pub async fn get_siege(&self, battle: BattleId) -> Option<Siege> {
        self.sieges.read().await.get(&battle).cloned()
    }

    /// Whether the walls or the gates are down.
    pub async fn is_breached(&self, battle: BattleId) -> bool {
        self.get_siege(battle).await.as_ref().is_some_and(Siege::is_breached)
    }

    /// Whether the attackers have taken the fortification.
    pub async fn is_complete(&self, battle: BattleId) -> bool {
        self.get_siege(battle).await.as_ref().is_some_and(Siege::is_complete)
    }

    /// Current defense bonus of the siege, if there is one.
    pub async fn defense_bonus(&self, battle: BattleId) -> Option<Decimal> {
        let siege = self.get_siege(battle).await?;
        defense_bonus(&siege, &self.rules)
    }

    // -- Tick helpers -------------------------------------------------------

    /// Completed sieges whose battle is still in progress.
    pub async fn completed_sieges(&self) -> Vec<BattleId> {
        let complete: Vec<BattleId> = self
            .sieges
            .read()
            .await
            .values()
            .filter(|s| s.is_complete())
            .map(|s| s.battle_id)
            .collect();
        let mut due = Vec::with_capacity(complete.len());
        for battle in complete {
            let in_progress = self
                .battles
                .get_battle(battle)
                .await
                .is_some_and(|b| b.status == BattleStatus::InProgress);
            if in_progress {
                due.push(battle);
            }
        }
        due
    }

    /// Drop sieges whose battle is no longer live.
    pub async fn prune(&self) -> Result<usize, SiegeError> {
        let mut sieges = self.sieges.write().await;
        let mut stale = Vec::new();
        for battle in sieges.keys() {
            if self.battles.get_battle(*battle).await.is_none() {
                stale.push(*battle);
            }
        }
        if stale.is_empty() {
            return Ok(0);
        }
        let changes = stale
            .iter()
            .fold(Changeset::new(), |changes, battle| changes.without_siege(*battle));
        self.store.commit(changes).await?;
        for battle in &stale {
            sieges.remove(battle);
        }
        debug!(pruned = stale.len(), "pruned sieges");
        Ok(stale.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use conquest_store::MemoryStore;
    use conquest_types::{BattleZone, GovernmentType, NationId, PlayerId, Position, WarGoal, WarSide};

    use super::*;
    use crate::battle::BattlePlan;
    use crate::clock::ManualClock;
    use crate::config::{BattleRules, WarRules};
    use crate::directory::{NationProfile, StaticDirectory};
    use crate::war::WarManager;

    struct Fixture {
        sieges: SiegeManager,
        battles: Arc<BattleManager>,
        store: Arc<MemoryStore>,
        battle: BattleId,
    }

    async fn fixture(battle_type: BattleType) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::default());
        let nation = |name: &str| {
            let id = NationId::new();
            directory.add_nation(NationProfile {
                id,
                name: name.to_owned(),
                power: Decimal::new(100, 0),
                balance: Decimal::ZERO,
                leader: None,
                government: GovernmentType::Monarchy,
            });
            id
        };
        let a = nation("Avalon");
        let b = nation("Brython");
        let wars = Arc::new(WarManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            directory,
            Arc::clone(&clock) as Arc<dyn Clock>,
            WarRules::default(),
        ));
        let war = wars.declare_war(a, b, WarGoal::Conquest, "keep").await.unwrap();
        wars.start_war(war.id).await.unwrap();
        let battles = Arc::new(BattleManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            wars,
            Arc::clone(&clock) as Arc<dyn Clock>,
            BattleRules::default(),
        ));
        let battle = battles
            .create_battle(BattlePlan {
                war_id: war.id,
                battle_type,
                region: "castle_rock".to_owned(),
                attacker: a,
                defender: b,
                zone: BattleZone {
                    center: Position::new("world", 0.0, 64.0, 0.0),
                    radius: 80.0,
                },
                scheduled_at: None,
            })
            .await
            .unwrap();
        battles
            .join_battle(battle.id, PlayerId::new(), a, WarSide::Attacker)
            .await
            .unwrap();
        battles
            .join_battle(battle.id, PlayerId::new(), b, WarSide::Defender)
            .await
            .unwrap();
        let sieges = SiegeManager::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&battles),
            clock,
            SiegeRules::default(),
        );
        Fixture {
            sieges,
            battles,
            store,
            battle: battle.id,
        }
    }

    const KEEP: Fortification = Fortification {
        level: 3,
        walls: 100,
        gates: 50,
    };

    #[test]
    fn bonus_scales_with_structure_health() {
        let rules = SiegeRules::default();
        let mut siege = Siege {
            battle_id: BattleId::new(),
            fortification_level: 3,
            walls_health: 100,
            walls_max: 100,
            gates_health: 50,
            gates_max: 50,
            progress: 0,
            equipment_used: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        assert_eq!(defense_bonus(&siege, &rules), Some(Decimal::new(30, 2)));

        siege.walls_health = 50;
        siege.gates_health = 0;
        // 0.3 * (0.7 * 0.5 + 0.3 * 0)
        assert_eq!(defense_bonus(&siege, &rules), Some(Decimal::new(105, 3)));
    }

    #[tokio::test]
    async fn siege_requires_siege_battle() {
        let f = fixture(BattleType::FieldBattle).await;
        let result = f.sieges.create_siege(f.battle, KEEP).await;
        assert!(matches!(result, Err(SiegeError::NotSiegeBattle { .. })));
    }

    #[tokio::test]
    async fn creation_validates_fortification() {
        let f = fixture(BattleType::Siege).await;
        let result = f
            .sieges
            .create_siege(f.battle, Fortification { level: 6, ..KEEP })
            .await;
        assert!(matches!(result, Err(SiegeError::InvalidLevel { level: 6, max: 5 })));
        let result = f
            .sieges
            .create_siege(f.battle, Fortification { gates: 0, ..KEEP })
            .await;
        assert!(matches!(result, Err(SiegeError::InvalidHealth)));

        f.sieges.create_siege(f.battle, KEEP).await.unwrap();
        let result = f.sieges.create_siege(f.battle, KEEP).await;
        assert!(matches!(result, Err(SiegeError::SiegeExists(_))));
    }

    #[tokio::test]
    async fn damage_needs_battle_in_progress() {
        let f = fixture(BattleType::Siege).await;
        f.sieges.create_siege(f.battle, KEEP).await.unwrap();
        let result = f.sieges.damage_walls(f.battle, 10).await;
        assert!(matches!(
            result,
            Err(SiegeError::InvalidTransition {
                status: BattleStatus::Preparation,
                ..
            })
        ));
        // Repairs are allowed while preparing.
        f.sieges.repair_walls(f.battle, 10).await.unwrap();
    }

    #[tokio::test]
    async fn equipment_breaches_and_repairs_cap() {
        let f = fixture(BattleType::Siege).await;
        f.sieges.create_siege(f.battle, KEEP).await.unwrap();
        f.battles.start_battle(f.battle).await.unwrap();

        f.sieges
            .use_equipment(f.battle, SiegeEquipment::Trebuchet)
            .await
            .unwrap();
        let siege = f
            .sieges
            .use_equipment(f.battle, SiegeEquipment::BatteringRam)
            .await
            .unwrap();
        assert_eq!(siege.walls_health, 40);
        assert_eq!(siege.gates_health, 0);
        assert!(f.sieges.is_breached(f.battle).await);
        assert_eq!(
            siege.equipment_used,
            vec![SiegeEquipment::Trebuchet, SiegeEquipment::BatteringRam]
        );

        let siege = f.sieges.repair_gates(f.battle, 500).await.unwrap();
        assert_eq!(siege.gates_health, 50);
        let siege = f.sieges.damage_walls(f.battle, 1_000).await.unwrap();
        assert_eq!(siege.walls_health, 0);
    }

    #[tokio::test]
    async fn progress_clamps_and_completes() {
        let f = fixture(BattleType::Siege).await;
        f.sieges.create_siege(f.battle, KEEP).await.unwrap();
        f.battles.start_battle(f.battle).await.unwrap();

        let siege = f.sieges.update_progress(f.battle, -20).await.unwrap();
        assert_eq!(siege.progress, 0);
        f.sieges.update_progress(f.battle, 70).await.unwrap();
        assert!(f.sieges.completed_sieges().await.is_empty());
        let siege = f.sieges.update_progress(f.battle, 70).await.unwrap();
        assert_eq!(siege.progress, 100);
        assert!(f.sieges.is_complete(f.battle).await);
        assert_eq!(f.sieges.completed_sieges().await, vec![f.battle]);
    }

    #[tokio::test]
    async fn ended_battle_siege_is_pruned() {
        let f = fixture(BattleType::Siege).await;
        f.sieges.create_siege(f.battle, KEEP).await.unwrap();
        assert_eq!(f.sieges.prune().await.unwrap(), 0);

        f.battles.cancel_battle(f.battle).await.unwrap();
        assert_eq!(f.sieges.prune().await.unwrap(), 1);
        assert!(f.sieges.get_siege(f.battle).await.is_none());
        assert!(f.store.load_snapshot().await.unwrap().sieges.is_empty());
    }
}
