//! The service container.
//!
//! [`Conquest`] builds every manager exactly once, wires their
//! dependencies, and hands out `Arc` handles. [`Conquest::restore`] fills
//! every live cache from a single store snapshot.

use std::sync::Arc;

use tracing::info;

use conquest_store::{Store, StoreError};
use conquest_warfare::{
    BattleManager, Clock, ElectionManager, EmpireManager, NationDirectory, SiegeManager,
    TaskScheduler, WarManager, WarfareConfig, ZoneMonitor,
};

/// Every manager of the warfare core, wired together.
pub struct Conquest {
    /// War lifecycle manager.
    pub wars: Arc<WarManager>,
    /// Battle manager.
    pub battles: Arc<BattleManager>,
    /// Siege extension.
    pub sieges: Arc<SiegeManager>,
    /// Empire hierarchy manager.
    pub empire: Arc<EmpireManager>,
    /// Election cycle manager.
    pub elections: Arc<ElectionManager>,
    /// Player event adapter.
    pub zones: Arc<ZoneMonitor>,
    /// Delayed-task registry shared by the zone monitor.
    pub scheduler: Arc<TaskScheduler>,
    store: Arc<dyn Store>,
}

impl Conquest {
    /// Build all managers over the given collaborators.
    pub fn new(
        store: Arc<dyn Store>,
        directory: Arc<dyn NationDirectory>,
        clock: Arc<dyn Clock>,
        config: &WarfareConfig,
    ) -> Self {
        let wars = Arc::new(WarManager::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&clock),
            config.war.clone(),
        ));
        let battles = Arc::new(BattleManager::new(
            Arc::clone(&store),
            Arc::clone(&wars),
            Arc::clone(&clock),
            config.battle.clone(),
        ));
        let sieges = Arc::new(SiegeManager::new(
            Arc::clone(&store),
            Arc::clone(&battles),
            Arc::clone(&clock),
            config.siege.clone(),
        ));
        let empire = Arc::new(EmpireManager::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&clock),
            config.empire.clone(),
        ));
        let elections = Arc::new(ElectionManager::new(
            Arc::clone(&store),
            directory,
            clock,
            config.election.clone(),
        ));
        let scheduler = Arc::new(TaskScheduler::new());
        let zones = Arc::new(ZoneMonitor::new(
            Arc::clone(&battles),
            Arc::clone(&scheduler),
        ));

        Self {
            wars,
            battles,
            sieges,
            empire,
            elections,
            zones,
            scheduler,
            store,
        }
    }

    /// Rebuild every live cache from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the snapshot cannot be loaded. The caches
    /// are left as they were.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let snapshot = self.store.load_snapshot().await?;
        self.wars.restore(&snapshot).await;
        self.battles.restore(&snapshot).await;
        self.sieges.restore(&snapshot).await;
        self.empire.restore(&snapshot).await;
        self.elections.restore(&snapshot).await;
        info!(
            wars = snapshot.wars.len(),
            battles = snapshot.battles.len(),
            elections = snapshot.elections.len(),
            "live state restored"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use conquest_store::MemoryStore;
    use conquest_types::{GovernmentType, NationId, WarGoal, WarStatus};
    use conquest_warfare::{ManualClock, NationProfile, StaticDirectory};

    use super::*;

    fn nation(directory: &StaticDirectory, name: &str) -> NationId {
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
    }

    #[tokio::test]
    async fn restore_rebuilds_a_fresh_container() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let directory = Arc::new(StaticDirectory::new());
        let clock = Arc::new(ManualClock::default()) as Arc<dyn Clock>;
        let a = nation(&directory, "Avalon");
        let b = nation(&directory, "Brython");
        let config = WarfareConfig::default();

        let first = Conquest::new(
            Arc::clone(&store),
            Arc::clone(&directory) as Arc<dyn NationDirectory>,
            Arc::clone(&clock),
            &config,
        );
        let war = first
            .wars
            .declare_war(a, b, WarGoal::Humiliation, "insult at court")
            .await
            .unwrap();

        let second = Conquest::new(store, directory, clock, &config);
        // Lookups fall through to the store; the cache is still empty.
        assert!(second.wars.get_war(war.id).await.unwrap().is_some());
        assert!(!second.wars.has_open_war(a, b).await);

        second.restore().await.unwrap();
        let restored = second.wars.get_war(war.id).await.unwrap().unwrap();
        assert_eq!(restored.status, WarStatus::Declared);
        assert!(second.wars.has_open_war(a, b).await);
    }
}
