//! End-to-end scenarios across the warfare managers.
//!
//! Each test wires real managers over a `MemoryStore`, a `StaticDirectory`,
//! and a `ManualClock`, then drives a full flow through the public API.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::sync::Arc;

use chrono::TimeDelta;
use rust_decimal::Decimal;

use conquest_store::{MemoryStore, Store};
use conquest_types::{
    BattleType, BattleZone, ElectionPosition, ElectionStatus, GovernmentType, NationId,
    NationRole, PlayerId, Position, WarGoal, WarSide, WarStatus,
};
use conquest_warfare::{
    BattleManager, BattlePlan, BattleRules, Clock, ElectionManager, ElectionRules,
    EmpireError, EmpireManager, EmpireRules, ManualClock, NationDirectory, NationProfile,
    StaticDirectory, VassalEligibility, WarManager, WarRules,
};

// =============================================================================
// Helpers
// =============================================================================

struct World {
    store: Arc<MemoryStore>,
    directory: Arc<StaticDirectory>,
    clock: Arc<ManualClock>,
}

impl World {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            directory: Arc::new(StaticDirectory::new()),
            clock: Arc::new(ManualClock::default()),
        }
    }

    fn nation(&self, name: &str, power: i64, government: GovernmentType) -> NationId {
        let id = NationId::new();
        self.directory.add_nation(NationProfile {
            id,
            name: name.to_owned(),
            power: Decimal::new(power, 0),
            balance: Decimal::ZERO,
            leader: None,
            government,
        });
        id
    }

    fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store) as Arc<dyn Store>
    }

    fn directory(&self) -> Arc<dyn NationDirectory> {
        Arc::clone(&self.directory) as Arc<dyn NationDirectory>
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock) as Arc<dyn Clock>
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn skirmish_victory_scores_for_attacker() {
    let world = World::new();
    let n1 = world.nation("Avalon", 100, GovernmentType::Monarchy);
    let n2 = world.nation("Brython", 100, GovernmentType::Monarchy);
    let wars = Arc::new(WarManager::new(
        world.store(),
        world.directory(),
        world.clock(),
        WarRules::default(),
    ));
    let battles = BattleManager::new(
        world.store(),
        Arc::clone(&wars),
        world.clock(),
        BattleRules::default(),
    );

    let war = wars
        .declare_war(n1, n2, WarGoal::Conquest, "Disputed river crossing")
        .await
        .unwrap();
    assert_eq!(war.status, WarStatus::Declared);
    assert!(wars.wars_due_to_start().await.is_empty());

    world.clock.advance(TimeDelta::hours(24));
    assert_eq!(wars.wars_due_to_start().await, vec![war.id]);
    let war = wars.start_war(war.id).await.unwrap();
    assert_eq!(war.status, WarStatus::Active);

    let battle = battles
        .create_battle(BattlePlan {
            war_id: war.id,
            battle_type: BattleType::Skirmish,
            region: "river_crossing".to_owned(),
            attacker: n1,
            defender: n2,
            zone: BattleZone {
                center: Position::new("world", 120.0, 64.0, -40.0),
                radius: 60.0,
            },
            scheduled_at: None,
        })
        .await
        .unwrap();
    let knight = PlayerId::new();
    let squire = PlayerId::new();
    let guard = PlayerId::new();
    battles.join_battle(battle.id, knight, n1, WarSide::Attacker).await.unwrap();
    battles.join_battle(battle.id, squire, n1, WarSide::Attacker).await.unwrap();
    battles.join_battle(battle.id, guard, n2, WarSide::Defender).await.unwrap();
    battles.start_battle(battle.id).await.unwrap();

    battles.register_kill(battle.id, knight, guard).await.unwrap();
    battles.respawn_player(battle.id, guard).await.unwrap();
    battles.register_kill(battle.id, squire, guard).await.unwrap();

    let ended = battles.end_battle(battle.id, None).await.unwrap();
    assert_eq!(ended.winner_id, Some(n1));
    assert_eq!(ended.awarded_score, 70);

    let war = wars.get_war(war.id).await.unwrap().unwrap();
    assert_eq!(war.attacker_score, 70);
    assert_eq!(war.defender_score, 0);
    assert!(wars.audit().await.is_empty());
    assert!(!wars.can_end_war(war.id).await.unwrap());
}

#[tokio::test]
async fn leader_election_transfers_leadership() {
    let world = World::new();
    let nation = world.nation("Republic of Lys", 100, GovernmentType::Democracy);
    let elections = ElectionManager::new(
        world.store(),
        world.directory(),
        world.clock(),
        ElectionRules::default(),
    );
    let incumbent = PlayerId::new();
    world.directory.add_member(incumbent, nation, NationRole::Leader);
    world.directory.transfer_leadership(nation, incumbent).unwrap();

    let x = PlayerId::new();
    let y = PlayerId::new();
    world.directory.add_member(x, nation, NationRole::Officer);
    world.directory.add_member(y, nation, NationRole::Citizen);
    let voters: Vec<PlayerId> = (0..4).map(|_| PlayerId::new()).collect();
    for voter in &voters {
        world.directory.add_member(*voter, nation, NationRole::Recruit);
    }

    let election = elections
        .start_election(nation, ElectionPosition::Leader)
        .await
        .unwrap();
    assert_eq!(election.status, ElectionStatus::Registration);
    elections.register_candidate(nation, x, Some("Order")).await.unwrap();
    elections.register_candidate(nation, y, Some("Liberty")).await.unwrap();

    world.clock.advance(TimeDelta::days(2));
    assert!(elections.advance().await.failures.is_empty());
    let live = elections.get_election(nation).await.unwrap();
    assert_eq!(live.status, ElectionStatus::Voting);

    for voter in &voters[..3] {
        elections.vote(nation, *voter, x).await.unwrap();
    }
    elections.vote(nation, voters[3], y).await.unwrap();

    world.clock.advance(TimeDelta::days(3));
    let transitions = elections.advance().await.transitions;
    let statuses: Vec<ElectionStatus> = transitions.iter().map(|t| t.to).collect();
    assert_eq!(statuses, vec![ElectionStatus::Counting, ElectionStatus::Completed]);

    let completed = world.store.find_election(election.id).await.unwrap();
    assert_eq!(completed.winner_id, Some(x));
    assert_eq!(completed.total_votes, 4);
    assert_eq!(world.directory.role_of(x), Some(NationRole::Leader));
    assert_eq!(world.directory.role_of(incumbent), Some(NationRole::Minister));
    assert_eq!(
        world.directory.profile(nation).and_then(|p| p.leader),
        Some(x)
    );
}

#[tokio::test]
async fn vassalization_needs_power_advantage() {
    let world = World::new();
    let overlord = world.nation("Orsinia", 300, GovernmentType::Monarchy);
    let rival = world.nation("Thessa", 250, GovernmentType::Tribal);
    let minor = world.nation("Vell", 150, GovernmentType::Tribal);
    let empire = EmpireManager::new(
        world.store(),
        world.directory(),
        world.clock(),
        EmpireRules::default(),
    );

    let refused = empire.vassalize(overlord, rival).await;
    assert!(matches!(
        refused,
        Err(EmpireError::NotEligible {
            reason: VassalEligibility::InsufficientPower,
            ..
        })
    ));
    assert!(!empire.is_vassal(rival).await);

    empire.vassalize(overlord, minor).await.unwrap();
    assert_eq!(empire.overlord_of(minor).await, Some(overlord));
    assert_eq!(empire.vassals_of(overlord).await, vec![minor]);
}

#[tokio::test]
async fn restart_preserves_live_state() {
    let world = World::new();
    let n1 = world.nation("Avalon", 100, GovernmentType::Monarchy);
    let n2 = world.nation("Brython", 100, GovernmentType::Monarchy);
    let wars = Arc::new(WarManager::new(
        world.store(),
        world.directory(),
        world.clock(),
        WarRules::default(),
    ));
    let battles = BattleManager::new(
        world.store(),
        Arc::clone(&wars),
        world.clock(),
        BattleRules::default(),
    );
    let war = wars
        .declare_war(n1, n2, WarGoal::TotalWar, "Succession")
        .await
        .unwrap();
    wars.start_war(war.id).await.unwrap();
    wars
        .add_score(war.id, WarSide::Defender, 20, "border raid")
        .await
        .unwrap();
    let battle = battles
        .create_battle(BattlePlan {
            war_id: war.id,
            battle_type: BattleType::FieldBattle,
            region: "plains".to_owned(),
            attacker: n1,
            defender: n2,
            zone: BattleZone {
                center: Position::new("world", 0.0, 70.0, 0.0),
                radius: 100.0,
            },
            scheduled_at: None,
        })
        .await
        .unwrap();
    let player = PlayerId::new();
    battles.join_battle(battle.id, player, n1, WarSide::Attacker).await.unwrap();

    let snapshot = world.store.load_snapshot().await.unwrap();
    let wars2 = Arc::new(WarManager::new(
        world.store(),
        world.directory(),
        world.clock(),
        WarRules::default(),
    ));
    let battles2 = BattleManager::new(
        world.store(),
        Arc::clone(&wars2),
        world.clock(),
        BattleRules::default(),
    );
    wars2.restore(&snapshot).await;
    battles2.restore(&snapshot).await;

    let restored = wars2.get_war(war.id).await.unwrap().unwrap();
    assert_eq!(restored.defender_score, 30);
    assert!(wars2.are_at_war(n1, n2).await);
    assert!(wars2.audit().await.is_empty());
    assert_eq!(battles2.battle_of(player).await, Some(battle.id));
}
