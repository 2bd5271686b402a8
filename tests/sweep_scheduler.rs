//! Background sweep workers.

mod common;

use std::time::Duration;

use common::{fixture_with, give};
use guildledger::economy::{start_sweeps, ItemStack, Rules, SweepConfig, SweepKind};

fn instant_rules() -> Rules {
    Rules {
        scavenge_duration: chrono::Duration::zero(),
        scavenge_chance: 1.0,
        ..Rules::default()
    }
}

#[tokio::test]
async fn due_tasks_are_finished_by_the_task_sweep() {
    let f = fixture_with(instant_rules());
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.economy.start_scavenge("Taco", Some("stone")).await.expect("scavenge");

    let handle = start_sweeps(
        &f.economy,
        &SweepConfig {
            task_interval: Duration::from_secs(3600),
            trade_interval: Duration::ZERO,
            cleanup_interval: Duration::from_secs(3600),
        },
    );
    assert_eq!(handle.kinds(), vec![SweepKind::Tasks, SweepKind::Cleanup]);
    assert!(handle.run_now(SweepKind::Trades).await.is_none());

    // The first tick fires at once, so the pass may already have happened.
    handle.run_now(SweepKind::Tasks).await.expect("tasks running");
    let stats = handle.snapshot(SweepKind::Tasks).await.expect("stats");
    assert!(stats.passes >= 1);
    assert_eq!(stats.affected, 1);

    let taco = f.economy.inventory("gm", "Taco").expect("taco");
    assert!(taco.task.is_idle());
    assert_eq!(taco.items.iter().map(|s| s.quantity).sum::<u32>(), 5);

    handle.shutdown().await;
    assert!(handle.run_now(SweepKind::Tasks).await.is_none());
}

#[tokio::test]
async fn cleanup_sweep_runs_on_demand() {
    let f = fixture_with(Rules::default());
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Nail", 1);
    let mut taco = f.economy.store().get_character("Taco").expect("taco");
    taco.items.push(ItemStack::new("Rope", 0));
    f.economy.store().put_character(taco).expect("put");

    let handle = start_sweeps(
        &f.economy,
        &SweepConfig {
            task_interval: Duration::ZERO,
            trade_interval: Duration::ZERO,
            cleanup_interval: Duration::from_secs(3600),
        },
    );
    handle.run_now(SweepKind::Cleanup).await.expect("cleanup running");
    let stats = handle.snapshot(SweepKind::Cleanup).await.expect("stats");
    assert_eq!(stats.affected, 1);
    assert_eq!(f.economy.inventory("gm", "Taco").expect("taco").items, vec![ItemStack::new("Nail", 1)]);
    handle.shutdown().await;
}
