//! Crafting, disassembly, scavenging and labor as timed tasks.

mod common;

use chrono::{Duration, Utc};
use common::{fixture, fixture_with, give, open_economy};
use guildledger::economy::{ActiveTask, EconomyError, GameEvent, Rules};

fn certain_rules() -> Rules {
    Rules {
        scavenge_chance: 1.0,
        ..Rules::default()
    }
}

#[tokio::test]
async fn crafting_consumes_exact_components_and_pays_out_when_due() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Log", 2);

    let task = f.economy.start_craft("taco", "plank").await.expect("craft");
    assert!(matches!(task, ActiveTask::Craft { ref item, .. } if item == "Plank"));

    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    assert!(taco.items.iter().all(|s| s.item != "Log"), "spent components leave no entry");
    assert!(taco.is_busy());

    // Not due yet.
    let early = f.economy.sweep_due_tasks_at(Utc::now() + Duration::minutes(5)).await;
    assert_eq!(early.completed, 0);

    let report = f.economy.sweep_due_tasks_at(Utc::now() + Duration::minutes(31)).await;
    assert_eq!(report.completed, 1);
    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    assert_eq!(taco.item_quantity("Plank"), 3);
    assert!(taco.task.is_idle());
    assert!(f
        .port
        .events()
        .iter()
        .any(|e| matches!(e, GameEvent::CraftCompleted { character, .. } if character == "Taco")));
}

#[tokio::test]
async fn crafting_without_enough_components_changes_nothing() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Log", 1);

    let err = f.economy.start_craft("Taco", "Plank").await.unwrap_err();
    assert!(matches!(
        err,
        EconomyError::InsufficientResource { ref resource, needed: 2, available: 1 } if resource == "Log"
    ));
    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    assert_eq!(taco.item_quantity("Log"), 1);
    assert!(taco.task.is_idle());
}

#[tokio::test]
async fn unknown_recipe_is_not_found() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    let err = f.economy.start_craft("Taco", "Moon Rock").await.unwrap_err();
    assert!(matches!(err, EconomyError::NotFound(_)));
}

#[tokio::test]
async fn tools_are_required_but_not_consumed() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Plank", 2);

    let err = f.economy.start_craft("Taco", "Wooden Mallet").await.unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientResource { .. }));
    assert_eq!(f.economy.inventory("gm", "Taco").expect("inventory").item_quantity("Plank"), 2);

    give(&f.economy, "Taco", "Flint Knife", 1);
    f.economy.start_craft("Taco", "wooden mallet").await.expect("craft");
    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    assert_eq!(taco.item_quantity("Flint Knife"), 1);
    assert_eq!(taco.item_quantity("Plank"), 0);
}

#[tokio::test]
async fn a_busy_character_cannot_start_another_task() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Log", 4);

    f.economy.start_scavenge("Taco", None).await.expect("scavenge");
    let err = f.economy.start_craft("Taco", "Plank").await.unwrap_err();
    assert!(matches!(err, EconomyError::Busy { .. }));
    assert_eq!(f.economy.inventory("gm", "Taco").expect("inventory").item_quantity("Log"), 4);

    let err = f.economy.start_scavenge("Taco", Some("wood")).await.unwrap_err();
    assert!(matches!(err, EconomyError::Busy { .. }));
}

#[tokio::test]
async fn disassembly_needs_a_full_batch_and_returns_components() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Plank", 2);

    let err = f.economy.start_disassemble("Taco", "Plank").await.unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientResource { needed: 3, .. }));

    give(&f.economy, "Taco", "Plank", 1);
    f.economy.start_disassemble("Taco", "Plank").await.expect("disassemble");
    assert_eq!(f.economy.inventory("gm", "Taco").expect("inventory").item_quantity("Plank"), 0);

    // Half of the 30 minute craft time.
    let report = f.economy.sweep_due_tasks_at(Utc::now() + Duration::minutes(16)).await;
    assert_eq!(report.completed, 1);
    assert_eq!(f.economy.inventory("gm", "Taco").expect("inventory").item_quantity("Log"), 2);
}

#[tokio::test]
async fn disabled_disassembly_is_forbidden() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Kindling", 2);
    let err = f.economy.start_disassemble("Taco", "Kindling").await.unwrap_err();
    assert!(matches!(err, EconomyError::Forbidden(_)));
}

#[tokio::test]
async fn targeted_scavenge_rolls_only_the_group_table() {
    let f = fixture_with(certain_rules());
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    f.economy.start_scavenge("Taco", Some("Wood")).await.expect("scavenge");
    let report = f.economy.sweep_due_tasks_at(Utc::now() + Duration::hours(2)).await;
    assert_eq!(report.completed, 1);

    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    let total: u32 = taco.items.iter().map(|s| s.quantity).sum();
    assert_eq!(total, 5);
    assert!(taco.items.iter().all(|s| s.item == "Log" || s.item == "Stick"));
}

#[tokio::test]
async fn general_scavenge_rolls_the_merged_table() {
    let f = fixture_with(certain_rules());
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    f.economy.start_scavenge("Taco", None).await.expect("scavenge");
    f.economy.sweep_due_tasks_at(Utc::now() + Duration::hours(2)).await;

    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    let total: u32 = taco.items.iter().map(|s| s.quantity).sum();
    assert_eq!(total, 10);
    let known = ["Log", "Stick", "Flint", "Granite"];
    assert!(taco.items.iter().all(|s| known.contains(&s.item.as_str())));
}

#[tokio::test]
async fn unlucky_scavenge_still_frees_the_character() {
    let f = fixture_with(Rules {
        scavenge_chance: 0.0,
        ..Rules::default()
    });
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.economy.start_scavenge("Taco", Some("stone")).await.expect("scavenge");
    f.economy.sweep_due_tasks_at(Utc::now() + Duration::hours(2)).await;

    let taco = f.economy.inventory("gm", "Taco").expect("inventory");
    assert!(taco.items.is_empty());
    assert!(taco.task.is_idle());
    assert!(f
        .port
        .events()
        .iter()
        .any(|e| matches!(e, GameEvent::ScavengeCompleted { found, .. } if found.is_empty())));
}

#[tokio::test]
async fn labor_hours_are_bounded() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    let project = f.economy.start_project("u1", "bridge").await.expect("project");

    for hours in [0, 11] {
        let err = f.economy.start_labor("Taco", project.id, hours).await.unwrap_err();
        assert!(matches!(err, EconomyError::LimitExceeded(_)), "{} hours", hours);
    }
    let err = f.economy.start_labor("Taco", 99, 2).await.unwrap_err();
    assert!(matches!(err, EconomyError::NotFound(_)));
}

#[tokio::test]
async fn finished_labor_lands_on_the_current_phase() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    give(&f.economy, "Taco", "Stone", 5);
    let project = f.economy.start_project("u1", "bridge").await.expect("project");
    f.economy.contribute("Taco", project.id, "stone", 5).await.expect("stone");

    f.economy.start_labor("Taco", project.id, 4).await.expect("labor");
    let report = f.economy.sweep_due_tasks_at(Utc::now() + Duration::hours(5)).await;
    assert_eq!(report.completed, 1);

    let view = f.economy.query_project(project.id).expect("view");
    assert_eq!(view.phase.as_deref(), Some("Deck"));
    let labor = view.progress.iter().find(|p| p.resource == "labor").expect("labor row");
    assert_eq!(labor.contributed, 4);
    assert!(f.economy.inventory("gm", "Taco").expect("inventory").task.is_idle());
}

#[tokio::test]
async fn labor_on_a_finished_project_is_discarded() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.economy.create_character("u2", "bob", "Burrito").await.expect("create");
    give(&f.economy, "Taco", "Stone", 5);
    give(&f.economy, "Taco", "Plank", 4);
    let project = f.economy.start_project("u1", "bridge").await.expect("project");
    f.economy.contribute("Taco", project.id, "Stone", 5).await.expect("stone");
    f.economy.contribute("Taco", project.id, "Plank", 4).await.expect("plank");

    f.economy.start_labor("Burrito", project.id, 6).await.expect("labor");
    f.economy.start_labor("Taco", project.id, 6).await.expect("labor");
    f.port.clear();

    // Burrito sorts first and finishes the bridge; Taco's hours go nowhere.
    let report = f.economy.sweep_due_tasks_at(Utc::now() + Duration::hours(7)).await;
    assert_eq!(report.completed, 2);

    let events = f.port.events();
    let completed = events
        .iter()
        .filter(|e| matches!(e, GameEvent::ProjectCompleted { .. }))
        .count();
    assert_eq!(completed, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::LaborCompleted { character, applied: false, .. } if character == "Taco"
    )));
    assert!(f.economy.inventory("gm", "Taco").expect("inventory").task.is_idle());
    assert!(f.economy.list_projects().expect("list").is_empty());
}

#[tokio::test]
async fn pending_tasks_survive_a_restart() {
    let dir = tempfile::TempDir::new().expect("tempdir");
    {
        let (economy, _port) = open_economy(&dir, Rules::default());
        economy.create_character("u1", "alice", "Taco").await.expect("create");
        give(&economy, "Taco", "Log", 2);
        economy.start_craft("Taco", "Plank").await.expect("craft");
        economy.store().flush().expect("flush");
    }

    let (economy, port) = open_economy(&dir, Rules::default());
    assert!(economy.inventory("gm", "Taco").expect("inventory").is_busy());
    let report = economy.sweep_due_tasks_at(Utc::now() + Duration::hours(1)).await;
    assert_eq!(report.completed, 1);
    assert_eq!(economy.inventory("gm", "Taco").expect("inventory").item_quantity("Plank"), 3);
    assert_eq!(port.events().len(), 1);
}
