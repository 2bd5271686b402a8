//! Character lifecycle, honor, sessions and the chat command surface.

mod common;

use std::time::Duration as StdDuration;

use common::{fixture, fixture_with, give, Answer};
use guildledger::economy::{execute, execute_lines, EconomyError, Invoker, ItemStack, Rules};

#[tokio::test]
async fn names_are_normalized_and_unique() {
    let f = fixture();
    let taco = f.economy.create_character("u1", "alice", "  tACO ").await.expect("create");
    assert_eq!(taco.name, "Taco");
    assert_eq!(taco.currency, 0);
    assert!(taco.task.is_idle());

    let err = f.economy.create_character("u2", "bob", "taco").await.unwrap_err();
    assert!(matches!(err, EconomyError::AlreadyExists(_)));
    let err = f.economy.create_character("u2", "bob", "   ").await.unwrap_err();
    assert!(matches!(err, EconomyError::ParseError(_)));
}

#[tokio::test]
async fn owners_are_capped() {
    let f = fixture_with(Rules {
        max_characters_per_owner: 2,
        ..Rules::default()
    });
    f.economy.create_character("u1", "alice", "Taco").await.expect("one");
    f.economy.create_character("u1", "alice", "Burrito").await.expect("two");
    let err = f.economy.create_character("u1", "alice", "Nacho").await.unwrap_err();
    assert!(matches!(err, EconomyError::LimitExceeded(_)));
    f.economy.create_character("u2", "bob", "Nacho").await.expect("other owner");

    let roster: Vec<String> = f.economy.owner_stats("u1").expect("stats").into_iter().map(|c| c.name).collect();
    assert_eq!(roster, vec!["Burrito", "Taco"]);
}

#[tokio::test]
async fn deletion_needs_the_owner_and_a_yes() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    let err = f.economy.delete_character("u2", "Taco").await.unwrap_err();
    assert!(matches!(err, EconomyError::Forbidden(_)));

    f.port.answer_with(Answer::No);
    let err = f.economy.delete_character("u1", "Taco").await.unwrap_err();
    assert!(matches!(err, EconomyError::Cancelled(_)));
    assert!(f.economy.store().character_exists("Taco"));

    f.port.answer_with(Answer::Yes);
    f.economy.delete_character("u1", "taco").await.expect("delete");
    assert!(!f.economy.store().character_exists("Taco"));
    let err = f.economy.inventory("gm", "Taco").unwrap_err();
    assert!(matches!(err, EconomyError::NotFound(_)));
}

#[tokio::test]
async fn superusers_may_delete_any_character() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.economy.delete_character("gm", "Taco").await.expect("delete");
    assert!(f.economy.store().list_character_names().is_empty());
}

#[tokio::test]
async fn deletion_rechecks_the_owner_after_confirmation() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.port.answer_with(Answer::Never);

    let economy = f.economy.clone();
    let pending = tokio::spawn(async move { economy.delete_character("u1", "Taco").await });
    while f.port.pending_confirmations() == 0 {
        tokio::task::yield_now().await;
    }

    // The name changes hands while alice is still being asked.
    f.economy.store().delete_character("Taco").expect("remove");
    f.economy.create_character("u2", "bob", "Taco").await.expect("recreate");
    f.port.answer_pending(true);

    let err = pending.await.expect("join").unwrap_err();
    assert!(matches!(err, EconomyError::Forbidden(_)));
    let taco = f.economy.inventory("u2", "Taco").expect("still there");
    assert_eq!(taco.owner_id, "u2");
}

#[tokio::test]
async fn inventories_are_private_to_owners_and_superusers() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    let err = f.economy.inventory("u2", "Taco").unwrap_err();
    assert!(matches!(err, EconomyError::Forbidden(_)));
    assert_eq!(f.economy.inventory("u1", "taco").expect("owner").name, "Taco");
    assert_eq!(f.economy.inventory("gm", "Taco").expect("superuser").name, "Taco");

    let reply = execute(&f.economy, &Invoker::new("u2", "bob"), "!inventory Taco").await;
    assert!(reply.starts_with("⚠️"), "{}", reply);
}

#[tokio::test]
async fn unanswered_deletion_times_out() {
    let f = fixture_with(Rules {
        confirmation_timeout: StdDuration::from_millis(50),
        ..Rules::default()
    });
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.port.answer_with(Answer::Never);

    let err = f.economy.delete_character("u1", "Taco").await.unwrap_err();
    assert!(matches!(err, EconomyError::Cancelled(_)));
    assert!(f.economy.store().character_exists("Taco"));
}

#[tokio::test]
async fn sessions_add_experience_and_net_currency() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    let taco = f.economy.log_session("Taco", "s1", 120, 50, 20).await.expect("session");
    assert_eq!(taco.experience, 120);
    assert_eq!(taco.currency, 30);

    let taco = f.economy.log_session("Taco", "s2", -500, 0, 100).await.expect("session");
    assert_eq!(taco.experience, 0);
    assert_eq!(taco.currency, 0);
}

#[tokio::test]
async fn honor_is_awarded_by_admins_and_spent_for_experience() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");

    let err = f.economy.award_honor("u1", "Taco", 3).await.unwrap_err();
    assert!(matches!(err, EconomyError::Forbidden(_)));
    let err = f.economy.award_honor("judge", "Taco", 0).await.unwrap_err();
    assert!(matches!(err, EconomyError::LimitExceeded(_)));

    let taco = f.economy.award_honor("judge", "Taco", 3).await.expect("award");
    assert_eq!(taco.honor, 3);

    let err = f.economy.consume_honor("Taco", 4).await.unwrap_err();
    assert!(matches!(err, EconomyError::InsufficientResource { needed: 4, available: 3, .. }));

    let taco = f.economy.consume_honor("Taco", 2).await.expect("consume");
    assert_eq!(taco.honor, 1);
    assert_eq!(taco.experience, 50);
}

#[tokio::test]
async fn cleanup_only_touches_dirty_inventories() {
    let f = fixture();
    f.economy.create_character("u1", "alice", "Taco").await.expect("create");
    f.economy.create_character("u1", "alice", "Burrito").await.expect("create");
    give(&f.economy, "Burrito", "Rope", 1);

    let mut taco = f.economy.store().get_character("Taco").expect("taco");
    taco.items.push(ItemStack::new("Rope", 0));
    taco.items.push(ItemStack::new("Nail", 4));
    f.economy.store().put_character(taco).expect("put");

    assert_eq!(f.economy.cleanup_inventories().await, 1);
    let taco = f.economy.inventory("gm", "Taco").expect("taco");
    assert_eq!(taco.items, vec![ItemStack::new("Nail", 4)]);
    assert_eq!(f.economy.cleanup_inventories().await, 0);
}

#[tokio::test]
async fn chat_commands_drive_the_economy() {
    let f = fixture();
    let alice = Invoker::new("u1", "alice");

    let reply = execute(&f.economy, &alice, "!life taco").await;
    assert!(reply.contains("Taco created"), "{}", reply);
    let reply = execute(&f.economy, &alice, "!life Taco").await;
    assert!(reply.starts_with("⚠️"), "{}", reply);

    give(&f.economy, "Taco", "Log", 2);
    let reply = execute(&f.economy, &alice, "!craft Taco plank").await;
    assert!(reply.contains("Taco started"), "{}", reply);
    let reply = execute(&f.economy, &alice, "!inventory Taco").await;
    assert!(reply.contains("Items: none"), "{}", reply);

    let reply = execute(&f.economy, &alice, "!start_project bridge").await;
    assert!(reply.contains("ID 1"), "{}", reply);
    let reply = execute(&f.economy, &alice, "!list_projects").await;
    assert!(reply.contains("River Bridge"), "{}", reply);

    let reply = execute(&f.economy, &alice, "!stats").await;
    assert!(reply.starts_with("Taco:"), "{}", reply);
    let reply = execute(&f.economy, &alice, "!frobnicate").await;
    assert!(reply.contains("unknown command"), "{}", reply);
    let reply = execute(&f.economy, &alice, "!trade list").await;
    assert!(reply.contains("no open trades"), "{}", reply);
}

#[tokio::test]
async fn scripted_commands_run_in_order() {
    let f = fixture();
    let alice = Invoker::new("u1", "alice");
    let script: &[u8] = b"!life Taco\n\n!scavenge Taco wood\n!scavenge Taco wood\n";

    let mut replies = Vec::new();
    let executed = execute_lines(&f.economy, &alice, script, |reply| replies.push(reply))
        .await
        .expect("script");

    assert_eq!(executed, 3);
    assert!(replies[0].contains("Taco created"), "{}", replies[0]);
    assert!(replies[1].starts_with("🔍"), "{}", replies[1]);
    assert!(replies[2].starts_with("⚠️"), "{}", replies[2]);
    assert!(f.economy.inventory("u1", "Taco").expect("taco").is_busy());
}
