//! QA tests for replay determinism.
//!
//! These tests verify the replay contract over long histories:
//! - Rebuilding a history twice yields byte-identical state
//! - Incremental application and full rebuild never diverge
//! - Applying one more message to a rebuilt store equals rebuilding the
//!   longer history
//! - Reprocessing an already-applied message is rejected, not double-counted
//!
//! Run with: `cargo test --test qa_replay`

use chronicle_core::{EventBus, FactCategory, Message, StateStore, Synchronizer};

/// A varied 500+ message history exercising every extraction path.
fn long_history(len: usize) -> Vec<Message> {
    let beats = [
        "You enter the tavern as rain begins to fall.",
        "Elena says the roads south are crawling with bandits.",
        "You head out across the plains at dawn.",
        "Nothing much happens for a while.",
        "A merchant named Doran hails you near the bridge.",
        "He hands you a folded map and wishes you luck.",
        "[+1 Healing Potion]",
        "A brigand lunges at you, dagger flashing!",
        "You dodge and catch your breath.",
        "[ooc: stepping away for a minute]",
        "The forest thins as you reach the city gates at dusk.",
        "Guardsmen of the city watch eye you warily.",
    ];
    (0..len)
        .map(|i| {
            if i % 2 == 0 {
                Message::narrator(i as u64, beats[(i / 2) % beats.len()])
            } else {
                Message::player(i as u64, "I press on.")
            }
        })
        .collect()
}

fn rebuild(history: &[Message]) -> StateStore {
    Synchronizer::builtin()
        .rebuild(history, &mut EventBus::new())
        .expect("contiguous history must rebuild")
}

// =============================================================================
// DETERMINISM
// =============================================================================

#[test]
fn test_rebuild_is_deterministic() {
    let history = long_history(500);
    let a = rebuild(&history);
    let b = rebuild(&history);

    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn test_incremental_matches_rebuild_over_long_history() {
    let sync = Synchronizer::builtin();
    let history = long_history(500);

    let mut incremental = StateStore::new();
    let mut bus = EventBus::new();
    for message in &history {
        sync.apply_one(&mut incremental, message, &mut bus)
            .expect("contiguous history must apply");
    }

    let rebuilt = rebuild(&history);
    assert_eq!(rebuilt, incremental);
}

#[test]
fn test_apply_after_rebuild_equals_rebuilding_the_longer_history() {
    let sync = Synchronizer::builtin();
    let long = long_history(502);
    let (head, tail) = long.split_at(501);

    let mut resumed = rebuild(head);
    sync.apply_one(&mut resumed, &tail[0], &mut EventBus::new())
        .expect("next-in-sequence message must apply");

    let full = rebuild(&long);
    assert_eq!(resumed, full);
    assert_eq!(
        serde_json::to_string(&resumed).unwrap(),
        serde_json::to_string(&full).unwrap()
    );
}

#[test]
fn test_long_history_accumulates_expected_state() {
    let history = long_history(500);
    let store = rebuild(&history);

    assert_eq!(store.cursor(), Some(499));
    assert!(!store.entities_of(FactCategory::Person).is_empty());
    assert!(!store.entities_of(FactCategory::Item).is_empty());
    assert!(store.has_tag("social"));
    // The cycle always ends out of combat.
    assert!(!store.current().in_combat);
}

// =============================================================================
// IDEMPOTENT REPROCESSING
// =============================================================================

#[test]
fn test_reapplying_an_old_message_is_rejected() {
    let sync = Synchronizer::builtin();
    let history = long_history(10);
    let mut store = rebuild(&history);
    let snapshot = serde_json::to_string(&store).unwrap();

    let mut bus = EventBus::new();
    for old in &history {
        let err = sync.apply_one(&mut store, old, &mut bus).unwrap_err();
        assert_eq!(err.expected, 10);
        assert_eq!(err.found, old.index);
    }

    // Rejected applies leave no trace.
    assert_eq!(serde_json::to_string(&store).unwrap(), snapshot);
}

#[test]
fn test_replayed_grants_do_not_duplicate_records() {
    let history = vec![
        Message::narrator(0, "[+1 Iron Sword]"),
        Message::narrator(1, "You test the edge of the iron sword."),
        Message::narrator(2, "[+1 Iron Sword]"),
    ];
    let store = rebuild(&history);

    let items = store.entities_of(FactCategory::Item);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].first_seen, 0);
    assert_eq!(items[0].last_seen, 2);
}
