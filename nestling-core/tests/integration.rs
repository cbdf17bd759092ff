//! Integration Tests: end-to-end companion flows.
//!
//! Engine dispatch, cooldown advice, debounced persistence, stage upgrades
//! and achievement unlocks working together.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use parking_lot::Mutex;

use nestling_core::achievement::{AchievementBook, default_catalog};
use nestling_core::activity::ActivityStats;
use nestling_core::clock::{Clock, ManualClock};
use nestling_core::condition::{Condition, Counters};
use nestling_core::config::{InteractionEffect, NestlingConfig, PersistenceConfig};
use nestling_core::cooldown;
use nestling_core::persistence::{
    AttributePatch, MemoryStore, PersistenceCoordinator, ProgressStore, SnapshotStore, SqliteStore,
};
use nestling_core::stage::StageTable;
use nestling_core::{AttributeState, Engine, Event, InteractionKind, Rules};

fn manual_clock() -> ManualClock {
    let start = Utc
        .with_ymd_and_hms(2026, 5, 1, 9, 0, 0)
        .single()
        .expect("valid start");
    ManualClock::new(start)
}

// ---------------------------------------------------------------------------
// Dispatch scenarios
// ---------------------------------------------------------------------------

#[test]
fn pet_at_the_ceiling_only_moves_affinity() {
    let clock = manual_clock();
    let mut rules = Rules::default();
    *rules.interactions.get_mut(InteractionKind::Pet) = InteractionEffect {
        cooldown_seconds: 60,
        mood_delta: 10.0,
        energy_delta: 0.0,
        affinity_delta: 2.0,
        experience_gain: 0,
        currency_gain: 0,
    };

    let mut state = AttributeState::new(clock.now());
    state.mood = 100.0;
    state.energy = 100.0;
    state.affinity = 20.0;

    let mut engine = Engine::new(state, rules, Arc::new(clock.clone()));
    let t = engine.dispatch(Event::interact(InteractionKind::Pet));

    assert!((t.new.mood - 100.0).abs() < 1e-9);
    assert!((t.new.energy - 100.0).abs() < 1e-9);
    assert!((t.new.affinity - 22.0).abs() < 1e-9);
    assert_eq!(t.new.total_interactions, 1);
}

#[test]
fn cooldown_is_advisory_to_dispatch() {
    let clock = manual_clock();
    let mut engine = Engine::fresh(Rules::default(), Arc::new(clock.clone()));
    let table = engine.rules().interactions.clone();
    assert_eq!(table.feed.cooldown_seconds, 120);

    let mut remaining = Vec::new();
    for _ in 0..3 {
        remaining.push(cooldown::remaining_for(
            engine.state(),
            InteractionKind::Feed,
            clock.now(),
            &table,
        ));
        engine.dispatch(Event::interact(InteractionKind::Feed));
        clock.advance(Duration::seconds(1));
    }

    assert_eq!(remaining[0], 0);
    assert!(remaining[1] > 0);
    assert!(remaining[2] > 0);
    assert_eq!(engine.state().total_interactions, 3);
    assert_eq!(engine.state().experience, 3);
}

#[test]
fn decay_after_a_long_night_is_capped() {
    let clock = manual_clock();
    let mut engine = Engine::fresh(Rules::default(), Arc::new(clock.clone()));
    clock.advance(Duration::days(3));

    let t = engine.dispatch(Event::ApplyDecay);
    let decay = engine.rules().decay;
    assert!(t.change.decay_applied);
    assert!((t.old.mood - t.new.mood) <= decay.max_mood_decay_per_tick + 1e-9);
    assert!((t.old.energy - t.new.energy) <= decay.max_energy_decay_per_tick + 1e-9);
    assert_eq!(t.new.last_decay_applied_at, clock.now());

    clock.advance(Duration::minutes(2));
    let t = engine.dispatch(Event::ApplyDecay);
    assert!(!t.change.decay_applied);
    assert_eq!(t.old, t.new);
}

#[test]
fn unknown_json_event_leaves_state_alone() {
    let clock = manual_clock();
    let mut engine = Engine::fresh(Rules::default(), Arc::new(clock));
    let before = engine.snapshot();
    let t = engine.dispatch(Event::from_json(r#"{"type":"hug"}"#));
    assert!(!t.change.handled);
    assert_eq!(engine.snapshot(), before);
}

// ---------------------------------------------------------------------------
// Stages and achievements
// ---------------------------------------------------------------------------

#[test]
fn stage_upgrade_and_unlocks_follow_play() {
    let clock = manual_clock();
    let mut engine = Engine::fresh(Rules::default(), Arc::new(clock.clone()));
    let stages = StageTable::default();
    let mut book = AchievementBook::new(default_catalog()).expect("catalog");
    let mut activity = ActivityStats::default();

    let mut upgrades = Vec::new();
    let mut unlocked = Vec::new();
    for day in 0..3 {
        for kind in InteractionKind::ALL {
            let t = engine.dispatch(Event::interact(kind));
            activity.record_interaction(kind, t.at);
            if let Some(up) = stages.detect_upgrade(t.old.affinity, t.new.affinity) {
                upgrades.push(up);
            }
            let counters = activity.counters(&t.new, t.at);
            unlocked.extend(book.check(&counters, t.at).into_iter().map(|r| r.definition.id));
            clock.advance(Duration::minutes(10));
        }
        engine.dispatch(Event::SetAffinity {
            value: 29.0 + f64::from(day) * 30.0,
        });
        clock.advance(Duration::days(1));
    }

    assert!(unlocked.contains(&"first_pet".to_string()));
    assert!(unlocked.contains(&"first_feed".to_string()));
    assert!(unlocked.contains(&"first_play".to_string()));
    assert!(unlocked.contains(&"streak_3".to_string()));
    assert!(unlocked.contains(&"affinity_friend".to_string()));
    assert!(!upgrades.is_empty());
    assert_eq!(activity.consecutive_days, 3);

    let before = book.unlocked_count();
    let counters = activity.counters(engine.state(), clock.now());
    assert!(book.check(&counters, clock.now()).is_empty());
    assert_eq!(book.unlocked_count(), before);
}

#[test]
fn condition_grammar_scenarios() {
    let both = Condition::parse("pet_count >= 1 AND feed_count >= 1");
    let either = Condition::parse("pet_count >= 1 OR feed_count >= 1");
    let bogus = Condition::parse("zzz >= 1");

    let only_pet = Counters {
        pet_count: 1,
        ..Counters::default()
    };
    let pet_and_feed = Counters {
        pet_count: 1,
        feed_count: 1,
        ..Counters::default()
    };

    assert!(!both.evaluate(&only_pet));
    assert!(both.evaluate(&pet_and_feed));
    assert!(either.evaluate(&only_pet));
    assert!(!either.evaluate(&Counters::default()));
    assert!(!bogus.evaluate(&pet_and_feed));
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn debounced_then_immediate_writes_once() {
    let state = AttributeState::new(Utc::now());
    let store = Arc::new(MemoryStore::seeded(state));
    let coordinator = PersistenceCoordinator::new(
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
        StdDuration::from_secs(5),
    )
    .expect("runtime");

    coordinator.schedule(AttributePatch {
        mood: Some(70.0),
        ..AttributePatch::default()
    });
    tokio::time::sleep(StdDuration::from_secs(1)).await;
    coordinator
        .flush_now(AttributePatch {
            affinity: Some(12.0),
            ..AttributePatch::default()
        })
        .expect("flush");

    tokio::time::sleep(StdDuration::from_secs(20)).await;

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].mood, Some(70.0));
    assert_eq!(writes[0].affinity, Some(12.0));
    assert_eq!(coordinator.stats().cancelled_timers, 1);
}

#[tokio::test(start_paused = true)]
async fn engine_changes_reach_sqlite_through_listener() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nestling.db");
    let clock = manual_clock();

    let store = Arc::new(SqliteStore::open(&path, &PersistenceConfig::default()).expect("open"));
    let mut engine = Engine::fresh(Rules::default(), Arc::new(clock.clone()));
    store.seed(engine.state()).expect("seed");

    let coordinator = Arc::new(
        PersistenceCoordinator::new(
            Arc::clone(&store) as Arc<dyn SnapshotStore>,
            StdDuration::from_secs(5),
        )
        .expect("runtime"),
    );
    let sink = Arc::clone(&coordinator);
    let events = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&events);
    engine.subscribe(move |old, new, event| {
        seen.lock().push(event.name());
        sink.schedule(AttributePatch::diff(old, new));
    });

    engine.dispatch(Event::interact(InteractionKind::Play));
    clock.advance(Duration::seconds(30));
    engine.dispatch(Event::interact(InteractionKind::Pet));
    tokio::time::sleep(StdDuration::from_secs(6)).await;

    assert_eq!(*events.lock(), vec!["interact", "interact"]);
    assert_eq!(coordinator.stats().writes, 1);

    let loaded = store.load_snapshot().expect("load").expect("seeded");
    assert_eq!(loaded, engine.snapshot());
    assert_eq!(store.load_unlocks().expect("unlocks").len(), 0);
}

#[test]
fn config_round_trip_drives_rules() {
    let config = NestlingConfig::from_toml(
        r#"
        [interactions.play]
        cooldown_seconds = 10
        mood_delta = 50.0
        energy_delta = -50.0
        affinity_delta = 10.0
        "#,
    )
    .expect("parse");
    config.validate().expect("valid");

    let clock = manual_clock();
    let mut engine = Engine::fresh(Rules::from(&config), Arc::new(clock));
    let t = engine.dispatch(Event::interact(InteractionKind::Play));
    assert!((t.new.mood - 100.0).abs() < 1e-9);
    assert!((t.new.energy - 30.0).abs() < 1e-9);
    assert!((t.new.affinity - 10.0).abs() < 1e-9);
}
