//! Concurrency, idempotence and persistence edge cases.

use std::sync::{Arc, Barrier};
use std::thread;

use rs_railcontrol::{
    AccessoryConfig, AccessoryId, AccessoryKind, AccessoryState, FeedbackConfig, FeedbackId,
    FeedbackState, JsonFileStore, Layout, LockState, Loco, LocoId, MemoryStore, Relation,
    RouteConfig, RouteId, SelectRouteApproach, TrackConfig, TrackId,
};

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_reserve_has_one_winner() {
    const THREADS: u32 = 8;
    let layout = Arc::new(Layout::new());
    layout.add_track(TrackConfig::new(TrackId(1), "T1")).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (1..=THREADS)
        .map(|n| {
            let layout = Arc::clone(&layout);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                layout.reserve(TrackId(1), LocoId(n))
            })
        })
        .collect();
    let winners: Vec<u32> = handles
        .into_iter()
        .zip(1..=THREADS)
        .filter_map(|(h, n)| h.join().unwrap().then_some(n))
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(
        layout.track(TrackId(1)).unwrap().lock_state(),
        LockState::Reserved(LocoId(winners[0]))
    );
}

#[test]
fn concurrent_route_reservations_never_overlap() {
    // Two routes share the switch W1; one of them must lose cleanly.
    let layout = Arc::new(Layout::new());
    for id in 1..=3 {
        layout.add_track(TrackConfig::new(TrackId(id), format!("T{id}"))).unwrap();
    }
    layout
        .add_accessory(AccessoryConfig::new(AccessoryId(1), "W1", AccessoryKind::Switch, 1))
        .unwrap();
    for (route, to, state) in [(1, 2, AccessoryState::Off), (2, 3, AccessoryState::On)] {
        layout
            .add_route(
                RouteConfig::new(RouteId(route), "r", TrackId(1), TrackId(to))
                    .with_relation(Relation::Accessory { id: AccessoryId(1), state }),
            )
            .unwrap();
    }

    for _ in 0..50 {
        let barrier = Arc::new(Barrier::new(2));
        let spawn = |route: u32, loco: u32| {
            let layout = Arc::clone(&layout);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                layout.reserve_route(RouteId(route), LocoId(loco))
            })
        };
        let a = spawn(1, 7);
        let b = spawn(2, 42);
        let (a, b) = (a.join().unwrap(), b.join().unwrap());
        assert!(!(a && b), "both routes reserved the shared switch");

        let switch = layout.accessory(AccessoryId(1)).unwrap().lock_state();
        match (a, b) {
            (true, false) => assert_eq!(switch, LockState::Reserved(LocoId(7))),
            (false, true) => assert_eq!(switch, LockState::Reserved(LocoId(42))),
            _ => assert!(switch.is_free()),
        }
        // A loser never keeps its destination.
        if !a {
            assert!(layout.track(TrackId(2)).unwrap().lock_state().is_free());
        }
        if !b {
            assert!(layout.track(TrackId(3)).unwrap().lock_state().is_free());
        }

        for (route, loco, to) in [(1, 7, 2), (2, 42, 3)] {
            let _ = layout.release_route(RouteId(route), LocoId(loco));
            let _ = layout.release(TrackId(to), LocoId(loco));
        }
    }
}

#[test]
fn feedback_and_release_race_ends_free() {
    for _ in 0..50 {
        let layout = Arc::new(Layout::new());
        layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
        layout
            .add_track(
                TrackConfig::new(TrackId(1), "T1")
                    .with_feedbacks([FeedbackId(1)])
                    .with_release_when_free(true),
            )
            .unwrap();
        assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Occupied));
        assert!(layout.reserve(TrackId(1), LocoId(7)));
        assert!(layout.lock(TrackId(1), LocoId(7)));

        let barrier = Arc::new(Barrier::new(2));
        let releaser = {
            let layout = Arc::clone(&layout);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                layout.release(TrackId(1), LocoId(7))
            })
        };
        let sensor = {
            let layout = Arc::clone(&layout);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                layout.set_feedback_state(FeedbackId(1), FeedbackState::Free)
            })
        };
        assert!(releaser.join().unwrap());
        assert!(sensor.join().unwrap());

        // Whichever ran first, the segment ends free and unheld.
        let track = layout.track(TrackId(1)).unwrap();
        assert_eq!(track.lock_state(), LockState::Free);
        assert_eq!(track.loco_delayed(), None);
    }
}

#[test]
fn concurrent_reports_for_one_sensor_agree_with_segment() {
    for _ in 0..50 {
        let layout = Arc::new(Layout::new());
        layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
        layout
            .add_track(TrackConfig::new(TrackId(1), "T1").with_feedbacks([FeedbackId(1)]))
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let reporters: Vec<_> = [FeedbackState::Occupied, FeedbackState::Free]
            .into_iter()
            .map(|state| {
                let layout = Arc::clone(&layout);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..20 {
                        assert!(layout.set_feedback_state(FeedbackId(1), state));
                    }
                })
            })
            .collect();
        for r in reporters {
            r.join().unwrap();
        }

        let sensor = layout.feedback(FeedbackId(1)).unwrap().state();
        assert_eq!(layout.track(TrackId(1)).unwrap().occupancy(), sensor);
    }
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn repeated_feedback_is_idempotent() {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
    layout
        .add_track(TrackConfig::new(TrackId(1), "T1").with_feedbacks([FeedbackId(1)]))
        .unwrap();

    for _ in 0..3 {
        assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Occupied));
    }
    let occupied = layout.track(TrackId(1)).unwrap().snapshot();
    assert_eq!(occupied.occupancy, FeedbackState::Occupied);

    for _ in 0..3 {
        assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Free));
    }
    let free = layout.track(TrackId(1)).unwrap().snapshot();
    assert_eq!(free.occupancy, FeedbackState::Free);
    assert_eq!(free.occupancy_delayed, FeedbackState::Free);
    assert_eq!(free.lock, LockState::Free);
}

#[test]
fn segment_with_two_sensors_stays_occupied_until_both_free() {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F1", 1)).unwrap();
    layout.add_feedback(FeedbackConfig::new(FeedbackId(2), "F2", 2)).unwrap();
    layout
        .add_track(
            TrackConfig::new(TrackId(1), "T1")
                .with_feedbacks([FeedbackId(1), FeedbackId(2)])
                .with_release_when_free(true),
        )
        .unwrap();
    assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Occupied));
    assert!(layout.set_feedback_state(FeedbackId(2), FeedbackState::Occupied));
    assert!(layout.reserve(TrackId(1), LocoId(7)));
    assert!(layout.release(TrackId(1), LocoId(7)));

    assert!(layout.set_feedback_state(FeedbackId(1), FeedbackState::Free));
    let track = layout.track(TrackId(1)).unwrap();
    assert_eq!(track.occupancy(), FeedbackState::Occupied);
    assert_eq!(track.loco_delayed(), Some(LocoId(7)));

    assert!(layout.set_feedback_state(FeedbackId(2), FeedbackState::Free));
    assert_eq!(track.occupancy(), FeedbackState::Free);
    assert_eq!(track.lock_state(), LockState::Free);
}

#[test]
fn release_by_non_holder_changes_nothing() {
    let layout = Layout::new();
    layout.add_track(TrackConfig::new(TrackId(1), "T1")).unwrap();
    assert!(!layout.release(TrackId(1), LocoId(7)));
    assert!(layout.reserve(TrackId(1), LocoId(7)));
    assert!(!layout.release(TrackId(1), LocoId(42)));
    assert_eq!(
        layout.track(TrackId(1)).unwrap().lock_state(),
        LockState::Reserved(LocoId(7))
    );
}

// ============================================================================
// Persistence
// ============================================================================

fn sample_layout() -> Layout {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(FeedbackId(1), "F;1", 11)).unwrap();
    layout
        .add_accessory(AccessoryConfig::new(AccessoryId(1), "W=1", AccessoryKind::Switch, 21))
        .unwrap();
    layout.add_loco(Loco::new(LocoId(7), "BR 218").with_length(4).with_push_pull(true));
    layout
        .add_track(
            TrackConfig::new(TrackId(1), "Platform 1")
                .with_length(10)
                .with_feedbacks([FeedbackId(1)])
                .with_release_when_free(true)
                .with_approach(SelectRouteApproach::LongestUnused),
        )
        .unwrap();
    layout
        .add_track(TrackConfig::new(TrackId(2), "Siding").with_length(3).with_blocked(true))
        .unwrap();
    layout
        .add_route(
            RouteConfig::new(RouteId(1), "in", TrackId(2), TrackId(1))
                .with_priority(2)
                .with_train_length(0, 6)
                .with_relation(Relation::Accessory {
                    id: AccessoryId(1),
                    state: AccessoryState::On,
                }),
        )
        .unwrap();
    layout
}

fn assert_same_layout(a: &Layout, b: &Layout) {
    assert_eq!(a.track_ids(), b.track_ids());
    assert_eq!(a.route_ids(), b.route_ids());
    assert_eq!(a.accessory_ids(), b.accessory_ids());
    assert_eq!(a.feedback_ids(), b.feedback_ids());
    assert_eq!(a.locos(), b.locos());
    for id in a.track_ids() {
        assert_eq!(a.track(id).unwrap().config(), b.track(id).unwrap().config());
    }
    for id in a.route_ids() {
        assert_eq!(a.route(id).unwrap().config(), b.route(id).unwrap().config());
        assert_eq!(a.route(id).unwrap().last_used(), b.route(id).unwrap().last_used());
    }
    assert_eq!(
        a.feedback(FeedbackId(1)).unwrap().config(),
        b.feedback(FeedbackId(1)).unwrap().config()
    );
}

#[test]
fn memory_store_round_trip() {
    let layout = sample_layout();
    let store = MemoryStore::new();
    layout.save_to(&store).unwrap();

    let restored = Layout::new();
    restored.load_from(&store).unwrap();
    assert_same_layout(&layout, &restored);
    assert_eq!(
        restored.feedback(FeedbackId(1)).unwrap().track(),
        Some(TrackId(1))
    );
    assert_eq!(restored.track(TrackId(1)).unwrap().routes(), vec![RouteId(1)]);
}

#[test]
fn save_drops_deleted_objects() {
    let layout = sample_layout();
    let store = MemoryStore::new();
    layout.save_to(&store).unwrap();
    let before = store.len();

    layout.delete_route(RouteId(1)).unwrap();
    layout.save_to(&store).unwrap();
    assert_eq!(store.len(), before - 1);
}

#[test]
fn json_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.json");

    let layout = sample_layout();
    // Take the route once so its stamp is persisted.
    assert!(layout.set_blocked(TrackId(2), false));
    assert!(layout.reserve_route(RouteId(1), LocoId(7)));
    assert!(layout.lock_route(RouteId(1), LocoId(7)));
    layout.save_to(&JsonFileStore::open(&path).unwrap()).unwrap();

    let restored = Layout::new();
    restored.load_from(&JsonFileStore::open(&path).unwrap()).unwrap();
    assert_same_layout(&layout, &restored);
    assert_eq!(restored.route(RouteId(1)).unwrap().last_used(), 1);

    // Reservation state is runtime only.
    assert!(restored.track(TrackId(1)).unwrap().lock_state().is_free());
}

#[test]
fn load_rejects_duplicate_ids() {
    let layout = sample_layout();
    let store = MemoryStore::new();
    layout.save_to(&store).unwrap();

    let partial = Layout::new();
    partial.add_track(TrackConfig::new(TrackId(2), "pre-existing")).unwrap();
    assert!(partial.load_from(&store).is_err());
}
