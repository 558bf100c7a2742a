//! Reservation state machine tests through the layout boundary.

use std::sync::Arc;

use rs_railcontrol::hal::RecordingPublisher;
use rs_railcontrol::{
    FeedbackConfig, FeedbackId, FeedbackState, Layout, LockState, LocoId, TrackConfig, TrackId,
};

const T1: TrackId = TrackId(1);
const T2: TrackId = TrackId(2);
const F1: FeedbackId = FeedbackId(1);
const L7: LocoId = LocoId(7);
const L42: LocoId = LocoId(42);

fn layout_with_sensor(occupied: bool) -> Layout {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(F1, "F1", 1)).unwrap();
    if occupied {
        assert!(layout.set_feedback_state(F1, FeedbackState::Occupied));
    }
    layout
        .add_track(
            TrackConfig::new(T2, "T2")
                .with_feedbacks([F1])
                .with_release_when_free(true),
        )
        .unwrap();
    layout
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn reserve_lock_release_then_other_loco() {
    let layout = Layout::new();
    layout
        .add_track(TrackConfig::new(T1, "T1").with_length(5))
        .unwrap();

    assert!(layout.reserve(T1, L7));
    assert!(layout.lock(T1, L7));
    assert!(layout.release(T1, L7));
    assert_eq!(layout.track(T1).unwrap().lock_state(), LockState::Free);
    assert!(layout.reserve(T1, L42));
}

#[test]
fn deferred_release_completes_on_free_feedback() {
    let layout = layout_with_sensor(true);

    assert!(layout.reserve(T2, L7));
    assert!(layout.lock(T2, L7));
    assert!(layout.release(T2, L7));

    let track = layout.track(T2).unwrap();
    assert_eq!(track.lock_state(), LockState::Locked(L7));
    assert_eq!(track.loco_delayed(), Some(L7));
    assert!(!layout.reserve(T2, L42));

    assert!(layout.set_feedback_state(F1, FeedbackState::Free));
    assert_eq!(track.lock_state(), LockState::Free);
    assert_eq!(track.loco_delayed(), None);
    assert!(layout.reserve(T2, L42));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn lock_requires_matching_reservation() {
    let layout = Layout::new();
    layout.add_track(TrackConfig::new(T1, "T1")).unwrap();

    assert!(!layout.lock(T1, L7));
    assert!(layout.reserve(T1, L7));
    assert!(!layout.lock(T1, L42));
    assert!(layout.lock(T1, L7));
}

#[test]
fn blocked_flag_round_trip() {
    let layout = Layout::new();
    layout.add_track(TrackConfig::new(T1, "T1")).unwrap();

    assert!(layout.set_blocked(T1, true));
    assert!(!layout.reserve(T1, L7));
    assert!(layout.set_blocked(T1, false));
    assert!(layout.reserve(T1, L7));
}

#[test]
fn blocking_keeps_current_holder() {
    let layout = Layout::new();
    layout.add_track(TrackConfig::new(T1, "T1")).unwrap();
    assert!(layout.reserve(T1, L7));
    assert!(layout.set_blocked(T1, true));
    assert!(layout.lock(T1, L7));
    assert!(layout.release(T1, L7));
    assert!(!layout.reserve(T1, L7));
}

#[test]
fn reserve_force_takes_over_lock() {
    let layout = Layout::new();
    layout.add_track(TrackConfig::new(T1, "T1")).unwrap();
    assert!(layout.reserve(T1, L7));
    assert!(layout.lock(T1, L7));

    assert!(layout.reserve_force(T1, L42));
    assert_eq!(layout.track(T1).unwrap().lock_state(), LockState::Reserved(L42));
    assert!(!layout.release(T1, L7));
}

#[test]
fn release_force_ignores_occupancy() {
    let layout = layout_with_sensor(true);
    assert!(layout.reserve(T2, L7));
    assert!(layout.lock(T2, L7));

    assert!(layout.release_force(T2, L42));
    let track = layout.track(T2).unwrap();
    assert_eq!(track.lock_state(), LockState::Free);
    assert_eq!(track.loco_delayed(), None);

    // A later free report has nothing to complete.
    assert!(layout.set_feedback_state(F1, FeedbackState::Free));
    assert_eq!(track.lock_state(), LockState::Free);
}

#[test]
fn release_without_deferral_frees_occupied_segment() {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(F1, "F1", 1)).unwrap();
    layout
        .add_track(TrackConfig::new(T1, "T1").with_feedbacks([F1]))
        .unwrap();
    assert!(layout.set_feedback_state(F1, FeedbackState::Occupied));
    assert!(layout.reserve(T1, L7));
    assert!(layout.release(T1, L7));

    let track = layout.track(T1).unwrap();
    assert_eq!(track.lock_state(), LockState::Free);
    assert_eq!(track.occupancy(), FeedbackState::Occupied);
    assert_eq!(track.occupancy_delayed(), FeedbackState::Occupied);
}

#[test]
fn sensor_without_track_only_records_state() {
    let layout = Layout::new();
    layout.add_feedback(FeedbackConfig::new(F1, "F1", 1)).unwrap();
    assert!(layout.set_feedback_state(F1, FeedbackState::Occupied));
    assert_eq!(layout.feedback(F1).unwrap().state(), FeedbackState::Occupied);
}

#[test]
fn observers_see_deferred_completion() {
    let publisher = Arc::new(RecordingPublisher::new());
    let layout = Layout::new().with_publisher(publisher.clone());
    layout.add_feedback(FeedbackConfig::new(F1, "F1", 1)).unwrap();
    layout
        .add_track(
            TrackConfig::new(T2, "T2")
                .with_feedbacks([F1])
                .with_release_when_free(true),
        )
        .unwrap();
    assert!(layout.set_feedback_state(F1, FeedbackState::Occupied));
    assert!(layout.reserve(T2, L7));
    assert!(layout.lock(T2, L7));
    assert!(layout.release(T2, L7));
    publisher.clear();

    assert!(layout.set_feedback_state(F1, FeedbackState::Free));
    let last = publisher.last().unwrap();
    assert_eq!(publisher.count(), 1);
    assert_eq!(last.lock, LockState::Free);
    assert_eq!(last.occupancy, FeedbackState::Free);
    assert_eq!(last.occupancy_delayed, FeedbackState::Free);
    assert_eq!(last.loco_delayed, None);
}
