// tests/looping.rs

mod common;

use std::sync::Arc;

use common::{TRACK, harness};
use practice_modules::LoopState;
use practice_modules::store::MemoryRegionApi;

#[tokio::test]
async fn loop_seeks_back_at_region_end() {
    let mut h = harness(180.0, None).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.toggle_loop_selected().unwrap();

    assert_eq!(h.controller.loop_state(), LoopState::Looping(id));
    assert!(h.engine.is_playing());
    assert_eq!(h.engine.seeks(), [38.0]);

    h.engine.tick(40.0);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0]);
    assert_eq!(h.controller.playhead_region(), Some(id));

    // Overshoot past the end is accepted; the next tick brings it back.
    h.engine.tick(42.03);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0, 38.0]);
    assert!(h.engine.is_playing(), "looping never pauses");
}

#[tokio::test]
async fn duplicate_and_late_ticks_do_not_seek_twice() {
    let mut h = harness(180.0, None).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.start_loop(id).unwrap();

    h.engine.tick(42.1);
    h.engine.replay_tick(42.1);
    h.controller.pump();
    // The second tick arrives after the seek already landed at 38.
    assert_eq!(h.engine.seeks(), [38.0, 38.0]);

    // A skipped stretch of ticks followed by one far past the end still loops.
    h.engine.tick(47.0);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0, 38.0, 38.0]);
}

#[tokio::test]
async fn starting_b_replaces_a_in_one_transition() {
    let store = Arc::new(MemoryRegionApi::new());
    let mut h = harness(180.0, Some(store.clone())).await;
    let a = h.controller.create_region(20.0).unwrap();
    let b = h.controller.create_region(90.0).unwrap();
    h.controller.settle().await;

    h.controller.start_loop(a).unwrap();
    // A tick for A is queued but not yet handled when B starts.
    h.engine.tick(22.5);
    h.controller.start_loop(b).unwrap();

    assert_eq!(h.controller.loop_state(), LoopState::Looping(b));
    assert_eq!(h.engine.active_subscriptions(), 1);
    assert_eq!(h.engine.subscribe_calls(), 2);

    h.controller.pump();
    assert_eq!(h.engine.seeks(), [18.0, 88.0], "stale tick for A is ignored");

    h.engine.tick(92.0);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [18.0, 88.0, 88.0]);

    h.controller.settle().await;
    let rows = store.rows(TRACK);
    assert!(!rows[0].looped, "A's loop flag is cleared");
    assert!(rows[1].looped, "B's loop flag is set");
    // Coordinates never change through loop toggles.
    assert_eq!((rows[0].start_sec, rows[0].end_sec), (18.0, 22.0));
}

#[tokio::test]
async fn toggling_the_active_loop_stops_it_without_pausing() {
    let store = Arc::new(MemoryRegionApi::new());
    let mut h = harness(180.0, Some(store.clone())).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.settle().await;

    h.controller.toggle_loop(id).unwrap();
    h.controller.toggle_loop(id).unwrap();
    assert_eq!(h.controller.loop_state(), LoopState::Idle);
    assert_eq!(h.engine.active_subscriptions(), 0);
    assert!(h.engine.is_playing());

    h.controller.settle().await;
    assert!(!store.rows(TRACK)[0].looped);
}

#[tokio::test]
async fn deleting_the_looping_region_goes_idle_first() {
    let store = Arc::new(MemoryRegionApi::new());
    let mut h = harness(180.0, Some(store.clone())).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.settle().await;
    h.controller.start_loop(id).unwrap();

    h.engine.tick(43.0);
    h.controller.delete_region(id).unwrap();

    assert_eq!(h.controller.loop_state(), LoopState::Idle);
    assert_eq!(h.engine.active_subscriptions(), 0);
    assert!(h.controller.region(id).is_none());

    // The queued tick refers to a loop that no longer exists.
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0]);

    h.controller.settle().await;
    assert!(store.rows(TRACK).is_empty());
}

#[tokio::test]
async fn resizing_the_looping_region_moves_the_loop_end() {
    let mut h = harness(180.0, None).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.start_loop(id).unwrap();
    h.controller.resize_region(id, 38.0, 60.0).unwrap();

    h.engine.tick(45.0);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0]);

    h.engine.tick(60.0);
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0, 38.0]);
}

#[tokio::test]
async fn highlight_tracks_selection_or_loop() {
    let mut h = harness(180.0, None).await;
    let a = h.controller.create_region(20.0).unwrap();
    let b = h.controller.create_region(90.0).unwrap();

    h.controller.start_loop(a).unwrap();
    // b is selected, a is looping: both are drawn active.
    assert!(h.controller.is_highlighted(a));
    assert!(h.controller.is_highlighted(b));

    h.controller.stop_loop();
    assert!(!h.controller.is_highlighted(a));
    assert!(h.controller.is_highlighted(b));
}

#[tokio::test]
async fn loop_waits_for_unlock_then_starts() {
    let mut h = harness(180.0, None).await;
    h.engine.set_gated(true);
    let id = h.controller.create_region(40.0).unwrap();

    h.controller.toggle_loop_selected().unwrap();
    assert_eq!(h.controller.loop_state(), LoopState::Idle);
    assert_eq!(h.controller.pending_transport(), 1);
    assert!(h.controller.take_status().unwrap().contains("locked"));

    h.engine.set_gated(false);
    h.controller.unlock().unwrap();
    assert_eq!(h.controller.pending_transport(), 0);
    assert_eq!(h.controller.loop_state(), LoopState::Looping(id));
    assert!(h.engine.is_playing());
}

#[tokio::test]
async fn loop_toggled_off_before_unlock_never_starts() {
    let mut h = harness(180.0, None).await;
    h.engine.set_gated(true);
    h.controller.create_region(40.0).unwrap();

    h.controller.toggle_loop_selected().unwrap();
    h.controller.toggle_loop_selected().unwrap();
    assert_eq!(h.controller.pending_transport(), 0);

    h.engine.set_gated(false);
    h.controller.unlock().unwrap();
    assert_eq!(h.controller.loop_state(), LoopState::Idle);
    assert_eq!(h.engine.subscribe_calls(), 0);
    assert!(h.engine.seeks().is_empty());
}

#[tokio::test]
async fn only_the_latest_loop_request_waits_for_unlock() {
    let mut h = harness(180.0, None).await;
    h.engine.set_gated(true);
    let a = h.controller.create_region(20.0).unwrap();
    let b = h.controller.create_region(90.0).unwrap();

    h.controller.start_loop(a).unwrap();
    h.controller.start_loop(b).unwrap();
    assert_eq!(h.controller.pending_transport(), 1);

    h.engine.set_gated(false);
    h.controller.unlock().unwrap();
    assert_eq!(h.controller.loop_state(), LoopState::Looping(b));
    assert_eq!(h.engine.subscribe_calls(), 1);
    assert_eq!(h.engine.seeks(), [88.0]);
}

#[tokio::test]
async fn play_requested_while_gated_is_deferred_not_dropped() {
    let mut h = harness(60.0, None).await;
    h.engine.set_gated(true);

    h.controller.toggle_play();
    assert!(!h.engine.is_playing());
    assert_eq!(h.controller.pending_transport(), 1);

    h.engine.set_gated(false);
    h.controller.unlock().unwrap();
    assert!(h.engine.is_playing());
}

#[tokio::test]
async fn dispose_unsubscribes_and_silences_everything() {
    let mut h = harness(180.0, None).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.start_loop(id).unwrap();
    h.controller.toggle_metronome().unwrap();
    assert!(h.controller.metronome_running());

    h.engine.tick(44.0);
    h.controller.dispose();

    assert_eq!(h.engine.active_subscriptions(), 0);
    assert!(!h.controller.metronome_running());
    assert!(h.engine.is_disposed());

    // Late events and further calls are harmless.
    h.controller.pump();
    assert_eq!(h.engine.seeks(), [38.0]);
    h.controller.toggle_play();
    h.controller.dispose();
    assert!(h.controller.create_region(10.0).is_err());
}

#[tokio::test]
async fn switching_tracks_stops_the_loop() {
    let mut h = harness(180.0, None).await;
    let id = h.controller.create_region(40.0).unwrap();
    h.controller.start_loop(id).unwrap();
    h.engine.tick(41.0);

    h.controller
        .open_track(practice_modules::TrackSource {
            source: "take-2.wav".into(),
            track_id: None,
        })
        .unwrap();
    h.controller.settle().await;

    assert_eq!(h.controller.loop_state(), LoopState::Idle);
    assert_eq!(h.engine.active_subscriptions(), 0);
    assert_eq!(h.engine.seeks(), [38.0]);
    assert!(h.controller.regions().is_empty());
}
