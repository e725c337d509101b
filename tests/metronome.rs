// tests/metronome.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingClicks, harness};
use practice_modules::MetronomeClock;
use practice_modules::metronome::{Bpm, MAX_BPM, MIN_BPM};

fn assert_intervals(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len(), "intervals {actual:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-3, "intervals {actual:?}, expected {expected:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn clicks_follow_the_tempo_and_keep_phase_on_change() {
    let clicks = Arc::new(RecordingClicks::default());
    let mut clock = MetronomeClock::new(Bpm::new(120), clicks.clone());
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert_eq!(clicks.count(), 4);

    // The click already due at 2.0 s still lands there; 90 bpm starts after it.
    clock.set_bpm(90);
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let third = 60.0 / 90.0;
    assert_intervals(&clicks.intervals(), &[0.5, 0.5, 0.5, 0.5, third, third]);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_clicks() {
    let clicks = Arc::new(RecordingClicks::default());
    let mut clock = MetronomeClock::new(Bpm::new(120), clicks.clone());
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(clicks.count(), 3);

    clock.stop();
    assert!(!clock.is_running());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(clicks.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn start_twice_keeps_one_schedule() {
    let clicks = Arc::new(RecordingClicks::default());
    let mut clock = MetronomeClock::new(Bpm::new(60), clicks.clone());
    clock.start().unwrap();
    clock.start().unwrap();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(clicks.count(), 3);
}

#[tokio::test]
async fn tempo_is_clamped_at_both_ends() {
    let clicks = Arc::new(RecordingClicks::default());
    let mut clock = MetronomeClock::new(Bpm::default(), clicks);

    assert_eq!(clock.set_bpm(5).value(), MIN_BPM);
    assert_eq!(clock.adjust_bpm(-1).value(), MIN_BPM);
    assert_eq!(clock.set_bpm(400).value(), MAX_BPM);
    assert_eq!(clock.adjust_bpm(5).value(), MAX_BPM);
    assert_eq!(clock.adjust_bpm(-80).value(), MAX_BPM - 80);
}

#[test]
fn starting_outside_a_runtime_is_an_error() {
    let clicks = Arc::new(RecordingClicks::default());
    let mut clock = MetronomeClock::new(Bpm::default(), clicks);
    assert!(clock.start().is_err());
    assert!(!clock.is_running());
}

#[tokio::test(start_paused = true)]
async fn metronome_never_touches_the_transport() {
    let mut h = harness(180.0, None).await;
    h.controller.play();
    h.engine.set_position(12.0);

    assert!(h.controller.toggle_metronome().unwrap());
    h.controller.set_bpm(150);
    tokio::time::sleep(Duration::from_millis(900)).await;
    h.controller.adjust_bpm(-30);
    tokio::time::sleep(Duration::from_millis(900)).await;

    assert!(h.clicks.count() >= 3);
    assert_eq!(h.engine.position(), 12.0);
    assert!(h.engine.seeks().is_empty());
    assert!(h.engine.is_playing());
    assert_eq!(h.controller.bpm().value(), 120);

    assert!(!h.controller.toggle_metronome().unwrap());
    let heard = h.clicks.count();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.clicks.count(), heard);
}
