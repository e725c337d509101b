// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use practice_modules::engine::{AudioEngine, ReadyHandler, SubscriptionId, TickHandler};
use practice_modules::error::EngineError;
use practice_modules::metronome::{ClickOutput, ClickSound};
use practice_modules::region::{Region, RegionDecoration, RegionId};
use practice_modules::store::{MemoryRegionApi, RegionApi};
use practice_modules::{PracticeConfig, RegionController, TrackSource};

pub const TRACK: &str = "song-1";

#[derive(Default)]
pub struct MockState {
    pub duration: f64,
    pub position: f64,
    pub ready: bool,
    pub unlocked: bool,
    /// Unlock fails until cleared, like a browser before the first gesture.
    pub gated: bool,
    pub playing: bool,
    pub disposed: bool,
    pub loads: Vec<String>,
    pub seeks: Vec<f64>,
    pub subscribe_calls: usize,
    handlers: Vec<(SubscriptionId, TickHandler)>,
    next_subscription: u64,
}

/// Engine double. Loads become ready immediately; ticks are emitted by the
/// test through [`EngineProbe`].
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

#[derive(Clone)]
pub struct EngineProbe {
    state: Arc<Mutex<MockState>>,
}

pub fn mock_engine(duration: f64) -> (MockEngine, EngineProbe) {
    let state = Arc::new(Mutex::new(MockState {
        duration,
        ..MockState::default()
    }));
    (
        MockEngine {
            state: state.clone(),
        },
        EngineProbe { state },
    )
}

impl EngineProbe {
    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Move the playhead and call every subscribed handler, like the engine
    /// would on its own timer.
    pub fn tick(&self, position: f64) {
        self.with(|s| {
            s.position = position;
            for (_, handler) in s.handlers.iter_mut() {
                handler(position);
            }
        });
    }

    /// Deliver a tick without moving the playhead (a late duplicate).
    pub fn replay_tick(&self, position: f64) {
        self.with(|s| {
            for (_, handler) in s.handlers.iter_mut() {
                handler(position);
            }
        });
    }

    pub fn active_subscriptions(&self) -> usize {
        self.with(|s| s.handlers.len())
    }

    pub fn subscribe_calls(&self) -> usize {
        self.with(|s| s.subscribe_calls)
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.with(|s| s.seeks.clone())
    }

    pub fn position(&self) -> f64 {
        self.with(|s| s.position)
    }

    pub fn set_position(&self, position: f64) {
        self.with(|s| s.position = position);
    }

    pub fn is_playing(&self) -> bool {
        self.with(|s| s.playing)
    }

    pub fn is_disposed(&self) -> bool {
        self.with(|s| s.disposed)
    }

    pub fn set_gated(&self, gated: bool) {
        self.with(|s| s.gated = gated);
    }

    pub fn loads(&self) -> Vec<String> {
        self.with(|s| s.loads.clone())
    }
}

impl AudioEngine for MockEngine {
    fn load(&mut self, source: &str, on_ready: ReadyHandler) -> Result<(), EngineError> {
        let duration = {
            let mut s = self.state.lock().unwrap();
            if s.disposed {
                return Err(EngineError::Unavailable("disposed".into()));
            }
            s.loads.push(source.to_string());
            s.ready = true;
            s.position = 0.0;
            s.playing = false;
            s.duration
        };
        on_ready(duration);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        let s = self.state.lock().unwrap();
        s.ready && !s.disposed
    }

    fn unlock(&mut self) -> Result<(), EngineError> {
        let mut s = self.state.lock().unwrap();
        if s.gated {
            return Err(EngineError::Unavailable("waiting for a user gesture".into()));
        }
        s.unlocked = true;
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.state.lock().unwrap().unlocked
    }

    fn play(&mut self) {
        let mut s = self.state.lock().unwrap();
        if s.ready && s.unlocked && !s.disposed {
            s.playing = true;
        }
    }

    fn pause(&mut self) {
        self.state.lock().unwrap().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }

    fn duration(&self) -> Option<f64> {
        let s = self.state.lock().unwrap();
        s.ready.then_some(s.duration)
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn set_time(&mut self, seconds: f64) {
        let mut s = self.state.lock().unwrap();
        if s.disposed {
            return;
        }
        s.position = seconds.clamp(0.0, s.duration);
        s.seeks.push(seconds);
    }

    fn subscribe(&mut self, on_tick: TickHandler) -> SubscriptionId {
        let mut s = self.state.lock().unwrap();
        s.next_subscription += 1;
        s.subscribe_calls += 1;
        let id = SubscriptionId(s.next_subscription);
        s.handlers.push((id, on_tick));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.state
            .lock()
            .unwrap()
            .handlers
            .retain(|(sid, _)| *sid != id);
    }

    fn dispose(&mut self) {
        let mut s = self.state.lock().unwrap();
        s.disposed = true;
        s.playing = false;
        s.handlers.clear();
    }
}

/// Records when each click was sounded, on tokio's clock.
#[derive(Default)]
pub struct RecordingClicks {
    times: Mutex<Vec<tokio::time::Instant>>,
}

impl RecordingClicks {
    pub fn count(&self) -> usize {
        self.times.lock().unwrap().len()
    }

    /// Seconds between consecutive clicks.
    pub fn intervals(&self) -> Vec<f64> {
        let times = self.times.lock().unwrap();
        times
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs_f64())
            .collect()
    }
}

impl ClickOutput for RecordingClicks {
    fn sample_rate(&self) -> u32 {
        8_000
    }

    fn play(&self, _sound: Arc<ClickSound>) {
        self.times.lock().unwrap().push(tokio::time::Instant::now());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decorated {
    HoverEnter { region: RegionId, looping: bool },
    HoverLeave(RegionId),
    Highlight(RegionId, bool),
    Removed(RegionId),
}

#[derive(Clone, Default)]
pub struct RecordingDecoration {
    pub events: Arc<Mutex<Vec<Decorated>>>,
}

impl RecordingDecoration {
    pub fn take(&self) -> Vec<Decorated> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl RegionDecoration for RecordingDecoration {
    fn on_hover_enter(&mut self, region: &Region, looping: bool) {
        self.events.lock().unwrap().push(Decorated::HoverEnter {
            region: region.id,
            looping,
        });
    }

    fn on_hover_leave(&mut self, region: RegionId) {
        self.events.lock().unwrap().push(Decorated::HoverLeave(region));
    }

    fn on_highlight(&mut self, region: RegionId, active: bool) {
        self.events
            .lock()
            .unwrap()
            .push(Decorated::Highlight(region, active));
    }

    fn on_removed(&mut self, region: RegionId) {
        self.events.lock().unwrap().push(Decorated::Removed(region));
    }
}

pub struct Harness {
    pub controller: RegionController,
    pub engine: EngineProbe,
    pub clicks: Arc<RecordingClicks>,
    pub store: Option<Arc<MemoryRegionApi>>,
}

/// Controller over a mock engine with a track of `duration` seconds, opened
/// and settled. `store` enables persistence against an in-memory store.
pub async fn harness(duration: f64, store: Option<Arc<MemoryRegionApi>>) -> Harness {
    let (engine, probe) = mock_engine(duration);
    let clicks = Arc::new(RecordingClicks::default());
    let api = store.clone().map(|s| s as Arc<dyn RegionApi>);
    let mut controller = RegionController::new(
        Box::new(engine),
        clicks.clone(),
        api,
        &PracticeConfig::default(),
    );
    controller
        .open_track(TrackSource {
            source: "take-1.wav".into(),
            track_id: Some(TRACK.into()),
        })
        .unwrap();
    controller.settle().await;

    Harness {
        controller,
        engine: probe,
        clicks,
        store,
    }
}
