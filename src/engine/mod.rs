// src/engine/mod.rs

pub mod decode;
pub mod output;
pub mod player;

pub use player::PlaybackEngine;

use crate::error::EngineError;

/// Position callback, in seconds. Delivered at engine-defined intervals:
/// late, duplicated or skipped ticks are all possible.
pub type TickHandler = Box<dyn FnMut(f64) + Send>;

/// Fired once with the track duration when a load completes.
pub type ReadyHandler = Box<dyn FnOnce(f64) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Decode/playback capability the practice core drives.
///
/// Implementations must tolerate every call before `ready` (no-op or defer)
/// and after `dispose` (no-op). None of the calls may block.
pub trait AudioEngine {
    fn load(&mut self, source: &str, on_ready: ReadyHandler) -> Result<(), EngineError>;

    fn is_ready(&self) -> bool;

    /// Open the output. Platforms that gate audio until a user gesture
    /// answer `EngineError::Unavailable` until then.
    fn unlock(&mut self) -> Result<(), EngineError>;

    fn is_unlocked(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    fn duration(&self) -> Option<f64>;

    fn current_time(&self) -> f64;

    fn set_time(&mut self, seconds: f64);

    fn subscribe(&mut self, on_tick: TickHandler) -> SubscriptionId;

    fn unsubscribe(&mut self, id: SubscriptionId);

    /// Drop the loaded track, every subscription and the output.
    fn dispose(&mut self);
}
