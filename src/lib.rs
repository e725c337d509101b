// src/lib.rs

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod input;
pub mod metronome;
pub mod region;
pub mod store;

pub use config::PracticeConfig;
pub use engine::{AudioEngine, PlaybackEngine};
pub use error::{PracticeError, PracticeResult};
pub use input::InputDispatcher;
pub use metronome::MetronomeClock;
pub use region::controller::TrackSource;
pub use region::{LoopState, Region, RegionController, RegionId};
