// src/event.rs

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::region::looper::LoopToken;
use crate::store::{RegionRecord, SyncOutcome};

/// Everything that comes back asynchronously lands here and is handled on
/// the controller's thread, in arrival order.
#[derive(Debug)]
pub enum PracticeEvent {
    /// The engine finished loading the track of `generation`.
    Ready { generation: u64, duration: f64 },

    /// A playback position from the tick subscription owned by `token`.
    Tick { token: LoopToken, position: f64 },

    /// Stored regions for the track of `generation`.
    RegionsLoaded {
        generation: u64,
        result: Result<Vec<RegionRecord>, String>,
    },

    /// A store operation resolved.
    Synced(SyncOutcome),
}

pub type EventSender = UnboundedSender<PracticeEvent>;
pub type EventReceiver = UnboundedReceiver<PracticeEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    unbounded_channel()
}
