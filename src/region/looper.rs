// src/region/looper.rs

use crate::engine::{AudioEngine, SubscriptionId};
use crate::event::{EventSender, PracticeEvent};
use crate::region::{Region, RegionId};

/// Identifies one loop pass from `start` to `stop`. Ticks carry it so a
/// late tick from a cancelled subscription can be recognised and dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopToken(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Looping(RegionId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickAction {
    /// Not ours (previous loop, or no loop running).
    Stale,
    Within,
    /// Position reached the region end; engine was sent back to the start.
    Seeked,
    /// The region vanished under the loop; the loop was stopped.
    Stopped,
}

/// Keeps playback inside one region by seeking back at its end.
///
/// Only one loop exists: starting a new one always stops the old one inside
/// the same call, so there is never a moment with two subscriptions.
pub struct LoopSupervisor {
    state: LoopState,
    token: Option<LoopToken>,
    subscription: Option<SubscriptionId>,
    next_token: u64,
    events: EventSender,
}

impl LoopSupervisor {
    pub fn new(events: EventSender) -> Self {
        Self {
            state: LoopState::Idle,
            token: None,
            subscription: None,
            next_token: 0,
            events,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn active_region(&self) -> Option<RegionId> {
        match self.state {
            LoopState::Looping(id) => Some(id),
            LoopState::Idle => None,
        }
    }

    pub fn is_looping(&self, id: RegionId) -> bool {
        self.state == LoopState::Looping(id)
    }

    /// Returns the region that was looping before, if it was a different one.
    pub fn start(&mut self, region: &Region, engine: &mut dyn AudioEngine) -> Option<RegionId> {
        let previous = self.release(engine);

        engine.set_time(region.start);
        if !engine.is_playing() {
            engine.play();
        }

        self.next_token += 1;
        let token = LoopToken(self.next_token);
        let events = self.events.clone();
        let subscription = engine.subscribe(Box::new(move |position| {
            let _ = events.send(PracticeEvent::Tick { token, position });
        }));

        self.token = Some(token);
        self.subscription = Some(subscription);
        self.state = LoopState::Looping(region.id);
        log::debug!("loop {} on [{:.3}, {:.3})", region.id, region.start, region.end);

        previous.filter(|id| *id != region.id)
    }

    /// Unsubscribe and go idle. Returns the region that was looping.
    pub fn stop(&mut self, engine: &mut dyn AudioEngine) -> Option<RegionId> {
        let previous = self.release(engine);
        if let Some(id) = previous {
            log::debug!("loop {id} stopped");
        }
        previous
    }

    /// `bounds` is the looping region's current `(start, end)`, or `None`
    /// when it no longer exists.
    pub fn on_tick(
        &mut self,
        token: LoopToken,
        position: f64,
        bounds: Option<(f64, f64)>,
        engine: &mut dyn AudioEngine,
    ) -> TickAction {
        if self.token != Some(token) {
            return TickAction::Stale;
        }
        let Some((start, end)) = bounds else {
            self.stop(engine);
            return TickAction::Stopped;
        };
        if position < end {
            return TickAction::Within;
        }
        // A late or duplicated tick can report an end position after the
        // seek already happened; the engine's own clock settles it.
        let now = engine.current_time();
        if now >= start && now < end {
            return TickAction::Within;
        }
        engine.set_time(start);
        TickAction::Seeked
    }

    fn release(&mut self, engine: &mut dyn AudioEngine) -> Option<RegionId> {
        if let Some(subscription) = self.subscription.take() {
            engine.unsubscribe(subscription);
        }
        self.token = None;
        let previous = self.active_region();
        self.state = LoopState::Idle;
        previous
    }
}
