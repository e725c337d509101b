// src/region/controller.rs

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::config::PracticeConfig;
use crate::engine::AudioEngine;
use crate::error::{EngineError, PracticeError, PracticeResult, ValidationError};
use crate::event::{self, EventReceiver, EventSender, PracticeEvent};
use crate::metronome::{Bpm, ClickOutput, MetronomeClock};
use crate::region::decoration::{NoDecoration, RegionDecoration};
use crate::region::looper::{LoopState, LoopSupervisor, LoopToken, TickAction};
use crate::region::{
    PersistenceState, Region, RegionId, default_window, normalize_label, validate_bounds,
};
use crate::store::{NewRegion, RegionApi, RegionPatch, RegionRecord, RegionSync, SyncEffect, SyncKind};

/// What the host hands over when a track is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSource {
    /// Whatever the engine understands (a path for the cpal engine).
    pub source: String,
    /// Scope for stored regions. `None` keeps this track local-only.
    pub track_id: Option<String>,
}

/// Transport requests waiting for the engine to load or unlock.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Deferred {
    Play,
    Pause,
    TogglePlay,
    Loop(RegionId),
}

/// The practice session: regions, selection, loop and metronome for one track.
///
/// Everything is owned here and mutated on the caller's thread. Engine ticks,
/// readiness and store completions come back through one channel and are
/// applied by [`pump`](Self::pump) / [`step`](Self::step).
pub struct RegionController {
    engine: Box<dyn AudioEngine>,
    sync: RegionSync,
    looper: LoopSupervisor,
    metronome: MetronomeClock,
    decoration: Box<dyn RegionDecoration>,

    events_tx: EventSender,
    events: EventReceiver,

    regions: BTreeMap<RegionId, Region>,
    selected: Option<RegionId>,
    highlighted: HashSet<RegionId>,
    playhead_region: Option<RegionId>,
    next_id: u64,

    generation: u64,
    track: Option<TrackSource>,
    duration: Option<f64>,
    awaiting_ready: bool,
    awaiting_regions: bool,
    deferred: VecDeque<Deferred>,

    status: Option<String>,
    half_width: f64,
    default_label: String,
    disposed: bool,
}

impl RegionController {
    pub fn new(
        engine: Box<dyn AudioEngine>,
        clicks: Arc<dyn ClickOutput>,
        api: Option<Arc<dyn RegionApi>>,
        config: &PracticeConfig,
    ) -> Self {
        let (events_tx, events) = event::channel();
        Self {
            engine,
            sync: RegionSync::new(api, events_tx.clone()),
            looper: LoopSupervisor::new(events_tx.clone()),
            metronome: MetronomeClock::new(Bpm::new(config.default_bpm as i64), clicks),
            decoration: Box::new(NoDecoration),
            events_tx,
            events,
            regions: BTreeMap::new(),
            selected: None,
            highlighted: HashSet::new(),
            playhead_region: None,
            next_id: 0,
            generation: 0,
            track: None,
            duration: None,
            awaiting_ready: false,
            awaiting_regions: false,
            deferred: VecDeque::new(),
            status: None,
            half_width: config.region_half_width_secs,
            default_label: normalize_label(&config.default_label),
            disposed: false,
        }
    }

    pub fn with_decoration(mut self, decoration: Box<dyn RegionDecoration>) -> Self {
        self.decoration = decoration;
        self
    }

    // ---------------------------------------------------------------------
    // Track lifecycle
    // ---------------------------------------------------------------------

    /// Switch to a new track. Everything tied to the previous one (loop
    /// subscription, regions, queued transport, store completions) is dropped.
    pub fn open_track(&mut self, track: TrackSource) -> PracticeResult<()> {
        if self.disposed {
            return Err(PracticeError::EngineUnavailable("session was disposed".into()));
        }
        self.teardown_track();
        self.generation += 1;
        self.sync.begin_track(track.track_id.clone(), self.generation);

        let generation = self.generation;
        let events = self.events_tx.clone();
        self.awaiting_ready = true;
        self.track = Some(track.clone());

        let loaded = self.engine.load(
            &track.source,
            Box::new(move |duration| {
                let _ = events.send(PracticeEvent::Ready {
                    generation,
                    duration,
                });
            }),
        );
        if let Err(e) = loaded {
            self.awaiting_ready = false;
            self.set_status(format!("Couldn't open track: {e}"));
            return Err(e.into());
        }
        log::info!("opening {} (generation {generation})", track.source);
        Ok(())
    }

    /// Host teardown: unsubscribes every tick handler, cancels the metronome
    /// and releases the engine. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.teardown_track();
        self.metronome.stop();
        self.engine.dispose();
        // Anything still in flight belongs to nothing now.
        self.generation += 1;
        self.sync.begin_track(None, self.generation);
        self.track = None;
        self.disposed = true;
        log::info!("practice session disposed");
    }

    fn teardown_track(&mut self) {
        self.looper.stop(self.engine.as_mut());
        self.engine.pause();
        let ids: Vec<RegionId> = self.regions.keys().copied().collect();
        for id in ids {
            self.decoration.on_removed(id);
        }
        self.regions.clear();
        self.selected = None;
        self.highlighted.clear();
        self.playhead_region = None;
        self.deferred.clear();
        self.duration = None;
        self.awaiting_ready = false;
        self.awaiting_regions = false;
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Apply every event already queued. Never blocks.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for one event and apply it.
    pub async fn step(&mut self) {
        if let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }
    }

    /// Run until the track is loaded and no store call is outstanding.
    pub async fn settle(&mut self) {
        self.pump();
        while self.awaiting_ready || self.awaiting_regions || self.sync.in_flight() > 0 {
            self.step().await;
        }
    }

    pub fn handle_event(&mut self, event: PracticeEvent) {
        match event {
            PracticeEvent::Ready {
                generation,
                duration,
            } => self.on_ready(generation, duration),
            PracticeEvent::Tick { token, position } => self.on_tick(token, position),
            PracticeEvent::RegionsLoaded { generation, result } => {
                self.on_regions_loaded(generation, result)
            }
            PracticeEvent::Synced(outcome) => {
                for effect in self.sync.complete(outcome) {
                    self.apply_sync_effect(effect);
                }
            }
        }
    }

    fn on_ready(&mut self, generation: u64, duration: f64) {
        if generation != self.generation || self.disposed {
            return;
        }
        self.awaiting_ready = false;
        if !(duration.is_finite() && duration > 0.0) {
            self.set_status("Track has no playable audio".to_string());
            return;
        }
        self.duration = Some(duration);
        log::info!("track ready: {duration:.2}s");

        self.awaiting_regions = self.sync.load();
        self.flush_deferred();
    }

    fn on_tick(&mut self, token: LoopToken, position: f64) {
        let bounds = self
            .looper
            .active_region()
            .and_then(|id| self.regions.get(&id))
            .map(|r| (r.start, r.end));

        match self
            .looper
            .on_tick(token, position, bounds, self.engine.as_mut())
        {
            TickAction::Stale => {}
            TickAction::Within => self.update_playhead(position),
            TickAction::Seeked => {
                let now = self.engine.current_time();
                self.update_playhead(now);
            }
            TickAction::Stopped => {
                self.update_playhead(position);
                self.refresh_highlight();
            }
        }
    }

    fn on_regions_loaded(&mut self, generation: u64, result: Result<Vec<RegionRecord>, String>) {
        if generation != self.generation {
            return;
        }
        self.awaiting_regions = false;
        let mut rows = match result {
            Ok(rows) => rows,
            Err(message) => {
                log::warn!("loading regions failed: {message}");
                self.set_status(format!("Couldn't load saved regions: {message}"));
                return;
            }
        };
        let Some(duration) = self.duration else { return };

        rows.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
        let mut restored_loop = None;
        for row in rows {
            // Created here while the list was in flight.
            if self.sync.region_for(&row.id).is_some() {
                continue;
            }
            let start = row.start_sec.max(0.0);
            let end = row.end_sec.min(duration);
            if validate_bounds(start, end, duration).is_err() {
                log::warn!(
                    "skipping stored region {} [{}, {}) outside the {duration:.2}s track",
                    row.id,
                    row.start_sec,
                    row.end_sec
                );
                continue;
            }

            let id = self.allocate_id();
            let label = self.label_or_default(row.label.as_deref().unwrap_or_default());
            let mut region = Region::new(id, label, start, end);
            region.server_id = Some(row.id.clone());
            region.persistence = PersistenceState::Synced;
            self.sync.bind(id, row.id);
            self.regions.insert(id, region);

            if row.looped && restored_loop.is_none() {
                restored_loop = Some(id);
            }
        }

        // The loop binding picks this up again; playback is not auto-started.
        if let Some(id) = restored_loop {
            if self.selected.is_none() {
                self.select(Some(id));
            }
        }
        log::info!("{} stored regions loaded", self.regions.len());
    }

    fn apply_sync_effect(&mut self, effect: SyncEffect) {
        match effect {
            SyncEffect::Bound { region, server_id } => {
                // The list may already have delivered this row as a region
                // of its own; the one created here wins.
                let loaded = self
                    .regions
                    .values()
                    .find(|r| r.id != region && r.server_id.as_deref() == Some(server_id.as_str()))
                    .map(|r| r.id);
                if let Some(loaded) = loaded {
                    self.remove_local(loaded);
                    self.sync.forget(loaded);
                }
                if let Some(r) = self.regions.get_mut(&region) {
                    r.server_id = Some(server_id);
                    r.persistence = PersistenceState::Synced;
                }
            }
            SyncEffect::CreateFailed { region, message } => {
                if let Some(r) = self.regions.get_mut(&region) {
                    r.persistence = PersistenceState::LocalOnly;
                }
                self.set_status(format!("Couldn't save region (kept for this session): {message}"));
            }
            SyncEffect::Failed {
                region,
                kind,
                message,
            } => {
                let what = match kind {
                    SyncKind::Create => "save",
                    SyncKind::Update => "update",
                    SyncKind::Delete => "delete",
                };
                log::debug!("{what} failed for {region}");
                self.set_status(format!("Couldn't {what} region: {message}"));
            }
            SyncEffect::Deleted { region } => {
                log::debug!("{region} deleted from the store");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Region commands
    // ---------------------------------------------------------------------

    /// New region around `anchor`, selected and shown at once. The store
    /// create runs in the background.
    pub fn create_region(&mut self, anchor: f64) -> PracticeResult<RegionId> {
        let duration = self.duration.ok_or(ValidationError::NoTrack)?;
        let (start, end) = default_window(anchor, self.half_width, duration)?;

        let id = self.allocate_id();
        let mut region = Region::new(id, self.default_label.clone(), start, end);
        let queued = self.sync.enqueue_create(
            id,
            NewRegion {
                label: region.label.clone(),
                start_sec: start,
                end_sec: end,
                looped: false,
            },
        );
        if queued {
            region.persistence = PersistenceState::Syncing;
        }
        self.regions.insert(id, region);
        self.select(Some(id));
        log::debug!("created {id} [{start:.2}, {end:.2})");
        Ok(id)
    }

    pub fn create_region_at_playhead(&mut self) -> PracticeResult<RegionId> {
        let anchor = self.engine.current_time();
        self.create_region(anchor)
    }

    /// Unchanged labels are not sent again.
    pub fn rename_region(&mut self, id: RegionId, text: &str) -> PracticeResult<()> {
        let label = self.label_or_default(text);
        let region = self
            .regions
            .get_mut(&id)
            .ok_or(ValidationError::UnknownRegion(id))?;
        if region.label == label {
            return Ok(());
        }
        region.label = label.clone();
        self.sync.enqueue_update(id, RegionPatch::label(label));
        Ok(())
    }

    /// Apply a finished drag or resize. Hosts call this once per gesture,
    /// not per intermediate frame.
    pub fn resize_region(&mut self, id: RegionId, start: f64, end: f64) -> PracticeResult<()> {
        let duration = self.duration.ok_or(ValidationError::NoTrack)?;
        let region = self
            .regions
            .get_mut(&id)
            .ok_or(ValidationError::UnknownRegion(id))?;
        validate_bounds(start, end, duration)?;
        if region.start == start && region.end == end {
            return Ok(());
        }
        region.start = start;
        region.end = end;
        self.sync.enqueue_update(id, RegionPatch::bounds(start, end));
        Ok(())
    }

    /// Stops the loop first when `id` is looping, then removes the region
    /// locally and queues the store delete behind any unresolved create.
    pub fn delete_region(&mut self, id: RegionId) -> PracticeResult<()> {
        if !self.remove_local(id) {
            return Err(ValidationError::UnknownRegion(id).into());
        }
        self.sync.enqueue_delete(id);
        log::debug!("deleted {id}");
        Ok(())
    }

    pub fn delete_selected(&mut self) -> PracticeResult<()> {
        let id = self.selected.ok_or(ValidationError::NoSelection)?;
        self.delete_region(id)
    }

    /// Removes every region the same way `delete_region` does.
    pub fn clear_regions(&mut self) {
        self.looper.stop(self.engine.as_mut());
        self.selected = None;
        let ids: Vec<RegionId> = self.regions.keys().copied().collect();
        for id in ids {
            if self.remove_local(id) {
                self.sync.enqueue_delete(id);
            }
        }
        log::debug!("cleared all regions");
    }

    /// Drop a region locally, stopping its loop first. False if unknown.
    fn remove_local(&mut self, id: RegionId) -> bool {
        if !self.regions.contains_key(&id) {
            return false;
        }
        if self.looper.is_looping(id) {
            self.looper.stop(self.engine.as_mut());
        }
        // Deferred loop requests for it would start a loop on nothing.
        self.deferred.retain(|op| *op != Deferred::Loop(id));

        self.regions.remove(&id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        if self.playhead_region == Some(id) {
            self.playhead_region = None;
        }
        self.highlighted.remove(&id);
        self.decoration.on_removed(id);
        self.refresh_highlight();
        true
    }

    pub fn set_selected(&mut self, id: Option<RegionId>) -> PracticeResult<()> {
        if let Some(id) = id {
            if !self.regions.contains_key(&id) {
                return Err(ValidationError::UnknownRegion(id).into());
            }
        }
        self.select(id);
        Ok(())
    }

    /// Cycles through regions in timeline order, wrapping at either end.
    pub fn select_next(&mut self) -> Option<RegionId> {
        self.select_step(true)
    }

    pub fn select_previous(&mut self) -> Option<RegionId> {
        self.select_step(false)
    }

    fn select_step(&mut self, forward: bool) -> Option<RegionId> {
        let order: Vec<RegionId> = self.regions().iter().map(|r| r.id).collect();
        if order.is_empty() {
            return None;
        }
        let current = self
            .selected
            .and_then(|id| order.iter().position(|o| *o == id));
        let next = match (current, forward) {
            (None, true) => 0,
            (None, false) => order.len() - 1,
            (Some(i), true) => (i + 1) % order.len(),
            (Some(i), false) => (i + order.len() - 1) % order.len(),
        };
        self.select(Some(order[next]));
        self.selected
    }

    fn select(&mut self, id: Option<RegionId>) {
        self.selected = id;
        for region in self.regions.values_mut() {
            region.selected = Some(region.id) == id;
        }
        self.refresh_highlight();
    }

    // ---------------------------------------------------------------------
    // Loop
    // ---------------------------------------------------------------------

    pub fn toggle_loop(&mut self, id: RegionId) -> PracticeResult<()> {
        if self.deferred.contains(&Deferred::Loop(id)) {
            // Still waiting on unlock: toggling off withdraws the request.
            self.deferred.retain(|op| *op != Deferred::Loop(id));
            return Ok(());
        }
        if self.looper.is_looping(id) {
            self.stop_loop();
            Ok(())
        } else {
            self.start_loop(id)
        }
    }

    pub fn toggle_loop_selected(&mut self) -> PracticeResult<()> {
        let id = self.selected.ok_or(ValidationError::NoSelection)?;
        self.toggle_loop(id)
    }

    /// Replaces any running loop in one transition.
    pub fn start_loop(&mut self, id: RegionId) -> PracticeResult<()> {
        if !self.regions.contains_key(&id) {
            return Err(ValidationError::UnknownRegion(id).into());
        }
        if !self.transport_open() {
            // Only the latest loop request survives until unlock.
            self.deferred.retain(|op| !matches!(op, Deferred::Loop(_)));
            self.defer(Deferred::Loop(id));
            return Ok(());
        }
        self.begin_loop(id);
        Ok(())
    }

    fn begin_loop(&mut self, id: RegionId) {
        let Some(region) = self.regions.get(&id) else { return };
        let previous = self.looper.start(region, self.engine.as_mut());
        if let Some(previous) = previous {
            self.sync.enqueue_update(previous, RegionPatch::looped(false));
        }
        self.sync.enqueue_update(id, RegionPatch::looped(true));
        self.update_playhead(self.engine.current_time());
        self.refresh_highlight();
    }

    /// Playback keeps running; only the seek-back stops.
    pub fn stop_loop(&mut self) {
        self.deferred.retain(|op| !matches!(op, Deferred::Loop(_)));
        if let Some(id) = self.looper.stop(self.engine.as_mut()) {
            self.sync.enqueue_update(id, RegionPatch::looped(false));
            self.refresh_highlight();
        }
    }

    // ---------------------------------------------------------------------
    // Transport
    // ---------------------------------------------------------------------

    /// Try to open audio output; call on the first user gesture. Transport
    /// requests queued while output was gated run once it opens.
    pub fn unlock(&mut self) -> PracticeResult<()> {
        if self.disposed {
            return Ok(());
        }
        if !self.engine.is_unlocked() {
            self.engine.unlock()?;
            log::info!("audio output unlocked");
        }
        self.flush_deferred();
        Ok(())
    }

    pub fn play(&mut self) {
        self.run_or_defer(Deferred::Play);
    }

    pub fn pause(&mut self) {
        self.run_or_defer(Deferred::Pause);
    }

    pub fn toggle_play(&mut self) {
        self.run_or_defer(Deferred::TogglePlay);
    }

    /// Clamped onto the track.
    pub fn seek(&mut self, seconds: f64) -> PracticeResult<f64> {
        let duration = self.duration.ok_or(ValidationError::NoTrack)?;
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, duration)
        } else {
            0.0
        };
        self.engine.set_time(target);
        self.update_playhead(target);
        Ok(target)
    }

    pub fn seek_by(&mut self, delta: f64) -> PracticeResult<f64> {
        let now = self.engine.current_time();
        self.seek(now + delta)
    }

    fn run_or_defer(&mut self, op: Deferred) {
        if op == Deferred::Pause && !self.engine.is_playing() {
            // Nothing to pause; also drop a queued start.
            self.deferred
                .retain(|o| !matches!(o, Deferred::Play | Deferred::TogglePlay));
            return;
        }
        if self.transport_open() {
            self.run(op);
        } else {
            self.defer(op);
        }
    }

    fn run(&mut self, op: Deferred) {
        match op {
            Deferred::Play => self.engine.play(),
            Deferred::Pause => self.engine.pause(),
            Deferred::TogglePlay => {
                if self.engine.is_playing() {
                    self.engine.pause();
                } else {
                    self.engine.play();
                }
            }
            Deferred::Loop(id) => self.begin_loop(id),
        }
    }

    fn defer(&mut self, op: Deferred) {
        if self.disposed {
            return;
        }
        log::debug!("deferring {op:?} until audio is ready");
        self.deferred.push_back(op);
    }

    /// Loaded and unlocked. Attempts the unlock as a side effect, since
    /// every transport command is itself a user gesture.
    fn transport_open(&mut self) -> bool {
        if self.disposed || !self.engine.is_ready() {
            return false;
        }
        if self.engine.is_unlocked() {
            return true;
        }
        match self.engine.unlock() {
            Ok(()) => true,
            Err(EngineError::Unavailable(reason)) => {
                self.set_status(format!("Audio is locked until you interact: {reason}"));
                false
            }
            Err(e) => {
                self.set_status(format!("Audio output failed: {e}"));
                false
            }
        }
    }

    fn flush_deferred(&mut self) {
        if self.deferred.is_empty() || !self.transport_open() {
            return;
        }
        while let Some(op) = self.deferred.pop_front() {
            self.run(op);
        }
    }

    // ---------------------------------------------------------------------
    // Metronome
    // ---------------------------------------------------------------------

    pub fn toggle_metronome(&mut self) -> PracticeResult<bool> {
        let running = self.metronome.toggle()?;
        Ok(running)
    }

    pub fn set_bpm(&mut self, bpm: i64) -> Bpm {
        self.metronome.set_bpm(bpm)
    }

    pub fn adjust_bpm(&mut self, delta: i64) -> Bpm {
        self.metronome.adjust_bpm(delta)
    }

    pub fn bpm(&self) -> Bpm {
        self.metronome.bpm()
    }

    pub fn metronome_running(&self) -> bool {
        self.metronome.is_running()
    }

    // ---------------------------------------------------------------------
    // Decoration
    // ---------------------------------------------------------------------

    pub fn hover_enter(&mut self, id: RegionId) {
        if let Some(region) = self.regions.get(&id) {
            let looping = self.looper.is_looping(id);
            self.decoration.on_hover_enter(region, looping);
        }
    }

    pub fn hover_leave(&mut self, id: RegionId) {
        self.decoration.on_hover_leave(id);
    }

    /// Active = selected or looping. Only changes reach the decoration.
    fn refresh_highlight(&mut self) {
        let mut active: HashSet<RegionId> = HashSet::new();
        active.extend(self.selected);
        active.extend(self.looper.active_region());
        active.retain(|id| self.regions.contains_key(id));

        for id in self.highlighted.difference(&active) {
            self.decoration.on_highlight(*id, false);
        }
        for id in active.difference(&self.highlighted) {
            self.decoration.on_highlight(*id, true);
        }
        self.highlighted = active;
    }

    fn update_playhead(&mut self, position: f64) {
        self.playhead_region = self
            .regions()
            .into_iter()
            .find(|r| r.contains(position))
            .map(|r| r.id);
    }

    // ---------------------------------------------------------------------
    // Getters
    // ---------------------------------------------------------------------

    /// Timeline order.
    pub fn regions(&self) -> Vec<&Region> {
        let mut list: Vec<&Region> = self.regions.values().collect();
        list.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.id.cmp(&b.id)));
        list
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn selected(&self) -> Option<RegionId> {
        self.selected
    }

    pub fn loop_state(&self) -> LoopState {
        self.looper.state()
    }

    pub fn is_highlighted(&self, id: RegionId) -> bool {
        self.highlighted.contains(&id)
    }

    /// First region (timeline order) under the playhead as of the last tick.
    pub fn playhead_region(&self) -> Option<RegionId> {
        self.playhead_region
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn track(&self) -> Option<&TrackSource> {
        self.track.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.duration.is_some()
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    pub fn is_unlocked(&self) -> bool {
        self.engine.is_unlocked()
    }

    /// Transport requests waiting on load or unlock.
    pub fn pending_transport(&self) -> usize {
        self.deferred.len()
    }

    /// Store calls outstanding (regions with queued or in-flight work).
    pub fn pending_sync(&self) -> usize {
        self.sync.in_flight()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn take_status(&mut self) -> Option<String> {
        self.status.take()
    }

    pub fn report(&mut self, err: &PracticeError) {
        self.set_status(err.to_string());
    }

    fn set_status(&mut self, message: String) {
        log::info!("{message}");
        self.status = Some(message);
    }

    fn label_or_default(&self, text: &str) -> String {
        if text.trim().is_empty() {
            self.default_label.clone()
        } else {
            normalize_label(text)
        }
    }

    fn allocate_id(&mut self) -> RegionId {
        self.next_id += 1;
        RegionId(self.next_id)
    }
}

impl Drop for RegionController {
    fn drop(&mut self) {
        self.dispose();
    }
}
