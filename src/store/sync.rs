// src/store/sync.rs

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::event::{EventSender, PracticeEvent};
use crate::region::RegionId;
use crate::store::{NewRegion, RegionApi, RegionPatch};

/// One queued store call for a single region.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOp {
    Create(NewRegion),
    Update(RegionPatch),
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    Create,
    Update,
    Delete,
}

/// Completion of one dispatched call. `Create` carries the new server id.
#[derive(Debug)]
pub struct SyncOutcome {
    pub generation: u64,
    pub region: RegionId,
    pub kind: SyncKind,
    pub result: Result<Option<String>, String>,
}

/// What the controller has to reflect after a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    Bound { region: RegionId, server_id: String },
    CreateFailed { region: RegionId, message: String },
    Failed { region: RegionId, kind: SyncKind, message: String },
    Deleted { region: RegionId },
}

/// Calls for one region. The queue keeps the track it was opened under, so
/// work queued before a track switch still reaches the right rows.
struct OpQueue {
    track_id: String,
    generation: u64,
    in_flight: Option<SyncKind>,
    creating: bool,
    pending: VecDeque<SyncOp>,
}

impl OpQueue {
    fn new(track_id: String, generation: u64) -> Self {
        Self {
            track_id,
            generation,
            in_flight: None,
            creating: false,
            pending: VecDeque::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }
}

/// Bridges local regions to the remote store.
///
/// Owns the `local id -> server id` map and a single-in-flight queue per
/// region: for any one region a create resolves before any update or delete
/// for it is sent, and responses can never be applied out of order.
pub struct RegionSync {
    api: Option<Arc<dyn RegionApi>>,
    track_id: Option<String>,
    generation: u64,
    server_ids: HashMap<RegionId, String>,
    queues: HashMap<RegionId, OpQueue>,
    events: EventSender,
}

impl RegionSync {
    pub fn new(api: Option<Arc<dyn RegionApi>>, events: EventSender) -> Self {
        Self {
            api,
            track_id: None,
            generation: 0,
            server_ids: HashMap::new(),
            queues: HashMap::new(),
            events,
        }
    }

    /// Persistence needs both a store and a track to scope rows to.
    pub fn is_enabled(&self) -> bool {
        self.api.is_some() && self.track_id.is_some()
    }

    /// Switch tracks. Calls already queued for the previous track keep
    /// draining against the store in order; only their effects on the
    /// controller are dropped, since those regions no longer exist locally.
    pub fn begin_track(&mut self, track_id: Option<String>, generation: u64) {
        self.track_id = track_id;
        self.generation = generation;
        self.queues.retain(|_, q| !q.is_idle());
        let queues = &self.queues;
        self.server_ids.retain(|region, _| queues.contains_key(region));
    }

    /// Fetch stored rows; the answer arrives as `RegionsLoaded`.
    pub fn load(&self) -> bool {
        let (Some(api), Some(track_id)) = (self.api.clone(), self.track_id.clone()) else {
            return false;
        };
        let generation = self.generation;
        let events = self.events.clone();
        let task = async move {
            let result = api.list(&track_id).await.map_err(|e| e.to_string());
            let _ = events.send(PracticeEvent::RegionsLoaded { generation, result });
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => {
                let _ = self.events.send(PracticeEvent::RegionsLoaded {
                    generation,
                    result: Err("no async runtime for region store".into()),
                });
            }
        }
        true
    }

    /// Record the server id of a row loaded from the store.
    pub fn bind(&mut self, region: RegionId, server_id: String) {
        self.server_ids.insert(region, server_id);
    }

    pub fn server_id(&self, region: RegionId) -> Option<&str> {
        self.server_ids.get(&region).map(String::as_str)
    }

    /// Local region bound to a server row, if any.
    pub fn region_for(&self, server_id: &str) -> Option<RegionId> {
        self.server_ids
            .iter()
            .find(|(_, id)| id.as_str() == server_id)
            .map(|(region, _)| *region)
    }

    /// Drop a binding without touching the store.
    pub fn forget(&mut self, region: RegionId) {
        self.server_ids.remove(&region);
        self.queues.remove(&region);
    }

    /// Regions with a call in flight or queued.
    pub fn in_flight(&self) -> usize {
        self.queues.values().filter(|q| !q.is_idle()).count()
    }

    pub fn is_busy(&self, region: RegionId) -> bool {
        self.queues.get(&region).is_some_and(|q| !q.is_idle())
    }

    /// True while a create for `region` has not resolved yet.
    pub fn is_creating(&self, region: RegionId) -> bool {
        self.queues.get(&region).is_some_and(|q| q.creating)
    }

    pub fn enqueue_create(&mut self, region: RegionId, new_region: NewRegion) -> bool {
        if !self.is_enabled() || self.server_ids.contains_key(&region) {
            return false;
        }
        let Some(queue) = self.queue(region) else { return false };
        queue.creating = true;
        queue.pending.push_back(SyncOp::Create(new_region));
        self.pump(region);
        true
    }

    /// Queued behind an unresolved create, or sent straight away for a bound
    /// row. Regions the store never accepted are not tracked.
    pub fn enqueue_update(&mut self, region: RegionId, patch: RegionPatch) -> bool {
        if !self.is_enabled() || patch.is_empty() || !self.is_tracked(region) {
            return false;
        }
        let Some(queue) = self.queue(region) else { return false };
        if queue.pending.iter().any(|op| matches!(op, SyncOp::Delete)) {
            return false;
        }
        match queue.pending.back_mut() {
            Some(SyncOp::Update(queued)) => queued.merge(patch),
            _ => queue.pending.push_back(SyncOp::Update(patch)),
        }
        self.pump(region);
        true
    }

    pub fn enqueue_delete(&mut self, region: RegionId) -> bool {
        if !self.is_enabled() || !self.is_tracked(region) {
            return false;
        }
        let Some(queue) = self.queue(region) else { return false };
        // The row is going away; queued edits to it are moot.
        queue.pending.retain(|op| matches!(op, SyncOp::Create(_)));
        queue.pending.push_back(SyncOp::Delete);
        self.pump(region);
        true
    }

    /// Apply a completion and send the next queued call for that region.
    /// Completions from a previous track still advance their queue but
    /// produce no effects.
    pub fn complete(&mut self, outcome: SyncOutcome) -> Vec<SyncEffect> {
        let region = outcome.region;
        let Some(queue) = self.queues.get_mut(&region) else {
            return Vec::new();
        };
        if queue.generation != outcome.generation || queue.in_flight != Some(outcome.kind) {
            return Vec::new();
        }
        queue.in_flight = None;
        if outcome.kind == SyncKind::Create {
            queue.creating = false;
        }

        let mut effects = Vec::new();

        match (outcome.kind, outcome.result) {
            (SyncKind::Create, Ok(Some(server_id))) => {
                self.server_ids.insert(region, server_id.clone());
                effects.push(SyncEffect::Bound { region, server_id });
            }
            (SyncKind::Create, Ok(None)) => {
                effects.push(SyncEffect::CreateFailed {
                    region,
                    message: "store returned no id".into(),
                });
            }
            (SyncKind::Create, Err(message)) => {
                log::warn!("create for {region} failed: {message}");
                effects.push(SyncEffect::CreateFailed { region, message });
            }
            (SyncKind::Delete, Ok(_)) => {
                self.server_ids.remove(&region);
                effects.push(SyncEffect::Deleted { region });
            }
            (kind, Err(message)) => {
                log::warn!("{kind:?} for {region} failed: {message}");
                effects.push(SyncEffect::Failed {
                    region,
                    kind,
                    message,
                });
            }
            (SyncKind::Update, Ok(_)) => {}
        }

        self.pump(region);
        if outcome.generation != self.generation {
            log::debug!(
                "{:?} for {region} finished after its track was closed",
                outcome.kind
            );
            return Vec::new();
        }
        effects
    }

    fn queue(&mut self, region: RegionId) -> Option<&mut OpQueue> {
        let track_id = self.track_id.clone()?;
        let generation = self.generation;
        Some(
            self.queues
                .entry(region)
                .or_insert_with(|| OpQueue::new(track_id, generation)),
        )
    }

    fn is_tracked(&self, region: RegionId) -> bool {
        self.server_ids.contains_key(&region) || self.is_creating(region)
    }

    /// Send the next queued call if nothing is in flight for `region`.
    fn pump(&mut self, region: RegionId) {
        let Some(api) = self.api.clone() else { return };

        loop {
            let Some(queue) = self.queues.get_mut(&region) else { return };
            if queue.in_flight.is_some() {
                return;
            }
            let track_id = queue.track_id.clone();
            let generation = queue.generation;
            let Some(op) = queue.pending.pop_front() else {
                self.queues.remove(&region);
                if generation != self.generation {
                    self.server_ids.remove(&region);
                }
                return;
            };

            let server_id = self.server_ids.get(&region).cloned();
            let call = match (op, server_id) {
                (SyncOp::Create(new_region), _) => Call::Create(new_region),
                (SyncOp::Update(patch), Some(id)) => Call::Update(id, patch),
                (SyncOp::Delete, Some(id)) => Call::Delete(id),
                (op, None) => {
                    // The create never produced a row: nothing to edit remotely.
                    log::debug!("skipping {op:?} for unsaved region {region}");
                    continue;
                }
            };

            let kind = call.kind();
            if let Some(queue) = self.queues.get_mut(&region) {
                queue.in_flight = Some(kind);
            }
            self.dispatch(api, track_id, generation, region, call);
            return;
        }
    }

    fn dispatch(
        &self,
        api: Arc<dyn RegionApi>,
        track_id: String,
        generation: u64,
        region: RegionId,
        call: Call,
    ) {
        let kind = call.kind();
        let events = self.events.clone();

        let task = async move {
            let result = match call {
                Call::Create(new_region) => api
                    .create(&track_id, &new_region)
                    .await
                    .map(Some)
                    .map_err(|e| e.to_string()),
                Call::Update(id, patch) => api
                    .update(&id, &patch)
                    .await
                    .map(|_| None)
                    .map_err(|e| e.to_string()),
                Call::Delete(id) => api.delete(&id).await.map(|_| None).map_err(|e| e.to_string()),
            };
            let _ = events.send(PracticeEvent::Synced(SyncOutcome {
                generation,
                region,
                kind,
                result,
            }));
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => {
                let _ = self.events.send(PracticeEvent::Synced(SyncOutcome {
                    generation,
                    region,
                    kind,
                    result: Err("no async runtime for region store".into()),
                }));
            }
        }
    }
}

enum Call {
    Create(NewRegion),
    Update(String, RegionPatch),
    Delete(String),
}

impl Call {
    fn kind(&self) -> SyncKind {
        match self {
            Call::Create(_) => SyncKind::Create,
            Call::Update(..) => SyncKind::Update,
            Call::Delete(_) => SyncKind::Delete,
        }
    }
}
