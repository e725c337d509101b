// src/store/memory.rs

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::{NewRegion, RegionApi, RegionPatch, RegionRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<String, Vec<RegionRecord>>,
    next_id: u64,
    calls: CallCounts,
    fail_lists: bool,
    fail_creates: bool,
    fail_updates: bool,
    fail_deletes: bool,
}

/// In-process region store with optional latency and failure injection.
#[derive(Default)]
pub struct MemoryRegionApi {
    inner: Mutex<Inner>,
    latency: Mutex<Option<Duration>>,
    list_latency: Mutex<Option<Duration>>,
}

impl MemoryRegionApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before touching the rows.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut l) = self.latency.lock() {
            *l = latency;
        }
    }

    /// Extra delay for `list` only, on top of `set_latency`.
    pub fn set_list_latency(&self, latency: Option<Duration>) {
        if let Ok(mut l) = self.list_latency.lock() {
            *l = latency;
        }
    }

    pub fn fail_lists(&self, fail: bool) {
        self.with(|inner| inner.fail_lists = fail);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.with(|inner| inner.fail_creates = fail);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.with(|inner| inner.fail_updates = fail);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.with(|inner| inner.fail_deletes = fail);
    }

    /// Insert a row directly, bypassing the call counters.
    pub fn seed(&self, track_id: &str, label: &str, start_sec: f64, end_sec: f64, looped: bool) -> String {
        self.with(|inner| {
            inner.next_id += 1;
            let id = format!("srv-{}", inner.next_id);
            inner
                .rows
                .entry(track_id.to_string())
                .or_default()
                .push(RegionRecord {
                    id: id.clone(),
                    label: Some(label.to_string()),
                    start_sec,
                    end_sec,
                    looped,
                });
            id
        })
        .unwrap_or_default()
    }

    /// Rows for a track, ordered by start.
    pub fn rows(&self, track_id: &str) -> Vec<RegionRecord> {
        self.with(|inner| sorted(inner.rows.get(track_id).cloned().unwrap_or_default()))
            .unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.with(|inner| inner.calls).unwrap_or_default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Option<T> {
        self.inner.lock().ok().map(|mut inner| f(&mut *inner))
    }

    async fn delay(&self) {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn sorted(mut rows: Vec<RegionRecord>) -> Vec<RegionRecord> {
    rows.sort_by(|a, b| a.start_sec.total_cmp(&b.start_sec));
    rows
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("memory store lock poisoned".into())
}

#[async_trait]
impl RegionApi for MemoryRegionApi {
    async fn list(&self, track_id: &str) -> Result<Vec<RegionRecord>, StoreError> {
        self.delay().await;
        let extra = self.list_latency.lock().ok().and_then(|l| *l);
        if let Some(extra) = extra {
            tokio::time::sleep(extra).await;
        }
        self.with(|inner| {
            inner.calls.lists += 1;
            if inner.fail_lists {
                return Err(StoreError::Unavailable("list failed".into()));
            }
            Ok(sorted(inner.rows.get(track_id).cloned().unwrap_or_default()))
        })
        .unwrap_or_else(|| Err(poisoned()))
    }

    async fn create(&self, track_id: &str, region: &NewRegion) -> Result<String, StoreError> {
        self.delay().await;
        self.with(|inner| {
            inner.calls.creates += 1;
            if inner.fail_creates {
                return Err(StoreError::Unavailable("create failed".into()));
            }
            inner.next_id += 1;
            let id = format!("srv-{}", inner.next_id);
            inner
                .rows
                .entry(track_id.to_string())
                .or_default()
                .push(RegionRecord {
                    id: id.clone(),
                    label: Some(region.label.clone()),
                    start_sec: region.start_sec,
                    end_sec: region.end_sec,
                    looped: region.looped,
                });
            Ok(id)
        })
        .unwrap_or_else(|| Err(poisoned()))
    }

    async fn update(&self, id: &str, patch: &RegionPatch) -> Result<(), StoreError> {
        self.delay().await;
        self.with(|inner| {
            inner.calls.updates += 1;
            if inner.fail_updates {
                return Err(StoreError::Unavailable("update failed".into()));
            }
            let row = inner
                .rows
                .values_mut()
                .flat_map(|rows| rows.iter_mut())
                .find(|row| row.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            patch.apply_to(row);
            Ok(())
        })
        .unwrap_or_else(|| Err(poisoned()))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.delay().await;
        self.with(|inner| {
            inner.calls.deletes += 1;
            if inner.fail_deletes {
                return Err(StoreError::Unavailable("delete failed".into()));
            }
            let mut found = false;
            for rows in inner.rows.values_mut() {
                let before = rows.len();
                rows.retain(|row| row.id != id);
                found |= rows.len() != before;
            }
            if found {
                Ok(())
            } else {
                Err(StoreError::NotFound(id.to_string()))
            }
        })
        .unwrap_or_else(|| Err(poisoned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn crud_round() {
        let api = MemoryRegionApi::new();
        let id = api
            .create(
                "song",
                &NewRegion {
                    label: "Intro".into(),
                    start_sec: 0.0,
                    end_sec: 8.0,
                    looped: false,
                },
            )
            .await
            .unwrap();
        api.update(&id, &RegionPatch::looped(true)).await.unwrap();

        let rows = api.list("song").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].looped);

        api.delete(&id).await.unwrap();
        assert!(api.list("song").await.unwrap().is_empty());
        assert!(matches!(api.delete(&id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_is_sorted_and_scoped() {
        let api = MemoryRegionApi::new();
        api.seed("a", "late", 30.0, 40.0, false);
        api.seed("a", "early", 5.0, 10.0, false);
        api.seed("b", "other", 0.0, 1.0, false);

        let rows = api.list("a").await.unwrap();
        let labels: Vec<_> = rows.iter().filter_map(|r| r.label.as_deref()).collect();
        assert_eq!(labels, ["early", "late"]);
    }
}
