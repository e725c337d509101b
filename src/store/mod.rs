// src/store/mod.rs

pub mod http;
pub mod memory;
pub mod sync;

pub use http::HttpRegionApi;
pub use memory::MemoryRegionApi;
pub use sync::{RegionSync, SyncEffect, SyncKind, SyncOp, SyncOutcome};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A stored row, as the region API returns it for the calling owner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub id: String,
    #[serde(default, alias = "name")]
    pub label: Option<String>,
    #[serde(alias = "start_seconds")]
    pub start_sec: f64,
    #[serde(alias = "end_seconds")]
    pub end_sec: f64,
    #[serde(rename = "loop", default)]
    pub looped: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewRegion {
    pub label: String,
    pub start_sec: f64,
    pub end_sec: f64,
    #[serde(rename = "loop")]
    pub looped: bool,
}

/// Partial update; absent fields are left alone by the store.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RegionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_sec: Option<f64>,
    #[serde(rename = "loop", skip_serializing_if = "Option::is_none")]
    pub looped: Option<bool>,
}

impl RegionPatch {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn bounds(start_sec: f64, end_sec: f64) -> Self {
        Self {
            start_sec: Some(start_sec),
            end_sec: Some(end_sec),
            ..Self::default()
        }
    }

    pub fn looped(looped: bool) -> Self {
        Self {
            looped: Some(looped),
            ..Self::default()
        }
    }

    /// Later fields win.
    pub fn merge(&mut self, later: RegionPatch) {
        if later.label.is_some() {
            self.label = later.label;
        }
        if later.start_sec.is_some() {
            self.start_sec = later.start_sec;
        }
        if later.end_sec.is_some() {
            self.end_sec = later.end_sec;
        }
        if later.looped.is_some() {
            self.looped = later.looped;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.start_sec.is_none()
            && self.end_sec.is_none()
            && self.looped.is_none()
    }

    pub fn apply_to(&self, record: &mut RegionRecord) {
        if let Some(label) = &self.label {
            record.label = Some(label.clone());
        }
        if let Some(start) = self.start_sec {
            record.start_sec = start;
        }
        if let Some(end) = self.end_sec {
            record.end_sec = end;
        }
        if let Some(looped) = self.looped {
            record.looped = looped;
        }
    }
}

/// Per-owner region persistence. Authorization is the implementor's job;
/// the core only ever sees the caller's own rows.
#[async_trait]
pub trait RegionApi: Send + Sync {
    /// Rows for one track, ordered by start.
    async fn list(&self, track_id: &str) -> Result<Vec<RegionRecord>, StoreError>;

    /// Returns the server id of the new row.
    async fn create(&self, track_id: &str, region: &NewRegion) -> Result<String, StoreError>;

    async fn update(&self, id: &str, patch: &RegionPatch) -> Result<(), StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merge_keeps_latest_fields() {
        let mut patch = RegionPatch::bounds(1.0, 2.0);
        patch.merge(RegionPatch::label("Verse"));
        patch.merge(RegionPatch::bounds(3.0, 4.0));
        assert_eq!(patch.label.as_deref(), Some("Verse"));
        assert_eq!(patch.start_sec, Some(3.0));
        assert_eq!(patch.end_sec, Some(4.0));
        assert_eq!(patch.looped, None);
    }

    #[test]
    fn patch_serializes_only_present_fields() {
        let json = serde_json::to_value(RegionPatch::looped(true)).unwrap();
        assert_eq!(json, serde_json::json!({ "loop": true }));
        assert!(RegionPatch::default().is_empty());
    }

    #[test]
    fn record_accepts_missing_label_and_loop() {
        let record: RegionRecord =
            serde_json::from_str(r#"{ "id": "a1", "start_sec": 1.5, "end_sec": 4.0 }"#).unwrap();
        assert_eq!(record.label, None);
        assert!(!record.looped);
    }

    #[test]
    fn record_accepts_the_named_column_shape() {
        let record: RegionRecord = serde_json::from_str(
            r#"{ "id": "b2", "name": "Bridge", "start_seconds": 12.0, "end_seconds": 20.5 }"#,
        )
        .unwrap();
        assert_eq!(record.label.as_deref(), Some("Bridge"));
        assert_eq!((record.start_sec, record.end_sec), (12.0, 20.5));
    }
}
