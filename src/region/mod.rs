// src/region/mod.rs

pub mod controller;
pub mod decoration;
pub mod looper;

pub use controller::RegionController;
pub use decoration::{NoDecoration, RegionDecoration};
pub use looper::{LoopState, LoopSupervisor};

use std::fmt;

use crate::error::ValidationError;

pub const DEFAULT_LABEL: &str = "Region";

/// Local identity of a region. Assigned synchronously on creation so the UI
/// never waits on the store; the server id is bound later by the sync layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistenceState {
    /// Never reached the store (no store configured, or the create failed).
    LocalOnly,
    /// Create is queued or in flight.
    Syncing,
    /// Bound to a server row.
    Synced,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub id: RegionId,
    pub server_id: Option<String>,
    pub label: String,
    pub start: f64,
    pub end: f64,
    pub persistence: PersistenceState,
    pub selected: bool,
}

impl Region {
    pub fn new(id: RegionId, label: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            id,
            server_id: None,
            label: label.into(),
            start,
            end,
            persistence: PersistenceState::LocalOnly,
            selected: false,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Half-open: the end belongs to the next pass of the loop.
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }

    /// "0:38 – 0:42" style span for lists and status lines.
    pub fn span_label(&self) -> String {
        format!("{} – {}", format_clock(self.start), format_clock(self.end))
    }
}

/// `0 ≤ start < end ≤ duration`, all finite.
pub fn validate_bounds(start: f64, end: f64, duration: f64) -> Result<(), ValidationError> {
    let finite = start.is_finite() && end.is_finite() && duration.is_finite();
    if finite && 0.0 <= start && start < end && end <= duration {
        Ok(())
    } else {
        Err(ValidationError::InvalidBounds {
            start,
            end,
            duration,
        })
    }
}

/// `[anchor - half_width, anchor + half_width]` clipped to the track.
pub fn default_window(
    anchor: f64,
    half_width: f64,
    duration: f64,
) -> Result<(f64, f64), ValidationError> {
    if !(duration.is_finite() && duration > 0.0) {
        return Err(ValidationError::NoTrack);
    }
    let anchor = if anchor.is_finite() {
        anchor.clamp(0.0, duration)
    } else {
        0.0
    };
    let start = (anchor - half_width).max(0.0);
    let end = (anchor + half_width).min(duration);
    validate_bounds(start, end, duration)?;
    Ok((start, end))
}

/// Trim; empty becomes the default label.
pub fn normalize_label(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        DEFAULT_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// m:ss
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
