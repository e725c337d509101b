// src/error.rs

use thiserror::Error;

use crate::region::RegionId;

pub type PracticeResult<T> = std::result::Result<T, PracticeError>;

/// Rejected before anything is persisted; state is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid region bounds [{start}, {end}) for a {duration}s track")]
    InvalidBounds { start: f64, end: f64, duration: f64 },

    #[error("no track is loaded")]
    NoTrack,

    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("no region is selected")]
    NoSelection,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("audio engine is not ready")]
    NotReady,

    /// Output is gated until the user interacts (autoplay policy, device busy).
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("output device error: {0}")]
    Device(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("region store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("region store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("region {0} not found")]
    NotFound(String),

    #[error("region store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum PracticeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Create/update/delete failed. Never retried; surfaced as a status line.
    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error(transparent)]
    Engine(EngineError),
}

impl From<EngineError> for PracticeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(msg) => PracticeError::EngineUnavailable(msg),
            other => PracticeError::Engine(other),
        }
    }
}

impl From<StoreError> for PracticeError {
    fn from(err: StoreError) -> Self {
        PracticeError::TransientNetwork(err.to_string())
    }
}
