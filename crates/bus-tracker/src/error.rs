//! Error types for the tracking engine

use bus_core::BusNumber;
use bus_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the engine components
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A driver session tried to start a trip while one is running
    #[error("tracking already active for bus {0}")]
    AlreadyTracking(BusNumber),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
