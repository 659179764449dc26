//! Error types for the chart engine.

use thiserror::Error;

/// Errors surfaced by the chart engine.
///
/// Computation-layer errors (`OutOfOrder`) are recovered locally and never
/// corrupt existing state. Fetch-layer errors come from the external data
/// collaborator and leave bar data at last known good. Canceled fetches and
/// scales with no finite contributor are not errors: both leave the chart
/// at its last known good state without surfacing anything.
#[derive(Debug, Error)]
pub enum ChartError {
    /// An incoming bar batch would violate the strictly increasing date
    /// order of the bar store. The batch is rejected in full.
    #[error("bars out of order: {0}")]
    OutOfOrder(String),

    /// The external fetch collaborator reported a failure.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Configuration file could not be read.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ChartError>;
