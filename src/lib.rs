//! Chart Engine
//!
//! Time-series computation engine for an interactive stock charting app.
//! Raw daily price bars arrive asynchronously from an external fetch
//! collaborator; this crate aggregates them into period bars, computes
//! technical indicators, tracks the shared scale of a multi-security
//! comparison, and projects everything into pixel-space geometry that a
//! renderer can draw. Computation runs on a background task and results
//! are published to the display consumer through immutable snapshots.

pub mod chart;
pub mod config;
pub mod engine;
pub mod error;

pub use chart::{
    Aggregator, Bar, BarStore, BarUnit, ChartElements, ChartStyle, ComparisonScaler,
    CoordinateMapper, IndicatorEngine, IndicatorParams, IndicatorSeries, Point, Rect, Security,
    Snapshot, SnapshotPublisher,
};
pub use config::EngineConfig;
pub use engine::{BarFeed, ChartEngine, FeedEvent, SecuritySeries};
pub use error::{ChartError, Result};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
