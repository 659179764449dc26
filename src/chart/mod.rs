//! Chart module - series computation building blocks.
//!
//! Everything needed to turn raw daily bars into drawable geometry:
//!
//! - **store**: ordered daily bar storage with revision tracking
//! - **aggregate**: daily to weekly/monthly grouping
//! - **indicator**: moving averages and Bollinger bands
//! - **scale**: shared min/max across a comparison
//! - **coords**: data-space to pixel-space projection
//! - **snapshot**: double-buffered publication to the renderer

pub mod aggregate;
pub mod bar;
pub mod coords;
pub mod elements;
pub mod indicator;
pub mod scale;
pub mod snapshot;
pub mod store;

// Re-exports
pub use aggregate::{Aggregator, BarUnit};
pub use bar::{Bar, ChartStyle, Security};
pub use coords::{px_align, CoordinateMapper, VisibleWindow};
pub use elements::{ChartElements, Point, Rect, Snapshot};
pub use indicator::{IndicatorEngine, IndicatorParams, IndicatorSeries, IndicatorValues};
pub use scale::ComparisonScaler;
pub use snapshot::{Scratch, SnapshotPublisher};
pub use store::BarStore;
