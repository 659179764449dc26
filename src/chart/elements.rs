//! Geometry buffers produced for one security, and the immutable snapshot
//! that packages every security's geometry for the display consumer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::bar::Security;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// Everything a renderer needs to draw one security: point runs for line
/// styles split into up and down segments, candle rects in four buckets
/// (close above/below open crossed with above/below the prior close),
/// volume rects, indicator polylines, and month boundary markers. The
/// scalars at the bottom let the renderer label the axis without seeing
/// the bars themselves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChartElements {
    pub security: Option<Security>,
    pub month_labels: Vec<String>,
    pub month_lines: Vec<Point>,
    /// Bars that closed at or above the prior close
    pub points: Vec<Point>,
    /// Bars that closed below the prior close
    pub down_points: Vec<Point>,
    pub ma_short: Vec<Point>,
    pub ma_long: Vec<Point>,
    pub upper_bollinger: Vec<Point>,
    pub middle_bollinger: Vec<Point>,
    pub lower_bollinger: Vec<Point>,
    /// Hollow candles: up close, above prior close
    pub up_bars: Vec<Rect>,
    /// Filled candles: up close, below prior close
    pub filled_up_bars: Vec<Rect>,
    /// Hollow candles: down close, above prior close
    pub hollow_down_bars: Vec<Rect>,
    /// Filled candles: down close, below prior close
    pub down_bars: Vec<Rect>,
    pub down_volume: Vec<Rect>,
    pub up_volume: Vec<Rect>,
    pub y_factor: f64,
    pub y_floor: f64,
    pub max_high: f64,
    pub min_low: f64,
    pub scaled_low: f64,
    pub last_price: f64,
}

impl ChartElements {
    pub fn new(security: Security) -> Self {
        Self {
            security: Some(security),
            max_high: 1.0,
            last_price: 1.0,
            ..Self::default()
        }
    }

    /// Drop all geometry but keep allocations, so re-projection while
    /// panning reuses the buffers.
    pub fn clear(&mut self) {
        self.month_labels.clear();
        self.month_lines.clear();
        self.points.clear();
        self.down_points.clear();
        self.ma_short.clear();
        self.ma_long.clear();
        self.upper_bollinger.clear();
        self.middle_bollinger.clear();
        self.lower_bollinger.clear();
        self.up_bars.clear();
        self.filled_up_bars.clear();
        self.hollow_down_bars.clear();
        self.down_bars.clear();
        self.down_volume.clear();
        self.up_volume.clear();
    }
}

/// One published frame: the geometry of every security in the comparison
/// plus the shared percent-change scale it was projected against. Shared
/// immutably behind an `Arc`; the engine never mutates a snapshot after
/// commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub comparison_id: i64,
    pub elements: Vec<ChartElements>,
    pub percent_change: f64,
    pub epoch: u64,
}

impl Snapshot {
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_scalars() {
        let mut elements = ChartElements::new(Security::new(1, "AAPL"));
        elements.points.push(Point::new(1.0, 2.0));
        elements.up_bars.push(Rect::new(0.0, 0.0, 3.0, 4.0));
        elements.y_factor = 2.5;
        elements.clear();

        assert!(elements.points.is_empty());
        assert!(elements.up_bars.is_empty());
        assert_eq!(elements.y_factor, 2.5);
        assert_eq!(elements.security.as_ref().map(|s| s.id), Some(1));
    }
}
