//! Technical indicators computed over period bars.
//!
//! Two simple moving averages and a Bollinger band triple, each stored as
//! a parallel array aligned one to one with the period bars. A slot is
//! None until enough bars exist to fill the window. When only new bars
//! were appended, the series is extended in place instead of recomputed.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bar::Bar;
use crate::config::EngineConfig;

/// Window configuration for the indicator engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub ma_short: usize,
    pub ma_long: usize,
    pub bollinger_window: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ma_short: 50,
            ma_long: 200,
            bollinger_window: 20,
            bollinger_k: 2.0,
        }
    }
}

impl IndicatorParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            ma_short: config.ma_short,
            ma_long: config.ma_long,
            bollinger_window: config.bollinger_window,
            bollinger_k: config.bollinger_k,
        }
    }
}

/// Indicator values aligned with period bars. `None` means undefined:
/// either the window does not fit yet, or a non-finite close poisoned it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSeries {
    pub ma_short: Vec<Option<f64>>,
    pub ma_long: Vec<Option<f64>>,
    pub boll_upper: Vec<Option<f64>>,
    pub boll_middle: Vec<Option<f64>>,
    pub boll_lower: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.ma_short.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ma_short.is_empty()
    }

    fn truncate(&mut self, len: usize) {
        self.ma_short.truncate(len);
        self.ma_long.truncate(len);
        self.boll_upper.truncate(len);
        self.boll_middle.truncate(len);
        self.boll_lower.truncate(len);
    }
}

/// Indicator values for a single bar index, for tap/inspect display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorValues {
    pub ma_short: Option<f64>,
    pub ma_long: Option<f64>,
    pub boll_upper: Option<f64>,
    pub boll_middle: Option<f64>,
    pub boll_lower: Option<f64>,
}

#[derive(Debug, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
    series: IndicatorSeries,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self {
            params,
            series: IndicatorSeries::default(),
        }
    }

    pub fn params(&self) -> IndicatorParams {
        self.params
    }

    /// Change window sizes or the band width. Clears computed values so
    /// the next update recomputes everything.
    pub fn set_params(&mut self, params: IndicatorParams) {
        if params != self.params {
            self.params = params;
            self.series = IndicatorSeries::default();
        }
    }

    pub fn series(&self) -> &IndicatorSeries {
        &self.series
    }

    pub fn values_at(&self, index: usize) -> IndicatorValues {
        IndicatorValues {
            ma_short: self.series.ma_short.get(index).copied().flatten(),
            ma_long: self.series.ma_long.get(index).copied().flatten(),
            boll_upper: self.series.boll_upper.get(index).copied().flatten(),
            boll_middle: self.series.boll_middle.get(index).copied().flatten(),
            boll_lower: self.series.boll_lower.get(index).copied().flatten(),
        }
    }

    /// Recompute the series from `dirty_from` onward. Indices below
    /// `dirty_from` keep their existing values untouched, which is what
    /// makes an intraday append cost one window instead of a full pass.
    pub fn update(&mut self, bars: &[Bar], dirty_from: usize) {
        let from = dirty_from.min(self.series.len());
        self.series.truncate(from);
        if from < bars.len() {
            debug!(from, total = bars.len(), "extending indicator series");
        }
        for index in from..bars.len() {
            self.series.ma_short.push(window_mean(bars, index, self.params.ma_short));
            self.series.ma_long.push(window_mean(bars, index, self.params.ma_long));

            let middle = window_mean(bars, index, self.params.bollinger_window);
            let band = middle.and_then(|mean| {
                window_stdev(bars, index, self.params.bollinger_window, mean).map(|stdev| {
                    (mean + self.params.bollinger_k * stdev, mean - self.params.bollinger_k * stdev)
                })
            });
            self.series.boll_middle.push(middle);
            self.series.boll_upper.push(band.map(|(upper, _)| upper));
            self.series.boll_lower.push(band.map(|(_, lower)| lower));
        }
    }

    /// Full recompute, discarding everything.
    pub fn compute(&mut self, bars: &[Bar]) {
        self.series = IndicatorSeries::default();
        self.update(bars, 0);
    }
}

/// Arithmetic mean of close over the `window` bars ending at `index`.
/// None if the window does not fit or contains a non-finite close.
fn window_mean(bars: &[Bar], index: usize, window: usize) -> Option<f64> {
    if window == 0 || index + 1 < window {
        return None;
    }
    let mut sum = 0.0;
    for bar in &bars[index + 1 - window..=index] {
        if !bar.close.is_finite() {
            return None;
        }
        sum += bar.close;
    }
    Some(sum / window as f64)
}

/// Population standard deviation of close over the same window.
fn window_stdev(bars: &[Bar], index: usize, window: usize, mean: f64) -> Option<f64> {
    if window == 0 || index + 1 < window {
        return None;
    }
    let mut sum_sq = 0.0;
    for bar in &bars[index + 1 - window..=index] {
        if !bar.close.is_finite() {
            return None;
        }
        let diff = bar.close - mean;
        sum_sq += diff * diff;
    }
    Some((sum_sq / window as f64).sqrt())
}
