//! Per-security computation pipeline.
//!
//! Owns the daily bar store, aggregation, indicators and the visible
//! window for one security, and turns them into geometry on request.
//! The engine wraps each series in an async mutex and drives them
//! concurrently; everything here is synchronous single-writer code.

use tracing::{debug, warn};

use crate::chart::aggregate::{Aggregator, BarUnit};
use crate::chart::bar::{Bar, Security};
use crate::chart::coords::{CoordinateMapper, VisibleWindow};
use crate::chart::elements::ChartElements;
use crate::chart::indicator::{IndicatorEngine, IndicatorParams, IndicatorValues};
use crate::chart::store::BarStore;
use crate::config::EngineConfig;
use crate::error::Result;

/// Bars shown when the visible window was never set or scrolled out.
const DEFAULT_BARS_SHOWN: i64 = 50;

/// Threshold above which a grown shared scale forces re-projection.
const PERCENT_CHANGE_EPSILON: f64 = 0.02;

/// Info for the bar under the user's finger during a long press.
#[derive(Debug, Clone, PartialEq)]
pub struct BarInfo {
    pub bar: Bar,
    pub month_name: &'static str,
    pub up_close: bool,
    pub indicators: IndicatorValues,
}

#[derive(Debug)]
pub struct SecuritySeries {
    security: Security,
    store: BarStore,
    aggregator: Aggregator,
    indicators: IndicatorEngine,
    elements: ChartElements,
    /// Display index of the leftmost visible bar; 0 means nothing shown,
    /// values past the bar count leave a blank gap on the left
    oldest_bar_shown: i64,
    newest_bar_shown: i64,
    /// Visible max_high / min_low for this security alone
    percent_change: f64,
    /// The comparison-wide scale this security is currently drawn at
    chart_percent_change: f64,
    max_volume: f64,
    retention_cap: usize,
    last_error: Option<String>,
}

impl SecuritySeries {
    pub fn new(security: Security, oldest_bar_shown: i64, config: &EngineConfig) -> Self {
        Self {
            elements: ChartElements::new(security.clone()),
            security,
            store: BarStore::new(),
            aggregator: Aggregator::new(BarUnit::Daily),
            indicators: IndicatorEngine::new(IndicatorParams::from_config(config)),
            oldest_bar_shown,
            newest_bar_shown: 0,
            percent_change: 1.0,
            chart_percent_change: 1.0,
            max_volume: 0.0,
            retention_cap: config.retention_cap,
            last_error: None,
        }
    }

    pub fn security(&self) -> &Security {
        &self.security
    }

    /// Swap in updated display options (color, style, indicator toggles).
    pub fn update_security(&mut self, security: Security) {
        self.elements.security = Some(security.clone());
        self.security = security;
    }

    pub fn bar_count(&self) -> usize {
        self.store.len()
    }

    pub fn period_count(&self) -> usize {
        self.aggregator.period_bars().len()
    }

    pub fn bar_unit(&self) -> BarUnit {
        self.aggregator.unit()
    }

    pub fn oldest_bar_shown(&self) -> i64 {
        self.oldest_bar_shown
    }

    pub fn set_oldest_bar_shown(&mut self, oldest: i64) {
        self.oldest_bar_shown = oldest;
    }

    pub fn set_newest_bar_shown(&mut self, newest: i64) {
        self.newest_bar_shown = newest.max(0);
    }

    pub fn percent_change(&self) -> f64 {
        self.percent_change
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn elements(&self) -> &ChartElements {
        &self.elements
    }

    pub fn clone_elements(&self) -> ChartElements {
        self.elements.clone()
    }

    /// Route a loaded batch of daily history by its date range: first
    /// load and strictly newer batches append, strictly older batches
    /// prepend, anything overlapping replaces the store outright.
    pub fn apply_historical(&mut self, batch: Vec<Bar>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.last_error = None;
        match (self.store.oldest_date(), self.store.newest_date()) {
            (Some(oldest), Some(newest)) => {
                let first = batch[0].date;
                let last = batch[batch.len() - 1].date;
                if first > newest {
                    self.store.append(batch)?;
                } else if last < oldest {
                    self.store.prepend(batch)?;
                } else {
                    debug!(ticker = %self.security.ticker, "reload overlaps stored range, replacing");
                    self.store.replace_all(batch)?;
                }
            }
            _ => self.store.append(batch)?,
        }
        if let Some(boundary) = self.store.truncate_oldest(self.retention_cap) {
            debug!(ticker = %self.security.ticker, %boundary, "history trimmed to retention cap");
        }
        self.refresh_series();
        Ok(())
    }

    /// Replace or append the in-progress bar for the current session.
    pub fn apply_intraday(&mut self, bar: Bar) -> Result<()> {
        self.store.replace_intraday(bar)?;
        self.refresh_series();
        Ok(())
    }

    /// Fetch failed: surface the message, keep last known good bars.
    pub fn mark_failed(&mut self, message: String) {
        warn!(ticker = %self.security.ticker, %message, "fetch failed");
        self.last_error = Some(message);
    }

    /// Fetch canceled: nothing changes and no error is surfaced.
    pub fn mark_canceled(&self) {
        debug!(ticker = %self.security.ticker, "fetch canceled");
    }

    fn refresh_series(&mut self) {
        let dirty_from = self.aggregator.update(&self.store);
        self.indicators.update(self.aggregator.period_bars(), dirty_from);
        if let Some(bar) = self.store.bars().last() {
            self.elements.last_price = bar.close;
        }
    }

    /// Recompute visible-window extrema and the vertical scale factors.
    /// Clamps the window back into range first.
    pub fn update_high_low(&mut self, chart_base: f64) {
        let period = self.aggregator.period_bars();
        if period.is_empty() {
            return;
        }
        let count = period.len() as i64;
        if self.oldest_bar_shown <= 0 {
            // count - 1 is the largest valid display index
            self.oldest_bar_shown = DEFAULT_BARS_SHOWN.min(count - 1);
            self.newest_bar_shown = 0;
        } else if self.oldest_bar_shown >= count {
            self.oldest_bar_shown = count - 1;
        }

        let last = period.len() - 1;
        let mut max_high: f64 = 0.0;
        let mut min_low: f64 = 0.0;
        self.max_volume = 0.0;
        for display in self.newest_bar_shown..=self.oldest_bar_shown {
            let bar = &period[last - display as usize];
            if bar.volume > self.max_volume {
                self.max_volume = bar.volume;
            }
            if bar.low > 0.0 && (min_low == 0.0 || bar.low < min_low) {
                min_low = bar.low;
            }
            if bar.high > max_high {
                max_high = bar.high;
            }
        }

        self.elements.max_high = max_high;
        self.elements.min_low = min_low;
        self.elements.scaled_low = min_low;

        if min_low > 0.0 {
            self.percent_change = max_high / min_low;
            if self.percent_change > self.chart_percent_change {
                self.chart_percent_change = self.percent_change;
            }
            self.elements.scaled_low = max_high / self.chart_percent_change;
            let range = max_high - self.elements.scaled_low;
            if range > 0.0 {
                self.elements.y_factor = chart_base / range;
            } else {
                warn!(ticker = %self.security.ticker, "flat visible range, using default y factor");
                self.elements.y_factor = 50.0;
            }
        }
    }

    /// Pan by `bars_shifted` period bars (positive = toward older data).
    /// Returns this security's visible percent change for the shared
    /// scale fold.
    pub fn shift_redraw(&mut self, bars_shifted: i64, screen_bar_width: i64, chart_base: f64) -> f64 {
        let count = self.period_count() as i64;
        if self.oldest_bar_shown + bars_shifted >= count {
            debug!(
                ticker = %self.security.ticker,
                oldest = self.oldest_bar_shown,
                bars_shifted,
                count,
                "pan would run past available history"
            );
            return self.percent_change;
        }
        self.oldest_bar_shown += bars_shifted;
        self.newest_bar_shown = (self.oldest_bar_shown - screen_bar_width).max(0);

        if self.oldest_bar_shown <= 0 {
            self.elements.clear();
        } else {
            self.update_high_low(chart_base);
        }
        self.percent_change
    }

    /// Switch period unit and keep the visible window over the same dates
    /// by rescaling the display indices. `max_periods` caps the window to
    /// the shortest security in the comparison.
    pub fn update_bar_factors(&mut self, unit: BarUnit, max_periods: usize, chart_base: f64) {
        let old_unit = self.aggregator.unit();
        if self.aggregator.set_unit(unit) {
            let ratio = old_unit.days_per_bar() / unit.days_per_bar();
            self.newest_bar_shown = (self.newest_bar_shown as f64 * ratio).floor() as i64;
            self.oldest_bar_shown = (self.oldest_bar_shown as f64 * ratio).floor() as i64;
        }
        self.refresh_series();
        if self.oldest_bar_shown > max_periods as i64 {
            self.oldest_bar_shown = max_periods as i64;
        }
        self.update_high_low(chart_base);
    }

    /// How many period bars this security can chart at `unit`, so one
    /// short security limits the whole comparison's range. Also returns
    /// the current window start for the same comparison.
    pub fn max_period_supported(&self, unit: BarUnit) -> (usize, i64) {
        let count = (self.store.len() as f64 / unit.days_per_bar()).ceil() as usize;
        (count, self.oldest_bar_shown.max(0))
    }

    /// Apply a grown comparison-wide scale. Returns true when geometry
    /// must be re-projected, either because the scale moved more than the
    /// epsilon or the caller forced it (data or options changed).
    pub fn recompute(&mut self, max_percent_change: f64, force: bool, chart_base: f64) -> bool {
        let difference = max_percent_change - self.chart_percent_change;
        self.chart_percent_change = max_percent_change;
        if self.elements.max_high > 0.0 && max_percent_change > 0.0 {
            self.elements.scaled_low = self.elements.max_high / max_percent_change;
            let range = self.elements.max_high - self.elements.scaled_low;
            if range > 0.0 {
                self.elements.y_factor = chart_base / range;
            }
        }
        force || difference > PERCENT_CHANGE_EPSILON
    }

    /// Project the visible window into this security's geometry buffers.
    pub fn project(&mut self, mapper: &CoordinateMapper) {
        if self.oldest_bar_shown < 1 {
            self.elements.clear();
            return;
        }
        let window = VisibleWindow {
            oldest_shown: self.oldest_bar_shown as usize,
            newest_shown: self.newest_bar_shown.max(0) as usize,
        };
        mapper.project(
            &self.security,
            self.aggregator.period_bars(),
            self.store.len(),
            self.indicators.series(),
            window,
            self.max_volume,
            &mut self.elements,
        );
    }

    /// Bar and indicator values at a display index, for tap inspection.
    /// The up-close flag compares against the next older close, or the
    /// bar's own open at the oldest end of history.
    pub fn bar_at(&self, index: i64) -> Option<BarInfo> {
        let period = self.aggregator.period_bars();
        if index < 0 || index as usize >= period.len() {
            return None;
        }
        let last = period.len() - 1;
        let storage = last - index as usize;
        let bar = period[storage];
        let up_close = if (index as usize) < period.len().saturating_sub(2) {
            bar.close >= period[storage - 1].close
        } else {
            bar.close >= bar.open
        };
        Some(BarInfo {
            bar,
            month_name: bar.month_name(),
            up_close,
            indicators: self.indicators.values_at(storage),
        })
    }
}
