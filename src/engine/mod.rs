//! Engine module - per-comparison orchestration.
//!
//! [`ChartEngine`] owns every [`SecuritySeries`] in one comparison,
//! folds their visible ranges into a shared percent-change scale, and
//! publishes immutable snapshots of the resulting geometry. Per-security
//! work runs concurrently; the shared scaler and publisher serialize the
//! cross-security steps.

pub mod feed;
pub mod security;

// Re-exports
pub use feed::{BarFeed, EmptyFeed, FeedEvent, HistoryRequest};
pub use security::{BarInfo, SecuritySeries};

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::chart::aggregate::BarUnit;
use crate::chart::bar::Security;
use crate::chart::coords::CoordinateMapper;
use crate::chart::elements::Snapshot;
use crate::chart::scale::ComparisonScaler;
use crate::chart::snapshot::SnapshotPublisher;
use crate::config::EngineConfig;
use crate::error::Result;

/// Shared-scale metric key for the visible percent change of each
/// security.
const PERCENT_CHANGE_KEY: &str = "percentChange";

struct SecuritySlot {
    id: i64,
    series: Arc<Mutex<SecuritySeries>>,
}

pub struct ChartEngine {
    comparison_id: i64,
    securities: Vec<SecuritySlot>,
    scaler: StdMutex<ComparisonScaler>,
    publisher: Arc<SnapshotPublisher>,
    mapper: CoordinateMapper,
    config: EngineConfig,
}

impl ChartEngine {
    pub fn new(comparison_id: i64, config: EngineConfig) -> Self {
        let mapper = CoordinateMapper::new(0.0, 0.0, config.default_x_factor, config.volume_height);
        Self {
            comparison_id,
            securities: Vec::new(),
            scaler: StdMutex::new(ComparisonScaler::new()),
            publisher: Arc::new(SnapshotPublisher::new()),
            mapper,
            config,
        }
    }

    pub fn comparison_id(&self) -> i64 {
        self.comparison_id
    }

    pub fn bar_unit(&self) -> BarUnit {
        self.mapper.bar_unit
    }

    pub fn x_factor(&self) -> f64 {
        self.mapper.x_factor
    }

    pub fn publisher(&self) -> Arc<SnapshotPublisher> {
        Arc::clone(&self.publisher)
    }

    /// Last committed snapshot, or None before the first commit.
    pub fn current_snapshot(&self) -> Option<Arc<Snapshot>> {
        self.publisher.current()
    }

    /// Period bars that fit across the viewport at the current zoom,
    /// before accounting for period unit width.
    pub fn visible_bar_count(&self) -> usize {
        let available = self.mapper.px_width - self.axis_padding();
        if available <= 0.0 || self.mapper.x_factor <= 0.0 {
            return 0;
        }
        (available / self.mapper.x_factor).floor() as usize
    }

    /// Display index of the leftmost bar that fits on screen. Each added
    /// security grows the right axis and shrinks this.
    pub fn max_bar_offset(&self) -> i64 {
        let available = self.mapper.px_width - self.axis_padding();
        let bar_width = self.mapper.x_factor * self.mapper.bar_unit.days_per_bar();
        if available <= 0.0 || bar_width <= 0.0 {
            return 0;
        }
        (available / bar_width).floor() as i64
    }

    fn axis_padding(&self) -> f64 {
        self.config.axis_width * self.securities.len() as f64
    }

    fn locked_scaler(&self) -> std::sync::MutexGuard<'_, ComparisonScaler> {
        match self.scaler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add one security to the comparison. In-flight snapshot updates
    /// are invalidated since their geometry no longer matches the set.
    pub fn add_security(&mut self, security: Security) {
        info!(ticker = %security.ticker, "adding security to comparison");
        self.publisher.invalidate();
        let oldest = self.max_bar_offset();
        let slot = SecuritySlot {
            id: security.id,
            series: Arc::new(Mutex::new(SecuritySeries::new(security, oldest, &self.config))),
        };
        self.securities.push(slot);
    }

    /// Remove a security and republish with the remaining set, which may
    /// shrink the shared scale.
    pub async fn remove_security(&mut self, security_id: i64) {
        self.publisher.invalidate();
        self.securities.retain(|slot| slot.id != security_id);
        self.locked_scaler().reset_min_max();
        if !self.securities.is_empty() {
            self.recompute_and_publish(0, true).await;
        }
    }

    /// Switch to a different comparison. The previous securities are
    /// dropped and any in-flight update is invalidated; the last good
    /// snapshot stays published until the new set commits one.
    pub fn set_comparison(&mut self, comparison_id: i64, securities: Vec<Security>) {
        info!(comparison_id, count = securities.len(), "switching comparison");
        self.publisher.invalidate();
        self.comparison_id = comparison_id;
        self.securities.clear();
        self.locked_scaler().reset_min_max();
        for security in securities {
            self.add_security(security);
        }
    }

    /// Update display options for one security and republish.
    pub async fn update_security(&mut self, security: Security) {
        if let Some(slot) = self.securities.iter().find(|slot| slot.id == security.id) {
            slot.series.lock().await.update_security(security);
            self.recompute_and_publish(0, true).await;
        }
    }

    /// Consume one event from the fetch collaborator for `security_id`.
    pub async fn handle_feed_event(&mut self, security_id: i64, event: FeedEvent) -> Result<()> {
        let Some(slot) = self.securities.iter().find(|slot| slot.id == security_id) else {
            debug!(security_id, "feed event for unknown security");
            return Ok(());
        };
        let series = Arc::clone(&slot.series);
        match event {
            FeedEvent::HistoricalLoaded(bars) => {
                let span = {
                    let mut series = series.lock().await;
                    series.apply_historical(bars)?;
                    series.bar_count()
                };
                let unit = BarUnit::select(span, self.visible_bar_count().max(1), &self.config);
                if unit != self.mapper.bar_unit {
                    self.apply_bar_factors(unit).await;
                } else {
                    let chart_base = self.mapper.chart_base();
                    series.lock().await.update_high_low(chart_base);
                }
                self.recompute_and_publish(0, true).await;
                Ok(())
            }
            FeedEvent::IntradayBar(bar) => {
                {
                    let mut series = series.lock().await;
                    series.apply_intraday(bar)?;
                    series.update_high_low(self.mapper.chart_base());
                }
                self.recompute_and_publish(0, true).await;
                Ok(())
            }
            FeedEvent::Failed(message) => {
                series.lock().await.mark_failed(message);
                Ok(())
            }
            FeedEvent::Canceled => {
                series.lock().await.mark_canceled();
                Ok(())
            }
        }
    }

    /// Surfaced failure message for one security, if any.
    pub async fn last_error(&self, security_id: i64) -> Option<String> {
        let slot = self.securities.iter().find(|slot| slot.id == security_id)?;
        slot.series.lock().await.last_error().map(str::to_string)
    }

    /// Pan by `bars_shifted` period bars and republish.
    pub async fn pan(&self, bars_shifted: i64) {
        self.recompute_and_publish(bars_shifted, false).await;
    }

    /// Rescale from a pinch gesture, switching period units at the
    /// thresholds where bars get too narrow or too wide to read.
    pub async fn zoom(&mut self, new_scale: f64) {
        let mut new_x_factor = self.mapper.x_factor * new_scale;
        let mut unit = self.mapper.bar_unit;

        if new_x_factor < 1.0 {
            unit = BarUnit::Monthly;
            if new_x_factor < 0.25 {
                new_x_factor = 0.25;
            }
        } else if new_x_factor < 3.0 {
            unit = BarUnit::Weekly;
        } else if unit == BarUnit::Monthly && new_x_factor * unit.days_per_bar() > 20.0 {
            unit = BarUnit::Weekly;
        } else if unit == BarUnit::Weekly && new_x_factor * unit.days_per_bar() > 10.0 {
            unit = BarUnit::Daily;
        } else if new_x_factor > 50.0 {
            new_x_factor = 50.0;
        }

        if new_x_factor == self.mapper.x_factor && unit == self.mapper.bar_unit {
            return;
        }
        debug!(x_factor = new_x_factor, ?unit, "zoom");
        self.mapper.x_factor = new_x_factor;
        self.apply_bar_factors(unit).await;
        self.recompute_and_publish(0, true).await;
    }

    /// Viewport size changed; keep the right edge anchored and refit the
    /// visible window.
    pub async fn resize(&mut self, px_width: f64, px_height: f64) {
        self.mapper.px_width = px_width;
        self.mapper.px_height = px_height;
        let max_offset = self.max_bar_offset();
        for slot in &self.securities {
            let mut series = slot.series.lock().await;
            let oldest = series.oldest_bar_shown();
            series.set_newest_bar_shown(oldest - max_offset);
        }
        self.recompute_and_publish(0, true).await;
    }

    /// Bar under the user's finger: `bar_offset` is measured from the
    /// left edge of the visible window. First security with a bar at
    /// that offset wins.
    pub async fn info_for_bar(&self, bar_offset: i64) -> Option<BarInfo> {
        for slot in &self.securities {
            let series = slot.series.lock().await;
            let index = series.oldest_bar_shown() - bar_offset;
            if let Some(info) = series.bar_at(index) {
                return Some(info);
            }
        }
        None
    }

    /// Switch every security to `unit`, limited to the shortest
    /// security's available period range.
    async fn apply_bar_factors(&mut self, unit: BarUnit) {
        self.mapper.bar_unit = unit;
        let mut period_limit = usize::MAX;
        for slot in &self.securities {
            let series = slot.series.lock().await;
            period_limit = period_limit.min(series.max_period_supported(unit).0);
        }
        if period_limit == usize::MAX {
            period_limit = 0;
        }
        let chart_base = self.mapper.chart_base();
        for slot in &self.securities {
            let mut series = slot.series.lock().await;
            series.update_bar_factors(unit, period_limit, chart_base);
        }
    }

    /// Cap every security's window to the shortest available history so
    /// a comparison never charts ranges its members cannot fill.
    async fn limit_comparison_period(&self) -> (usize, i64) {
        if self.securities.is_empty() {
            return (0, 0);
        }
        let unit = self.mapper.bar_unit;
        let mut period_limit = usize::MAX;
        let mut limit_oldest = i64::MAX;
        let mut oldest_shown = Vec::with_capacity(self.securities.len());
        for slot in &self.securities {
            let series = slot.series.lock().await;
            let (count, oldest) = series.max_period_supported(unit);
            period_limit = period_limit.min(count);
            limit_oldest = limit_oldest.min(oldest);
            oldest_shown.push(oldest);
        }
        for (slot, oldest) in self.securities.iter().zip(oldest_shown) {
            if oldest > period_limit as i64 {
                slot.series.lock().await.set_oldest_bar_shown(limit_oldest);
            }
        }
        (period_limit, limit_oldest)
    }

    /// Shift, rescale and re-project every security, then commit one
    /// snapshot. Per-security work runs concurrently; the commit is
    /// refused if the comparison changed while computing.
    pub async fn recompute_and_publish(&self, bars_shifted: i64, force: bool) -> bool {
        let scratch = self.publisher.begin_update();
        self.limit_comparison_period().await;
        let chart_base = self.mapper.chart_base();
        let screen_bar_width = self.max_bar_offset();

        let percent_changes = join_all(self.securities.iter().map(|slot| {
            let series = Arc::clone(&slot.series);
            async move {
                let mut series = series.lock().await;
                series.shift_redraw(bars_shifted, screen_bar_width, chart_base)
            }
        }))
        .await;

        let chart_percent_change = {
            let mut scaler = self.locked_scaler();
            scaler.reset_min_max();
            for percent_change in percent_changes {
                scaler.update_min_max(PERCENT_CHANGE_KEY, percent_change);
            }
            let folded = scaler.max_for_key(PERCENT_CHANGE_KEY).unwrap_or(1.0);
            folded.max(1.0)
        };

        let mapper = self.mapper;
        let elements = join_all(self.securities.iter().map(|slot| {
            let series = Arc::clone(&slot.series);
            async move {
                let mut series = series.lock().await;
                let rescaled = series.recompute(chart_percent_change, force, chart_base);
                if rescaled || bars_shifted != 0 {
                    series.project(&mapper);
                }
                series.clone_elements()
            }
        }))
        .await;

        let snapshot = Snapshot {
            comparison_id: self.comparison_id,
            elements,
            percent_change: chart_percent_change,
            epoch: 0,
        };
        let committed = self.publisher.commit(scratch, snapshot);
        if !committed {
            debug!(comparison_id = self.comparison_id, "snapshot commit refused, comparison changed");
        }
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::bar::{is_weekday, Bar};
    use chrono::{Days, NaiveDate};

    fn trading_day_bars(count: usize, low: f64, high: f64) -> Vec<Bar> {
        let mut bars = Vec::with_capacity(count);
        let mut date = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap(); // Monday
        while bars.len() < count {
            if is_weekday(date) {
                let open = low + (high - low) * 0.25;
                // Closes cycle so shifted windows never repeat geometry;
                // extrema stay pinned to the low/high arguments
                let wobble = 0.3 + 0.4 * (bars.len() % 7) as f64 / 7.0;
                let close = low + (high - low) * wobble;
                bars.push(Bar::new(date, open, high, low, close, 1000.0));
            }
            date = date.checked_add_days(Days::new(1)).unwrap();
        }
        bars
    }

    async fn engine_with_data() -> ChartEngine {
        let mut engine = ChartEngine::new(1, EngineConfig::default());
        engine.resize(800.0, 600.0).await;
        engine.add_security(Security::new(7, "AAPL"));
        engine
            .handle_feed_event(7, FeedEvent::HistoricalLoaded(trading_day_bars(300, 9.0, 11.0)))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_load_selects_weekly_and_publishes() {
        let engine = engine_with_data().await;

        // 300 daily bars with roughly 100 bars of viewport capacity:
        // daily does not fit, weekly (about 60 bars) does.
        assert_eq!(engine.bar_unit(), BarUnit::Weekly);

        let snapshot = engine.current_snapshot().unwrap();
        assert_eq!(snapshot.comparison_id, 1);
        assert_eq!(snapshot.elements.len(), 1);
        assert!(!snapshot.elements[0].points.is_empty());
        assert!(snapshot.elements[0].y_factor > 0.0);
    }

    #[tokio::test]
    async fn test_load_before_resize_publishes_without_panic() {
        // No resize yet: zero viewport, so the default window exceeds
        // the short history and must be clamped on the first scale pass.
        let mut engine = ChartEngine::new(1, EngineConfig::default());
        engine.add_security(Security::new(7, "AAPL"));
        engine
            .handle_feed_event(7, FeedEvent::HistoricalLoaded(trading_day_bars(10, 9.0, 11.0)))
            .await
            .unwrap();

        let snapshot = engine.current_snapshot().unwrap();
        assert_eq!(snapshot.elements.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_then_canceled_keeps_last_snapshot() {
        let mut engine = engine_with_data().await;
        let before = engine.current_snapshot().unwrap();

        engine
            .handle_feed_event(7, FeedEvent::Failed("server unreachable".to_string()))
            .await
            .unwrap();
        engine.handle_feed_event(7, FeedEvent::Canceled).await.unwrap();

        let after = engine.current_snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(engine.last_error(7).await.as_deref(), Some("server unreachable"));
    }

    #[tokio::test]
    async fn test_shared_scale_reflects_widest_security() {
        let mut engine = ChartEngine::new(1, EngineConfig::default());
        engine.resize(800.0, 600.0).await;
        engine.add_security(Security::new(1, "FLAT"));
        engine.add_security(Security::new(2, "WIDE"));

        engine
            .handle_feed_event(1, FeedEvent::HistoricalLoaded(trading_day_bars(60, 9.0, 11.0)))
            .await
            .unwrap();
        engine
            .handle_feed_event(2, FeedEvent::HistoricalLoaded(trading_day_bars(60, 20.0, 120.0)))
            .await
            .unwrap();

        let snapshot = engine.current_snapshot().unwrap();
        assert_eq!(snapshot.elements.len(), 2);
        // 120/20 dominates 11/9 on the shared scale
        assert!((snapshot.percent_change - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_set_comparison_keeps_snapshot_until_new_commit() {
        let mut engine = engine_with_data().await;
        let before = engine.current_snapshot().unwrap();

        engine.set_comparison(2, vec![Security::new(9, "MSFT")]);
        // Old geometry stays visible while the new comparison loads
        let held = engine.current_snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &held));
        assert_eq!(held.comparison_id, 1);

        engine
            .handle_feed_event(9, FeedEvent::HistoricalLoaded(trading_day_bars(40, 50.0, 60.0)))
            .await
            .unwrap();
        let after = engine.current_snapshot().unwrap();
        assert_eq!(after.comparison_id, 2);
    }

    #[tokio::test]
    async fn test_zoom_threshold_transitions() {
        let mut engine = ChartEngine::new(1, EngineConfig::default());
        engine.resize(800.0, 600.0).await;
        assert_eq!(engine.bar_unit(), BarUnit::Daily);

        engine.zoom(0.3).await; // 7.5 -> 2.25
        assert_eq!(engine.bar_unit(), BarUnit::Weekly);

        engine.zoom(0.3).await; // 2.25 -> 0.675
        assert_eq!(engine.bar_unit(), BarUnit::Monthly);
        assert!((engine.x_factor() - 0.675).abs() < 1e-12);

        engine.zoom(10.0).await; // 6.75, monthly bars now too wide
        assert_eq!(engine.bar_unit(), BarUnit::Weekly);

        engine.zoom(3.0).await; // 20.25, weekly bars too wide
        assert_eq!(engine.bar_unit(), BarUnit::Daily);
    }

    #[tokio::test]
    async fn test_intraday_update_republishes() {
        let mut engine = engine_with_data().await;
        let before = engine.current_snapshot().unwrap();

        let newest = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        engine
            .handle_feed_event(
                7,
                FeedEvent::IntradayBar(Bar::new(newest, 10.0, 12.5, 9.8, 12.0, 500.0)),
            )
            .await
            .unwrap();

        let after = engine.current_snapshot().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.elements[0].last_price, 12.0);
    }

    #[tokio::test]
    async fn test_pan_republishes_shifted_window() {
        let engine = engine_with_data().await;
        let before = engine.current_snapshot().unwrap();

        engine.pan(5).await;
        let after = engine.current_snapshot().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_ne!(before.elements[0].points, after.elements[0].points);
    }
}
