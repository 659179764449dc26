//! Projection from period bars and indicator values to pixel geometry.
//!
//! The mapper is a pure function of the viewport parameters: the engine
//! computes scale factors per security, then projection walks the visible
//! window oldest to newest emitting points and rects into a
//! [`ChartElements`]. Newest bar is rightmost; display index 0 is the
//! newest bar and grows toward older bars.

use chrono::Datelike;
use tracing::trace;

use super::aggregate::BarUnit;
use super::bar::{Bar, ChartStyle, Security};
use super::elements::{ChartElements, Point, Rect};
use super::indicator::IndicatorSeries;

/// Snap a coordinate so a 1px stroke centers on a pixel boundary.
/// `align_to` is the sub-pixel offset, 0.5 for bitmap contexts. Values
/// already on the grid pass through; everything else moves by at most
/// `align_to` onto the grid. Non-positive `align_to` disables alignment.
pub fn px_align(raw: f64, align_to: f64) -> f64 {
    if align_to <= 0.0 {
        return raw;
    }
    let fract = raw % 1.0;
    if fract == align_to {
        raw
    } else {
        raw - fract + align_to
    }
}

/// Viewport parameters shared by every security in a comparison.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    pub px_width: f64,
    pub px_height: f64,
    /// Horizontal pixels per period bar
    pub x_factor: f64,
    pub bar_unit: BarUnit,
    /// Height of the volume strip at the bottom of the chart
    pub volume_height: f64,
}

/// Visible window in display indices: 0 is the newest bar, larger is
/// older. `oldest_shown` may exceed the available bar count when the user
/// panned past the start of history; projection leaves that gap blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleWindow {
    pub oldest_shown: usize,
    pub newest_shown: usize,
}

impl CoordinateMapper {
    pub fn new(px_width: f64, px_height: f64, x_factor: f64, volume_height: f64) -> Self {
        Self {
            px_width,
            px_height,
            x_factor,
            bar_unit: BarUnit::Daily,
            volume_height,
        }
    }

    /// Bottom of the price pane; volume bars grow upward from here.
    pub fn volume_base(&self) -> f64 {
        self.px_height
    }

    /// Vertical pixels available to the price pane.
    pub fn chart_base(&self) -> f64 {
        (self.px_height - self.volume_height).max(1.0)
    }

    /// How many period bars fit in the viewport at the current zoom.
    pub fn capacity(&self) -> usize {
        if self.x_factor <= 0.0 {
            return 0;
        }
        (self.px_width / self.x_factor).floor() as usize
    }

    /// Fill `elements` with the geometry for the visible window. The
    /// scalars (`y_factor`, `max_high`, `scaled_low`) must already be set
    /// from the visible-window extrema; projection only reads them.
    /// `daily_len` is the raw daily bar count, used to shorten month
    /// labels when bars are grouped or narrow. `max_volume` is the
    /// largest visible volume, scaling the volume strip.
    #[allow(clippy::too_many_arguments)]
    pub fn project(
        &self,
        security: &Security,
        period: &[Bar],
        daily_len: usize,
        indicators: &IndicatorSeries,
        window: VisibleWindow,
        max_volume: f64,
        elements: &mut ChartElements,
    ) {
        elements.clear();
        if period.is_empty() || window.oldest_shown < 1 {
            return;
        }

        let last = period.len() - 1;
        let oldest_valid = window.oldest_shown.min(last);
        // Leave a blank gap on the left when panned past available history
        let mut x_raw = self.x_factor / 2.0
            + self.x_factor * (window.oldest_shown - oldest_valid) as f64;

        let bar_at = |display: usize| &period[last - display];

        // Prior close seeds the up/down coloring; with no older bar the
        // oldest bar's open stands in for it.
        let mut prior_close = if oldest_valid < last {
            bar_at(oldest_valid + 1).close
        } else {
            bar_at(oldest_valid).open
        };

        elements.y_floor = elements.y_factor * elements.max_high;
        let y_floor = elements.y_floor;
        let y_factor = elements.y_factor;
        let y = |value: f64| y_floor - y_factor * value;

        let volume_factor = if max_volume > 0.0 {
            max_volume / self.volume_height
        } else {
            1.0
        };
        let grouped = period.len() < daily_len;
        let mut last_month = bar_at(oldest_valid).date.month0();

        trace!(
            ticker = %security.ticker,
            oldest = oldest_valid,
            newest = window.newest_shown,
            "projecting visible window"
        );

        for display in (window.newest_shown..=oldest_valid).rev() {
            let bar = bar_at(display);
            let bar_center = px_align(x_raw, 0.5);

            let month = bar.date.month0();
            if month != last_month {
                self.push_month_marker(bar, grouped, bar_center, elements);
            }
            last_month = month;

            let down = prior_close > bar.close;
            match security.style {
                ChartStyle::Ohlc | ChartStyle::Hlc => {
                    let run = if down { &mut elements.down_points } else { &mut elements.points };
                    if security.style == ChartStyle::Ohlc {
                        run.push(Point::new(bar_center - self.x_factor / 2.0, y(bar.open)));
                        run.push(Point::new(bar_center, y(bar.open)));
                    }
                    run.push(Point::new(bar_center, y(bar.high)));
                    run.push(Point::new(bar_center, y(bar.low)));
                    run.push(Point::new(bar_center, y(bar.close)));
                    run.push(Point::new(bar_center + self.x_factor / 2.0, y(bar.close)));
                }
                ChartStyle::Candle => {
                    self.push_candle(bar, down, bar_center, y_floor, y_factor, elements);
                }
                ChartStyle::Close => {
                    elements.points.push(Point::new(bar_center, y(bar.close)));
                }
            }

            let storage = last - display;
            if security.show_ma_short {
                if let Some(Some(value)) = indicators.ma_short.get(storage) {
                    elements.ma_short.push(Point::new(bar_center, y(*value)));
                }
            }
            if security.show_ma_long {
                if let Some(Some(value)) = indicators.ma_long.get(storage) {
                    elements.ma_long.push(Point::new(bar_center, y(*value)));
                }
            }
            if security.show_bollinger {
                if let (Some(Some(upper)), Some(Some(middle)), Some(Some(lower))) = (
                    indicators.boll_upper.get(storage),
                    indicators.boll_middle.get(storage),
                    indicators.boll_lower.get(storage),
                ) {
                    elements.upper_bollinger.push(Point::new(bar_center, y(*upper)));
                    elements.middle_bollinger.push(Point::new(bar_center, y(*middle)));
                    elements.lower_bollinger.push(Point::new(bar_center, y(*lower)));
                }
            }

            if bar.volume > 0.0 {
                let rect = Rect::new(
                    bar_center - self.x_factor / 2.0,
                    self.volume_base(),
                    self.x_factor,
                    -bar.volume / volume_factor,
                );
                if down {
                    elements.down_volume.push(rect);
                } else {
                    elements.up_volume.push(rect);
                }
            }

            prior_close = bar.close;
            // Advance by the unaligned step or the chart ends short
            x_raw += self.x_factor;
        }
    }

    /// Month boundary line plus a label, shortened as bars get narrow.
    /// January shows the year; monthly grouping shows only years.
    fn push_month_marker(
        &self,
        bar: &Bar,
        grouped: bool,
        bar_center: f64,
        elements: &mut ChartElements,
    ) {
        let label = if bar.date.month0() == 0 {
            let short_year = (bar.date.year() % 100).to_string();
            if grouped || self.x_factor < 4.0 {
                short_year
            } else {
                format!("{}{}", bar.month_name(), short_year)
            }
        } else if self.bar_unit.days_per_bar() > 5.0 {
            // Monthly bars: year markers only
            String::new()
        } else if grouped || self.x_factor < 2.0 {
            bar.month_name()[..1].to_string()
        } else {
            bar.month_name().to_string()
        };

        if !label.is_empty() {
            elements.month_labels.push(label);
            elements.month_lines.push(Point::new(bar_center - 2.0, 0.0));
            elements.month_lines.push(Point::new(bar_center - 2.0, self.volume_base()));
        }
    }

    fn push_candle(
        &self,
        bar: &Bar,
        down: bool,
        bar_center: f64,
        y_floor: f64,
        y_factor: f64,
        elements: &mut ChartElements,
    ) {
        let y = |value: f64| y_floor - y_factor * value;
        let mut body_height = y_factor * (bar.open - bar.close);
        if body_height.abs() < 1.0 {
            // 1px minimum body so dojis stay visible
            body_height = if body_height > 0.0 { 1.0 } else { -1.0 };
        }
        let body = Rect::new(
            bar_center - self.x_factor * 0.4,
            y(bar.open),
            0.8 * self.x_factor,
            body_height,
        );

        if bar.open >= bar.close {
            // Filled body; wick is the full high-low span
            let wick = [Point::new(bar_center, y(bar.high)), Point::new(bar_center, y(bar.low))];
            if down {
                elements.down_bars.push(body);
                elements.down_points.extend_from_slice(&wick);
            } else {
                elements.filled_up_bars.push(body);
                elements.points.extend_from_slice(&wick);
            }
        } else {
            // Hollow body; wick drawn in two segments around the body
            let wick = [
                Point::new(bar_center, y(bar.high)),
                Point::new(bar_center, y(bar.close)),
                Point::new(bar_center, y(bar.open)),
                Point::new(bar_center, y(bar.low)),
            ];
            if down {
                elements.hollow_down_bars.push(body);
                elements.down_points.extend_from_slice(&wick);
            } else {
                elements.up_bars.push(body);
                elements.points.extend_from_slice(&wick);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::indicator::{IndicatorEngine, IndicatorParams};
    use chrono::{Days, NaiveDate};

    fn bars(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let date = start.checked_add_days(Days::new(i as u64)).unwrap();
                Bar::new(date, close, close + 1.0, close - 1.0, close, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_px_align_zero_is_identity() {
        assert_eq!(px_align(13.37, 0.0), 13.37);
        assert_eq!(px_align(13.37, -0.5), 13.37);
    }

    #[test]
    fn test_px_align_lands_on_grid() {
        for &raw in &[0.0, 0.1, 3.49, 3.5, 3.51, 100.999] {
            for &align in &[0.25, 0.5, 0.75] {
                let aligned = px_align(raw, align);
                // Result sits exactly on the align offset
                assert_eq!(aligned % 1.0, align, "raw={raw} align={align}");
                // and never moves more than a pixel
                let bound = align.max(1.0 - align);
                assert!((aligned - raw).abs() <= bound, "raw={raw} align={align}");
            }
        }
    }

    #[test]
    fn test_px_align_fixed_point() {
        assert_eq!(px_align(7.5, 0.5), 7.5);
        assert_eq!(px_align(7.0, 0.5), 7.5);
        assert_eq!(px_align(7.9, 0.5), 7.5);
    }

    #[test]
    fn test_close_style_emits_one_point_per_visible_bar() {
        let period = bars(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let mapper = CoordinateMapper::new(320.0, 240.0, 8.0, 40.0);
        let mut security = Security::new(1, "TEST");
        security.style = ChartStyle::Close;

        let mut elements = ChartElements::new(security.clone());
        elements.y_factor = 10.0;
        elements.max_high = 15.0;
        let window = VisibleWindow { oldest_shown: 3, newest_shown: 0 };
        let indicators = IndicatorSeries::default();
        mapper.project(&security, &period, period.len(), &indicators, window, 1000.0, &mut elements);

        // Display indices 3..=0 are four bars
        assert_eq!(elements.points.len(), 4);
        // Newest bar is rightmost
        let xs: Vec<f64> = elements.points.iter().map(|p| p.x).collect();
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        // y decreases as close rises
        let ys: Vec<f64> = elements.points.iter().map(|p| p.y).collect();
        assert!(ys.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_candle_bucket_split() {
        // open >= close with rising prior close: filled up bar
        // open < close with falling prior close: hollow down bar
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let day = |i: u64| start.checked_add_days(Days::new(i)).unwrap();
        let period = vec![
            Bar::new(day(0), 10.0, 11.0, 9.0, 10.0, 100.0),
            Bar::new(day(1), 12.0, 13.0, 11.0, 11.0, 100.0), // up vs prior, filled
            Bar::new(day(2), 9.0, 11.0, 8.0, 10.0, 100.0),   // down vs prior, hollow
            Bar::new(day(3), 10.0, 13.0, 10.0, 12.0, 100.0), // up vs prior, hollow
        ];
        let mapper = CoordinateMapper::new(320.0, 240.0, 8.0, 40.0);
        let security = Security::new(1, "TEST");

        let mut elements = ChartElements::new(security.clone());
        elements.y_factor = 10.0;
        elements.max_high = 14.0;
        let window = VisibleWindow { oldest_shown: 2, newest_shown: 0 };
        let indicators = IndicatorSeries::default();
        mapper.project(&security, &period, period.len(), &indicators, window, 100.0, &mut elements);

        assert_eq!(elements.filled_up_bars.len(), 1);
        assert_eq!(elements.hollow_down_bars.len(), 1);
        assert_eq!(elements.up_bars.len(), 1);
        assert!(elements.down_bars.is_empty());
        assert_eq!(elements.up_volume.len(), 2);
        assert_eq!(elements.down_volume.len(), 1);
    }

    #[test]
    fn test_indicator_polylines_skip_undefined_slots() {
        let period = bars(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut engine = IndicatorEngine::new(IndicatorParams {
            ma_short: 3,
            ma_long: 200,
            bollinger_window: 20,
            bollinger_k: 2.0,
        });
        engine.compute(&period);

        let mapper = CoordinateMapper::new(320.0, 240.0, 8.0, 40.0);
        let mut security = Security::new(1, "TEST");
        security.show_ma_short = true;

        let mut elements = ChartElements::new(security.clone());
        elements.y_factor = 10.0;
        elements.max_high = 7.0;
        let window = VisibleWindow { oldest_shown: 5, newest_shown: 0 };
        mapper.project(&security, &period, period.len(), engine.series(), window, 1000.0, &mut elements);

        // Six bars visible but the 3-bar MA is defined on four of them
        assert_eq!(elements.ma_short.len(), 4);
    }

    #[test]
    fn test_pan_past_history_leaves_left_gap() {
        let period = bars(&[10.0, 11.0]);
        let mapper = CoordinateMapper::new(320.0, 240.0, 8.0, 40.0);
        let mut security = Security::new(1, "TEST");
        security.style = ChartStyle::Close;

        let mut elements = ChartElements::new(security.clone());
        elements.y_factor = 10.0;
        elements.max_high = 12.0;
        // Window claims 5 bars but only 2 exist
        let window = VisibleWindow { oldest_shown: 5, newest_shown: 0 };
        let indicators = IndicatorSeries::default();
        mapper.project(&security, &period, period.len(), &indicators, window, 1000.0, &mut elements);

        assert_eq!(elements.points.len(), 2);
        // First bar drawn 4 slots to the right of the window start
        assert!(elements.points[0].x > 4.0 * mapper.x_factor);
    }

    #[test]
    fn test_january_boundary_gets_year_label() {
        let start = NaiveDate::from_ymd_opt(2022, 12, 28).unwrap();
        let period: Vec<Bar> = (0..8)
            .map(|i| {
                let date = start.checked_add_days(Days::new(i)).unwrap();
                Bar::new(date, 10.0, 11.0, 9.0, 10.0, 100.0)
            })
            .collect();
        let mapper = CoordinateMapper::new(320.0, 240.0, 8.0, 40.0);
        let mut security = Security::new(1, "TEST");
        security.style = ChartStyle::Close;

        let mut elements = ChartElements::new(security.clone());
        elements.y_factor = 10.0;
        elements.max_high = 12.0;
        let window = VisibleWindow { oldest_shown: 7, newest_shown: 0 };
        let indicators = IndicatorSeries::default();
        mapper.project(&security, &period, period.len(), &indicators, window, 1000.0, &mut elements);

        assert_eq!(elements.month_labels, vec!["Jan23".to_string()]);
        assert_eq!(elements.month_lines.len(), 2);
    }
}
