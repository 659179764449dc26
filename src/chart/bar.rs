//! Price bar and series identity types.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One OHLCV record for a single trading day, or the in-progress intraday
/// bar for the current session. Period bars produced by aggregation reuse
/// this shape with `date` set to the first trading day of the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            adj_close: close,
            volume,
        }
    }

    /// Checks the bar invariant: low <= open, close <= high and volume >= 0.
    pub fn is_valid(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.open <= self.high
            && self.close <= self.high
            && self.volume >= 0.0
    }

    /// Short month name for axis labels, e.g. "Jan".
    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[self.date.month0() as usize]
    }
}

/// Returns true for Monday through Friday. Bar stores only ever contain
/// weekday bars; holidays are absent because the fetch collaborator never
/// delivers them.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// How a security is drawn on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartStyle {
    Candle,
    Ohlc,
    Hlc,
    Close,
}

/// Identity and display options for one security in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// Stable numeric id
    pub id: i64,
    pub ticker: String,
    /// Display color as RGB
    pub color: [u8; 3],
    pub style: ChartStyle,
    /// Start offset in days used to align this security with the others
    /// in a comparison on a common base date for percent change
    pub days_ago: i64,
    pub show_ma_short: bool,
    pub show_ma_long: bool,
    pub show_bollinger: bool,
}

impl Security {
    pub fn new(id: i64, ticker: &str) -> Self {
        Self {
            id,
            ticker: ticker.to_string(),
            color: [0, 153, 51],
            style: ChartStyle::Candle,
            days_ago: 0,
            show_ma_short: false,
            show_ma_long: false,
            show_bollinger: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_validity() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
        assert!(Bar::new(date, 100.0, 105.0, 95.0, 102.0, 1000.0).is_valid());
        // high below close
        assert!(!Bar::new(date, 100.0, 101.0, 95.0, 102.0, 1000.0).is_valid());
        // negative volume
        assert!(!Bar::new(date, 100.0, 105.0, 95.0, 102.0, -1.0).is_valid());
    }

    #[test]
    fn test_month_name() {
        let bar = Bar::new(NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), 1.0, 1.0, 1.0, 1.0, 0.0);
        assert_eq!(bar.month_name(), "Jan");
    }

    #[test]
    fn test_is_weekday() {
        assert!(is_weekday(NaiveDate::from_ymd_opt(2023, 6, 15).unwrap())); // Thursday
        assert!(!is_weekday(NaiveDate::from_ymd_opt(2023, 6, 17).unwrap())); // Saturday
    }
}
