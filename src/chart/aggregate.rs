//! Aggregation of daily bars into weekly or monthly period bars.
//!
//! A fixed viewport can only resolve a bounded number of bars, so the
//! period unit is chosen per security from the requested date span. Daily
//! bars fold into buckets keyed by ISO week or calendar month; the current
//! partially filled bucket is provisional and gets replaced in place as
//! new daily bars close.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bar::Bar;
use super::store::BarStore;
use crate::config::EngineConfig;

/// Period unit for one aggregated bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarUnit {
    Daily,
    Weekly,
    Monthly,
}

impl BarUnit {
    /// Width of one period bar in day units, used by the coordinate
    /// mapper. Monthly bars are drawn slightly narrower than the 21
    /// trading days they cover.
    pub fn days_per_bar(self) -> f64 {
        match self {
            BarUnit::Daily => 1.0,
            BarUnit::Weekly => 5.0,
            BarUnit::Monthly => 19.0,
        }
    }

    /// Pick the finest unit whose period bar count for `span_days` trading
    /// days fits in `capacity` visible bars. Counts shrink monotonically
    /// with coarser units, so this is also the coarsest unit that still
    /// uses the viewport fully; ties prefer the finer unit.
    pub fn select(span_days: usize, capacity: usize, config: &EngineConfig) -> BarUnit {
        if span_days <= capacity {
            BarUnit::Daily
        } else if span_days.div_ceil(config.trading_days_per_week.max(1)) <= capacity {
            BarUnit::Weekly
        } else {
            BarUnit::Monthly
        }
    }
}

/// Bucket identity for a date under a given unit.
fn bucket_key(unit: BarUnit, date: NaiveDate) -> (i32, u32) {
    match unit {
        BarUnit::Daily => (date.year(), date.ordinal()),
        BarUnit::Weekly => {
            let week = date.iso_week();
            (week.year(), week.week())
        }
        BarUnit::Monthly => (date.year(), date.month()),
    }
}

/// Derives period bars from a [`BarStore`] on demand, recomputing only the
/// tail buckets when the store reports append-only growth.
#[derive(Debug)]
pub struct Aggregator {
    unit: BarUnit,
    /// Period bars, oldest first. `date` is the first trading day folded
    /// into each bucket.
    period: Vec<Bar>,
    seen_len: usize,
    seen_revision: u64,
    seen_structural: u64,
    force_full: bool,
}

impl Aggregator {
    pub fn new(unit: BarUnit) -> Self {
        Self {
            unit,
            period: Vec::new(),
            seen_len: 0,
            seen_revision: 0,
            seen_structural: 0,
            force_full: true,
        }
    }

    pub fn unit(&self) -> BarUnit {
        self.unit
    }

    /// Change the period unit. Returns true if it changed; the next
    /// [`update`](Self::update) will then rebuild from scratch.
    pub fn set_unit(&mut self, unit: BarUnit) -> bool {
        if unit == self.unit {
            return false;
        }
        self.unit = unit;
        self.force_full = true;
        true
    }

    pub fn period_bars(&self) -> &[Bar] {
        &self.period
    }

    /// Bring the period bars up to date with the store. Returns the first
    /// period index whose value may have changed, so indicator series can
    /// be extended from there; returns the current length when nothing
    /// changed at all.
    pub fn update(&mut self, store: &BarStore) -> usize {
        let daily = store.bars();
        let full = self.force_full
            || store.structural_revision() != self.seen_structural
            || daily.len() < self.seen_len;

        if !full && store.revision() == self.seen_revision {
            return self.period.len();
        }

        let dirty_from = if full {
            self.period.clear();
            self.fold(daily, 0);
            debug!(unit = ?self.unit, bars = self.period.len(), "full aggregation rebuild");
            0
        } else if daily.len() == self.seen_len {
            // The newest daily bar was replaced in place (intraday update),
            // so refold its whole bucket.
            let mut start = self.seen_len - 1;
            let key = bucket_key(self.unit, daily[start].date);
            while start > 0 && bucket_key(self.unit, daily[start - 1].date) == key {
                start -= 1;
            }
            while self.period.last().map(|bar| bucket_key(self.unit, bar.date)) == Some(key) {
                self.period.pop();
            }
            let dirty = self.period.len();
            self.fold(daily, start);
            dirty
        } else {
            // Append-only growth: fold only the new daily bars. If the
            // first new bar lands in the provisional tail bucket, that
            // bucket is replaced rather than appended to.
            let mut dirty = self.period.len();
            let first_new_key = bucket_key(self.unit, daily[self.seen_len].date);
            if self.period.last().map(|bar| bucket_key(self.unit, bar.date)) == Some(first_new_key) {
                dirty -= 1;
            }
            self.fold(daily, self.seen_len);
            dirty
        };

        self.seen_len = daily.len();
        self.seen_revision = store.revision();
        self.seen_structural = store.structural_revision();
        self.force_full = false;
        dirty_from
    }

    /// Fold daily bars from `from` onward into the period bars, merging
    /// into the trailing bucket where the keys match.
    fn fold(&mut self, daily: &[Bar], from: usize) {
        for bar in &daily[from..] {
            let key = bucket_key(self.unit, bar.date);
            match self.period.last_mut() {
                Some(current) if bucket_key(self.unit, current.date) == key => {
                    current.high = current.high.max(bar.high);
                    current.low = current.low.min(bar.low);
                    current.close = bar.close;
                    current.adj_close = bar.adj_close;
                    current.volume += bar.volume;
                }
                _ => self.period.push(*bar),
            }
        }
    }
}
