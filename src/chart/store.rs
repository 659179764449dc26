//! Append-only store of raw daily bars for one security.
//!
//! Bars are held oldest to newest with strictly increasing dates. Older
//! history is prepended, newer history and intraday updates are appended
//! or replace the in-progress bar, and the oldest end is truncated once
//! the retention cap is exceeded. Every mutation bumps a revision counter
//! so dependents can decide between incremental and full recomputation.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::bar::Bar;
use crate::error::{ChartError, Result};

#[derive(Debug, Default)]
pub struct BarStore {
    /// Daily bars, oldest first
    bars: Vec<Bar>,
    /// Bumped on every mutation
    revision: u64,
    /// Bumped only by mutations that change more than the tail
    /// (prepend, truncation), forcing dependents to rebuild
    structural_revision: u64,
}

impl BarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn structural_revision(&self) -> u64 {
        self.structural_revision
    }

    pub fn oldest_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|bar| bar.date)
    }

    pub fn newest_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }

    /// Insert strictly older bars before the current oldest. The incoming
    /// batch must be ordered oldest first and end before the current oldest
    /// date, otherwise the whole batch is rejected and the store unchanged.
    pub fn prepend(&mut self, batch: Vec<Bar>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        check_batch_order(&batch)?;
        if let Some(oldest) = self.oldest_date() {
            let incoming_newest = batch[batch.len() - 1].date;
            if incoming_newest >= oldest {
                warn!(%incoming_newest, %oldest, "rejecting prepend that is not older than existing bars");
                return Err(ChartError::OutOfOrder(format!(
                    "prepend batch ends {incoming_newest}, store starts {oldest}"
                )));
            }
        }
        let count = batch.len();
        self.bars.splice(0..0, batch);
        self.revision += 1;
        self.structural_revision += 1;
        debug!(count, total = self.bars.len(), "prepended older bars");
        Ok(())
    }

    /// Insert strictly newer bars after the current newest, with the same
    /// ordering check as [`prepend`](Self::prepend).
    pub fn append(&mut self, batch: Vec<Bar>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        check_batch_order(&batch)?;
        if let Some(newest) = self.newest_date() {
            let incoming_oldest = batch[0].date;
            if incoming_oldest <= newest {
                warn!(%incoming_oldest, %newest, "rejecting append that is not newer than existing bars");
                return Err(ChartError::OutOfOrder(format!(
                    "append batch starts {incoming_oldest}, store ends {newest}"
                )));
            }
        }
        let count = batch.len();
        self.bars.extend(batch);
        self.revision += 1;
        debug!(count, total = self.bars.len(), "appended newer bars");
        Ok(())
    }

    /// Overwrite the in-progress bar for the current trading day, or append
    /// it if no bar exists for that date yet. Idempotent: repeated calls
    /// with updated OHLCV simply replace the previous values.
    pub fn replace_intraday(&mut self, bar: Bar) -> Result<()> {
        match self.bars.last_mut() {
            Some(last) if last.date == bar.date => {
                *last = bar;
                self.revision += 1;
                Ok(())
            }
            Some(last) if last.date > bar.date => {
                warn!(incoming = %bar.date, newest = %last.date, "rejecting stale intraday bar");
                Err(ChartError::OutOfOrder(format!(
                    "intraday bar {} older than newest {}",
                    bar.date, last.date
                )))
            }
            _ => {
                self.bars.push(bar);
                self.revision += 1;
                Ok(())
            }
        }
    }

    /// Replace the entire contents with a fresh batch. Used when a
    /// historical reload spans more than the stored range and splicing
    /// would be ambiguous.
    pub fn replace_all(&mut self, batch: Vec<Bar>) -> Result<()> {
        check_batch_order(&batch)?;
        let count = batch.len();
        self.bars = batch;
        self.revision += 1;
        self.structural_revision += 1;
        debug!(count, "replaced all bars");
        Ok(())
    }

    /// Drop bars from the oldest end until at most `max_bars` remain.
    /// Returns the new oldest date so dependents can invalidate caches
    /// keyed on the old boundary, or None if nothing was dropped.
    pub fn truncate_oldest(&mut self, max_bars: usize) -> Option<NaiveDate> {
        if self.bars.len() <= max_bars {
            return None;
        }
        let excess = self.bars.len() - max_bars;
        self.bars.drain(0..excess);
        self.revision += 1;
        self.structural_revision += 1;
        let boundary = self.oldest_date();
        debug!(dropped = excess, new_oldest = ?boundary, "truncated oldest bars");
        boundary
    }
}

/// Batches must be internally ordered oldest first with no duplicate dates.
fn check_batch_order(batch: &[Bar]) -> Result<()> {
    for pair in batch.windows(2) {
        if pair[0].date >= pair[1].date {
            return Err(ChartError::OutOfOrder(format!(
                "batch dates not strictly increasing at {}",
                pair[1].date
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(y: i32, m: u32, d: u32) -> Bar {
        Bar::new(NaiveDate::from_ymd_opt(y, m, d).unwrap(), 10.0, 11.0, 9.0, 10.5, 100.0)
    }

    #[test]
    fn test_append_then_prepend() {
        let mut store = BarStore::new();
        store.append(vec![bar(2023, 6, 14), bar(2023, 6, 15)]).unwrap();
        store.prepend(vec![bar(2023, 6, 12), bar(2023, 6, 13)]).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(store.oldest_date(), NaiveDate::from_ymd_opt(2023, 6, 12));
        assert_eq!(store.newest_date(), NaiveDate::from_ymd_opt(2023, 6, 15));
    }

    #[test]
    fn test_out_of_order_append_rejected() {
        let mut store = BarStore::new();
        store.append(vec![bar(2023, 6, 15)]).unwrap();
        let revision = store.revision();

        let result = store.append(vec![bar(2023, 6, 15)]);
        assert!(matches!(result, Err(ChartError::OutOfOrder(_))));
        // Store is left untouched
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_out_of_order_prepend_rejected() {
        let mut store = BarStore::new();
        store.append(vec![bar(2023, 6, 14)]).unwrap();
        assert!(store.prepend(vec![bar(2023, 6, 14)]).is_err());
        assert!(store.prepend(vec![bar(2023, 6, 13), bar(2023, 6, 12)]).is_err()); // misordered batch
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_intraday_is_idempotent() {
        let mut store = BarStore::new();
        store.append(vec![bar(2023, 6, 14)]).unwrap();

        let date = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
        store.replace_intraday(Bar::new(date, 10.0, 10.2, 9.9, 10.1, 500.0)).unwrap();
        assert_eq!(store.len(), 2);

        store.replace_intraday(Bar::new(date, 10.0, 10.6, 9.9, 10.5, 900.0)).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.bars()[1].close, 10.5);
    }

    #[test]
    fn test_truncate_oldest_returns_boundary() {
        let mut store = BarStore::new();
        store
            .append(vec![bar(2023, 6, 12), bar(2023, 6, 13), bar(2023, 6, 14), bar(2023, 6, 15)])
            .unwrap();
        let structural = store.structural_revision();

        let boundary = store.truncate_oldest(2);
        assert_eq!(boundary, NaiveDate::from_ymd_opt(2023, 6, 14));
        assert_eq!(store.len(), 2);
        assert!(store.structural_revision() > structural);

        assert_eq!(store.truncate_oldest(10), None);
    }

    #[test]
    fn test_append_only_keeps_structural_revision() {
        let mut store = BarStore::new();
        store.append(vec![bar(2023, 6, 14)]).unwrap();
        let structural = store.structural_revision();
        let revision = store.revision();

        store.append(vec![bar(2023, 6, 15)]).unwrap();
        assert_eq!(store.structural_revision(), structural);
        assert!(store.revision() > revision);
    }
}
