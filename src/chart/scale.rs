//! Shared min/max tracking across the securities of a comparison.
//!
//! Every security contributes the extrema of its visible window for each
//! metric key; the resulting single range per key is what lets multiple
//! securities render on a common y-axis. Access is serialized by the
//! owning engine, which wraps the scaler in a mutex.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ComparisonScaler {
    min_values: HashMap<String, f64>,
    max_values: HashMap<String, f64>,
}

impl ComparisonScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all tracked extrema before a full re-scan, e.g. after pan or
    /// zoom changed every security's visible window.
    pub fn reset_min_max(&mut self) {
        self.min_values.clear();
        self.max_values.clear();
    }

    /// Fold one value into the running extrema for `key`. Non-finite
    /// values never contribute. The first contribution seeds the minimum
    /// at zero (or the value itself when negative) so bar-style metrics
    /// scale down to their baseline.
    pub fn update_min_max(&mut self, key: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        match self.min_values.get_mut(key) {
            Some(min) => {
                if value < *min {
                    *min = value;
                }
                if let Some(max) = self.max_values.get_mut(key) {
                    if value > *max {
                        *max = value;
                    }
                }
            }
            None => {
                self.min_values.insert(key.to_string(), value.min(0.0));
                self.max_values.insert(key.to_string(), value);
            }
        }
    }

    /// Range from the max down to zero or the min, whichever yields the
    /// bigger span. Returns NaN when no security contributed a finite
    /// value; callers must check before dividing.
    pub fn range_for_key(&self, key: &str) -> f64 {
        match (self.max_values.get(key), self.min_values.get(key)) {
            (Some(&max), Some(&min)) => {
                if max > 0.0 {
                    max - min.min(0.0)
                } else {
                    -min
                }
            }
            _ => f64::NAN,
        }
    }

    pub fn min_for_key(&self, key: &str) -> Option<f64> {
        self.min_values.get(key).copied()
    }

    pub fn max_for_key(&self, key: &str) -> Option<f64> {
        self.max_values.get(key).copied()
    }
}
