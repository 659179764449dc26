//! Engine configuration.
//!
//! All tunables that the chart engine does not derive from data: indicator
//! window lengths, the retention cap for daily bars, and the trading-day
//! estimate used when selecting a period unit for a date span.

use std::path::Path;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Global settings instance, initialized with defaults.
/// Call [`EngineConfig::load`] and replace the contents to use a file.
pub static SETTINGS: Lazy<RwLock<EngineConfig>> = Lazy::new(|| RwLock::new(EngineConfig::default()));

/// Tunable parameters for the chart engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Short moving average window (bars)
    pub ma_short: usize,
    /// Long moving average window (bars)
    pub ma_long: usize,
    /// Bollinger band window (bars)
    pub bollinger_window: usize,
    /// Bollinger band width in standard deviations
    pub bollinger_k: f64,
    /// Maximum daily bars retained per security before the oldest are dropped
    pub retention_cap: usize,
    /// Trading days per ISO week, used to estimate weekly bar counts
    /// when selecting a period unit
    pub trading_days_per_week: usize,
    /// Default width factor for one bar in pixels
    pub default_x_factor: f64,
    /// Width in points reserved for one y-axis
    pub axis_width: f64,
    /// Height in pixels of the volume strip at the chart bottom
    pub volume_height: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ma_short: 50,
            ma_long: 200,
            bollinger_window: 20,
            bollinger_k: 2.0,
            retention_cap: 5000,
            trading_days_per_week: 5,
            default_x_factor: 7.5,
            axis_width: 30.0,
            volume_height: 80.0,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. Missing keys fall back to
    /// defaults via serde.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}
