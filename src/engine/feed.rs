//! Feed boundary for connecting the engine to a bar data source.
//!
//! Fetching itself lives outside this crate; the engine only consumes
//! [`FeedEvent`]s the fetch collaborator delivers per security.

use async_trait::async_trait;

use crate::chart::bar::{Bar, Security};
use crate::error::Result;

/// A span of daily history to request, newest request first in practice:
/// the initial load asks for the full span, later requests extend either
/// end of what the store already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

/// What the fetch collaborator reports back for one security.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A batch of completed daily bars, ordered oldest first
    HistoricalLoaded(Vec<Bar>),
    /// The in-progress bar for the current session
    IntradayBar(Bar),
    /// Fetch failed; bars stay at last known good
    Failed(String),
    /// Fetch canceled; nothing changes, no error surfaced
    Canceled,
}

/// Abstract bar source trait for connecting to different data providers.
#[async_trait]
pub trait BarFeed: Send + Sync {
    /// Query daily history for one security.
    async fn query_bar_history(&self, security: &Security, req: HistoryRequest)
        -> Result<Vec<Bar>>;

    /// Query the in-progress bar for the current session, if the market
    /// is open. Default: no intraday source.
    async fn query_intraday(&self, _security: &Security) -> Result<Option<Bar>> {
        Ok(None)
    }
}

/// Empty feed implementation for when no data source is configured.
#[derive(Debug, Default)]
pub struct EmptyFeed;

impl EmptyFeed {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BarFeed for EmptyFeed {
    async fn query_bar_history(
        &self,
        security: &Security,
        _req: HistoryRequest,
    ) -> Result<Vec<Bar>> {
        tracing::warn!(ticker = %security.ticker, "no bar feed configured");
        Err(crate::error::ChartError::Fetch(
            "no bar feed configured".to_string(),
        ))
    }
}
