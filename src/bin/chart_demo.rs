//! Chart Engine - Demo Entry Point
//!
//! Wires the engine to a simulated bar feed, loads history for two
//! securities, pans and zooms, and logs what each published snapshot
//! contains. Run with RUST_LOG=debug for the engine's internal decisions.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chart_engine::chart::bar::is_weekday;
use chart_engine::engine::{BarFeed, FeedEvent, HistoryRequest};
use chart_engine::{Bar, ChartEngine, ChartError, ChartStyle, EngineConfig, Security};

/// Deterministic price feed: a slow ramp with a weekly wiggle, weekdays
/// only, the way a real provider would deliver daily bars.
struct SimulatedFeed;

#[async_trait]
impl BarFeed for SimulatedFeed {
    async fn query_bar_history(
        &self,
        security: &Security,
        req: HistoryRequest,
    ) -> chart_engine::Result<Vec<Bar>> {
        if req.start > req.end {
            return Err(ChartError::Fetch("empty date range".to_string()));
        }
        let base = 20.0 + security.id as f64 * 5.0;
        let mut bars = Vec::new();
        let mut date = req.start;
        let mut index = 0u64;
        while date <= req.end {
            if is_weekday(date) {
                let drift = base + index as f64 * 0.02;
                let wiggle = (index % 5) as f64 * 0.1;
                let open = drift + wiggle;
                let close = drift + 0.25 - wiggle;
                let high = open.max(close) + 0.3;
                let low = open.min(close) - 0.3;
                bars.push(Bar::new(date, open, high, low, close, 1_000_000.0));
                index += 1;
            }
            date = date
                .checked_add_days(Days::new(1))
                .ok_or_else(|| ChartError::Fetch("date overflow".to_string()))?;
        }
        Ok(bars)
    }
}

fn log_snapshot(engine: &ChartEngine, label: &str) {
    if let Some(snapshot) = engine.current_snapshot() {
        for elements in &snapshot.elements {
            let ticker = elements
                .security
                .as_ref()
                .map(|s| s.ticker.as_str())
                .unwrap_or("?");
            info!(
                label,
                ticker,
                points = elements.points.len(),
                candles = elements.up_bars.len()
                    + elements.filled_up_bars.len()
                    + elements.hollow_down_bars.len()
                    + elements.down_bars.len(),
                month_labels = elements.month_labels.len(),
                last_price = elements.last_price,
                "snapshot contents"
            );
        }
        info!(label, percent_change = snapshot.percent_change, "shared scale");
    }
}

#[tokio::main]
async fn main() -> chart_engine::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = chart_engine::VERSION, "chart engine demo");

    let config: EngineConfig = match chart_engine::config::SETTINGS.read() {
        Ok(settings) => settings.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };

    let feed = SimulatedFeed;
    let mut engine = ChartEngine::new(1, config);
    engine.resize(1024.0, 768.0).await;

    let mut apple = Security::new(1, "AAPL");
    apple.show_ma_short = true;
    let mut nvidia = Security::new(2, "NVDA");
    nvidia.style = ChartStyle::Close;

    engine.add_security(apple.clone());
    engine.add_security(nvidia.clone());

    let invalid_date = || ChartError::Fetch("invalid request date".to_string());
    let request = HistoryRequest {
        start: NaiveDate::from_ymd_opt(2022, 1, 3).ok_or_else(invalid_date)?,
        end: NaiveDate::from_ymd_opt(2023, 6, 30).ok_or_else(invalid_date)?,
    };
    for security in [&apple, &nvidia] {
        let event = match feed.query_bar_history(security, request).await {
            Ok(bars) => FeedEvent::HistoricalLoaded(bars),
            Err(err) => FeedEvent::Failed(err.to_string()),
        };
        engine.handle_feed_event(security.id, event).await?;
    }
    info!(unit = ?engine.bar_unit(), "period unit after load");
    log_snapshot(&engine, "loaded");

    engine.pan(10).await;
    log_snapshot(&engine, "panned");

    engine.zoom(0.3).await;
    info!(unit = ?engine.bar_unit(), x_factor = engine.x_factor(), "after zoom out");
    log_snapshot(&engine, "zoomed");

    if let Some(info) = engine.info_for_bar(5).await {
        info!(
            date = %info.bar.date,
            close = info.bar.close,
            up_close = info.up_close,
            "bar under finger"
        );
    }

    Ok(())
}
