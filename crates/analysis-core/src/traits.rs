use async_trait::async_trait;
use crate::{AnalysisError, HistoryWindow, Interval, PriceBar, ProviderRow};

/// Upstream market-data source. May return an empty or oddly shaped result
/// at any time; callers are expected to retry.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch(
        &self,
        ticker: &str,
        window: HistoryWindow,
        interval: Interval,
    ) -> Result<Vec<ProviderRow>, AnalysisError>;
}

/// Durable append-only record of daily bars keyed by (ticker, date).
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ensures the schema exists. Safe to call repeatedly.
    async fn init(&self) -> Result<(), AnalysisError>;

    /// Appends bars, silently skipping dates already stored for the ticker.
    /// Returns the number of newly written rows.
    async fn append(&self, ticker: &str, bars: &[PriceBar]) -> Result<u64, AnalysisError>;
}
