use analysis_core::{
    AnalysisError, EnrichedSeries, ForecastResult, HistoryStore, PriceBar, PriceProvider, TimeRange,
};
use forecast_engine::ForecastEngine;
use polygon_client::PolygonClient;
use std::sync::Arc;
use technical_analysis::MetricsDeriver;

pub mod cache;
pub mod config;
pub mod fetch;
pub mod ranges;
pub mod store;
pub mod summary;
pub mod tickers;


pub use cache::SeriesCache;
pub use config::{CacheConfig, EngineConfig, RetryPolicy};
pub use fetch::{normalize_rows, HistoryFetcher, IntradayPoint};
pub use ranges::{ChartPoint, TableRow};
pub use store::SqliteHistoryStore;
pub use summary::{Comparison, RiskLabel, Summary};
pub use tickers::TickerResolver;

/// Entry point for every price query: resolves the symbol, serves the
/// enriched series from cache or refreshes it, then derives the view.
pub struct AnalysisOrchestrator {
    fetcher: HistoryFetcher,
    deriver: MetricsDeriver,
    forecaster: ForecastEngine,
    cache: SeriesCache,
    /// Optional durable record written through after each successful fetch
    store: Option<Arc<dyn HistoryStore>>,
    tickers: TickerResolver,
}

impl AnalysisOrchestrator {
    pub fn new(provider: Arc<dyn PriceProvider>, config: &EngineConfig) -> Self {
        Self {
            fetcher: HistoryFetcher::new(provider, config.retry, config.history_days),
            deriver: MetricsDeriver::new(),
            forecaster: ForecastEngine::new(),
            cache: SeriesCache::new(config.cache),
            store: None,
            tickers: TickerResolver::new(config.default_ticker_suffix.clone()),
        }
    }

    /// Orchestrator backed by Polygon. Requires `polygon_api_key`.
    pub fn with_polygon(config: &EngineConfig) -> Result<Self, AnalysisError> {
        let api_key = config
            .polygon_api_key
            .clone()
            .ok_or_else(|| AnalysisError::InvalidData("POLYGON_API_KEY is not set".to_string()))?;
        let client = PolygonClient::with_rate_limit(api_key, config.polygon_rate_limit);
        Ok(Self::new(Arc::new(client), config))
    }

    /// Set the History Store that receives every freshly fetched series
    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(&self) -> &SeriesCache {
        &self.cache
    }

    /// Enriched daily series for `symbol` (cached, TTL from config).
    pub async fn get_enriched_series(&self, symbol: &str) -> Result<Arc<EnrichedSeries>, AnalysisError> {
        let ticker = self.tickers.resolve(symbol)?;
        self.cache
            .get_or_refresh(&ticker, || self.refresh(&ticker))
            .await
    }

    pub async fn get_summary(&self, symbol: &str) -> Result<Summary, AnalysisError> {
        let series = self.get_enriched_series(symbol).await?;
        summary::build_summary(&series)
    }

    /// Next-bar forecast. Too little history is an unavailable forecast,
    /// not an error; an unknown ticker still is.
    pub async fn get_forecast(&self, symbol: &str) -> Result<ForecastResult, AnalysisError> {
        match self.get_enriched_series(symbol).await {
            Ok(series) => Ok(self.forecaster.forecast(&series)),
            Err(e @ AnalysisError::InsufficientHistory { .. }) => {
                tracing::info!("Forecast unavailable for {}: {}", symbol, e);
                Ok(ForecastResult::Unavailable { reason: e.to_string() })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_display_slice(&self, symbol: &str, range: TimeRange) -> Result<Vec<ChartPoint>, AnalysisError> {
        let series = self.get_enriched_series(symbol).await?;
        Ok(ranges::select_display(&series.bars, range))
    }

    pub async fn get_table_slice(&self, symbol: &str, range: TimeRange) -> Result<Vec<TableRow>, AnalysisError> {
        let series = self.get_enriched_series(symbol).await?;
        Ok(ranges::select_table(&series.bars, range))
    }

    /// Compare the recent mean daily return of two symbols. Both series are
    /// loaded concurrently.
    pub async fn compare(&self, first: &str, second: &str) -> Result<Comparison, AnalysisError> {
        let (a, b) = tokio::join!(self.get_enriched_series(first), self.get_enriched_series(second));
        let (a, b) = (a?, b?);

        let first = first.trim().to_ascii_uppercase();
        let second = second.trim().to_ascii_uppercase();
        Ok(summary::compare_series((first.as_str(), &*a), (second.as_str(), &*b)))
    }

    /// Today's 1-minute closes. Not cached.
    pub async fn get_intraday(&self, symbol: &str) -> Result<Vec<IntradayPoint>, AnalysisError> {
        let ticker = self.tickers.resolve(symbol)?;
        self.fetcher.fetch_intraday(&ticker).await
    }

    pub fn list_companies(&self) -> Vec<String> {
        self.tickers.list_companies()
    }

    async fn refresh(&self, ticker: &str) -> Result<EnrichedSeries, AnalysisError> {
        let raw = self.fetcher.fetch(ticker).await?;
        self.write_through(ticker, technical_analysis::clean(&raw));
        self.deriver.derive(&raw)
    }

    /// Fire-and-forget append to the History Store. Failures are logged only.
    fn write_through(&self, ticker: &str, bars: Vec<PriceBar>) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if bars.is_empty() {
            return;
        }

        let ticker = ticker.to_string();
        tokio::spawn(async move {
            match store.append(&ticker, &bars).await {
                Ok(inserted) => tracing::debug!("Persisted {} new bars for {}", inserted, ticker),
                Err(e) => tracing::warn!("Failed to persist history for {}: {}", ticker, e),
            }
        });
    }
}
