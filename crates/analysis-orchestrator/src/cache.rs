use analysis_core::{AnalysisError, EnrichedSeries};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use crate::config::CacheConfig;

type RefreshOutcome = Result<Arc<EnrichedSeries>, AnalysisError>;

/// Cached series with the time it was fetched. Replaced whole on refresh.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub series: Arc<EnrichedSeries>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: std::time::Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

/// Per-ticker TTL cache of enriched series with single-flight refresh.
pub struct SeriesCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
    /// Outcome slot of the refresh currently running for a ticker. Every
    /// caller that finds a slot joins it instead of starting its own fetch.
    in_flight: DashMap<String, Arc<OnceCell<RefreshOutcome>>>,
}

/// Drops the in-flight slot once it holds an outcome, or once nobody is
/// left waiting on it (the refreshing caller was cancelled).
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, Arc<OnceCell<RefreshOutcome>>>,
    ticker: &'a str,
    slot: Arc<OnceCell<RefreshOutcome>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        // Handing out a slot clone takes the shard lock, so the count is stable here
        self.in_flight.remove_if(self.ticker, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && (slot.initialized() || Arc::strong_count(slot) <= 2)
        });
    }
}

impl SeriesCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Fresh entry for `ticker`, if any. Never blocks on a running refresh.
    pub fn get(&self, ticker: &str) -> Option<Arc<EnrichedSeries>> {
        let entry = self.entries.get(ticker)?;
        if entry.is_fresh(self.config.ttl, Instant::now()) {
            Some(entry.series.clone())
        } else {
            None
        }
    }

    /// Publish a new series for `ticker`, superseding any previous entry.
    pub fn put(&self, ticker: &str, series: EnrichedSeries) -> Arc<EnrichedSeries> {
        let series = Arc::new(series);
        self.entries.insert(
            ticker.to_string(),
            CacheEntry {
                series: series.clone(),
                fetched_at: Instant::now(),
            },
        );
        self.enforce_capacity(ticker);
        series
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the fresh entry or run `refresh` to produce one. Concurrent
    /// callers for the same ticker share one refresh and all receive its
    /// outcome, error included; other tickers are unaffected. If the caller
    /// running the refresh is dropped, a waiting caller takes it over.
    pub async fn get_or_refresh<F, Fut>(&self, ticker: &str, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EnrichedSeries, AnalysisError>>,
    {
        if let Some(hit) = self.get(ticker) {
            tracing::debug!("Cache hit for {}", ticker);
            return Ok(hit);
        }

        let slot = self
            .in_flight
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            ticker,
            slot,
        };

        let outcome = guard
            .slot
            .get_or_init(|| async {
                // Published by a refresh that finished just before this slot was created
                if let Some(hit) = self.get(ticker) {
                    return Ok(hit);
                }
                tracing::info!("Cache miss for {}, refreshing", ticker);
                let outcome = refresh().await.map(|series| self.put(ticker, series));
                if let Err(e) = &outcome {
                    tracing::warn!("Refresh for {} failed: {}", ticker, e);
                }
                outcome
            })
            .await
            .clone();

        drop(guard);
        outcome
    }

    /// Drop the stalest entries while above `max_entries`, never the one just written.
    fn enforce_capacity(&self, keep: &str) {
        if self.config.max_entries == 0 {
            return;
        }
        while self.entries.len() > self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .filter(|e| e.key() != keep)
                .min_by_key(|e| e.value().fetched_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    tracing::debug!("Cache full, evicting {}", key);
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
