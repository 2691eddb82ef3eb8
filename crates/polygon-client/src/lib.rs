use analysis_core::{AnalysisError, HistoryWindow, Interval, PriceProvider, ProviderRow};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            let oldest = match ts.front() {
                Some(&oldest) if ts.len() >= self.max_requests => oldest,
                _ => {
                    ts.push_back(now);
                    return;
                }
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    /// Client allowing at most `requests_per_minute` requests in any 60 s window.
    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// Point the client at a different host (proxies, recorded fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send one rate-limited request. A 429 is reported as a transient
    /// failure right away; retrying is left to the caller's policy.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, AnalysisError> {
        self.rate_limiter.acquire().await;
        let response = builder
            .send()
            .await
            .map_err(|e| AnalysisError::TransientProvider(e.to_string()))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Polygon 429 rate limited");
            return Err(AnalysisError::TransientProvider("Rate limited by Polygon (HTTP 429)".to_string()));
        }
        Ok(response)
    }

    /// Get aggregate rows for a symbol, leaving the per-row fields untyped so
    /// the caller decides what a usable bar is.
    pub async fn get_aggregate_rows(
        &self,
        symbol: &str,
        window: HistoryWindow,
        interval: Interval,
    ) -> Result<Vec<ProviderRow>, AnalysisError> {
        let (multiplier, timespan) = interval.multiplier_and_span();
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            symbol,
            multiplier,
            timespan,
            window.from.format("%Y-%m-%d"),
            window.to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(AnalysisError::TransientProvider(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::TransientProvider(e.to_string()))?;
        parse_aggregates(&body)
    }
}

#[async_trait]
impl PriceProvider for PolygonClient {
    async fn fetch(
        &self,
        ticker: &str,
        window: HistoryWindow,
        interval: Interval,
    ) -> Result<Vec<ProviderRow>, AnalysisError> {
        self.get_aggregate_rows(ticker, window, interval).await
    }
}

/// Decode an aggregates body into provider rows. Rows without a usable
/// timestamp are skipped; everything else is passed through verbatim.
fn parse_aggregates(body: &str) -> Result<Vec<ProviderRow>, AnalysisError> {
    let agg_response: AggregateResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::TransientProvider(format!("Malformed aggregates body: {}", e)))?;

    let mut rows = Vec::with_capacity(agg_response.results.len());
    for mut fields in agg_response.results {
        let Some(timestamp) = fields
            .remove("t")
            .and_then(|t| t.as_i64())
            .and_then(DateTime::from_timestamp_millis)
        else {
            tracing::debug!("Skipping aggregate row without timestamp");
            continue;
        };
        rows.push(ProviderRow { timestamp, fields });
    }
    Ok(rows)
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<serde_json::Map<String, serde_json::Value>>,
}
