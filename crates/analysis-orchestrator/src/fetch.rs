use analysis_core::{
    AnalysisError, HistoryWindow, Interval, PriceProvider, PriceSeries, ProviderRow, RawBar,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    const ALL: [Field; 5] = [Field::Open, Field::High, Field::Low, Field::Close, Field::Volume];

    fn name(&self) -> &'static str {
        match self {
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }
}

/// Map a provider column name onto one of the OHLCV fields.
///
/// Accepts plain (`Close`), abbreviated (`c`) and multi-level names
/// (`('Close', 'AAPL')`, `Close|AAPL`), keeping only the first level.
fn canonical_field(column: &str) -> Option<Field> {
    let trimmed = column
        .trim()
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']']);
    let first = trimmed
        .split([',', '|', ':'])
        .next()?
        .trim()
        .trim_matches(['\'', '"'])
        .trim();

    match first.to_ascii_lowercase().as_str() {
        "open" | "o" => Some(Field::Open),
        "high" | "h" => Some(Field::High),
        "low" | "l" => Some(Field::Low),
        "close" | "c" => Some(Field::Close),
        "volume" | "vol" | "v" => Some(Field::Volume),
        _ => None,
    }
}

/// Coerce a JSON value to a finite float. Numeric strings are accepted.
fn coerce(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn field_value(row: &ProviderRow, field: Field) -> Option<f64> {
    row.fields
        .iter()
        .filter(|(column, _)| canonical_field(column) == Some(field))
        .find_map(|(_, value)| coerce(value))
}

/// Normalize provider rows into a date-ordered series of OHLCV bars.
///
/// An empty result, or one where any of the five fields never appears, is
/// reported as a transient provider error so the caller can retry.
pub fn normalize_rows(ticker: &str, rows: &[ProviderRow]) -> Result<PriceSeries, AnalysisError> {
    if rows.is_empty() {
        return Err(AnalysisError::TransientProvider(format!("empty result for {}", ticker)));
    }

    let bars: Vec<RawBar> = rows
        .iter()
        .map(|row| RawBar {
            date: row.timestamp.date_naive(),
            open: field_value(row, Field::Open),
            high: field_value(row, Field::High),
            low: field_value(row, Field::Low),
            close: field_value(row, Field::Close),
            volume: field_value(row, Field::Volume),
        })
        .collect();

    let missing: Vec<&str> = Field::ALL
        .iter()
        .filter(|&&field| {
            !bars.iter().any(|b| match field {
                Field::Open => b.open.is_some(),
                Field::High => b.high.is_some(),
                Field::Low => b.low.is_some(),
                Field::Close => b.close.is_some(),
                Field::Volume => b.volume.is_some(),
            })
        })
        .map(|f| f.name())
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::TransientProvider(format!(
            "result for {} is missing fields: {}",
            ticker,
            missing.join(", ")
        )));
    }

    Ok(PriceSeries::new(ticker, bars))
}

/// A single intraday close for the live view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayPoint {
    /// `HH:MM`, UTC
    pub time: String,
    pub close: f64,
}

/// Fetches daily history from the provider under a fixed-delay retry policy.
#[derive(Clone)]
pub struct HistoryFetcher {
    provider: Arc<dyn PriceProvider>,
    policy: RetryPolicy,
    history_days: i64,
}

impl HistoryFetcher {
    pub fn new(provider: Arc<dyn PriceProvider>, policy: RetryPolicy, history_days: i64) -> Self {
        Self {
            provider,
            policy,
            history_days,
        }
    }

    /// Full available daily history for `ticker`. Exhausting the retry
    /// budget yields `NotFound`; an elapsed deadline yields `Timeout`.
    /// Dropping the returned future abandons any attempt in progress.
    pub async fn fetch(&self, ticker: &str) -> Result<PriceSeries, AnalysisError> {
        match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_with_retry(ticker))
                .await
                .map_err(|_| {
                    tracing::error!("Fetch for {} timed out after {:?}", ticker, limit);
                    AnalysisError::Timeout(format!("fetching {} exceeded {:?}", ticker, limit))
                })?,
            None => self.fetch_with_retry(ticker).await,
        }
    }

    async fn fetch_with_retry(&self, ticker: &str) -> Result<PriceSeries, AnalysisError> {
        let window = HistoryWindow::trailing_days(self.history_days);
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let outcome = self
                .provider
                .fetch(ticker, window, Interval::Day1)
                .await
                .and_then(|rows| normalize_rows(ticker, &rows));

            match outcome {
                Ok(series) => {
                    tracing::info!("Fetched {} bars for {} (attempt {}/{})", series.len(), ticker, attempt, max_attempts);
                    return Ok(series);
                }
                Err(e) => {
                    tracing::warn!("Fetch attempt {}/{} for {} failed: {}", attempt, max_attempts, ticker, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        tracing::error!("Giving up on {} after {} attempts", ticker, max_attempts);
        Err(AnalysisError::NotFound(ticker.to_string()))
    }

    /// Today's 1-minute closes. A single attempt; empty means not found.
    pub async fn fetch_intraday(&self, ticker: &str) -> Result<Vec<IntradayPoint>, AnalysisError> {
        let window = HistoryWindow::trailing_days(1);
        let request = self.provider.fetch(ticker, window, Interval::Minute1);
        let rows = match self.policy.timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| AnalysisError::Timeout(format!("intraday {} exceeded {:?}", ticker, limit)))?,
            None => request.await,
        }
        .map_err(|e| {
            tracing::warn!("Intraday fetch for {} failed: {}", ticker, e);
            AnalysisError::NotFound(ticker.to_string())
        })?;

        let mut points: Vec<(chrono::DateTime<chrono::Utc>, f64)> = rows
            .iter()
            .filter_map(|row| field_value(row, Field::Close).map(|close| (row.timestamp, close)))
            .collect();
        if points.is_empty() {
            return Err(AnalysisError::NotFound(ticker.to_string()));
        }

        // Keep only the latest session present in the result
        points.sort_by_key(|(ts, _)| *ts);
        let session = points[points.len() - 1].0.date_naive();
        Ok(points
            .into_iter()
            .filter(|(ts, _)| ts.date_naive() == session)
            .map(|(ts, close)| IntradayPoint {
                time: ts.format("%H:%M").to_string(),
                close,
            })
            .collect())
    }
}
