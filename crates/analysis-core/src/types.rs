use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Daily OHLCV bar with every field known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Daily bar as normalized from the provider. Any field may be missing
/// until the series has been forward-filled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Converts to a [`PriceBar`] when all five fields are present.
    pub fn complete(&self) -> Option<PriceBar> {
        Some(PriceBar {
            date: self.date,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume?,
        })
    }
}

impl From<PriceBar> for RawBar {
    fn from(bar: PriceBar) -> Self {
        RawBar {
            date: bar.date,
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}

/// Date-ordered bars for one ticker, strictly increasing by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<RawBar>,
}

impl PriceSeries {
    /// Builds a series, sorting by date and keeping the last bar seen for a
    /// duplicated date.
    pub fn new(ticker: impl Into<String>, mut bars: Vec<RawBar>) -> Self {
        // Stable sort keeps provider order within a date, so the later row wins below.
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<RawBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            ticker: ticker.into(),
            bars: deduped,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// One bar plus its derived indicators. `None` means the trailing window was
/// not yet satisfied at this index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBar {
    #[serde(flatten)]
    pub bar: PriceBar,
    pub daily_return: Option<f64>,
    pub rolling_high_252: Option<f64>,
    pub rolling_low_252: Option<f64>,
    pub volatility_7: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
}

/// Cleaned and enriched history for one ticker. A refresh builds a new value;
/// it is never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSeries {
    pub ticker: String,
    pub bars: Vec<EnrichedBar>,
}

impl EnrichedSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn latest(&self) -> Option<&EnrichedBar> {
        self.bars.last()
    }
}

/// Next-bar price forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastResult {
    Available {
        linear_estimate: f64,
        ensemble_estimate: f64,
        /// True when the ensemble could not be fitted and mirrors the linear fit.
        fallback: bool,
    },
    Unavailable {
        reason: String,
    },
}

impl ForecastResult {
    pub fn is_available(&self) -> bool {
        matches!(self, ForecastResult::Available { .. })
    }
}

/// Price change between two closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReturnMetric {
    Available { percent: f64, absolute: f64 },
    Unavailable,
}

impl ReturnMetric {
    pub fn percent(&self) -> Option<f64> {
        match self {
            ReturnMetric::Available { percent, .. } => Some(*percent),
            ReturnMetric::Unavailable => None,
        }
    }

    pub fn absolute(&self) -> Option<f64> {
        match self {
            ReturnMetric::Available { absolute, .. } => Some(*absolute),
            ReturnMetric::Unavailable => None,
        }
    }
}

/// Named display / lookback range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1D")]
    Day1,
    #[serde(rename = "1W")]
    Week1,
    #[default]
    #[serde(rename = "1M")]
    Month1,
    #[serde(rename = "6M")]
    Month6,
    #[serde(rename = "1Y")]
    Year1,
    #[serde(rename = "5Y")]
    Year5,
    #[serde(rename = "MAX")]
    Max,
}

impl TimeRange {
    /// All ranges in display order.
    pub const ALL: [TimeRange; 7] = [
        TimeRange::Day1,
        TimeRange::Week1,
        TimeRange::Month1,
        TimeRange::Month6,
        TimeRange::Year1,
        TimeRange::Year5,
        TimeRange::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Day1 => "1D",
            TimeRange::Week1 => "1W",
            TimeRange::Month1 => "1M",
            TimeRange::Month6 => "6M",
            TimeRange::Year1 => "1Y",
            TimeRange::Year5 => "5Y",
            TimeRange::Max => "MAX",
        }
    }

    /// Trading-day lookback, `None` for ranges not expressed in bars
    /// (1D compares against the same bar's open, MAX spans the whole series).
    pub fn trading_days(&self) -> Option<usize> {
        match self {
            TimeRange::Day1 | TimeRange::Max => None,
            TimeRange::Week1 => Some(5),
            TimeRange::Month1 => Some(21),
            TimeRange::Month6 => Some(126),
            TimeRange::Year1 => Some(252),
            TimeRange::Year5 => Some(252 * 5),
        }
    }

    /// Lenient parse used by query callers: unknown names fall back to 1M.
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1D" => Ok(TimeRange::Day1),
            "1W" => Ok(TimeRange::Week1),
            "1M" => Ok(TimeRange::Month1),
            "6M" => Ok(TimeRange::Month6),
            "1Y" => Ok(TimeRange::Year1),
            "5Y" => Ok(TimeRange::Year5),
            "MAX" => Ok(TimeRange::Max),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}

/// Bar interval requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Minute1,
    Day1,
}

impl Interval {
    /// Polygon-style (multiplier, timespan) pair.
    pub fn multiplier_and_span(&self) -> (u32, &'static str) {
        match self {
            Interval::Minute1 => (1, "minute"),
            Interval::Day1 => (1, "day"),
        }
    }
}

/// Inclusive time range requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl HistoryWindow {
    /// Window ending now and reaching `days` calendar days back.
    pub fn trailing_days(days: i64) -> Self {
        let to = Utc::now();
        Self {
            from: to - chrono::Duration::days(days),
            to,
        }
    }
}

/// One provider record before normalization. Field names and value types are
/// whatever the provider sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRow {
    pub timestamp: DateTime<Utc>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(day: u32, close: f64) -> RawBar {
        RawBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            close: Some(close),
            ..Default::default()
        }
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = PriceSeries::new("AAPL", vec![raw(3, 3.0), raw(1, 1.0), raw(3, 30.0), raw(2, 2.0)]);
        let closes: Vec<f64> = series.bars.iter().filter_map(|b| b.close).collect();
        assert_eq!(closes, vec![1.0, 2.0, 30.0]);
        assert!(series.bars.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_raw_bar_complete_requires_all_fields() {
        let mut bar = raw(1, 10.0);
        assert!(bar.complete().is_none());
        bar.open = Some(9.0);
        bar.high = Some(11.0);
        bar.low = Some(8.5);
        bar.volume = Some(1000.0);
        let full = bar.complete().unwrap();
        assert_eq!(full.close, 10.0);
    }

    #[test]
    fn test_time_range_parsing() {
        assert_eq!("5y".parse::<TimeRange>().unwrap(), TimeRange::Year5);
        assert_eq!(TimeRange::parse_or_default("3Q"), TimeRange::Month1);
        assert_eq!(TimeRange::Max.trading_days(), None);
        assert_eq!(TimeRange::Year1.trading_days(), Some(252));
    }

    #[test]
    fn test_unavailable_metric_serializes_without_zero() {
        let json = serde_json::to_value(ReturnMetric::Unavailable).unwrap();
        assert_eq!(json, serde_json::json!({"status": "unavailable"}));
        assert_eq!(ReturnMetric::Unavailable.percent(), None);
    }
}
