use analysis_core::stats::{mean, round2};
use analysis_core::{AnalysisError, EnrichedSeries, ReturnMetric, TimeRange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Latest 7-bar close volatility at or above this is labelled volatile.
/// Expressed in price units, so it reads differently across price scales.
pub const RISK_VOLATILITY_THRESHOLD: f64 = 2.0;

/// Trailing bars averaged by [`compare_series`].
pub const COMPARE_WINDOW: usize = 30;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "Stable (Low Risk)")]
    Stable,
    #[serde(rename = "Volatile (High Risk)")]
    Volatile,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl RiskLabel {
    pub fn classify(volatility: Option<f64>) -> Self {
        match volatility {
            Some(v) if v < RISK_VOLATILITY_THRESHOLD => RiskLabel::Stable,
            Some(_) => RiskLabel::Volatile,
            None => RiskLabel::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub ticker: String,
    pub current_price: f64,
    pub returns: BTreeMap<TimeRange, ReturnMetric>,
    pub volatility: Option<f64>,
    pub risk: RiskLabel,
    pub high_52: Option<f64>,
    pub low_52: Option<f64>,
    pub insight: String,
}

fn change(from: f64, to: f64) -> ReturnMetric {
    if from == 0.0 {
        return ReturnMetric::Unavailable;
    }
    let absolute = to - from;
    ReturnMetric::Available {
        percent: round2(absolute / from * 100.0),
        absolute: round2(absolute),
    }
}

/// Return of the latest close over `range`. 1D is measured from the latest
/// bar's open, MAX from the first close, the rest from the close `n` bars
/// back (counting the latest bar as the first of the `n`).
pub fn return_metric(series: &EnrichedSeries, range: TimeRange) -> ReturnMetric {
    let Some(latest) = series.latest() else {
        return ReturnMetric::Unavailable;
    };
    let close = latest.bar.close;

    match range {
        TimeRange::Day1 => change(latest.bar.open, close),
        TimeRange::Max => change(series.bars[0].bar.close, close),
        other => match other.trading_days() {
            Some(n) if series.len() >= n => change(series.bars[series.len() - n].bar.close, close),
            _ => ReturnMetric::Unavailable,
        },
    }
}

fn insight(series: &EnrichedSeries) -> String {
    let Some(latest) = series.latest() else {
        return String::new();
    };
    let close = latest.bar.close;

    let mut text = format!("{} last closed at {:.2}.", series.ticker, close);
    match latest.sma_50 {
        Some(sma) if close > sma => text.push_str(&format!(
            " The price is above its 50-day average ({:.2}), a bullish trend.",
            sma
        )),
        Some(sma) => text.push_str(&format!(
            " The price is below its 50-day average ({:.2}), a bearish trend.",
            sma
        )),
        None => text.push_str(" Not enough history for a 50-day trend."),
    }
    match latest.rsi_14 {
        Some(rsi) if rsi > RSI_OVERBOUGHT => {
            text.push_str(&format!(" RSI is {:.2}: overbought, a pullback is possible.", rsi))
        }
        Some(rsi) if rsi < RSI_OVERSOLD => {
            text.push_str(&format!(" RSI is {:.2}: oversold, a rebound is possible.", rsi))
        }
        Some(rsi) => text.push_str(&format!(" RSI is {:.2}: momentum is balanced.", rsi)),
        None => {}
    }
    text
}

pub fn build_summary(series: &EnrichedSeries) -> Result<Summary, AnalysisError> {
    let latest = series
        .latest()
        .ok_or_else(|| AnalysisError::insufficient(1, 0))?;
    let volatility = latest.volatility_7;

    Ok(Summary {
        ticker: series.ticker.clone(),
        current_price: round2(latest.bar.close),
        returns: TimeRange::ALL
            .iter()
            .map(|&range| (range, return_metric(series, range)))
            .collect(),
        volatility: volatility.map(round2),
        risk: RiskLabel::classify(volatility),
        high_52: latest.rolling_high_252.map(round2),
        low_52: latest.rolling_low_252.map(round2),
        insight: insight(series),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparedTicker {
    pub symbol: String,
    /// Mean daily return of the trailing window, in percent.
    pub average_return_30d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `None` only when neither side has a defined return.
    pub winner: Option<String>,
    pub first: ComparedTicker,
    pub second: ComparedTicker,
}

fn average_recent_return(series: &EnrichedSeries) -> Option<f64> {
    let start = series.len().saturating_sub(COMPARE_WINDOW);
    let returns: Vec<f64> = series.bars[start..].iter().filter_map(|b| b.daily_return).collect();
    mean(&returns).map(|m| m * 100.0)
}

/// Compare mean daily returns over the trailing window. Ties go to `second`.
pub fn compare_series(first: (&str, &EnrichedSeries), second: (&str, &EnrichedSeries)) -> Comparison {
    let r1 = average_recent_return(first.1);
    let r2 = average_recent_return(second.1);

    let winner = match (r1, r2) {
        (Some(a), Some(b)) if a > b => Some(first.0),
        (Some(_), Some(_)) | (None, Some(_)) => Some(second.0),
        (Some(_), None) => Some(first.0),
        (None, None) => None,
    };

    Comparison {
        winner: winner.map(str::to_string),
        first: ComparedTicker {
            symbol: first.0.to_string(),
            average_return_30d: r1.map(round2),
        },
        second: ComparedTicker {
            symbol: second.0.to_string(),
            average_return_30d: r2.map(round2),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{EnrichedBar, PriceBar};
    use chrono::{Duration, NaiveDate};

    fn bar(i: usize, open: f64, close: f64) -> EnrichedBar {
        EnrichedBar {
            bar: PriceBar {
                date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(i as i64),
                open,
                high: close.max(open),
                low: close.min(open),
                close,
                volume: 5_000.0,
            },
            daily_return: if open == 0.0 { None } else { Some((close - open) / open) },
            rolling_high_252: None,
            rolling_low_252: None,
            volatility_7: None,
            sma_50: None,
            sma_200: None,
            rsi_14: None,
        }
    }

    fn rising(n: usize) -> EnrichedSeries {
        EnrichedSeries {
            ticker: "RISE".to_string(),
            bars: (0..n).map(|i| bar(i, 100.0 + i as f64 - 0.5, 100.0 + i as f64)).collect(),
        }
    }

    #[test]
    fn test_rising_series_returns() {
        let series = rising(300);

        // first close 100, last 399
        assert_eq!(
            return_metric(&series, TimeRange::Max),
            ReturnMetric::Available { percent: 299.0, absolute: 299.0 }
        );
        // 252 bars back (inclusive) is index 48: close 148
        assert_eq!(
            return_metric(&series, TimeRange::Year1),
            ReturnMetric::Available { percent: round2(251.0 / 148.0 * 100.0), absolute: 251.0 }
        );
        assert_eq!(return_metric(&series, TimeRange::Week1).absolute(), Some(4.0));
        assert_eq!(return_metric(&series, TimeRange::Day1).absolute(), Some(0.5));
    }

    #[test]
    fn test_lookback_beyond_history_is_unavailable() {
        let series = rising(100);
        assert_eq!(return_metric(&series, TimeRange::Year1), ReturnMetric::Unavailable);
        assert_eq!(return_metric(&series, TimeRange::Year5), ReturnMetric::Unavailable);
        assert!(return_metric(&series, TimeRange::Month6).percent().is_none());
        assert!(return_metric(&series, TimeRange::Month1).percent().is_some());
    }

    #[test]
    fn test_risk_threshold_is_inclusive_volatile() {
        assert_eq!(RiskLabel::classify(Some(1.99)), RiskLabel::Stable);
        assert_eq!(RiskLabel::classify(Some(2.0)), RiskLabel::Volatile);
        assert_eq!(RiskLabel::classify(None), RiskLabel::Unknown);
    }

    #[test]
    fn test_summary_fields_and_insight() {
        let mut series = rising(60);
        let last = series.bars.last_mut().unwrap();
        last.volatility_7 = Some(2.1601);
        last.sma_50 = Some(134.0);
        last.rsi_14 = Some(100.0);
        last.rolling_high_252 = Some(159.0);
        last.rolling_low_252 = Some(100.0);

        let summary = build_summary(&series).unwrap();
        assert_eq!(summary.current_price, 159.0);
        assert_eq!(summary.volatility, Some(2.16));
        assert_eq!(summary.risk, RiskLabel::Volatile);
        assert_eq!(summary.high_52, Some(159.0));
        assert_eq!(summary.returns.len(), TimeRange::ALL.len());
        assert_eq!(summary.returns[&TimeRange::Year1], ReturnMetric::Unavailable);
        assert!(summary.insight.contains("159.00"));
        assert!(summary.insight.contains("bullish"));
        assert!(summary.insight.contains("overbought"));
        assert!(summary.insight.contains("100.00"));
    }

    #[test]
    fn test_insight_bearish_and_oversold() {
        let mut series = rising(40);
        let last = series.bars.last_mut().unwrap();
        last.sma_50 = Some(500.0);
        last.rsi_14 = Some(12.5);
        let text = build_summary(&series).unwrap().insight;
        assert!(text.contains("bearish"));
        assert!(text.contains("oversold"));
        assert!(text.contains("12.50"));
    }

    #[test]
    fn test_summary_serializes_unavailable_returns_explicitly() {
        let json = serde_json::to_value(build_summary(&rising(40)).unwrap()).unwrap();
        assert_eq!(json["returns"]["1Y"]["status"], "unavailable");
        assert_eq!(json["returns"]["1M"]["status"], "available");
        assert!(json["high_52"].is_null());
    }

    #[test]
    fn test_empty_series_has_no_summary() {
        let empty = EnrichedSeries { ticker: "NONE".to_string(), bars: Vec::new() };
        assert!(build_summary(&empty).is_err());
        assert_eq!(return_metric(&empty, TimeRange::Max), ReturnMetric::Unavailable);
    }

    #[test]
    fn test_compare_picks_higher_mean_return() {
        let up = rising(40);
        let flat = EnrichedSeries {
            ticker: "FLAT".to_string(),
            bars: (0..40).map(|i| bar(i, 50.0, 50.0)).collect(),
        };

        let result = compare_series(("UP", &up), ("FLAT", &flat));
        assert_eq!(result.winner.as_deref(), Some("UP"));
        assert_eq!(result.second.average_return_30d, Some(0.0));
        assert!(result.first.average_return_30d.unwrap() > 0.0);

        let tie = compare_series(("A", &flat), ("B", &flat));
        assert_eq!(tie.winner.as_deref(), Some("B"));
    }
}
