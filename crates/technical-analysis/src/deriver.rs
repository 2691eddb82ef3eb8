use analysis_core::{AnalysisError, EnrichedBar, EnrichedSeries, PriceBar, PriceSeries, RawBar};

use crate::indicators::*;

/// Minimum bars (after cleaning) required before any indicator is derived.
pub const MIN_HISTORY: usize = 30;

pub const WINDOW_52_WEEK: usize = 252;
pub const WINDOW_VOLATILITY: usize = 7;
pub const WINDOW_SMA_SHORT: usize = 50;
pub const WINDOW_SMA_LONG: usize = 200;
pub const WINDOW_RSI: usize = 14;

/// Carry the most recent known value forward into missing fields, each field
/// independently. Leading gaps with no earlier value stay missing.
pub fn forward_fill(bars: &[RawBar]) -> Vec<RawBar> {
    let mut last = RawBar::default();
    bars.iter()
        .map(|bar| {
            let filled = RawBar {
                date: bar.date,
                open: bar.open.or(last.open),
                high: bar.high.or(last.high),
                low: bar.low.or(last.low),
                close: bar.close.or(last.close),
                volume: bar.volume.or(last.volume),
            };
            last = filled;
            filled
        })
        .collect()
}

/// Forward-fill and keep only bars with every field known.
pub fn clean(series: &PriceSeries) -> Vec<PriceBar> {
    let filled = forward_fill(&series.bars);
    let bars: Vec<PriceBar> = filled.iter().filter_map(RawBar::complete).collect();
    let dropped = filled.len() - bars.len();
    if dropped > 0 {
        tracing::debug!("{}: dropped {} leading bars with no prior value to fill", series.ticker, dropped);
    }
    bars
}

/// Turns a raw provider series into an [`EnrichedSeries`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsDeriver;

impl MetricsDeriver {
    pub fn new() -> Self {
        Self
    }

    pub fn derive(&self, series: &PriceSeries) -> Result<EnrichedSeries, AnalysisError> {
        let bars = clean(series);
        if bars.len() < MIN_HISTORY {
            return Err(AnalysisError::insufficient(MIN_HISTORY, bars.len()));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let high_252 = rolling_max(&closes, WINDOW_52_WEEK);
        let low_252 = rolling_min(&closes, WINDOW_52_WEEK);
        let volatility = rolling_std(&closes, WINDOW_VOLATILITY);
        let sma_50 = sma(&closes, WINDOW_SMA_SHORT);
        let sma_200 = sma(&closes, WINDOW_SMA_LONG);
        let rsi_14 = rsi(&closes, WINDOW_RSI);

        let enriched = bars
            .into_iter()
            .enumerate()
            .map(|(i, bar)| EnrichedBar {
                daily_return: daily_return(bar.open, bar.close),
                rolling_high_252: high_252[i],
                rolling_low_252: low_252[i],
                volatility_7: volatility[i],
                sma_50: sma_50[i],
                sma_200: sma_200[i],
                rsi_14: rsi_14[i],
                bar,
            })
            .collect();

        Ok(EnrichedSeries {
            ticker: series.ticker.clone(),
            bars: enriched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(i as i64)
    }

    fn full_bar(i: usize, close: f64) -> RawBar {
        RawBar {
            date: day(i),
            open: Some(close - 0.5),
            high: Some(close + 1.0),
            low: Some(close - 1.0),
            close: Some(close),
            volume: Some(1_000.0),
        }
    }

    fn series_of(closes: &[f64]) -> PriceSeries {
        let bars = closes.iter().enumerate().map(|(i, &c)| full_bar(i, c)).collect();
        PriceSeries::new("TEST", bars)
    }

    #[test]
    fn test_forward_fill_per_field() {
        let mut bars = vec![full_bar(0, 10.0), full_bar(1, 11.0), full_bar(2, 12.0)];
        bars[1].close = None;
        bars[1].volume = None;
        bars[2].high = None;

        let filled = forward_fill(&bars);
        assert_eq!(filled[1].close, Some(10.0));
        assert_eq!(filled[1].volume, Some(1_000.0));
        assert_eq!(filled[1].open, Some(10.5));
        assert_eq!(filled[2].high, Some(11.0 + 1.0));
        assert_eq!(filled[2].close, Some(12.0));
    }

    #[test]
    fn test_forward_fill_is_idempotent() {
        let mut bars: Vec<RawBar> = (0..12).map(|i| full_bar(i, 50.0 + i as f64)).collect();
        bars[0].volume = None;
        bars[3].close = None;
        bars[4].close = None;
        bars[7].open = None;
        bars[11].low = None;

        let once = forward_fill(&bars);
        let twice = forward_fill(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_leading_gaps_are_dropped() {
        let mut raw: Vec<RawBar> = (0..35).map(|i| full_bar(i, 100.0)).collect();
        raw[0].close = None;
        raw[1].close = None;
        let cleaned = clean(&PriceSeries::new("GAP", raw));
        assert_eq!(cleaned.len(), 33);
        assert_eq!(cleaned[0].date, day(2));
    }

    #[test]
    fn test_rejects_short_series() {
        let closes: Vec<f64> = (0..29).map(|i| 100.0 + i as f64).collect();
        let err = MetricsDeriver::new().derive(&series_of(&closes)).unwrap_err();
        assert_eq!(err, AnalysisError::InsufficientHistory { required: 30, available: 29 });
    }

    #[test]
    fn test_fields_undefined_until_window_satisfied() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin()).collect();
        let enriched = MetricsDeriver::new().derive(&series_of(&closes)).unwrap();

        assert_eq!(enriched.len(), 60);
        assert!(enriched.bars[5].volatility_7.is_none());
        assert!(enriched.bars[6].volatility_7.is_some());
        assert!(enriched.bars[13].rsi_14.is_none());
        assert!(enriched.bars[14].rsi_14.is_some());
        assert!(enriched.bars[48].sma_50.is_none());
        assert!(enriched.bars[49].sma_50.is_some());
        // 60 bars never reach the 200 / 252 windows
        assert!(enriched.bars.iter().all(|b| b.sma_200.is_none()));
        assert!(enriched.bars.iter().all(|b| b.rolling_high_252.is_none() && b.rolling_low_252.is_none()));
        assert!(enriched.bars.iter().all(|b| b.daily_return.is_some()));
    }

    #[test]
    fn test_52_week_bounds_and_daily_return() {
        let closes: Vec<f64> = (0..300).map(|i| 10.0 + i as f64).collect();
        let enriched = MetricsDeriver::new().derive(&series_of(&closes)).unwrap();

        let last = enriched.latest().unwrap();
        assert_eq!(last.rolling_high_252, Some(309.0));
        assert_eq!(last.rolling_low_252, Some(309.0 - 251.0));
        assert_eq!(enriched.bars[251].rolling_low_252, Some(10.0));
        // open is close - 0.5
        let expected = 0.5 / (309.0 - 0.5);
        assert!((last.daily_return.unwrap() - expected).abs() < 1e-12);
        assert_eq!(last.rsi_14, Some(100.0));
    }

    #[test]
    fn test_enrichment_keeps_ticker_and_dates() {
        let closes: Vec<f64> = (0..40).map(|i| 20.0 + i as f64).collect();
        let enriched = MetricsDeriver::new().derive(&series_of(&closes)).unwrap();
        assert_eq!(enriched.ticker, "TEST");
        assert_eq!(enriched.bars[0].bar.date, day(0));
        assert_eq!(enriched.bars[39].bar.date, day(39));
    }
}
