//! One-step-ahead close price forecast from two independent regressors fitted
//! on the recent window: an OLS trend line and a bagged tree ensemble.

pub mod forest;
pub mod linear;

pub use forest::{BaggedForest, ForestConfig};
pub use linear::LinearFit;

use analysis_core::stats::round2;
use analysis_core::{EnrichedSeries, ForecastResult};

/// Bars of history used to fit both models.
pub const FORECAST_WINDOW: usize = 60;

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    forest: ForestConfig,
}

impl ForecastEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predict the close of the bar after the last one in `series`.
    pub fn forecast(&self, series: &EnrichedSeries) -> ForecastResult {
        if series.len() < FORECAST_WINDOW {
            return ForecastResult::Unavailable {
                reason: format!(
                    "need {} bars of history, have {}",
                    FORECAST_WINDOW,
                    series.len()
                ),
            };
        }

        let closes: Vec<f64> = series.bars[series.len() - FORECAST_WINDOW..]
            .iter()
            .map(|b| b.bar.close)
            .collect();
        self.forecast_closes(&series.ticker, &closes)
    }

    /// Fit on exactly the given closes (indexed 0..n) and predict index n.
    pub fn forecast_closes(&self, ticker: &str, closes: &[f64]) -> ForecastResult {
        let xs: Vec<f64> = (0..closes.len()).map(|i| i as f64).collect();
        let next = closes.len() as f64;

        let linear = match LinearFit::fit(&xs, closes) {
            Ok(fit) => fit.predict(next),
            Err(e) => {
                tracing::warn!("Linear forecast failed for {}: {}", ticker, e);
                return ForecastResult::Unavailable { reason: e.to_string() };
            }
        };

        let (ensemble, fallback) = match BaggedForest::fit(&xs, closes, &self.forest) {
            Ok(model) => (model.predict(next), false),
            Err(e) => {
                tracing::info!("Ensemble forecast for {} falling back to linear: {}", ticker, e);
                (linear, true)
            }
        };

        ForecastResult::Available {
            linear_estimate: round2(linear),
            ensemble_estimate: round2(ensemble),
            fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{EnrichedBar, PriceBar};
    use chrono::{Duration, NaiveDate};

    fn series_from(closes: &[f64]) -> EnrichedSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| EnrichedBar {
                bar: PriceBar {
                    date: start + Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 10_000.0,
                },
                daily_return: Some(0.0),
                rolling_high_252: None,
                rolling_low_252: None,
                volatility_7: None,
                sma_50: None,
                sma_200: None,
                rsi_14: None,
            })
            .collect();
        EnrichedSeries {
            ticker: "TEST".to_string(),
            bars,
        }
    }

    #[test]
    fn test_unavailable_below_window() {
        let result = ForecastEngine::new().forecast(&series_from(&[100.0; 59]));
        assert!(!result.is_available());
        assert!(matches!(result, ForecastResult::Unavailable { .. }));
    }

    #[test]
    fn test_constant_price_falls_back_to_linear() {
        let result = ForecastEngine::new().forecast(&series_from(&[123.45; 60]));
        assert_eq!(
            result,
            ForecastResult::Available {
                linear_estimate: 123.45,
                ensemble_estimate: 123.45,
                fallback: true,
            }
        );
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let engine = ForecastEngine::new();
        let series = series_from(&[42.0; 90]);
        assert_eq!(engine.forecast(&series), engine.forecast(&series));
    }

    #[test]
    fn test_uses_trailing_window_only() {
        // A wild prefix must not influence the 60-bar fit
        let mut closes = vec![1_000.0; 40];
        closes.extend((0..60).map(|i| 50.0 + i as f64));
        let result = ForecastEngine::new().forecast(&series_from(&closes));

        match result {
            ForecastResult::Available { linear_estimate, ensemble_estimate, fallback } => {
                assert_eq!(linear_estimate, 110.0);
                assert!(!fallback);
                assert!(ensemble_estimate <= 109.0);
                assert!(ensemble_estimate > 90.0);
            }
            other => panic!("expected forecast, got {:?}", other),
        }
    }

    #[test]
    fn test_reproducible_for_identical_history() {
        let closes: Vec<f64> = (0..120).map(|i| 200.0 + (i as f64 * 0.2).cos() * 8.0).collect();
        let series = series_from(&closes);
        let first = ForecastEngine::new().forecast(&series);
        let second = ForecastEngine::new().forecast(&series);
        assert_eq!(first, second);
        assert!(first.is_available());
    }

    #[test]
    fn test_estimates_are_rounded() {
        let closes: Vec<f64> = (0..60).map(|i| 10.0 + i as f64 / 3.0).collect();
        if let ForecastResult::Available { linear_estimate, ensemble_estimate, .. } =
            ForecastEngine::new().forecast(&series_from(&closes))
        {
            assert_eq!(linear_estimate, round2(linear_estimate));
            assert_eq!(ensemble_estimate, round2(ensemble_estimate));
        } else {
            panic!("expected forecast");
        }
    }
}
