//! Small numeric helpers shared by the indicator, forecast and summary code.

use statrs::statistics::Statistics;

/// Mean of a data slice. `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().mean())
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    Some(data.iter().std_dev())
}

/// Round to 2 decimal places, the precision used for prices and percentages.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
