//! Rolling-window indicators over a close series.
//!
//! Every function returns a vector aligned with its input: element `i` is
//! `Some` only when the trailing window ending at `i` is complete.

use analysis_core::stats;

/// Apply `f` to every complete trailing window of `period` values.
fn rolling<F>(data: &[f64], period: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    for i in period - 1..data.len() {
        result[i] = f(&data[i + 1 - period..=i]);
    }
    result
}

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(data, period, stats::mean)
}

/// Highest value over the trailing window
pub fn rolling_max(data: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(data, period, |w| w.iter().copied().reduce(f64::max))
}

/// Lowest value over the trailing window
pub fn rolling_min(data: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(data, period, |w| w.iter().copied().reduce(f64::min))
}

/// Sample standard deviation over the trailing window
pub fn rolling_std(data: &[f64], period: usize) -> Vec<Option<f64>> {
    rolling(data, period, stats::std_dev)
}

/// Relative Strength Index using simple trailing means of gains and losses.
///
/// Needs `period` close-to-close changes, so the first defined value sits at
/// index `period`. A window without losses is pinned to 100.
pub fn rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period + 1 {
        return result;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for w in data.windows(2) {
        let change = w[1] - w[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    for i in period..data.len() {
        // change j sits between data[j] and data[j + 1]
        let avg_gain = gains[i - period..i].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[i - period..i].iter().sum::<f64>() / period as f64;
        result[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }
    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // RS is infinite
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

/// Intraday return `(close - open) / open` per bar; undefined for a zero open.
pub fn daily_return(open: f64, close: f64) -> Option<f64> {
    if open == 0.0 {
        return None;
    }
    Some((close - open) / open)
}
