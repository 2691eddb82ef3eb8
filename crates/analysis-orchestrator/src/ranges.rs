use analysis_core::stats::round2;
use analysis_core::{EnrichedBar, TimeRange};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stride applied to the 5Y display window.
pub const STRIDE_5Y: usize = 2;
/// Stride applied to the MAX display window.
pub const STRIDE_MAX: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<&EnrichedBar> for ChartPoint {
    fn from(b: &EnrichedBar) -> Self {
        Self {
            date: b.bar.date,
            open: round2(b.bar.open),
            high: round2(b.bar.high),
            low: round2(b.bar.low),
            close: round2(b.bar.close),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Raw fraction, `None` where undefined.
    pub daily_return: Option<f64>,
}

impl From<&EnrichedBar> for TableRow {
    fn from(b: &EnrichedBar) -> Self {
        Self {
            date: b.bar.date,
            open: round2(b.bar.open),
            high: round2(b.bar.high),
            low: round2(b.bar.low),
            close: round2(b.bar.close),
            volume: b.bar.volume,
            daily_return: b.daily_return,
        }
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

/// Every `stride`-th element, starting at offset 0 of `items`.
pub fn decimate<T>(items: &[T], stride: usize) -> impl Iterator<Item = &T> {
    items.iter().step_by(stride.max(1))
}

/// 1D has no daily display window of its own and is shown as 1M.
fn display_range(range: TimeRange) -> TimeRange {
    match range {
        TimeRange::Day1 => TimeRange::Month1,
        other => other,
    }
}

/// Bounded chart view of `bars` for `range`: tail windows at full resolution,
/// 5Y and MAX stride-sampled.
pub fn select_display(bars: &[EnrichedBar], range: TimeRange) -> Vec<ChartPoint> {
    let range = display_range(range);
    let (window, stride) = match range {
        TimeRange::Year5 => (tail(bars, 1260), STRIDE_5Y),
        TimeRange::Max => (bars, STRIDE_MAX),
        other => (tail(bars, other.trading_days().unwrap_or(21)), 1),
    };
    decimate(window, stride).map(ChartPoint::from).collect()
}

/// Full-resolution table rows for `range`. MAX is the whole series.
pub fn select_table(bars: &[EnrichedBar], range: TimeRange) -> Vec<TableRow> {
    let window = match display_range(range) {
        TimeRange::Max => bars,
        other => tail(bars, other.trading_days().unwrap_or(21)),
    };
    window.iter().map(TableRow::from).collect()
}
