//! Numeric and time-window helpers shared by the scorer and the feedback
//! aggregations

use crate::error::{AffinityError, Result};
use chrono::{DateTime, Duration, Utc};

/// Longest trailing window, in days, accepted anywhere a window is configured
pub const MAX_WINDOW_DAYS: i64 = 3650;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean, `None` for an empty input
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sample variance (n - 1 denominator); zero for fewer than two values
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Start of a trailing window of `days` ending at `end`
///
/// Rejects non-positive lengths and lengths beyond [`MAX_WINDOW_DAYS`].
pub fn window_start(end: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(AffinityError::validation(format!(
            "Window must be between 1 and {} days, got {}",
            MAX_WINDOW_DAYS, days
        )));
    }
    Duration::try_days(days)
        .and_then(|span| end.checked_sub_signed(span))
        .ok_or_else(|| AffinityError::validation(format!("Window of {} days is out of range", days)))
}
