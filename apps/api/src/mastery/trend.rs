//! Trend classifier: short-window direction of a mastery score.

use crate::models::mastery::Trend;

/// Number of most recent scores considered.
pub const TREND_WINDOW: usize = 5;
/// Below this many scores the trend is unknown.
pub const MIN_SCORES_FOR_TREND: usize = 3;
/// Half-to-half average difference needed to call a direction.
pub const TREND_THRESHOLD: f64 = 0.05;

/// Classifies a newest-first score history.
///
/// The window is split at `len / 2`: indices `[..mid]` are the recent half,
/// `[mid..]` the older half. With three scores the recent half holds one score
/// and the older half two.
pub fn classify_trend(scores_newest_first: &[f64]) -> Option<Trend> {
    if scores_newest_first.len() < MIN_SCORES_FOR_TREND {
        return None;
    }

    let window = &scores_newest_first[..scores_newest_first.len().min(TREND_WINDOW)];
    let mid = window.len() / 2;
    let recent = &window[..mid];
    let older = &window[mid..];

    let diff = mean(recent) - mean(older);

    if diff > TREND_THRESHOLD {
        Some(Trend::Improving)
    } else if diff < -TREND_THRESHOLD {
        Some(Trend::Declining)
    } else {
        Some(Trend::Stable)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
