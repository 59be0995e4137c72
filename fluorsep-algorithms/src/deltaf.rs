//! Baseline estimation and relative fluorescence change.
//!
//! The baseline F0 is the 5th percentile of a smoothed copy of the trace,
//! with the smoothing window sized to roughly one second of the recording.

use ndarray::{Array1, Array2};

/// Percentile of the trace distribution used as the baseline.
pub const BASELINE_PERCENTILE: f64 = 5.0;

/// Centered moving average. A window of one (or an empty input) is a no-op;
/// windows are clamped at the edges rather than padded.
#[must_use]
pub fn smooth(x: &Array1<f64>, window: usize) -> Array1<f64> {
    let n = x.len();
    if n == 0 || window <= 1 {
        return x.clone();
    }
    let half = window / 2;
    Array1::from_shape_fn(n, |i| {
        let lo = i.saturating_sub(half);
        let hi = (i + half + 1).min(n);
        x.slice(ndarray::s![lo..hi]).mean().unwrap_or(x[i])
    })
}

/// Linearly interpolated percentile, `q` in 0..=100. NaN for empty input.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Baseline fluorescence of one trace. `freq` is the frame rate in Hz and
/// sets the smoothing window to about one second.
#[must_use]
pub fn baseline_f0(trace: &Array1<f64>, freq: f64) -> f64 {
    let window = freq.round().max(1.0) as usize;
    let smoothed = smooth(trace, window);
    percentile(smoothed.as_slice().unwrap_or(&[]), BASELINE_PERCENTILE)
}

/// `(f - f0) / f0` applied elementwise. A zero baseline produces infinities,
/// which callers surface as a warning rather than an error.
#[must_use]
pub fn deltaf(trace: &Array2<f64>, f0: f64) -> Array2<f64> {
    trace.mapv(|x| (x - f0) / f0)
}
