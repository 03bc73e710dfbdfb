//! Cross-sectional statistics for the factor pipeline.
//!
//! Winsorization, z-score standardization with clipping, medians, and
//! percentile ranks. Everything here operates on plain `f64` slices where
//! `NaN` marks a missing observation; missing values are excluded from the
//! statistics and preserved in the output.

use ndarray::Array1;

/// Minimum standard deviation below which a cross-section is treated as
/// having zero variance.
pub const MIN_STD_THRESHOLD: f64 = 1e-10;

/// Summary statistics from a standardization pass.
#[derive(Debug, Clone, Copy)]
pub struct StandardizeResult {
    /// Mean of the finite inputs.
    pub mean: f64,
    /// Sample standard deviation (N-1 denominator) of the finite inputs.
    pub std: f64,
    /// Whether standardization was applied (false when variance was too low
    /// or fewer than two finite values were present).
    pub applied: bool,
}

/// Interpolated percentile of a sorted slice, `q` in `[0, 1]`.
///
/// Uses the linear-interpolation definition, matching the usual numerical
/// library convention. Returns `NaN` for an empty slice.
#[must_use]
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Winsorize values in place at the `[lower_q, upper_q]` percentile pair.
///
/// Values beyond the percentile bounds are replaced by the bounds
/// themselves. `NaN` entries are ignored for the bounds and left untouched.
/// Re-applying with the same percentiles on the winsorized output is a
/// no-op.
pub fn winsorize(values: &mut [f64], lower_q: f64, upper_q: f64) {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let lower = percentile_sorted(&finite, lower_q);
    let upper = percentile_sorted(&finite, upper_q);

    for v in values.iter_mut() {
        if v.is_finite() {
            *v = v.clamp(lower, upper);
        }
    }
}

/// Standardize to z-scores and clip to `[-clip, +clip]`.
///
/// Uses sample standard deviation (N-1). A cross-section with fewer than
/// two finite values, or with variance below [`MIN_STD_THRESHOLD`], maps
/// every entry to zero. `NaN` inputs map to zero (the neutral score) and
/// are excluded from the mean and standard deviation.
#[must_use]
pub fn standardize_clipped(values: &[f64], clip: f64) -> (Vec<f64>, StandardizeResult) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let n = finite.len();

    if n < 2 {
        return (
            vec![0.0; values.len()],
            StandardizeResult { mean: f64::NAN, std: f64::NAN, applied: false },
        );
    }

    let mean = finite.iter().sum::<f64>() / n as f64;
    let variance = finite.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();

    let applied = std > MIN_STD_THRESHOLD;
    let scores = values
        .iter()
        .map(|&x| {
            if !x.is_finite() || !applied {
                0.0
            } else {
                ((x - mean) / std).clamp(-clip, clip)
            }
        })
        .collect();

    (scores, StandardizeResult { mean, std, applied })
}

/// Median of the finite entries, `None` when there are none.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = finite.len();
    Some(if n % 2 == 1 {
        finite[n / 2]
    } else {
        0.5 * (finite[n / 2 - 1] + finite[n / 2])
    })
}

/// Population standard deviation (N denominator) of a small fixed sample.
///
/// Used for the factor-agreement spread over the three z-components of a
/// single ticker.
#[must_use]
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile rank of `x` within the finite entries of `values`, in
/// `[0, 1]`. Returns `NaN` when `x` is not finite or nothing is finite.
#[must_use]
pub fn percentile_rank(values: &[f64], x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let below = finite.iter().filter(|&&v| v < x).count();
    let equal = finite.iter().filter(|&&v| v == x).count();
    (below as f64 + 0.5 * equal as f64) / finite.len() as f64
}

/// Standardize an ndarray vector to clipped z-scores.
///
/// Array variant of [`standardize_clipped`] for callers already working in
/// `ndarray` space.
#[must_use]
pub fn standardize_array_clipped(
    scores: &Array1<f64>,
    clip: f64,
) -> (Array1<f64>, StandardizeResult) {
    let values = scores.to_vec();
    let (standardized, result) = standardize_clipped(&values, clip);
    (Array1::from_vec(standardized), result)
}
