//! Return covariance estimation.
//!
//! Sample covariance of trailing daily returns, annualized, with a
//! Ledoit-Wolf shrinkage substitute whenever the sample estimate's minimum
//! eigenvalue falls below tolerance. Shrinkage targets the scaled identity
//! and uses the analytic optimal intensity, so the result is always
//! positive definite when the returns have any spread at all.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2};
use tracing::debug;

use cadiz_traits::{CadizError, Date, PriceSeries, Result, Ticker, TRADING_DAYS_PER_YEAR};

use crate::linalg::min_eigenvalue_exceeds;

/// Minimum eigenvalue below which the sample covariance is replaced.
pub const MIN_EIGENVALUE: f64 = 1e-8;

/// Minimum number of aligned return rows required to estimate.
pub const MIN_RETURN_ROWS: usize = 60;

/// An annualized covariance estimate.
#[derive(Debug, Clone)]
pub struct CovarianceEstimate {
    /// Annualized covariance matrix, ticker order as requested.
    pub matrix: Array2<f64>,
    /// Whether Ledoit-Wolf shrinkage replaced the sample estimate.
    pub shrunk: bool,
}

/// Build a `T x N` matrix of daily simple returns over the dates common to
/// every requested ticker.
///
/// # Errors
///
/// [`CadizError::InsufficientData`] when a ticker is missing from the
/// price table or fewer than [`MIN_RETURN_ROWS`] aligned return rows
/// survive the date intersection.
pub fn aligned_returns(
    prices: &BTreeMap<Ticker, PriceSeries>,
    tickers: &[Ticker],
) -> Result<Array2<f64>> {
    if tickers.is_empty() {
        return Err(CadizError::EmptyOptimizationSet);
    }

    let mut common: Option<BTreeSet<Date>> = None;
    for ticker in tickers {
        let series = prices.get(ticker).ok_or_else(|| {
            CadizError::InsufficientData(format!("no price series for {ticker}"))
        })?;
        let dates: BTreeSet<Date> = series.dates().into_iter().collect();
        common = Some(match common {
            None => dates,
            Some(acc) => acc.intersection(&dates).copied().collect(),
        });
    }
    let common = common.unwrap_or_default();
    if common.len() < MIN_RETURN_ROWS + 1 {
        return Err(CadizError::InsufficientData(format!(
            "only {} aligned sessions across {} tickers, need {}",
            common.len(),
            tickers.len(),
            MIN_RETURN_ROWS + 1
        )));
    }

    let dates: Vec<Date> = common.into_iter().collect();
    let t = dates.len();
    let n = tickers.len();

    let mut closes = Array2::<f64>::zeros((t, n));
    for (j, ticker) in tickers.iter().enumerate() {
        let series = &prices[ticker];
        let by_date: BTreeMap<Date, f64> =
            series.points().iter().map(|p| (p.date, p.close)).collect();
        for (i, date) in dates.iter().enumerate() {
            closes[(i, j)] = by_date[date];
        }
    }

    let mut returns = Array2::<f64>::zeros((t - 1, n));
    for i in 1..t {
        for j in 0..n {
            returns[(i - 1, j)] = closes[(i, j)] / closes[(i - 1, j)] - 1.0;
        }
    }
    Ok(returns)
}

/// Sample covariance of daily returns (N-1 denominator), annualized.
#[must_use]
pub fn sample_covariance(returns: &Array2<f64>) -> Array2<f64> {
    let t = returns.nrows();
    let n = returns.ncols();
    let means: Array1<f64> = returns.mean_axis(ndarray::Axis(0)).unwrap_or_else(|| Array1::zeros(n));

    let mut cov = Array2::<f64>::zeros((n, n));
    for row in returns.rows() {
        for i in 0..n {
            let di = row[i] - means[i];
            for j in i..n {
                cov[(i, j)] += di * (row[j] - means[j]);
            }
        }
    }
    let denom = (t.max(2) - 1) as f64;
    for i in 0..n {
        for j in i..n {
            let v = cov[(i, j)] / denom * TRADING_DAYS_PER_YEAR as f64;
            cov[(i, j)] = v;
            cov[(j, i)] = v;
        }
    }
    cov
}

/// Ledoit-Wolf shrinkage estimator toward the scaled identity, annualized.
///
/// Computes the 2004 analytic shrinkage intensity on the daily returns and
/// blends the sample covariance with `mu * I`, where `mu` is the average
/// sample variance.
#[must_use]
pub fn ledoit_wolf(returns: &Array2<f64>) -> Array2<f64> {
    let t = returns.nrows();
    let n = returns.ncols();
    let tf = t as f64;
    let nf = n as f64;

    let means: Array1<f64> = returns.mean_axis(ndarray::Axis(0)).unwrap_or_else(|| Array1::zeros(n));
    let mut x = returns.clone();
    for mut row in x.rows_mut() {
        for j in 0..n {
            row[j] -= means[j];
        }
    }

    // Daily sample covariance with 1/T normalization, per the estimator's
    // own convention.
    let s = x.t().dot(&x) / tf;

    // mu: mean diagonal; d2: squared distance of S from mu*I.
    let mu = (0..n).map(|i| s[(i, i)]).sum::<f64>() / nf;
    let mut d2 = 0.0;
    for i in 0..n {
        for j in 0..n {
            let target = if i == j { mu } else { 0.0 };
            d2 += (s[(i, j)] - target).powi(2);
        }
    }
    d2 /= nf;

    // b2: estimation noise in S.
    let mut b_bar2 = 0.0;
    for row in x.rows() {
        let mut norm2 = 0.0;
        for i in 0..n {
            for j in 0..n {
                norm2 += (row[i] * row[j] - s[(i, j)]).powi(2);
            }
        }
        b_bar2 += norm2;
    }
    b_bar2 /= tf * tf * nf;
    let b2 = b_bar2.min(d2);

    let shrinkage = if d2 > 0.0 { b2 / d2 } else { 1.0 };

    let mut out = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let target = if i == j { mu } else { 0.0 };
            out[(i, j)] = (shrinkage * target + (1.0 - shrinkage) * s[(i, j)])
                * TRADING_DAYS_PER_YEAR as f64;
        }
    }
    out
}

/// Estimate the annualized covariance, substituting shrinkage when the
/// sample estimate is not comfortably positive definite.
///
/// # Errors
///
/// [`CadizError::CovarianceIllConditioned`] when even the shrunk matrix
/// fails the eigenvalue floor (degenerate returns, e.g. a constant
/// series).
pub fn estimate(returns: &Array2<f64>) -> Result<CovarianceEstimate> {
    let sample = sample_covariance(returns);
    if min_eigenvalue_exceeds(&sample, MIN_EIGENVALUE) {
        return Ok(CovarianceEstimate { matrix: sample, shrunk: false });
    }

    debug!("sample covariance below eigenvalue floor, shrinking");
    let shrunk = ledoit_wolf(returns);
    if min_eigenvalue_exceeds(&shrunk, MIN_EIGENVALUE) {
        return Ok(CovarianceEstimate { matrix: shrunk, shrunk: true });
    }

    Err(CadizError::CovarianceIllConditioned(format!(
        "minimum eigenvalue below {MIN_EIGENVALUE} even after shrinkage"
    )))
}
