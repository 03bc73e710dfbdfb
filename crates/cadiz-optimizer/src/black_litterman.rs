//! Black-Litterman posterior with factor-driven views.
//!
//! The prior is the market-cap equilibrium (`pi = s * delta * Sigma *
//! w_mkt`, with an optional macro scalar `s`). Views are absolute, one per
//! ticker: a composite z-score of +1 implies `alpha_scalar` of annual
//! excess return scaled by the ticker's own volatility. Per-view
//! uncertainty comes from Idzorek-style confidences derived from how well
//! the three factor z-scores agree for that ticker.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use cadiz_factors::FactorScores;
use cadiz_traits::stats::population_std;
use cadiz_traits::{CadizError, Result, Ticker};

use crate::linalg::{inverse, symmetrize};

/// Black-Litterman tau: uncertainty of the prior relative to the
/// covariance.
pub const BL_TAU: f64 = 0.025;

/// One absolute view per ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSet {
    /// Ticker order, matching the posterior.
    pub tickers: Vec<Ticker>,
    /// Expected annual excess return per view.
    pub q: Vec<f64>,
    /// Confidence per view, in `[0, 1]`.
    pub confidence: Vec<f64>,
}

/// Posterior mean and covariance, plus the evidence that produced them.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// Ticker order for every vector and matrix here.
    pub tickers: Vec<Ticker>,
    /// Posterior expected returns.
    pub mean: Array1<f64>,
    /// Posterior covariance (symmetric, positive definite).
    pub covariance: Array2<f64>,
    /// Equilibrium prior returns.
    pub prior: Array1<f64>,
    /// Market-cap weights of the prior.
    pub market_weights: Array1<f64>,
    /// The views that were blended in.
    pub views: ViewSet,
}

impl Posterior {
    /// Position of a ticker in the posterior ordering.
    #[must_use]
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }
}

/// Map the spread of a ticker's three z-scores to a view confidence.
///
/// Tight agreement between value, quality, and momentum makes the view
/// trustworthy; wide disagreement makes it weak.
#[must_use]
pub fn confidence_from_spread(spread: f64) -> f64 {
    if spread < 0.5 {
        0.80
    } else if spread < 1.0 {
        0.60
    } else if spread < 1.5 {
        0.40
    } else {
        0.20
    }
}

/// Black-Litterman posterior builder.
#[derive(Debug, Clone, Copy)]
pub struct BlackLitterman {
    risk_aversion: f64,
    alpha_scalar: f64,
    tau: f64,
}

impl BlackLitterman {
    /// Builder with the given risk aversion and alpha scalar.
    #[must_use]
    pub fn new(risk_aversion: f64, alpha_scalar: f64) -> Self {
        Self { risk_aversion, alpha_scalar, tau: BL_TAU }
    }

    /// Build views from the composite scores restricted to `tickers`.
    ///
    /// `q_i = z_total_i * sigma_i * alpha`, where `sigma_i` is the
    /// ticker's own annualized volatility from the covariance diagonal.
    #[must_use]
    pub fn views(
        &self,
        tickers: &[Ticker],
        sigma: &Array2<f64>,
        scores: &FactorScores,
    ) -> ViewSet {
        let mut q = Vec::with_capacity(tickers.len());
        let mut confidence = Vec::with_capacity(tickers.len());
        for (i, ticker) in tickers.iter().enumerate() {
            let vol_i = sigma[(i, i)].max(0.0).sqrt();
            match scores.get(ticker) {
                Some(s) => {
                    q.push(s.total * vol_i * self.alpha_scalar);
                    confidence.push(confidence_from_spread(population_std(&[
                        s.z_value, s.z_quality, s.z_momentum,
                    ])));
                }
                None => {
                    q.push(0.0);
                    confidence.push(confidence_from_spread(0.0));
                }
            }
        }
        ViewSet { tickers: tickers.to_vec(), q, confidence }
    }

    /// Compute the posterior over `tickers`.
    ///
    /// `sigma` is the annualized return covariance in ticker order,
    /// `market_caps` supplies the prior weights, and `macro_scalar`
    /// multiplies the equilibrium returns (1.0 = neutral).
    ///
    /// The computation is pure: identical inputs produce bit-identical
    /// output.
    ///
    /// # Errors
    ///
    /// - [`CadizError::EmptyOptimizationSet`] when `tickers` is empty.
    /// - [`CadizError::DataUnavailable`] when a ticker has no market cap.
    /// - [`CadizError::CovarianceIllConditioned`] when the blended system
    ///   cannot be inverted.
    pub fn posterior(
        &self,
        tickers: &[Ticker],
        market_caps: &BTreeMap<Ticker, f64>,
        sigma: &Array2<f64>,
        scores: &FactorScores,
        macro_scalar: f64,
    ) -> Result<Posterior> {
        let n = tickers.len();
        if n == 0 {
            return Err(CadizError::EmptyOptimizationSet);
        }
        debug_assert_eq!(sigma.nrows(), n);
        debug_assert_eq!(sigma.ncols(), n);

        let mut caps = Array1::<f64>::zeros(n);
        for (i, ticker) in tickers.iter().enumerate() {
            let cap = market_caps.get(ticker).copied().ok_or_else(|| {
                CadizError::DataUnavailable(format!("no market cap for {ticker}"))
            })?;
            if !(cap.is_finite() && cap > 0.0) {
                return Err(CadizError::DataUnavailable(format!(
                    "non-positive market cap {cap} for {ticker}"
                )));
            }
            caps[i] = cap;
        }
        let total_cap = caps.sum();
        let market_weights = &caps / total_cap;

        // pi = s * delta * Sigma * w_mkt
        let prior = sigma.dot(&market_weights) * (self.risk_aversion * macro_scalar);

        let views = self.views(tickers, sigma, scores);
        let q = Array1::from_vec(views.q.clone());

        // Idzorek-style omega: diagonal entries sized so a view's pull on
        // the posterior matches its stated confidence. With an identity
        // pick matrix this reduces to tau * sigma_ii * (1 - c) / c.
        let tau_sigma = sigma * self.tau;
        let mut system = tau_sigma.clone();
        for i in 0..n {
            let c = views.confidence[i].clamp(1e-3, 1.0 - 1e-3);
            system[(i, i)] += self.tau * sigma[(i, i)] * (1.0 - c) / c;
        }

        let system_inv = inverse(&system).ok_or_else(|| {
            CadizError::CovarianceIllConditioned(
                "view blending system is singular".to_string(),
            )
        })?;

        // mu = pi + tau*Sigma * (tau*Sigma + Omega)^-1 * (q - pi)
        let innovation = &q - &prior;
        let mean = &prior + &tau_sigma.dot(&system_inv.dot(&innovation));

        // Sigma_post = Sigma + tau*Sigma - tau*Sigma (tau*Sigma + Omega)^-1 tau*Sigma
        let correction = tau_sigma.dot(&system_inv.dot(&tau_sigma));
        let covariance = symmetrize(&(sigma + &tau_sigma - &correction));

        Ok(Posterior {
            tickers: tickers.to_vec(),
            mean,
            covariance,
            prior,
            market_weights,
            views,
        })
    }
}
