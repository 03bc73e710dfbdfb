//! Objective dispatch and portfolio assembly.
//!
//! Every objective reduces to quadratic-utility solves over the same
//! constraint polytope. The ratio and target objectives (max Sharpe,
//! efficient risk, efficient return) sweep the risk-aversion parameter
//! along the constrained frontier: Sharpe is unimodal along that path and
//! volatility/return are monotone in the parameter, so golden-section and
//! bisection searches are exact up to tolerance. A tiny ridge on the
//! quadratic term selects the interior point of any optimal face, making
//! the output deterministic.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use cadiz_factors::FactorScores;
use cadiz_traits::config::{Objective, TradingMode};
use cadiz_traits::{CadizError, Result, Sector, StrategyConfig, Ticker};

use crate::black_litterman::Posterior;
use crate::linalg::quadratic_form;
use crate::solver::{solve_qp, ConstraintSet};

/// Ridge added to every quadratic term for strict convexity.
const TIE_BREAK_RIDGE: f64 = 1e-8;

/// Weights below this are treated as numerical dust and zeroed.
const MIN_WEIGHT: f64 = 1e-4;

/// Risk-aversion sweep range (log10 endpoints).
const SWEEP_LOG_LO: f64 = -2.0;
const SWEEP_LOG_HI: f64 = 3.0;
const SWEEP_ITERS: usize = 60;

/// An optimized portfolio with its headline statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSolution {
    /// Final weights per ticker (zeros included).
    pub weights: BTreeMap<Ticker, f64>,
    /// Expected annual return `mu . w`.
    pub expected_return: f64,
    /// Annualized volatility `sqrt(w . Sigma . w)`.
    pub volatility: f64,
    /// Sharpe ratio of the solution.
    pub sharpe: f64,
    /// Non-fatal conditions encountered while solving.
    pub warnings: Vec<String>,
}

impl PortfolioSolution {
    /// Sum of signed weights.
    #[must_use]
    pub fn net_exposure(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Sum of absolute weights.
    #[must_use]
    pub fn gross_exposure(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }
}

/// Constrained mean-variance optimizer over a Black-Litterman posterior.
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    weight_bounds: (f64, f64),
    sector_cap: f64,
    risk_free_rate: f64,
    risk_aversion: f64,
    min_target_sharpe: Option<f64>,
}

impl PortfolioOptimizer {
    /// Optimizer with explicit parameters.
    #[must_use]
    pub fn new(
        weight_bounds: (f64, f64),
        sector_cap: f64,
        risk_free_rate: f64,
        risk_aversion: f64,
    ) -> Self {
        Self {
            weight_bounds,
            sector_cap,
            risk_free_rate,
            risk_aversion,
            min_target_sharpe: None,
        }
    }

    /// Optimizer configured from the strategy record.
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            weight_bounds: config.weight_bounds,
            sector_cap: config.sector_cap,
            risk_free_rate: config.risk_free_rate,
            risk_aversion: config.risk_aversion,
            min_target_sharpe: config.min_target_sharpe,
        }
    }

    /// Attach a minimum-Sharpe floor (max-Sharpe solves warn below 95% of
    /// it).
    #[must_use]
    pub fn with_min_target_sharpe(mut self, floor: Option<f64>) -> Self {
        self.min_target_sharpe = floor;
        self
    }

    /// Solve for portfolio weights.
    ///
    /// # Errors
    ///
    /// - [`CadizError::EmptyOptimizationSet`] for an empty posterior.
    /// - [`CadizError::ConfigurationInvalid`] when position bounds cannot
    ///   absorb the requested exposure.
    /// - [`CadizError::SolverInfeasible`] when a target objective is
    ///   unreachable or the constraint polytope is empty.
    pub fn optimize(
        &self,
        posterior: &Posterior,
        sectors: &BTreeMap<Ticker, Sector>,
        objective: Objective,
        mode: TradingMode,
        scores: &FactorScores,
    ) -> Result<PortfolioSolution> {
        if posterior.tickers.is_empty() {
            return Err(CadizError::EmptyOptimizationSet);
        }
        match mode {
            TradingMode::LongOnly => self.optimize_long_only(posterior, sectors, objective),
            TradingMode::LongShort { long_exposure, short_exposure } => self.optimize_long_short(
                posterior,
                sectors,
                scores,
                long_exposure,
                short_exposure,
            ),
        }
    }

    fn optimize_long_only(
        &self,
        posterior: &Posterior,
        sectors: &BTreeMap<Ticker, Sector>,
        objective: Objective,
    ) -> Result<PortfolioSolution> {
        let mut warnings = Vec::new();
        let constraints =
            self.build_constraints(&posterior.tickers, sectors, 1.0, &mut warnings)?;

        let w = self.solve_objective(&posterior.mean, &posterior.covariance, &constraints, objective)?;
        let w = clean_weights(&w, &constraints);

        let mut solution = self.package(posterior, &posterior.tickers, &w, warnings);
        if matches!(objective, Objective::MaxSharpe) {
            self.check_sharpe_floor(&mut solution);
        }
        Ok(solution)
    }

    /// Two-leg decomposition: max-Sharpe long book over the positive
    /// composites, the inverse problem over the negative composites, with
    /// the short leg charged against each sector's remaining gross
    /// capacity.
    fn optimize_long_short(
        &self,
        posterior: &Posterior,
        sectors: &BTreeMap<Ticker, Sector>,
        scores: &FactorScores,
        long_exposure: f64,
        short_exposure: f64,
    ) -> Result<PortfolioSolution> {
        let mut warnings = Vec::new();

        let mut long_idx = Vec::new();
        let mut short_idx = Vec::new();
        for (i, ticker) in posterior.tickers.iter().enumerate() {
            let total = scores.get(ticker).map_or(0.0, |s| s.total);
            if total > 0.0 {
                long_idx.push(i);
            } else if total < 0.0 {
                short_idx.push(i);
            }
        }
        if long_idx.is_empty() {
            return Err(CadizError::SolverInfeasible(
                "no positive-composite tickers for the long leg".to_string(),
            ));
        }

        // Long leg.
        let (long_tickers, long_mu, long_sigma) = restrict(posterior, &long_idx);
        let long_constraints =
            self.build_constraints(&long_tickers, sectors, long_exposure, &mut warnings)?;
        let long_w = self.max_sharpe(&long_mu, &long_sigma, &long_constraints)?;
        let long_w = clean_weights(&long_w, &long_constraints);

        // Charge the long leg's gross against each sector cap.
        let mut used: BTreeMap<Sector, f64> = BTreeMap::new();
        for (k, ticker) in long_tickers.iter().enumerate() {
            let sector = sectors.get(ticker).copied().unwrap_or(Sector::Unknown);
            *used.entry(sector).or_insert(0.0) += long_w[k].abs();
        }

        // Short leg on the negated posterior.
        let mut short_w = Array1::<f64>::zeros(short_idx.len());
        let mut short_tickers = Vec::new();
        if short_idx.is_empty() {
            if short_exposure > 0.0 {
                warnings
                    .push("no negative-composite tickers; short leg left empty".to_string());
                warn!("short leg requested but no candidates");
            }
        } else {
            let (tickers, mu, sigma) = restrict(posterior, &short_idx);
            let inverted = mu.mapv(|m| -m);
            let remaining: BTreeMap<Sector, f64> = Sector::NAMED
                .into_iter()
                .chain([Sector::Unknown])
                .map(|s| (s, (self.sector_cap - used.get(&s).copied().unwrap_or(0.0)).max(0.0)))
                .collect();
            let constraints = self.build_leg_constraints(
                &tickers,
                sectors,
                short_exposure,
                &remaining,
                &mut warnings,
            )?;
            short_w = self.max_sharpe(&inverted, &sigma, &constraints)?;
            short_w = clean_weights(&short_w, &constraints);
            short_tickers = tickers;
        }

        // Combine signed weights over the full ticker set.
        let mut combined: BTreeMap<Ticker, f64> =
            posterior.tickers.iter().map(|t| (t.clone(), 0.0)).collect();
        for (k, ticker) in long_tickers.iter().enumerate() {
            combined.insert(ticker.clone(), long_w[k]);
        }
        for (k, ticker) in short_tickers.iter().enumerate() {
            if short_w[k] != 0.0 {
                combined.insert(ticker.clone(), -short_w[k]);
            }
        }

        let w_full = Array1::from_iter(posterior.tickers.iter().map(|t| combined[t]));
        let mut solution = self.package(posterior, &posterior.tickers, &w_full, warnings);
        self.check_sharpe_floor(&mut solution);
        Ok(solution)
    }

    /// Constraint set for one book: box, budget, and per-sector caps.
    ///
    /// When the sector caps cannot absorb the requested budget the budget
    /// relaxes to the available capacity (the remainder is cash); when the
    /// position bounds alone cannot, the configuration is rejected.
    fn build_constraints(
        &self,
        tickers: &[Ticker],
        sectors: &BTreeMap<Ticker, Sector>,
        budget: f64,
        warnings: &mut Vec<String>,
    ) -> Result<ConstraintSet> {
        let full_caps: BTreeMap<Sector, f64> = Sector::NAMED
            .into_iter()
            .chain([Sector::Unknown])
            .map(|s| (s, self.sector_cap))
            .collect();
        self.build_leg_constraints(tickers, sectors, budget, &full_caps, warnings)
    }

    /// Leg weights are magnitudes, so the lower bound is floored at zero
    /// regardless of the configured minimum.
    fn build_leg_constraints(
        &self,
        tickers: &[Ticker],
        sectors: &BTreeMap<Ticker, Sector>,
        budget: f64,
        caps: &BTreeMap<Sector, f64>,
        warnings: &mut Vec<String>,
    ) -> Result<ConstraintSet> {
        let n = tickers.len();
        let (lo, hi) = self.weight_bounds;
        let lower = Array1::from_elem(n, lo.max(0.0));
        let upper = Array1::from_elem(n, hi);

        let box_capacity: f64 = upper.sum();
        if box_capacity < budget - 1e-9 {
            return Err(CadizError::ConfigurationInvalid(format!(
                "position bounds absorb at most {box_capacity}, below exposure {budget}"
            )));
        }

        let mut groups: BTreeMap<Sector, Vec<usize>> = BTreeMap::new();
        for (i, ticker) in tickers.iter().enumerate() {
            let sector = sectors.get(ticker).copied().unwrap_or(Sector::Unknown);
            groups.entry(sector).or_default().push(i);
        }
        let sector_caps: Vec<(Vec<usize>, f64)> = groups
            .into_iter()
            .map(|(sector, members)| {
                let cap = caps.get(&sector).copied().unwrap_or(self.sector_cap);
                (members, cap)
            })
            .collect();

        let mut set =
            ConstraintSet::new(lower, upper, budget).with_sector_caps(sector_caps);

        let capacity = set.capacity();
        if capacity < budget - 1e-9 {
            debug!(capacity, budget, "sector caps bind below the requested exposure");
            warnings.push(format!(
                "sector caps absorb only {capacity:.4} of the {budget:.4} exposure; remainder held as cash"
            ));
            set.budget = capacity;
        }
        set.check_feasible()?;
        Ok(set)
    }

    fn solve_objective(
        &self,
        mu: &Array1<f64>,
        sigma: &Array2<f64>,
        constraints: &ConstraintSet,
        objective: Objective,
    ) -> Result<Array1<f64>> {
        match objective {
            Objective::MinVariance => {
                let q = ridged(sigma, 1.0);
                solve_qp(&q, &Array1::zeros(mu.len()), constraints)
            }
            Objective::MaxQuadraticUtility => {
                let q = ridged(sigma, self.risk_aversion);
                solve_qp(&q, mu, constraints)
            }
            Objective::MaxSharpe => self.max_sharpe(mu, sigma, constraints),
            Objective::EfficientRisk { target_vol } => {
                self.efficient_risk(mu, sigma, constraints, target_vol)
            }
            Objective::EfficientReturn { target_return } => {
                self.efficient_return(mu, sigma, constraints, target_return)
            }
        }
    }

    /// Golden-section sweep of the risk-aversion parameter, maximizing the
    /// Sharpe ratio of the quadratic-utility solution.
    fn max_sharpe(
        &self,
        mu: &Array1<f64>,
        sigma: &Array2<f64>,
        constraints: &ConstraintSet,
    ) -> Result<Array1<f64>> {
        let excess = mu.mapv(|m| m - self.risk_free_rate);
        let eval = |log_delta: f64| -> Result<(Array1<f64>, f64)> {
            let q = ridged(sigma, 10f64.powf(log_delta));
            let w = solve_qp(&q, &excess, constraints)?;
            let vol = quadratic_form(sigma, &w).max(0.0).sqrt();
            let sharpe = if vol > 1e-12 { excess.dot(&w) / vol } else { f64::NEG_INFINITY };
            Ok((w, sharpe))
        };

        let phi = 0.5 * (5f64.sqrt() - 1.0);
        let (mut a, mut b) = (SWEEP_LOG_LO, SWEEP_LOG_HI);
        let mut x1 = b - phi * (b - a);
        let mut x2 = a + phi * (b - a);
        let (mut w1, mut s1) = eval(x1)?;
        let (mut w2, mut s2) = eval(x2)?;

        for _ in 0..SWEEP_ITERS {
            if s1 >= s2 {
                b = x2;
                x2 = x1;
                w2 = w1.clone();
                s2 = s1;
                x1 = b - phi * (b - a);
                let r = eval(x1)?;
                w1 = r.0;
                s1 = r.1;
            } else {
                a = x1;
                x1 = x2;
                w1 = w2.clone();
                s1 = s2;
                x2 = a + phi * (b - a);
                let r = eval(x2)?;
                w2 = r.0;
                s2 = r.1;
            }
        }
        Ok(if s1 >= s2 { w1 } else { w2 })
    }

    /// Maximize return subject to a volatility ceiling: bisection on the
    /// risk-aversion parameter (volatility decreases as it grows).
    fn efficient_risk(
        &self,
        mu: &Array1<f64>,
        sigma: &Array2<f64>,
        constraints: &ConstraintSet,
        target_vol: f64,
    ) -> Result<Array1<f64>> {
        let solve_at = |log_delta: f64| -> Result<(Array1<f64>, f64)> {
            let q = ridged(sigma, 10f64.powf(log_delta));
            let w = solve_qp(&q, mu, constraints)?;
            let vol = quadratic_form(sigma, &w).max(0.0).sqrt();
            Ok((w, vol))
        };

        let (w_hi, vol_hi) = solve_at(SWEEP_LOG_HI + 3.0)?; // near min-variance
        if vol_hi > target_vol + 1e-9 {
            return Err(CadizError::SolverInfeasible(format!(
                "volatility floor {vol_hi:.4} exceeds target {target_vol:.4}"
            )));
        }
        let (w_lo, vol_lo) = solve_at(SWEEP_LOG_LO)?;
        if vol_lo <= target_vol {
            return Ok(w_lo); // even the most aggressive frontier point fits
        }

        let (mut a, mut b) = (SWEEP_LOG_LO, SWEEP_LOG_HI + 3.0);
        let mut best = w_hi;
        for _ in 0..SWEEP_ITERS {
            let mid = 0.5 * (a + b);
            let (w, vol) = solve_at(mid)?;
            if vol <= target_vol {
                best = w;
                b = mid; // try a more aggressive (smaller-delta) point
            } else {
                a = mid;
            }
        }
        Ok(best)
    }

    /// Minimize variance subject to a return floor: bisection on the
    /// risk-aversion parameter (return decreases as it grows).
    fn efficient_return(
        &self,
        mu: &Array1<f64>,
        sigma: &Array2<f64>,
        constraints: &ConstraintSet,
        target_return: f64,
    ) -> Result<Array1<f64>> {
        let solve_at = |log_delta: f64| -> Result<(Array1<f64>, f64)> {
            let q = ridged(sigma, 10f64.powf(log_delta));
            let w = solve_qp(&q, mu, constraints)?;
            Ok((w.clone(), mu.dot(&w)))
        };

        let (w_lo, ret_lo) = solve_at(SWEEP_LOG_LO)?;
        if ret_lo < target_return - 1e-9 {
            return Err(CadizError::SolverInfeasible(format!(
                "maximum attainable return {ret_lo:.4} below target {target_return:.4}"
            )));
        }
        let (w_hi, ret_hi) = solve_at(SWEEP_LOG_HI + 3.0)?;
        if ret_hi >= target_return {
            return Ok(w_hi); // min-variance already clears the floor
        }

        let (mut a, mut b) = (SWEEP_LOG_LO, SWEEP_LOG_HI + 3.0);
        let mut best = w_lo;
        for _ in 0..SWEEP_ITERS {
            let mid = 0.5 * (a + b);
            let (w, ret) = solve_at(mid)?;
            if ret >= target_return {
                best = w;
                a = mid; // push toward lower variance
            } else {
                b = mid;
            }
        }
        Ok(best)
    }

    fn package(
        &self,
        posterior: &Posterior,
        tickers: &[Ticker],
        w: &Array1<f64>,
        warnings: Vec<String>,
    ) -> PortfolioSolution {
        let expected_return = posterior.mean.dot(w);
        let volatility = quadratic_form(&posterior.covariance, w).max(0.0).sqrt();
        let invested: f64 = w.sum();
        let sharpe = if volatility > 1e-12 {
            (expected_return - self.risk_free_rate * invested) / volatility
        } else {
            0.0
        };
        PortfolioSolution {
            weights: tickers.iter().cloned().zip(w.iter().copied()).collect(),
            expected_return,
            volatility,
            sharpe,
            warnings,
        }
    }

    fn check_sharpe_floor(&self, solution: &mut PortfolioSolution) {
        if let Some(floor) = self.min_target_sharpe {
            if solution.sharpe < 0.95 * floor {
                let message = format!(
                    "achieved Sharpe {:.2} below 95% of the {:.2} floor; returning the unconstrained solution",
                    solution.sharpe, floor
                );
                warn!("{message}");
                solution.warnings.push(message);
            }
        }
    }
}

/// `delta * Sigma + ridge * I`.
fn ridged(sigma: &Array2<f64>, delta: f64) -> Array2<f64> {
    let n = sigma.nrows();
    let mut q = sigma * delta;
    for i in 0..n {
        q[(i, i)] += TIE_BREAK_RIDGE;
    }
    q
}

/// Restrict a posterior to a subset of indices.
fn restrict(posterior: &Posterior, indices: &[usize]) -> (Vec<Ticker>, Array1<f64>, Array2<f64>) {
    let tickers = indices.iter().map(|&i| posterior.tickers[i].clone()).collect();
    let mu = Array1::from_iter(indices.iter().map(|&i| posterior.mean[i]));
    let k = indices.len();
    let mut sigma = Array2::<f64>::zeros((k, k));
    for (a, &i) in indices.iter().enumerate() {
        for (b, &j) in indices.iter().enumerate() {
            sigma[(a, b)] = posterior.covariance[(i, j)];
        }
    }
    (tickers, mu, sigma)
}

/// Zero numerical dust and hand its mass to the largest positions that
/// still have headroom, keeping the sum and every bound intact.
fn clean_weights(w: &Array1<f64>, constraints: &ConstraintSet) -> Array1<f64> {
    let mut cleaned = w.clone();
    let mut dust = 0.0;
    for (i, value) in w.iter().enumerate() {
        if value.abs() < MIN_WEIGHT && constraints.lower[i] <= 0.0 {
            dust += value;
            cleaned[i] = 0.0;
        }
    }
    if dust.abs() < f64::EPSILON {
        return cleaned;
    }

    let mut order: Vec<usize> = (0..cleaned.len()).collect();
    order.sort_by(|&a, &b| cleaned[b].partial_cmp(&cleaned[a]).unwrap_or(std::cmp::Ordering::Equal));
    for i in order {
        if cleaned[i] == 0.0 {
            continue;
        }
        let headroom = constraints.upper[i] - cleaned[i];
        let add = dust.min(headroom);
        cleaned[i] += add;
        dust -= add;
        if dust.abs() < f64::EPSILON {
            break;
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::black_litterman::{Posterior, ViewSet};
    use approx::assert_relative_eq;
    use cadiz_traits::config::FactorWeights;
    use cadiz_traits::Date;
    use ndarray::arr1;

    fn diag_sigma(vols: &[f64]) -> Array2<f64> {
        let n = vols.len();
        let mut sigma = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            sigma[(i, i)] = vols[i] * vols[i];
        }
        sigma
    }

    fn posterior_of(tickers: &[&str], mu: &[f64], sigma: Array2<f64>) -> Posterior {
        let n = tickers.len();
        Posterior {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
            mean: arr1(mu),
            covariance: sigma,
            prior: Array1::zeros(n),
            market_weights: Array1::from_elem(n, 1.0 / n as f64),
            views: ViewSet {
                tickers: tickers.iter().map(|t| t.to_string()).collect(),
                q: vec![0.0; n],
                confidence: vec![0.5; n],
            },
        }
    }

    fn scores_of(tickers: &[&str], totals: &[f64]) -> FactorScores {
        let z = arr1(totals);
        FactorScores::new(
            Date::from_ymd_opt(2023, 6, 30).unwrap(),
            tickers.iter().map(|t| t.to_string()).collect(),
            z.clone(),
            z.clone(),
            z,
            FactorWeights::default(),
        )
    }

    fn sectors_of(pairs: &[(&str, Sector)]) -> BTreeMap<Ticker, Sector> {
        pairs.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    fn optimizer() -> PortfolioOptimizer {
        PortfolioOptimizer::new((0.0, 0.30), 0.35, 0.02, 2.5)
    }

    #[test]
    fn test_long_only_weights_sum_to_one() {
        let tickers = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"];
        let sectors = sectors_of(&[
            ("AAA", Sector::Technology),
            ("BBB", Sector::Healthcare),
            ("CCC", Sector::Energy),
            ("DDD", Sector::Utilities),
            ("EEE", Sector::Industrials),
            ("FFF", Sector::FinancialServices),
        ]);
        let posterior = posterior_of(
            &tickers,
            &[0.08, 0.06, 0.05, 0.04, 0.07, 0.05],
            diag_sigma(&[0.2, 0.25, 0.3, 0.15, 0.22, 0.18]),
        );
        let solution = optimizer()
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0; 6]),
            )
            .unwrap();

        assert_relative_eq!(solution.net_exposure(), 1.0, epsilon = 1e-6);
        for (_, &w) in &solution.weights {
            assert!(w >= -1e-9, "long-only weight went negative: {w}");
            assert!(w <= 0.30 + 1e-6);
        }
    }

    #[test]
    fn test_min_variance_prefers_low_vol() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        let posterior =
            posterior_of(&tickers, &[0.05, 0.05], diag_sigma(&[0.4, 0.1]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MinVariance,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[0.0, 0.0]),
            )
            .unwrap();
        assert!(solution.weights["BBB"] > 0.9);
    }

    #[test]
    fn test_max_sharpe_prefers_high_ratio() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        // Same vol, very different return: all weight goes to AAA up to
        // the position bound.
        let posterior =
            posterior_of(&tickers, &[0.15, 0.03], diag_sigma(&[0.2, 0.2]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0, -1.0]),
            )
            .unwrap();
        assert!(solution.weights["AAA"] > solution.weights["BBB"]);
        assert!(solution.sharpe > 0.0);
    }

    #[test]
    fn test_sector_cap_relaxes_budget_to_capacity() {
        // Every ticker in one sector: at most the sector cap is invested.
        let tickers = ["AAA", "BBB", "CCC", "DDD"];
        let sectors = sectors_of(&[
            ("AAA", Sector::Technology),
            ("BBB", Sector::Technology),
            ("CCC", Sector::Technology),
            ("DDD", Sector::Technology),
        ]);
        let posterior = posterior_of(
            &tickers,
            &[0.08, 0.07, 0.06, 0.05],
            diag_sigma(&[0.2, 0.2, 0.2, 0.2]),
        );
        let solution = optimizer()
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0, 1.0, 1.0, 1.0]),
            )
            .unwrap();
        assert_relative_eq!(solution.net_exposure(), 0.35, epsilon = 1e-6);
        assert!(!solution.warnings.is_empty());
    }

    #[test]
    fn test_single_ticker_full_budget_when_bounds_allow() {
        let tickers = ["AAA"];
        let sectors = sectors_of(&[("AAA", Sector::Technology)]);
        let posterior = posterior_of(&tickers, &[0.06], diag_sigma(&[0.2]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0]),
            )
            .unwrap();
        assert_relative_eq!(solution.weights["AAA"], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_single_ticker_tight_bounds_rejected() {
        let tickers = ["AAA"];
        let sectors = sectors_of(&[("AAA", Sector::Technology)]);
        let posterior = posterior_of(&tickers, &[0.06], diag_sigma(&[0.2]));
        let result = optimizer().optimize(
            &posterior,
            &sectors,
            Objective::MaxSharpe,
            TradingMode::LongOnly,
            &scores_of(&tickers, &[1.0]),
        );
        assert!(matches!(result, Err(CadizError::ConfigurationInvalid(_))));
    }

    #[test]
    fn test_efficient_risk_respects_ceiling() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        let posterior =
            posterior_of(&tickers, &[0.12, 0.04], diag_sigma(&[0.3, 0.1]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::EfficientRisk { target_vol: 0.15 },
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0, 0.0]),
            )
            .unwrap();
        assert!(solution.volatility <= 0.15 + 1e-4);
        // And it should take on meaningful risk to chase return.
        assert!(solution.weights["AAA"] > 0.2);
    }

    #[test]
    fn test_efficient_risk_infeasible_target() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        let posterior =
            posterior_of(&tickers, &[0.12, 0.04], diag_sigma(&[0.3, 0.25]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let result = optimizer.optimize(
            &posterior,
            &sectors,
            Objective::EfficientRisk { target_vol: 0.01 },
            TradingMode::LongOnly,
            &scores_of(&tickers, &[1.0, 0.0]),
        );
        assert!(matches!(result, Err(CadizError::SolverInfeasible(_))));
    }

    #[test]
    fn test_efficient_return_minimizes_variance_at_floor() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        let posterior =
            posterior_of(&tickers, &[0.12, 0.04], diag_sigma(&[0.3, 0.1]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::EfficientReturn { target_return: 0.08 },
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0, 0.0]),
            )
            .unwrap();
        assert!(solution.expected_return >= 0.08 - 1e-4);

        let result = optimizer.optimize(
            &posterior,
            &sectors,
            Objective::EfficientReturn { target_return: 0.50 },
            TradingMode::LongOnly,
            &scores_of(&tickers, &[1.0, 0.0]),
        );
        assert!(matches!(result, Err(CadizError::SolverInfeasible(_))));
    }

    #[test]
    fn test_sharpe_floor_warns() {
        let tickers = ["AAA", "BBB"];
        let sectors =
            sectors_of(&[("AAA", Sector::Technology), ("BBB", Sector::Energy)]);
        let posterior =
            posterior_of(&tickers, &[0.05, 0.04], diag_sigma(&[0.3, 0.25]));
        let optimizer = PortfolioOptimizer::new((0.0, 1.0), 1.0, 0.02, 2.5)
            .with_min_target_sharpe(Some(5.0));
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongOnly,
                &scores_of(&tickers, &[1.0, 0.0]),
            )
            .unwrap();
        assert!(solution.warnings.iter().any(|w| w.contains("floor")));
        // The solution itself is still returned.
        assert_relative_eq!(solution.net_exposure(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_long_short_exposures() {
        let n = 8;
        let tickers: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
        let ticker_refs: Vec<&str> = tickers.iter().map(String::as_str).collect();
        let sector_pairs: Vec<(&str, Sector)> = ticker_refs
            .iter()
            .enumerate()
            .map(|(i, t)| {
                (*t, if i % 2 == 0 { Sector::Technology } else { Sector::Energy })
            })
            .collect();
        let sectors = sectors_of(&sector_pairs);

        let mu: Vec<f64> =
            (0..n).map(|i| if i < 4 { 0.10 - i as f64 * 0.01 } else { -0.02 - i as f64 * 0.01 }).collect();
        let vols = vec![0.2; n];
        let posterior = posterior_of(&ticker_refs, &mu, diag_sigma(&vols));
        let totals: Vec<f64> = (0..n).map(|i| if i < 4 { 1.0 } else { -1.0 }).collect();
        let scores = scores_of(&ticker_refs, &totals);

        let optimizer = PortfolioOptimizer::new((0.0, 0.6), 1.2, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongShort { long_exposure: 1.3, short_exposure: 0.3 },
                &scores,
            )
            .unwrap();

        assert_relative_eq!(solution.net_exposure(), 1.0, epsilon = 1e-5);
        assert!(solution.gross_exposure() <= 1.6 + 1e-5);
        assert!(solution.weights.values().any(|&w| w < 0.0), "expected a short position");
    }

    #[test]
    fn test_long_short_sector_cap_on_gross() {
        // Tech longs use most of the cap; tech shorts must fit in the rest.
        let tickers = ["LT1", "LT2", "SE1", "ST1"];
        let sectors = sectors_of(&[
            ("LT1", Sector::Technology),
            ("LT2", Sector::Technology),
            ("SE1", Sector::Energy),
            ("ST1", Sector::Technology),
        ]);
        let posterior = posterior_of(
            &tickers,
            &[0.12, 0.10, -0.06, -0.08],
            diag_sigma(&[0.2, 0.2, 0.2, 0.2]),
        );
        let scores = scores_of(&tickers, &[1.0, 0.8, -0.5, -1.0]);
        let optimizer = PortfolioOptimizer::new((0.0, 0.6), 0.8, 0.02, 2.5);
        let solution = optimizer
            .optimize(
                &posterior,
                &sectors,
                Objective::MaxSharpe,
                TradingMode::LongShort { long_exposure: 1.0, short_exposure: 0.3 },
                &scores,
            )
            .unwrap();

        let tech_gross: f64 = ["LT1", "LT2", "ST1"]
            .iter()
            .map(|t| solution.weights[*t].abs())
            .sum();
        assert!(tech_gross <= 0.8 + 1e-5, "tech gross {tech_gross} breaches the cap");
    }

    #[test]
    fn test_clean_weights_removes_dust() {
        let constraints = ConstraintSet::new(
            Array1::zeros(3),
            Array1::from_elem(3, 1.0),
            1.0,
        );
        let w = arr1(&[0.99995, 0.00003, 0.00002]);
        let cleaned = clean_weights(&w, &constraints);
        assert_eq!(cleaned[1], 0.0);
        assert_eq!(cleaned[2], 0.0);
        assert_relative_eq!(cleaned.sum(), 1.0, epsilon = 1e-12);
    }
}
