//! Portfolio performance metrics.
//!
//! Computed from the daily equity curve produced by the driver, with
//! trade-level statistics over the per-rebalance-period returns.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use cadiz_traits::{Date, TRADING_DAYS_PER_YEAR};

/// Terminal metrics of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Total return over the run.
    pub total_return: f64,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualized volatility of daily returns.
    pub volatility: f64,
    /// Annualized Sharpe ratio.
    pub sharpe: f64,
    /// Annualized Sortino ratio (downside deviation denominator).
    pub sortino: f64,
    /// CAGR over absolute max drawdown.
    pub calmar: f64,
    /// Maximum drawdown (non-positive).
    pub max_drawdown: f64,
    /// Benchmark total return over the same window.
    pub benchmark_return: f64,
    /// Benchmark Sharpe over the same window.
    pub benchmark_sharpe: f64,
    /// Jensen's alpha vs the benchmark.
    pub alpha: f64,
    /// Beta vs the benchmark.
    pub beta: f64,
    /// Fraction of rebalance periods with positive return.
    pub win_rate: Option<f64>,
    /// Mean positive period return.
    pub avg_win: Option<f64>,
    /// Mean negative period return.
    pub avg_loss: Option<f64>,
    /// Sum of wins over absolute sum of losses.
    pub profit_factor: Option<f64>,
    /// Number of rebalances booked.
    pub num_rebalances: usize,
}

/// Daily simple returns from an equity curve.
#[must_use]
pub fn returns_from_equity(equity: &[f64]) -> Vec<f64> {
    equity.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Total return of an equity curve.
#[must_use]
pub fn total_return(equity: &[f64]) -> f64 {
    match (equity.first(), equity.last()) {
        (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

/// Compound annual growth rate over the calendar span of the curve.
#[must_use]
pub fn cagr(equity: &[f64], dates: &[Date]) -> f64 {
    if equity.len() < 2 || dates.len() != equity.len() {
        return 0.0;
    }
    let years = (dates[dates.len() - 1] - dates[0]).num_days() as f64 / 365.25;
    if years <= 0.0 || equity[0] <= 0.0 {
        return 0.0;
    }
    (equity[equity.len() - 1] / equity[0]).powf(1.0 / years) - 1.0
}

/// Annualized volatility of daily returns (sample standard deviation).
#[must_use]
pub fn volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * (TRADING_DAYS_PER_YEAR as f64).sqrt()
}

/// Annualized Sharpe ratio of daily returns against an annual risk-free
/// rate.
#[must_use]
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let vol = volatility(returns);
    if vol == 0.0 || returns.is_empty() {
        return 0.0;
    }
    (annualized_return(returns) - risk_free_rate) / vol
}

/// Annualized Sortino ratio: excess return over downside deviation.
#[must_use]
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return f64::INFINITY;
    }
    let downside_std = std_dev(&downside) * (TRADING_DAYS_PER_YEAR as f64).sqrt();
    if downside_std == 0.0 {
        return 0.0;
    }
    (annualized_return(returns) - risk_free_rate) / downside_std
}

/// Maximum drawdown and the full drawdown path (both non-positive).
#[must_use]
pub fn max_drawdown(equity: &[f64]) -> (f64, Vec<f64>) {
    let mut peak = f64::MIN;
    let mut path = Vec::with_capacity(equity.len());
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        let dd = if peak > 0.0 { (value - peak) / peak } else { 0.0 };
        worst = worst.min(dd);
        path.push(dd);
    }
    (worst, path)
}

/// CAGR over absolute max drawdown; zero when there was no drawdown.
#[must_use]
pub fn calmar_ratio(cagr: f64, max_drawdown: f64) -> f64 {
    if max_drawdown == 0.0 {
        0.0
    } else {
        cagr / max_drawdown.abs()
    }
}

/// Jensen's alpha and beta of daily portfolio returns against aligned
/// daily benchmark returns.
#[must_use]
pub fn alpha_beta(portfolio: &[f64], benchmark: &[f64], risk_free_rate: f64) -> (f64, f64) {
    let n = portfolio.len().min(benchmark.len());
    if n < 2 {
        return (0.0, 1.0);
    }
    let p = &portfolio[..n];
    let b = &benchmark[..n];
    let mean_p = mean(p);
    let mean_b = mean(b);

    let mut cov = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        cov += (p[i] - mean_p) * (b[i] - mean_b);
        var_b += (b[i] - mean_b).powi(2);
    }
    cov /= (n - 1) as f64;
    var_b /= (n - 1) as f64;

    let beta = if var_b == 0.0 { 1.0 } else { cov / var_b };
    let annual_p = annualized_return(p);
    let annual_b = annualized_return(b);
    let alpha = annual_p - (risk_free_rate + beta * (annual_b - risk_free_rate));
    (alpha, beta)
}

/// Win rate, average win, average loss, and profit factor over the
/// per-rebalance-period returns.
#[must_use]
pub fn trade_stats(
    period_returns: &[f64],
) -> (Option<f64>, Option<f64>, Option<f64>, Option<f64>) {
    if period_returns.is_empty() {
        return (None, None, None, None);
    }
    let wins: Vec<f64> = period_returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = period_returns.iter().copied().filter(|r| *r < 0.0).collect();

    let win_rate = wins.len() as f64 / period_returns.len() as f64;
    let avg_win = if wins.is_empty() { 0.0 } else { mean(&wins) };
    let avg_loss = if losses.is_empty() { 0.0 } else { mean(&losses) };
    let loss_sum: f64 = losses.iter().sum();
    let profit_factor = if loss_sum != 0.0 {
        wins.iter().sum::<f64>() / loss_sum.abs()
    } else if wins.is_empty() {
        0.0
    } else {
        f64::INFINITY
    };
    (Some(win_rate), Some(avg_win), Some(avg_loss), Some(profit_factor))
}

impl PerformanceMetrics {
    /// Compute the full metrics block from aligned daily curves.
    ///
    /// `dates`, `equity`, and `benchmark_equity` must be parallel; the
    /// period returns are the per-rebalance holding-period returns.
    #[must_use]
    pub fn compute(
        dates: &[Date],
        equity: &[f64],
        benchmark_equity: &[f64],
        period_returns: &[f64],
        num_rebalances: usize,
        risk_free_rate: f64,
    ) -> Self {
        let returns = returns_from_equity(equity);
        let benchmark_returns = returns_from_equity(benchmark_equity);

        let total = total_return(equity);
        let growth = cagr(equity, dates);
        let (max_dd, _) = max_drawdown(equity);
        let (alpha, beta) = alpha_beta(&returns, &benchmark_returns, risk_free_rate);
        let (win_rate, avg_win, avg_loss, profit_factor) = trade_stats(period_returns);

        Self {
            total_return: total,
            cagr: growth,
            volatility: volatility(&returns),
            sharpe: sharpe_ratio(&returns, risk_free_rate),
            sortino: sortino_ratio(&returns, risk_free_rate),
            calmar: calmar_ratio(growth, max_dd),
            max_drawdown: max_dd,
            benchmark_return: total_return(benchmark_equity),
            benchmark_sharpe: sharpe_ratio(&benchmark_returns, risk_free_rate),
            alpha,
            beta,
            win_rate,
            avg_win,
            avg_loss,
            profit_factor,
            num_rebalances,
        }
    }

    /// The metrics as a two-column `(metric, value)` table.
    ///
    /// # Errors
    ///
    /// Propagates polars construction errors.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let names = vec![
            "total_return",
            "cagr",
            "volatility",
            "sharpe",
            "sortino",
            "calmar",
            "max_drawdown",
            "benchmark_return",
            "benchmark_sharpe",
            "alpha",
            "beta",
            "win_rate",
            "avg_win",
            "avg_loss",
            "profit_factor",
            "num_rebalances",
        ];
        let values = vec![
            self.total_return,
            self.cagr,
            self.volatility,
            self.sharpe,
            self.sortino,
            self.calmar,
            self.max_drawdown,
            self.benchmark_return,
            self.benchmark_sharpe,
            self.alpha,
            self.beta,
            self.win_rate.unwrap_or(f64::NAN),
            self.avg_win.unwrap_or(f64::NAN),
            self.avg_loss.unwrap_or(f64::NAN),
            self.profit_factor.unwrap_or(f64::NAN),
            self.num_rebalances as f64,
        ];
        DataFrame::new(vec![
            Column::new("metric".into(), names),
            Column::new("value".into(), values),
        ])
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64).sqrt()
}

/// Geometric annualization of mean daily return.
fn annualized_return(returns: &[f64]) -> f64 {
    (1.0 + mean(returns)).powi(TRADING_DAYS_PER_YEAR as i32) - 1.0
}
