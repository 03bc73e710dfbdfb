//! The walk-forward backtest driver.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use cadiz_factors::{FactorEngine, FactorTilts};
use cadiz_optimizer::covariance;
use cadiz_optimizer::{BlackLitterman, PortfolioOptimizer, PortfolioSolution};
use cadiz_regime::{
    exposure_for, CapeAdjuster, FactorRegimeAdjuster, MarketRegime, RegimeDetector,
};
use cadiz_traits::snapshot::PRICE_LOOKBACK_DAYS;
use cadiz_traits::{
    CadizError, Date, MarketDataProvider, MarketSnapshot, PriceSeries, Result, Sector,
    StrategyConfig, Ticker, UniverseResolver,
};

use crate::calendar::rebalance_dates;
use crate::diagnostics::{DroppedTickerEvent, RunDiagnostics, SkippedRebalance, SolverEvent};
use crate::ledger::{BacktestLedger, LedgerEntry};
use crate::performance::PerformanceMetrics;

/// Minimum universe size required to attempt a rebalance.
pub const MIN_UNIVERSE_SIZE: usize = 5;

/// Cooperative cancellation flag, checked once per rebalance date.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the run returns its ledger up to the last
    /// completed date.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// The structured result of one backtest run.
#[derive(Debug, Clone)]
pub struct BacktestReport {
    /// Per-rebalance records.
    pub ledger: BacktestLedger,
    /// Terminal performance metrics.
    pub metrics: PerformanceMetrics,
    /// Every skipped date, dropped ticker, retry, and warning.
    pub diagnostics: RunDiagnostics,
    /// Daily equity curve (normalized to 1.0 at the first rebalance).
    pub equity: Vec<(Date, f64)>,
    /// Set when the run stopped early (cancellation or a dead mandatory
    /// feed); the ledger covers everything up to the last good date.
    pub aborted: Option<String>,
}

/// Walk-forward backtest driver.
///
/// Owns its collaborators and is immutable across the run; the only state
/// that grows is the ledger and equity curve local to each `run` call.
/// Within a run, rebalance dates are processed in strictly increasing
/// order and every data request is parameterized by the date being
/// processed.
#[derive(Debug)]
pub struct BacktestDriver<P, R> {
    config: StrategyConfig,
    provider: P,
    resolver: R,
    engine: FactorEngine,
    black_litterman: BlackLitterman,
    optimizer: PortfolioOptimizer,
    cape: CapeAdjuster,
    factor_regime: FactorRegimeAdjuster,
    detector: RegimeDetector,
}

impl<P: MarketDataProvider, R: UniverseResolver> BacktestDriver<P, R> {
    /// Build a driver, validating the configuration up front.
    ///
    /// # Errors
    ///
    /// [`CadizError::ConfigurationInvalid`] for an inconsistent
    /// configuration; nothing runs.
    pub fn new(config: StrategyConfig, provider: P, resolver: R) -> Result<Self> {
        config.validate()?;
        let engine = FactorEngine::new(config.factor_weights);
        let black_litterman = BlackLitterman::new(config.risk_aversion, config.alpha_scalar);
        let optimizer = PortfolioOptimizer::from_config(&config);
        let cape = CapeAdjuster::from_config(&config);
        let factor_regime = FactorRegimeAdjuster::from_config(&config);
        Ok(Self {
            config,
            provider,
            resolver,
            engine,
            black_litterman,
            optimizer,
            cape,
            factor_regime,
            detector: RegimeDetector::new(),
        })
    }

    /// The configuration this driver runs with.
    #[must_use]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Run the walk-forward backtest over `[start, end]`.
    ///
    /// # Errors
    ///
    /// - [`CadizError::InvalidDate`] for an inverted or empty window.
    /// - [`CadizError::ProviderUnavailable`] when the benchmark feed
    ///   cannot be served at all (nothing to return).
    ///
    /// Mid-run failures of the universe feed do not error: they stop the
    /// run and surface in [`BacktestReport::aborted`].
    pub fn run(&self, start: Date, end: Date) -> Result<BacktestReport> {
        self.run_with_cancel(start, end, &CancelToken::new())
    }

    /// [`BacktestDriver::run`] with a cooperative cancellation token.
    ///
    /// # Errors
    ///
    /// Same as [`BacktestDriver::run`].
    pub fn run_with_cancel(
        &self,
        start: Date,
        end: Date,
        cancel: &CancelToken,
    ) -> Result<BacktestReport> {
        if start > end {
            return Err(CadizError::InvalidDate(format!(
                "backtest window inverted: {start} > {end}"
            )));
        }

        let benchmark = self
            .provider
            .benchmark_prices(start - Duration::days(7), end)
            .map_err(|err| CadizError::ProviderUnavailable(format!("benchmark: {err}")))?;
        let trading_days = benchmark.dates();

        let dates = rebalance_dates(start, end, self.config.rebalance_frequency, &trading_days);
        if dates.is_empty() {
            return Err(CadizError::InvalidDate(format!(
                "no rebalance dates between {start} and {end}"
            )));
        }
        info!(start = %start, end = %end, rebalances = dates.len(), "starting backtest");

        let mut ledger = BacktestLedger::new();
        let mut diagnostics = RunDiagnostics::default();
        let mut equity: Vec<(Date, f64)> = vec![(dates[0], 1.0)];
        let mut value = 1.0_f64;
        let mut period_returns: Vec<f64> = Vec::new();
        let mut current_weights: BTreeMap<Ticker, f64> = BTreeMap::new();
        let mut aborted = None;
        let mut last_processed = dates[0];

        for (k, &date) in dates.iter().enumerate() {
            if cancel.is_cancelled() {
                aborted = Some("cancelled".to_string());
                break;
            }

            if k > 0 {
                let value_before = value;
                value = self.accrue_period(
                    &current_weights,
                    dates[k - 1],
                    date,
                    &trading_days,
                    value,
                    &mut equity,
                    &mut diagnostics,
                );
                period_returns.push(value / value_before - 1.0);
            }
            last_processed = date;

            match self.rebalance_once(date, &mut ledger, &mut diagnostics) {
                Ok(Some(new_weights)) => {
                    value = self.charge_slippage(
                        date,
                        &current_weights,
                        &new_weights,
                        value,
                        &mut equity,
                        &mut diagnostics,
                    );
                    current_weights = new_weights;
                }
                Ok(None) => {
                    // Skipped or failed date: previous weights are held.
                }
                Err(err) => {
                    warn!(%err, date = %date, "aborting run");
                    aborted = Some(err.to_string());
                    break;
                }
            }
        }

        // Final stub period from the last processed rebalance to the end.
        if aborted.is_none() && end > last_processed {
            let value_before = value;
            let points_before = equity.len();
            value = self.accrue_period(
                &current_weights,
                last_processed,
                end,
                &trading_days,
                value,
                &mut equity,
                &mut diagnostics,
            );
            if equity.len() > points_before {
                period_returns.push(value / value_before - 1.0);
            }
        }

        let metrics = self.build_metrics(&equity, &benchmark, &period_returns, ledger.len());
        Ok(BacktestReport { ledger, metrics, diagnostics, equity, aborted })
    }

    /// Value the held book daily over `(from, to]`, buy-and-hold within
    /// the period, cash earning zero. Returns the end-of-period value.
    #[allow(clippy::too_many_arguments)]
    fn accrue_period(
        &self,
        weights: &BTreeMap<Ticker, f64>,
        from: Date,
        to: Date,
        trading_days: &[Date],
        start_value: f64,
        equity: &mut Vec<(Date, f64)>,
        diagnostics: &mut RunDiagnostics,
    ) -> f64 {
        let begin = trading_days.partition_point(|&d| d <= from);
        let finish = trading_days.partition_point(|&d| d <= to);
        let days = &trading_days[begin..finish];
        if days.is_empty() {
            return start_value;
        }

        // Relative price paths per held ticker, anchored at the period
        // start.
        let mut paths: Vec<(f64, PriceSeries, f64)> = Vec::new();
        let mut static_weight = 0.0;
        for (ticker, &weight) in weights {
            if weight == 0.0 {
                continue;
            }
            let fetched = self
                .provider
                .prices(ticker, to - Duration::days(PRICE_LOOKBACK_DAYS), to);
            match fetched {
                Ok(series) => match series.close_on_or_before(from) {
                    Some(base) => paths.push((weight, series, base)),
                    None => {
                        static_weight += weight;
                        diagnostics.dropped.push(DroppedTickerEvent {
                            date: to,
                            ticker: ticker.clone(),
                            reason: "no base price for holding period".to_string(),
                        });
                    }
                },
                Err(err) => {
                    static_weight += weight;
                    diagnostics.dropped.push(DroppedTickerEvent {
                        date: to,
                        ticker: ticker.clone(),
                        reason: format!("holding-period prices: {err}"),
                    });
                }
            }
        }

        let cash: f64 = 1.0 - weights.values().sum::<f64>();
        let mut end_value = start_value;
        for &day in days {
            let mut relative = cash + static_weight;
            for (weight, series, base) in &paths {
                let price = series.close_on_or_before(day).unwrap_or(*base);
                relative += weight * price / base;
            }
            end_value = start_value * relative;
            equity.push((day, end_value));
        }
        end_value
    }

    /// Subtract the optional flat slippage on turnover at a rebalance.
    fn charge_slippage(
        &self,
        date: Date,
        old_weights: &BTreeMap<Ticker, f64>,
        new_weights: &BTreeMap<Ticker, f64>,
        value: f64,
        equity: &mut Vec<(Date, f64)>,
        diagnostics: &mut RunDiagnostics,
    ) -> f64 {
        let turnover = turnover_between(old_weights, new_weights);
        diagnostics.turnover.push((date, turnover));

        let Some(bps) = self.config.slippage_bps else {
            return value;
        };
        let cost = turnover * bps / 10_000.0;
        if cost <= 0.0 {
            return value;
        }
        let charged = value * (1.0 - cost);
        if let Some(last) = equity.last_mut() {
            if last.0 == date {
                last.1 = charged;
            }
        }
        charged
    }

    /// One rebalance attempt: resolve, fetch, score, optimize, scale,
    /// book. Returns the new weights, or `None` when the date was skipped
    /// (prior weights are held).
    ///
    /// # Errors
    ///
    /// Only run-fatal conditions: an unreachable universe feed or an
    /// invalid configuration surfacing at solve time.
    fn rebalance_once(
        &self,
        date: Date,
        ledger: &mut BacktestLedger,
        diagnostics: &mut RunDiagnostics,
    ) -> Result<Option<BTreeMap<Ticker, f64>>> {
        let members = self
            .resolver
            .resolve(date)
            .map_err(|err| CadizError::ProviderUnavailable(format!("universe at {date}: {err}")))?;
        if members.len() < MIN_UNIVERSE_SIZE {
            debug!(date = %date, size = members.len(), "skipping: universe too small");
            diagnostics.skipped.push(SkippedRebalance {
                date,
                reason: format!(
                    "universe has {} tickers, minimum {MIN_UNIVERSE_SIZE}",
                    members.len()
                ),
            });
            return Ok(None);
        }

        let snapshot = MarketSnapshot::fetch(&self.provider, &members, date)?;
        for dropped in snapshot.dropped() {
            diagnostics.dropped.push(DroppedTickerEvent {
                date,
                ticker: dropped.ticker.clone(),
                reason: dropped.reason.clone(),
            });
        }
        if snapshot.len() < MIN_UNIVERSE_SIZE {
            diagnostics.skipped.push(SkippedRebalance {
                date,
                reason: format!(
                    "{} tickers with usable prices, minimum {MIN_UNIVERSE_SIZE}",
                    snapshot.len()
                ),
            });
            return Ok(None);
        }

        let sectors: BTreeMap<Ticker, Sector> =
            members.iter().map(|m| (m.ticker.clone(), m.sector)).collect();

        // Score, then overlays in fixed order: macro scalar, factor tilts.
        let score_set = self.engine.score(&snapshot);
        let macro_scalar = if self.config.use_macro {
            self.cape.adjustment(&self.provider, date).scalar
        } else {
            1.0
        };
        let tilts = if self.config.use_factor_regimes {
            self.factor_regime.assess(&self.provider, date).tilts
        } else {
            FactorTilts::NEUTRAL
        };
        let scored = score_set.scores.with_tilts(tilts);

        // Optimization set: top composites that have a market cap.
        let top = scored.top_n(self.config.top_n);
        let caps = match self.provider.market_caps(&top, date) {
            Ok(caps) => caps,
            Err(err) => {
                diagnostics.skipped.push(SkippedRebalance {
                    date,
                    reason: format!("market caps unavailable: {err}"),
                });
                return Ok(None);
            }
        };
        let mut opt_tickers = Vec::with_capacity(top.len());
        for ticker in top {
            if caps.contains_key(&ticker) {
                opt_tickers.push(ticker);
            } else {
                diagnostics.dropped.push(DroppedTickerEvent {
                    date,
                    ticker,
                    reason: "no point-in-time market cap".to_string(),
                });
            }
        }
        if opt_tickers.is_empty() {
            diagnostics.skipped.push(SkippedRebalance {
                date,
                reason: "no tickers with market caps survived selection".to_string(),
            });
            return Ok(None);
        }
        let restricted = scored.restrict(&opt_tickers);

        let solve = |force_shrink: bool, relax_floor: bool| -> Result<PortfolioSolution> {
            let returns = covariance::aligned_returns(snapshot.prices(), &opt_tickers)?;
            let sigma = if force_shrink {
                covariance::ledoit_wolf(&returns)
            } else {
                covariance::estimate(&returns)?.matrix
            };
            let posterior = self.black_litterman.posterior(
                &opt_tickers,
                &caps,
                &sigma,
                &restricted,
                macro_scalar,
            )?;
            let optimizer = if relax_floor {
                self.optimizer.clone().with_min_target_sharpe(None)
            } else {
                self.optimizer.clone()
            };
            optimizer.optimize(
                &posterior,
                &sectors,
                self.config.objective,
                self.config.mode,
                &restricted,
            )
        };

        let solution = match solve(false, false) {
            Ok(solution) => solution,
            Err(
                err @ (CadizError::CovarianceIllConditioned(_) | CadizError::SolverInfeasible(_)),
            ) => {
                diagnostics.retries.push(SolverEvent {
                    date,
                    detail: format!("retrying with shrinkage: {err}"),
                });
                match solve(true, true) {
                    Ok(solution) => solution,
                    Err(retry_err) => {
                        warn!(date = %date, %retry_err, "optimization failed; carrying weights");
                        diagnostics.optimization_failures.push(SolverEvent {
                            date,
                            detail: retry_err.to_string(),
                        });
                        return Ok(None);
                    }
                }
            }
            Err(err @ CadizError::ConfigurationInvalid(_)) => return Err(err),
            Err(err) => {
                diagnostics.optimization_failures.push(SolverEvent {
                    date,
                    detail: err.to_string(),
                });
                return Ok(None);
            }
        };
        for warning in &solution.warnings {
            diagnostics.warnings.push(SolverEvent { date, detail: warning.clone() });
        }

        // Optional tactical exposure scaling; cash absorbs the rest.
        let (regime, exposure) = if self.config.use_regime_adjustment {
            let regime = self
                .detector
                .regime(&self.provider, date, self.config.regime_method);
            (Some(regime), exposure_for(regime, &self.config.regime_exposures))
        } else {
            (None, 1.0)
        };

        let weights: BTreeMap<Ticker, f64> = solution
            .weights
            .iter()
            .filter(|(_, &w)| w != 0.0)
            .map(|(t, &w)| (t.clone(), w * exposure))
            .collect();

        ledger.push(LedgerEntry {
            date,
            weights: weights.clone(),
            regime,
            exposure,
            expected_return: solution.expected_return,
            volatility: solution.volatility,
            sharpe: solution.sharpe,
        });
        debug!(date = %date, positions = weights.len(), exposure, "booked rebalance");

        Ok(Some(weights))
    }

    fn build_metrics(
        &self,
        equity: &[(Date, f64)],
        benchmark: &cadiz_traits::PriceSeries,
        period_returns: &[f64],
        num_rebalances: usize,
    ) -> PerformanceMetrics {
        let dates: Vec<Date> = equity.iter().map(|(d, _)| *d).collect();
        let values: Vec<f64> = equity.iter().map(|(_, v)| *v).collect();

        let benchmark_values: Vec<f64> = dates
            .iter()
            .map(|&d| benchmark.close_on_or_before(d).unwrap_or(f64::NAN))
            .collect();
        let base = benchmark_values.first().copied().unwrap_or(f64::NAN);
        let benchmark_equity: Vec<f64> = if base.is_finite() && base > 0.0 {
            benchmark_values.iter().map(|v| v / base).collect()
        } else {
            vec![1.0; dates.len()]
        };

        PerformanceMetrics::compute(
            &dates,
            &values,
            &benchmark_equity,
            period_returns,
            num_rebalances,
            self.config.risk_free_rate,
        )
    }
}

/// `sum |w_new - w_old|` over the union of positions.
#[must_use]
pub fn turnover_between(
    old_weights: &BTreeMap<Ticker, f64>,
    new_weights: &BTreeMap<Ticker, f64>,
) -> f64 {
    let mut turnover = 0.0;
    for (ticker, &new_w) in new_weights {
        let old_w = old_weights.get(ticker).copied().unwrap_or(0.0);
        turnover += (new_w - old_w).abs();
    }
    for (ticker, &old_w) in old_weights {
        if !new_weights.contains_key(ticker) {
            turnover += old_w.abs();
        }
    }
    turnover
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<Ticker, f64> {
        pairs.iter().map(|(t, w)| (t.to_string(), *w)).collect()
    }

    #[test]
    fn test_turnover_from_cash() {
        let turnover = turnover_between(&BTreeMap::new(), &map(&[("AAA", 0.6), ("BBB", 0.4)]));
        assert_relative_eq!(turnover, 1.0);
    }

    #[test]
    fn test_turnover_partial_shift() {
        let old = map(&[("AAA", 0.6), ("BBB", 0.4)]);
        let new = map(&[("AAA", 0.4), ("CCC", 0.6)]);
        // |0.4-0.6| + |0.6-0| + |0.4| = 1.2
        assert_relative_eq!(turnover_between(&old, &new), 1.2);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
