//! The factor scoring engine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cadiz_traits::config::FactorWeights;
use cadiz_traits::provider::MIN_PRICE_ROWS;
use cadiz_traits::stats::{
    median, percentile_rank, percentile_sorted, standardize_clipped, StandardizeResult,
};
use cadiz_traits::MarketSnapshot;

use crate::audit::{FactorAudit, ScoreAudit, TickerAudit, UniverseFactorStats};
use crate::raw::RawFactors;
use crate::scores::{FactorScores, FactorTilts};

/// Tuning knobs for the scoring pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorEngineConfig {
    /// Lower winsorization percentile (default 0.01).
    pub winsorize_lower: f64,
    /// Upper winsorization percentile (default 0.99).
    pub winsorize_upper: f64,
    /// Z-score clip bound (default 3.0).
    pub z_clip: f64,
}

impl Default for FactorEngineConfig {
    fn default() -> Self {
        Self { winsorize_lower: 0.01, winsorize_upper: 0.99, z_clip: 3.0 }
    }
}

/// Output of one scoring pass: the score table plus the audit trail.
#[derive(Debug, Clone)]
pub struct ScoreSet {
    /// Cross-sectional scores.
    pub scores: FactorScores,
    /// How each score was formed.
    pub audit: ScoreAudit,
}

/// Multi-factor scoring engine.
///
/// Stateless between rebalances: `score` takes a point-in-time snapshot and
/// returns fresh, immutable results.
#[derive(Debug, Clone)]
pub struct FactorEngine {
    weights: FactorWeights,
    config: FactorEngineConfig,
}

/// Raw sub-metric columns with imputation bookkeeping.
struct SubMetricColumn {
    /// One entry per ticker; NaN marks missing.
    values: Vec<f64>,
    /// Which entries were median-imputed.
    imputed: Vec<bool>,
}

impl FactorEngine {
    /// Create an engine with default pipeline settings.
    #[must_use]
    pub fn new(weights: FactorWeights) -> Self {
        Self { weights, config: FactorEngineConfig::default() }
    }

    /// Create an engine with explicit pipeline settings.
    #[must_use]
    pub fn with_config(weights: FactorWeights, config: FactorEngineConfig) -> Self {
        Self { weights, config }
    }

    /// Composite weights this engine blends with.
    #[must_use]
    pub fn weights(&self) -> FactorWeights {
        self.weights
    }

    /// Score every ticker in the snapshot.
    ///
    /// Never fails globally: tickers without usable inputs score neutral
    /// and are flagged `insufficient_data` in the audit, but remain in the
    /// output and stay eligible for optimization.
    #[must_use]
    pub fn score(&self, snapshot: &MarketSnapshot) -> ScoreSet {
        self.score_with_tilts(snapshot, FactorTilts::NEUTRAL)
    }

    /// Score with factor-regime tilts applied to the z-columns before the
    /// composite is formed.
    #[must_use]
    pub fn score_with_tilts(&self, snapshot: &MarketSnapshot, tilts: FactorTilts) -> ScoreSet {
        let tickers = snapshot.tickers();
        let n = tickers.len();

        // Raw factors per ticker; a ticker with no fundamentals (or a
        // defensively re-checked short price series) is all-missing.
        let mut raws = Vec::with_capacity(n);
        let mut insufficient = Vec::with_capacity(n);
        for ticker in &tickers {
            let series = snapshot.price_series(ticker).expect("snapshot ticker has prices");
            match snapshot.fundamental(ticker) {
                Some(fundamental) if series.len() >= MIN_PRICE_ROWS => {
                    raws.push(RawFactors::compute(fundamental, series));
                    insufficient.push(false);
                }
                _ => {
                    raws.push(RawFactors::missing());
                    insufficient.push(true);
                }
            }
        }
        let flagged = insufficient.iter().filter(|&&f| f).count();
        if flagged > 0 {
            debug!(count = flagged, as_of = %snapshot.as_of(), "tickers scored neutral");
        }

        // Impute each sub-metric with the universe median at this rebalance.
        let fcf = impute(&raws, &insufficient, |r| r.fcf_yield);
        let ey = impute(&raws, &insufficient, |r| r.earnings_yield);
        let roic = impute(&raws, &insufficient, |r| r.roic);
        let margin = impute(&raws, &insufficient, |r| r.gross_margin);
        let momentum = impute(&raws, &insufficient, |r| r.momentum_12m);

        // Blend sub-metrics with fixed equal weights.
        let raw_value: Vec<f64> =
            (0..n).map(|i| 0.5 * fcf.values[i] + 0.5 * ey.values[i]).collect();
        let raw_quality: Vec<f64> =
            (0..n).map(|i| 0.5 * roic.values[i] + 0.5 * margin.values[i]).collect();
        let raw_momentum = momentum.values.clone();

        let (wins_value, value_stats) = self.winsorize_column(raw_value);
        let (wins_quality, quality_stats) = self.winsorize_column(raw_quality);
        let (wins_momentum, momentum_stats) = self.winsorize_column(raw_momentum);

        let (z_value, value_sr) = standardize_clipped(&wins_value, self.config.z_clip);
        let (z_quality, quality_sr) = standardize_clipped(&wins_quality, self.config.z_clip);
        let (z_momentum, momentum_sr) = standardize_clipped(&wins_momentum, self.config.z_clip);

        let scores = FactorScores::new(
            snapshot.as_of(),
            tickers.clone(),
            ndarray::Array1::from_vec(z_value.clone()),
            ndarray::Array1::from_vec(z_quality.clone()),
            ndarray::Array1::from_vec(z_momentum.clone()),
            self.weights,
        )
        .with_tilts(tilts);

        let ticker_audits = (0..n)
            .map(|i| {
                let value = self.factor_audit(
                    raw_pair(&raws[i].fcf_yield, &raws[i].earnings_yield),
                    fcf.imputed[i] || ey.imputed[i],
                    wins_value[i],
                    &wins_value,
                    z_value[i] * tilts.value,
                    self.weights.value,
                );
                let quality = self.factor_audit(
                    raw_pair(&raws[i].roic, &raws[i].gross_margin),
                    roic.imputed[i] || margin.imputed[i],
                    wins_quality[i],
                    &wins_quality,
                    z_quality[i] * tilts.quality,
                    self.weights.quality,
                );
                let momentum_audit = self.factor_audit(
                    raws[i].momentum_12m,
                    momentum.imputed[i],
                    wins_momentum[i],
                    &wins_momentum,
                    z_momentum[i] * tilts.momentum,
                    self.weights.momentum,
                );
                TickerAudit {
                    ticker: tickers[i].clone(),
                    insufficient_data: insufficient[i],
                    value,
                    quality,
                    momentum: momentum_audit,
                    total: scores.totals()[i],
                }
            })
            .collect();

        let audit = ScoreAudit {
            as_of: snapshot.as_of(),
            value_stats: merge_stats(value_stats, value_sr),
            quality_stats: merge_stats(quality_stats, quality_sr),
            momentum_stats: merge_stats(momentum_stats, momentum_sr),
            tickers: ticker_audits,
        };

        ScoreSet { scores, audit }
    }

    /// Winsorize a raw column and return it with its bounds.
    fn winsorize_column(&self, mut values: Vec<f64>) -> (Vec<f64>, UniverseFactorStats) {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return (values, UniverseFactorStats::default());
        }
        finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let lower = percentile_sorted(&finite, self.config.winsorize_lower);
        let upper = percentile_sorted(&finite, self.config.winsorize_upper);
        for v in values.iter_mut() {
            if v.is_finite() {
                *v = v.clamp(lower, upper);
            }
        }
        (
            values,
            UniverseFactorStats { mean: 0.0, std: 0.0, lower_bound: lower, upper_bound: upper },
        )
    }

    fn factor_audit(
        &self,
        raw: Option<f64>,
        imputed: bool,
        winsorized: f64,
        column: &[f64],
        z: f64,
        weight: f64,
    ) -> FactorAudit {
        if !winsorized.is_finite() {
            return FactorAudit { raw, imputed, ..FactorAudit::unavailable() };
        }
        FactorAudit {
            raw,
            imputed,
            winsorized,
            percentile: percentile_rank(column, winsorized),
            z,
            contribution: weight * z,
        }
    }
}

/// Equal-weight blend of two optional sub-metrics, `None` when either is
/// missing.
fn raw_pair(a: &Option<f64>, b: &Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(0.5 * a + 0.5 * b),
        _ => None,
    }
}

/// Replace missing sub-metric entries with the universe median, skipping
/// tickers flagged insufficient (they neither contribute to nor receive the
/// median).
fn impute(
    raws: &[RawFactors],
    insufficient: &[bool],
    pick: impl Fn(&RawFactors) -> Option<f64>,
) -> SubMetricColumn {
    let observed: Vec<f64> = raws
        .iter()
        .zip(insufficient)
        .filter(|(_, &skip)| !skip)
        .filter_map(|(r, _)| pick(r))
        .collect();
    let fallback = median(&observed);

    let mut values = Vec::with_capacity(raws.len());
    let mut imputed = Vec::with_capacity(raws.len());
    for (raw, &skip) in raws.iter().zip(insufficient) {
        match pick(raw) {
            Some(v) => {
                values.push(v);
                imputed.push(false);
            }
            None if skip => {
                values.push(f64::NAN);
                imputed.push(false);
            }
            None => match fallback {
                Some(m) => {
                    values.push(m);
                    imputed.push(true);
                }
                None => {
                    values.push(f64::NAN);
                    imputed.push(false);
                }
            },
        }
    }
    SubMetricColumn { values, imputed }
}

fn merge_stats(bounds: UniverseFactorStats, sr: StandardizeResult) -> UniverseFactorStats {
    UniverseFactorStats {
        mean: sr.mean,
        std: sr.std,
        lower_bound: bounds.lower_bound,
        upper_bound: bounds.upper_bound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadiz_traits::types::{Date, FundamentalSnapshot, PricePoint, PriceSeries};
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    /// Geometric price path over `sessions` consecutive days.
    fn path(sessions: usize, start_close: f64, end_close: f64) -> PriceSeries {
        let start = d(2021, 1, 4);
        let step = (end_close / start_close).powf(1.0 / (sessions - 1) as f64);
        let mut close = start_close;
        let points = (0..sessions)
            .map(|i| {
                let p = PricePoint { date: start + Duration::days(i as i64), close };
                close *= step;
                p
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    fn snapshot_of(entries: Vec<(&str, Option<FundamentalSnapshot>, PriceSeries)>) -> MarketSnapshot {
        let mut prices = BTreeMap::new();
        let mut fundamentals = BTreeMap::new();
        for (ticker, snapshot, series) in entries {
            prices.insert(ticker.to_string(), series);
            if let Some(s) = snapshot {
                fundamentals.insert(ticker.to_string(), s);
            }
        }
        MarketSnapshot::from_parts(d(2023, 6, 30), prices, fundamentals)
    }

    fn fundamentals(fcf: f64, ebit: f64, margin_frac: f64) -> FundamentalSnapshot {
        FundamentalSnapshot {
            free_cash_flow: Some(fcf),
            ebit: Some(ebit),
            revenue: Some(100.0),
            gross_profit: Some(margin_frac * 100.0),
            total_assets: Some(200.0),
            current_liabilities: Some(50.0),
            shares_outstanding: Some(10.0),
        }
    }

    #[test]
    fn test_scores_rank_better_fundamentals_higher() {
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(30.0, 40.0, 0.6)), path(300, 80.0, 100.0)),
            ("BBB", Some(fundamentals(5.0, 6.0, 0.2)), path(300, 110.0, 100.0)),
            ("CCC", Some(fundamentals(15.0, 20.0, 0.4)), path(300, 95.0, 100.0)),
        ]);
        let engine = FactorEngine::new(FactorWeights::default());
        let set = engine.score(&snapshot);

        let a = set.scores.get("AAA").unwrap().total;
        let b = set.scores.get("BBB").unwrap().total;
        let c = set.scores.get("CCC").unwrap().total;
        assert!(a > c, "AAA {a} should beat CCC {c}");
        assert!(c > b, "CCC {c} should beat BBB {b}");
    }

    #[test]
    fn test_z_scores_clipped() {
        let mut entries = Vec::new();
        let paths: Vec<PriceSeries> = (0..12).map(|i| path(300, 100.0, 100.0 + i as f64)).collect();
        for (i, p) in paths.into_iter().enumerate() {
            let fcf = if i == 0 { 1e6 } else { 1.0 + i as f64 };
            entries.push((
                ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L"][i],
                Some(fundamentals(fcf, 10.0, 0.3)),
                p,
            ));
        }
        let set = FactorEngine::new(FactorWeights::default()).score(&snapshot_of(entries));
        for ticker in set.scores.tickers() {
            let s = set.scores.get(ticker).unwrap();
            assert!(s.z_value.abs() <= 3.0);
            assert!(s.z_quality.abs() <= 3.0);
            assert!(s.z_momentum.abs() <= 3.0);
        }
    }

    #[test]
    fn test_missing_fundamentals_scores_neutral_and_flagged() {
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(30.0, 40.0, 0.6)), path(300, 80.0, 100.0)),
            ("BBB", None, path(300, 110.0, 100.0)),
            ("CCC", Some(fundamentals(15.0, 20.0, 0.4)), path(300, 95.0, 100.0)),
        ]);
        let set = FactorEngine::new(FactorWeights::default()).score(&snapshot);

        let b = set.scores.get("BBB").unwrap();
        assert_relative_eq!(b.total, 0.0);
        assert_relative_eq!(b.z_momentum, 0.0);
        let audit = set.audit.get("BBB").unwrap();
        assert!(audit.insufficient_data);
        assert_eq!(set.audit.insufficient(), vec![&"BBB".to_string()]);
    }

    #[test]
    fn test_missing_sub_metric_gets_universe_median() {
        let no_fcf = FundamentalSnapshot {
            free_cash_flow: None,
            ..fundamentals(0.0, 20.0, 0.4)
        };
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(10.0, 40.0, 0.6)), path(300, 80.0, 100.0)),
            ("BBB", Some(no_fcf), path(300, 90.0, 100.0)),
            ("CCC", Some(fundamentals(20.0, 30.0, 0.5)), path(300, 95.0, 100.0)),
        ]);
        let set = FactorEngine::new(FactorWeights::default()).score(&snapshot);

        let audit = set.audit.get("BBB").unwrap();
        assert!(audit.value.imputed);
        assert!(!audit.quality.imputed);
        assert!(!audit.insufficient_data);
        // Median substitution keeps the z finite and the ticker ranked.
        assert!(set.scores.get("BBB").unwrap().z_value.is_finite());
    }

    #[test]
    fn test_constant_cross_section_is_all_zero() {
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(10.0, 10.0, 0.4)), path(300, 90.0, 100.0)),
            ("BBB", Some(fundamentals(10.0, 10.0, 0.4)), path(300, 90.0, 100.0)),
        ]);
        let set = FactorEngine::new(FactorWeights::default()).score(&snapshot);
        for ticker in ["AAA", "BBB"] {
            let s = set.scores.get(ticker).unwrap();
            assert_relative_eq!(s.total, 0.0);
        }
    }

    #[test]
    fn test_tilts_shift_composite() {
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(30.0, 40.0, 0.6)), path(300, 120.0, 100.0)),
            ("BBB", Some(fundamentals(5.0, 6.0, 0.2)), path(300, 70.0, 100.0)),
        ]);
        let engine = FactorEngine::new(FactorWeights::default());
        let neutral = engine.score(&snapshot);
        let tilted = engine
            .score_with_tilts(&snapshot, FactorTilts { value: 1.3, quality: 1.0, momentum: 1.0 });

        let n = neutral.scores.get("AAA").unwrap();
        let t = tilted.scores.get("AAA").unwrap();
        assert_relative_eq!(t.z_value, 1.3 * n.z_value, epsilon = 1e-12);
        assert_relative_eq!(
            t.total,
            n.total + 0.4 * 0.3 * n.z_value,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_audit_contributions_sum_to_total() {
        let snapshot = snapshot_of(vec![
            ("AAA", Some(fundamentals(30.0, 40.0, 0.6)), path(300, 80.0, 100.0)),
            ("BBB", Some(fundamentals(5.0, 6.0, 0.2)), path(300, 110.0, 100.0)),
            ("CCC", Some(fundamentals(15.0, 20.0, 0.4)), path(300, 95.0, 100.0)),
        ]);
        let set = FactorEngine::new(FactorWeights::default()).score(&snapshot);
        for audit in &set.audit.tickers {
            let sum = audit.value.contribution
                + audit.quality.contribution
                + audit.momentum.contribution;
            assert_relative_eq!(sum, audit.total, epsilon = 1e-12);
        }
    }
}
