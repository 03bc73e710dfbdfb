//! Strategy configuration.
//!
//! A single immutable record parameterizes the whole engine. Validation
//! happens once, at driver construction; an inconsistent configuration
//! refuses to start rather than failing mid-run.

use serde::{Deserialize, Serialize};

use crate::error::{CadizError, Result};

const WEIGHT_SUM_TOL: f64 = 1e-9;

/// Composite weights over the three factor z-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    /// Weight on the value z-score.
    pub value: f64,
    /// Weight on the quality z-score.
    pub quality: f64,
    /// Weight on the momentum z-score.
    pub momentum: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self { value: 0.40, quality: 0.40, momentum: 0.20 }
    }
}

impl FactorWeights {
    /// Sum of the three weights.
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.value + self.quality + self.momentum
    }
}

/// Portfolio optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Objective {
    /// Maximize `(mu - r_f) . w / sqrt(w . Sigma . w)`.
    MaxSharpe,
    /// Minimize `w . Sigma . w`.
    MinVariance,
    /// Maximize `mu . w - 0.5 * delta * w . Sigma . w`.
    MaxQuadraticUtility,
    /// Maximize `mu . w` subject to volatility at most the target.
    EfficientRisk {
        /// Annualized volatility ceiling.
        target_vol: f64,
    },
    /// Minimize variance subject to expected return at least the target.
    EfficientReturn {
        /// Annualized expected-return floor.
        target_return: f64,
    },
}

/// Long-only or long/short operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradingMode {
    /// Fully invested long book; every weight is non-negative.
    LongOnly,
    /// Two-leg book, e.g. 130/30.
    LongShort {
        /// Gross long exposure (e.g. 1.3).
        long_exposure: f64,
        /// Gross short exposure (e.g. 0.3).
        short_exposure: f64,
    },
}

impl TradingMode {
    /// Signed net exposure: long minus short (1.0 in long-only mode).
    #[must_use]
    pub fn net_exposure(&self) -> f64 {
        match self {
            Self::LongOnly => 1.0,
            Self::LongShort { long_exposure, short_exposure } => long_exposure - short_exposure,
        }
    }

    /// Gross exposure: long plus short (1.0 in long-only mode).
    #[must_use]
    pub fn gross_exposure(&self) -> f64 {
        match self {
            Self::LongOnly => 1.0,
            Self::LongShort { long_exposure, short_exposure } => long_exposure + short_exposure,
        }
    }
}

/// Rebalance cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    /// Calendar month-ends, aligned to the prior trading day.
    Monthly,
    /// Calendar quarter-ends, aligned to the prior trading day.
    Quarterly,
}

impl RebalanceFrequency {
    /// Months between rebalances.
    #[must_use]
    pub const fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
        }
    }
}

/// Regime detection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeMethod {
    /// 200-day moving average of the benchmark index.
    Sma,
    /// VIX term structure shape.
    Vix,
    /// Both signals, VIX veto first.
    Combined,
}

/// Equity exposure per market regime, all in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeExposures {
    /// Exposure in a risk-off regime.
    pub risk_off: f64,
    /// Exposure in a caution regime.
    pub caution: f64,
    /// Exposure in a risk-on (or unknown) regime.
    pub risk_on: f64,
}

impl Default for RegimeExposures {
    fn default() -> Self {
        Self { risk_off: 0.50, caution: 0.75, risk_on: 1.00 }
    }
}

/// The immutable strategy configuration record.
///
/// Defaults reproduce the reference strategy: 40/40/20 factor blend,
/// Black-Litterman max-Sharpe long-only book of the top 50 composite
/// scores, 0-30% position bounds, 35% sector cap, monthly rebalances,
/// with every tactical overlay switched off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Composite weights over factor z-scores; must sum to 1.
    pub factor_weights: FactorWeights,
    /// Z-score-to-annual-excess-return conversion (0.02 = one sigma is 2%).
    pub alpha_scalar: f64,
    /// Black-Litterman risk aversion (delta).
    pub risk_aversion: f64,
    /// Annualized risk-free rate for Sharpe-style quantities.
    pub risk_free_rate: f64,
    /// Per-position weight bounds `(min, max)`.
    pub weight_bounds: (f64, f64),
    /// Maximum gross weight per sector.
    pub sector_cap: f64,
    /// Optimization objective.
    pub objective: Objective,
    /// Long-only or long/short operation.
    pub mode: TradingMode,
    /// Rebalance cadence.
    pub rebalance_frequency: RebalanceFrequency,
    /// Number of top composite scores handed to the optimizer.
    pub top_n: usize,
    /// Apply the CAPE scalar to equilibrium returns.
    pub use_macro: bool,
    /// Apply Fama-French factor-regime tilts to z-scores.
    pub use_factor_regimes: bool,
    /// Scale final weights by the market-regime exposure.
    pub use_regime_adjustment: bool,
    /// Regime detection method.
    pub regime_method: RegimeMethod,
    /// Equity exposure per regime.
    pub regime_exposures: RegimeExposures,
    /// Warn when achieved max-Sharpe falls below 95% of this floor.
    pub min_target_sharpe: Option<f64>,
    /// Softening of factor-regime tilts, in `[0, 1]`.
    pub tilt_strength: f64,
    /// Trailing window for factor-regime detection, in months.
    pub ff_window_months: usize,
    /// CAPE thresholds `(low, high)` for the macro scalar.
    pub cape_thresholds: (f64, f64),
    /// Macro scalars `(at_low, at_high)` applied to equilibrium returns.
    pub cape_scalars: (f64, f64),
    /// Optional flat slippage charged per unit of turnover, in basis points.
    pub slippage_bps: Option<f64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            factor_weights: FactorWeights::default(),
            alpha_scalar: 0.02,
            risk_aversion: 2.5,
            risk_free_rate: 0.04,
            weight_bounds: (0.0, 0.30),
            sector_cap: 0.35,
            objective: Objective::MaxSharpe,
            mode: TradingMode::LongOnly,
            rebalance_frequency: RebalanceFrequency::Monthly,
            top_n: 50,
            use_macro: false,
            use_factor_regimes: false,
            use_regime_adjustment: false,
            regime_method: RegimeMethod::Combined,
            regime_exposures: RegimeExposures::default(),
            min_target_sharpe: None,
            tilt_strength: 0.5,
            ff_window_months: 12,
            cape_thresholds: (15.0, 35.0),
            cape_scalars: (1.20, 0.70),
            slippage_bps: None,
        }
    }
}

impl StrategyConfig {
    /// Check every cross-field consistency rule.
    ///
    /// # Errors
    ///
    /// [`CadizError::ConfigurationInvalid`] naming the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(CadizError::ConfigurationInvalid(msg));

        let fw = &self.factor_weights;
        if fw.value < 0.0 || fw.quality < 0.0 || fw.momentum < 0.0 {
            return invalid(format!(
                "factor weights must be non-negative, got ({}, {}, {})",
                fw.value, fw.quality, fw.momentum
            ));
        }
        if (fw.sum() - 1.0).abs() > WEIGHT_SUM_TOL {
            return invalid(format!("factor weights must sum to 1, got {}", fw.sum()));
        }

        let (lo, hi) = self.weight_bounds;
        if !(lo.is_finite() && hi.is_finite()) || lo > hi {
            return invalid(format!("weight bounds ({lo}, {hi}) are not an interval"));
        }
        if hi <= 0.0 {
            return invalid(format!("maximum weight {hi} leaves nothing to hold"));
        }

        if self.sector_cap <= 0.0 {
            return invalid(format!("sector cap {} must be positive", self.sector_cap));
        }
        if self.top_n == 0 {
            return invalid("top_n must be at least 1".to_string());
        }
        if self.risk_aversion <= 0.0 {
            return invalid(format!("risk aversion {} must be positive", self.risk_aversion));
        }
        if !(0.0..=1.0).contains(&self.tilt_strength) {
            return invalid(format!("tilt strength {} outside [0, 1]", self.tilt_strength));
        }
        if self.ff_window_months == 0 {
            return invalid("factor-regime window must be at least 1 month".to_string());
        }

        let re = &self.regime_exposures;
        for (name, v) in [
            ("risk_off", re.risk_off),
            ("caution", re.caution),
            ("risk_on", re.risk_on),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return invalid(format!("regime exposure {name}={v} outside [0, 1]"));
            }
        }

        if let TradingMode::LongShort { long_exposure, short_exposure } = self.mode {
            if long_exposure <= 0.0 {
                return invalid(format!("long exposure {long_exposure} must be positive"));
            }
            if short_exposure < 0.0 {
                return invalid(format!("short exposure {short_exposure} must be non-negative"));
            }
            if lo < 0.0 {
                return invalid(
                    "per-leg weight bounds are magnitudes; minimum must be >= 0".to_string(),
                );
            }
        }

        match self.objective {
            Objective::EfficientRisk { target_vol } if target_vol <= 0.0 => {
                return invalid(format!("target volatility {target_vol} must be positive"));
            }
            Objective::EfficientReturn { target_return } if !target_return.is_finite() => {
                return invalid(format!("target return {target_return} is not finite"));
            }
            _ => {}
        }

        let (cape_low, cape_high) = self.cape_thresholds;
        if cape_low >= cape_high {
            return invalid(format!(
                "CAPE thresholds ({cape_low}, {cape_high}) must be increasing"
            ));
        }

        if let Some(floor) = self.min_target_sharpe {
            if !floor.is_finite() {
                return invalid(format!("minimum target Sharpe {floor} is not finite"));
            }
        }
        if let Some(bps) = self.slippage_bps {
            if bps < 0.0 {
                return invalid(format!("slippage {bps} bps must be non-negative"));
            }
        }

        Ok(())
    }
}
