//! Per-ticker scoring audits.
//!
//! Every rebalance produces, alongside the score table, a record of how
//! each z-score was formed: the raw input, whether it was imputed, the
//! winsorized value that entered standardization, its percentile within
//! the universe, and the contribution to the composite.

use serde::{Deserialize, Serialize};

use cadiz_traits::{Date, Ticker};

/// Cross-sectional statistics for one factor at one rebalance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseFactorStats {
    /// Mean of the winsorized cross-section.
    pub mean: f64,
    /// Sample standard deviation of the winsorized cross-section.
    pub std: f64,
    /// Lower winsorization bound (1st percentile).
    pub lower_bound: f64,
    /// Upper winsorization bound (99th percentile).
    pub upper_bound: f64,
}

/// How one factor score was formed for one ticker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactorAudit {
    /// Raw factor value before imputation; `None` when missing.
    pub raw: Option<f64>,
    /// Whether the universe median was substituted.
    pub imputed: bool,
    /// Value entering standardization (after imputation and
    /// winsorization); NaN for tickers with no usable inputs.
    pub winsorized: f64,
    /// Percentile rank of the winsorized value within the universe.
    pub percentile: f64,
    /// Clipped z-score.
    pub z: f64,
    /// Contribution to the composite (`weight * z`).
    pub contribution: f64,
}

impl FactorAudit {
    /// An audit entry for a factor with no usable inputs.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            raw: None,
            imputed: false,
            winsorized: f64::NAN,
            percentile: f64::NAN,
            z: 0.0,
            contribution: 0.0,
        }
    }
}

/// Full audit for one ticker at one rebalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerAudit {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// True when prices or fundamentals were missing entirely and the
    /// ticker was scored neutral.
    pub insufficient_data: bool,
    /// Value factor trail.
    pub value: FactorAudit,
    /// Quality factor trail.
    pub quality: FactorAudit,
    /// Momentum factor trail.
    pub momentum: FactorAudit,
    /// Weighted composite score.
    pub total: f64,
}

/// Audit for one full scoring pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAudit {
    /// Rebalance date.
    pub as_of: Date,
    /// Universe statistics for the value cross-section.
    pub value_stats: UniverseFactorStats,
    /// Universe statistics for the quality cross-section.
    pub quality_stats: UniverseFactorStats,
    /// Universe statistics for the momentum cross-section.
    pub momentum_stats: UniverseFactorStats,
    /// Per-ticker trails, in scoring order.
    pub tickers: Vec<TickerAudit>,
}

impl ScoreAudit {
    /// Audit trail for one ticker.
    #[must_use]
    pub fn get(&self, ticker: &str) -> Option<&TickerAudit> {
        self.tickers.iter().find(|a| a.ticker == ticker)
    }

    /// Tickers flagged as having insufficient data.
    #[must_use]
    pub fn insufficient(&self) -> Vec<&Ticker> {
        self.tickers
            .iter()
            .filter(|a| a.insufficient_data)
            .map(|a| &a.ticker)
            .collect()
    }
}
