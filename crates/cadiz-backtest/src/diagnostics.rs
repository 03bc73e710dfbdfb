//! Run diagnostics: everything that went sideways without stopping the
//! backtest.

use serde::{Deserialize, Serialize};

use cadiz_traits::{Date, Ticker};

/// A rebalance date that was skipped entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRebalance {
    /// The skipped date.
    pub date: Date,
    /// Why it was skipped.
    pub reason: String,
}

/// A ticker excluded from one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedTickerEvent {
    /// Rebalance date of the exclusion.
    pub date: Date,
    /// The excluded ticker.
    pub ticker: Ticker,
    /// Why it was excluded.
    pub reason: String,
}

/// A solver retry or terminal failure at one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverEvent {
    /// Rebalance date.
    pub date: Date,
    /// What happened.
    pub detail: String,
}

/// Everything noteworthy that happened during a run, short of aborting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Rebalance dates skipped (undersized universe, no data).
    pub skipped: Vec<SkippedRebalance>,
    /// Per-ticker exclusions, by rebalance date.
    pub dropped: Vec<DroppedTickerEvent>,
    /// Solves that needed the shrinkage retry.
    pub retries: Vec<SolverEvent>,
    /// Solves that failed even after the retry (weights carried forward).
    pub optimization_failures: Vec<SolverEvent>,
    /// Optimizer warnings (Sharpe floor misses, relaxed budgets, ...).
    pub warnings: Vec<SolverEvent>,
    /// Per-rebalance turnover `sum |w_new - w_old|`.
    pub turnover: Vec<(Date, f64)>,
}

impl RunDiagnostics {
    /// Whether the run completed without a single anomaly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
            && self.dropped.is_empty()
            && self.retries.is_empty()
            && self.optimization_failures.is_empty()
            && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_by_default() {
        let diagnostics = RunDiagnostics::default();
        assert!(diagnostics.is_clean());
    }

    #[test]
    fn test_not_clean_after_skip() {
        let mut diagnostics = RunDiagnostics::default();
        diagnostics.skipped.push(SkippedRebalance {
            date: Date::from_ymd_opt(2023, 6, 30).unwrap(),
            reason: "universe too small".to_string(),
        });
        assert!(!diagnostics.is_clean());
    }
}
