//! The append-only backtest ledger.

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use cadiz_regime::MarketRegime;
use cadiz_traits::{Date, Ticker};

/// One booked rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Rebalance date.
    pub date: Date,
    /// Final weights after any regime scaling (zeros omitted).
    pub weights: BTreeMap<Ticker, f64>,
    /// Market regime at the date, when regime adjustment ran.
    pub regime: Option<MarketRegime>,
    /// Equity exposure applied (1.0 when no adjustment ran).
    pub exposure: f64,
    /// Expected annual return of the optimized book.
    pub expected_return: f64,
    /// Annualized volatility of the optimized book.
    pub volatility: f64,
    /// Sharpe ratio of the optimized book.
    pub sharpe: f64,
}

impl LedgerEntry {
    /// Sum of signed weights (equity fraction of the book).
    #[must_use]
    pub fn net_exposure(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Cash fraction of the book.
    #[must_use]
    pub fn cash(&self) -> f64 {
        1.0 - self.net_exposure()
    }
}

/// Append-only record of every booked rebalance in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestLedger {
    entries: Vec<LedgerEntry>,
}

impl BacktestLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one rebalance record. Entries must arrive in date order.
    pub fn push(&mut self, entry: LedgerEntry) {
        debug_assert!(
            self.entries.last().map_or(true, |last| last.date < entry.date),
            "ledger entries must be strictly increasing in date"
        );
        self.entries.push(entry);
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of booked rebalances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was booked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.last()
    }

    /// Entry booked at a specific date.
    #[must_use]
    pub fn at(&self, date: Date) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.date == date)
    }

    /// The ledger as a long-format table, one row per (date, ticker)
    /// position, with the fixed schema `(date, ticker, weight, regime,
    /// exposure, expected_return, volatility, sharpe)`.
    ///
    /// # Errors
    ///
    /// Propagates polars construction errors.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let mut dates = Vec::new();
        let mut tickers = Vec::new();
        let mut weights = Vec::new();
        let mut regimes = Vec::new();
        let mut exposures = Vec::new();
        let mut expected_returns = Vec::new();
        let mut volatilities = Vec::new();
        let mut sharpes = Vec::new();

        for entry in &self.entries {
            for (ticker, &weight) in &entry.weights {
                if weight == 0.0 {
                    continue;
                }
                dates.push(entry.date.to_string());
                tickers.push(ticker.clone());
                weights.push(weight);
                regimes.push(entry.regime.map_or("", |r| r.as_str()).to_string());
                exposures.push(entry.exposure);
                expected_returns.push(entry.expected_return);
                volatilities.push(entry.volatility);
                sharpes.push(entry.sharpe);
            }
        }

        DataFrame::new(vec![
            Column::new("date".into(), dates),
            Column::new("ticker".into(), tickers),
            Column::new("weight".into(), weights),
            Column::new("regime".into(), regimes),
            Column::new("exposure".into(), exposures),
            Column::new("expected_return".into(), expected_returns),
            Column::new("volatility".into(), volatilities),
            Column::new("sharpe".into(), sharpes),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    fn entry(date: Date, pairs: &[(&str, f64)]) -> LedgerEntry {
        LedgerEntry {
            date,
            weights: pairs.iter().map(|(t, w)| (t.to_string(), *w)).collect(),
            regime: Some(MarketRegime::RiskOn),
            exposure: 1.0,
            expected_return: 0.08,
            volatility: 0.15,
            sharpe: 0.4,
        }
    }

    #[test]
    fn test_append_and_lookup() {
        let mut ledger = BacktestLedger::new();
        ledger.push(entry(d(2023, 1, 31), &[("AAA", 0.6), ("BBB", 0.4)]));
        ledger.push(entry(d(2023, 2, 28), &[("AAA", 0.5), ("BBB", 0.5)]));

        assert_eq!(ledger.len(), 2);
        assert!(ledger.at(d(2023, 1, 31)).is_some());
        assert_eq!(ledger.last().unwrap().date, d(2023, 2, 28));
    }

    #[test]
    fn test_entry_cash_accounting() {
        let e = entry(d(2023, 1, 31), &[("AAA", 0.3), ("BBB", 0.2)]);
        assert!((e.net_exposure() - 0.5).abs() < 1e-12);
        assert!((e.cash() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_frame_long_format() {
        let mut ledger = BacktestLedger::new();
        ledger.push(entry(d(2023, 1, 31), &[("AAA", 0.6), ("BBB", 0.4), ("CCC", 0.0)]));
        let frame = ledger.to_frame().unwrap();
        // Zero-weight rows are omitted.
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.get_column_names().len(), 8);
        assert!(frame.column("weight").is_ok());
        assert!(frame.column("regime").is_ok());
    }
}
