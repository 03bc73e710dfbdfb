//! Walk-forward backtesting for the cadiz engine.
//!
//! The driver replays the strategy over history with strict point-in-time
//! discipline: at every rebalance date it resolves the universe, scores
//! factors, builds the Black-Litterman posterior, optimizes, optionally
//! scales by the market regime, and books the result — never touching a
//! price or fundamental dated after the rebalance. Between rebalances the
//! book is held (buy-and-hold within the period, cash earning zero).
//!
//! Per-ticker data problems drop the ticker for that rebalance only. A
//! failed solve retries once with forced shrinkage and a relaxed Sharpe
//! floor, then carries the previous weights forward. Only an unreachable
//! universe or benchmark aborts the run, and even then the ledger up to
//! the last good date is returned.

#![forbid(unsafe_code)]

pub mod calendar;
pub mod diagnostics;
pub mod driver;
pub mod ledger;
pub mod performance;

pub use calendar::rebalance_dates;
pub use diagnostics::RunDiagnostics;
pub use driver::{BacktestDriver, BacktestReport, CancelToken};
pub use ledger::{BacktestLedger, LedgerEntry};
pub use performance::PerformanceMetrics;
