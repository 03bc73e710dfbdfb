//! The market-data boundary of the engine.
//!
//! [`MarketDataProvider`] is the sole external data dependency of the core.
//! Every operation is parameterized by an as-of or end date, and a
//! conforming implementation must never return an observation dated after
//! that argument. Caching, batching, retries, and timeouts are the
//! provider's business; the core treats a timeout as
//! [`DataUnavailable`](crate::CadizError::DataUnavailable) for that ticker
//! and moves on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Date, FundamentalSnapshot, PriceSeries, Ticker};

/// Minimum number of price rows required for factor and covariance work.
pub const MIN_PRICE_ROWS: usize = 252;

/// VIX term structure at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VixTermStructure {
    /// 9-day VIX (short leg).
    pub vix9d: f64,
    /// 30-day VIX (standard index).
    pub vix30d: f64,
    /// 3-month VIX (long leg).
    pub vix3m: f64,
}

impl VixTermStructure {
    /// Short leg above the middle: fear elevated.
    #[must_use]
    pub fn is_backwardation(&self) -> bool {
        self.vix9d > self.vix30d
    }

    /// Upward-sloping structure: calm market.
    #[must_use]
    pub fn is_contango(&self) -> bool {
        self.vix9d < self.vix30d && self.vix30d < self.vix3m
    }
}

/// Fama-French factor identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FfFactor {
    /// High-minus-low (value).
    Hml,
    /// Robust-minus-weak (profitability).
    Rmw,
    /// Small-minus-big (size).
    Smb,
    /// Market excess return.
    MktRf,
}

impl FfFactor {
    /// Canonical short name as published in the factor library files.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Hml => "HML",
            Self::Rmw => "RMW",
            Self::Smb => "SMB",
            Self::MktRf => "Mkt-RF",
        }
    }
}

/// Trailing monthly returns for one factor, together with the full-history
/// mean and standard deviation the source computed over its entire sample.
///
/// The history statistics ride along so the trailing-mean z-score can be
/// formed without a second round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfFactorWindow {
    /// Monthly returns, oldest first; last observation <= the requested end.
    pub returns: Vec<f64>,
    /// Full-history mean monthly return.
    pub history_mean: f64,
    /// Full-history standard deviation of monthly returns.
    pub history_std: f64,
}

impl FfFactorWindow {
    /// Mean of the trailing window, `None` when the window is empty.
    #[must_use]
    pub fn window_mean(&self) -> Option<f64> {
        if self.returns.is_empty() {
            return None;
        }
        Some(self.returns.iter().sum::<f64>() / self.returns.len() as f64)
    }
}

/// Point-in-time market data supplier.
///
/// All methods take the reference date explicitly; an implementation that
/// reads "current" data is non-conforming. Per-ticker failures are ordinary
/// `Err` values and never abort a run; only the benchmark series and the
/// universe are mandatory feeds.
pub trait MarketDataProvider: Send + Sync {
    /// Adjusted closing prices for `ticker` over `[start, end]`.
    ///
    /// # Errors
    ///
    /// [`DataUnavailable`](crate::CadizError::DataUnavailable) when the
    /// series is empty or has fewer than [`MIN_PRICE_ROWS`] rows before
    /// `end`.
    fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries>;

    /// Most recent fundamental snapshot observable by `as_of`.
    ///
    /// # Errors
    ///
    /// [`DataUnavailable`](crate::CadizError::DataUnavailable) when no
    /// snapshot has been published on or before `as_of`.
    fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot>;

    /// Point-in-time market capitalizations (shares x price) for a batch of
    /// tickers. Tickers without data are simply absent from the map.
    ///
    /// # Errors
    ///
    /// Only on a wholesale feed failure; per-ticker gaps are not errors.
    fn market_caps(&self, tickers: &[Ticker], as_of: Date) -> Result<BTreeMap<Ticker, f64>>;

    /// Benchmark index prices over `[start, end]`. Mandatory feed.
    ///
    /// # Errors
    ///
    /// [`ProviderUnavailable`](crate::CadizError::ProviderUnavailable) when
    /// the benchmark cannot be served; this aborts a backtest.
    fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries>;

    /// Shiller CAPE value observable by `as_of`, if published.
    ///
    /// # Errors
    ///
    /// Only on feed failure; an unpublished value is `Ok(None)`.
    fn cape(&self, as_of: Date) -> Result<Option<f64>>;

    /// Trailing `months` of monthly Fama-French factor returns with last
    /// observation <= `end`, per factor.
    ///
    /// # Errors
    ///
    /// [`DataUnavailable`](crate::CadizError::DataUnavailable) when the
    /// factor library cannot be served; the caller treats this as
    /// "feature disabled, neutral tilts".
    fn ff_factor_window(&self, end: Date, months: usize)
        -> Result<BTreeMap<FfFactor, FfFactorWindow>>;

    /// Adjusted closes for an index symbol over the trailing
    /// `lookback_days` calendar days ending at `end`.
    ///
    /// # Errors
    ///
    /// [`DataUnavailable`](crate::CadizError::DataUnavailable) when the
    /// symbol has no history in the window.
    fn index_history(&self, symbol: &str, end: Date, lookback_days: u32) -> Result<PriceSeries>;

    /// VIX term structure observable at `end`, if available.
    ///
    /// # Errors
    ///
    /// Only on feed failure; missing legs are `Ok(None)`.
    fn vix_structure(&self, end: Date) -> Result<Option<VixTermStructure>>;
}
