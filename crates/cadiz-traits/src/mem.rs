//! In-memory reference implementations of the data contracts.
//!
//! [`MemoryProvider`] serves preloaded tables with strict point-in-time
//! filtering: every query is truncated to the requested as-of or end date,
//! so a historical run against it can never observe the future.
//! [`StaticUniverse`] is the "static list" resolver the universe contract
//! allows. Both are used by the test suites and are handy for notebooks and
//! fixtures; production deployments wrap real feeds instead.

use std::collections::BTreeMap;

use crate::error::{CadizError, Result};
use crate::provider::{
    FfFactor, FfFactorWindow, MarketDataProvider, VixTermStructure, MIN_PRICE_ROWS,
};
use crate::types::{Date, FundamentalSnapshot, PriceSeries, Ticker, UniverseMember};
use crate::universe::UniverseResolver;

/// A [`MarketDataProvider`] backed by preloaded in-memory tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    prices: BTreeMap<Ticker, PriceSeries>,
    fundamentals: BTreeMap<Ticker, Vec<(Date, FundamentalSnapshot)>>,
    benchmark: Option<PriceSeries>,
    cape: Vec<(Date, f64)>,
    ff_history: BTreeMap<FfFactor, Vec<(Date, f64)>>,
    indices: BTreeMap<String, PriceSeries>,
    vix: Vec<(Date, VixTermStructure)>,
}

impl MemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a full price series for a ticker.
    #[must_use]
    pub fn with_prices(mut self, ticker: impl Into<Ticker>, series: PriceSeries) -> Self {
        self.prices.insert(ticker.into(), series);
        self
    }

    /// Record a fundamental snapshot published on `date`.
    #[must_use]
    pub fn with_fundamentals(
        mut self,
        ticker: impl Into<Ticker>,
        date: Date,
        snapshot: FundamentalSnapshot,
    ) -> Self {
        let entries = self.fundamentals.entry(ticker.into()).or_default();
        entries.push((date, snapshot));
        entries.sort_by_key(|(d, _)| *d);
        self
    }

    /// Load the benchmark index series.
    #[must_use]
    pub fn with_benchmark(mut self, series: PriceSeries) -> Self {
        self.benchmark = Some(series);
        self
    }

    /// Record a CAPE observation published on `date`.
    #[must_use]
    pub fn with_cape(mut self, date: Date, value: f64) -> Self {
        self.cape.push((date, value));
        self.cape.sort_by_key(|(d, _)| *d);
        self
    }

    /// Load the full monthly return history for one Fama-French factor.
    #[must_use]
    pub fn with_ff_history(mut self, factor: FfFactor, history: Vec<(Date, f64)>) -> Self {
        let mut history = history;
        history.sort_by_key(|(d, _)| *d);
        self.ff_history.insert(factor, history);
        self
    }

    /// Load an index price series under a symbol.
    #[must_use]
    pub fn with_index(mut self, symbol: impl Into<String>, series: PriceSeries) -> Self {
        self.indices.insert(symbol.into(), series);
        self
    }

    /// Record a VIX term-structure observation on `date`.
    #[must_use]
    pub fn with_vix(mut self, date: Date, structure: VixTermStructure) -> Self {
        self.vix.push((date, structure));
        self.vix.sort_by_key(|(d, _)| *d);
        self
    }
}

impl MarketDataProvider for MemoryProvider {
    fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries> {
        let series = self
            .prices
            .get(ticker)
            .ok_or_else(|| CadizError::DataUnavailable(format!("no prices for {ticker}")))?;
        let points: Vec<_> = series
            .points()
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        if points.len() < MIN_PRICE_ROWS {
            return Err(CadizError::DataUnavailable(format!(
                "{ticker}: {} rows in [{start}, {end}], need {MIN_PRICE_ROWS}",
                points.len()
            )));
        }
        PriceSeries::new(points)
    }

    fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot> {
        self.fundamentals
            .get(ticker)
            .and_then(|entries| {
                entries
                    .iter()
                    .rev()
                    .find(|(date, _)| *date <= as_of)
                    .map(|(_, snapshot)| *snapshot)
            })
            .ok_or_else(|| {
                CadizError::DataUnavailable(format!("no fundamentals for {ticker} by {as_of}"))
            })
    }

    fn market_caps(&self, tickers: &[Ticker], as_of: Date) -> Result<BTreeMap<Ticker, f64>> {
        let mut caps = BTreeMap::new();
        for ticker in tickers {
            let shares = self
                .fundamentals(ticker, as_of)
                .ok()
                .and_then(|snapshot| snapshot.shares_outstanding);
            let price = self
                .prices
                .get(ticker)
                .and_then(|series| series.close_on_or_before(as_of));
            if let (Some(shares), Some(price)) = (shares, price) {
                if shares > 0.0 {
                    caps.insert(ticker.clone(), shares * price);
                }
            }
        }
        Ok(caps)
    }

    fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries> {
        let series = self
            .benchmark
            .as_ref()
            .ok_or_else(|| CadizError::ProviderUnavailable("no benchmark loaded".to_string()))?;
        let points: Vec<_> = series
            .points()
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        if points.is_empty() {
            return Err(CadizError::ProviderUnavailable(format!(
                "benchmark empty over [{start}, {end}]"
            )));
        }
        PriceSeries::new(points)
    }

    fn cape(&self, as_of: Date) -> Result<Option<f64>> {
        Ok(self
            .cape
            .iter()
            .rev()
            .find(|(date, _)| *date <= as_of)
            .map(|(_, value)| *value))
    }

    fn ff_factor_window(
        &self,
        end: Date,
        months: usize,
    ) -> Result<BTreeMap<FfFactor, FfFactorWindow>> {
        if self.ff_history.is_empty() {
            return Err(CadizError::DataUnavailable(
                "no factor history loaded".to_string(),
            ));
        }
        let mut windows = BTreeMap::new();
        for (factor, history) in &self.ff_history {
            let observable: Vec<f64> = history
                .iter()
                .filter(|(date, _)| *date <= end)
                .map(|(_, r)| *r)
                .collect();
            let full: Vec<f64> = history.iter().map(|(_, r)| *r).collect();
            let n = full.len();
            let history_mean = full.iter().sum::<f64>() / n.max(1) as f64;
            let history_std = if n > 1 {
                (full.iter().map(|r| (r - history_mean).powi(2)).sum::<f64>() / (n - 1) as f64)
                    .sqrt()
            } else {
                0.0
            };
            let tail_start = observable.len().saturating_sub(months);
            windows.insert(
                *factor,
                FfFactorWindow {
                    returns: observable[tail_start..].to_vec(),
                    history_mean,
                    history_std,
                },
            );
        }
        Ok(windows)
    }

    fn index_history(&self, symbol: &str, end: Date, lookback_days: u32) -> Result<PriceSeries> {
        let series = self
            .indices
            .get(symbol)
            .ok_or_else(|| CadizError::DataUnavailable(format!("no index history for {symbol}")))?;
        let start = end - chrono::Duration::days(i64::from(lookback_days));
        let points: Vec<_> = series
            .points()
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        if points.is_empty() {
            return Err(CadizError::DataUnavailable(format!(
                "{symbol}: no observations in trailing {lookback_days} days of {end}"
            )));
        }
        PriceSeries::new(points)
    }

    fn vix_structure(&self, end: Date) -> Result<Option<VixTermStructure>> {
        Ok(self
            .vix
            .iter()
            .rev()
            .find(|(date, _)| *date <= end)
            .map(|(_, structure)| *structure))
    }
}

/// A resolver that returns the same membership list at every date.
#[derive(Debug, Clone, Default)]
pub struct StaticUniverse {
    members: Vec<UniverseMember>,
}

impl StaticUniverse {
    /// Create a resolver over a fixed membership list.
    #[must_use]
    pub fn new(members: Vec<UniverseMember>) -> Self {
        Self { members }
    }

    /// The fixed membership list.
    #[must_use]
    pub fn members(&self) -> &[UniverseMember] {
        &self.members
    }
}

impl UniverseResolver for StaticUniverse {
    fn resolve(&self, _as_of: Date) -> Result<Vec<UniverseMember>> {
        Ok(self.members.clone())
    }
}
