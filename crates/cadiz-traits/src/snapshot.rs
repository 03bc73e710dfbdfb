//! Point-in-time data assembly for one rebalance.
//!
//! A [`MarketSnapshot`] gathers everything the factor and covariance
//! stages need for a given as-of date: a two-year price window and the
//! latest fundamental snapshot per ticker. Per-ticker fetch failures are
//! absorbed here — a ticker whose price series cannot be served is dropped
//! from the rebalance and recorded, never fatal. Missing fundamentals keep
//! the ticker alive (it scores neutral downstream).

use std::collections::BTreeMap;

use chrono::Duration;
use tracing::debug;

use crate::error::Result;
use crate::provider::MarketDataProvider;
use crate::types::{Date, FundamentalSnapshot, PriceSeries, Ticker, UniverseMember};

/// Calendar days of price history fetched per ticker (about two years).
pub const PRICE_LOOKBACK_DAYS: i64 = 730;

/// A ticker excluded from a rebalance, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedTicker {
    /// The excluded ticker.
    pub ticker: Ticker,
    /// Human-readable exclusion reason.
    pub reason: String,
}

/// Immutable per-rebalance view of the market.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    as_of: Date,
    prices: BTreeMap<Ticker, PriceSeries>,
    fundamentals: BTreeMap<Ticker, FundamentalSnapshot>,
    dropped: Vec<DroppedTicker>,
}

impl MarketSnapshot {
    /// Fetch prices and fundamentals for every universe member as of
    /// `as_of`.
    ///
    /// Tickers whose price series is unavailable (or too short, per the
    /// provider contract) are dropped and recorded. Tickers with prices but
    /// no fundamentals are kept with no snapshot entry; the factor engine
    /// treats them as all-missing.
    ///
    /// # Errors
    ///
    /// Never fails on per-ticker problems. Reserved for future wholesale
    /// failures surfaced by batch provider implementations.
    pub fn fetch(
        provider: &dyn MarketDataProvider,
        members: &[UniverseMember],
        as_of: Date,
    ) -> Result<Self> {
        let start = as_of - Duration::days(PRICE_LOOKBACK_DAYS);

        let mut prices = BTreeMap::new();
        let mut fundamentals = BTreeMap::new();
        let mut dropped = Vec::new();

        for member in members {
            match provider.prices(&member.ticker, start, as_of) {
                Ok(series) => {
                    prices.insert(member.ticker.clone(), series);
                }
                Err(err) => {
                    debug!(ticker = %member.ticker, %err, "dropping ticker: no usable prices");
                    dropped.push(DroppedTicker {
                        ticker: member.ticker.clone(),
                        reason: err.to_string(),
                    });
                    continue;
                }
            }

            if let Ok(snapshot) = provider.fundamentals(&member.ticker, as_of) {
                fundamentals.insert(member.ticker.clone(), snapshot);
            }
        }

        Ok(Self { as_of, prices, fundamentals, dropped })
    }

    /// Assemble a snapshot directly from tables (used by tests and by
    /// providers that batch their own fetches).
    #[must_use]
    pub fn from_parts(
        as_of: Date,
        prices: BTreeMap<Ticker, PriceSeries>,
        fundamentals: BTreeMap<Ticker, FundamentalSnapshot>,
    ) -> Self {
        Self { as_of, prices, fundamentals, dropped: Vec::new() }
    }

    /// The reference date of this snapshot.
    #[must_use]
    pub fn as_of(&self) -> Date {
        self.as_of
    }

    /// Tickers with a usable price series, in ticker order.
    #[must_use]
    pub fn tickers(&self) -> Vec<Ticker> {
        self.prices.keys().cloned().collect()
    }

    /// Price series for a ticker, if it survived the fetch.
    #[must_use]
    pub fn price_series(&self, ticker: &str) -> Option<&PriceSeries> {
        self.prices.get(ticker)
    }

    /// All price series, keyed by ticker.
    #[must_use]
    pub fn prices(&self) -> &BTreeMap<Ticker, PriceSeries> {
        &self.prices
    }

    /// Fundamental snapshot for a ticker, if one was observable.
    #[must_use]
    pub fn fundamental(&self, ticker: &str) -> Option<&FundamentalSnapshot> {
        self.fundamentals.get(ticker)
    }

    /// Tickers excluded from this rebalance, with reasons.
    #[must_use]
    pub fn dropped(&self) -> &[DroppedTicker] {
        &self.dropped
    }

    /// Number of tickers with usable prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no ticker survived the fetch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
