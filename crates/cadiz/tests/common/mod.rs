//! Shared fixtures for the end-to-end scenario tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{Datelike, Duration};

use cadiz::traits::mem::MemoryProvider;
use cadiz::traits::provider::{FfFactor, FfFactorWindow, VixTermStructure};
use cadiz::traits::types::{FundamentalSnapshot, PricePoint, PriceSeries};
use cadiz::{Date, MarketDataProvider, Result, Ticker};

pub fn d(y: i32, m: u32, day: u32) -> Date {
    Date::from_ymd_opt(y, m, day).unwrap()
}

/// Deterministic noise in `[-1, 1]` from a linear congruential generator.
fn lcg_noise(state: &mut u64) -> f64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    ((*state >> 11) as f64) / ((1u64 << 53) as f64) * 2.0 - 1.0
}

/// A weekday-only price path with geometric drift and deterministic noise.
///
/// The path runs for `sessions` trading days starting at `start`, begins
/// at `start_price`, and drifts so the noise-free endpoint would be
/// `start_price * (1 + total_drift)`.
pub fn weekday_path(
    start: Date,
    sessions: usize,
    start_price: f64,
    total_drift: f64,
    daily_vol: f64,
    seed: u64,
) -> PriceSeries {
    let step = (1.0 + total_drift).powf(1.0 / (sessions.max(2) - 1) as f64);
    let mut state = seed;
    let mut close = start_price;
    let mut date = start;
    let mut points = Vec::with_capacity(sessions);
    while points.len() < sessions {
        if date.weekday().number_from_monday() <= 5 {
            points.push(PricePoint { date, close });
            close *= step * (1.0 + daily_vol * lcg_noise(&mut state));
        }
        date += Duration::days(1);
    }
    PriceSeries::new(points).unwrap()
}

/// Fundamentals engineered to hit target factor ratios given the market
/// value implied by `shares` and the series' last close.
pub fn fundamentals_for(
    series: &PriceSeries,
    shares: f64,
    fcf_yield: f64,
    earnings_yield: f64,
    roic: f64,
    gross_margin: f64,
) -> FundamentalSnapshot {
    let market_value = shares * series.last_close().unwrap();
    let ebit = earnings_yield * market_value;
    let invested_capital = if roic != 0.0 { ebit / roic } else { 1.0 };
    let revenue = market_value; // arbitrary positive scale
    FundamentalSnapshot {
        free_cash_flow: Some(fcf_yield * market_value),
        ebit: Some(ebit),
        revenue: Some(revenue),
        gross_profit: Some(gross_margin * revenue),
        total_assets: Some(invested_capital + 1.0e8),
        current_liabilities: Some(1.0e8),
        shares_outstanding: Some(shares),
    }
}

/// A provider wrapper that panics on any read beyond its horizon, on any
/// non-monotone sequence of reference dates, and on any response carrying
/// an observation after the requested date.
///
/// Backtests driven through this wrapper demonstrate point-in-time
/// discipline: the run completing at all is the assertion.
#[derive(Debug)]
pub struct TrapProvider {
    inner: MemoryProvider,
    horizon: Date,
    clock: Mutex<Date>,
}

impl TrapProvider {
    pub fn new(inner: MemoryProvider, horizon: Date) -> Self {
        Self { inner, horizon, clock: Mutex::new(Date::MIN) }
    }

    fn check(&self, what: &str, reference: Date) {
        assert!(
            reference <= self.horizon,
            "{what}: read at {reference} beyond horizon {}",
            self.horizon
        );
        let mut clock = self.clock.lock().unwrap();
        assert!(
            reference >= *clock,
            "{what}: reference date {reference} moved backwards from {}",
            *clock
        );
        *clock = reference;
    }
}

impl MarketDataProvider for TrapProvider {
    fn prices(&self, ticker: &str, start: Date, end: Date) -> Result<PriceSeries> {
        self.check("prices", end);
        let series = self.inner.prices(ticker, start, end)?;
        assert!(series.last_date().unwrap_or(end) <= end, "prices leaked beyond {end}");
        Ok(series)
    }

    fn fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalSnapshot> {
        self.check("fundamentals", as_of);
        self.inner.fundamentals(ticker, as_of)
    }

    fn market_caps(&self, tickers: &[Ticker], as_of: Date) -> Result<BTreeMap<Ticker, f64>> {
        self.check("market_caps", as_of);
        self.inner.market_caps(tickers, as_of)
    }

    fn benchmark_prices(&self, start: Date, end: Date) -> Result<PriceSeries> {
        // The benchmark is fetched once for the whole window; it does not
        // participate in the walk-forward clock.
        assert!(end <= self.horizon, "benchmark read at {end} beyond horizon");
        self.inner.benchmark_prices(start, end)
    }

    fn cape(&self, as_of: Date) -> Result<Option<f64>> {
        self.check("cape", as_of);
        self.inner.cape(as_of)
    }

    fn ff_factor_window(
        &self,
        end: Date,
        months: usize,
    ) -> Result<BTreeMap<FfFactor, FfFactorWindow>> {
        self.check("ff_factor_window", end);
        self.inner.ff_factor_window(end, months)
    }

    fn index_history(&self, symbol: &str, end: Date, lookback_days: u32) -> Result<PriceSeries> {
        self.check("index_history", end);
        let series = self.inner.index_history(symbol, end, lookback_days)?;
        assert!(series.last_date().unwrap_or(end) <= end, "index leaked beyond {end}");
        Ok(series)
    }

    fn vix_structure(&self, end: Date) -> Result<Option<VixTermStructure>> {
        self.check("vix_structure", end);
        self.inner.vix_structure(end)
    }
}
