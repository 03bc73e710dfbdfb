//! Common types used throughout the cadiz engine.
//!
//! Market data is represented as plain typed structs keyed by ticker. All
//! joins between tables happen explicitly by ticker; there is no implicit
//! row reordering anywhere in the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{CadizError, Result};

// Re-export date type from chrono
pub use chrono::NaiveDate as Date;

/// Trading sessions per calendar year, used for annualization.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// A ticker symbol identifier.
///
/// Tickers are opaque, case-sensitive strings like "AAPL" or "BRK-B".
pub type Ticker = String;

/// GICS-style sector tags.
///
/// The set is closed: eleven named sectors plus an [`Sector::Unknown`] sink
/// for coverage gaps in the upstream classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sector {
    /// Information technology.
    Technology,
    /// Healthcare and pharmaceuticals.
    Healthcare,
    /// Banks, insurance, asset management.
    FinancialServices,
    /// Discretionary consumer goods and services.
    ConsumerCyclical,
    /// Staples.
    ConsumerDefensive,
    /// Media, telecom, interactive services.
    CommunicationServices,
    /// Capital goods and transport.
    Industrials,
    /// Oil, gas, and energy services.
    Energy,
    /// Electric, gas, and water utilities.
    Utilities,
    /// REITs and real-estate services.
    RealEstate,
    /// Chemicals, metals, and mining.
    BasicMaterials,
    /// Classification unavailable.
    Unknown,
}

impl Sector {
    /// All named sectors, excluding [`Sector::Unknown`].
    pub const NAMED: [Sector; 11] = [
        Sector::Technology,
        Sector::Healthcare,
        Sector::FinancialServices,
        Sector::ConsumerCyclical,
        Sector::ConsumerDefensive,
        Sector::CommunicationServices,
        Sector::Industrials,
        Sector::Energy,
        Sector::Utilities,
        Sector::RealEstate,
        Sector::BasicMaterials,
    ];

    /// Human-readable sector name as used by upstream classifications.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Technology => "Technology",
            Self::Healthcare => "Healthcare",
            Self::FinancialServices => "Financial Services",
            Self::ConsumerCyclical => "Consumer Cyclical",
            Self::ConsumerDefensive => "Consumer Defensive",
            Self::CommunicationServices => "Communication Services",
            Self::Industrials => "Industrials",
            Self::Energy => "Energy",
            Self::Utilities => "Utilities",
            Self::RealEstate => "Real Estate",
            Self::BasicMaterials => "Basic Materials",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse a sector name. Unrecognized names map to [`Sector::Unknown`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::NAMED
            .into_iter()
            .find(|s| s.as_str() == name)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation of an adjusted closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Trading date.
    pub date: Date,
    /// Split- and dividend-adjusted closing price.
    pub close: f64,
}

/// An ordered series of adjusted closing prices.
///
/// Dates are strictly increasing; gaps are allowed (non-trading days).
/// Construction validates the ordering so downstream code can binary-search
/// without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Create a price series from observations.
    ///
    /// # Errors
    ///
    /// Returns [`CadizError::InvalidDate`] if dates are not strictly
    /// increasing, or [`CadizError::Other`] if any close is non-finite
    /// or non-positive.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(CadizError::InvalidDate(format!(
                    "price series dates not strictly increasing: {} then {}",
                    pair[0].date, pair[1].date
                )));
            }
        }
        if let Some(p) = points.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(CadizError::Other(format!(
                "invalid close {} on {}",
                p.close, p.date
            )));
        }
        Ok(Self { points })
    }

    /// Build a series from parallel date/close vectors.
    ///
    /// # Errors
    ///
    /// Same as [`PriceSeries::new`]; additionally fails if the vectors
    /// have different lengths.
    pub fn from_parts(dates: Vec<Date>, closes: Vec<f64>) -> Result<Self> {
        if dates.len() != closes.len() {
            return Err(CadizError::Other(format!(
                "date/close length mismatch: {} vs {}",
                dates.len(),
                closes.len()
            )));
        }
        Self::new(
            dates
                .into_iter()
                .zip(closes)
                .map(|(date, close)| PricePoint { date, close })
                .collect(),
        )
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The underlying observations, oldest first.
    #[must_use]
    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// Closing prices, oldest first.
    #[must_use]
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    /// Trading dates, oldest first.
    #[must_use]
    pub fn dates(&self) -> Vec<Date> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// First observation date, if any.
    #[must_use]
    pub fn first_date(&self) -> Option<Date> {
        self.points.first().map(|p| p.date)
    }

    /// Last observation date, if any.
    #[must_use]
    pub fn last_date(&self) -> Option<Date> {
        self.points.last().map(|p| p.date)
    }

    /// Most recent close, if any.
    #[must_use]
    pub fn last_close(&self) -> Option<f64> {
        self.points.last().map(|p| p.close)
    }

    /// Most recent close observed on or before `date`.
    #[must_use]
    pub fn close_on_or_before(&self, date: Date) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| self.points[i].close)
    }

    /// Restrict the series to observations with `date <= end`.
    #[must_use]
    pub fn truncate_after(&self, end: Date) -> Self {
        let idx = self.points.partition_point(|p| p.date <= end);
        Self {
            points: self.points[..idx].to_vec(),
        }
    }

    /// Return over the trailing `sessions` trading days ending at the last
    /// observation: `close_last / close_{last - sessions} - 1`.
    ///
    /// Returns `None` when the series is too short.
    #[must_use]
    pub fn trailing_return(&self, sessions: usize) -> Option<f64> {
        let n = self.points.len();
        if n <= sessions {
            return None;
        }
        let past = self.points[n - 1 - sessions].close;
        let last = self.points[n - 1].close;
        (past > 0.0).then(|| last / past - 1.0)
    }

    /// Simple (percentage) returns between consecutive observations.
    #[must_use]
    pub fn simple_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| w[1].close / w[0].close - 1.0)
            .collect()
    }
}

/// The most recent fundamentals observable for a ticker at some as-of date.
///
/// Every field is optional: coverage gaps are the norm, not the exception,
/// and the factor engine has an explicit policy for each missing field.
/// Flow items (`free_cash_flow`, `ebit`, `revenue`, `gross_profit`) are
/// trailing-twelve-month figures; the rest are balance-sheet levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    /// Free cash flow, TTM.
    pub free_cash_flow: Option<f64>,
    /// Earnings before interest and taxes, TTM.
    pub ebit: Option<f64>,
    /// Total revenue, TTM.
    pub revenue: Option<f64>,
    /// Gross profit, TTM.
    pub gross_profit: Option<f64>,
    /// Total assets.
    pub total_assets: Option<f64>,
    /// Current liabilities.
    pub current_liabilities: Option<f64>,
    /// Shares outstanding.
    pub shares_outstanding: Option<f64>,
}

/// One universe constituent at an as-of date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseMember {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Sector classification.
    pub sector: Sector,
    /// Market capitalization, strictly positive.
    pub market_cap: f64,
}

impl UniverseMember {
    /// Create a universe member.
    #[must_use]
    pub fn new(ticker: impl Into<Ticker>, sector: Sector, market_cap: f64) -> Self {
        Self {
            ticker: ticker.into(),
            sector,
            market_cap,
        }
    }
}
