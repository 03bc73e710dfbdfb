#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// The version of the cadiz-traits crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod error;
pub mod mem;
pub mod provider;
pub mod snapshot;
pub mod stats;
pub mod types;
pub mod universe;

pub use config::{
    FactorWeights, Objective, RebalanceFrequency, RegimeExposures, RegimeMethod, StrategyConfig,
    TradingMode,
};
pub use error::{CadizError, Result};
pub use provider::{FfFactor, FfFactorWindow, MarketDataProvider, VixTermStructure};
pub use snapshot::MarketSnapshot;
pub use types::{
    Date, FundamentalSnapshot, PriceSeries, Sector, Ticker, UniverseMember, TRADING_DAYS_PER_YEAR,
};
pub use universe::UniverseResolver;
