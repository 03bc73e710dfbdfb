#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

/// The version of the cadiz crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core types and data contracts.
pub mod traits {
    pub use cadiz_traits::*;
}

/// Factor scoring.
pub mod factors {
    pub use cadiz_factors::*;
}

/// Regime detection and tactical adjusters.
pub mod regime {
    pub use cadiz_regime::*;
}

/// Covariance, Black-Litterman, and portfolio optimization.
pub mod optimizer {
    pub use cadiz_optimizer::*;
}

/// Walk-forward backtesting.
pub mod backtest {
    pub use cadiz_backtest::*;
}

// Top-level re-exports of the types nearly every caller touches.
pub use cadiz_backtest::{BacktestDriver, BacktestReport, CancelToken};
pub use cadiz_factors::{FactorEngine, FactorScores};
pub use cadiz_optimizer::{BlackLitterman, PortfolioOptimizer};
pub use cadiz_regime::{MarketRegime, RegimeDetector};
pub use cadiz_traits::{
    CadizError, Date, MarketDataProvider, Result, Sector, StrategyConfig, Ticker, UniverseResolver,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use cadiz_backtest::{BacktestDriver, BacktestReport, CancelToken, PerformanceMetrics};
    pub use cadiz_factors::{FactorEngine, FactorScores, FactorTilts};
    pub use cadiz_optimizer::{BlackLitterman, PortfolioOptimizer, PortfolioSolution};
    pub use cadiz_regime::{CapeAdjuster, FactorRegimeAdjuster, MarketRegime, RegimeDetector};
    pub use cadiz_traits::{
        CadizError, Date, MarketDataProvider, MarketSnapshot, Result, Sector, StrategyConfig,
        Ticker, UniverseMember, UniverseResolver,
    };
}
