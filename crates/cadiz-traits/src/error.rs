//! Error types for the cadiz engine.
//!
//! One enum covers every error surfaced at the engine boundary. The driver
//! and factor engine absorb most of these locally (a ticker with missing
//! fundamentals is dropped, not fatal); only configuration problems,
//! twice-failed solves, and an unreachable provider propagate to the caller.

use thiserror::Error;

use crate::types::Date;

/// The main error type for cadiz operations.
#[derive(Debug, Error)]
pub enum CadizError {
    /// A data feed had nothing to return for the requested ticker or range.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Data exists but is too thin to compute on (e.g. a price series with
    /// fewer than the required number of rows).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Fewer tickers survived universe resolution than the rebalance minimum.
    #[error("insufficient universe at {date}: {size} tickers (minimum {min})")]
    InsufficientUniverse {
        /// Rebalance date at which resolution fell short.
        date: Date,
        /// Number of tickers that survived.
        size: usize,
        /// Minimum required to proceed.
        min: usize,
    },

    /// The set of tickers handed to the optimizer was empty.
    #[error("empty optimization set")]
    EmptyOptimizationSet,

    /// The return covariance could not be made positive semidefinite, even
    /// after shrinkage.
    #[error("covariance ill-conditioned: {0}")]
    CovarianceIllConditioned(String),

    /// The solver failed at a rebalance date after its retry.
    #[error("optimization failed at {date}: {reason}")]
    OptimizationFailed {
        /// Rebalance date of the failed solve.
        date: Date,
        /// Underlying failure description.
        reason: String,
    },

    /// The constraint set admits no feasible portfolio.
    #[error("solver infeasible: {0}")]
    SolverInfeasible(String),

    /// The strategy configuration is inconsistent; nothing was run.
    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// A mandatory feed (benchmark series or universe) is unreachable.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A date argument was malformed or out of range.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// Generic error for other cases.
    #[error("{0}")]
    Other(String),
}

impl From<String> for CadizError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for CadizError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

/// A specialized `Result` type for cadiz operations.
pub type Result<T> = std::result::Result<T, CadizError>;
