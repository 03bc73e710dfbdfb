//! Portfolio construction for the cadiz engine.
//!
//! Turns factor scores into a portfolio in three stages:
//!
//! 1. **Covariance** — trailing two-year daily return covariance,
//!    annualized, with a Ledoit-Wolf shrinkage fallback whenever the
//!    sample estimate is not comfortably positive definite.
//! 2. **Black-Litterman posterior** — a market-cap equilibrium prior
//!    blended with one absolute view per ticker, views sized from the
//!    composite z-score and weighted by Idzorek-style confidences derived
//!    from factor agreement.
//! 3. **Constrained optimization** — five objectives over a box, budget,
//!    and per-sector caps, solved by projected gradient descent with a
//!    risk-aversion sweep for the ratio objectives, plus a 130/30-style
//!    two-leg decomposition for long/short books.
//!
//! A largest-remainder discrete allocator converts the continuous weights
//! into share counts without touching the optimization.

#![forbid(unsafe_code)]

pub mod allocation;
pub mod black_litterman;
pub mod covariance;
pub mod frontier;
pub mod linalg;
pub mod solver;

pub use allocation::{allocate, DiscreteAllocation};
pub use black_litterman::{BlackLitterman, Posterior, ViewSet, BL_TAU};
pub use covariance::{aligned_returns, ledoit_wolf, sample_covariance, CovarianceEstimate};
pub use frontier::{PortfolioOptimizer, PortfolioSolution};
pub use solver::ConstraintSet;
