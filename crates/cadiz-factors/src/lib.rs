//! Multi-factor stock scoring for the cadiz engine.
//!
//! Ranks a universe on three composite factors:
//! - **Value**: free-cash-flow yield + earnings yield
//! - **Quality**: return on invested capital + gross margin
//! - **Momentum**: 12-month price return
//!
//! Raw factors are computed per ticker from point-in-time fundamentals and
//! prices, missing sub-metrics are imputed with the universe median at the
//! rebalance, the cross-section is winsorized at the 1st/99th percentiles,
//! z-scored with a +/-3 clip, and blended into a composite with
//! configurable weights. Every ticker gets a full audit of how its score
//! was formed.
//!
//! Scoring never fails globally: a ticker with no usable inputs scores
//! neutral (z = 0 across the board) and is flagged in its audit.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod audit;
pub mod engine;
pub mod raw;
pub mod scores;

pub use audit::{FactorAudit, ScoreAudit, TickerAudit, UniverseFactorStats};
pub use engine::{FactorEngine, FactorEngineConfig, ScoreSet};
pub use raw::{RawFactors, MOMENTUM_LOOKBACK_SESSIONS};
pub use scores::{FactorScores, FactorTilts};
