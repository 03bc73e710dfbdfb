//! Market-state classification and tactical adjusters.
//!
//! Three independent overlays, each optional and each strictly
//! point-in-time:
//!
//! - [`RegimeDetector`]: classifies the market as risk-on / caution /
//!   risk-off from the benchmark index's 200-day moving average and the
//!   VIX term structure, for tactical exposure scaling.
//! - [`CapeAdjuster`]: maps the Shiller CAPE level to a scalar on
//!   equilibrium returns (cheap markets up-weight, expensive markets
//!   down-weight).
//! - [`FactorRegimeAdjuster`]: maps trailing Fama-French factor
//!   performance to per-factor tilts on the z-score columns.
//!
//! Every input feed here is optional: a missing feed disables the overlay
//! (neutral scalar, neutral tilt, unknown regime) rather than failing.

pub mod cape;
pub mod detector;
pub mod factor_regime;

pub use cape::{CapeAdjuster, CapeAdjustment, ValuationRegime};
pub use detector::{exposure_for, MarketRegime, RegimeDetector, RegimeReading};
pub use factor_regime::{FactorRegimeAdjuster, FactorRegimeReading, FactorRegimeState, FactorRegimeSummary};
