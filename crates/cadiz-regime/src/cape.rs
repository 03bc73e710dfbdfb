//! CAPE-based macro adjustment of equilibrium returns.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cadiz_traits::{Date, MarketDataProvider, StrategyConfig};

/// Market valuation regime implied by the CAPE level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuationRegime {
    /// CAPE at or below the low threshold.
    Cheap,
    /// CAPE between the thresholds.
    Fair,
    /// CAPE at or above the high threshold.
    Expensive,
    /// CAPE unavailable.
    Unknown,
}

/// Result of a CAPE lookup: the scalar to multiply equilibrium returns by,
/// plus the evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapeAdjustment {
    /// CAPE value observed, if any.
    pub cape: Option<f64>,
    /// Multiplier on equilibrium returns (1.0 = neutral).
    pub scalar: f64,
    /// Valuation regime label.
    pub regime: ValuationRegime,
}

impl CapeAdjustment {
    /// The neutral adjustment used when CAPE is unavailable.
    pub const NEUTRAL: Self =
        Self { cape: None, scalar: 1.0, regime: ValuationRegime::Unknown };
}

/// Maps the Shiller CAPE to a scalar on equilibrium returns.
///
/// Cheap markets (low CAPE) scale expected returns up, expensive markets
/// scale them down, with linear interpolation between the thresholds. A
/// missing CAPE is neutral — the overlay quietly disables itself.
#[derive(Debug, Clone, Copy)]
pub struct CapeAdjuster {
    cape_low: f64,
    cape_high: f64,
    scalar_low: f64,
    scalar_high: f64,
}

impl Default for CapeAdjuster {
    fn default() -> Self {
        Self { cape_low: 15.0, cape_high: 35.0, scalar_low: 1.20, scalar_high: 0.70 }
    }
}

impl CapeAdjuster {
    /// Adjuster with explicit thresholds and scalars.
    #[must_use]
    pub fn new(thresholds: (f64, f64), scalars: (f64, f64)) -> Self {
        Self {
            cape_low: thresholds.0,
            cape_high: thresholds.1,
            scalar_low: scalars.0,
            scalar_high: scalars.1,
        }
    }

    /// Adjuster configured from the strategy record.
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.cape_thresholds, config.cape_scalars)
    }

    /// Scalar for a known CAPE level.
    #[must_use]
    pub fn scalar_for(&self, cape: f64) -> f64 {
        if cape <= self.cape_low {
            self.scalar_low
        } else if cape >= self.cape_high {
            self.scalar_high
        } else {
            let fraction = (cape - self.cape_low) / (self.cape_high - self.cape_low);
            self.scalar_low + fraction * (self.scalar_high - self.scalar_low)
        }
    }

    /// Look up the CAPE observable at `as_of` and derive the adjustment.
    ///
    /// A missing value or an unavailable feed yields the neutral
    /// adjustment; the overlay never fails a rebalance.
    #[must_use]
    pub fn adjustment(&self, provider: &dyn MarketDataProvider, as_of: Date) -> CapeAdjustment {
        let cape = match provider.cape(as_of) {
            Ok(Some(cape)) => cape,
            Ok(None) => return CapeAdjustment::NEUTRAL,
            Err(err) => {
                debug!(%err, "CAPE feed unavailable, using neutral scalar");
                return CapeAdjustment::NEUTRAL;
            }
        };

        let scalar = self.scalar_for(cape);
        let regime = if cape <= self.cape_low {
            ValuationRegime::Cheap
        } else if cape >= self.cape_high {
            ValuationRegime::Expensive
        } else {
            ValuationRegime::Fair
        };
        CapeAdjustment { cape: Some(cape), scalar, regime }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadiz_traits::mem::MemoryProvider;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_cheap_market_boost() {
        let adjuster = CapeAdjuster::default();
        assert_relative_eq!(adjuster.scalar_for(12.0), 1.20);
        assert_relative_eq!(adjuster.scalar_for(15.0), 1.20);
    }

    #[test]
    fn test_expensive_market_haircut() {
        let adjuster = CapeAdjuster::default();
        assert_relative_eq!(adjuster.scalar_for(35.0), 0.70);
        assert_relative_eq!(adjuster.scalar_for(45.0), 0.70);
    }

    #[test]
    fn test_linear_interpolation_between_thresholds() {
        let adjuster = CapeAdjuster::default();
        // Midpoint of (15, 35) maps to the midpoint of (1.2, 0.7).
        assert_relative_eq!(adjuster.scalar_for(25.0), 0.95, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_cape_is_neutral() {
        let adjuster = CapeAdjuster::default();
        let provider = MemoryProvider::new();
        let adjustment = adjuster.adjustment(&provider, d(2023, 6, 30));
        assert_eq!(adjustment, CapeAdjustment::NEUTRAL);
        assert_relative_eq!(adjustment.scalar, 1.0);
    }

    #[test]
    fn test_observed_cape_labels_regime() {
        let adjuster = CapeAdjuster::default();
        let provider = MemoryProvider::new().with_cape(d(2023, 5, 31), 38.0);
        let adjustment = adjuster.adjustment(&provider, d(2023, 6, 30));
        assert_eq!(adjustment.regime, ValuationRegime::Expensive);
        assert_relative_eq!(adjustment.scalar, 0.70);

        // Before the first publication the overlay is off.
        let early = adjuster.adjustment(&provider, d(2023, 1, 1));
        assert_eq!(early.regime, ValuationRegime::Unknown);
    }
}
