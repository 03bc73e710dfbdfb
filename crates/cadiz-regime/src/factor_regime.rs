//! Fama-French factor-regime tilts.
//!
//! Looks at how each canonical factor has performed over a trailing window
//! relative to its full history, classifies the regime, and emits a
//! multiplicative tilt per internal factor: HML drives Value, RMW drives
//! Quality, and Momentum has no Fama-French analogue so it stays neutral.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cadiz_factors::FactorTilts;
use cadiz_traits::provider::{FfFactor, FfFactorWindow};
use cadiz_traits::{Date, MarketDataProvider, StrategyConfig};

/// Five-state factor regime classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorRegimeState {
    /// Trailing mean at least 1.5 sigma above history.
    StrongPositive,
    /// Between 0.5 and 1.5 sigma above.
    Positive,
    /// Within half a sigma of history.
    Neutral,
    /// Between 0.5 and 1.5 sigma below.
    Negative,
    /// At least 1.5 sigma below history.
    StrongNegative,
}

impl FactorRegimeState {
    /// Classify a trailing-mean z-score.
    #[must_use]
    pub fn from_z(z: f64) -> Self {
        if z >= 1.5 {
            Self::StrongPositive
        } else if z >= 0.5 {
            Self::Positive
        } else if z <= -1.5 {
            Self::StrongNegative
        } else if z <= -0.5 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    /// Raw (unsoftened) tilt for this regime.
    #[must_use]
    pub const fn raw_tilt(&self) -> f64 {
        match self {
            Self::StrongPositive => 1.30,
            Self::Positive => 1.15,
            Self::Neutral => 1.00,
            Self::Negative => 0.85,
            Self::StrongNegative => 0.70,
        }
    }
}

/// Regime evidence for one Fama-French factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRegimeReading {
    /// Trailing-mean z-score against full history.
    pub z: f64,
    /// Classified regime.
    pub state: FactorRegimeState,
    /// Raw tilt from the regime table.
    pub raw_tilt: f64,
    /// Tilt after softening by the configured strength.
    pub tilt: f64,
}

/// Result of a factor-regime assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorRegimeSummary {
    /// Per-factor evidence, keyed by the Fama-French factor.
    pub readings: BTreeMap<FfFactor, FactorRegimeReading>,
    /// Tilts on the internal factor columns.
    pub tilts: FactorTilts,
}

impl FactorRegimeSummary {
    /// Neutral summary used when the factor library is unavailable.
    #[must_use]
    pub fn neutral() -> Self {
        Self { readings: BTreeMap::new(), tilts: FactorTilts::NEUTRAL }
    }
}

/// Derives per-factor tilts from trailing Fama-French performance.
#[derive(Debug, Clone, Copy)]
pub struct FactorRegimeAdjuster {
    window_months: usize,
    tilt_strength: f64,
}

impl Default for FactorRegimeAdjuster {
    fn default() -> Self {
        Self { window_months: 12, tilt_strength: 0.5 }
    }
}

impl FactorRegimeAdjuster {
    /// Adjuster with an explicit window and softening strength.
    #[must_use]
    pub fn new(window_months: usize, tilt_strength: f64) -> Self {
        Self { window_months, tilt_strength }
    }

    /// Adjuster configured from the strategy record.
    #[must_use]
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.ff_window_months, config.tilt_strength)
    }

    /// Assess factor regimes observable at `end`.
    ///
    /// An unavailable factor library disables the overlay: the summary is
    /// neutral and scoring proceeds untilted.
    #[must_use]
    pub fn assess(&self, provider: &dyn MarketDataProvider, end: Date) -> FactorRegimeSummary {
        let windows = match provider.ff_factor_window(end, self.window_months) {
            Ok(windows) => windows,
            Err(err) => {
                debug!(%err, "factor library unavailable, tilts neutral");
                return FactorRegimeSummary::neutral();
            }
        };

        let mut readings = BTreeMap::new();
        for (factor, window) in &windows {
            readings.insert(*factor, self.read(window));
        }

        let tilts = FactorTilts {
            value: readings.get(&FfFactor::Hml).map_or(1.0, |r| r.tilt),
            quality: readings.get(&FfFactor::Rmw).map_or(1.0, |r| r.tilt),
            momentum: 1.0,
        };

        FactorRegimeSummary { readings, tilts }
    }

    fn read(&self, window: &FfFactorWindow) -> FactorRegimeReading {
        let z = match window.window_mean() {
            Some(mean) if window.history_std > 0.0 => {
                (mean - window.history_mean) / window.history_std
            }
            _ => 0.0,
        };
        let state = FactorRegimeState::from_z(z);
        let raw_tilt = state.raw_tilt();
        let tilt = 1.0 + self.tilt_strength * (raw_tilt - 1.0);
        FactorRegimeReading { z, state, raw_tilt, tilt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadiz_traits::mem::MemoryProvider;
    use chrono::Months;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    fn monthly(start: Date, returns: &[f64]) -> Vec<(Date, f64)> {
        returns
            .iter()
            .enumerate()
            .map(|(i, &r)| (start.checked_add_months(Months::new(i as u32)).unwrap(), r))
            .collect()
    }

    #[test]
    fn test_state_table() {
        assert_eq!(FactorRegimeState::from_z(2.0), FactorRegimeState::StrongPositive);
        assert_eq!(FactorRegimeState::from_z(1.5), FactorRegimeState::StrongPositive);
        assert_eq!(FactorRegimeState::from_z(0.5), FactorRegimeState::Positive);
        assert_eq!(FactorRegimeState::from_z(0.0), FactorRegimeState::Neutral);
        assert_eq!(FactorRegimeState::from_z(-0.5), FactorRegimeState::Negative);
        assert_eq!(FactorRegimeState::from_z(-1.5), FactorRegimeState::StrongNegative);
    }

    #[test]
    fn test_tilt_softening() {
        let adjuster = FactorRegimeAdjuster::new(12, 0.5);
        let window = FfFactorWindow {
            returns: vec![0.05; 12],
            history_mean: 0.0,
            history_std: 0.02,
        };
        let reading = adjuster.read(&window);
        assert_eq!(reading.state, FactorRegimeState::StrongPositive);
        assert_relative_eq!(reading.raw_tilt, 1.30);
        // Half strength: 1 + 0.5 * 0.30
        assert_relative_eq!(reading.tilt, 1.15);
    }

    #[test]
    fn test_full_strength_passes_raw_tilt() {
        let adjuster = FactorRegimeAdjuster::new(12, 1.0);
        let window = FfFactorWindow {
            returns: vec![-0.05; 12],
            history_mean: 0.0,
            history_std: 0.02,
        };
        let reading = adjuster.read(&window);
        assert_relative_eq!(reading.tilt, 0.70);
    }

    #[test]
    fn test_zero_history_std_is_neutral() {
        let adjuster = FactorRegimeAdjuster::default();
        let window =
            FfFactorWindow { returns: vec![0.01; 12], history_mean: 0.0, history_std: 0.0 };
        let reading = adjuster.read(&window);
        assert_eq!(reading.state, FactorRegimeState::Neutral);
        assert_relative_eq!(reading.tilt, 1.0);
    }

    #[test]
    fn test_assess_maps_hml_to_value_and_rmw_to_quality() {
        // HML hot (well above its flat history), RMW cold.
        let mut hml: Vec<f64> = vec![0.0; 48];
        hml.extend(vec![0.04; 12]);
        let mut rmw: Vec<f64> = vec![0.0; 48];
        rmw.extend(vec![-0.04; 12]);

        // Give the histories some spread so the z-score is finite.
        for (i, v) in hml.iter_mut().enumerate().take(48) {
            *v = if i % 2 == 0 { 0.01 } else { -0.01 };
        }
        for (i, v) in rmw.iter_mut().enumerate().take(48) {
            *v = if i % 2 == 0 { 0.01 } else { -0.01 };
        }

        let start = d(2018, 1, 31);
        let provider = MemoryProvider::new()
            .with_ff_history(FfFactor::Hml, monthly(start, &hml))
            .with_ff_history(FfFactor::Rmw, monthly(start, &rmw));

        let summary =
            FactorRegimeAdjuster::new(12, 1.0).assess(&provider, d(2023, 12, 31));
        assert!(summary.tilts.value > 1.0, "hot HML should up-tilt value");
        assert!(summary.tilts.quality < 1.0, "cold RMW should down-tilt quality");
        assert_relative_eq!(summary.tilts.momentum, 1.0);
    }

    #[test]
    fn test_missing_library_is_neutral() {
        let provider = MemoryProvider::new();
        let summary = FactorRegimeAdjuster::default().assess(&provider, d(2023, 12, 31));
        assert_eq!(summary, FactorRegimeSummary::neutral());
    }
}
