//! Market regime detection from index trend and volatility term structure.

use serde::{Deserialize, Serialize};
use tracing::debug;

use cadiz_traits::config::{RegimeExposures, RegimeMethod};
use cadiz_traits::provider::VixTermStructure;
use cadiz_traits::{Date, MarketDataProvider};

/// Default index used for the moving-average signal.
pub const DEFAULT_INDEX_SYMBOL: &str = "SPY";

/// Moving-average window in trading sessions.
pub const SMA_WINDOW_SESSIONS: usize = 200;

/// Calendar days of index history requested to cover the SMA window.
pub const INDEX_LOOKBACK_DAYS: u32 = 300;

/// Market regime states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    /// Calm conditions, full exposure.
    RiskOn,
    /// Mixed signals, reduced exposure.
    Caution,
    /// Stress conditions, defensive exposure.
    RiskOff,
    /// Signals unavailable.
    Unknown,
}

impl MarketRegime {
    /// Whether the regime indicates calm conditions.
    #[must_use]
    pub fn is_bullish(&self) -> bool {
        matches!(self, Self::RiskOn)
    }

    /// Whether the regime indicates stressed or mixed conditions.
    #[must_use]
    pub fn is_bearish(&self) -> bool {
        matches!(self, Self::RiskOff | Self::Caution)
    }

    /// Short display label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RiskOn => "RISK_ON",
            Self::Caution => "CAUTION",
            Self::RiskOff => "RISK_OFF",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equity exposure for a regime under the configured exposure map.
/// Unknown defaults to full exposure.
#[must_use]
pub fn exposure_for(regime: MarketRegime, exposures: &RegimeExposures) -> f64 {
    match regime {
        MarketRegime::RiskOff => exposures.risk_off,
        MarketRegime::Caution => exposures.caution,
        MarketRegime::RiskOn | MarketRegime::Unknown => exposures.risk_on,
    }
}

/// A regime classification with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    /// Combined (or single-method) regime.
    pub regime: MarketRegime,
    /// Method that produced this reading.
    pub method: RegimeMethod,
    /// Index close at the as-of date, when the SMA leg ran.
    pub close: Option<f64>,
    /// 200-session moving average, when the SMA leg ran.
    pub sma: Option<f64>,
    /// `(close - sma) / sma` as a percentage.
    pub signal_strength: Option<f64>,
    /// SMA-only regime, when computable.
    pub sma_regime: Option<MarketRegime>,
    /// VIX term structure at the as-of date, when available.
    pub vix: Option<VixTermStructure>,
    /// VIX-only regime, when computable.
    pub vix_regime: Option<MarketRegime>,
}

/// Point-in-time market regime detector.
///
/// Every classification is parameterized by an as-of date; the detector
/// only ever sees index history and volatility readings observable on that
/// date.
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    symbol: String,
    sma_window: usize,
    lookback_days: u32,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegimeDetector {
    /// Detector over the default index symbol.
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbol: DEFAULT_INDEX_SYMBOL.to_string(),
            sma_window: SMA_WINDOW_SESSIONS,
            lookback_days: INDEX_LOOKBACK_DAYS,
        }
    }

    /// Detector over a custom index symbol.
    #[must_use]
    pub fn with_symbol(symbol: impl Into<String>) -> Self {
        Self { symbol: symbol.into(), ..Self::new() }
    }

    /// Index symbol this detector watches.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Classify the market regime at `as_of`.
    #[must_use]
    pub fn regime(
        &self,
        provider: &dyn MarketDataProvider,
        as_of: Date,
        method: RegimeMethod,
    ) -> MarketRegime {
        self.reading(provider, as_of, method).regime
    }

    /// Classify with full supporting evidence.
    #[must_use]
    pub fn reading(
        &self,
        provider: &dyn MarketDataProvider,
        as_of: Date,
        method: RegimeMethod,
    ) -> RegimeReading {
        let mut reading = RegimeReading {
            regime: MarketRegime::Unknown,
            method,
            close: None,
            sma: None,
            signal_strength: None,
            sma_regime: None,
            vix: None,
            vix_regime: None,
        };

        if matches!(method, RegimeMethod::Sma | RegimeMethod::Combined) {
            self.apply_sma_leg(provider, as_of, &mut reading);
        }
        if matches!(method, RegimeMethod::Vix | RegimeMethod::Combined) {
            self.apply_vix_leg(provider, as_of, &mut reading);
        }

        reading.regime = match method {
            RegimeMethod::Sma => reading.sma_regime.unwrap_or(MarketRegime::Unknown),
            RegimeMethod::Vix => reading.vix_regime.unwrap_or(MarketRegime::Unknown),
            RegimeMethod::Combined => combine(
                reading.sma_regime.unwrap_or(MarketRegime::Unknown),
                reading.vix_regime.unwrap_or(MarketRegime::Unknown),
            ),
        };
        debug!(as_of = %as_of, regime = %reading.regime, "classified market regime");
        reading
    }

    fn apply_sma_leg(
        &self,
        provider: &dyn MarketDataProvider,
        as_of: Date,
        reading: &mut RegimeReading,
    ) {
        let Ok(history) = provider.index_history(&self.symbol, as_of, self.lookback_days) else {
            return;
        };
        let closes = history.closes();
        if closes.len() < self.sma_window {
            return;
        }
        let window = &closes[closes.len() - self.sma_window..];
        let sma = window.iter().sum::<f64>() / window.len() as f64;
        let close = *closes.last().expect("non-empty window");

        reading.close = Some(close);
        reading.sma = Some(sma);
        reading.signal_strength = Some((close - sma) / sma * 100.0);
        reading.sma_regime = Some(if close > sma {
            MarketRegime::RiskOn
        } else {
            MarketRegime::RiskOff
        });
    }

    fn apply_vix_leg(
        &self,
        provider: &dyn MarketDataProvider,
        as_of: Date,
        reading: &mut RegimeReading,
    ) {
        let Ok(Some(vix)) = provider.vix_structure(as_of) else {
            return;
        };
        reading.vix = Some(vix);
        reading.vix_regime = Some(if vix.vix9d > vix.vix30d {
            MarketRegime::RiskOff
        } else if vix.vix30d > vix.vix3m {
            MarketRegime::Caution
        } else {
            MarketRegime::RiskOn
        });
    }
}

/// Blend the two signals: a VIX stress reading vetoes, agreement on
/// risk-on is required for full exposure, and a missing leg defers to the
/// other.
fn combine(sma: MarketRegime, vix: MarketRegime) -> MarketRegime {
    match (sma, vix) {
        (MarketRegime::Unknown, MarketRegime::Unknown) => MarketRegime::Unknown,
        (MarketRegime::Unknown, only) | (only, MarketRegime::Unknown) => only,
        (_, MarketRegime::RiskOff) => MarketRegime::RiskOff,
        (MarketRegime::RiskOn, MarketRegime::RiskOn) => MarketRegime::RiskOn,
        _ => MarketRegime::Caution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadiz_traits::mem::MemoryProvider;
    use cadiz_traits::types::{PricePoint, PriceSeries};
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> Date {
        Date::from_ymd_opt(y, m, day).unwrap()
    }

    /// `sessions` consecutive daily closes ending at `end`.
    fn index_series(end: Date, sessions: usize, closes: impl Fn(usize) -> f64) -> PriceSeries {
        let points = (0..sessions)
            .map(|i| PricePoint {
                date: end - Duration::days((sessions - 1 - i) as i64),
                close: closes(i),
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    fn vix(s: f64, m: f64, l: f64) -> VixTermStructure {
        VixTermStructure { vix9d: s, vix30d: m, vix3m: l }
    }

    #[test]
    fn test_sma_risk_on_when_above_average() {
        let as_of = d(2023, 6, 30);
        // Rising path: last close is above the trailing average.
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 100.0 + i as f64 * 0.1));
        let detector = RegimeDetector::new();
        let reading = detector.reading(&provider, as_of, RegimeMethod::Sma);
        assert_eq!(reading.regime, MarketRegime::RiskOn);
        assert!(reading.signal_strength.unwrap() > 0.0);
    }

    #[test]
    fn test_sma_risk_off_when_below_average() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 200.0 - i as f64 * 0.2));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Sma);
        assert_eq!(regime, MarketRegime::RiskOff);
    }

    #[test]
    fn test_sma_unknown_when_history_short() {
        let as_of = d(2023, 6, 30);
        let provider =
            MemoryProvider::new().with_index("SPY", index_series(as_of, 150, |_| 100.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Sma);
        assert_eq!(regime, MarketRegime::Unknown);
    }

    #[test]
    fn test_vix_backwardation_is_risk_off() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new().with_vix(as_of, vix(28.0, 24.0, 22.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Vix);
        assert_eq!(regime, MarketRegime::RiskOff);
    }

    #[test]
    fn test_vix_mid_inversion_is_caution() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new().with_vix(as_of, vix(20.0, 22.0, 21.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Vix);
        assert_eq!(regime, MarketRegime::Caution);
    }

    #[test]
    fn test_vix_contango_is_risk_on() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new().with_vix(as_of, vix(14.0, 16.0, 18.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Vix);
        assert_eq!(regime, MarketRegime::RiskOn);
    }

    #[test]
    fn test_vix_missing_is_unknown() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new();
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Vix);
        assert_eq!(regime, MarketRegime::Unknown);
    }

    #[test]
    fn test_combined_vix_veto() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 100.0 + i as f64 * 0.1))
            .with_vix(as_of, vix(28.0, 24.0, 22.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Combined);
        assert_eq!(regime, MarketRegime::RiskOff);
    }

    #[test]
    fn test_combined_agreement_is_risk_on() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 100.0 + i as f64 * 0.1))
            .with_vix(as_of, vix(14.0, 16.0, 18.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Combined);
        assert_eq!(regime, MarketRegime::RiskOn);
    }

    #[test]
    fn test_combined_disagreement_is_caution() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 200.0 - i as f64 * 0.2))
            .with_vix(as_of, vix(14.0, 16.0, 18.0));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Combined);
        assert_eq!(regime, MarketRegime::Caution);
    }

    #[test]
    fn test_combined_falls_back_to_available_leg() {
        let as_of = d(2023, 6, 30);
        let provider = MemoryProvider::new()
            .with_index("SPY", index_series(as_of, 260, |i| 100.0 + i as f64 * 0.1));
        let regime = RegimeDetector::new().regime(&provider, as_of, RegimeMethod::Combined);
        assert_eq!(regime, MarketRegime::RiskOn);

        let none = MemoryProvider::new();
        let regime = RegimeDetector::new().regime(&none, as_of, RegimeMethod::Combined);
        assert_eq!(regime, MarketRegime::Unknown);
    }

    #[test]
    fn test_exposure_map() {
        let exposures = RegimeExposures::default();
        assert_eq!(exposure_for(MarketRegime::RiskOff, &exposures), 0.50);
        assert_eq!(exposure_for(MarketRegime::Caution, &exposures), 0.75);
        assert_eq!(exposure_for(MarketRegime::RiskOn, &exposures), 1.00);
        assert_eq!(exposure_for(MarketRegime::Unknown, &exposures), 1.00);
    }
}
