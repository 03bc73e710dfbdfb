//! Factor score containers.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use cadiz_traits::{config::FactorWeights, Date, Ticker};

/// Multiplicative tilts on the three z-score columns, typically produced by
/// a factor-regime adjuster. A tilt of 1.0 is neutral.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorTilts {
    /// Tilt on the value column.
    pub value: f64,
    /// Tilt on the quality column.
    pub quality: f64,
    /// Tilt on the momentum column.
    pub momentum: f64,
}

impl Default for FactorTilts {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl FactorTilts {
    /// No tilt on any factor.
    pub const NEUTRAL: Self = Self { value: 1.0, quality: 1.0, momentum: 1.0 };
}

/// Z-scores of one ticker across the three factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickerScores {
    /// Value z-score.
    pub z_value: f64,
    /// Quality z-score.
    pub z_quality: f64,
    /// Momentum z-score.
    pub z_momentum: f64,
    /// Weighted composite.
    pub total: f64,
}

/// Cross-sectional factor scores for one rebalance date.
///
/// Column vectors are aligned with the ticker list; all lookups are by
/// ticker and explicit. The container is immutable once built — tilting
/// produces a fresh value.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorScores {
    as_of: Date,
    tickers: Vec<Ticker>,
    z_value: Array1<f64>,
    z_quality: Array1<f64>,
    z_momentum: Array1<f64>,
    total: Array1<f64>,
    weights: FactorWeights,
}

impl FactorScores {
    /// Assemble scores from aligned z-columns, computing the composite with
    /// the given weights.
    ///
    /// # Panics
    ///
    /// Debug-asserts that all columns match the ticker list length.
    #[must_use]
    pub fn new(
        as_of: Date,
        tickers: Vec<Ticker>,
        z_value: Array1<f64>,
        z_quality: Array1<f64>,
        z_momentum: Array1<f64>,
        weights: FactorWeights,
    ) -> Self {
        debug_assert_eq!(tickers.len(), z_value.len());
        debug_assert_eq!(tickers.len(), z_quality.len());
        debug_assert_eq!(tickers.len(), z_momentum.len());

        let total =
            &z_value * weights.value + &z_quality * weights.quality + &z_momentum * weights.momentum;
        Self { as_of, tickers, z_value, z_quality, z_momentum, total, weights }
    }

    /// The rebalance date these scores were computed for.
    #[must_use]
    pub fn as_of(&self) -> Date {
        self.as_of
    }

    /// Number of scored tickers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    /// Whether the cross-section is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Scored tickers, in container order.
    #[must_use]
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    /// Composite weights used for the `total` column.
    #[must_use]
    pub fn weights(&self) -> FactorWeights {
        self.weights
    }

    /// Position of a ticker in the container, if present.
    #[must_use]
    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Scores for one ticker.
    #[must_use]
    pub fn get(&self, ticker: &str) -> Option<TickerScores> {
        self.index_of(ticker).map(|i| TickerScores {
            z_value: self.z_value[i],
            z_quality: self.z_quality[i],
            z_momentum: self.z_momentum[i],
            total: self.total[i],
        })
    }

    /// Composite score column, aligned with [`FactorScores::tickers`].
    #[must_use]
    pub fn totals(&self) -> &Array1<f64> {
        &self.total
    }

    /// Value z-score column.
    #[must_use]
    pub fn z_value(&self) -> &Array1<f64> {
        &self.z_value
    }

    /// Quality z-score column.
    #[must_use]
    pub fn z_quality(&self) -> &Array1<f64> {
        &self.z_quality
    }

    /// Momentum z-score column.
    #[must_use]
    pub fn z_momentum(&self) -> &Array1<f64> {
        &self.z_momentum
    }

    /// Multiply each z-column by its tilt and recompute the composite.
    ///
    /// Tilting rescales a column, which is equivalent to tilting that
    /// factor's composite weight; the z-clip invariant applies to the
    /// untilted columns.
    #[must_use]
    pub fn with_tilts(&self, tilts: FactorTilts) -> Self {
        Self::new(
            self.as_of,
            self.tickers.clone(),
            &self.z_value * tilts.value,
            &self.z_quality * tilts.quality,
            &self.z_momentum * tilts.momentum,
            self.weights,
        )
    }

    /// The `n` tickers with the highest composite score, descending.
    ///
    /// Ties break alphabetically so the selection is deterministic.
    #[must_use]
    pub fn top_n(&self, n: usize) -> Vec<Ticker> {
        let mut order: Vec<usize> = (0..self.tickers.len()).collect();
        order.sort_by(|&a, &b| {
            self.total[b]
                .partial_cmp(&self.total[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.tickers[a].cmp(&self.tickers[b]))
        });
        order.into_iter().take(n).map(|i| self.tickers[i].clone()).collect()
    }

    /// Restrict the container to the given tickers, preserving their order.
    /// Unknown tickers are skipped.
    #[must_use]
    pub fn restrict(&self, tickers: &[Ticker]) -> Self {
        let keep: Vec<usize> = tickers.iter().filter_map(|t| self.index_of(t)).collect();
        let pick = |col: &Array1<f64>| Array1::from_iter(keep.iter().map(|&i| col[i]));
        Self {
            as_of: self.as_of,
            tickers: keep.iter().map(|&i| self.tickers[i].clone()).collect(),
            z_value: pick(&self.z_value),
            z_quality: pick(&self.z_quality),
            z_momentum: pick(&self.z_momentum),
            total: pick(&self.total),
            weights: self.weights,
        }
    }
}
