//! Raw factor computation for a single ticker.

use serde::{Deserialize, Serialize};

use cadiz_traits::{FundamentalSnapshot, PriceSeries};

/// Trading sessions in the momentum lookback (12 months).
pub const MOMENTUM_LOOKBACK_SESSIONS: usize = 252;

/// Raw (pre-standardization) factor values for one ticker.
///
/// Any component may be missing; the engine's imputation policy decides
/// what happens next. Yields are relative to market value (shares times
/// the last observable price), ROIC divides by invested capital
/// (total assets minus current liabilities), and momentum is the trailing
/// 252-session price return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFactors {
    /// Free cash flow / market value.
    pub fcf_yield: Option<f64>,
    /// EBIT / market value.
    pub earnings_yield: Option<f64>,
    /// EBIT / (total assets - current liabilities).
    pub roic: Option<f64>,
    /// Gross profit / revenue.
    pub gross_margin: Option<f64>,
    /// 12-month price return.
    pub momentum_12m: Option<f64>,
}

impl RawFactors {
    /// Compute raw factors from a fundamental snapshot and a price series.
    ///
    /// Denominator rules:
    /// - yields require `shares_outstanding > 0` and a positive last close;
    /// - ROIC requires invested capital strictly positive;
    /// - gross margin requires revenue strictly positive;
    /// - momentum requires more than [`MOMENTUM_LOOKBACK_SESSIONS`] rows.
    ///
    /// A component whose inputs fail these rules is simply `None`.
    #[must_use]
    pub fn compute(snapshot: &FundamentalSnapshot, prices: &PriceSeries) -> Self {
        let price = prices.last_close().filter(|p| *p > 0.0);
        let market_value = match (snapshot.shares_outstanding, price) {
            (Some(shares), Some(price)) if shares > 0.0 => Some(shares * price),
            _ => None,
        };

        let fcf_yield = match (snapshot.free_cash_flow, market_value) {
            (Some(fcf), Some(mv)) => Some(fcf / mv),
            _ => None,
        };
        let earnings_yield = match (snapshot.ebit, market_value) {
            (Some(ebit), Some(mv)) => Some(ebit / mv),
            _ => None,
        };

        let roic = match (snapshot.ebit, snapshot.total_assets, snapshot.current_liabilities) {
            (Some(ebit), Some(assets), Some(liabilities)) => {
                let invested = assets - liabilities;
                (invested > 0.0).then(|| ebit / invested)
            }
            _ => None,
        };

        let gross_margin = match (snapshot.gross_profit, snapshot.revenue) {
            (Some(gp), Some(revenue)) if revenue > 0.0 => Some(gp / revenue),
            _ => None,
        };

        let momentum_12m = prices.trailing_return(MOMENTUM_LOOKBACK_SESSIONS);

        Self { fcf_yield, earnings_yield, roic, gross_margin, momentum_12m }
    }

    /// A value with every component missing.
    #[must_use]
    pub const fn missing() -> Self {
        Self {
            fcf_yield: None,
            earnings_yield: None,
            roic: None,
            gross_margin: None,
            momentum_12m: None,
        }
    }
}
