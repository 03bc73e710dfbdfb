//! Discrete share allocation.
//!
//! Pure bookkeeping on top of the continuous weights: a largest-remainder
//! conversion of `budget * w_i / price_i` into integer share counts. The
//! continuous weights are never altered; leftover cash is reported and is
//! always smaller than the cheapest share still wanted.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use cadiz_traits::{CadizError, Result, Ticker};

/// Integer share counts with the cash that could not be deployed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAllocation {
    /// Signed share counts (negative for short positions).
    pub shares: BTreeMap<Ticker, i64>,
    /// Cash left after allocation.
    pub leftover: f64,
    /// Capital deployed (`budget - leftover`).
    pub invested: f64,
}

/// Convert continuous weights into integer share counts.
///
/// Sizing uses the absolute weight (a short position consumes capital for
/// margin just like a long one); the sign is carried onto the share count.
/// Floor shares are bought first, then single shares go to the largest
/// fractional remainders that still fit in the remaining cash.
///
/// # Errors
///
/// - [`CadizError::ConfigurationInvalid`] for a non-positive budget.
/// - [`CadizError::DataUnavailable`] when a weighted ticker has no
///   positive price.
pub fn allocate(
    weights: &BTreeMap<Ticker, f64>,
    prices: &BTreeMap<Ticker, f64>,
    budget: f64,
) -> Result<DiscreteAllocation> {
    if !(budget.is_finite() && budget > 0.0) {
        return Err(CadizError::ConfigurationInvalid(format!(
            "allocation budget {budget} must be positive"
        )));
    }

    struct Line {
        ticker: Ticker,
        price: f64,
        sign: f64,
        shares: i64,
        remainder: f64,
    }

    let mut lines = Vec::new();
    let mut spent = 0.0;
    for (ticker, &weight) in weights {
        if weight == 0.0 {
            continue;
        }
        let price = prices.get(ticker).copied().ok_or_else(|| {
            CadizError::DataUnavailable(format!("no price for {ticker} at allocation"))
        })?;
        if !(price.is_finite() && price > 0.0) {
            return Err(CadizError::DataUnavailable(format!(
                "non-positive price {price} for {ticker}"
            )));
        }
        let ideal = budget * weight.abs() / price;
        let shares = ideal.floor() as i64;
        spent += shares as f64 * price;
        lines.push(Line {
            ticker: ticker.clone(),
            price,
            sign: weight.signum(),
            shares,
            remainder: ideal - shares as f64,
        });
    }

    let mut leftover = budget - spent;

    // Largest remainders first; after a ticker receives a share its
    // remainder drops by one, sending it behind everything still waiting.
    loop {
        let next = lines
            .iter_mut()
            .filter(|line| line.price <= leftover)
            .max_by(|a, b| {
                a.remainder
                    .partial_cmp(&b.remainder)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.ticker.cmp(&a.ticker))
            });
        let Some(line) = next else { break };
        line.shares += 1;
        line.remainder -= 1.0;
        leftover -= line.price;
    }

    let shares: BTreeMap<Ticker, i64> = lines
        .into_iter()
        .filter(|line| line.shares > 0)
        .map(|line| (line.ticker, line.sign as i64 * line.shares))
        .collect();

    Ok(DiscreteAllocation { shares, leftover, invested: budget - leftover })
}
