//! Universe resolution contract.

use crate::error::Result;
use crate::types::{Date, UniverseMember};

/// Yields the set of tickers eligible at a given as-of date.
///
/// Implementations may wrap a static list, a historical constituents file,
/// or a scrape — the engine does not care, as long as membership is
/// point-in-time correct: a ticker absent at `as_of` must not be returned,
/// and market caps must be as observable on that date.
pub trait UniverseResolver: Send + Sync {
    /// Resolve the eligible universe at `as_of`.
    ///
    /// # Errors
    ///
    /// [`ProviderUnavailable`](crate::CadizError::ProviderUnavailable) when
    /// the membership source cannot be reached at all; this aborts a
    /// backtest run.
    fn resolve(&self, as_of: Date) -> Result<Vec<UniverseMember>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolver_is_object_safe() {
        fn _accept(_r: &dyn UniverseResolver) {}
    }
}
