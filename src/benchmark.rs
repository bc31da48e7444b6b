//! Buy-and-hold benchmark per ticker

use crate::error::{LedgerError, Result};
use crate::instrument::Lot;
use crate::ledger::{LedgerStore, Summary};
use crate::{Symbol, Tick};

/// Aggregate statistics for every ticker seen, used only for alpha.
///
/// Chains here never hold lots; they are created on first sight of a ticker
/// and only ever receive ticks.
#[derive(Debug, Default)]
pub struct BenchmarkIndex {
    store: LedgerStore<Lot>,
}

impl BenchmarkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roll `tick` into its ticker's statistics, starting them if new
    pub fn update(&self, tick: &Tick) -> Result<()> {
        match self.store.update(tick) {
            Err(LedgerError::NoListExists(_)) => self.store.seed(tick).map(|_| ()),
            other => other,
        }
    }

    pub fn summary(&self, symbol: &Symbol) -> Option<Summary> {
        self.store.get(symbol, |chain| chain.summary().clone()).ok()
    }

    /// Percent return from the first observed ask to the latest bid
    pub fn pct_return(&self, symbol: &Symbol) -> Option<f64> {
        self.store.get(symbol, |chain| chain.summary().pct_return()).ok()
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.store.symbols()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Money;
    use approx::assert_relative_eq;
    use chrono::Utc;

    fn tick(symbol: &str, bid: i64, ask: i64) -> Tick {
        Tick::new(
            Symbol::new(symbol),
            Money::from_i64(bid),
            Money::from_i64(ask),
            Money::ONE,
            Money::ONE,
            Utc::now(),
        )
    }

    #[test]
    fn test_first_sight_seeds_then_rolls() {
        let bench = BenchmarkIndex::new();
        bench.update(&tick("SPY", 99, 100)).unwrap();
        assert_eq!(bench.summary(&Symbol::new("SPY")).unwrap().tick_count, 1);

        bench.update(&tick("SPY", 110, 111)).unwrap();
        let summary = bench.summary(&Symbol::new("SPY")).unwrap();
        assert_eq!(summary.tick_count, 2);
        assert_relative_eq!(bench.pct_return(&Symbol::new("SPY")).unwrap(), 10.0);
    }

    #[test]
    fn test_unknown_ticker() {
        let bench = BenchmarkIndex::new();
        bench.update(&tick("SPY", 1, 2)).unwrap();
        assert!(bench.pct_return(&Symbol::new("QQQ")).is_none());
        assert_eq!(bench.len(), 1);
        assert_eq!(bench.symbols(), vec![Symbol::new("SPY")]);
    }
}
