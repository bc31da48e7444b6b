//! Cash plus open lots

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::instrument::{Entry, Lot};
use crate::ledger::{LedgerStore, NodeId, Slot};
use crate::{Money, Symbol, Tick};

/// Open lots per ticker and the cash balance backing them.
///
/// Cash sits behind its own lock so reporting readers never contend with
/// chain updates.
#[derive(Debug)]
pub struct Portfolio {
    lots: LedgerStore<Lot>,
    cash: RwLock<Money>,
}

impl Portfolio {
    pub fn new(start_cash: Money) -> Self {
        Self {
            lots: LedgerStore::new(),
            cash: RwLock::new(start_cash),
        }
    }

    pub fn cash(&self) -> Money {
        *self.cash.read()
    }

    /// Add `delta` to cash and return the new balance.
    ///
    /// Rejected with `NegativeCash`, leaving cash untouched, when the
    /// balance would go below zero.
    pub fn apply_cash_delta(&self, delta: Money) -> Result<Money> {
        let mut cash = self.cash.write();
        let next = *cash + delta;
        if next.is_negative() {
            return Err(LedgerError::NegativeCash {
                balance: *cash,
                delta,
            });
        }
        *cash = next;
        debug!(delta = %delta, cash = %next, "cash updated");
        Ok(next)
    }

    pub fn insert(&self, lot: Lot) -> Result<(Slot, NodeId)> {
        self.lots.insert(lot)
    }

    /// Roll a tick into the ticker's open lots, if any are held
    pub fn update(&self, tick: &Tick) -> Result<()> {
        self.lots.update(tick)
    }

    pub fn lots(&self) -> &LedgerStore<Lot> {
        &self.lots
    }

    /// Volume held for `symbol`
    pub fn position(&self, symbol: &Symbol) -> Money {
        self.lots.total_volume(symbol)
    }

    /// Open lots of `symbol` valued at their buy price
    pub fn cost_basis(&self, symbol: &Symbol) -> Money {
        self.lots
            .get(symbol, |chain| chain.iter().map(|(_, lot)| lot.cost()).sum())
            .unwrap_or(Money::ZERO)
    }

    /// Cash plus every open lot marked at its ticker's last bid
    pub fn market_value(&self) -> Money {
        let held: Money = self
            .lots
            .symbols()
            .iter()
            .filter_map(|symbol| {
                self.lots
                    .get(symbol, |chain| {
                        chain.total_volume() * chain.summary().last_bid.amount
                    })
                    .ok()
            })
            .sum();
        self.cash() + held
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.lots
            .get(symbol, |chain| chain.iter().any(|(_, lot)| lot.volume().is_positive()))
            .unwrap_or(false)
    }
}
