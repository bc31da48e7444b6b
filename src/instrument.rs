//! Lots and closed-lot records
//!
//! Lots and orders both live in [`LotChain`](crate::ledger::LotChain)s. They
//! share one explicit [`Quote`] field, exposed through the [`Entry`] trait, so
//! the chain can read ticker and volume without knowing which kind it holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Summary;
use crate::oms::Order;
use crate::{DatedMetric, Money, Quote, Symbol, Tick};

/// Anything a [`LotChain`](crate::ledger::LotChain) can hold
pub trait Entry: Clone {
    fn quote(&self) -> &Quote;

    fn quote_mut(&mut self) -> &mut Quote;

    /// Called for every tick routed to the entry's chain
    fn on_tick(&mut self, _tick: &Tick) {}

    /// Statistics a new chain is seeded with when this is its first entry
    fn seed_summary(&self) -> Summary {
        let q = self.quote();
        Summary::seed(q.bid, q.ask, q.timestamp)
    }

    fn symbol(&self) -> &Symbol {
        &self.quote().symbol
    }

    fn volume(&self) -> Money {
        self.quote().volume
    }
}

/// An open position created by one accepted buy order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub quote: Quote,
    /// Price paid (the ask) and when
    pub buy: DatedMetric,
    /// Statistics since the lot was opened
    pub stats: Summary,
}

impl Lot {
    pub fn new(
        symbol: Symbol,
        volume: Money,
        bid: Money,
        ask: Money,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            quote: Quote {
                symbol,
                volume,
                bid,
                ask,
                timestamp,
            },
            buy: DatedMetric::new(ask, timestamp),
            stats: Summary::seed(bid, ask, timestamp),
        }
    }

    /// Lot opened by filling `order` at its ask
    pub fn from_order(order: &Order) -> Self {
        let q = &order.quote;
        Self::new(q.symbol.clone(), q.volume, q.bid, q.ask, q.timestamp)
    }

    pub fn cost(&self) -> Money {
        self.quote.volume * self.buy.amount
    }
}

impl Entry for Lot {
    fn quote(&self) -> &Quote {
        &self.quote
    }

    fn quote_mut(&mut self) -> &mut Quote {
        &mut self.quote
    }

    fn on_tick(&mut self, tick: &Tick) {
        self.stats.update(tick);
    }

    fn seed_summary(&self) -> Summary {
        self.stats.clone()
    }
}

/// Realized result of selling part or all of one lot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedLot {
    pub symbol: Symbol,
    /// Volume sold out of the lot in this step
    pub volume: Money,
    pub buy: DatedMetric,
    pub sell: DatedMetric,
    /// The lot's statistics at the moment of sale
    pub stats: Summary,
}

impl ClosedLot {
    pub fn from_lot(lot: &Lot, volume: Money, sell: DatedMetric) -> Self {
        Self {
            symbol: lot.quote.symbol.clone(),
            volume,
            buy: lot.buy,
            sell,
            stats: lot.stats.clone(),
        }
    }

    pub fn buy_value(&self) -> Money {
        self.volume * self.buy.amount
    }

    pub fn end_value(&self) -> Money {
        self.volume * self.sell.amount
    }

    pub fn realized_gain(&self) -> Money {
        self.end_value() - self.buy_value()
    }

    pub fn pct_return(&self) -> f64 {
        if self.buy.amount.is_zero() {
            return 0.0;
        }
        ((self.sell.amount - self.buy.amount) / self.buy.amount).to_f64() * 100.0
    }
}
