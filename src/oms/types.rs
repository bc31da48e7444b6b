//! Core OMS types
//!
//! Orders are immediate-fill market orders. Prices and volume live in the
//! shared [`Quote`] field; the matcher assigns ids on acceptance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::instrument::Entry;
use crate::{DatedMetric, Money, Quote, Side, Symbol, Tick};

/// Order ID type, unique within one matcher
pub type OrderId = u64;

/// Order state machine: `Open → Closed` or `Open → Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted and waiting for an exit
    Open,

    /// Fully liquidated
    Closed,

    /// Rejected at creation (insufficient cash, failed validation)
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub side: Side,
    pub quote: Quote,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        side: Side,
        symbol: Symbol,
        bid: Money,
        ask: Money,
        volume: Money,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            side,
            quote: Quote {
                symbol,
                volume,
                bid,
                ask,
                timestamp,
            },
            status: OrderStatus::Open,
        }
    }

    /// Buy `volume` at the tick's ask
    pub fn market_buy(tick: &Tick, volume: Money) -> Self {
        Self {
            id: 0,
            side: Side::Buy,
            quote: Quote::from_tick(tick, volume),
            status: OrderStatus::Open,
        }
    }

    /// Sell `volume` at the tick's bid
    pub fn market_sell(tick: &Tick, volume: Money) -> Self {
        Self {
            id: 0,
            side: Side::Sell,
            quote: Quote::from_tick(tick, volume),
            status: OrderStatus::Open,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Cash needed to fill a buy at the ask
    pub fn cost(&self) -> Money {
        self.quote.volume * self.quote.ask
    }

    /// Cash raised by filling a sell at the bid
    pub fn proceeds(&self) -> Money {
        self.quote.volume * self.quote.bid
    }

    /// Execution price and time of a sell
    pub fn sell_price(&self) -> DatedMetric {
        DatedMetric::new(self.quote.bid, self.quote.timestamp)
    }
}

impl Entry for Order {
    fn quote(&self) -> &Quote {
        &self.quote
    }

    fn quote_mut(&mut self) -> &mut Quote {
        &mut self.quote
    }
}
