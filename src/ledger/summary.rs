//! Rolling bid/ask statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DatedMetric, Money, Tick};

/// Running average, extremes and tick count for a stream of quotes.
///
/// Extremes are replaced on ties so they always carry the latest timestamp
/// at which the value was seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub tick_count: u64,
    pub avg_bid: Money,
    pub avg_ask: Money,
    pub open_bid: DatedMetric,
    pub open_ask: DatedMetric,
    pub last_bid: DatedMetric,
    pub last_ask: DatedMetric,
    pub max_bid: DatedMetric,
    pub max_ask: DatedMetric,
    pub min_bid: DatedMetric,
    pub min_ask: DatedMetric,
}

impl Summary {
    /// Statistics after a single observation
    pub fn seed(bid: Money, ask: Money, timestamp: DateTime<Utc>) -> Self {
        let bid = DatedMetric::new(bid, timestamp);
        let ask = DatedMetric::new(ask, timestamp);
        Self {
            tick_count: 1,
            avg_bid: bid.amount,
            avg_ask: ask.amount,
            open_bid: bid,
            open_ask: ask,
            last_bid: bid,
            last_ask: ask,
            max_bid: bid,
            max_ask: ask,
            min_bid: bid,
            min_ask: ask,
        }
    }

    pub fn from_tick(tick: &Tick) -> Self {
        Self::seed(tick.bid, tick.ask, tick.timestamp)
    }

    /// Roll one tick into the statistics
    pub fn update(&mut self, tick: &Tick) {
        let n = Money::from_u64(self.tick_count);
        self.avg_bid = rolling_avg(self.avg_bid, n, tick.bid);
        self.avg_ask = rolling_avg(self.avg_ask, n, tick.ask);

        let bid = tick.bid_metric();
        let ask = tick.ask_metric();
        if bid.amount >= self.max_bid.amount {
            self.max_bid = bid;
        }
        if bid.amount <= self.min_bid.amount {
            self.min_bid = bid;
        }
        if ask.amount >= self.max_ask.amount {
            self.max_ask = ask;
        }
        if ask.amount <= self.min_ask.amount {
            self.min_ask = ask;
        }
        self.last_bid = bid;
        self.last_ask = ask;
        self.tick_count += 1;
    }

    /// Buy-and-hold return from the first ask to the last bid, in percent
    pub fn pct_return(&self) -> f64 {
        if self.open_ask.amount.is_zero() {
            return 0.0;
        }
        ((self.last_bid.amount - self.open_ask.amount) / self.open_ask.amount).to_f64() * 100.0
    }
}

fn rolling_avg(avg: Money, n: Money, x: Money) -> Money {
    (avg * n + x) / (n + Money::ONE)
}
