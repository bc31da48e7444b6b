//! Tick-driven order matching
//!
//! One [`OrderMatcher::query`] per tick: benchmark and lot statistics are
//! rolled forward, the strategy may open a position, then every open order
//! on the ticker is offered an exit.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::benchmark::BenchmarkIndex;
use crate::error::{LedgerError, Result};
use crate::instrument::{ClosedLot, Entry, Lot};
use crate::ledger::{LedgerStore, NodeId};
use crate::oms::liquidate::liquidate;
use crate::oms::strategy::Strategy;
use crate::oms::types::{Order, OrderId, OrderStatus};
use crate::portfolio::Portfolio;
use crate::{CostMethod, Money, Symbol, Tick};

/// Everything one tick (or the shutdown drain) did
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// Entry orders accepted and filled
    pub opened: Vec<Order>,
    /// Entry orders rejected before any cash or lot change
    pub cancelled: Vec<Order>,
    /// Open orders fully exited
    pub closed_orders: Vec<Order>,
    /// One record per lot touched by a liquidation
    pub closed: Vec<ClosedLot>,
    /// Recoverable errors; the actions that raised them were skipped
    pub errors: Vec<LedgerError>,
}

impl QueryOutcome {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty()
            && self.cancelled.is_empty()
            && self.closed_orders.is_empty()
            && self.closed.is_empty()
            && self.errors.is_empty()
    }

    fn merge(&mut self, other: QueryOutcome) {
        self.opened.extend(other.opened);
        self.cancelled.extend(other.cancelled);
        self.closed_orders.extend(other.closed_orders);
        self.closed.extend(other.closed);
        self.errors.extend(other.errors);
    }
}

/// Owns the open-order ledger and drives the portfolio from strategy
/// decisions.
pub struct OrderMatcher {
    orders: LedgerStore<Order>,
    portfolio: Arc<Portfolio>,
    benchmark: Option<Arc<BenchmarkIndex>>,
    strategy: Box<dyn Strategy>,
    cost_method: CostMethod,
    next_id: OrderId,
    last_ticks: HashMap<Symbol, Tick>,
}

impl OrderMatcher {
    pub fn new(
        portfolio: Arc<Portfolio>,
        benchmark: Option<Arc<BenchmarkIndex>>,
        strategy: Box<dyn Strategy>,
        cost_method: CostMethod,
    ) -> Self {
        Self {
            orders: LedgerStore::new(),
            portfolio,
            benchmark,
            strategy,
            cost_method,
            next_id: 1,
            last_ticks: HashMap::new(),
        }
    }

    /// Process one tick
    pub fn query(&mut self, tick: &Tick) -> QueryOutcome {
        let mut outcome = QueryOutcome::default();

        if let Some(benchmark) = &self.benchmark {
            if let Err(e) = benchmark.update(tick) {
                outcome.errors.push(e);
            }
        }
        // No chain just means nothing is held in this ticker yet
        match self.portfolio.update(tick) {
            Ok(()) | Err(LedgerError::NoListExists(_)) => {}
            Err(e) => outcome.errors.push(e),
        }
        self.last_ticks.insert(tick.symbol.clone(), tick.clone());

        if let Some(order) = self.strategy.entry_check(tick) {
            if self.strategy.valid_order(&self.portfolio, &order) {
                self.open(order, tick, &mut outcome);
            }
        }

        for (node, open) in self.open_orders_with_ids(&tick.symbol) {
            let Some(exit) = self.strategy.exit_check(&open, tick) else {
                continue;
            };
            if !self.strategy.valid_order(&self.portfolio, &exit) {
                continue;
            }
            if let Err(e) = self.close(node, &open, &exit, &mut outcome) {
                debug!(order_id = open.id, error = %e, "exit skipped");
                outcome.errors.push(e);
            }
        }

        outcome
    }

    /// Exit every open order at its ticker's last quote
    pub fn close_all(&mut self) -> QueryOutcome {
        let mut outcome = QueryOutcome::default();

        for symbol in self.orders.symbols() {
            let Some(last) = self.last_ticks.get(&symbol).cloned() else {
                outcome.errors.push(LedgerError::NoListExists(symbol));
                continue;
            };
            let mut drained = QueryOutcome::default();
            for (node, open) in self.open_orders_with_ids(&symbol) {
                let exit = Order::market_sell(&last, open.volume());
                if let Err(e) = self.close(node, &open, &exit, &mut drained) {
                    drained.errors.push(e);
                }
            }
            info!(
                symbol = %symbol,
                closed = drained.closed_orders.len(),
                price = %last.bid,
                "drained open orders"
            );
            outcome.merge(drained);
        }

        outcome
    }

    fn open(&mut self, mut order: Order, tick: &Tick, outcome: &mut QueryOutcome) {
        if let Err(e) = check_entry(&order, tick) {
            order.status = OrderStatus::Cancelled;
            outcome.cancelled.push(order);
            outcome.errors.push(e);
            return;
        }

        let cost = order.cost();
        if let Err(e) = self.portfolio.apply_cash_delta(-cost) {
            debug!(symbol = %order.symbol(), cost = %cost, "entry cancelled: insufficient cash");
            order.status = OrderStatus::Cancelled;
            outcome.cancelled.push(order);
            outcome.errors.push(e);
            return;
        }

        if let Err(e) = self.portfolio.insert(Lot::from_order(&order)) {
            // Undo the debit so a failed insert leaves no trace
            if let Err(refund) = self.portfolio.apply_cash_delta(cost) {
                warn!(symbol = %order.symbol(), cost = %cost, "entry refund failed: {}", refund);
                outcome.errors.push(refund);
            }
            order.status = OrderStatus::Cancelled;
            outcome.cancelled.push(order);
            outcome.errors.push(e);
            return;
        }

        order.id = self.next_id;
        order.status = OrderStatus::Open;
        self.next_id += 1;

        match self.orders.insert(order.clone()) {
            Ok(_) => {
                info!(
                    order_id = order.id,
                    symbol = %order.symbol(),
                    volume = %order.volume(),
                    price = %order.quote.ask,
                    "opened"
                );
                outcome.opened.push(order);
            }
            Err(e) => outcome.errors.push(e),
        }
    }

    fn close(
        &mut self,
        node: NodeId,
        open: &Order,
        exit: &Order,
        outcome: &mut QueryOutcome,
    ) -> Result<()> {
        check_exit(open, exit)?;
        let symbol = open.symbol();

        // The order node must still hold this order before any lot moves
        let held = self.orders.get(symbol, |chain| chain.get(node).map(Entry::volume))?;
        if held != Some(open.volume()) {
            return Err(LedgerError::NodeNotFound(symbol.clone()));
        }

        let closed = liquidate(
            self.portfolio.lots(),
            symbol,
            exit.volume(),
            self.cost_method,
            exit.sell_price(),
        )?;
        let proceeds: Money = closed.iter().map(ClosedLot::end_value).sum();

        let mut done = if exit.volume() == open.volume() {
            self.orders.remove_node(symbol, node)?
        } else {
            self.orders
                .get_mut(symbol, |chain| chain.reduce(node, exit.volume()))??;
            open.clone()
        };
        self.portfolio.apply_cash_delta(proceeds)?;

        info!(
            order_id = open.id,
            symbol = %symbol,
            volume = %exit.volume(),
            proceeds = %proceeds,
            lots = closed.len(),
            "exited"
        );
        outcome.closed.extend(closed);
        if exit.volume() == open.volume() {
            done.status = OrderStatus::Closed;
            outcome.closed_orders.push(done);
        }
        Ok(())
    }

    fn open_orders_with_ids(&self, symbol: &Symbol) -> Vec<(NodeId, Order)> {
        self.orders
            .get(symbol, |chain| {
                chain.iter().map(|(id, order)| (id, order.clone())).collect()
            })
            .unwrap_or_default()
    }

    /// Open orders for `symbol`, oldest first
    pub fn open_orders(&self, symbol: &Symbol) -> Vec<Order> {
        self.open_orders_with_ids(symbol)
            .into_iter()
            .map(|(_, order)| order)
            .collect()
    }

    /// Number of open orders across all tickers
    pub fn open_order_count(&self) -> usize {
        self.orders
            .symbols()
            .iter()
            .filter_map(|symbol| self.orders.get(symbol, |chain| chain.len()).ok())
            .sum()
    }

    pub fn portfolio(&self) -> &Arc<Portfolio> {
        &self.portfolio
    }

    pub fn benchmark(&self) -> Option<&Arc<BenchmarkIndex>> {
        self.benchmark.as_ref()
    }

    pub fn cost_method(&self) -> CostMethod {
        self.cost_method
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn last_tick(&self, symbol: &Symbol) -> Option<&Tick> {
        self.last_ticks.get(symbol)
    }
}

fn check_entry(order: &Order, tick: &Tick) -> Result<()> {
    let reason = if !order.is_buy() {
        "entry order must be a buy"
    } else if order.symbol() != &tick.symbol {
        "entry order ticker does not match tick"
    } else if !order.volume().is_positive() {
        "order volume must be positive"
    } else {
        return Ok(());
    };
    Err(LedgerError::InvalidOrder {
        symbol: order.symbol().clone(),
        reason,
    })
}

fn check_exit(open: &Order, exit: &Order) -> Result<()> {
    let reason = if exit.is_buy() {
        "exit order must be a sell"
    } else if exit.symbol() != open.symbol() {
        "exit order ticker does not match open order"
    } else if !exit.volume().is_positive() {
        "order volume must be positive"
    } else if exit.volume() > open.volume() {
        "exit volume exceeds open order"
    } else {
        return Ok(());
    };
    Err(LedgerError::InvalidOrder {
        symbol: exit.symbol().clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use parking_lot::Mutex;

    /// Buys on the ticks listed in `buys`, sells everything open on `sells`
    struct Script {
        volume: Money,
        buys: Vec<u64>,
        sells: Vec<u64>,
        seen: Mutex<u64>,
    }

    impl Script {
        fn new(volume: i64, buys: &[u64], sells: &[u64]) -> Self {
            Self {
                volume: Money::from_i64(volume),
                buys: buys.to_vec(),
                sells: sells.to_vec(),
                seen: Mutex::new(0),
            }
        }
    }

    impl Strategy for Script {
        fn name(&self) -> &str {
            "script"
        }

        fn entry_check(&self, tick: &Tick) -> Option<Order> {
            let mut seen = self.seen.lock();
            *seen += 1;
            self.buys
                .contains(&*seen)
                .then(|| Order::market_buy(tick, self.volume))
        }

        fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order> {
            let seen = *self.seen.lock();
            self.sells
                .contains(&seen)
                .then(|| Order::market_sell(tick, open.volume()))
        }
    }

    fn tick(n: i64, bid: i64, ask: i64) -> Tick {
        Tick::new(
            Symbol::new("AAPL"),
            Money::from_i64(bid),
            Money::from_i64(ask),
            Money::from_i64(100),
            Money::from_i64(100),
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap() + Duration::seconds(n),
        )
    }

    fn matcher(cash: i64, strategy: Script) -> OrderMatcher {
        OrderMatcher::new(
            Arc::new(Portfolio::new(Money::from_i64(cash))),
            Some(Arc::new(BenchmarkIndex::new())),
            Box::new(strategy),
            CostMethod::Fifo,
        )
    }

    #[test]
    fn test_entry_then_exit_cash_round_trip() {
        let mut m = matcher(10_000, Script::new(50, &[1], &[2]));

        let out = m.query(&tick(0, 49, 50));
        assert_eq!(out.opened.len(), 1);
        assert_eq!(out.opened[0].id, 1);
        assert_eq!(m.portfolio().cash(), Money::from_i64(7_500));
        assert_eq!(m.open_order_count(), 1);

        let out = m.query(&tick(1, 55, 56));
        assert!(out.errors.is_empty());
        assert_eq!(out.closed.len(), 1);
        assert_eq!(out.closed_orders[0].status, OrderStatus::Closed);
        assert_eq!(m.portfolio().cash(), Money::from_i64(10_250));
        assert_eq!(m.open_order_count(), 0);
        assert!(m.portfolio().lots().is_empty());
    }

    #[test]
    fn test_insufficient_cash_cancels() {
        let mut m = matcher(100, Script::new(50, &[1], &[]));
        let out = m.query(&tick(0, 49, 50));

        assert!(out.opened.is_empty());
        assert_eq!(out.cancelled.len(), 1);
        assert_eq!(out.cancelled[0].status, OrderStatus::Cancelled);
        assert!(matches!(out.errors[0], LedgerError::NegativeCash { .. }));
        assert_eq!(m.portfolio().cash(), Money::from_i64(100));
        assert!(m.portfolio().lots().is_empty());
        assert_eq!(m.open_order_count(), 0);
    }

    #[test]
    fn test_benchmark_sees_every_tick() {
        let mut m = matcher(0, Script::new(1, &[], &[]));
        for n in 0..3 {
            m.query(&tick(n, 10 + n, 11 + n));
        }
        let summary = m
            .benchmark()
            .and_then(|b| b.summary(&Symbol::new("AAPL")))
            .unwrap();
        assert_eq!(summary.tick_count, 3);
    }

    #[test]
    fn test_close_all_uses_last_quote() {
        let mut m = matcher(10_000, Script::new(10, &[1, 2], &[]));
        m.query(&tick(0, 49, 50));
        m.query(&tick(1, 50, 51));
        m.query(&tick(2, 60, 61));
        assert_eq!(m.portfolio().cash(), Money::from_i64(10_000 - 500 - 510));

        let out = m.close_all();
        assert_eq!(out.closed_orders.len(), 2);
        assert!(out.closed.iter().all(|c| c.sell.amount == Money::from_i64(60)));
        assert_eq!(m.portfolio().cash(), Money::from_i64(10_000 - 1010 + 1200));
        assert_eq!(m.open_order_count(), 0);
    }

    #[test]
    fn test_invalid_exit_leaves_order_open() {
        struct BadExit;
        impl Strategy for BadExit {
            fn name(&self) -> &str {
                "bad_exit"
            }
            fn entry_check(&self, tick: &Tick) -> Option<Order> {
                Some(Order::market_buy(tick, Money::ONE))
            }
            fn exit_check(&self, _open: &Order, tick: &Tick) -> Option<Order> {
                Some(Order::market_buy(tick, Money::ONE))
            }
        }

        let mut m = OrderMatcher::new(
            Arc::new(Portfolio::new(Money::from_i64(100))),
            None,
            Box::new(BadExit),
            CostMethod::Lifo,
        );
        let out = m.query(&tick(0, 9, 10));
        assert_eq!(out.opened.len(), 1);
        assert!(matches!(out.errors[0], LedgerError::InvalidOrder { .. }));
        assert_eq!(m.open_order_count(), 1);
        assert_eq!(m.portfolio().cash(), Money::from_i64(90));
    }

    #[test]
    fn test_partial_exit_keeps_order_open() {
        struct Half;
        impl Strategy for Half {
            fn name(&self) -> &str {
                "half"
            }
            fn entry_check(&self, _tick: &Tick) -> Option<Order> {
                None
            }
            fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order> {
                Some(Order::market_sell(tick, open.volume() / Money::from_i64(2)))
            }
        }

        let portfolio = Arc::new(Portfolio::new(Money::from_i64(1_000)));
        let mut m = OrderMatcher::new(portfolio, None, Box::new(Half), CostMethod::Fifo);
        let mut buy = Order::market_buy(&tick(0, 9, 10), Money::from_i64(8));
        buy.id = 99;
        let mut outcome = QueryOutcome::default();
        m.open(buy, &tick(0, 9, 10), &mut outcome);
        assert_eq!(m.portfolio().cash(), Money::from_i64(920));

        let out = m.query(&tick(1, 12, 13));
        assert!(out.closed_orders.is_empty());
        assert_eq!(out.closed[0].volume, Money::from_i64(4));
        assert_eq!(m.open_orders(&Symbol::new("AAPL"))[0].volume(), Money::from_i64(4));
        assert_eq!(m.portfolio().position(&Symbol::new("AAPL")), Money::from_i64(4));
        assert_eq!(m.portfolio().cash(), Money::from_i64(968));
    }

    #[test]
    fn test_stale_order_node_leaves_lots_untouched() {
        let mut m = matcher(10_000, Script::new(10, &[1, 2], &[]));
        m.query(&tick(0, 9, 10));
        m.query(&tick(1, 9, 10));
        let symbol = Symbol::new("AAPL");
        let (node, first) = m.open_orders_with_ids(&symbol)[0].clone();

        let exit = Order::market_sell(&tick(2, 12, 13), first.volume());
        let mut outcome = QueryOutcome::default();
        m.close(node, &first, &exit, &mut outcome).unwrap();
        assert_eq!(m.portfolio().position(&symbol), Money::from_i64(10));
        let cash = m.portfolio().cash();

        // Same node again: the slot is gone, so nothing may be liquidated
        let err = m.close(node, &first, &exit, &mut outcome).unwrap_err();
        assert_eq!(err, LedgerError::NodeNotFound(symbol.clone()));
        assert_eq!(m.portfolio().position(&symbol), Money::from_i64(10));
        assert_eq!(m.portfolio().cash(), cash);
        assert_eq!(m.open_order_count(), 1);
    }
}
