//! Strategy interface consulted by the order matcher

use crate::oms::types::Order;
use crate::portfolio::Portfolio;
use crate::Tick;

/// User-supplied trading logic.
///
/// Called synchronously on the consumer task. Implementations only describe
/// orders; all cash and lot changes are made by the matcher afterwards.
/// Interior state, if any, goes behind a lock (`&self` receivers).
pub trait Strategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &str;

    /// A buy order to place on this tick, if any
    fn entry_check(&self, tick: &Tick) -> Option<Order>;

    /// A sell order closing `open`, if any
    fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order>;

    /// Last look at an order before the matcher acts on it
    fn valid_order(&self, _portfolio: &Portfolio, _order: &Order) -> bool {
        true
    }
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn entry_check(&self, tick: &Tick) -> Option<Order> {
        (**self).entry_check(tick)
    }

    fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order> {
        (**self).exit_check(open, tick)
    }

    fn valid_order(&self, portfolio: &Portfolio, order: &Order) -> bool {
        (**self).valid_order(portfolio, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Money, Symbol};
    use chrono::Utc;

    struct AlwaysBuy;

    impl Strategy for AlwaysBuy {
        fn name(&self) -> &str {
            "always_buy"
        }

        fn entry_check(&self, tick: &Tick) -> Option<Order> {
            Some(Order::market_buy(tick, Money::ONE))
        }

        fn exit_check(&self, _open: &Order, _tick: &Tick) -> Option<Order> {
            None
        }
    }

    #[test]
    fn test_boxed_strategy_delegates() {
        let boxed: Box<dyn Strategy> = Box::new(AlwaysBuy);
        let tick = Tick::new(
            Symbol::new("AAPL"),
            Money::ONE,
            Money::ONE,
            Money::ONE,
            Money::ONE,
            Utc::now(),
        );
        assert_eq!(boxed.name(), "always_buy");
        assert!(boxed.entry_check(&tick).is_some());
        let portfolio = Portfolio::new(Money::ZERO);
        assert!(boxed.valid_order(&portfolio, &Order::market_buy(&tick, Money::ONE)));
    }
}
