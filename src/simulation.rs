//! One backtest run
//!
//! Owns every mutable structure of a run and is the only writer to them.
//! Ticks arrive over a bounded queue; when the queue closes, open orders are
//! drained at their last quotes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::benchmark::BenchmarkIndex;
use crate::error::ErrorClass;
use crate::oms::{OrderMatcher, QueryOutcome, Strategy};
use crate::portfolio::Portfolio;
use crate::position_log::{Diagnostics, PositionLog, ReportRow};
use crate::{Config, CostMethod, Money, Symbol, Tick};

/// Accounting settings for a run
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub start_cash: Money,
    pub cost_method: CostMethod,
    pub benchmark: bool,
    pub ignore: HashSet<Symbol>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start_cash: Money::from_i64(10_000),
            cost_method: CostMethod::Fifo,
            benchmark: true,
            ignore: HashSet::new(),
        }
    }
}

impl SimulationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            start_cash: config.start_cash(),
            cost_method: config.backtest.cost_method,
            benchmark: config.benchmark.enabled,
            ignore: config.ignored(),
        }
    }
}

/// End-of-run figures
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_cash: Money,
    pub final_cash: Money,
    pub realized_gain: Money,
    pub closed_lots: usize,
    pub open_orders: usize,
    pub diagnostics: Diagnostics,
}

pub struct Simulation {
    matcher: OrderMatcher,
    log: PositionLog,
    ignore: HashSet<Symbol>,
    start_cash: Money,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Simulation {
    pub fn new(settings: SimulationSettings, strategy: Box<dyn Strategy>) -> Self {
        let portfolio = Arc::new(Portfolio::new(settings.start_cash));
        let benchmark = settings.benchmark.then(|| Arc::new(BenchmarkIndex::new()));
        info!(
            strategy = strategy.name(),
            cash = %settings.start_cash,
            cost_method = %settings.cost_method,
            benchmark = settings.benchmark,
            "simulation ready"
        );
        Self {
            matcher: OrderMatcher::new(portfolio, benchmark, strategy, settings.cost_method),
            log: PositionLog::new(),
            ignore: settings.ignore,
            start_cash: settings.start_cash,
            last_timestamp: None,
        }
    }

    /// Feed one tick through the matcher
    pub fn process(&mut self, tick: &Tick) {
        let diagnostics = self.log.diagnostics_mut();
        diagnostics.ticks += 1;

        if self.ignore.contains(&tick.symbol) {
            diagnostics.ignored += 1;
            return;
        }
        if let Some(last) = self.last_timestamp {
            if tick.timestamp < last {
                diagnostics.out_of_order += 1;
                warn!(
                    symbol = %tick.symbol,
                    timestamp = %tick.timestamp,
                    last = %last,
                    "tick out of time order"
                );
            }
        }
        let latest = self.last_timestamp.map_or(tick.timestamp, |t| t.max(tick.timestamp));
        self.last_timestamp = Some(latest);

        let outcome = self.matcher.query(tick);
        self.absorb(outcome);
    }

    /// Consume ticks until every sender is dropped, then drain open orders
    pub async fn run(&mut self, mut rx: mpsc::Receiver<Tick>) -> RunSummary {
        while let Some(tick) = rx.recv().await {
            self.process(&tick);
        }
        debug!("tick queue closed");
        self.shutdown()
    }

    /// Exit every open order at its ticker's last quote
    pub fn shutdown(&mut self) -> RunSummary {
        let open = self.matcher.open_order_count();
        if open > 0 {
            info!("Draining {} open orders at last quotes", open);
        }
        let outcome = self.matcher.close_all();
        self.absorb(outcome);

        let summary = self.summary();
        info!(
            final_cash = %summary.final_cash,
            realized = %summary.realized_gain,
            closed_lots = summary.closed_lots,
            "simulation finished"
        );
        summary
    }

    fn absorb(&mut self, outcome: QueryOutcome) {
        for error in &outcome.errors {
            match error.class() {
                ErrorClass::Structural => warn!("{}", error),
                ErrorClass::Policy => debug!("{}", error),
            }
        }
        self.log.record_outcome(outcome);
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            start_cash: self.start_cash,
            final_cash: self.portfolio().cash(),
            realized_gain: self.log.realized_gain(),
            closed_lots: self.log.closed_lots().len(),
            open_orders: self.matcher.open_order_count(),
            diagnostics: self.log.diagnostics().clone(),
        }
    }

    /// Per-ticker report, with alpha when the benchmark is on
    pub fn report(&self) -> Vec<ReportRow> {
        self.log.report(self.matcher.benchmark().map(Arc::as_ref))
    }

    pub fn portfolio(&self) -> &Arc<Portfolio> {
        self.matcher.portfolio()
    }

    pub fn benchmark(&self) -> Option<&Arc<BenchmarkIndex>> {
        self.matcher.benchmark()
    }

    pub fn matcher(&self) -> &OrderMatcher {
        &self.matcher
    }

    pub fn log(&self) -> &PositionLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::Order;
    use chrono::{Duration, TimeZone};

    struct BuyFirstSellThird;

    impl Strategy for BuyFirstSellThird {
        fn name(&self) -> &str {
            "buy_first_sell_third"
        }

        fn entry_check(&self, tick: &Tick) -> Option<Order> {
            (tick.bid == Money::from_i64(100)).then(|| Order::market_buy(tick, Money::from_i64(10)))
        }

        fn exit_check(&self, open: &Order, tick: &Tick) -> Option<Order> {
            (tick.bid == Money::from_i64(102)).then(|| Order::market_sell(tick, open.quote.volume))
        }
    }

    fn tick(symbol: &str, secs: i64, bid: i64) -> Tick {
        Tick::new(
            Symbol::new(symbol),
            Money::from_i64(bid),
            Money::from_i64(bid + 1),
            Money::ONE,
            Money::ONE,
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap() + Duration::seconds(secs),
        )
    }

    #[test]
    fn test_ignored_tickers_never_reach_matcher() {
        let settings = SimulationSettings {
            ignore: [Symbol::new("XYZ")].into_iter().collect(),
            ..SimulationSettings::default()
        };
        let mut sim = Simulation::new(settings, Box::new(BuyFirstSellThird));
        sim.process(&tick("XYZ", 0, 100));

        assert_eq!(sim.log().diagnostics().ticks, 1);
        assert_eq!(sim.log().diagnostics().ignored, 1);
        assert!(sim.benchmark().unwrap().is_empty());
        assert_eq!(sim.portfolio().cash(), Money::from_i64(10_000));
    }

    #[test]
    fn test_out_of_order_is_counted_not_dropped() {
        let mut sim = Simulation::new(SimulationSettings::default(), Box::new(BuyFirstSellThird));
        sim.process(&tick("AAPL", 10, 99));
        sim.process(&tick("AAPL", 5, 99));

        assert_eq!(sim.log().diagnostics().out_of_order, 1);
        let summary = sim.benchmark().unwrap().summary(&Symbol::new("AAPL")).unwrap();
        assert_eq!(summary.tick_count, 2);
    }

    #[test]
    fn test_shutdown_drains_open_orders() {
        let mut sim = Simulation::new(SimulationSettings::default(), Box::new(BuyFirstSellThird));
        sim.process(&tick("AAPL", 0, 100));
        sim.process(&tick("AAPL", 1, 101));
        assert_eq!(sim.matcher().open_order_count(), 1);

        let summary = sim.shutdown();
        assert_eq!(summary.open_orders, 0);
        assert_eq!(summary.closed_lots, 1);
        assert_eq!(summary.diagnostics.orders_closed, 1);
        // bought 10 @ 101, drained 10 @ 101
        assert_eq!(summary.final_cash, Money::from_i64(10_000));
    }

    #[tokio::test]
    async fn test_run_consumes_until_closed() {
        let (tx, rx) = mpsc::channel(2);
        let producer = tokio::spawn(async move {
            for (secs, bid) in [(0, 100), (1, 101), (2, 102)] {
                tx.send(tick("AAPL", secs, bid)).await.unwrap();
            }
        });

        let mut sim = Simulation::new(SimulationSettings::default(), Box::new(BuyFirstSellThird));
        let summary = sim.run(rx).await;
        producer.await.unwrap();

        assert_eq!(summary.diagnostics.ticks, 3);
        assert_eq!(summary.closed_lots, 1);
        // bought 10 @ 101, sold 10 @ 102
        assert_eq!(summary.final_cash, Money::from_i64(10_010));
        assert_eq!(sim.report().len(), 1);
    }

    #[tokio::test]
    async fn test_portfolio_readable_while_running() {
        let (tx, rx) = mpsc::channel(4);
        let mut sim = Simulation::new(SimulationSettings::default(), Box::new(BuyFirstSellThird));
        let portfolio = sim.portfolio().clone();
        let run = tokio::spawn(async move {
            let summary = sim.run(rx).await;
            (sim, summary)
        });

        let reader = tokio::spawn({
            let portfolio = portfolio.clone();
            async move {
                loop {
                    let position = portfolio.position(&Symbol::new("AAPL"));
                    if position.is_positive() {
                        return (portfolio.cash(), position);
                    }
                    tokio::task::yield_now().await;
                }
            }
        });

        tx.send(tick("AAPL", 0, 100)).await.unwrap();
        let (cash, position) = tokio::time::timeout(std::time::Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        // bought 10 @ 101 while the run is still open
        assert_eq!(cash, Money::from_i64(8_990));
        assert_eq!(position, Money::from_i64(10));

        tx.send(tick("AAPL", 1, 101)).await.unwrap();
        tx.send(tick("AAPL", 2, 102)).await.unwrap();
        drop(tx);
        let (sim, summary) = run.await.unwrap();

        assert_eq!(summary.final_cash, Money::from_i64(10_010));
        assert_eq!(portfolio.cash(), summary.final_cash);
        assert!(Arc::ptr_eq(&portfolio, sim.portfolio()));
    }
}
