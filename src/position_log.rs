//! Closed-lot sink and per-ticker reporting

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::benchmark::BenchmarkIndex;
use crate::error::{ErrorClass, LedgerError};
use crate::instrument::ClosedLot;
use crate::oms::QueryOutcome;
use crate::{DatedMetric, Money, Symbol};

/// Run counters. Recoverable errors end up here rather than aborting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub ticks: u64,
    pub ignored: u64,
    pub out_of_order: u64,
    pub orders_opened: u64,
    pub orders_cancelled: u64,
    pub orders_closed: u64,
    pub structural_errors: u64,
    pub policy_errors: u64,
}

impl Diagnostics {
    pub fn record_error(&mut self, error: &LedgerError) {
        match error.class() {
            ErrorClass::Structural => self.structural_errors += 1,
            ErrorClass::Policy => self.policy_errors += 1,
        }
    }

    pub fn errors(&self) -> u64 {
        self.structural_errors + self.policy_errors
    }
}

/// One line of the per-ticker report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub symbol: Symbol,
    pub filled: usize,
    pub avg_volume: Money,
    pub buy_value: Money,
    pub end_value: Money,
    pub avg_bid: Money,
    pub max_bid: DatedMetric,
    pub min_bid: DatedMetric,
    pub avg_ask: Money,
    pub max_ask: DatedMetric,
    pub min_ask: DatedMetric,
    pub first_buy: DateTime<Utc>,
    pub last_sell: DateTime<Utc>,
    pub pct_return: f64,
    /// Percent return over the ticker's benchmark; `None` without one
    pub alpha: Option<f64>,
}

impl ReportRow {
    pub fn realized_gain(&self) -> Money {
        self.end_value - self.buy_value
    }

    fn from_closed(symbol: Symbol, lots: &[&ClosedLot]) -> Option<Self> {
        let first = lots.first()?;
        let filled = lots.len();

        let volume: Money = lots.iter().map(|c| c.volume).sum();
        let buy_value: Money = lots.iter().map(|c| c.buy_value()).sum();
        let end_value: Money = lots.iter().map(|c| c.end_value()).sum();

        let mut row = Self {
            symbol,
            filled,
            avg_volume: volume / Money::from_u64(filled as u64),
            buy_value,
            end_value,
            avg_bid: tick_weighted(lots, |c| c.stats.avg_bid),
            max_bid: first.stats.max_bid,
            min_bid: first.stats.min_bid,
            avg_ask: tick_weighted(lots, |c| c.stats.avg_ask),
            max_ask: first.stats.max_ask,
            min_ask: first.stats.min_ask,
            first_buy: first.buy.date,
            last_sell: first.sell.date,
            pct_return: 0.0,
            alpha: None,
        };
        for c in lots.iter().skip(1) {
            row.max_bid = later_max(row.max_bid, c.stats.max_bid);
            row.max_ask = later_max(row.max_ask, c.stats.max_ask);
            row.min_bid = later_min(row.min_bid, c.stats.min_bid);
            row.min_ask = later_min(row.min_ask, c.stats.min_ask);
            row.first_buy = row.first_buy.min(c.buy.date);
            row.last_sell = row.last_sell.max(c.sell.date);
        }
        if !buy_value.is_zero() {
            row.pct_return = ((end_value - buy_value) / buy_value).to_f64() * 100.0;
        }
        Some(row)
    }
}

/// Average of `f` over lots, weighted by how many ticks each lot lived through
fn tick_weighted(lots: &[&ClosedLot], f: impl Fn(&ClosedLot) -> Money) -> Money {
    let ticks: Money = lots.iter().map(|c| Money::from_u64(c.stats.tick_count)).sum();
    lots.iter()
        .map(|c| f(c) * Money::from_u64(c.stats.tick_count))
        .sum::<Money>()
        / ticks
}

// Ties go to the later observation, matching chain statistics
fn later_max(a: DatedMetric, b: DatedMetric) -> DatedMetric {
    if b.amount > a.amount || (b.amount == a.amount && b.date >= a.date) {
        b
    } else {
        a
    }
}

fn later_min(a: DatedMetric, b: DatedMetric) -> DatedMetric {
    if b.amount < a.amount || (b.amount == a.amount && b.date >= a.date) {
        b
    } else {
        a
    }
}

/// Every closed lot of a run plus the run's diagnostics
#[derive(Debug, Default)]
pub struct PositionLog {
    closed: Vec<ClosedLot>,
    diagnostics: Diagnostics,
}

impl PositionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, closed: ClosedLot) {
        self.closed.push(closed);
    }

    /// Fold one matcher result into the log and counters
    pub fn record_outcome(&mut self, outcome: QueryOutcome) {
        self.diagnostics.orders_opened += outcome.opened.len() as u64;
        self.diagnostics.orders_cancelled += outcome.cancelled.len() as u64;
        self.diagnostics.orders_closed += outcome.closed_orders.len() as u64;
        for error in &outcome.errors {
            self.diagnostics.record_error(error);
        }
        self.closed.extend(outcome.closed);
    }

    pub fn closed_lots(&self) -> &[ClosedLot] {
        &self.closed
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn realized_gain(&self) -> Money {
        self.closed.iter().map(ClosedLot::realized_gain).sum()
    }

    /// Aggregate closed lots per ticker, sorted by ticker
    pub fn report(&self, benchmark: Option<&BenchmarkIndex>) -> Vec<ReportRow> {
        let grouped: BTreeMap<Symbol, Vec<&ClosedLot>> = self
            .closed
            .iter()
            .into_group_map_by(|c| c.symbol.clone())
            .into_iter()
            .collect();

        grouped
            .into_iter()
            .filter_map(|(symbol, lots)| {
                let mut row = ReportRow::from_closed(symbol, &lots)?;
                row.alpha = benchmark
                    .and_then(|b| b.pct_return(&row.symbol))
                    .map(|bench| row.pct_return - bench);
                Some(row)
            })
            .collect()
    }
}
