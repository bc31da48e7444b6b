//! Lot Ledger
//!
//! Tick-driven backtesting accounting: per-ticker lot chains in a
//! slot-reusing arena, FIFO/LIFO liquidation into closed-lot records, cash
//! accounting, and buy-and-hold benchmarks for alpha.
//!
//! A run is one [`Simulation`]: file readers push [`Tick`]s into a bounded
//! queue, a single consumer routes each tick through the
//! [`OrderMatcher`](oms::OrderMatcher), and closed lots are aggregated by the
//! [`PositionLog`](position_log::PositionLog).

pub mod benchmark;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod ledger;
pub mod oms;
pub mod portfolio;
pub mod position_log;
pub mod report;
pub mod simulation;
pub mod strategies;
pub mod types;

pub use benchmark::BenchmarkIndex;
pub use config::Config;
pub use error::{ErrorClass, LedgerError};
pub use instrument::{ClosedLot, Entry, Lot};
pub use portfolio::Portfolio;
pub use simulation::{RunSummary, Simulation, SimulationSettings};
pub use types::*;
