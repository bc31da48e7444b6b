//! CLI command implementations

pub mod backtest;
