//! Order Management System (OMS)
//!
//! Immediate-fill market orders for tick-driven backtesting:
//! - Buy orders open a lot when cash covers them, otherwise are cancelled
//! - Sell orders liquidate lots FIFO or LIFO, all or nothing
//! - Open orders are kept per ticker in their own [`LedgerStore`](crate::ledger::LedgerStore)

pub mod liquidate;
pub mod matcher;
pub mod strategy;
pub mod types;

pub use liquidate::liquidate;
pub use matcher::{OrderMatcher, QueryOutcome};
pub use strategy::Strategy;
pub use types::{Order, OrderId, OrderStatus};
