//! Ledger error taxonomy
//!
//! Every variant is returned before any write happens, so a failed call
//! leaves the ledger exactly as it was.

use thiserror::Error;

use crate::ledger::Slot;
use crate::{Money, Symbol};

/// Broad category of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Lookup/shape problems: missing chains, duplicate keys, stale handles
    Structural,
    /// Business rules: not enough volume or cash, malformed orders
    Policy,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("ticker {symbol} already mapped to slot {slot}")]
    KeyExists { symbol: Symbol, slot: Slot },

    #[error("no chain exists for ticker {0}")]
    NoListExists(Symbol),

    #[error("chain for {symbol} still holds volume {volume}")]
    ListNotEmpty { symbol: Symbol, volume: Money },

    #[error("node is not a member of the chain for {0}")]
    NodeNotFound(Symbol),

    #[error("chain for {0} holds no entries")]
    EmptyChain(Symbol),

    #[error("cannot sell {requested} of {symbol}: only {available} held")]
    InsufficientVolume {
        symbol: Symbol,
        requested: Money,
        available: Money,
    },

    #[error("cash delta {delta} would leave balance {balance} below zero")]
    NegativeCash { balance: Money, delta: Money },

    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: Symbol, reason: &'static str },
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::KeyExists { .. }
            | LedgerError::NoListExists(_)
            | LedgerError::ListNotEmpty { .. }
            | LedgerError::NodeNotFound(_)
            | LedgerError::EmptyChain(_) => ErrorClass::Structural,
            LedgerError::InsufficientVolume { .. }
            | LedgerError::NegativeCash { .. }
            | LedgerError::InvalidOrder { .. } => ErrorClass::Policy,
        }
    }

    pub fn is_structural(&self) -> bool {
        self.class() == ErrorClass::Structural
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
