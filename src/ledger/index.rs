//! Ticker → slot lookup with free-slot reuse

use std::collections::HashMap;

use crate::error::{LedgerError, Result};
use crate::Symbol;

/// Stable array position of a ticker's chain
pub type Slot = usize;

/// Maps tickers to slots in a [`LedgerStore`](super::LedgerStore) arena.
///
/// A slot is either mapped to exactly one live ticker or sits on the free
/// stack. Freed slots are handed out again most-recently-freed first.
#[derive(Debug, Default)]
pub struct TickerIndex {
    slots: HashMap<Symbol, Slot>,
    free: Vec<Slot>,
    high_water: Slot,
}

impl TickerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a slot to `symbol`.
    ///
    /// Returns `KeyExists` carrying the current slot if the ticker is already
    /// mapped; nothing changes in that case.
    pub fn put(&mut self, symbol: &Symbol) -> Result<Slot> {
        if let Some(&slot) = self.slots.get(symbol) {
            return Err(LedgerError::KeyExists {
                symbol: symbol.clone(),
                slot,
            });
        }

        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                let slot = self.high_water;
                self.high_water += 1;
                slot
            }
        };
        self.slots.insert(symbol.clone(), slot);
        Ok(slot)
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Slot> {
        self.slots.get(symbol).copied()
    }

    /// Unmap `symbol` and push its slot onto the free stack
    pub fn release(&mut self, symbol: &Symbol) -> Option<Slot> {
        let slot = self.slots.remove(symbol)?;
        self.free.push(slot);
        Some(slot)
    }

    /// Register every never-used slot below `capacity` as free.
    ///
    /// Called after the backing arena grows so the new tail slots are handed
    /// out before the high-water mark moves again. Lower slots are pushed
    /// last so they pop first.
    pub fn reserve(&mut self, capacity: Slot) {
        if capacity <= self.high_water {
            return;
        }
        self.free.extend((self.high_water..capacity).rev());
        self.high_water = capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn high_water(&self) -> Slot {
        self.high_water
    }

    pub fn symbols(&self) -> impl Iterator<Item = (&Symbol, Slot)> {
        self.slots.iter().map(|(symbol, &slot)| (symbol, slot))
    }
}
