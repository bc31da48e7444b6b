//! Slot-addressed arena of per-ticker chains

use parking_lot::RwLock;

use crate::error::{LedgerError, Result};
use crate::instrument::Entry;
use crate::ledger::{LotChain, NodeId, Slot, Summary, TickerIndex};
use crate::{Money, Symbol, Tick};

/// A growable array of optional [`LotChain`]s addressed by [`TickerIndex`]
/// slots.
///
/// `chains[slot]` is occupied iff `slot` is currently mapped by the index.
/// The index and the chain array sit behind separate locks: the index lock is
/// only held to resolve or allocate a slot and is released before chain
/// contents are touched. When both are needed the chain lock is taken first.
#[derive(Debug)]
pub struct LedgerStore<T> {
    index: RwLock<TickerIndex>,
    chains: RwLock<Vec<Option<LotChain<T>>>>,
}

impl<T: Entry> Default for LedgerStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entry> LedgerStore<T> {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(TickerIndex::new()),
            chains: RwLock::new(Vec::new()),
        }
    }

    /// Append `entry` to its ticker's chain, creating the chain on first
    /// sight of the ticker.
    pub fn insert(&self, entry: T) -> Result<(Slot, NodeId)> {
        let symbol = entry.symbol().clone();
        let mut chains = self.chains.write();

        let existing = self.index.read().get(&symbol);
        if let Some(slot) = existing {
            return match chains.get_mut(slot).and_then(Option::as_mut) {
                Some(chain) => Ok((slot, chain.push(entry))),
                None => Err(LedgerError::NoListExists(symbol)),
            };
        }

        let chain = LotChain::from_entry(entry);
        let id = chain
            .peek_back()
            .map(|(id, _)| id)
            .ok_or_else(|| LedgerError::EmptyChain(symbol.clone()))?;
        let slot = self.occupy(&mut chains, &symbol, chain)?;
        Ok((slot, id))
    }

    /// Create an empty, statistics-only chain for `tick.symbol`
    pub fn seed(&self, tick: &Tick) -> Result<Slot> {
        let mut chains = self.chains.write();
        let chain = LotChain::new(tick.symbol.clone(), Summary::from_tick(tick));
        self.occupy(&mut chains, &tick.symbol, chain)
    }

    /// Read access to a ticker's chain
    pub fn get<R>(&self, symbol: &Symbol, f: impl FnOnce(&LotChain<T>) -> R) -> Result<R> {
        let slot = self.slot(symbol)?;
        let chains = self.chains.read();
        chains
            .get(slot)
            .and_then(Option::as_ref)
            .map(f)
            .ok_or_else(|| LedgerError::NoListExists(symbol.clone()))
    }

    /// Write access to a ticker's chain
    ///
    /// The closure must not leave the chain empty of volume while still
    /// holding entries it expects the store to clean up; use
    /// [`remove_node`](Self::remove_node) or [`delete`](Self::delete) for that.
    pub fn get_mut<R>(
        &self,
        symbol: &Symbol,
        f: impl FnOnce(&mut LotChain<T>) -> R,
    ) -> Result<R> {
        let slot = self.slot(symbol)?;
        let mut chains = self.chains.write();
        chains
            .get_mut(slot)
            .and_then(Option::as_mut)
            .map(f)
            .ok_or_else(|| LedgerError::NoListExists(symbol.clone()))
    }

    /// Route a tick to its ticker's chain
    pub fn update(&self, tick: &Tick) -> Result<()> {
        self.get_mut(&tick.symbol, |chain| chain.update(tick))
    }

    /// Remove a ticker's chain and release its slot.
    ///
    /// Fails with `ListNotEmpty` while the chain still holds volume.
    pub fn delete(&self, symbol: &Symbol) -> Result<Slot> {
        let mut chains = self.chains.write();
        self.delete_locked(&mut chains, symbol)
    }

    /// Unlink one node; drops the whole chain once nothing is left in it
    pub fn remove_node(&self, symbol: &Symbol, id: NodeId) -> Result<T> {
        let slot = self.slot(symbol)?;
        let mut chains = self.chains.write();
        let chain = chains
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or_else(|| LedgerError::NoListExists(symbol.clone()))?;

        let entry = chain.remove(id)?;
        if chain.is_empty() && chain.total_volume().is_zero() {
            self.delete_locked(&mut chains, symbol)?;
        }
        Ok(entry)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.index.read().get(symbol).is_some()
    }

    pub fn slot_of(&self, symbol: &Symbol) -> Option<Slot> {
        self.index.read().get(symbol)
    }

    /// Total volume held for `symbol`, zero when there is no chain
    pub fn total_volume(&self, symbol: &Symbol) -> Money {
        self.get(symbol, |chain| chain.total_volume())
            .unwrap_or(Money::ZERO)
    }

    /// Tickers with a live chain, sorted
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .index
            .read()
            .symbols()
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Number of live chains
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current arena size
    pub fn capacity(&self) -> usize {
        self.chains.read().len()
    }

    /// Slots waiting on the free stack
    pub fn free_slots(&self) -> usize {
        self.index.read().free_len()
    }

    fn slot(&self, symbol: &Symbol) -> Result<Slot> {
        self.index
            .read()
            .get(symbol)
            .ok_or_else(|| LedgerError::NoListExists(symbol.clone()))
    }

    fn occupy(
        &self,
        chains: &mut Vec<Option<LotChain<T>>>,
        symbol: &Symbol,
        chain: LotChain<T>,
    ) -> Result<Slot> {
        let slot = self.index.write().put(symbol)?;

        if slot >= chains.len() {
            let capacity = (slot + 1) * 2;
            chains.resize_with(capacity, || None);
            self.index.write().reserve(capacity);
        }
        chains[slot] = Some(chain);
        Ok(slot)
    }

    fn delete_locked(
        &self,
        chains: &mut [Option<LotChain<T>>],
        symbol: &Symbol,
    ) -> Result<Slot> {
        let slot = self.slot(symbol)?;
        let volume = chains
            .get(slot)
            .and_then(Option::as_ref)
            .map(|chain| chain.total_volume())
            .ok_or_else(|| LedgerError::NoListExists(symbol.clone()))?;
        if !volume.is_zero() {
            return Err(LedgerError::ListNotEmpty {
                symbol: symbol.clone(),
                volume,
            });
        }

        chains[slot] = None;
        self.index.write().release(symbol);
        Ok(slot)
    }
}
