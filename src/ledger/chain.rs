//! Per-ticker doubly linked chain of entries with rolling statistics
//!
//! Nodes live in a `Vec` and link to each other by index, so unlinking an
//! arbitrary node is an O(1) relink with no aliasing. Vacated cells are
//! reused; a generation counter on every cell makes stale [`NodeId`]s fail
//! with `NodeNotFound` instead of touching whatever moved into the cell.

use crate::error::{LedgerError, Result};
use crate::instrument::Entry;
use crate::ledger::Summary;
use crate::{CostMethod, Money, Symbol, Tick};

/// Handle to one node of a [`LotChain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Node<T> {
    entry: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone)]
struct Cell<T> {
    generation: u32,
    node: Option<Node<T>>,
}

#[derive(Debug, Clone)]
pub struct LotChain<T> {
    symbol: Symbol,
    cells: Vec<Cell<T>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    total_volume: Money,
    summary: Summary,
}

impl<T: Entry> LotChain<T> {
    /// Empty chain carrying only statistics
    pub fn new(symbol: Symbol, summary: Summary) -> Self {
        Self {
            symbol,
            cells: Vec::new(),
            vacant: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            total_volume: Money::ZERO,
            summary,
        }
    }

    /// Chain seeded with the statistics of its first entry
    pub fn from_entry(entry: T) -> Self {
        let mut chain = Self::new(entry.symbol().clone(), entry.seed_summary());
        chain.push(entry);
        chain
    }

    /// Append at the tail
    pub fn push(&mut self, entry: T) -> NodeId {
        self.total_volume += entry.volume();

        let node = Node {
            entry,
            prev: self.tail,
            next: None,
        };
        let index = match self.vacant.pop() {
            Some(index) => {
                self.cells[index].node = Some(node);
                index
            }
            None => {
                self.cells.push(Cell {
                    generation: 0,
                    node: Some(node),
                });
                self.cells.len() - 1
            }
        };

        match self.tail {
            Some(tail) => {
                if let Some(prev) = self.cells[tail].node.as_mut() {
                    prev.next = Some(index);
                }
            }
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        NodeId {
            index,
            generation: self.cells[index].generation,
        }
    }

    pub fn pop_front(&mut self) -> Result<T> {
        self.head
            .and_then(|index| self.unlink(index))
            .ok_or_else(|| LedgerError::EmptyChain(self.symbol.clone()))
    }

    pub fn pop_back(&mut self) -> Result<T> {
        self.tail
            .and_then(|index| self.unlink(index))
            .ok_or_else(|| LedgerError::EmptyChain(self.symbol.clone()))
    }

    pub fn peek_front(&self) -> Option<(NodeId, &T)> {
        self.head.and_then(|index| self.entry_at(index))
    }

    pub fn peek_back(&self) -> Option<(NodeId, &T)> {
        self.tail.and_then(|index| self.entry_at(index))
    }

    /// The entry a sale under `method` consumes first
    pub fn peek(&self, method: CostMethod) -> Option<(NodeId, &T)> {
        match method {
            CostMethod::Fifo => self.peek_front(),
            CostMethod::Lifo => self.peek_back(),
        }
    }

    pub fn pop(&mut self, method: CostMethod) -> Result<T> {
        match method {
            CostMethod::Fifo => self.pop_front(),
            CostMethod::Lifo => self.pop_back(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(|node| &node.entry)
    }

    /// Unlink an arbitrary node
    pub fn remove(&mut self, id: NodeId) -> Result<T> {
        if self.node(id).is_none() {
            return Err(LedgerError::NodeNotFound(self.symbol.clone()));
        }
        self.unlink(id.index)
            .ok_or_else(|| LedgerError::NodeNotFound(self.symbol.clone()))
    }

    /// Take `volume` out of one node, unlinking it once it reaches zero.
    ///
    /// Returns the unlinked entry when the node was exhausted.
    pub fn reduce(&mut self, id: NodeId, volume: Money) -> Result<Option<T>> {
        let available = match self.node(id) {
            Some(node) => node.entry.volume(),
            None => return Err(LedgerError::NodeNotFound(self.symbol.clone())),
        };
        if volume > available || volume.is_negative() {
            return Err(LedgerError::InsufficientVolume {
                symbol: self.symbol.clone(),
                requested: volume,
                available,
            });
        }

        if let Some(node) = self.cells[id.index].node.as_mut() {
            node.entry.quote_mut().volume -= volume;
        }
        self.total_volume -= volume;

        if volume == available {
            Ok(self.unlink(id.index))
        } else {
            Ok(None)
        }
    }

    /// Roll a tick into the chain statistics and every entry
    pub fn update(&mut self, tick: &Tick) {
        self.summary.update(tick);
        for cell in self.cells.iter_mut() {
            if let Some(node) = cell.node.as_mut() {
                node.entry.on_tick(tick);
            }
        }
    }

    /// Entries in chain order, head to tail
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            chain: self,
            cursor: self.head,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_volume(&self) -> Money {
        self.total_volume
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// `total_volume` equals the sum of the entries' volumes
    pub fn is_consistent(&self) -> bool {
        self.iter().map(|(_, entry)| entry.volume()).sum::<Money>() == self.total_volume
    }

    fn node(&self, id: NodeId) -> Option<&Node<T>> {
        self.cells
            .get(id.index)
            .filter(|cell| cell.generation == id.generation)
            .and_then(|cell| cell.node.as_ref())
    }

    fn entry_at(&self, index: usize) -> Option<(NodeId, &T)> {
        let cell = self.cells.get(index)?;
        let node = cell.node.as_ref()?;
        Some((
            NodeId {
                index,
                generation: cell.generation,
            },
            &node.entry,
        ))
    }

    fn unlink(&mut self, index: usize) -> Option<T> {
        let cell = self.cells.get_mut(index)?;
        let node = cell.node.take()?;
        cell.generation = cell.generation.wrapping_add(1);
        self.vacant.push(index);

        match node.prev {
            Some(prev) => {
                if let Some(p) = self.cells[prev].node.as_mut() {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.cells[next].node.as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.len -= 1;
        self.total_volume -= node.entry.volume();
        Some(node.entry)
    }
}

pub struct Iter<'a, T> {
    chain: &'a LotChain<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let cell = &self.chain.cells[index];
        let node = cell.node.as_ref()?;
        self.cursor = node.next;
        Some((
            NodeId {
                index,
                generation: cell.generation,
            },
            &node.entry,
        ))
    }
}
