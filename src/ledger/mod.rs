//! Indexed lot ledger
//!
//! - [`TickerIndex`]: ticker → slot map with LIFO free-slot reuse
//! - [`LotChain`]: index-linked list of entries plus rolling [`Summary`]
//! - [`LedgerStore`]: slot-addressed arena of chains, owns chain lifecycle
//!
//! ## Performance
//! Insert and lookup are amortized O(1): the arena doubles when a new slot
//! falls past its end, and unlinking any node is a constant-time relink.

pub mod chain;
pub mod index;
pub mod store;
pub mod summary;

pub use chain::{LotChain, NodeId};
pub use index::{Slot, TickerIndex};
pub use store::LedgerStore;
pub use summary::Summary;
