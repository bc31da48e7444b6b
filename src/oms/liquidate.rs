//! Lot liquidation by cost method

use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::instrument::{ClosedLot, Entry, Lot};
use crate::ledger::LedgerStore;
use crate::{CostMethod, DatedMetric, Money, Symbol};

/// Sell `volume` of `symbol` out of `lots`, oldest first (FIFO) or newest
/// first (LIFO), at `sell`.
///
/// All or nothing: when the chain holds less than `volume` nothing is
/// touched and `InsufficientVolume` is returned. Lots are drained one at a
/// time, each step producing one [`ClosedLot`]; a lot that reaches zero is
/// unlinked, and the chain is deleted once its total volume is zero.
pub fn liquidate(
    lots: &LedgerStore<Lot>,
    symbol: &Symbol,
    volume: Money,
    method: CostMethod,
    sell: DatedMetric,
) -> Result<Vec<ClosedLot>> {
    if !volume.is_positive() {
        return Err(LedgerError::InvalidOrder {
            symbol: symbol.clone(),
            reason: "sell volume must be positive",
        });
    }

    let (closed, remaining) = lots.get_mut(symbol, |chain| {
        let available = chain.total_volume();
        if available < volume {
            return Err(LedgerError::InsufficientVolume {
                symbol: symbol.clone(),
                requested: volume,
                available,
            });
        }

        let mut left = volume;
        let mut closed = Vec::new();
        while left.is_positive() {
            let (id, lot) = chain
                .peek(method)
                .ok_or_else(|| LedgerError::EmptyChain(symbol.clone()))?;
            let take = lot.volume().min(left);
            closed.push(ClosedLot::from_lot(lot, take, sell));
            chain.reduce(id, take)?;
            left -= take;
        }
        Ok((closed, chain.total_volume()))
    })??;

    if remaining.is_zero() {
        lots.delete(symbol)?;
        debug!(symbol = %symbol, "position fully liquidated, chain released");
    }

    Ok(closed)
}
