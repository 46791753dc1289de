//! Lot Store boundary.
//!
//! Durable record set of lots, their history and their lineage links, with
//! one atomic write path: [`LotStore::commit`].

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use lotkeeper_core::{LotId, MaterialId, WarehouseId};
use lotkeeper_lots::{CommitReceipt, LineageLink, Lot, LotChangeset, LotHistoryEntry, LotSnapshot};

pub use in_memory::InMemoryLotStore;

/// Lot store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// business-rule rejections, which never reach the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lot read by the decision changed before the commit.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The changeset references lots or indices that do not exist.
    #[error("invalid changeset: {0}")]
    InvalidChangeset(String),

    #[error("storage failure: {0}")]
    Storage(String),

    /// The backend needs an async runtime that is not available.
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

/// Transactional store of lots, history entries and lineage links.
///
/// ## Commit semantics
///
/// `commit()`:
/// - checks every `(lot_id, expected_version)` pair in the changeset
/// - assigns ids and lot numbers to created lots
/// - applies updates, bumping each updated lot's version by one
/// - appends lineage links and history entries
///
/// all as one unit: either everything is visible afterwards or nothing is.
/// A stale version yields [`StoreError::Concurrency`] and no writes.
///
/// ## Reads
///
/// Reads return owned copies taken from a consistent state; callers never
/// hold store locks while deciding.
pub trait LotStore: Send + Sync {
    /// Load the requested lots. Unknown ids are simply absent.
    fn load_lots(&self, ids: &[LotId]) -> Result<LotSnapshot, StoreError>;

    fn get_lot(&self, id: LotId) -> Result<Option<Lot>, StoreError>;

    /// Lots of one material in one warehouse, ordered by id.
    fn lots_by_material(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Lot>, StoreError>;

    /// Lots holding quantity, optionally restricted to one warehouse, ordered by id.
    fn stocked_lots(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<Lot>, StoreError>;

    /// History of one lot in commit order (oldest first).
    fn history(&self, lot_id: LotId) -> Result<Vec<LotHistoryEntry>, StoreError>;

    /// Lineage links among lots of one material in one warehouse. Splits and
    /// merges never cross that boundary, so this is a whole lineage forest.
    fn lineage_links(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LineageLink>, StoreError>;

    fn commit(&self, changeset: LotChangeset) -> Result<CommitReceipt, StoreError>;
}

impl<S> LotStore for Arc<S>
where
    S: LotStore + ?Sized,
{
    fn load_lots(&self, ids: &[LotId]) -> Result<LotSnapshot, StoreError> {
        (**self).load_lots(ids)
    }

    fn get_lot(&self, id: LotId) -> Result<Option<Lot>, StoreError> {
        (**self).get_lot(id)
    }

    fn lots_by_material(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Lot>, StoreError> {
        (**self).lots_by_material(material_id, warehouse_id)
    }

    fn stocked_lots(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<Lot>, StoreError> {
        (**self).stocked_lots(warehouse_id)
    }

    fn history(&self, lot_id: LotId) -> Result<Vec<LotHistoryEntry>, StoreError> {
        (**self).history(lot_id)
    }

    fn lineage_links(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LineageLink>, StoreError> {
        (**self).lineage_links(material_id, warehouse_id)
    }

    fn commit(&self, changeset: LotChangeset) -> Result<CommitReceipt, StoreError> {
        (**self).commit(changeset)
    }
}
