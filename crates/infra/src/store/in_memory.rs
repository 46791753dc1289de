use std::sync::RwLock;

use lotkeeper_core::{LotId, MaterialId, WarehouseId};
use lotkeeper_lots::{
    CommitReceipt, LineageLink, Lot, LotChangeset, LotHistoryEntry, LotNumber, LotRef,
    LotSnapshot,
};

use super::{LotStore, StoreError};

/// Arena of records. `lots[i]` holds the lot with id `i + 1`.
#[derive(Debug, Default)]
struct Tables {
    lots: Vec<Lot>,
    history: Vec<LotHistoryEntry>,
    links: Vec<LineageLink>,
}

impl Tables {
    fn lot(&self, id: LotId) -> Option<&Lot> {
        let idx = usize::try_from(id.get()).ok()?.checked_sub(1)?;
        self.lots.get(idx)
    }

    fn lot_mut(&mut self, id: LotId) -> Option<&mut Lot> {
        let idx = usize::try_from(id.get()).ok()?.checked_sub(1)?;
        self.lots.get_mut(idx)
    }

    /// Ids are 1-based positions in their table.
    fn next_id(len: usize) -> Result<u64, StoreError> {
        u64::try_from(len)
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| StoreError::Storage("id space exhausted".to_string()))
    }
}

/// In-memory lot store.
///
/// Intended for tests/dev. A single `RwLock` guards the arena: commits take
/// the write guard for validation and application together, so two commits
/// touching the same lot are strictly serialized and the second one sees the
/// first one's version bump.
#[derive(Debug)]
pub struct InMemoryLotStore {
    tables: RwLock<Tables>,
    lot_prefix: String,
}

impl Default for InMemoryLotStore {
    fn default() -> Self {
        Self::with_prefix("LOT")
    }
}

impl InMemoryLotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(lot_prefix: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            lot_prefix: lot_prefix.into(),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl LotStore for InMemoryLotStore {
    fn load_lots(&self, ids: &[LotId]) -> Result<LotSnapshot, StoreError> {
        let tables = self.read()?;
        Ok(LotSnapshot::from_lots(
            ids.iter().filter_map(|id| tables.lot(*id).cloned()),
        ))
    }

    fn get_lot(&self, id: LotId) -> Result<Option<Lot>, StoreError> {
        Ok(self.read()?.lot(id).cloned())
    }

    fn lots_by_material(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Lot>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .lots
            .iter()
            .filter(|lot| lot.material_id == material_id && lot.warehouse_id == warehouse_id)
            .cloned()
            .collect())
    }

    fn stocked_lots(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<Lot>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .lots
            .iter()
            .filter(|lot| !lot.is_exhausted())
            .filter(|lot| warehouse_id.is_none_or(|w| lot.warehouse_id == w))
            .cloned()
            .collect())
    }

    fn history(&self, lot_id: LotId) -> Result<Vec<LotHistoryEntry>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .history
            .iter()
            .filter(|entry| entry.lot_id == lot_id)
            .cloned()
            .collect())
    }

    fn lineage_links(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LineageLink>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .links
            .iter()
            .filter(|link| {
                tables.lot(link.child).is_some_and(|lot| {
                    lot.material_id == material_id && lot.warehouse_id == warehouse_id
                })
            })
            .copied()
            .collect())
    }

    fn commit(&self, changeset: LotChangeset) -> Result<CommitReceipt, StoreError> {
        let mut tables = self.write()?;

        // 1) Validate everything before the first write.
        for (id, expected) in &changeset.expected {
            let lot = tables
                .lot(*id)
                .ok_or_else(|| StoreError::InvalidChangeset(format!("unknown lot {id}")))?;
            if !expected.matches(lot.version) {
                return Err(StoreError::Concurrency(format!(
                    "lot {id}: expected {expected}, found {}",
                    lot.version
                )));
            }
        }
        for update in &changeset.updates {
            if !changeset.touched_lots().any(|id| id == update.lot_id) {
                return Err(StoreError::InvalidChangeset(format!(
                    "update of lot {} without an expected version",
                    update.lot_id
                )));
            }
        }
        for pending in &changeset.created {
            if let Some(parent) = pending.parent_lot_id {
                if tables.lot(parent).is_none() {
                    return Err(StoreError::InvalidChangeset(format!(
                        "unknown parent lot {parent}"
                    )));
                }
            }
        }
        let refs = changeset
            .links
            .iter()
            .map(|l| l.child)
            .chain(changeset.history.iter().map(|h| h.lot));
        for lot_ref in refs {
            let known = match lot_ref {
                LotRef::Existing(id) => tables.lot(id).is_some(),
                LotRef::Created(idx) => idx < changeset.created.len(),
            };
            if !known {
                return Err(StoreError::InvalidChangeset(format!(
                    "dangling lot reference {lot_ref:?}"
                )));
            }
        }

        let mut next_lot_id = Tables::next_id(tables.lots.len())?;
        let mut next_history_id = Tables::next_id(tables.history.len())?;

        // 2) Apply.
        let mut receipt = CommitReceipt::default();
        let created_on = changeset.occurred_at.date_naive();

        for pending in &changeset.created {
            let id = LotId::new(next_lot_id);
            next_lot_id += 1;
            let lot = Lot {
                id,
                lot_number: LotNumber::generate(&self.lot_prefix, created_on, id),
                material_id: pending.material_id,
                warehouse_id: pending.warehouse_id,
                quantity: pending.quantity,
                reservation: Default::default(),
                manufacture_date: pending.manufacture_date,
                expiry_date: pending.expiry_date,
                parent_lot_id: pending.parent_lot_id,
                created_at: changeset.occurred_at,
                version: 1,
            };
            tables.lots.push(lot.clone());
            receipt.created.push(lot);
        }

        let resolve = |lot_ref: LotRef, created: &[Lot]| match lot_ref {
            LotRef::Existing(id) => id,
            LotRef::Created(idx) => created[idx].id,
        };

        for update in &changeset.updates {
            let lot = tables.lot_mut(update.lot_id).ok_or_else(|| {
                StoreError::InvalidChangeset(format!("unknown lot {}", update.lot_id))
            })?;
            lot.quantity = update.quantity;
            lot.reservation = update.reservation;
            lot.version += 1;
            receipt.updated.push(lot.clone());
        }

        for pending in &changeset.links {
            let link = LineageLink {
                parent: pending.parent,
                child: resolve(pending.child, &receipt.created),
                kind: pending.kind,
            };
            tables.links.push(link);
            receipt.links.push(link);
        }

        for pending in &changeset.history {
            let entry = LotHistoryEntry {
                id: next_history_id,
                lot_id: resolve(pending.lot, &receipt.created),
                kind: pending.kind,
                timestamp: changeset.occurred_at,
                actor: changeset.actor,
                quantity_before: pending.quantity_before,
                quantity_after: pending.quantity_after,
                note: changeset.note.clone(),
            };
            next_history_id += 1;
            tables.history.push(entry.clone());
            receipt.history.push(entry);
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lotkeeper_core::{ExpectedVersion, Quantity, UserId};
    use lotkeeper_lots::{HistoryKind, LinkKind, LotUpdate, PendingLot, ReservationState};
    use rust_decimal_macros::dec;

    fn pending(material_id: MaterialId, warehouse_id: WarehouseId, parent: Option<LotId>) -> PendingLot {
        PendingLot {
            material_id,
            warehouse_id,
            quantity: Quantity::new(dec!(10)).unwrap(),
            manufacture_date: None,
            expiry_date: None,
            parent_lot_id: parent,
        }
    }

    fn seed(store: &InMemoryLotStore) -> Lot {
        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), None);
        let lot = changes.create(pending(MaterialId::new(), WarehouseId::new(), None));
        changes.record(lot, HistoryKind::Create, Quantity::ZERO, Quantity::new(dec!(10)).unwrap());
        store.commit(changes).unwrap().created.remove(0)
    }

    #[test]
    fn commit_assigns_sequential_ids_and_lot_numbers() {
        let store = InMemoryLotStore::with_prefix("WH");
        let first = seed(&store);
        let second = seed(&store);

        assert_eq!(first.id, LotId::new(1));
        assert_eq!(second.id, LotId::new(2));
        assert!(second.lot_number.as_str().starts_with("WH-"));
        assert!(second.lot_number.as_str().ends_with("-000002"));
        assert_eq!(first.version, 1);
    }

    #[test]
    fn stale_version_aborts_without_writes() {
        let store = InMemoryLotStore::new();
        let lot = seed(&store);

        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), None);
        changes.expected.push((lot.id, ExpectedVersion::exact(lot.version + 1)));
        changes.updates.push(LotUpdate {
            lot_id: lot.id,
            quantity: Quantity::ZERO,
            reservation: ReservationState::Available,
        });
        let child = changes.create(pending(lot.material_id, lot.warehouse_id, Some(lot.id)));
        changes.link(lot.id, child, LinkKind::Split);

        let err = store.commit(changes).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        assert_eq!(store.get_lot(lot.id).unwrap().unwrap(), lot);
        assert!(store.get_lot(LotId::new(2)).unwrap().is_none());
        assert!(store.lineage_links(lot.material_id, lot.warehouse_id).unwrap().is_empty());
    }

    #[test]
    fn update_without_expected_version_is_rejected() {
        let store = InMemoryLotStore::new();
        let lot = seed(&store);

        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), None);
        changes.updates.push(LotUpdate {
            lot_id: lot.id,
            quantity: Quantity::ZERO,
            reservation: ReservationState::Available,
        });

        let err = store.commit(changes).unwrap_err();
        assert!(matches!(err, StoreError::InvalidChangeset(_)));
        assert_eq!(store.get_lot(lot.id).unwrap().unwrap().quantity, lot.quantity);
    }

    #[test]
    fn successful_update_bumps_version_and_appends_history() {
        let store = InMemoryLotStore::new();
        let lot = seed(&store);

        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), Some("count".into()));
        changes.update(&lot, Quantity::new(dec!(4)).unwrap(), ReservationState::Available);
        changes.record(
            LotRef::Existing(lot.id),
            HistoryKind::Split,
            lot.quantity,
            Quantity::new(dec!(4)).unwrap(),
        );
        let receipt = store.commit(changes).unwrap();

        assert_eq!(receipt.updated[0].version, 2);
        let history = store.history(lot.id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].id < history[1].id);
        assert_eq!(history[1].note.as_deref(), Some("count"));
    }

    #[test]
    fn stocked_lots_skip_exhausted_and_filter_warehouse() {
        let store = InMemoryLotStore::new();
        let a = seed(&store);
        let b = seed(&store);

        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), None);
        changes.update(&b, Quantity::ZERO, ReservationState::Available);
        store.commit(changes).unwrap();

        let all: Vec<_> = store.stocked_lots(None).unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(all, vec![a.id]);
        assert!(store.stocked_lots(Some(WarehouseId::new())).unwrap().is_empty());
    }
}
