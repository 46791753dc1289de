//! Merge engine: M compatible lots collapsed into one new lot.
//!
//! Date policy when sources disagree: the merged lot takes the earliest
//! expiry date and the earliest manufacture date found among its sources.
//! Sources without a date are ignored; if none has one, the result has none.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{LotId, Quantity, UserId};

use crate::changeset::{LotChangeset, LotRef, PendingLot};
use crate::command::{LotCommand, LotSnapshot};
use crate::error::{LotError, LotResult};
use crate::history::HistoryKind;
use crate::lineage::LinkKind;
use crate::lot::Lot;

/// Command: MergeLots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeLots {
    /// Duplicates are ignored; order of first appearance is kept.
    pub lot_ids: Vec<LotId>,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl MergeLots {
    fn distinct_ids(&self) -> Vec<LotId> {
        let mut ids = Vec::with_capacity(self.lot_ids.len());
        for id in &self.lot_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }
}

impl LotCommand for MergeLots {
    fn lot_ids(&self) -> Vec<LotId> {
        self.distinct_ids()
    }

    fn decide(&self, snapshot: &LotSnapshot) -> LotResult<LotChangeset> {
        let ids = self.distinct_ids();
        if ids.len() < 2 {
            return Err(LotError::invalid_operation(
                "merge requires at least two distinct lots",
            ));
        }

        let sources = ids
            .iter()
            .map(|&id| snapshot.get(id))
            .collect::<LotResult<Vec<&Lot>>>()?;

        let first = sources[0];
        if let Some(odd) = sources.iter().find(|lot| !lot.is_compatible_with(first)) {
            return Err(LotError::IncompatibleMerge {
                lot_id: odd.id,
                material_id: odd.material_id,
                warehouse_id: odd.warehouse_id,
            });
        }
        if let Some(held) = sources.iter().find(|lot| lot.is_reserved()) {
            return Err(LotError::ReservedConflict(held.id));
        }
        if let Some(empty) = sources.iter().find(|lot| lot.is_exhausted()) {
            return Err(LotError::EmptyLot(empty.id));
        }

        let total = Quantity::checked_sum(sources.iter().map(|lot| lot.quantity))
            .ok_or_else(|| LotError::invalid_quantity("merged total cannot be represented exactly"))?;
        let (manufacture_date, expiry_date) = merged_dates(&sources);

        let mut changes = LotChangeset::new(self.actor, self.occurred_at, self.note.clone());
        for source in &sources {
            changes.update(source, Quantity::ZERO, source.reservation);
            changes.record(
                LotRef::Existing(source.id),
                HistoryKind::Merge,
                source.quantity,
                Quantity::ZERO,
            );
        }

        let target = changes.create(PendingLot {
            material_id: first.material_id,
            warehouse_id: first.warehouse_id,
            quantity: total,
            manufacture_date,
            expiry_date,
            parent_lot_id: None,
        });
        for source in &sources {
            changes.link(source.id, target, LinkKind::Merge);
        }
        changes.record(target, HistoryKind::Merge, Quantity::ZERO, total);

        Ok(changes)
    }
}

/// `(manufacture_date, expiry_date)` for a lot merged from `sources`.
pub fn merged_dates(sources: &[&Lot]) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let manufacture = sources.iter().filter_map(|lot| lot.manufacture_date).min();
    let expiry = sources.iter().filter_map(|lot| lot.expiry_date).min();
    (manufacture, expiry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor, date, lot, reserved};
    use lotkeeper_core::{MaterialId, WarehouseId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn merge(ids: &[u64]) -> MergeLots {
        MergeLots {
            lot_ids: ids.iter().copied().map(LotId::new).collect(),
            actor: actor(),
            note: Some("consolidate bin 4".to_string()),
            occurred_at: Utc::now(),
        }
    }

    fn pair(a: Decimal, b: Decimal) -> LotSnapshot {
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        LotSnapshot::from_lots([lot(2, a, material, warehouse), lot(3, b, material, warehouse)])
    }

    #[test]
    fn merge_twenty_and_thirty_into_fifty() {
        let changes = merge(&[2, 3]).decide(&pair(dec!(20), dec!(30))).unwrap();

        assert_eq!(changes.created.len(), 1);
        assert_eq!(changes.created[0].quantity.value(), dec!(50));
        assert_eq!(changes.created[0].parent_lot_id, None);
        assert!(changes.updates.iter().all(|u| u.quantity == Quantity::ZERO));
        assert_eq!(changes.updates.len(), 2);
        assert_eq!(changes.links.len(), 2);
        assert!(changes.links.iter().all(|l| l.child == LotRef::Created(0)));
        assert_eq!(changes.history.len(), 3);
        assert_eq!(changes.history[2].quantity_after.value(), dec!(50));
    }

    #[test]
    fn duplicate_ids_collapse_and_need_two_distinct() {
        let err = merge(&[2, 2]).decide(&pair(dec!(1), dec!(1))).unwrap_err();
        assert!(matches!(err, LotError::InvalidOperation(_)));
        assert_eq!(merge(&[2, 3, 2]).lot_ids(), vec![LotId::new(2), LotId::new(3)]);
    }

    #[test]
    fn missing_source_is_not_found() {
        let err = merge(&[2, 9]).decide(&pair(dec!(1), dec!(1))).unwrap_err();
        assert_eq!(err, LotError::NotFound(LotId::new(9)));
    }

    #[test]
    fn different_material_or_warehouse_is_incompatible() {
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        let snapshot = LotSnapshot::from_lots([
            lot(1, dec!(5), material, warehouse),
            lot(2, dec!(5), MaterialId::new(), warehouse),
            lot(3, dec!(5), material, WarehouseId::new()),
        ]);

        for ids in [[1, 2], [1, 3]] {
            let err = merge(&ids).decide(&snapshot).unwrap_err();
            assert!(matches!(err, LotError::IncompatibleMerge { lot_id, .. } if lot_id == LotId::new(ids[1])));
        }
    }

    #[test]
    fn reserved_source_conflicts() {
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        let snapshot = LotSnapshot::from_lots([
            lot(1, dec!(5), material, warehouse),
            reserved(lot(2, dec!(5), material, warehouse), 11),
        ]);
        let err = merge(&[1, 2]).decide(&snapshot).unwrap_err();
        assert_eq!(err, LotError::ReservedConflict(LotId::new(2)));
    }

    #[test]
    fn exhausted_source_is_empty_lot() {
        let err = merge(&[2, 3]).decide(&pair(dec!(4), dec!(0))).unwrap_err();
        assert_eq!(err, LotError::EmptyLot(LotId::new(3)));
    }

    #[test]
    fn merged_lot_takes_earliest_dates() {
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        let mut a = lot(1, dec!(1), material, warehouse);
        a.manufacture_date = Some(date(2024, 3, 1));
        a.expiry_date = Some(date(2024, 9, 1));
        let mut b = lot(2, dec!(1), material, warehouse);
        b.manufacture_date = Some(date(2024, 2, 1));
        b.expiry_date = None;
        let mut c = lot(3, dec!(1), material, warehouse);
        c.manufacture_date = None;
        c.expiry_date = Some(date(2024, 8, 15));

        let changes = merge(&[1, 2, 3])
            .decide(&LotSnapshot::from_lots([a, b, c]))
            .unwrap();

        assert_eq!(changes.created[0].manufacture_date, Some(date(2024, 2, 1)));
        assert_eq!(changes.created[0].expiry_date, Some(date(2024, 8, 15)));
    }

    #[test]
    fn merged_lot_without_any_dates_has_none() {
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();
        let mut a = lot(1, dec!(1), material, warehouse);
        let mut b = lot(2, dec!(1), material, warehouse);
        for l in [&mut a, &mut b] {
            l.manufacture_date = None;
            l.expiry_date = None;
        }
        assert_eq!(merged_dates(&[&a, &b]), (None, None));
    }

    #[test]
    fn merge_that_would_round_away_a_source_is_rejected() {
        let err = merge(&[2, 3])
            .decide(&pair(dec!(10000000000), Decimal::new(1, 28)))
            .unwrap_err();
        assert!(matches!(err, LotError::InvalidQuantity(_)));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        /// `value` as an integer count of 1e-28 units; no rounding involved.
        fn units(value: Decimal) -> Option<i128> {
            let shift = 28u32.checked_sub(value.scale())?;
            value.mantissa().checked_mul(10i128.checked_pow(shift)?)
        }

        proptest! {
            /// Property: merged quantity equals the sum of its sources; every source ends at zero.
            #[test]
            fn merge_conserves_quantity(raw in prop::collection::vec(1i64..=1_000_000, 2..6)) {
                let material = MaterialId::new();
                let warehouse = WarehouseId::new();
                let lots: Vec<_> = raw
                    .iter()
                    .enumerate()
                    .map(|(i, r)| lot(i as u64 + 1, Decimal::new(*r, 2), material, warehouse))
                    .collect();
                let before: Decimal = lots.iter().map(|l| l.quantity.value()).sum();
                let ids: Vec<u64> = (1..=lots.len() as u64).collect();

                let changes = merge(&ids).decide(&LotSnapshot::from_lots(lots)).unwrap();

                prop_assert_eq!(changes.created[0].quantity.value(), before);
                prop_assert!(changes.updates.iter().all(|u| u.quantity.is_zero()));
            }

            /// Property: with scales anywhere in 0..=28 the merged lot holds
            /// exactly the sum of its sources, or the merge is refused.
            #[test]
            fn merge_is_exact_across_mixed_scales(
                raw in prop::collection::vec((1i64..=1_000_000_000, 0u32..=28), 2..6),
            ) {
                let material = MaterialId::new();
                let warehouse = WarehouseId::new();
                let quantities: Vec<Decimal> =
                    raw.iter().map(|(r, scale)| Decimal::new(*r, *scale)).collect();
                let lots: Vec<_> = quantities
                    .iter()
                    .enumerate()
                    .map(|(i, q)| lot(i as u64 + 1, *q, material, warehouse))
                    .collect();
                let ids: Vec<u64> = (1..=lots.len() as u64).collect();

                match merge(&ids).decide(&LotSnapshot::from_lots(lots)) {
                    Ok(changes) => {
                        let sources: Option<i128> = quantities
                            .iter()
                            .try_fold(0i128, |acc, q| acc.checked_add(units(*q)?));
                        prop_assert_eq!(units(changes.created[0].quantity.value()), sources);
                    }
                    Err(err) => {
                        let is_precision = matches!(err, LotError::InvalidQuantity(_));
                        prop_assert!(is_precision, "unexpected rejection: {err}");
                    }
                }
            }
        }
    }
}
