//! Split engine: one lot into N children, quantity conserved exactly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotkeeper_core::{LotId, Quantity, UserId};

use crate::changeset::{LotChangeset, LotRef, PendingLot};
use crate::command::{LotCommand, LotSnapshot};
use crate::error::{LotError, LotResult};
use crate::history::HistoryKind;
use crate::lineage::LinkKind;

/// Command: SplitLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitLot {
    pub lot_id: LotId,
    /// One entry per child lot, in output order.
    pub quantities: Vec<Decimal>,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LotCommand for SplitLot {
    fn lot_ids(&self) -> Vec<LotId> {
        vec![self.lot_id]
    }

    fn decide(&self, snapshot: &LotSnapshot) -> LotResult<LotChangeset> {
        let parent = snapshot.get(self.lot_id)?;

        if parent.is_reserved() {
            return Err(LotError::ReservedConflict(parent.id));
        }
        if self.quantities.is_empty() {
            return Err(LotError::invalid_operation("split requires at least one quantity"));
        }

        let amounts = self
            .quantities
            .iter()
            .map(|&amount| positive(amount))
            .collect::<LotResult<Vec<_>>>()?;

        let requested = Quantity::checked_sum(amounts.iter().copied()).ok_or_else(|| {
            LotError::invalid_quantity("split total cannot be represented exactly")
        })?;
        if requested > parent.quantity {
            return Err(LotError::InsufficientQuantity {
                requested,
                available: parent.quantity,
            });
        }
        let remaining = parent.quantity.checked_sub(requested).ok_or_else(|| {
            LotError::invalid_quantity(format!(
                "{} minus {requested} cannot be represented exactly",
                parent.quantity
            ))
        })?;

        let mut changes = LotChangeset::new(self.actor, self.occurred_at, self.note.clone());
        changes.update(parent, remaining, parent.reservation);
        changes.record(
            LotRef::Existing(parent.id),
            HistoryKind::Split,
            parent.quantity,
            remaining,
        );

        for amount in amounts {
            let child = changes.create(PendingLot {
                material_id: parent.material_id,
                warehouse_id: parent.warehouse_id,
                quantity: amount,
                manufacture_date: parent.manufacture_date,
                expiry_date: parent.expiry_date,
                parent_lot_id: Some(parent.id),
            });
            changes.link(parent.id, child, LinkKind::Split);
            changes.record(child, HistoryKind::Split, Quantity::ZERO, amount);
        }

        Ok(changes)
    }
}

fn positive(amount: Decimal) -> LotResult<Quantity> {
    if amount <= Decimal::ZERO {
        return Err(LotError::invalid_quantity(format!(
            "split amounts must be positive (got {amount})"
        )));
    }
    Ok(Quantity::new(amount)?)
}
