//! Registration of lots produced by the stock-receipt process.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotkeeper_core::{LotId, MaterialId, Quantity, UserId, WarehouseId};

use crate::changeset::{LotChangeset, PendingLot};
use crate::command::{LotCommand, LotSnapshot};
use crate::error::{LotError, LotResult};
use crate::history::HistoryKind;

/// Command: ReceiveLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub material_id: MaterialId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LotCommand for ReceiveLot {
    fn lot_ids(&self) -> Vec<LotId> {
        Vec::new()
    }

    fn decide(&self, _snapshot: &LotSnapshot) -> LotResult<LotChangeset> {
        if self.quantity <= Decimal::ZERO {
            return Err(LotError::invalid_quantity(format!(
                "received quantity must be positive (got {})",
                self.quantity
            )));
        }
        let quantity = Quantity::new(self.quantity)?;

        if let (Some(made), Some(expires)) = (self.manufacture_date, self.expiry_date) {
            if expires < made {
                return Err(LotError::invalid_operation(format!(
                    "expiry date {expires} precedes manufacture date {made}"
                )));
            }
        }

        let mut changes = LotChangeset::new(self.actor, self.occurred_at, self.note.clone());
        let lot = changes.create(PendingLot {
            material_id: self.material_id,
            warehouse_id: self.warehouse_id,
            quantity,
            manufacture_date: self.manufacture_date,
            expiry_date: self.expiry_date,
            parent_lot_id: None,
        });
        changes.record(lot, HistoryKind::Create, Quantity::ZERO, quantity);
        Ok(changes)
    }
}
