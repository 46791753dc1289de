//! Reservation state machine.
//!
//! ```text
//! Available --reserve(issue)--> Reserved(issue)
//! Reserved(_) --release-->      Available
//! ```
//!
//! Reservations always hold the whole lot. Reserving part of a lot is done by
//! splitting first and reserving the child; a partial request is rejected.
//! Releasing a lot that is not reserved is an error, not a no-op.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotkeeper_core::{IssueId, LotId, Quantity, UserId};

use crate::changeset::{LotChangeset, LotRef};
use crate::command::{LotCommand, LotSnapshot};
use crate::error::{LotError, LotResult};
use crate::history::HistoryKind;
use crate::lot::ReservationState;

/// Command: ReserveLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveLot {
    pub lot_id: LotId,
    pub quantity: Decimal,
    pub issue_id: IssueId,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLot {
    pub lot_id: LotId,
    pub actor: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LotCommand for ReserveLot {
    fn lot_ids(&self) -> Vec<LotId> {
        vec![self.lot_id]
    }

    fn decide(&self, snapshot: &LotSnapshot) -> LotResult<LotChangeset> {
        let lot = snapshot.get(self.lot_id)?;

        if lot.is_reserved() {
            return Err(LotError::ReservedConflict(lot.id));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(LotError::invalid_quantity(format!(
                "reserved quantity must be positive (got {})",
                self.quantity
            )));
        }
        let requested = Quantity::new(self.quantity)?;
        if requested > lot.quantity {
            return Err(LotError::InsufficientQuantity {
                requested,
                available: lot.quantity,
            });
        }
        if requested < lot.quantity {
            return Err(LotError::invalid_operation(format!(
                "partial reservation of lot {} ({requested} of {}); split the lot first",
                lot.id, lot.quantity
            )));
        }

        let mut changes = LotChangeset::new(self.actor, self.occurred_at, self.note.clone());
        changes.update(
            lot,
            lot.quantity,
            ReservationState::Reserved {
                issue_id: self.issue_id,
            },
        );
        changes.record(
            LotRef::Existing(lot.id),
            HistoryKind::Reserve,
            lot.quantity,
            lot.quantity,
        );
        Ok(changes)
    }
}

impl LotCommand for ReleaseLot {
    fn lot_ids(&self) -> Vec<LotId> {
        vec![self.lot_id]
    }

    fn decide(&self, snapshot: &LotSnapshot) -> LotResult<LotChangeset> {
        let lot = snapshot.get(self.lot_id)?;

        if !lot.is_reserved() {
            return Err(LotError::NotReserved(lot.id));
        }

        let mut changes = LotChangeset::new(self.actor, self.occurred_at, self.note.clone());
        changes.update(lot, lot.quantity, ReservationState::Available);
        changes.record(
            LotRef::Existing(lot.id),
            HistoryKind::Release,
            lot.quantity,
            lot.quantity,
        );
        Ok(changes)
    }
}
