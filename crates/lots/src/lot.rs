use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{IssueId, LotId, MaterialId, Quantity, WarehouseId};

/// Human-readable lot code (e.g. `LOT-20240601-000042`).
///
/// Display only: lineage is keyed by [`LotId`], never by this code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotNumber(String);

impl LotNumber {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `{prefix}-{YYYYMMDD}-{id:06}`. Unique because the id is.
    pub fn generate(prefix: &str, created_on: NaiveDate, id: LotId) -> Self {
        Self(format!(
            "{}-{}-{:06}",
            prefix,
            created_on.format("%Y%m%d"),
            id.get()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for LotNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reservation state machine: `Available <-> Reserved(issue)`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReservationState {
    #[default]
    Available,
    Reserved { issue_id: IssueId },
}

impl ReservationState {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReservationState::Reserved { .. })
    }

    pub fn issue_id(&self) -> Option<IssueId> {
        match self {
            ReservationState::Available => None,
            ReservationState::Reserved { issue_id } => Some(*issue_id),
        }
    }
}

/// A quantity of one material in one warehouse, traceable as a unit.
///
/// Lots are never deleted. A lot consumed by a split or merge stays at
/// `quantity == 0` for audit and lineage queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub lot_number: LotNumber,
    pub material_id: MaterialId,
    pub warehouse_id: WarehouseId,
    pub quantity: Quantity,
    pub reservation: ReservationState,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    /// Split parent. Merge sources are recorded as lineage links instead.
    pub parent_lot_id: Option<LotId>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Lot {
    pub fn is_reserved(&self) -> bool {
        self.reservation.is_reserved()
    }

    pub fn reserved_for(&self) -> Option<IssueId> {
        self.reservation.issue_id()
    }

    pub fn is_exhausted(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Same material in the same warehouse.
    pub fn is_compatible_with(&self, other: &Lot) -> bool {
        self.material_id == other.material_id && self.warehouse_id == other.warehouse_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_number_is_zero_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let number = LotNumber::generate("LOT", date, LotId::new(42));
        assert_eq!(number.as_str(), "LOT-20240601-000042");
    }

    #[test]
    fn reservation_state_serializes_tagged() {
        let state = ReservationState::Reserved {
            issue_id: IssueId::new(7),
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["state"], "reserved");
        assert_eq!(json["issue_id"], 7);
        assert_eq!(state.issue_id(), Some(IssueId::new(7)));
        assert!(!ReservationState::Available.is_reserved());
    }
}
