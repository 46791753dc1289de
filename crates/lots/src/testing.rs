//! Lot fixtures shared by the decision-engine tests.

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use lotkeeper_core::{IssueId, LotId, MaterialId, Quantity, UserId, WarehouseId};

use crate::lot::{Lot, LotNumber, ReservationState};

pub fn lot(id: u64, quantity: Decimal, material_id: MaterialId, warehouse_id: WarehouseId) -> Lot {
    let id = LotId::new(id);
    Lot {
        id,
        lot_number: LotNumber::generate("LOT", date(2024, 1, 1), id),
        material_id,
        warehouse_id,
        quantity: Quantity::new(quantity).unwrap(),
        reservation: ReservationState::Available,
        manufacture_date: Some(date(2024, 1, 1)),
        expiry_date: Some(date(2024, 12, 31)),
        parent_lot_id: None,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        version: 1,
    }
}

pub fn reserved(mut lot: Lot, issue: u64) -> Lot {
    lot.reservation = ReservationState::Reserved {
        issue_id: IssueId::new(issue),
    };
    lot
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn actor() -> UserId {
    UserId::new()
}
