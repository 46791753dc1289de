//! The unit of atomic commit.
//!
//! A decision engine never writes. It returns a [`LotChangeset`] describing
//! every write one operation needs; the lot store applies all of it in one
//! transaction or none of it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotkeeper_core::{ExpectedVersion, LotId, MaterialId, Quantity, UserId, WarehouseId};

use crate::history::{HistoryKind, LotHistoryEntry};
use crate::lineage::{LineageLink, LinkKind};
use crate::lot::{Lot, ReservationState};

/// Reference to a lot that may not have an identity yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotRef {
    Existing(LotId),
    /// Index into [`LotChangeset::created`].
    Created(usize),
}

/// New state for an existing lot. The store bumps its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotUpdate {
    pub lot_id: LotId,
    pub quantity: Quantity,
    pub reservation: ReservationState,
}

/// A lot to insert. The store assigns its id and lot number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLot {
    pub material_id: MaterialId,
    pub warehouse_id: WarehouseId,
    pub quantity: Quantity,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub parent_lot_id: Option<LotId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLink {
    pub parent: LotId,
    pub child: LotRef,
    pub kind: LinkKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHistory {
    pub lot: LotRef,
    pub kind: HistoryKind,
    pub quantity_before: Quantity,
    pub quantity_after: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotChangeset {
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub note: Option<String>,
    /// Versions every decision was based on; a stale one aborts the commit.
    pub expected: Vec<(LotId, ExpectedVersion)>,
    pub updates: Vec<LotUpdate>,
    pub created: Vec<PendingLot>,
    pub links: Vec<PendingLink>,
    pub history: Vec<PendingHistory>,
}

impl LotChangeset {
    pub fn new(actor: UserId, occurred_at: DateTime<Utc>, note: Option<String>) -> Self {
        Self {
            actor,
            occurred_at,
            note,
            expected: Vec::new(),
            updates: Vec::new(),
            created: Vec::new(),
            links: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Record that the decision read `lot` at its current version.
    pub fn expect(&mut self, lot: &Lot) {
        if !self.expected.iter().any(|(id, _)| *id == lot.id) {
            self.expected
                .push((lot.id, ExpectedVersion::exact(lot.version)));
        }
    }

    pub fn update(&mut self, lot: &Lot, quantity: Quantity, reservation: ReservationState) {
        self.expect(lot);
        self.updates.push(LotUpdate {
            lot_id: lot.id,
            quantity,
            reservation,
        });
    }

    /// Queue a new lot and return a reference usable by links and history.
    pub fn create(&mut self, lot: PendingLot) -> LotRef {
        self.created.push(lot);
        LotRef::Created(self.created.len() - 1)
    }

    pub fn link(&mut self, parent: LotId, child: LotRef, kind: LinkKind) {
        self.links.push(PendingLink {
            parent,
            child,
            kind,
        });
    }

    pub fn record(
        &mut self,
        lot: LotRef,
        kind: HistoryKind,
        quantity_before: Quantity,
        quantity_after: Quantity,
    ) {
        self.history.push(PendingHistory {
            lot,
            kind,
            quantity_before,
            quantity_after,
        });
    }

    /// Ids of existing lots this changeset touches.
    pub fn touched_lots(&self) -> impl Iterator<Item = LotId> + '_ {
        self.expected.iter().map(|(id, _)| *id)
    }
}

/// What a successful commit wrote, with store-assigned identities filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Newly inserted lots, in [`LotChangeset::created`] order.
    pub created: Vec<Lot>,
    /// Existing lots after the update, in [`LotChangeset::updates`] order.
    pub updated: Vec<Lot>,
    pub links: Vec<LineageLink>,
    pub history: Vec<LotHistoryEntry>,
}
