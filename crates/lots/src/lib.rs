//! Lot management domain.
//!
//! Business rules for traceable inventory lots, implemented purely as
//! deterministic decision logic (no IO, no storage). Every mutating operation
//! is a [`LotCommand`]: it reads a [`LotSnapshot`] and either rejects with a
//! [`LotError`] or returns a [`LotChangeset`] that a lot store commits
//! atomically.

pub mod changeset;
pub mod command;
pub mod error;
pub mod expiry;
pub mod history;
pub mod lineage;
pub mod lot;
pub mod merge;
pub mod receipt;
pub mod reservation;
pub mod split;

pub use changeset::{
    CommitReceipt, LotChangeset, LotRef, LotUpdate, PendingHistory, PendingLink, PendingLot,
};
pub use command::{LotCommand, LotSnapshot};
pub use error::{LotError, LotResult};
pub use expiry::{ExpiryPolicy, ExpiryStatus, classify};
pub use history::{HistoryKind, LotHistoryEntry};
pub use lineage::{LineageGraph, LineageLink, LinkKind};
pub use lot::{Lot, LotNumber, ReservationState};
pub use merge::{MergeLots, merged_dates};
pub use receipt::ReceiveLot;
pub use reservation::{ReleaseLot, ReserveLot};
pub use split::SplitLot;

#[cfg(test)]
pub(crate) mod testing;
