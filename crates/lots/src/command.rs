//! Command decision contract.

use std::collections::BTreeMap;

use lotkeeper_core::LotId;

use crate::changeset::LotChangeset;
use crate::error::{LotError, LotResult};
use crate::lot::Lot;

/// Consistent, versioned view of the lots a command reads.
#[derive(Debug, Clone, Default)]
pub struct LotSnapshot {
    lots: BTreeMap<LotId, Lot>,
}

impl LotSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lots<I>(lots: I) -> Self
    where
        I: IntoIterator<Item = Lot>,
    {
        Self {
            lots: lots.into_iter().map(|lot| (lot.id, lot)).collect(),
        }
    }

    pub fn insert(&mut self, lot: Lot) {
        self.lots.insert(lot.id, lot);
    }

    /// The lot with `lot_id`, or [`LotError::NotFound`].
    pub fn get(&self, lot_id: LotId) -> LotResult<&Lot> {
        self.lots.get(&lot_id).ok_or(LotError::NotFound(lot_id))
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// A lot-mutating operation expressed as pure decision logic.
///
/// - `lot_ids` names the lots to load before deciding.
/// - `decide` validates preconditions in order (first failure wins) and
///   returns the complete changeset. It must not perform IO.
///
/// Deciding twice on the same snapshot yields the same changeset, which is
/// what makes retry-on-conflict safe.
pub trait LotCommand: core::fmt::Debug {
    fn lot_ids(&self) -> Vec<LotId>;

    fn decide(&self, snapshot: &LotSnapshot) -> LotResult<LotChangeset>;
}
