//! Lot management service (application-level orchestration).
//!
//! ## Execution flow
//!
//! ```text
//! Operation
//!   ↓
//! 1. Authorize actor for the action
//!   ↓
//! 2. Load snapshot of the lots the command reads
//!   ↓
//! 3. Decide (pure; rejects or yields a changeset)
//!   ↓
//! 4. Commit changeset atomically (version-checked)
//!   │    └─ stale version → back to 2, up to `max_conflict_retries` times
//!   ↓
//! 5. Publish committed history entries on the event bus
//! ```
//!
//! Business rejections (step 3) never touch the store. Publication happens
//! strictly after the commit returns; a failed publish is logged and does not
//! undo the committed state.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use lotkeeper_core::{Clock, IssueId, LotId, MaterialId, SystemClock, UserId, WarehouseId};
use lotkeeper_events::EventBus;
use lotkeeper_lots::{
    CommitReceipt, ExpiryPolicy, ExpiryStatus, LineageGraph, Lot, LotCommand, LotError,
    LotHistoryEntry, MergeLots, ReceiveLot, ReleaseLot, ReserveLot, SplitLot,
};

use crate::authz::{AllowAll, LotAction, LotAuthorizer};
use crate::config::{DEFAULT_MAX_CONFLICT_RETRIES, LotkeeperConfig};
use crate::store::{LotStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Business-rule rejection; nothing was written.
    #[error(transparent)]
    Lot(#[from] LotError),

    #[error("actor {actor} is not allowed to perform {action}")]
    Unauthorized { actor: UserId, action: LotAction },

    /// Concurrent updates kept invalidating the decision.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// Stable machine-readable kind, for presentation layers.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Lot(err) => err.kind(),
            ServiceError::Unauthorized { .. } => "unauthorized",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Store(_) => "storage",
        }
    }

    /// The business rejection, if this is one.
    pub fn as_lot_error(&self) -> Option<&LotError> {
        match self {
            ServiceError::Lot(err) => Some(err),
            _ => None,
        }
    }
}

/// Input for registering a received lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotReceipt {
    pub material_id: MaterialId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub manufacture_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub note: Option<String>,
}

/// A lot annotated with its expiry status as of the service clock's today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotView {
    #[serde(flatten)]
    pub lot: Lot,
    pub expiry_status: ExpiryStatus,
}

/// Entry point for every lot operation.
///
/// - `S`: lot store (in-memory, Postgres, ...)
/// - `B`: event bus receiving committed history entries
pub struct LotService<S, B> {
    store: S,
    bus: B,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn LotAuthorizer>,
    expiry: ExpiryPolicy,
    max_conflict_retries: u32,
}

impl<S, B> core::fmt::Debug for LotService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LotService")
            .field("expiry", &self.expiry)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl<S, B> LotService<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            clock: Arc::new(SystemClock),
            authorizer: Arc::new(AllowAll),
            expiry: ExpiryPolicy::default(),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn LotAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_expiry_policy(mut self, expiry: ExpiryPolicy) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Apply the tunables from a loaded configuration.
    pub fn with_config(self, config: &LotkeeperConfig) -> Self {
        self.with_expiry_policy(config.expiry_policy())
            .with_max_conflict_retries(config.max_conflict_retries)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        self.expiry
    }

    /// Expiry status of `expiry_date` as of today.
    pub fn classify(&self, expiry_date: Option<NaiveDate>) -> ExpiryStatus {
        self.expiry.classify(expiry_date, self.clock.today())
    }

    fn view(&self, lot: Lot) -> LotView {
        let expiry_status = self.classify(lot.expiry_date);
        LotView { lot, expiry_status }
    }

    fn authorize(&self, actor: UserId, action: LotAction) -> Result<(), ServiceError> {
        self.authorizer.authorize(actor, action).map_err(|err| {
            debug!(%actor, %action, error = %err, "authorization denied");
            ServiceError::Unauthorized { actor, action }
        })
    }
}

impl<S, B> LotService<S, B>
where
    S: LotStore,
    B: EventBus<LotHistoryEntry>,
{
    /// Run one command through load → decide → commit → publish.
    fn execute<C>(&self, command: &C) -> Result<CommitReceipt, ServiceError>
    where
        C: LotCommand,
    {
        let lot_ids = command.lot_ids();
        let mut attempt: u32 = 0;

        loop {
            let snapshot = self.store.load_lots(&lot_ids)?;

            let changeset = command.decide(&snapshot).inspect_err(|err| {
                debug!(kind = err.kind(), error = %err, "lot operation rejected");
            })?;

            match self.store.commit(changeset) {
                Ok(receipt) => {
                    info!(
                        created = receipt.created.len(),
                        updated = receipt.updated.len(),
                        history = receipt.history.len(),
                        attempt,
                        "lot changes committed"
                    );
                    self.publish(&receipt);
                    return Ok(receipt);
                }
                Err(StoreError::Concurrency(msg)) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(attempt, reason = %msg, "lot changed concurrently; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn publish(&self, receipt: &CommitReceipt) {
        for entry in &receipt.history {
            if let Err(err) = self.bus.publish(entry.clone()) {
                warn!(lot_id = %entry.lot_id, kind = %entry.kind, error = ?err, "failed to publish lot event");
            }
        }
    }

    /// Register a lot produced by the stock-receipt process.
    #[instrument(skip(self, receipt), fields(actor = %actor, material_id = %receipt.material_id), err)]
    pub fn receive_lot(&self, actor: UserId, receipt: LotReceipt) -> Result<Lot, ServiceError> {
        self.authorize(actor, LotAction::Receive)?;
        let command = ReceiveLot {
            material_id: receipt.material_id,
            warehouse_id: receipt.warehouse_id,
            quantity: receipt.quantity,
            manufacture_date: receipt.manufacture_date,
            expiry_date: receipt.expiry_date,
            actor,
            note: receipt.note,
            occurred_at: self.clock.now(),
        };
        first(self.execute(&command)?.created)
    }

    /// Split a lot into children with the given quantities, in order.
    #[instrument(skip(self, quantities, note), fields(actor = %actor, lot_id = %lot_id), err)]
    pub fn split_lot(
        &self,
        actor: UserId,
        lot_id: LotId,
        quantities: Vec<Decimal>,
        note: Option<String>,
    ) -> Result<Vec<Lot>, ServiceError> {
        self.authorize(actor, LotAction::Split)?;
        let command = SplitLot {
            lot_id,
            quantities,
            actor,
            note,
            occurred_at: self.clock.now(),
        };
        Ok(self.execute(&command)?.created)
    }

    /// Merge compatible lots into one new lot.
    #[instrument(skip(self, lot_ids, note), fields(actor = %actor, lots = lot_ids.len()), err)]
    pub fn merge_lots(
        &self,
        actor: UserId,
        lot_ids: Vec<LotId>,
        note: Option<String>,
    ) -> Result<Lot, ServiceError> {
        self.authorize(actor, LotAction::Merge)?;
        let command = MergeLots {
            lot_ids,
            actor,
            note,
            occurred_at: self.clock.now(),
        };
        first(self.execute(&command)?.created)
    }

    #[instrument(skip(self, note), fields(actor = %actor, lot_id = %lot_id, issue_id = %issue_id), err)]
    pub fn reserve_lot(
        &self,
        actor: UserId,
        lot_id: LotId,
        quantity: Decimal,
        issue_id: IssueId,
        note: Option<String>,
    ) -> Result<Lot, ServiceError> {
        self.authorize(actor, LotAction::Reserve)?;
        let command = ReserveLot {
            lot_id,
            quantity,
            issue_id,
            actor,
            note,
            occurred_at: self.clock.now(),
        };
        first(self.execute(&command)?.updated)
    }

    #[instrument(skip(self, note), fields(actor = %actor, lot_id = %lot_id), err)]
    pub fn release_lot(
        &self,
        actor: UserId,
        lot_id: LotId,
        note: Option<String>,
    ) -> Result<Lot, ServiceError> {
        self.authorize(actor, LotAction::Release)?;
        let command = ReleaseLot {
            lot_id,
            actor,
            note,
            occurred_at: self.clock.now(),
        };
        first(self.execute(&command)?.updated)
    }

    pub fn get_lot(&self, actor: UserId, lot_id: LotId) -> Result<Lot, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        self.require_lot(lot_id)
    }

    fn require_lot(&self, lot_id: LotId) -> Result<Lot, ServiceError> {
        self.store
            .get_lot(lot_id)?
            .ok_or(ServiceError::Lot(LotError::NotFound(lot_id)))
    }

    /// History of a lot, oldest first.
    pub fn lot_history(
        &self,
        actor: UserId,
        lot_id: LotId,
    ) -> Result<Vec<LotHistoryEntry>, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        self.require_lot(lot_id)?;
        Ok(self.store.history(lot_id)?)
    }

    /// Every lot `lot_id` was derived from, nearest first.
    pub fn ancestors(&self, actor: UserId, lot_id: LotId) -> Result<Vec<LotId>, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        Ok(self.lineage_of(lot_id)?.ancestors(lot_id))
    }

    /// Every lot derived from `lot_id`, nearest first.
    pub fn descendants(&self, actor: UserId, lot_id: LotId) -> Result<Vec<LotId>, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        Ok(self.lineage_of(lot_id)?.descendants(lot_id))
    }

    fn lineage_of(&self, lot_id: LotId) -> Result<LineageGraph, ServiceError> {
        let lot = self.require_lot(lot_id)?;
        let links = self
            .store
            .lineage_links(lot.material_id, lot.warehouse_id)?;
        Ok(LineageGraph::new(links))
    }

    /// All lots of one material in one warehouse, including exhausted ones.
    pub fn list_lots(
        &self,
        actor: UserId,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LotView>, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        let lots = self.store.lots_by_material(material_id, warehouse_id)?;
        Ok(lots.into_iter().map(|lot| self.view(lot)).collect())
    }

    /// Stocked lots that are expired or expiring soon, earliest expiry first.
    pub fn list_expiring(
        &self,
        actor: UserId,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<LotView>, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        let mut views: Vec<LotView> = self
            .store
            .stocked_lots(warehouse_id)?
            .into_iter()
            .map(|lot| self.view(lot))
            .filter(|view| view.expiry_status.needs_attention())
            .collect();

        // Every remaining lot has an expiry date (None classifies Normal).
        views.sort_by_key(|view| (view.lot.expiry_date, view.lot.id));
        Ok(views)
    }

    /// Whether `split_lot` on this lot could succeed for some quantities.
    pub fn can_split(&self, actor: UserId, lot_id: LotId) -> Result<bool, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        Ok(self
            .store
            .get_lot(lot_id)?
            .is_some_and(|lot| !lot.is_reserved() && lot.quantity.is_positive()))
    }

    /// Whether `merge_lots` on these ids would pass every precondition right now.
    pub fn can_merge(&self, actor: UserId, lot_ids: &[LotId]) -> Result<bool, ServiceError> {
        self.authorize(actor, LotAction::Read)?;
        let candidate = MergeLots {
            lot_ids: lot_ids.to_vec(),
            actor,
            note: None,
            occurred_at: self.clock.now(),
        };
        let snapshot = self.store.load_lots(&candidate.lot_ids())?;
        Ok(candidate.decide(&snapshot).is_ok())
    }
}

fn first(lots: Vec<Lot>) -> Result<Lot, ServiceError> {
    lots.into_iter().next().ok_or_else(|| {
        ServiceError::Store(StoreError::Storage(
            "commit receipt is missing the affected lot".to_string(),
        ))
    })
}
