//! Postgres-backed lot store.
//!
//! ## Locking
//!
//! `commit()` runs one SQL transaction. Every lot named in the changeset's
//! expected versions is locked with `SELECT ... FOR UPDATE` (in id order, so
//! concurrent commits cannot deadlock on each other) and its version compared
//! before anything is written. Updates are additionally guarded by
//! `WHERE version = $n`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Concurrency` |
//! | Database (serialization failure) | `40001` | `Concurrency` |
//! | Database (deadlock detected) | `40P01` | `Concurrency` |
//! | Database (check / foreign key) | `23514` / `23503` | `InvalidChangeset` |
//! | Anything else | - | `Storage` |

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::instrument;

use lotkeeper_core::{IssueId, LotId, MaterialId, Quantity, UserId, WarehouseId};
use lotkeeper_lots::{
    CommitReceipt, HistoryKind, LineageLink, LinkKind, Lot, LotChangeset, LotHistoryEntry,
    LotNumber, LotRef, LotSnapshot, ReservationState,
};

use super::{LotStore, StoreError};
use crate::config::LotkeeperConfig;

const MAX_CONNECTIONS: u32 = 10;

const LOT_COLUMNS: &str = "id, lot_number, material_id, warehouse_id, quantity, \
     reserved_for_issue_id, manufacture_date, expiry_date, parent_lot_id, created_at, version";

const HISTORY_COLUMNS: &str =
    "id, lot_id, kind, occurred_at, actor_id, quantity_before, quantity_after, note";

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS lots (
        id                    BIGSERIAL PRIMARY KEY,
        lot_number            TEXT NOT NULL UNIQUE,
        material_id           UUID NOT NULL,
        warehouse_id          UUID NOT NULL,
        quantity              NUMERIC NOT NULL CHECK (quantity >= 0),
        reserved_for_issue_id BIGINT NULL,
        manufacture_date      DATE NULL,
        expiry_date           DATE NULL,
        parent_lot_id         BIGINT NULL REFERENCES lots (id),
        created_at            TIMESTAMPTZ NOT NULL,
        version               BIGINT NOT NULL CHECK (version > 0)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS lots_material_warehouse_idx
        ON lots (material_id, warehouse_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lot_history (
        id              BIGSERIAL PRIMARY KEY,
        lot_id          BIGINT NOT NULL REFERENCES lots (id),
        kind            TEXT NOT NULL,
        occurred_at     TIMESTAMPTZ NOT NULL,
        actor_id        UUID NOT NULL,
        quantity_before NUMERIC NOT NULL,
        quantity_after  NUMERIC NOT NULL,
        note            TEXT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS lot_history_lot_idx ON lot_history (lot_id, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lot_lineage (
        parent_lot_id BIGINT NOT NULL REFERENCES lots (id),
        child_lot_id  BIGINT NOT NULL REFERENCES lots (id),
        kind          TEXT NOT NULL,
        PRIMARY KEY (parent_lot_id, child_lot_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS lot_lineage_child_idx ON lot_lineage (child_lot_id)
    "#,
];

/// Postgres-backed lot store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; every commit runs
/// in its own transaction.
#[derive(Debug, Clone)]
pub struct PostgresLotStore {
    pool: Arc<PgPool>,
    lot_prefix: String,
}

/// Connect using `DATABASE_URL` from the configuration and make sure the
/// schema exists.
pub async fn connect_from_config(config: &LotkeeperConfig) -> anyhow::Result<PostgresLotStore> {
    let url = config
        .database_url()
        .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    let store = PostgresLotStore::new(pool, config.lot_prefix.clone());
    store
        .ensure_schema()
        .await
        .context("failed to create lot tables")?;
    Ok(store)
}

impl PostgresLotStore {
    pub fn new(pool: PgPool, lot_prefix: impl Into<String>) -> Self {
        Self {
            pool: Arc::new(pool),
            lot_prefix: lot_prefix.into(),
        }
    }

    /// Create the lot tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    pub async fn load_lots_async(&self, ids: &[LotId]) -> Result<LotSnapshot, StoreError> {
        let ids = ids
            .iter()
            .map(|id| to_db(id.get()))
            .collect::<Result<Vec<i64>, _>>()?;
        let rows = sqlx::query(&format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_lots", e))?;

        let lots = rows.iter().map(lot_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(LotSnapshot::from_lots(lots))
    }

    pub async fn get_lot_async(&self, id: LotId) -> Result<Option<Lot>, StoreError> {
        let row = sqlx::query(&format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = $1"))
            .bind(to_db(id.get())?)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_lot", e))?;

        row.as_ref().map(lot_from_row).transpose()
    }

    pub async fn lots_by_material_async(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOT_COLUMNS} FROM lots \
             WHERE material_id = $1 AND warehouse_id = $2 ORDER BY id"
        ))
        .bind(material_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lots_by_material", e))?;

        rows.iter().map(lot_from_row).collect()
    }

    pub async fn stocked_lots_async(
        &self,
        warehouse_id: Option<WarehouseId>,
    ) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOT_COLUMNS} FROM lots \
             WHERE quantity > 0 AND ($1::uuid IS NULL OR warehouse_id = $1) ORDER BY id"
        ))
        .bind(warehouse_id.map(|w| *w.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("stocked_lots", e))?;

        rows.iter().map(lot_from_row).collect()
    }

    pub async fn history_async(&self, lot_id: LotId) -> Result<Vec<LotHistoryEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM lot_history WHERE lot_id = $1 ORDER BY id"
        ))
        .bind(to_db(lot_id.get())?)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(history_from_row).collect()
    }

    pub async fn lineage_links_async(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LineageLink>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT l.parent_lot_id, l.child_lot_id, l.kind
            FROM lot_lineage l
            JOIN lots c ON c.id = l.child_lot_id
            WHERE c.material_id = $1 AND c.warehouse_id = $2
            ORDER BY l.child_lot_id, l.parent_lot_id
            "#,
        )
        .bind(material_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("lineage_links", e))?;

        rows.iter()
            .map(|row| -> Result<LineageLink, StoreError> {
                let kind: String = row.try_get("kind").map_err(decode_error)?;
                Ok(LineageLink {
                    parent: lot_id(row.try_get("parent_lot_id").map_err(decode_error)?)?,
                    child: lot_id(row.try_get("child_lot_id").map_err(decode_error)?)?,
                    kind: LinkKind::parse(&kind).ok_or_else(|| {
                        StoreError::Storage(format!("unknown lineage kind '{kind}'"))
                    })?,
                })
            })
            .collect()
    }

    /// Apply a changeset in one transaction.
    #[instrument(
        skip(self, changeset),
        fields(
            expected = changeset.expected.len(),
            created = changeset.created.len(),
            history = changeset.history.len()
        ),
        err
    )]
    pub async fn commit_async(&self, changeset: LotChangeset) -> Result<CommitReceipt, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // 1) Lock and check every lot the decision read.
        let mut expected = changeset.expected.clone();
        expected.sort_by_key(|(id, _)| *id);
        for (id, version) in &expected {
            let current = lock_lot_version(&mut tx, *id).await?;
            let Some(current) = current else {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::InvalidChangeset(format!("unknown lot {id}")));
            };
            if !version.matches(current) {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Concurrency(format!(
                    "lot {id}: expected {version}, found {current}"
                )));
            }
        }

        let mut receipt = CommitReceipt::default();
        let created_on = changeset.occurred_at.date_naive();

        // 2) Insert created lots.
        for pending in &changeset.created {
            let raw_id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('lots', 'id'))")
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("next_lot_id", e))?;
            let id = lot_id(raw_id)?;
            let lot_number = LotNumber::generate(&self.lot_prefix, created_on, id);

            let row = sqlx::query(&format!(
                "INSERT INTO lots ({LOT_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, NULL, $6, $7, $8, $9, 1) \
                 RETURNING {LOT_COLUMNS}"
            ))
            .bind(raw_id)
            .bind(lot_number.as_str())
            .bind(pending.material_id.as_uuid())
            .bind(pending.warehouse_id.as_uuid())
            .bind(pending.quantity.value())
            .bind(pending.manufacture_date)
            .bind(pending.expiry_date)
            .bind(pending.parent_lot_id.map(|p| to_db(p.get())).transpose()?)
            .bind(changeset.occurred_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_lot", e))?;

            receipt.created.push(lot_from_row(&row)?);
        }

        // 3) Update existing lots.
        for update in &changeset.updates {
            let version = changeset
                .expected
                .iter()
                .find(|(id, _)| *id == update.lot_id)
                .map(|(_, v)| *v)
                .ok_or_else(|| {
                    StoreError::InvalidChangeset(format!(
                        "update of lot {} without an expected version",
                        update.lot_id
                    ))
                })?;
            let current = to_db(version.get())?;

            let row = sqlx::query(&format!(
                "UPDATE lots \
                 SET quantity = $2, reserved_for_issue_id = $3, version = version + 1 \
                 WHERE id = $1 AND version = $4 \
                 RETURNING {LOT_COLUMNS}"
            ))
            .bind(to_db(update.lot_id.get())?)
            .bind(update.quantity.value())
            .bind(update.reservation.issue_id().map(|i| to_db(i.get())).transpose()?)
            .bind(current)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_lot", e))?;

            let Some(row) = row else {
                tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Concurrency(format!(
                    "lot {} changed during commit",
                    update.lot_id
                )));
            };
            receipt.updated.push(lot_from_row(&row)?);
        }

        let resolve = |lot_ref: LotRef, created: &[Lot]| -> Result<LotId, StoreError> {
            match lot_ref {
                LotRef::Existing(id) => Ok(id),
                LotRef::Created(idx) => created.get(idx).map(|l| l.id).ok_or_else(|| {
                    StoreError::InvalidChangeset(format!("dangling lot reference {lot_ref:?}"))
                }),
            }
        };

        // 4) Lineage links.
        for pending in &changeset.links {
            let link = LineageLink {
                parent: pending.parent,
                child: resolve(pending.child, &receipt.created)?,
                kind: pending.kind,
            };
            sqlx::query(
                "INSERT INTO lot_lineage (parent_lot_id, child_lot_id, kind) VALUES ($1, $2, $3)",
            )
            .bind(to_db(link.parent.get())?)
            .bind(to_db(link.child.get())?)
            .bind(link.kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_lineage", e))?;
            receipt.links.push(link);
        }

        // 5) History.
        for pending in &changeset.history {
            let lot = resolve(pending.lot, &receipt.created)?;
            let row = sqlx::query(&format!(
                "INSERT INTO lot_history \
                 (lot_id, kind, occurred_at, actor_id, quantity_before, quantity_after, note) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 RETURNING {HISTORY_COLUMNS}"
            ))
            .bind(to_db(lot.get())?)
            .bind(pending.kind.as_str())
            .bind(changeset.occurred_at)
            .bind(changeset.actor.as_uuid())
            .bind(pending.quantity_before.value())
            .bind(pending.quantity_after.value())
            .bind(changeset.note.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_history", e))?;
            receipt.history.push(history_from_row(&row)?);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(receipt)
    }

    fn block_on<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        // The LotStore trait is synchronous; bridge onto the ambient tokio
        // runtime. block_in_place keeps the worker thread from stalling the
        // scheduler, and only exists on the multi-threaded runtime.
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Runtime(
                "PostgresLotStore requires a tokio runtime; call it from within one".to_string(),
            )
        })?;
        if matches!(handle.runtime_flavor(), RuntimeFlavor::CurrentThread) {
            return Err(StoreError::Runtime(
                "PostgresLotStore requires the multi-threaded tokio runtime".to_string(),
            ));
        }
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

impl LotStore for PostgresLotStore {
    fn load_lots(&self, ids: &[LotId]) -> Result<LotSnapshot, StoreError> {
        self.block_on(self.load_lots_async(ids))
    }

    fn get_lot(&self, id: LotId) -> Result<Option<Lot>, StoreError> {
        self.block_on(self.get_lot_async(id))
    }

    fn lots_by_material(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Lot>, StoreError> {
        self.block_on(self.lots_by_material_async(material_id, warehouse_id))
    }

    fn stocked_lots(&self, warehouse_id: Option<WarehouseId>) -> Result<Vec<Lot>, StoreError> {
        self.block_on(self.stocked_lots_async(warehouse_id))
    }

    fn history(&self, lot_id: LotId) -> Result<Vec<LotHistoryEntry>, StoreError> {
        self.block_on(self.history_async(lot_id))
    }

    fn lineage_links(
        &self,
        material_id: MaterialId,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<LineageLink>, StoreError> {
        self.block_on(self.lineage_links_async(material_id, warehouse_id))
    }

    fn commit(&self, changeset: LotChangeset) -> Result<CommitReceipt, StoreError> {
        self.block_on(self.commit_async(changeset))
    }
}

/// Lock one lot row for the rest of the transaction and read its version.
async fn lock_lot_version(
    tx: &mut Transaction<'_, Postgres>,
    id: LotId,
) -> Result<Option<u64>, StoreError> {
    let version: Option<i64> = sqlx::query_scalar("SELECT version FROM lots WHERE id = $1 FOR UPDATE")
        .bind(to_db(id.get())?)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_lot", e))?;

    version.map(from_db).transpose()
}

fn to_db(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidChangeset(format!("{value} exceeds BIGINT range")))
}

fn from_db(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Storage(format!("negative BIGINT {raw}")))
}

fn lot_id(raw: i64) -> Result<LotId, StoreError> {
    from_db(raw).map(LotId::new)
}

fn quantity(raw: Decimal) -> Result<Quantity, StoreError> {
    Quantity::new(raw).map_err(|e| StoreError::Storage(e.to_string()))
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to decode row: {err}"))
}

fn lot_from_row(row: &PgRow) -> Result<Lot, StoreError> {
    let issue: Option<i64> = row.try_get("reserved_for_issue_id").map_err(decode_error)?;
    let reservation = match issue {
        Some(raw) => ReservationState::Reserved {
            issue_id: IssueId::new(from_db(raw)?),
        },
        None => ReservationState::Available,
    };
    let parent: Option<i64> = row.try_get("parent_lot_id").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let manufacture_date: Option<NaiveDate> = row.try_get("manufacture_date").map_err(decode_error)?;
    let expiry_date: Option<NaiveDate> = row.try_get("expiry_date").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;
    let material: uuid::Uuid = row.try_get("material_id").map_err(decode_error)?;
    let warehouse: uuid::Uuid = row.try_get("warehouse_id").map_err(decode_error)?;
    let lot_number: String = row.try_get("lot_number").map_err(decode_error)?;

    Ok(Lot {
        id: lot_id(row.try_get("id").map_err(decode_error)?)?,
        lot_number: LotNumber::new(lot_number),
        material_id: MaterialId::from_uuid(material),
        warehouse_id: WarehouseId::from_uuid(warehouse),
        quantity: quantity(row.try_get("quantity").map_err(decode_error)?)?,
        reservation,
        manufacture_date,
        expiry_date,
        parent_lot_id: parent.map(lot_id).transpose()?,
        created_at,
        version: from_db(version)?,
    })
}

fn history_from_row(row: &PgRow) -> Result<LotHistoryEntry, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let raw_id: i64 = row.try_get("id").map_err(decode_error)?;
    let actor: uuid::Uuid = row.try_get("actor_id").map_err(decode_error)?;

    Ok(LotHistoryEntry {
        id: from_db(raw_id)?,
        lot_id: lot_id(row.try_get("lot_id").map_err(decode_error)?)?,
        kind: HistoryKind::parse(&kind)
            .ok_or_else(|| StoreError::Storage(format!("unknown history kind '{kind}'")))?,
        timestamp: row.try_get("occurred_at").map_err(decode_error)?,
        actor: UserId::from_uuid(actor),
        quantity_before: quantity(row.try_get("quantity_before").map_err(decode_error)?)?,
        quantity_after: quantity(row.try_get("quantity_after").map_err(decode_error)?)?,
        note: row.try_get("note").map_err(decode_error)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Concurrency(msg),
                Some("23503") | Some("23514") => StoreError::InvalidChangeset(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotkeeper_core::ExpectedVersion;
    use rust_decimal_macros::dec;

    async fn store() -> PostgresLotStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        let store = PostgresLotStore::new(pool, "PGTEST");
        store.ensure_schema().await.unwrap();
        store
    }

    fn receipt_changeset(material_id: MaterialId, warehouse_id: WarehouseId) -> LotChangeset {
        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), Some("pg test".into()));
        let lot = changes.create(lotkeeper_lots::PendingLot {
            material_id,
            warehouse_id,
            quantity: Quantity::new(dec!(12.5)).unwrap(),
            manufacture_date: None,
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 1),
            parent_lot_id: None,
        });
        changes.record(lot, HistoryKind::Create, Quantity::ZERO, Quantity::new(dec!(12.5)).unwrap());
        changes
    }

    #[tokio::test]
    async fn current_thread_runtime_is_refused_instead_of_panicking() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://lotkeeper@localhost/lotkeeper")
            .unwrap();
        let store = PostgresLotStore::new(pool, "PGTEST");

        let err = store.get_lot(LotId::new(1)).unwrap_err();
        assert!(matches!(err, StoreError::Runtime(_)));
        let err = store.commit(receipt_changeset(MaterialId::new(), WarehouseId::new())).unwrap_err();
        assert!(matches!(err, StoreError::Runtime(_)));
    }

    #[test]
    fn ids_outside_bigint_range_are_rejected() {
        assert!(matches!(to_db(u64::MAX), Err(StoreError::InvalidChangeset(_))));
        assert_eq!(to_db(42).unwrap(), 42);
        assert!(matches!(from_db(-1), Err(StoreError::Storage(_))));
        assert_eq!(lot_id(7).unwrap(), LotId::new(7));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn commit_round_trips_through_postgres() {
        let store = store().await;
        let material = MaterialId::new();
        let warehouse = WarehouseId::new();

        let receipt = store
            .commit_async(receipt_changeset(material, warehouse))
            .await
            .unwrap();
        let lot = &receipt.created[0];
        assert_eq!(lot.quantity.value(), dec!(12.5));
        assert!(lot.lot_number.as_str().starts_with("PGTEST-"));

        let history = store.history_async(lot.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, HistoryKind::Create);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
    async fn stale_version_rolls_back() {
        let store = store().await;
        let receipt = store
            .commit_async(receipt_changeset(MaterialId::new(), WarehouseId::new()))
            .await
            .unwrap();
        let lot = receipt.created[0].clone();

        let mut changes = LotChangeset::new(UserId::new(), Utc::now(), None);
        changes.expected.push((lot.id, ExpectedVersion::exact(lot.version + 5)));
        changes.updates.push(lotkeeper_lots::LotUpdate {
            lot_id: lot.id,
            quantity: Quantity::ZERO,
            reservation: ReservationState::Available,
        });

        let err = store.commit_async(changes).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        let reloaded = store.get_lot_async(lot.id).await.unwrap().unwrap();
        assert_eq!(reloaded.quantity, lot.quantity);
        assert_eq!(reloaded.version, lot.version);
    }
}
