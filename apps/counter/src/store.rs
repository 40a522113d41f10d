//! The counter store: one pool, one table, race-free appends.

use db_infra::db::{build_connection_settings, ConnectionSettings, PoolPurpose};
use db_infra::{build_pool, orchestrate_migration, orchestrate_migration_internal};
use db_infra::{CancellationToken, ConnSpec, DbKind};
use futures::future::BoxFuture;
use migration::MigrationCommand;
use sea_orm::{AccessMode, DatabaseConnection, IsolationLevel};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::txn::{with_txn, with_txn_config};
use crate::error::CounterError;
use crate::infra::db_errors::{classify_message, StoreOp};
use crate::repos::counter_rows::{self as counter_repo, CounterRow};

/// Last counter value paired with the number of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Snapshot {
    pub last_value: i64,
    pub row_count: u64,
}

/// Durable counter bound to one database.
///
/// Every call re-reads storage; nothing is cached. Appends are serialised by
/// the database engine, so independent stores on the same database may call
/// [`CounterStore::next_value`] concurrently.
pub struct CounterStore {
    spec: ConnSpec,
    conn: DatabaseConnection,
}

impl CounterStore {
    /// Open a runtime pool sized from the environment.
    pub async fn open(spec: ConnSpec) -> Result<Self, CounterError> {
        let settings =
            build_connection_settings(spec.env(), spec.db_kind(), PoolPurpose::Runtime)?;
        Self::open_with(spec, &settings).await
    }

    pub async fn open_with(
        spec: ConnSpec,
        settings: &ConnectionSettings,
    ) -> Result<Self, CounterError> {
        let conn = build_pool(&spec, settings).await?;
        Ok(Self { spec, conn })
    }

    /// Wrap a connection built elsewhere. `spec` must describe the same database.
    pub fn from_connection(spec: ConnSpec, conn: DatabaseConnection) -> Self {
        Self { spec, conn }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn spec(&self) -> &ConnSpec {
        &self.spec
    }

    /// Create the counter table if it does not exist, then check its shape.
    ///
    /// Idempotent. Fails with [`CounterError::Schema`] when creation is
    /// rejected or an existing table lacks the expected columns.
    pub async fn ensure_schema(&self) -> Result<(), CounterError> {
        let migrated = match self.spec.db_kind() {
            // A second pool would open a second, empty database.
            DbKind::SqliteMemory => {
                orchestrate_migration_internal(
                    &self.conn,
                    &self.spec,
                    MigrationCommand::Up,
                    CancellationToken::new(),
                )
                .await
            }
            DbKind::SqliteFile | DbKind::Postgres | DbKind::MySql => {
                orchestrate_migration(&self.spec, MigrationCommand::Up).await
            }
        };
        migrated.map_err(|e| CounterError::schema(classify_message(e.message()), e.message()))?;

        counter_repo::verify_schema(&self.conn).await?;
        debug!("schema=ready");
        Ok(())
    }

    /// Append `max(value) + 1` (1 on an empty table) and return it.
    ///
    /// Runs in one transaction: on failure nothing is persisted. Not retried,
    /// since a retry after an ambiguous commit could append twice.
    pub async fn next_value(&self) -> Result<i64, CounterError> {
        let row = with_txn(&self.conn, StoreOp::Write, |txn| {
            Box::pin(async move { counter_repo::append_next(txn).await })
        })
        .await?;

        debug!(id = row.id, value = row.value, "counter=append");
        Ok(row.value)
    }

    /// Last value and row count, read independently.
    ///
    /// Under concurrent appends the two reads may observe different states;
    /// use [`CounterStore::consistent_snapshot`] when that matters.
    pub async fn snapshot(&self) -> Result<Snapshot, CounterError> {
        let last_value = counter_repo::last_value(&self.conn).await?;
        let row_count = counter_repo::row_count(&self.conn).await?;
        Ok(Snapshot {
            last_value,
            row_count,
        })
    }

    /// Both reads inside one read-only transaction.
    pub async fn consistent_snapshot(&self) -> Result<Snapshot, CounterError> {
        let (isolation, access) = match self.spec.db_kind() {
            DbKind::Postgres | DbKind::MySql => {
                (Some(IsolationLevel::RepeatableRead), Some(AccessMode::ReadOnly))
            }
            DbKind::SqliteFile | DbKind::SqliteMemory => (None, None),
        };

        with_txn_config(&self.conn, StoreOp::Read, isolation, access, |txn| {
            Box::pin(async move {
                let last_value = counter_repo::last_value(txn).await?;
                let row_count = counter_repo::row_count(txn).await?;
                Ok(Snapshot {
                    last_value,
                    row_count,
                })
            })
        })
        .await
    }

    /// Every row in id order.
    pub async fn rows(&self) -> Result<Vec<CounterRow>, CounterError> {
        counter_repo::all_rows(&self.conn).await
    }

    /// Release the pool. Close failures are logged; the connections are gone either way.
    pub async fn close(self) {
        match self.conn.close().await {
            Ok(()) => debug!("pool=closed"),
            Err(e) => warn!(error = %e, "Failed to close counter pool"),
        }
    }
}

/// Open a store for `spec`, run `f`, and close the store on every path.
pub async fn with_store<R, F>(spec: ConnSpec, f: F) -> Result<R, CounterError>
where
    F: for<'a> FnOnce(&'a CounterStore) -> BoxFuture<'a, Result<R, CounterError>>,
{
    let store = CounterStore::open(spec).await?;
    info!(db_kind = ?store.spec.db_kind(), env = ?store.spec.env(), "store=open");

    let out = f(&store).await;
    store.close().await;
    out
}
