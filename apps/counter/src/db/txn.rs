use futures::future::BoxFuture;
use sea_orm::{AccessMode, DatabaseConnection, DatabaseTransaction, IsolationLevel, TransactionTrait};
use tracing::{trace, warn};

use super::txn_policy::{self, TxnPolicy};
use crate::error::CounterError;
use crate::infra::db_errors::{map_db_err, StoreOp};

/// Execute a function within a database transaction
///
/// Begins a transaction, runs the closure, applies the transaction policy on
/// `Ok` and rolls back on `Err`. Begin and commit failures are reported as
/// errors of `op`.
pub async fn with_txn<R, F>(conn: &DatabaseConnection, op: StoreOp, f: F) -> Result<R, CounterError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<R, CounterError>>,
{
    with_txn_config(conn, op, None, None, f).await
}

/// [`with_txn`] with an explicit isolation level and access mode.
///
/// Pass `None` for both on SQLite, which has no per-transaction settings.
pub async fn with_txn_config<R, F>(
    conn: &DatabaseConnection,
    op: StoreOp,
    isolation: Option<IsolationLevel>,
    access: Option<AccessMode>,
    f: F,
) -> Result<R, CounterError>
where
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<R, CounterError>>,
{
    let txn = conn
        .begin_with_config(isolation, access)
        .await
        .map_err(|e| map_db_err(op, e))?;

    match f(&txn).await {
        Ok(val) => match txn_policy::current() {
            TxnPolicy::CommitOnOk => {
                txn.commit().await.map_err(|e| map_db_err(op, e))?;
                trace!(op = ?op, "txn=commit");
                Ok(val)
            }
            TxnPolicy::RollbackOnOk => {
                txn.rollback().await.map_err(|e| map_db_err(op, e))?;
                trace!(op = ?op, "txn=rollback policy=rollback_on_ok");
                Ok(val)
            }
        },
        Err(err) => {
            // Best-effort rollback; preserve original error
            if let Err(e) = txn.rollback().await {
                warn!(op = ?op, error = %e, "txn=rollback_failed");
            }
            Err(err)
        }
    }
}
