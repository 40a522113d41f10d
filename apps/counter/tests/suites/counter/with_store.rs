use counter::{with_store, CounterError, StorageFault};
use db_infra::ConnSpec;

use crate::support::TempSqlite;

#[tokio::test]
async fn with_store_returns_closure_value() -> Result<(), CounterError> {
    let value = with_store(ConnSpec::sqlite_memory(), |store| {
        Box::pin(async move {
            store.ensure_schema().await?;
            store.next_value().await?;
            store.next_value().await
        })
    })
    .await?;

    assert_eq!(value, 2);
    Ok(())
}

#[tokio::test]
async fn with_store_propagates_closure_error_and_persists_nothing_extra() -> Result<(), CounterError> {
    let db = TempSqlite::new();

    let err = with_store(db.spec(), |store| {
        Box::pin(async move {
            store.ensure_schema().await?;
            store.next_value().await?;
            Err::<(), _>(CounterError::read(StorageFault::Other, "caller gave up"))
        })
    })
    .await
    .unwrap_err();
    assert_eq!(err.detail(), "caller gave up");

    // The first session was closed on the error path; a new one sees its row.
    let snapshot = with_store(db.spec(), |store| Box::pin(store.snapshot())).await?;
    assert_eq!(snapshot.row_count, 1);
    assert_eq!(snapshot.last_value, 1);
    Ok(())
}
