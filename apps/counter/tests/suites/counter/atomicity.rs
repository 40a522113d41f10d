use counter::db::txn::with_txn;
use counter::infra::db_errors::StoreOp;
use counter::repos::counter_rows;
use counter::{CounterError, CounterStore, StorageFault};
use db_infra::DbOwner;
use serial_test::serial;
use sqlx::{Connection, SqliteConnection};

use crate::support::{impatient_sqlite_settings, ready_store, TempSqlite, TestDb};

#[tokio::test]
#[serial(counter_db)]
async fn failure_after_append_rolls_back() -> Result<(), CounterError> {
    let db = TestDb::from_env();
    let store = db.empty_store().await;
    store.next_value().await?;

    let result: Result<(), CounterError> =
        with_txn(store.connection(), StoreOp::Write, |txn| {
            Box::pin(async move {
                let row = counter_rows::append_next(txn).await?;
                assert_eq!(row.value, 2);
                Err(CounterError::write(StorageFault::Other, "injected fault"))
            })
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.detail(), "injected fault");

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.row_count, 1);
    assert_eq!(snapshot.last_value, 1);
    assert_eq!(store.next_value().await?, 2);

    store.close().await;
    Ok(())
}

// Holds a raw SQLite write lock, so it always runs on a SQLite file.
#[tokio::test]
async fn locked_database_is_busy_write_error_without_rows() -> Result<(), CounterError> {
    let db = TempSqlite::new();
    ready_store(db.spec()).await.close().await;

    let store = CounterStore::open_with(db.spec(), &impatient_sqlite_settings(50)).await?;
    store.next_value().await?;

    let mut blocker = SqliteConnection::connect(db.spec().url(DbOwner::App))
        .await
        .expect("blocker connect");
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut blocker)
        .await
        .expect("take write lock");

    let err = store.next_value().await.unwrap_err();
    assert!(matches!(err, CounterError::Write { .. }), "got {err:?}");
    assert_eq!(err.fault(), Some(StorageFault::Busy));

    sqlx::query("ROLLBACK")
        .execute(&mut blocker)
        .await
        .expect("release write lock");
    blocker.close().await.expect("close blocker");

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.row_count, 1);
    assert_eq!(store.next_value().await?, 2);

    store.close().await;
    Ok(())
}
