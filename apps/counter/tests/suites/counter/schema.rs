use counter::{CounterError, CounterStore};
use db_infra::db::{build_connection_settings, PoolPurpose};
use db_infra::ConnSpec;
use sea_orm::ConnectionTrait;

use crate::support::{memory_store, ready_store, TempSqlite};

#[tokio::test]
async fn ensure_schema_twice_on_memory_is_noop() -> Result<(), CounterError> {
    let store = memory_store().await;
    store.ensure_schema().await?;

    let applied = migration::count_applied_migrations(store.connection())
        .await
        .expect("count migrations");
    assert_eq!(applied, 1);
    assert_eq!(store.snapshot().await?.row_count, 0);

    store.close().await;
    Ok(())
}

#[tokio::test]
async fn ensure_schema_twice_on_file_keeps_rows() -> Result<(), CounterError> {
    let db = TempSqlite::new();
    let store = ready_store(db.spec()).await;
    store.next_value().await?;

    store.ensure_schema().await?;

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.row_count, 1);
    assert_eq!(snapshot.last_value, 1);
    assert_eq!(
        migration::get_latest_migration_version(store.connection())
            .await
            .expect("latest version")
            .as_deref(),
        Some("m20251016_000001_counter_rows")
    );

    store.close().await;
    Ok(())
}

#[tokio::test]
async fn separate_stores_share_one_file_schema() -> Result<(), CounterError> {
    let db = TempSqlite::new();

    let first = ready_store(db.spec()).await;
    first.next_value().await?;
    first.close().await;

    let second = ready_store(db.spec()).await;
    assert_eq!(second.next_value().await?, 2);
    second.close().await;
    Ok(())
}

#[tokio::test]
async fn incompatible_existing_table_is_schema_error() {
    let store = CounterStore::open(ConnSpec::sqlite_memory())
        .await
        .expect("open store");
    store
        .connection()
        .execute_unprepared("CREATE TABLE counter_rows (id INTEGER PRIMARY KEY, label TEXT)")
        .await
        .expect("create conflicting table");

    let err = store.ensure_schema().await.unwrap_err();
    assert!(matches!(err, CounterError::Schema { .. }), "got {err:?}");
    assert_eq!(err.code(), "SCHEMA_ERROR");

    store.close().await;
}

#[tokio::test]
async fn text_value_column_is_schema_error() {
    let store = CounterStore::open(ConnSpec::sqlite_memory())
        .await
        .expect("open store");
    store
        .connection()
        .execute_unprepared("CREATE TABLE counter_rows (id INTEGER PRIMARY KEY, value TEXT)")
        .await
        .expect("create table with text value");

    let err = store.ensure_schema().await.unwrap_err();
    assert!(matches!(err, CounterError::Schema { .. }), "got {err:?}");
    assert!(err.detail().contains("counter_rows.value"), "got {err:?}");

    store.close().await;
}

#[tokio::test]
async fn store_wraps_existing_pool() -> Result<(), CounterError> {
    let db = TempSqlite::new();
    let spec = db.spec();
    let settings = build_connection_settings(spec.env(), spec.db_kind(), PoolPurpose::Runtime)?;
    let conn = db_infra::build_pool(&spec, &settings).await?;

    let store = CounterStore::from_connection(spec, conn);
    store.ensure_schema().await?;
    assert_eq!(store.next_value().await?, 1);
    assert_eq!(store.spec().sqlite_path(), Some(db.path()));

    store.close().await;
    Ok(())
}

#[tokio::test]
async fn operations_without_schema_fail_instead_of_defaulting() {
    let store = CounterStore::open(ConnSpec::sqlite_memory())
        .await
        .expect("open store");

    let err = store.snapshot().await.unwrap_err();
    assert_eq!(err.code(), "READ_ERROR");

    let err = store.next_value().await.unwrap_err();
    assert_eq!(err.code(), "WRITE_ERROR");

    store.close().await;
}
