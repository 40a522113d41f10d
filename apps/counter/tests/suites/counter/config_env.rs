use counter::{CounterError, CounterStore};
use db_infra::{ConnSpec, DbKind, RuntimeEnv};
use serial_test::serial;

use crate::support::{resolve_test_db_kind, TempSqlite};

#[tokio::test]
#[serial]
async fn zero_pool_size_is_config_error() {
    let db = TempSqlite::new();
    std::env::set_var("COUNTER_DB_POOL_MAX", "0");
    let result = CounterStore::open(db.spec()).await;
    std::env::remove_var("COUNTER_DB_POOL_MAX");

    let err = result.err().expect("open must fail");
    assert_eq!(err.code(), "CONFIG_ERROR");
    assert_eq!(err.fault(), None);
}

#[tokio::test]
#[serial]
async fn pool_size_from_env_is_honoured() -> Result<(), CounterError> {
    let db = TempSqlite::new();
    std::env::set_var("COUNTER_DB_POOL_MAX", "3");
    let result = CounterStore::open(db.spec()).await;
    std::env::remove_var("COUNTER_DB_POOL_MAX");

    let store = result?;
    store.ensure_schema().await?;
    assert_eq!(store.next_value().await?, 1);
    store.close().await;
    Ok(())
}

#[test]
fn memory_database_refused_in_prod() {
    let err: CounterError = ConnSpec::from_env(RuntimeEnv::Prod, DbKind::SqliteMemory)
        .unwrap_err()
        .into();
    assert_eq!(err.code(), "CONFIG_ERROR");
    assert!(err.detail().contains("in-memory"));
}

#[test]
#[serial]
fn test_db_kind_follows_env_and_defaults_to_sqlite_file() {
    let saved = std::env::var("COUNTER_TEST_DB_KIND").ok();

    std::env::remove_var("COUNTER_TEST_DB_KIND");
    assert_eq!(resolve_test_db_kind(), DbKind::SqliteFile);
    std::env::set_var("COUNTER_TEST_DB_KIND", "postgres");
    assert_eq!(resolve_test_db_kind(), DbKind::Postgres);
    std::env::set_var("COUNTER_TEST_DB_KIND", "MariaDB");
    assert_eq!(resolve_test_db_kind(), DbKind::MySql);
    std::env::set_var("COUNTER_TEST_DB_KIND", "bogus");
    let unknown = std::panic::catch_unwind(resolve_test_db_kind);

    match saved {
        Some(kind) => std::env::set_var("COUNTER_TEST_DB_KIND", kind),
        None => std::env::remove_var("COUNTER_TEST_DB_KIND"),
    }
    assert!(unknown.is_err());
}
