#![allow(dead_code)]

//! Store builders for integration tests.
//!
//! Most suites run on SQLite so no database server is needed. Suites built on
//! [`TestDb`] follow `COUNTER_TEST_DB_KIND` and can target PostgreSQL or
//! MySQL/MariaDB as well.

use std::path::PathBuf;

use counter::CounterStore;
use counter_test_support::unique_helpers::unique_sqlite_file;
use db_infra::db::{ConnectionSettings, DbSettings};
use db_infra::{ConnSpec, DbKind, RuntimeEnv};
use sea_orm::ConnectionTrait;
use tempfile::TempDir;

/// A SQLite database file inside a temporary directory removed on drop.
pub struct TempSqlite {
    _dir: TempDir,
    path: PathBuf,
}

impl TempSqlite {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(unique_sqlite_file("counter"));
        Self { _dir: dir, path }
    }

    pub fn spec(&self) -> ConnSpec {
        ConnSpec::sqlite_file(RuntimeEnv::Test, &self.path)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

/// Open a store on `spec` and make sure the counter table exists.
pub async fn ready_store(spec: ConnSpec) -> CounterStore {
    let store = CounterStore::open(spec).await.expect("open store");
    store.ensure_schema().await.expect("ensure schema");
    store
}

/// A private in-memory database with the schema in place.
pub async fn memory_store() -> CounterStore {
    ready_store(ConnSpec::sqlite_memory()).await
}

/// Single-connection SQLite settings with a short busy timeout.
pub fn impatient_sqlite_settings(busy_timeout_ms: u32) -> ConnectionSettings {
    ConnectionSettings {
        pool_min: 1,
        pool_max: 1,
        acquire_timeout_ms: 2000,
        db_settings: DbSettings::Sqlite { busy_timeout_ms },
    }
}

/// Engine selected by `COUNTER_TEST_DB_KIND`; defaults to a SQLite file.
///
/// `postgres` and `mysql` resolve their connection from `TEST_DB` and the
/// `COUNTER_DB_*` / `COUNTER_APP_*` variables.
pub fn resolve_test_db_kind() -> DbKind {
    match std::env::var("COUNTER_TEST_DB_KIND") {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => DbKind::Postgres,
            "mysql" | "mariadb" => DbKind::MySql,
            "sqlite" | "sqlite-file" => DbKind::SqliteFile,
            other => panic!(
                "Unsupported COUNTER_TEST_DB_KIND '{other}'. Use: sqlite-file | postgres | mysql"
            ),
        },
        Err(_) => DbKind::SqliteFile,
    }
}

/// Database shared by the stores of one test.
///
/// SQLite gets a private file per test; server engines share `TEST_DB`, so
/// tests using them are `#[serial(counter_db)]` and start from an emptied table.
pub enum TestDb {
    Sqlite(TempSqlite),
    Server(ConnSpec),
}

impl TestDb {
    pub fn from_env() -> Self {
        let kind = resolve_test_db_kind();
        if kind.is_sqlite() {
            return TestDb::Sqlite(TempSqlite::new());
        }
        let spec = ConnSpec::from_env(RuntimeEnv::Test, kind)
            .unwrap_or_else(|e| panic!("test database for {kind:?} is not configured: {e}"));
        TestDb::Server(spec)
    }

    pub fn spec(&self) -> ConnSpec {
        match self {
            TestDb::Sqlite(db) => db.spec(),
            TestDb::Server(spec) => spec.clone(),
        }
    }

    pub fn kind(&self) -> DbKind {
        match self {
            TestDb::Sqlite(_) => DbKind::SqliteFile,
            TestDb::Server(spec) => spec.db_kind(),
        }
    }

    /// A store with the schema in place and no counter rows.
    pub async fn empty_store(&self) -> CounterStore {
        let store = ready_store(self.spec()).await;
        let clear = match self.kind() {
            DbKind::Postgres => Some("TRUNCATE counter_rows RESTART IDENTITY"),
            DbKind::MySql => Some("TRUNCATE TABLE counter_rows"),
            DbKind::SqliteFile | DbKind::SqliteMemory => None,
        };
        if let Some(sql) = clear {
            store
                .connection()
                .execute_unprepared(sql)
                .await
                .expect("clear counter rows");
        }
        store
    }
}
