use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sea_orm::DatabaseBackend;

use crate::error::DbInfraError;

/// Runtime environment the connection is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Prod,
    /// Test environment - enforces safety rules on database names
    Test,
}

/// Storage engine behind the counter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    /// MySQL or MariaDB
    MySql,
    SqliteFile,
    SqliteMemory,
}

impl DbKind {
    pub fn is_sqlite(self) -> bool {
        matches!(self, DbKind::SqliteFile | DbKind::SqliteMemory)
    }

    fn default_port(self) -> &'static str {
        match self {
            DbKind::MySql => "3306",
            _ => "5432",
        }
    }

    fn scheme(self) -> &'static str {
        match self {
            DbKind::MySql => "mysql",
            _ => "postgresql",
        }
    }
}

impl From<DbKind> for DatabaseBackend {
    fn from(kind: DbKind) -> Self {
        match kind {
            DbKind::Postgres => DatabaseBackend::Postgres,
            DbKind::MySql => DatabaseBackend::MySql,
            DbKind::SqliteFile | DbKind::SqliteMemory => DatabaseBackend::Sqlite,
        }
    }
}

/// Database owner enum for different access levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOwner {
    /// Application-level access (reads and appends counter rows)
    App,
    /// Owner-level access (creates the schema)
    Owner,
}

/// What a pool is built for; drives pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPurpose {
    Runtime,
    Migration,
}

/// Per-engine session settings applied on every new connection.
#[derive(Debug, Clone, PartialEq)]
pub enum DbSettings {
    Postgres {
        app_name: String,
        statement_timeout: String,
        idle_in_transaction_timeout: String,
        lock_timeout: Option<String>,
    },
    MySql {
        charset: String,
        lock_wait_timeout_secs: u32,
    },
    Sqlite {
        busy_timeout_ms: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub pool_min: u32,
    pub pool_max: u32,
    pub acquire_timeout_ms: u64,
    pub db_settings: DbSettings,
}

/// Fully resolved connection target: URLs per owner plus the SQLite file, if any.
#[derive(Debug, Clone)]
pub struct ConnSpec {
    env: RuntimeEnv,
    db_kind: DbKind,
    app_url: String,
    owner_url: String,
    sqlite_path: Option<PathBuf>,
}

impl ConnSpec {
    /// Resolve a connection target from environment variables.
    pub fn from_env(env: RuntimeEnv, db_kind: DbKind) -> Result<Self, DbInfraError> {
        validate_db_config(env, db_kind)?;

        let sqlite_path = match db_kind {
            DbKind::SqliteFile => Some(PathBuf::from(sqlite_file_spec(db_kind, env)?)),
            _ => None,
        };

        Ok(Self {
            env,
            db_kind,
            app_url: make_conn_spec(env, db_kind, DbOwner::App)?,
            owner_url: make_conn_spec(env, db_kind, DbOwner::Owner)?,
            sqlite_path,
        })
    }

    /// Target an explicit SQLite file, bypassing environment lookup.
    pub fn sqlite_file(env: RuntimeEnv, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let url = sqlite_url(&path);
        Self {
            env,
            db_kind: DbKind::SqliteFile,
            app_url: url.clone(),
            owner_url: url,
            sqlite_path: Some(path),
        }
    }

    /// Target a private in-memory SQLite database (test environment only).
    pub fn sqlite_memory() -> Self {
        Self {
            env: RuntimeEnv::Test,
            db_kind: DbKind::SqliteMemory,
            app_url: SQLITE_MEMORY_URL.to_string(),
            owner_url: SQLITE_MEMORY_URL.to_string(),
            sqlite_path: None,
        }
    }

    pub fn env(&self) -> RuntimeEnv {
        self.env
    }

    pub fn db_kind(&self) -> DbKind {
        self.db_kind
    }

    pub fn url(&self, owner: DbOwner) -> &str {
        match owner {
            DbOwner::App => &self.app_url,
            DbOwner::Owner => &self.owner_url,
        }
    }

    pub fn sqlite_path(&self) -> Option<&Path> {
        self.sqlite_path.as_deref()
    }

    /// Lock file guarding migrations of a SQLite file (`<db>.migrate.lock`).
    pub fn lock_path(&self) -> Option<PathBuf> {
        self.sqlite_path
            .as_ref()
            .map(|p| p.with_extension("migrate.lock"))
    }
}

const SQLITE_MEMORY_URL: &str = "sqlite::memory:";

// RFC 3986 unreserved characters stay literal in the password.
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn sqlite_url(path: &Path) -> String {
    format!("sqlite:{}?mode=rwc", path.display())
}

/// Reject combinations that can never work.
pub fn validate_db_config(env: RuntimeEnv, db_kind: DbKind) -> Result<(), DbInfraError> {
    if env == RuntimeEnv::Prod && db_kind == DbKind::SqliteMemory {
        return Err(DbInfraError::config(
            "in-memory SQLite is not allowed in the prod environment",
        ));
    }
    Ok(())
}

/// Builds a connection URL from environment variables for the given owner.
pub fn make_conn_spec(
    env: RuntimeEnv,
    db_kind: DbKind,
    owner: DbOwner,
) -> Result<String, DbInfraError> {
    match db_kind {
        DbKind::SqliteMemory => Ok(SQLITE_MEMORY_URL.to_string()),
        DbKind::SqliteFile => Ok(sqlite_url(Path::new(&sqlite_file_spec(db_kind, env)?))),
        DbKind::Postgres | DbKind::MySql => {
            let host = std::env::var("COUNTER_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port =
                std::env::var("COUNTER_DB_PORT").unwrap_or_else(|_| db_kind.default_port().to_string());
            let db_name = db_name(env)?;
            let (username, password) = credentials(owner)?;
            let password = utf8_percent_encode(&password, USERINFO);

            Ok(format!(
                "{}://{username}:{password}@{host}:{port}/{db_name}",
                db_kind.scheme()
            ))
        }
    }
}

/// Path of the SQLite database file for the environment.
pub fn sqlite_file_spec(db_kind: DbKind, env: RuntimeEnv) -> Result<String, DbInfraError> {
    if db_kind != DbKind::SqliteFile {
        return Err(DbInfraError::config(format!(
            "sqlite_file_spec only applies to SqliteFile, got {db_kind:?}"
        )));
    }

    let dir = std::env::var("COUNTER_SQLITE_DIR").unwrap_or_else(|_| "./data".to_string());
    let file = match env {
        RuntimeEnv::Prod => "counter.db",
        RuntimeEnv::Test => "counter_test.db",
    };
    Ok(Path::new(&dir).join(file).display().to_string())
}

/// Lock file path used to serialise SQLite file migrations across processes.
pub fn sqlite_lock_path(db_kind: DbKind, env: RuntimeEnv) -> Result<PathBuf, DbInfraError> {
    let file_spec = sqlite_file_spec(db_kind, env)?;
    Ok(Path::new(&file_spec).with_extension("migrate.lock"))
}

fn db_name(env: RuntimeEnv) -> Result<String, DbInfraError> {
    match env {
        RuntimeEnv::Prod => must_var("PROD_DB"),
        RuntimeEnv::Test => {
            let db_name = must_var("TEST_DB")?;
            if !db_name.ends_with("_test") {
                return Err(DbInfraError::config(format!(
                    "Test environment requires database name to end with '_test', but got: '{db_name}'"
                )));
            }
            Ok(db_name)
        }
    }
}

fn credentials(owner: DbOwner) -> Result<(String, String), DbInfraError> {
    let app = || -> Result<(String, String), DbInfraError> {
        Ok((must_var("COUNTER_APP_USER")?, must_var("COUNTER_APP_PASSWORD")?))
    };

    match owner {
        DbOwner::App => app(),
        // Owner credentials are optional; small deployments use one account.
        DbOwner::Owner => match std::env::var("COUNTER_OWNER_USER") {
            Ok(user) => Ok((user, must_var("COUNTER_OWNER_PASSWORD")?)),
            Err(_) => app(),
        },
    }
}

fn must_var(name: &str) -> Result<String, DbInfraError> {
    std::env::var(name).map_err(|_| {
        DbInfraError::config(format!("Required environment variable '{name}' is not set"))
    })
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, DbInfraError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map_err(|_| {
            DbInfraError::config(format!("Environment variable '{name}' has invalid value '{raw}'"))
        }),
        Err(_) => Ok(default),
    }
}

/// Pool sizing and session settings for a pool of the given purpose.
pub fn build_connection_settings(
    env: RuntimeEnv,
    db_kind: DbKind,
    purpose: PoolPurpose,
) -> Result<ConnectionSettings, DbInfraError> {
    let db_settings = match db_kind {
        DbKind::Postgres => DbSettings::Postgres {
            app_name: match purpose {
                PoolPurpose::Runtime => "counter".to_string(),
                PoolPurpose::Migration => "counter-migrate".to_string(),
            },
            statement_timeout: match env {
                RuntimeEnv::Test => "10s".to_string(),
                RuntimeEnv::Prod => "30s".to_string(),
            },
            idle_in_transaction_timeout: "15s".to_string(),
            lock_timeout: Some("10s".to_string()),
        },
        DbKind::MySql => DbSettings::MySql {
            charset: "utf8mb4".to_string(),
            lock_wait_timeout_secs: 10,
        },
        DbKind::SqliteFile | DbKind::SqliteMemory => DbSettings::Sqlite {
            busy_timeout_ms: 5000,
        },
    };

    let (pool_min, pool_max, acquire_timeout_ms) = match (purpose, db_kind) {
        (PoolPurpose::Migration, _) => (1, 1, 2000),
        // Every in-memory connection is its own database.
        (PoolPurpose::Runtime, DbKind::SqliteMemory) => (1, 1, 5000),
        (PoolPurpose::Runtime, _) => {
            let default_max = (num_cpus::get() as u32 * 2).clamp(2, 16);
            let pool_max = parse_var("COUNTER_DB_POOL_MAX", default_max)?;
            if pool_max == 0 {
                return Err(DbInfraError::config("COUNTER_DB_POOL_MAX must be at least 1"));
            }
            (
                1,
                pool_max,
                parse_var("COUNTER_DB_ACQUIRE_TIMEOUT_MS", 5000u64)?,
            )
        }
    };

    Ok(ConnectionSettings {
        pool_min,
        pool_max,
        acquire_timeout_ms,
        db_settings,
    })
}

/// Build ordered session-level SQL statements for the given database kind and settings.
/// SQLite file prerequisites (journal_mode, synchronous) are handled separately.
pub fn build_session_statements(db_kind: DbKind, settings: &DbSettings) -> Vec<String> {
    match (db_kind, settings) {
        (DbKind::SqliteFile | DbKind::SqliteMemory, DbSettings::Sqlite { busy_timeout_ms }) => {
            vec![
                "PRAGMA foreign_keys = ON;".to_string(),
                format!("PRAGMA busy_timeout = {busy_timeout_ms};"),
            ]
        }
        (
            DbKind::Postgres,
            DbSettings::Postgres {
                app_name,
                statement_timeout,
                idle_in_transaction_timeout,
                lock_timeout,
            },
        ) => {
            let mut stmts = vec![
                format!("SET application_name = '{}';", app_name.replace('\'', "''")),
                "SET timezone = 'UTC';".to_string(),
                format!("SET statement_timeout = '{statement_timeout}';"),
                format!("SET idle_in_transaction_session_timeout = '{idle_in_transaction_timeout}';"),
            ];
            if let Some(lock_timeout) = lock_timeout {
                stmts.push(format!("SET lock_timeout = '{lock_timeout}';"));
            }
            stmts
        }
        (
            DbKind::MySql,
            DbSettings::MySql {
                charset,
                lock_wait_timeout_secs,
            },
        ) => vec![
            format!("SET NAMES {charset};"),
            "SET time_zone = '+00:00';".to_string(),
            format!("SET SESSION innodb_lock_wait_timeout = {lock_wait_timeout_secs};"),
        ],
        _ => Vec::new(),
    }
}
