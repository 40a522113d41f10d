// Standard library imports
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

// External crate imports
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

// Internal crate imports
use crate::error::DbInfraError;

pub fn pg_lock_id(key: &str) -> i64 {
    xxh3_64(key.as_bytes()) as i64
}

/// MySQL caps lock names at 64 characters, so long keys are hashed.
pub fn mysql_lock_name(key: &str) -> String {
    format!("counter:migrate:{:016x}", xxh3_64(key.as_bytes()))
}

enum Held {
    Postgres {
        admin_pool: DatabaseConnection,
        lock_key: i64,
    },
    MySql {
        admin_pool: DatabaseConnection,
        lock_name: String,
    },
    SqliteFile {
        file: File,
        lock_path: PathBuf,
    },
    InMemory,
}

/// A held bootstrap lock.
///
/// Server-side locks are session scoped, so the admin pool that acquired them
/// must be a single-connection pool; the guard reuses it to unlock.
pub struct Guard {
    held: Option<Held>,
}

impl Guard {
    fn new(held: Held) -> Self {
        Self { held: Some(held) }
    }

    /// Release the lock. Unlock failures are logged, never returned as errors,
    /// because the session or file handle going away releases the lock anyway.
    pub async fn release(mut self) -> Result<(), DbInfraError> {
        let Some(held) = self.held.take() else {
            return Ok(());
        };

        match held {
            Held::SqliteFile { file, lock_path } => {
                match fs4::fs_std::FileExt::unlock(&file) {
                    Ok(()) => {
                        debug!(lock_path = %lock_path.display(), "SQLite file lock released");
                    }
                    Err(e) => {
                        debug!(
                            error = %e,
                            lock_path = %lock_path.display(),
                            "SQLite file unlock returned error (may be benign)"
                        );
                    }
                }
                // Dropping the handle releases the OS-level lock in any case.
                drop(file);
            }
            Held::InMemory => {}
            Held::Postgres {
                admin_pool,
                lock_key,
            } => {
                let stmt = Statement::from_sql_and_values(
                    DatabaseBackend::Postgres,
                    "SELECT pg_advisory_unlock($1) AS unlocked",
                    vec![lock_key.into()],
                );

                match admin_pool.query_one(stmt).await {
                    Ok(Some(row)) => {
                        let unlocked: bool = row.try_get("", "unlocked").map_err(|e| {
                            DbInfraError::config(format!("failed to read unlock result: {e}"))
                        })?;
                        if !unlocked {
                            warn!(
                                code = "PG_UNLOCK_FALSE",
                                lock_key = lock_key,
                                "Advisory lock unlock returned false"
                            );
                        }
                    }
                    Ok(None) => {
                        warn!(lock_key = lock_key, "No result from advisory lock unlock query");
                    }
                    Err(e) => {
                        warn!(error = %e, lock_key = lock_key, "Failed to unlock advisory lock");
                    }
                }
            }
            Held::MySql {
                admin_pool,
                lock_name,
            } => {
                let stmt = Statement::from_sql_and_values(
                    DatabaseBackend::MySql,
                    "SELECT RELEASE_LOCK(?) AS released",
                    vec![lock_name.clone().into()],
                );

                match admin_pool.query_one(stmt).await {
                    Ok(Some(row)) => {
                        let released: Option<i64> = row.try_get("", "released").map_err(|e| {
                            DbInfraError::config(format!("failed to read release result: {e}"))
                        })?;
                        if released != Some(1) {
                            warn!(
                                code = "MYSQL_RELEASE_LOCK_FALSE",
                                lock_name = %lock_name,
                                "Named lock was not held by this session"
                            );
                        }
                    }
                    Ok(None) => {
                        warn!(lock_name = %lock_name, "No result from RELEASE_LOCK query");
                    }
                    Err(e) => {
                        warn!(error = %e, lock_name = %lock_name, "Failed to release named lock");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Trait for bootstrap/migration lock acquisition.
/// Abstracts over PostgreSQL advisory locks, MySQL named locks and SQLite file locks.
#[async_trait]
pub trait BootstrapLock {
    /// Try to acquire the lock (non-blocking).
    /// Returns Some(Guard) if acquired, None if already held by another process.
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError>;
}

/// PostgreSQL advisory lock using the admin pool
pub struct PgAdvisoryLock {
    admin_pool: DatabaseConnection,
    lock_key: i64,
}

impl PgAdvisoryLock {
    /// INVARIANT: the admin pool is configured with **min=max=1** so the unlock
    /// runs on the same physical session that holds the advisory lock.
    pub fn new(admin_pool: DatabaseConnection, key: &str) -> Self {
        Self {
            admin_pool,
            lock_key: pg_lock_id(key),
        }
    }
}

#[async_trait]
impl BootstrapLock for PgAdvisoryLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        let lock_stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            "SELECT pg_try_advisory_lock($1) AS locked",
            vec![self.lock_key.into()],
        );

        let row = self
            .admin_pool
            .query_one(lock_stmt)
            .await
            .map_err(|e| DbInfraError::config(format!("failed to acquire advisory lock: {e}")))?
            .ok_or_else(|| DbInfraError::config("pg_try_advisory_lock returned no row"))?;

        let locked: bool = row
            .try_get("", "locked")
            .map_err(|e| DbInfraError::config(format!("failed to read lock result: {e}")))?;

        if !locked {
            return Ok(None);
        }

        Ok(Some(Guard::new(Held::Postgres {
            admin_pool: self.admin_pool.clone(),
            lock_key: self.lock_key,
        })))
    }
}

/// MySQL/MariaDB named lock (`GET_LOCK` with zero wait) using the admin pool.
/// Same single-session invariant as [`PgAdvisoryLock`].
pub struct MySqlNamedLock {
    admin_pool: DatabaseConnection,
    lock_name: String,
}

impl MySqlNamedLock {
    pub fn new(admin_pool: DatabaseConnection, key: &str) -> Self {
        Self {
            admin_pool,
            lock_name: mysql_lock_name(key),
        }
    }
}

#[async_trait]
impl BootstrapLock for MySqlNamedLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        let lock_stmt = Statement::from_sql_and_values(
            DatabaseBackend::MySql,
            "SELECT GET_LOCK(?, 0) AS locked",
            vec![self.lock_name.clone().into()],
        );

        let row = self
            .admin_pool
            .query_one(lock_stmt)
            .await
            .map_err(|e| DbInfraError::config(format!("failed to acquire named lock: {e}")))?
            .ok_or_else(|| DbInfraError::config("GET_LOCK returned no row"))?;

        // 1 = acquired, 0 = held elsewhere, NULL = error on the server side
        let locked: Option<i64> = row
            .try_get("", "locked")
            .map_err(|e| DbInfraError::config(format!("failed to read lock result: {e}")))?;

        match locked {
            Some(1) => Ok(Some(Guard::new(Held::MySql {
                admin_pool: self.admin_pool.clone(),
                lock_name: self.lock_name.clone(),
            }))),
            Some(_) => Ok(None),
            None => Err(DbInfraError::config(format!(
                "GET_LOCK returned NULL for lock '{}'",
                self.lock_name
            ))),
        }
    }
}

/// SQLite file lock using an OS-level exclusive lock on `<db>.migrate.lock`.
/// Non-blocking `try_lock_exclusive()` integrates with the backoff/timeout loop.
pub struct SqliteFileLock {
    lock_path: PathBuf,
}

impl SqliteFileLock {
    /// All processes must resolve the same on-disk lock file.
    pub fn new(lock_path: &Path) -> Self {
        Self {
            lock_path: lock_path.to_path_buf(),
        }
    }
}

#[async_trait]
impl BootstrapLock for SqliteFileLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        use fs4::fs_std::FileExt;

        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DbInfraError::config(format!(
                        "failed to create lock file parent directory: {e}"
                    ))
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| DbInfraError::config(format!("failed to open lock file: {e}")))?;

        // Ok(true) = acquired, Ok(false) = would block
        match file.try_lock_exclusive() {
            Ok(true) => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock acquired");
                Ok(Some(Guard::new(Held::SqliteFile {
                    file,
                    lock_path: self.lock_path.clone(),
                })))
            }
            Ok(false) => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock contended");
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!(lock_path = %self.lock_path.display(), "SQLite file lock contended");
                Ok(None)
            }
            Err(e) => Err(DbInfraError::config(format!(
                "failed to acquire SQLite file lock: {e}"
            ))),
        }
    }
}

/// No-op lock for in-memory databases, which are private to one pool.
pub struct InMemoryLock;

#[async_trait]
impl BootstrapLock for InMemoryLock {
    async fn try_acquire(&mut self) -> Result<Option<Guard>, DbInfraError> {
        Ok(Some(Guard::new(Held::InMemory)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_lock_names_fit_server_limit() {
        let name = mysql_lock_name(&"x".repeat(500));
        assert!(name.len() <= 64);
        assert_eq!(name, mysql_lock_name(&"x".repeat(500)));
        assert_ne!(name, mysql_lock_name("y"));
    }

    #[tokio::test]
    async fn sqlite_file_lock_is_exclusive_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("counter.migrate.lock");

        let mut first = SqliteFileLock::new(&path);
        let mut second = SqliteFileLock::new(&path);

        let guard = first.try_acquire().await.unwrap().expect("first acquire");
        assert!(second.try_acquire().await.unwrap().is_none());

        guard.release().await.unwrap();
        let again = second.try_acquire().await.unwrap().expect("acquire after release");
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_lock_always_acquires() {
        let mut lock = InMemoryLock;
        let a = lock.try_acquire().await.unwrap();
        let b = lock.try_acquire().await.unwrap();
        assert!(a.is_some() && b.is_some());
    }
}
