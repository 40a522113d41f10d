use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use migration::{migrate, MigrationCommand, MigrationName, Migrator, MigratorTrait};
use rand::Rng;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, SqlxMySqlConnector,
    SqlxPostgresConnector, SqlxSqliteConnector,
};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::config::db::{
    build_connection_settings, build_session_statements, ConnSpec, ConnectionSettings, DbKind,
    DbOwner, DbSettings, PoolPurpose, RuntimeEnv,
};
use crate::error::DbInfraError;
use crate::infra::db::diagnostics::migration_counters;
use crate::infra::db::locking::{
    BootstrapLock, Guard, InMemoryLock, MySqlNamedLock, PgAdvisoryLock, SqliteFileLock,
};

fn get_db_engine(db_kind: DbKind) -> &'static str {
    match db_kind {
        DbKind::Postgres => "postgresql",
        DbKind::MySql => "mysql",
        DbKind::SqliteFile | DbKind::SqliteMemory => "sqlite",
    }
}

fn get_db_path(spec: &ConnSpec) -> String {
    match spec.db_kind() {
        DbKind::SqliteFile => spec
            .sqlite_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "sqlite file".to_string()),
        DbKind::SqliteMemory => "sqlite::memory:".to_string(),
        DbKind::Postgres | DbKind::MySql => sanitize_db_url(spec.url(DbOwner::Owner)),
    }
}

/// Retry a connection attempt with fixed interval delays.
/// Returns the error of the last attempt once all retries are exhausted.
async fn retry_connection<T, F, Fut>(
    mut connect_fn: F,
    max_attempts: u32,
    interval_ms: u64,
) -> Result<T, DbInfraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbInfraError>>,
{
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match connect_fn().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(
                        "connection_retry=success attempts={} interval_ms={}",
                        attempt, interval_ms
                    );
                }
                return Ok(result);
            }
            Err(e) => {
                last_error = Some(e);
                if attempt < max_attempts {
                    warn!(
                        "connection_retry=failed attempt={} max_attempts={} interval_ms={}",
                        attempt, max_attempts, interval_ms
                    );
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DbInfraError::config("no error recorded after max attempts (this should not happen)")
    }))
}

fn ensure_sqlite_parent(spec: &ConnSpec) -> Result<(), DbInfraError> {
    if let Some(parent) = spec.sqlite_path().and_then(Path::parent) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbInfraError::config(format!(
                    "failed to create SQLite directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    Ok(())
}

/// Build the single-connection admin pool used for migrations and their locks.
///
/// In-memory SQLite has no admin pool: a second pool would be a second database.
pub async fn build_admin_pool(spec: &ConnSpec) -> Result<DatabaseConnection, DbInfraError> {
    let db_kind = spec.db_kind();
    if db_kind == DbKind::SqliteMemory {
        return Err(DbInfraError::config(
            "in-memory SQLite must be migrated on its runtime pool",
        ));
    }
    ensure_sqlite_parent(spec)?;

    let mut opt = ConnectOptions::new(spec.url(DbOwner::Owner));
    opt.min_connections(1)
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(2))
        .sqlx_logging(true);

    if db_kind.is_sqlite() {
        Database::connect(opt).await.map_err(|e| {
            DbInfraError::config(format!("failed to connect to database (admin pool): {e}"))
        })
    } else {
        let engine = get_db_engine(db_kind);
        retry_connection(
            || {
                let opt_clone = opt.clone();
                async move {
                    Database::connect(opt_clone).await.map_err(|e| {
                        DbInfraError::config(format!(
                            "failed to connect to {engine} (admin pool): {e}"
                        ))
                    })
                }
            },
            5,
            500,
        )
        .await
    }
}

async fn apply_sqlite_config(
    conn: &mut sqlx::SqliteConnection,
    settings: &DbSettings,
) -> Result<(), sqlx::Error> {
    for stmt in build_session_statements(DbKind::SqliteFile, settings) {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn apply_postgres_config(
    conn: &mut sqlx::PgConnection,
    settings: &DbSettings,
) -> Result<(), sqlx::Error> {
    for stmt in build_session_statements(DbKind::Postgres, settings) {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn apply_mysql_config(
    conn: &mut sqlx::MySqlConnection,
    settings: &DbSettings,
) -> Result<(), sqlx::Error> {
    for stmt in build_session_statements(DbKind::MySql, settings) {
        sqlx::query(&stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

fn pg_pool_options(pool_cfg: &ConnectionSettings) -> PgPoolOptions {
    let db_settings = pool_cfg.db_settings.clone();
    PgPoolOptions::new()
        .min_connections(pool_cfg.pool_min)
        .max_connections(pool_cfg.pool_max)
        .acquire_timeout(Duration::from_millis(pool_cfg.acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(30))
        .after_connect(move |conn, _meta| {
            let settings = db_settings.clone();
            Box::pin(async move {
                apply_postgres_config(conn, &settings).await?;
                trace!("db=postgres hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
}

fn mysql_pool_options(pool_cfg: &ConnectionSettings) -> MySqlPoolOptions {
    let db_settings = pool_cfg.db_settings.clone();
    MySqlPoolOptions::new()
        .min_connections(pool_cfg.pool_min)
        .max_connections(pool_cfg.pool_max)
        .acquire_timeout(Duration::from_millis(pool_cfg.acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(30))
        .after_connect(move |conn, _meta| {
            let settings = db_settings.clone();
            Box::pin(async move {
                apply_mysql_config(conn, &settings).await?;
                trace!("db=mysql hook=after_connect ok");
                Ok::<_, sqlx::Error>(())
            })
        })
}

/// Build the runtime pool with per-connection session settings applied by a
/// connect hook, then hand it to SeaORM.
pub async fn build_pool(
    spec: &ConnSpec,
    pool_cfg: &ConnectionSettings,
) -> Result<DatabaseConnection, DbInfraError> {
    let db_kind = spec.db_kind();
    let url = spec.url(DbOwner::App);

    match db_kind {
        DbKind::SqliteFile | DbKind::SqliteMemory => {
            ensure_sqlite_parent(spec)?;

            let mut connect_opts = SqliteConnectOptions::from_str(url)
                .map_err(|e| DbInfraError::config(format!("invalid SQLite connection options: {e}")))?
                .create_if_missing(true);
            if let DbSettings::Sqlite { busy_timeout_ms } = &pool_cfg.db_settings {
                connect_opts =
                    connect_opts.busy_timeout(Duration::from_millis(u64::from(*busy_timeout_ms)));
            }
            if db_kind == DbKind::SqliteFile {
                connect_opts = connect_opts
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal);
            }

            let db_settings = pool_cfg.db_settings.clone();
            let mut pool_opts = SqlitePoolOptions::new()
                .min_connections(pool_cfg.pool_min)
                .max_connections(pool_cfg.pool_max)
                .acquire_timeout(Duration::from_millis(pool_cfg.acquire_timeout_ms));
            if db_kind == DbKind::SqliteMemory {
                // Closing the only connection would drop the database.
                pool_opts = pool_opts.idle_timeout(None).max_lifetime(None);
            }

            let pool = pool_opts
                .after_connect(move |conn, _meta| {
                    let settings = db_settings.clone();
                    Box::pin(async move {
                        apply_sqlite_config(conn, &settings).await?;
                        trace!("db=sqlite hook=after_connect ok");
                        Ok::<_, sqlx::Error>(())
                    })
                })
                .connect_with(connect_opts)
                .await
                .map_err(|e| {
                    DbInfraError::config(format!("failed to create SQLite connection pool: {e}"))
                })?;

            info!(
                "pool=create engine=sqlite path={} min={} max={} acquire_timeout_ms={}",
                get_db_path(spec),
                pool_cfg.pool_min,
                pool_cfg.pool_max,
                pool_cfg.acquire_timeout_ms
            );
            Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
        }
        DbKind::Postgres => {
            let pool = retry_connection(
                move || async move {
                    pg_pool_options(pool_cfg).connect(url).await.map_err(|e| {
                        DbInfraError::config(format!("failed to create Postgres pool: {e}"))
                    })
                },
                5,
                500,
            )
            .await?;

            info!(
                "pool=create engine=postgresql url={} min={} max={} acquire_timeout_ms={}",
                sanitize_db_url(url),
                pool_cfg.pool_min,
                pool_cfg.pool_max,
                pool_cfg.acquire_timeout_ms
            );
            Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
        }
        DbKind::MySql => {
            let pool = retry_connection(
                move || async move {
                    mysql_pool_options(pool_cfg).connect(url).await.map_err(|e| {
                        DbInfraError::config(format!("failed to create MySQL pool: {e}"))
                    })
                },
                5,
                500,
            )
            .await?;

            info!(
                "pool=create engine=mysql url={} min={} max={} acquire_timeout_ms={}",
                sanitize_db_url(url),
                pool_cfg.pool_min,
                pool_cfg.pool_max,
                pool_cfg.acquire_timeout_ms
            );
            Ok(SqlxMySqlConnector::from_sqlx_mysql_pool(pool))
        }
    }
}

/// Sanitize database URL by masking password in connection strings.
/// Used for generating lock keys and logging.
pub fn sanitize_db_url(url: &str) -> String {
    let Some((auth_part, host_part)) = url.rsplit_once('@') else {
        return url.to_string();
    };
    let Some((scheme, credentials)) = auth_part.split_once("://") else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _password)) => format!("{scheme}://{user}:***@{host_part}"),
        None => url.to_string(),
    }
}

async fn fast_path_schema_check(conn: &DatabaseConnection) -> Result<bool, DbInfraError> {
    migration_counters::schema_check();

    let expected_count = Migrator::migrations().len();
    let expected_last = Migrator::migrations()
        .last()
        .map(|m| m.name().to_string())
        .unwrap_or_default();

    let (current_count, current_last) = match Migrator::get_applied_migrations(conn).await {
        Ok(migrations) => {
            let count = migrations.len();
            let last = migrations.last().map(|m| m.name().to_string());
            (count, last)
        }
        Err(DbErr::Exec(_)) | Err(DbErr::Query(_)) => {
            trace!(fastpath = "miss", reason = "migration_table_missing");
            migration_counters::fast_path_miss();
            return Ok(false);
        }
        Err(e) => {
            return Err(DbInfraError::config(format!(
                "failed to get applied migrations: {e}"
            )));
        }
    };

    let is_up_to_date = current_count == expected_count
        && !expected_last.is_empty()
        && current_last.as_deref() == Some(expected_last.as_str());

    if is_up_to_date {
        migration_counters::fast_path_hit();
        trace!(fastpath = "hit", current_count = current_count);
    } else {
        migration_counters::fast_path_miss();
        trace!(
            fastpath = "miss",
            current_count = current_count,
            expected_count = expected_count,
            current_last = %current_last.as_deref().unwrap_or(""),
            expected_last = %expected_last,
            reason = "count_or_version_mismatch"
        );
    }

    Ok(is_up_to_date)
}

/// Build an admin pool for `spec`, run `command` under the migration lock, close the pool.
pub async fn orchestrate_migration(
    spec: &ConnSpec,
    command: MigrationCommand,
) -> Result<(), DbInfraError> {
    orchestrate_migration_with_cancel(spec, command, CancellationToken::new()).await
}

/// [`orchestrate_migration`] that gives up once `cancellation_token` fires,
/// either while backing off for the lock or while the migration body runs.
pub async fn orchestrate_migration_with_cancel(
    spec: &ConnSpec,
    command: MigrationCommand,
    cancellation_token: CancellationToken,
) -> Result<(), DbInfraError> {
    let admin_pool = build_admin_pool(spec).await?;

    let result =
        orchestrate_migration_internal(&admin_pool, spec, command, cancellation_token).await;

    if let Err(e) = admin_pool.close().await {
        warn!(error = %e, "Failed to close admin pool");
    }
    result
}

/// Run `command` on `pool` while holding the cross-process migration lock for `spec`.
pub async fn orchestrate_migration_internal(
    pool: &DatabaseConnection,
    spec: &ConnSpec,
    command: MigrationCommand,
    cancellation_token: CancellationToken,
) -> Result<(), DbInfraError> {
    let env = spec.env();
    let db_kind = spec.db_kind();

    info!(
        "migrate=start env={:?} db_kind={:?} engine={} path={}",
        env,
        db_kind,
        get_db_engine(db_kind),
        get_db_path(spec)
    );

    if matches!(command, MigrationCommand::Status) {
        migrate(pool, command)
            .await
            .map_err(|e| DbInfraError::config(format!("migration execution failed: {e}")))?;
        info!("migrate=done");
        return Ok(());
    }

    let key = format!(
        "counter:migrate:{:?}:{}",
        db_kind,
        sanitize_db_url(spec.url(DbOwner::Owner))
    );

    let result = match db_kind {
        DbKind::Postgres => {
            let lock = PgAdvisoryLock::new(pool.clone(), &key);
            migrate_with_lock(pool, lock, env, db_kind, command, cancellation_token).await
        }
        DbKind::MySql => {
            let lock = MySqlNamedLock::new(pool.clone(), &key);
            migrate_with_lock(pool, lock, env, db_kind, command, cancellation_token).await
        }
        DbKind::SqliteMemory => {
            migrate_with_lock(pool, InMemoryLock, env, db_kind, command, cancellation_token)
                .await
        }
        DbKind::SqliteFile => {
            let lock_path = spec
                .lock_path()
                .ok_or_else(|| DbInfraError::config("SQLite file spec has no lock path"))?;
            let lock = SqliteFileLock::new(&lock_path);
            migrate_with_lock(pool, lock, env, db_kind, command, cancellation_token).await
        }
    };

    if let Err(ref e) = result {
        let error_msg = e.message();
        if error_msg.contains("database is locked") || error_msg.contains("SQLITE_BUSY") {
            migration_counters::busy_event();
            error!("sqlite_busy op=migrate err={:?}", e);
        }
    }

    info!("migrate=done");
    migration_counters::log_snapshot("migrate_orchestration");

    result
}

async fn migrate_with_lock<L>(
    pool: &DatabaseConnection,
    mut lock: L,
    env: RuntimeEnv,
    db_kind: DbKind,
    command: MigrationCommand,
    cancellation_token: CancellationToken,
) -> Result<(), DbInfraError>
where
    L: BootstrapLock,
{
    let connection_settings = build_connection_settings(env, db_kind, PoolPurpose::Migration)?;
    let lock_acquire_ms = std::env::var("COUNTER_MIGRATE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(match env {
            RuntimeEnv::Test => 3000,
            RuntimeEnv::Prod => 900,
        });

    info!(
        acquire_ms = lock_acquire_ms,
        env = ?env,
        db_kind = ?db_kind,
        "migration timeouts configured"
    );

    let start = Instant::now();
    let mut attempts: u32 = 0;
    let guard = loop {
        attempts += 1;

        if matches!(command, MigrationCommand::Up) && fast_path_schema_check(pool).await? {
            info!("migrate=skipped up_to_date=true");
            return Ok(());
        }

        if let Some(acquired_guard) = lock.try_acquire().await? {
            migration_counters::add_lock_acquire_attempts(attempts as usize);
            migration_counters::lock_acquired();
            trace!(
                lock = "won",
                env = ?env,
                db_kind = ?db_kind,
                attempts = attempts,
                elapsed_ms = start.elapsed().as_millis()
            );
            break acquired_guard;
        }

        let base_delay_ms = (5u64 << attempts.saturating_sub(1).min(4)).min(80);
        let jitter_ms = rand::rng().random::<u64>() % 4;
        let delay_ms = base_delay_ms + jitter_ms;

        trace!(
            lock = "backoff",
            attempts = attempts,
            delay_ms = delay_ms,
            elapsed_ms = start.elapsed().as_millis()
        );
        migration_counters::lock_backoff_event();

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                if start.elapsed() >= Duration::from_millis(lock_acquire_ms) {
                    migration_counters::lock_acquire_timeout();
                    return Err(DbInfraError::config(format!(
                        "migration lock acquisition timeout after {:?} ({} attempts)",
                        start.elapsed(),
                        attempts
                    )));
                }
            }
            _ = cancellation_token.cancelled() => {
                info!(
                    elapsed_ms = start.elapsed().as_millis(),
                    attempts = attempts,
                    "Migration cancelled during acquire backoff"
                );
                return Err(DbInfraError::config(format!(
                    "migration cancelled during acquire backoff after {}ms",
                    start.elapsed().as_millis()
                )));
            }
        }
    };

    let result = migrate_with_guard_controlled(
        pool,
        guard,
        env,
        db_kind,
        command,
        cancellation_token,
        connection_settings.db_settings,
    )
    .await;

    let (guard_back, outcome) = match result {
        Ok(guard_back) => (guard_back, Ok(())),
        Err((guard_back, migration_err)) => (guard_back, Err(migration_err)),
    };

    if let Err(release_err) = guard_back.release().await {
        warn!(error = %release_err.message(), "Failed to release migration guard");
    }
    outcome
}

async fn migrate_with_guard_controlled(
    pool: &DatabaseConnection,
    guard: Guard,
    env: RuntimeEnv,
    db_kind: DbKind,
    command: MigrationCommand,
    cancellation_token: CancellationToken,
    db_settings: DbSettings,
) -> Result<Guard, (Guard, DbInfraError)> {
    let start = Instant::now();
    let body_timeout_ms: u64 = 120_000;

    if db_kind == DbKind::SqliteFile {
        if let Err(e) = setup_sqlite_file_prerequisites(pool).await {
            return Err((guard, e));
        }
    }

    if let Err(e) = apply_db_settings(pool, &db_settings, db_kind).await {
        return Err((guard, e));
    }

    // Re-check under the lock: another process may have finished first.
    if matches!(command, MigrationCommand::Up) {
        match fast_path_schema_check(pool).await {
            Ok(true) => {
                info!("migrate=skipped up_to_date=true (after lock acquisition)");
                return Ok(guard);
            }
            Ok(false) => {}
            Err(e) => return Err((guard, e)),
        }
    }

    let pool_clone = pool.clone();
    let mut migration_task = tokio::spawn(async move { migrate(&pool_clone, command).await });

    let migration_result = tokio::select! {
        biased;

        task_result = &mut migration_task => {
            match task_result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    migration_counters::migration_failed();
                    Err(DbInfraError::config(format!("migration execution failed: {e}")))
                }
                Err(join_err) => {
                    migration_counters::migration_failed();
                    if join_err.is_panic() {
                        Err(DbInfraError::config("migration task panicked during execution"))
                    } else {
                        Err(DbInfraError::config("migration task was aborted before completion"))
                    }
                }
            }
        }
        _ = tokio::time::sleep(Duration::from_millis(body_timeout_ms)) => {
            migration_task.abort();
            let _ = migration_task.await;
            info!(
                elapsed_ms = start.elapsed().as_millis(),
                "Migration body timeout - task aborted"
            );
            migration_counters::migration_body_timeout();
            Err(DbInfraError::config(format!(
                "migration body execution timed out after {body_timeout_ms}ms"
            )))
        }
        _ = cancellation_token.cancelled() => {
            migration_task.abort();
            let _ = migration_task.await;
            migration_counters::migration_cancelled();
            Err(DbInfraError::config(format!(
                "migration cancelled during body execution after {}ms",
                start.elapsed().as_millis()
            )))
        }
    };

    if let Err(e) = migration_result {
        return Err((guard, e));
    }

    migration_counters::migrator_ran();
    info!(
        migrator = "ran",
        env = ?env,
        db_kind = ?db_kind,
        elapsed_ms = start.elapsed().as_millis()
    );

    let expected_count = Migrator::migrations().len();
    let applied_count = migration::count_applied_migrations(pool).await.unwrap_or(0);
    info!(
        migrate = "counts",
        expected_count = expected_count,
        applied_count = applied_count
    );

    match command {
        MigrationCommand::Reset => {
            if applied_count != 0 {
                migration_counters::postcheck_mismatch();
                let detail = format!(
                    "Migration verification failed: reset should leave 0 migrations applied, but {applied_count} were found (env={env:?}, db_kind={db_kind:?})"
                );
                return Err((guard, DbInfraError::config(detail)));
            }
        }
        MigrationCommand::Down => {
            info!(
                migrate = "down_complete",
                applied_count = applied_count,
                expected_count = expected_count
            );
        }
        MigrationCommand::Up | MigrationCommand::Fresh | MigrationCommand::Refresh => {
            if applied_count != expected_count {
                migration_counters::postcheck_mismatch();
                let detail = format!(
                    "Migration verification failed: expected {expected_count} migrations, but {applied_count} were applied (env={env:?}, db_kind={db_kind:?})"
                );
                return Err((guard, DbInfraError::config(detail)));
            }
        }
        MigrationCommand::Status => {}
    }

    Ok(guard)
}

async fn apply_db_settings(
    pool: &DatabaseConnection,
    settings: &DbSettings,
    db_kind: DbKind,
) -> Result<(), DbInfraError> {
    let backend = sea_orm::DatabaseBackend::from(db_kind);
    for stmt in build_session_statements(db_kind, settings) {
        pool.execute(sea_orm::Statement::from_string(backend, stmt))
            .await
            .map_err(|e| DbInfraError::config(format!("failed to apply db settings: {e}")))?;
    }
    Ok(())
}

async fn setup_sqlite_file_prerequisites(pool: &DatabaseConnection) -> Result<(), DbInfraError> {
    pool.execute_unprepared("PRAGMA journal_mode = WAL;")
        .await
        .map_err(|e| DbInfraError::config(format!("failed to set journal_mode: {e}")))?;

    pool.execute_unprepared("PRAGMA synchronous = NORMAL;")
        .await
        .map_err(|e| DbInfraError::config(format!("failed to set synchronous: {e}")))?;

    Ok(())
}
