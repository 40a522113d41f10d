//! SeaORM -> CounterError translation helpers.
//!
//! Adapters return `sea_orm::DbErr`; the store converts it here, tagging the
//! error with the operation that failed and a [`StorageFault`] derived from
//! the SQLSTATE or vendor code of the underlying sqlx error.

use sea_orm::{DbErr, RuntimeErr};
use sqlx::error::ErrorKind;
use sqlx::mysql::MySqlDatabaseError;
use tracing::{error, warn};

use crate::error::{CounterError, StorageFault};

/// Which store operation a storage fault interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Schema,
    Write,
    Read,
}

fn mentions_sqlstate(msg: &str, code: &str) -> bool {
    msg.contains(&format!("SQLSTATE({code})")) || msg.contains(&format!("({code})"))
}

fn database_error(e: &DbErr) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    let runtime = match e {
        DbErr::Exec(r) | DbErr::Query(r) | DbErr::Conn(r) => r,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db)) => Some(&**db),
        _ => None,
    }
}

fn classify_sqlite(code: &str) -> Option<StorageFault> {
    // Extended result codes: the primary code is the low byte.
    let primary = code.parse::<u32>().ok()? & 0xff;
    match primary {
        5 | 6 => Some(StorageFault::Busy),
        19 => Some(StorageFault::Constraint),
        _ => None,
    }
}

fn classify_mysql(number: u16) -> Option<StorageFault> {
    match number {
        1213 => Some(StorageFault::Conflict),
        1205 => Some(StorageFault::Busy),
        1062 | 1048 | 1452 | 1451 => Some(StorageFault::Constraint),
        3024 => Some(StorageFault::Timeout),
        _ => None,
    }
}

fn classify_sqlstate(state: &str) -> Option<StorageFault> {
    match state {
        "40001" | "40P01" => Some(StorageFault::Conflict),
        "55P03" => Some(StorageFault::Busy),
        "57014" => Some(StorageFault::Timeout),
        s if s.starts_with("23") => Some(StorageFault::Constraint),
        s if s.starts_with("08") => Some(StorageFault::Unavailable),
        _ => None,
    }
}

/// Best-effort classification from an error message alone.
pub fn classify_message(msg: &str) -> StorageFault {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
        || lower.contains("lock wait timeout")
        || mentions_sqlstate(msg, "55P03")
    {
        return StorageFault::Busy;
    }
    if lower.contains("deadlock")
        || mentions_sqlstate(msg, "40001")
        || mentions_sqlstate(msg, "40P01")
    {
        return StorageFault::Conflict;
    }
    if lower.contains("unique constraint failed")
        || lower.contains("duplicate key value violates unique constraint")
        || lower.contains("duplicate entry")
        || mentions_sqlstate(msg, "23505")
    {
        return StorageFault::Constraint;
    }
    if lower.contains("timeout") || lower.contains("timed out") {
        return StorageFault::Timeout;
    }
    StorageFault::Other
}

/// Classify a `DbErr` without consuming it.
pub fn classify(e: &DbErr) -> StorageFault {
    match e {
        DbErr::ConnectionAcquire(_) => return StorageFault::Unavailable,
        DbErr::Conn(_) => {
            let msg = e.to_string();
            return if msg.to_ascii_lowercase().contains("timed out") {
                StorageFault::Timeout
            } else {
                StorageFault::Unavailable
            };
        }
        _ => {}
    }

    if let Some(db) = database_error(e) {
        if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
            if let Some(fault) = classify_mysql(mysql.number()) {
                return fault;
            }
        }

        if let Some(code) = db.code() {
            let fault = if db.try_downcast_ref::<sqlx::sqlite::SqliteError>().is_some() {
                classify_sqlite(&code)
            } else {
                classify_sqlstate(&code)
            };
            if let Some(fault) = fault {
                return fault;
            }
        }

        if !matches!(db.kind(), ErrorKind::Other) {
            return StorageFault::Constraint;
        }
    }

    classify_message(&e.to_string())
}

/// Translate a `DbErr` raised during `op` into a `CounterError`.
pub fn map_db_err(op: StoreOp, e: DbErr) -> CounterError {
    let fault = classify(&e);
    let detail = e.to_string();

    match fault {
        StorageFault::Other | StorageFault::Constraint => {
            error!(op = ?op, fault = %fault, raw_error = %detail, "Unhandled database error");
        }
        _ => {
            warn!(op = ?op, fault = %fault, raw_error = %detail, "Database operation failed");
        }
    }

    match op {
        StoreOp::Schema => CounterError::schema(fault, detail),
        StoreOp::Write => CounterError::write(fault, detail),
        StoreOp::Read => CounterError::read(fault, detail),
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::ConnAcquireErr;

    use super::*;

    fn exec(msg: &str) -> DbErr {
        DbErr::Exec(RuntimeErr::Internal(msg.to_string()))
    }

    #[test]
    fn pool_timeouts_are_unavailable() {
        let e = DbErr::ConnectionAcquire(ConnAcquireErr::Timeout);
        assert_eq!(classify(&e), StorageFault::Unavailable);
    }

    #[test]
    fn sqlite_lock_messages_are_busy() {
        assert_eq!(classify(&exec("database is locked")), StorageFault::Busy);
        assert_eq!(
            classify(&exec("error returned from database: (code: 5) database is locked")),
            StorageFault::Busy
        );
    }

    #[test]
    fn deadlocks_are_conflicts() {
        assert_eq!(
            classify(&exec("Deadlock found when trying to get lock")),
            StorageFault::Conflict
        );
        assert_eq!(
            classify(&exec("could not serialize access SQLSTATE(40001)")),
            StorageFault::Conflict
        );
    }

    #[test]
    fn unique_violations_are_constraints() {
        assert_eq!(
            classify(&exec("UNIQUE constraint failed: counter_rows.id")),
            StorageFault::Constraint
        );
        assert_eq!(
            classify(&exec("Duplicate entry '1' for key 'PRIMARY'")),
            StorageFault::Constraint
        );
    }

    #[test]
    fn sqlite_extended_codes_reduce_to_primary() {
        assert_eq!(classify_sqlite("517"), Some(StorageFault::Busy));
        assert_eq!(classify_sqlite("2067"), Some(StorageFault::Constraint));
        assert_eq!(classify_sqlite("1"), None);
    }

    #[test]
    fn sqlstates_classify() {
        assert_eq!(classify_sqlstate("40P01"), Some(StorageFault::Conflict));
        assert_eq!(classify_sqlstate("57014"), Some(StorageFault::Timeout));
        assert_eq!(classify_sqlstate("08006"), Some(StorageFault::Unavailable));
        assert_eq!(classify_sqlstate("42P01"), None);
    }

    #[test]
    fn mapping_keeps_operation() {
        let err = map_db_err(StoreOp::Write, exec("database is locked"));
        assert_eq!(err.code(), "WRITE_ERROR");
        assert_eq!(err.fault(), Some(StorageFault::Busy));

        let err = map_db_err(StoreOp::Read, exec("no such table: counter_rows"));
        assert_eq!(err.code(), "READ_ERROR");
        assert_eq!(err.fault(), Some(StorageFault::Other));
    }
}
