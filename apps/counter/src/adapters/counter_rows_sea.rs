//! SeaORM adapter for the counter table.
//!
//! `append_next` must run inside a transaction: each engine gets the locking
//! statement that makes read-max-then-insert atomic against concurrent callers.

use sea_orm::{
    ConnectionTrait, DatabaseBackend, DbErr, EntityTrait, PaginatorTrait, QueryOrder, Statement,
};

use crate::entities::counter_rows;

// Adapter functions return DbErr; the repos layer maps to CounterError.

const INSERT_NEXT: &str = "INSERT INTO counter_rows (value) \
     SELECT COALESCE(MAX(value), 0) + 1 FROM counter_rows";

const INSERT_NEXT_RETURNING: &str = "INSERT INTO counter_rows (value) \
     SELECT COALESCE(MAX(value), 0) + 1 FROM counter_rows \
     RETURNING id, value";

/// Append the row holding `max(value) + 1` and return it.
pub async fn append_next<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<counter_rows::Model, DbErr> {
    let backend = conn.get_database_backend();

    match backend {
        DatabaseBackend::Postgres => {
            // Conflicts with itself, so appenders queue; plain readers are not blocked.
            conn.execute(Statement::from_string(
                backend,
                "LOCK TABLE counter_rows IN SHARE ROW EXCLUSIVE MODE",
            ))
            .await?;
            insert_returning(conn, backend).await
        }
        DatabaseBackend::Sqlite => {
            // First statement of the transaction takes the write lock before reading MAX.
            insert_returning(conn, backend).await
        }
        DatabaseBackend::MySql => {
            let guard = conn
                .query_one(Statement::from_string(
                    backend,
                    "SELECT id FROM counter_rows_lock WHERE id = 1 FOR UPDATE",
                ))
                .await?;
            if guard.is_none() {
                return Err(DbErr::RecordNotFound(
                    "counter_rows_lock guard row is missing".to_string(),
                ));
            }

            let inserted = conn
                .execute(Statement::from_string(backend, INSERT_NEXT))
                .await?;
            let id = i32::try_from(inserted.last_insert_id()).map_err(|_| {
                DbErr::Custom(format!(
                    "counter_rows id {} out of range",
                    inserted.last_insert_id()
                ))
            })?;

            counter_rows::Entity::find_by_id(id)
                .one(conn)
                .await?
                .ok_or_else(|| DbErr::RecordNotFound(format!("counter_rows.id={id} not found")))
        }
    }
}

async fn insert_returning<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    backend: DatabaseBackend,
) -> Result<counter_rows::Model, DbErr> {
    counter_rows::Entity::find()
        .from_raw_sql(Statement::from_string(backend, INSERT_NEXT_RETURNING))
        .one(conn)
        .await?
        .ok_or(DbErr::RecordNotInserted)
}

/// Row with the greatest id, if any.
pub async fn find_last<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Option<counter_rows::Model>, DbErr> {
    counter_rows::Entity::find()
        .order_by_desc(counter_rows::Column::Id)
        .one(conn)
        .await
}

pub async fn count<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<u64, DbErr> {
    counter_rows::Entity::find().count(conn).await
}

pub async fn find_all<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<counter_rows::Model>, DbErr> {
    counter_rows::Entity::find()
        .order_by_asc(counter_rows::Column::Id)
        .all(conn)
        .await
}

/// Select both columns without touching any row; fails if the table is
/// missing or lacks one of them.
pub async fn select_columns<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<(), DbErr> {
    conn.query_all(Statement::from_string(
        conn.get_database_backend(),
        "SELECT id, value FROM counter_rows WHERE 1 = 0",
    ))
    .await
    .map(|_| ())
}

fn column_types_sql(backend: DatabaseBackend) -> &'static str {
    match backend {
        DatabaseBackend::Postgres => {
            "SELECT column_name::text AS name, data_type::text AS data_type \
             FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = 'counter_rows'"
        }
        DatabaseBackend::MySql => {
            "SELECT CAST(COLUMN_NAME AS CHAR) AS name, CAST(DATA_TYPE AS CHAR) AS data_type \
             FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = 'counter_rows'"
        }
        DatabaseBackend::Sqlite => {
            "SELECT name, type AS data_type FROM pragma_table_info('counter_rows')"
        }
    }
}

/// Declared type of each counter column, keyed by column name.
pub async fn column_types<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<(String, String)>, DbErr> {
    let backend = conn.get_database_backend();
    let rows = conn
        .query_all(Statement::from_string(backend, column_types_sql(backend)))
        .await?;

    rows.iter()
        .map(|row| {
            let name: String = row.try_get("", "name")?;
            let data_type: String = row.try_get("", "data_type")?;
            Ok((name, data_type))
        })
        .collect()
}
