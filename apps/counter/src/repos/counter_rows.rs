//! Counter row repository functions (generic over ConnectionTrait).

use sea_orm::ConnectionTrait;
use serde::Serialize;

use crate::adapters::counter_rows_sea as counter_adapter;
use crate::entities::counter_rows;
use crate::error::{CounterError, StorageFault};
use crate::infra::db_errors::{map_db_err, StoreOp};

/// One persisted counter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterRow {
    pub id: i32,
    pub value: i64,
}

impl From<counter_rows::Model> for CounterRow {
    fn from(model: counter_rows::Model) -> Self {
        Self {
            id: model.id,
            value: model.value,
        }
    }
}

/// Append the next counter row. Call inside a transaction.
pub async fn append_next<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<CounterRow, CounterError> {
    let row = counter_adapter::append_next(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Write, e))?;
    Ok(CounterRow::from(row))
}

/// Value of the most recent row, 0 when the table is empty.
pub async fn last_value<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<i64, CounterError> {
    let last = counter_adapter::find_last(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Read, e))?;
    Ok(last.map_or(0, |row| row.value))
}

pub async fn row_count<C: ConnectionTrait + Send + Sync>(conn: &C) -> Result<u64, CounterError> {
    counter_adapter::count(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Read, e))
}

pub async fn all_rows<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<Vec<CounterRow>, CounterError> {
    let rows = counter_adapter::find_all(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Read, e))?;
    Ok(rows.into_iter().map(CounterRow::from).collect())
}

/// Fails with a schema error when the table is missing or has an incompatible shape.
pub async fn verify_schema<C: ConnectionTrait + Send + Sync>(
    conn: &C,
) -> Result<(), CounterError> {
    counter_adapter::select_columns(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Schema, e))?;

    let columns = counter_adapter::column_types(conn)
        .await
        .map_err(|e| map_db_err(StoreOp::Schema, e))?;
    check_integer_columns(&columns)
}

/// Both counter columns must hold integers.
fn check_integer_columns(columns: &[(String, String)]) -> Result<(), CounterError> {
    for expected in ["id", "value"] {
        let declared = columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(expected))
            .map(|(_, data_type)| data_type.as_str());

        match declared {
            Some(data_type) if data_type.to_ascii_lowercase().contains("int") => {}
            Some(data_type) => {
                return Err(CounterError::schema(
                    StorageFault::Other,
                    format!(
                        "counter_rows.{expected} has type '{data_type}', expected an integer type"
                    ),
                ));
            }
            None => {
                return Err(CounterError::schema(
                    StorageFault::Other,
                    format!("counter_rows.{expected} is missing"),
                ));
            }
        }
    }
    Ok(())
}
