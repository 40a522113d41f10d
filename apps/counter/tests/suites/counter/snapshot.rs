use counter::{CounterError, Snapshot};
use serial_test::serial;

use crate::support::TestDb;

#[tokio::test]
#[serial(counter_db)]
async fn fresh_table_reports_zero_zero() -> Result<(), CounterError> {
    let db = TestDb::from_env();
    let store = db.empty_store().await;

    assert_eq!(store.snapshot().await?, Snapshot::default());
    assert_eq!(
        store.consistent_snapshot().await?,
        Snapshot {
            last_value: 0,
            row_count: 0
        }
    );
    assert!(store.rows().await?.is_empty());

    store.close().await;
    Ok(())
}

#[tokio::test]
#[serial(counter_db)]
async fn consistent_snapshot_matches_plain_snapshot_when_quiet() -> Result<(), CounterError> {
    let db = TestDb::from_env();
    let store = db.empty_store().await;
    for _ in 0..3 {
        store.next_value().await?;
    }

    let plain = store.snapshot().await?;
    let consistent = store.consistent_snapshot().await?;
    assert_eq!(plain, consistent);
    assert_eq!(consistent.last_value, 3);
    assert_eq!(consistent.row_count, 3);

    store.close().await;
    Ok(())
}

#[tokio::test]
#[serial(counter_db)]
async fn snapshot_reads_last_row_not_max_count() -> Result<(), CounterError> {
    use sea_orm::ConnectionTrait;

    let db = TestDb::from_env();
    let store = db.empty_store().await;
    // Rows written outside the store: last value follows the highest id.
    store
        .connection()
        .execute_unprepared("INSERT INTO counter_rows (value) VALUES (40), (41)")
        .await
        .map_err(|e| CounterError::write(counter::StorageFault::Other, e.to_string()))?;

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.last_value, 41);
    assert_eq!(snapshot.row_count, 2);
    assert_eq!(store.next_value().await?, 42);

    store.close().await;
    Ok(())
}
