use std::sync::Arc;

use counter::{CounterError, CounterStore};
use serial_test::serial;

use crate::support::TestDb;

const CALLERS: i64 = 10;

fn expected() -> Vec<i64> {
    (1..=CALLERS).collect()
}

/// Independent stores (own pools) racing on one empty table get exactly 1..=10.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial(counter_db)]
async fn independent_stores_get_distinct_consecutive_values() -> Result<(), CounterError> {
    let db = TestDb::from_env();
    let auditor = db.empty_store().await;

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let spec = db.spec();
        handles.push(tokio::spawn(async move {
            let store = CounterStore::open(spec).await?;
            let value = store.next_value().await;
            store.close().await;
            value
        }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.expect("task panicked")?);
    }
    values.sort_unstable();
    assert_eq!(values, expected());

    let mut stored: Vec<i64> = auditor.rows().await?.iter().map(|r| r.value).collect();
    stored.sort_unstable();
    assert_eq!(stored, expected());
    assert_eq!(auditor.snapshot().await?.row_count, CALLERS as u64);

    auditor.close().await;
    Ok(())
}

/// One shared store whose pool hands out several connections at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial(counter_db)]
async fn shared_store_serialises_appends() -> Result<(), CounterError> {
    let db = TestDb::from_env();
    let store = Arc::new(db.empty_store().await);

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move { store.next_value().await }));
    }

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.expect("task panicked")?);
    }
    values.sort_unstable();
    assert_eq!(values, expected());

    let rows = store.rows().await?;
    assert_eq!(
        rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        expected(),
        "id order must match value order"
    );
    Ok(())
}
