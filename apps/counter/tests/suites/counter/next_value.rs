use counter::CounterError;
use proptest::prelude::*;

use crate::common::proptest_prelude::proptest_prelude_config;
use crate::support::{memory_store, ready_store, TempSqlite};

#[tokio::test]
async fn sequential_calls_yield_one_to_n() -> Result<(), CounterError> {
    let db = TempSqlite::new();
    let store = ready_store(db.spec()).await;

    let mut values = Vec::new();
    for _ in 0..5 {
        values.push(store.next_value().await?);
    }
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    let snapshot = store.snapshot().await?;
    assert_eq!(snapshot.last_value, 5);
    assert_eq!(snapshot.row_count, 5);

    store.close().await;
    Ok(())
}

#[tokio::test]
async fn row_ids_increase_with_values() -> Result<(), CounterError> {
    let store = memory_store().await;
    for _ in 0..4 {
        store.next_value().await?;
    }

    let rows = store.rows().await?;
    assert_eq!(rows.len(), 4);
    assert!(rows.windows(2).all(|w| w[0].id < w[1].id));
    assert!(rows.windows(2).all(|w| w[1].value == w[0].value + 1));
    assert_eq!(rows.first().map(|r| r.value), Some(1));

    store.close().await;
    Ok(())
}

proptest! {
    #![proptest_config(proptest_prelude_config())]

    /// N appends on an empty table return exactly 1..=N and leave N rows.
    #[test]
    fn appends_are_monotonic(n in 1usize..24) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build runtime");

        let (values, snapshot) = rt.block_on(async {
            let store = memory_store().await;
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push(store.next_value().await.expect("next value"));
            }
            let snapshot = store.snapshot().await.expect("snapshot");
            store.close().await;
            (values, snapshot)
        });

        let expected: Vec<i64> = (1..=n as i64).collect();
        prop_assert_eq!(values, expected);
        prop_assert_eq!(snapshot.row_count, n as u64);
        prop_assert_eq!(snapshot.last_value, n as i64);
    }
}
