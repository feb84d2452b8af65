//! Storing the same bar range twice must leave the cache in the same state
//! it was in after the first store — no duplicate rows, and the second
//! write reports as an update rather than an insert.

use btk_bar::{Bar, Interval, Micros};
use btk_cache::CacheStore;

fn bar(ts: i64, close: i64) -> Bar {
    Bar::new("AAPL", Interval::M5, ts, Micros::new(close), Micros::new(close), Micros::new(close), Micros::new(close), 500).unwrap()
}

#[tokio::test]
async fn restoring_identical_bars_is_a_pure_update() {
    let pool = btk_testkit::fresh_cache_pool().await;
    let store = CacheStore::new(pool);
    let bars = vec![bar(0, 1_000_000), bar(300, 1_010_000), bar(600, 1_020_000)];

    let first = store.store("AAPL", Interval::M5, &bars, "fetcher", 1).await.unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.updated, 0);

    let second = store.store("AAPL", Interval::M5, &bars, "fetcher", 2).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 3);

    let series = store.get("AAPL", Interval::M5, None).await.unwrap();
    assert_eq!(series.len(), 3, "identical re-fetch must not duplicate rows");
    assert!(store.has("AAPL", Interval::M5, (0, 600)).await.unwrap());
}
