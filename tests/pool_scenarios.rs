//! End-to-end borrow/return scenarios

use esox_resourcepool::{BoxError, Granularity, PoolConfiguration, PoolError, ResourcePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

struct Channel {
    number: usize,
    closed: Arc<AtomicUsize>,
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn channel_pool(config: PoolConfiguration) -> (ResourcePool<Channel>, Arc<AtomicUsize>) {
    let closed = Arc::new(AtomicUsize::new(0));
    let opened = Arc::new(AtomicUsize::new(0));
    let on_close = Arc::clone(&closed);
    let pool = ResourcePool::from_fn(
        move || {
            Ok::<_, BoxError>(Channel {
                number: opened.fetch_add(1, Ordering::SeqCst),
                closed: Arc::clone(&on_close),
            })
        },
        config,
    )
    .unwrap();
    (pool, closed)
}

async fn wait_for_count<T: Send + 'static>(pool: &ResourcePool<T>, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while pool.count() != expected && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn grows_under_load_and_shrinks_back_to_min_size() {
    let (pool, closed) = channel_pool(PoolConfiguration::new().with_min_size(7).with_max_size(10));
    let owner = Arc::new(());

    let mut borrowed = Vec::new();
    for _ in 0..10 {
        borrowed.push(pool.borrow(&owner).await.unwrap());
    }
    assert_eq!(pool.count(), 10);
    assert_eq!(pool.in_use_count(), 10);

    for individual in borrowed.drain(..5) {
        assert!(pool.give_back(individual));
    }
    assert_eq!(pool.count(), 10);
    assert_eq!(pool.available_count(), 5);
    assert_eq!(pool.in_use_count(), 5);

    let recycled: Vec<bool> = borrowed.drain(..4).map(|i| pool.give_back(i)).collect();
    assert_eq!(recycled, vec![true, false, false, false]);
    assert_eq!(pool.count(), 7);
    assert_eq!(closed.load(Ordering::SeqCst), 3);

    let _next = pool.borrow(&owner).await.unwrap();
    wait_for_count(&pool, 8).await;
    assert_eq!(pool.count(), 8);
}

#[tokio::test]
async fn second_borrower_times_out_while_first_holds() {
    let (pool, _) = channel_pool(PoolConfiguration::new().with_min_size(1).with_max_size(1));
    assert_eq!(pool.warmup().await, 1);
    let first = Arc::new("first");
    let second = Arc::new("second");

    let _held = pool.borrow(&first).await.unwrap();
    let err = pool
        .borrow_with_timeout(&second, Duration::from_millis(1))
        .await
        .unwrap_err();

    assert_eq!(err, PoolError::Timeout(Duration::from_millis(1)));
    let stats = pool.stats().unwrap().period(Granularity::AllTime);
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.timeouts, 1);
    assert_eq!(stats.waits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_borrowers_never_exceed_max_size() {
    const MAX: usize = 3;
    let (pool, _) = channel_pool(
        PoolConfiguration::new()
            .with_min_size(MAX)
            .with_max_size(MAX)
            .with_timeout(Duration::from_secs(10)),
    );
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = JoinSet::new();
    for worker in 0..24 {
        let pool = pool.clone();
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        tasks.spawn(async move {
            let owner = Arc::new(worker);
            let individual = pool.borrow(&owner).await.expect("borrow within deadline");
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            assert!(pool.count() <= MAX);

            tokio::time::sleep(Duration::from_millis(2)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            drop(individual);
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= MAX);
    assert!(pool.count() <= MAX);
    assert_eq!(pool.in_use_count(), 0);
}

#[tokio::test]
async fn matched_returns_restore_count() {
    let config = PoolConfiguration::new()
        .with_min_size(5)
        .with_max_size(5)
        .with_eager_initialize(true);
    let closed = Arc::new(AtomicUsize::new(0));
    let on_close = Arc::clone(&closed);
    let pool = ResourcePool::initialize(
        esox_resourcepool::FnFactory::new(move || {
            Ok::<_, BoxError>(Channel {
                number: 0,
                closed: Arc::clone(&on_close),
            })
        }),
        config,
    )
    .await
    .unwrap();
    assert_eq!(pool.count(), 5);

    let owner = Arc::new(());
    let mut borrowed = Vec::new();
    for _ in 0..5 {
        borrowed.push(pool.borrow(&owner).await.unwrap());
    }
    for individual in borrowed {
        assert!(pool.give_back(individual));
    }

    assert_eq!(pool.count(), 5);
    assert_eq!(pool.available_count(), 5);
    assert_eq!(closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn only_the_borrower_can_read_the_value() {
    let (pool, _) = channel_pool(PoolConfiguration::new().with_max_size(2));
    let owner = Arc::new("owner");
    let intruder = Arc::new("owner");

    let individual = pool.borrow(&owner).await.unwrap();
    assert_eq!(individual.get_value(&owner).unwrap().number, 0);
    assert!(matches!(
        individual.get_value(&intruder),
        Err(PoolError::InvalidOperation(_))
    ));

    // After a round trip the next borrower owns it and the old one does not.
    drop(individual);
    let individual = pool.borrow(&intruder).await.unwrap();
    assert_eq!(individual.get_value(&intruder).unwrap().number, 0);
    assert!(individual.get_value(&owner).is_err());
}

#[tokio::test]
async fn disposed_pool_rejects_borrow_in_any_state() {
    let owner = Arc::new(());

    let (fresh, _) = channel_pool(PoolConfiguration::new().with_max_size(2));
    fresh.dispose();
    assert_eq!(
        fresh.borrow(&owner).await.unwrap_err(),
        PoolError::ObjectDisposed("ResourcePool")
    );

    let (busy, _) = channel_pool(PoolConfiguration::new().with_max_size(2));
    let _held = busy.borrow(&owner).await.unwrap();
    busy.dispose();
    assert!(matches!(
        busy.borrow(&owner).await,
        Err(PoolError::ObjectDisposed(_))
    ));

    let (idle, closed) = channel_pool(PoolConfiguration::new().with_max_size(2));
    drop(idle.borrow(&owner).await.unwrap());
    assert_eq!(idle.available_count(), 1);
    idle.dispose();
    idle.dispose();
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        idle.borrow_with_timeout(&owner, Duration::from_millis(5)).await,
        Err(PoolError::ObjectDisposed(_))
    ));
}

#[tokio::test]
async fn stale_return_is_disposed_not_requeued() {
    let (pool, closed) = channel_pool(PoolConfiguration::new().with_max_size(2));
    let owner = Arc::new(());
    let individual = pool.borrow(&owner).await.unwrap();

    drop(owner);
    assert_eq!(pool.purge(), 1);
    assert!(!pool.give_back(individual));

    assert_eq!(pool.available_count(), 0);
    assert_eq!(pool.count(), 0);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn purge_does_not_block_on_a_value_still_in_hand() {
    let (pool, closed) = channel_pool(PoolConfiguration::new().with_max_size(1));
    let owner = Arc::new(());
    let individual = pool.borrow(&owner).await.unwrap();
    let value = individual.get_value(&owner).unwrap();

    // Same thread still holds the value; purge must not wait for it.
    drop(owner);
    assert_eq!(pool.purge(), 1);
    assert!(individual.is_disposed());
    assert_eq!(closed.load(Ordering::SeqCst), 0);
    assert_eq!(value.number, 0);

    drop(value);
    assert!(!pool.give_back(individual));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.count(), 0);
}

#[tokio::test]
async fn fresh_pool_reports_zero_ratios() {
    let (pool, _) = channel_pool(PoolConfiguration::default());
    let stats = pool.stats().unwrap();
    for granularity in Granularity::ALL {
        let period = stats.period(granularity);
        assert_eq!(period.hit_ratio(), 0.0);
        assert_eq!(period.timeout_ratio(), 0.0);
        assert_eq!(period.purge_ratio(), 0.0);
        assert_eq!(period.disposed_ratio(), 0.0);
    }
}

#[tokio::test]
async fn one_miss_then_one_hit_is_half_hit_ratio() {
    let (pool, _) = channel_pool(PoolConfiguration::new().with_max_size(2));
    let owner = Arc::new(());

    drop(pool.borrow(&owner).await.unwrap());
    drop(pool.borrow(&owner).await.unwrap());

    let period = pool.stats().unwrap().period(Granularity::AllTime);
    assert_eq!(period.requests, 2);
    assert_eq!(period.hit_ratio(), 0.5);
}

#[cfg(feature = "metrics")]
#[tokio::test]
async fn exports_stats_document() {
    let (pool, _) = channel_pool(PoolConfiguration::new().with_max_size(2));
    let owner = Arc::new(());
    drop(pool.borrow(&owner).await.unwrap());

    let document = pool.export_stats_json().unwrap().unwrap();
    let all_time = &document["periods"][5];
    assert_eq!(all_time["granularity"], "all_time");
    assert_eq!(all_time["requests"], 1);
    assert_eq!(all_time["returns"], 1);

    let (quiet, _) = channel_pool(PoolConfiguration::new().with_gather_stats(false));
    assert!(quiet.export_stats_json().unwrap().is_none());
}
