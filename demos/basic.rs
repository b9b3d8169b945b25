//! Basic usage examples for ResourcePool

use esox_resourcepool::{PoolConfiguration, PoolError, ResourcePool};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Channel {
    id: usize,
}

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    println!("=== EsoxSolutions.ResourcePool - Basic Examples ===\n");

    // Example 1: Borrow and return
    simple_pool().await?;

    // Example 2: Timeouts
    timeouts().await?;

    // Example 3: Grow and shrink
    grow_and_shrink().await?;

    // Example 4: Statistics and health
    stats_and_health().await?;

    Ok(())
}

fn channel_pool(config: PoolConfiguration) -> Result<ResourcePool<Channel>, PoolError> {
    let next = Arc::new(AtomicUsize::new(1));
    ResourcePool::from_fn(
        move || Ok::<_, std::io::Error>(Channel { id: next.fetch_add(1, Ordering::Relaxed) }),
        config,
    )
}

async fn simple_pool() -> Result<(), PoolError> {
    println!("1. Simple Pool:");
    let pool = channel_pool(PoolConfiguration::new().with_max_size(2))?;
    let publisher = Arc::new("publisher");

    {
        let channel = pool.borrow(&publisher).await?;
        println!("   Got channel {}", channel.get_value(&publisher)?.id);
        // Returned to the pool when dropped
    }

    println!("   Available after return: {}\n", pool.available_count());
    Ok(())
}

async fn timeouts() -> Result<(), PoolError> {
    println!("2. Timeouts:");
    let pool = channel_pool(PoolConfiguration::new().with_max_size(1))?;
    let first = Arc::new("first");
    let second = Arc::new("second");

    let _held = pool.borrow(&first).await?;
    match pool.borrow_with_timeout(&second, Duration::from_millis(10)).await {
        Err(PoolError::Timeout(after)) => println!("   Second borrower timed out after {after:?}\n"),
        other => println!("   Unexpected: {other:?}\n"),
    }
    Ok(())
}

async fn grow_and_shrink() -> Result<(), PoolError> {
    println!("3. Grow and Shrink:");
    let pool = channel_pool(PoolConfiguration::new().with_min_size(2).with_max_size(6))?;
    let worker = Arc::new("worker");

    let mut borrowed = Vec::new();
    for _ in 0..6 {
        borrowed.push(pool.borrow(&worker).await?);
    }
    println!("   Under load: count={}", pool.count());

    for individual in borrowed {
        pool.give_back(individual);
    }
    println!("   After load: count={}\n", pool.count());
    Ok(())
}

async fn stats_and_health() -> Result<(), PoolError> {
    println!("4. Statistics and Health:");
    let pool = channel_pool(PoolConfiguration::new().with_max_size(3))?;
    let worker = Arc::new("worker");

    for _ in 0..5 {
        let _channel = pool.borrow(&worker).await?;
    }

    let health = pool.health_status();
    println!("   {}", health.description);

    if let Some(stats) = pool.stats() {
        let all_time = stats.period(esox_resourcepool::Granularity::AllTime);
        println!("   Requests: {}", all_time.requests);
        println!("   Hit ratio: {:.2}", all_time.hit_ratio());
    }

    println!("\n   Prometheus:");
    print!("{}", pool.export_metrics_prometheus("channels", None)?);
    Ok(())
}
