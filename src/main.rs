// EsoxSolutions.ResourcePool - Rust Port
// Bounded resource pool with owner-checked borrowing and statistics

// This is just a binary wrapper - the actual library is in lib.rs
// Run examples with: cargo run --example basic

use esox_resourcepool::{PoolConfiguration, PoolResult, ResourcePool};
use std::sync::Arc;

#[tokio::main]
async fn main() -> PoolResult<()> {
    println!("=== EsoxSolutions.ResourcePool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    // Quick demo
    println!("Quick Demo:");
    let config = PoolConfiguration::new().with_min_size(1).with_max_size(3);
    let pool = ResourcePool::from_fn(|| Ok::<_, std::io::Error>(String::from("channel")), config)?;

    let me = Arc::new(());
    {
        let channel = pool.borrow(&me).await?;
        println!("  Borrowed individual {}: {}", channel.id(), *channel.get_value(&me)?);
    }

    println!("  Available after return: {}", pool.available_count());
    println!("  {}", pool.health_status().description);
    Ok(())
}
