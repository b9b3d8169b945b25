//! Purging resources abandoned by their borrowers

use esox_resourcepool::{AsyncFnFactory, PoolConfiguration, PoolError, ResourcePool};
use std::sync::Arc;
use std::time::Duration;

struct Connection {
    peer: String,
}

impl Drop for Connection {
    fn drop(&mut self) {
        println!("   closing connection to {}", self.peer);
    }
}

struct Subscriber {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), PoolError> {
    println!("=== EsoxSolutions.ResourcePool - Leak Detection ===\n");

    let factory = AsyncFnFactory::new(|| async {
        // Simulate a slow handshake
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok::<_, std::io::Error>(Connection {
            peer: "broker:5672".to_string(),
        })
    });
    let config = PoolConfiguration::new()
        .with_max_size(1)
        .with_timeout(Duration::from_millis(100));
    let pool = ResourcePool::new(factory, config)?;

    let subscriber = Arc::new(Subscriber {
        name: "orders".to_string(),
    });
    let connection = pool.borrow(&subscriber).await?;
    println!("1. {} borrowed individual {}", subscriber.name, connection.id());

    // The subscriber goes away but its handle is parked elsewhere.
    drop(subscriber);
    let parked = vec![connection];

    println!("2. Health before purge: {}", pool.health_status().description);
    let health = pool.check_health().await;
    println!("3. Health after purge: {}", health.description);

    let auditor = Arc::new(Subscriber {
        name: "audit".to_string(),
    });
    let connection = pool.borrow(&auditor).await?;
    println!("4. {} borrowed individual {}", auditor.name, connection.id());

    drop(parked);
    Ok(())
}
