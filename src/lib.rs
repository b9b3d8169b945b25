//! # EsoxSolutions.ResourcePool
//!
//! Bounded, thread-safe pool for expensive resources such as broker
//! channels or network connections.
//!
//! ## Features
//!
//! - Resources built on demand by a factory, outside the pool lock
//! - Single-flight background growth up to `max_size`
//! - Shrinks back towards `min_size` once load subsides
//! - Borrowed handles bound to their owner and checked on every access
//! - Automatic return of handles via RAII (Drop trait)
//! - Every borrow carries a deadline; a stuck pool yields `Timeout`
//! - Purge of abandoned handles whose owner is gone
//! - Minute/hour/day/month/year/all-time statistics
//! - Health status and Prometheus metrics export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{PoolConfiguration, ResourcePool};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = ResourcePool::from_fn(
//!     || Ok::<_, std::io::Error>(String::from("channel")),
//!     PoolConfiguration::new().with_max_size(4),
//! )
//! .unwrap();
//!
//! let me = Arc::new(());
//! {
//!     let channel = pool.borrow(&me).await.unwrap();
//!     println!("Got: {}", *channel.get_value(&me).unwrap());
//!     // Returned to the pool when `channel` goes out of scope
//! }
//! # }
//! ```

mod pool;
mod config;
mod factory;
mod individual;
mod stats;
mod health;
#[cfg(feature = "metrics")]
mod metrics;
mod errors;

pub use pool::ResourcePool;
pub use config::PoolConfiguration;
pub use factory::{AsyncFnFactory, FnFactory, ResourceFactory};
pub use individual::{Individual, ValueGuard};
pub use stats::{Granularity, PoolStats, PoolStatsPeriod, PoolStatsSnapshot};
pub use health::{HealthStatus, PoolHealth};
#[cfg(feature = "metrics")]
pub use metrics::{MetricsExporter, PoolGauges};
pub use errors::{BoxError, PoolError, PoolResult};
