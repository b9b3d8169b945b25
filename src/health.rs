//! Health reporting for resource pools

use std::time::Duration;

#[cfg(feature = "metrics")]
use serde::Serialize;

/// Coarse pool state for health aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub enum PoolHealth {
    Healthy,

    /// Every resource the pool may hold is borrowed
    Saturated,
}

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{HealthStatus, PoolHealth};
///
/// let health = HealthStatus::new(2, 3, 5, 10);
/// assert!(health.is_healthy());
/// assert_eq!(health.status, PoolHealth::Healthy);
///
/// let health = HealthStatus::new(10, 0, 10, 10);
/// assert_eq!(health.status, PoolHealth::Saturated);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "metrics", derive(Serialize))]
pub struct HealthStatus {
    pub status: PoolHealth,

    /// Human-readable summary
    pub description: String,

    /// Borrowed resources
    pub in_use: usize,

    /// Idle resources
    pub available: usize,

    /// Resources owned by the pool
    pub count: usize,

    pub max_size: usize,

    /// Borrowed share of `max_size` (0.0 to 1.0)
    pub utilization: f64,
}

impl HealthStatus {
    pub fn new(in_use: usize, available: usize, count: usize, max_size: usize) -> Self {
        let utilization = if max_size > 0 {
            in_use as f64 / max_size as f64
        } else {
            0.0
        };

        let (status, description) = if in_use >= max_size {
            (
                PoolHealth::Saturated,
                format!("Pool saturated: {in_use} of {max_size} resources in use"),
            )
        } else {
            (
                PoolHealth::Healthy,
                format!(
                    "Pool healthy: {in_use} in use, {available} available, {count} of {max_size} created"
                ),
            )
        };

        Self {
            status,
            description,
            in_use,
            available,
            count,
            max_size,
            utilization,
        }
    }

    /// Status for a pool whose lock could not be taken within `waited`.
    /// No borrow can be served, so it reads as saturated.
    pub fn unresponsive(count: usize, max_size: usize, waited: Duration) -> Self {
        Self {
            status: PoolHealth::Saturated,
            description: format!("Pool unresponsive: lock not acquired within {waited:?}"),
            in_use: count,
            available: 0,
            count,
            max_size,
            utilization: if max_size > 0 {
                count as f64 / max_size as f64
            } else {
                0.0
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == PoolHealth::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturated_at_max() {
        let health = HealthStatus::new(4, 0, 4, 4);
        assert_eq!(health.status, PoolHealth::Saturated);
        assert!(health.description.contains("4 of 4"));
        assert_eq!(health.utilization, 1.0);
    }

    #[test]
    fn test_unresponsive_reads_saturated() {
        let health = HealthStatus::unresponsive(2, 4, Duration::from_millis(30));
        assert!(!health.is_healthy());
        assert_eq!(health.in_use, 2);
        assert!(health.description.contains("30ms"));
    }

    #[test]
    fn test_healthy_below_max() {
        let health = HealthStatus::new(1, 1, 2, 4);
        assert!(health.is_healthy());
        assert_eq!(health.utilization, 0.25);
    }
}
