//! Pool configuration options

use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

/// Configuration for resource pool behavior
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_min_size(2)
///     .with_max_size(8)
///     .with_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.min_size, 2);
/// assert_eq!(config.max_size, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfiguration {
    /// Number of resources the pool keeps around once load subsides
    pub min_size: usize,

    /// Upper bound on resources owned by the pool (available + in use)
    pub max_size: usize,

    /// Construct `min_size` resources when the pool is created
    pub eager_initialize: bool,

    /// Record time-bucketed statistics
    pub gather_stats: bool,

    /// Wait bound used when a borrow does not pass its own timeout
    pub default_timeout: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 10,
            eager_initialize: false,
            gather_stats: true,
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum pool size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_max_size(50);
    /// assert_eq!(config.max_size, 50);
    /// ```
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Pre-warm `min_size` resources at start-up
    pub fn with_eager_initialize(mut self, eager: bool) -> Self {
        self.eager_initialize = eager;
        self
    }

    /// Enable or disable statistics gathering
    pub fn with_gather_stats(mut self, gather: bool) -> Self {
        self.gather_stats = gather;
        self
    }

    /// Set the default borrow timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Apply the construction rules: `max_size` is raised to `min_size`
    /// when smaller, and must end up at least 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new()
    ///     .with_min_size(4)
    ///     .with_max_size(2)
    ///     .normalized()
    ///     .unwrap();
    /// assert_eq!(config.max_size, 4);
    ///
    /// assert!(PoolConfiguration::new().with_max_size(0).normalized().is_err());
    /// ```
    pub fn normalized(mut self) -> PoolResult<Self> {
        if self.max_size < self.min_size {
            self.max_size = self.min_size;
        }
        if self.max_size < 1 {
            return Err(PoolError::InvalidConfiguration(format!(
                "max_size must be at least 1, got {}",
                self.max_size
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::default();
        assert_eq!(config.min_size, 0);
        assert_eq!(config.max_size, 10);
        assert!(config.gather_stats);
        assert!(!config.eager_initialize);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_max_promoted_to_min() {
        let config = PoolConfiguration::new()
            .with_min_size(7)
            .with_max_size(3)
            .normalized()
            .unwrap();
        assert_eq!(config.min_size, 7);
        assert_eq!(config.max_size, 7);
    }

    #[test]
    fn test_zero_max_rejected() {
        let err = PoolConfiguration::new().with_max_size(0).normalized().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_zero_max_rescued_by_min() {
        let config = PoolConfiguration::new()
            .with_min_size(1)
            .with_max_size(0)
            .normalized()
            .unwrap();
        assert_eq!(config.max_size, 1);
    }
}
