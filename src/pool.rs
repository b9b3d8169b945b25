//! Resource pool engine

use crate::config::PoolConfiguration;
use crate::errors::{BoxError, PoolError, PoolResult};
use crate::factory::{AsyncFnFactory, FnFactory, ResourceFactory};
use crate::health::HealthStatus;
use crate::individual::{Individual, Slot};
use crate::stats::PoolStats;

use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Identifiers wrap back to zero past this value
const MAX_INDIVIDUAL_ID: u64 = u32::MAX as u64;

/// Returned resources are discarded once the idle queue exceeds this share
/// of `min_size` while the pool is above `min_size`
const SHRINK_THRESHOLD: f64 = 0.8;

/// Timeout ratio above which a timed-out borrow triggers a purge
const PURGE_TIMEOUT_RATIO: f64 = 0.5;

/// Longest a waiting borrower sleeps before re-checking on its own
const RECHECK_INTERVAL: Duration = Duration::from_millis(50);

struct PoolState<T> {
    available: VecDeque<Arc<Slot<T>>>,
    in_use: HashMap<u64, Weak<Slot<T>>>,
}

pub(crate) struct PoolShared<T: Send + 'static> {
    factory: Box<dyn ResourceFactory<T>>,
    config: PoolConfiguration,
    state: Mutex<PoolState<T>>,
    count: AtomicUsize,
    growing: AtomicBool,
    disposed: AtomicBool,
    next_id: AtomicU64,
    available_signal: Notify,
    stats: Option<PoolStats>,
}

enum Take<T: Send + 'static> {
    Hit { individual: Individual<T>, available: usize },
    Empty,
    Disposed,
    LockTimeout,
}

/// Clears the single-flight growth flag when the growth task ends
struct GrowthFlag<'a>(&'a AtomicBool);

impl Drop for GrowthFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Send + 'static> PoolShared<T> {
    fn stat(&self, record: impl FnOnce(&PoolStats)) {
        if let Some(stats) = &self.stats {
            record(stats);
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn next_id(&self) -> u64 {
        self.next_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| {
                Some(if id >= MAX_INDIVIDUAL_ID { 0 } else { id + 1 })
            })
            .unwrap_or_else(|id| id)
    }

    fn try_take<O: Any + Send + Sync>(self: &Arc<Self>, owner: &Arc<O>, deadline: Instant) -> Take<T> {
        let Some(mut state) = self.state.try_lock_until(deadline) else {
            return Take::LockTimeout;
        };
        if self.is_disposed() {
            return Take::Disposed;
        }
        match state.available.pop_front() {
            Some(slot) => {
                slot.bind(owner);
                state.in_use.insert(slot.id(), Arc::downgrade(&slot));
                let available = state.available.len();
                drop(state);
                Take::Hit {
                    individual: Individual::new(slot, Arc::downgrade(self)),
                    available,
                }
            }
            None => Take::Empty,
        }
    }

    /// Start one background construction unless one is already running or
    /// the pool is full
    fn try_grow(self: &Arc<Self>) {
        if self.is_disposed() || self.count.load(Ordering::Acquire) >= self.config.max_size {
            return;
        }
        if self
            .growing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let grown = {
                let _flag = GrowthFlag(&shared.growing);
                shared.construct().await
            };
            if grown {
                shared.available_signal.notify_waiters();
            }
        });
    }

    /// Build one resource outside the lock and enqueue it, unless the pool
    /// filled up in the meantime
    async fn construct(&self) -> bool {
        let id = self.next_id();
        let value = match self.factory.create().await {
            Ok(value) => value,
            Err(error) => {
                self.factory_failed(id, error);
                return false;
            }
        };

        let Some(mut state) = self.state.try_lock_for(self.config.default_timeout) else {
            warn!(id, "pool lock not acquired in time, dropping new resource");
            drop(value);
            self.stat(|s| s.record_disposed());
            return false;
        };
        if self.is_disposed() || self.count.load(Ordering::Acquire) >= self.config.max_size {
            drop(state);
            debug!(id, "pool already at capacity, dropping new resource");
            drop(value);
            self.stat(|s| s.record_disposed());
            return false;
        }
        state.available.push_back(Arc::new(Slot::new(id, value)));
        let size = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        drop(state);

        debug!(id, size, "pool grew");
        self.stat(|s| s.record_size_change(size));
        true
    }

    fn factory_failed(&self, id: u64, error: BoxError) {
        warn!(id, error = %error, "resource factory failed");
        self.stat(|s| s.record_error());
    }

    /// Return path. Hands the slot back when it must be disposed instead of
    /// recycled.
    pub(crate) fn accept(&self, slot: Arc<Slot<T>>) -> Result<(), Arc<Slot<T>>> {
        let id = slot.id();
        let Some(mut state) = self.state.try_lock_for(self.config.default_timeout) else {
            warn!(id, "pool lock not acquired in time, disposing returned individual");
            self.stat(|s| s.record_disposed());
            return Err(slot);
        };

        let tracked = state
            .in_use
            .get(&id)
            .is_some_and(|entry| std::ptr::eq(entry.as_ptr(), Arc::as_ptr(&slot)));
        if tracked {
            state.in_use.remove(&id);
        }

        let count = self.count.load(Ordering::Acquire);
        let min_size = self.config.min_size;
        let surplus =
            state.available.len() as f64 > min_size as f64 * SHRINK_THRESHOLD && count > min_size;

        if self.is_disposed()
            || !tracked
            || slot.is_stalled()
            || slot.is_disposed()
            || surplus
            || count > self.config.max_size
        {
            let size = tracked.then(|| self.count.fetch_sub(1, Ordering::AcqRel) - 1);
            drop(state);

            debug!(id, tracked, stalled = slot.is_stalled(), surplus, "disposing returned individual");
            self.stat(|s| {
                s.record_disposed();
                if let Some(size) = size {
                    s.record_size_change(size);
                }
            });
            return Err(slot);
        }

        slot.unbind();
        state.available.push_back(slot);
        drop(state);

        self.stat(|s| s.record_return());
        self.available_signal.notify_waiters();
        Ok(())
    }

    fn purge(&self) -> usize {
        let Some(mut state) = self.state.try_lock_for(self.config.default_timeout) else {
            warn!("pool lock not acquired in time, skipping purge");
            return 0;
        };

        let before = state.in_use.len();
        let mut abandoned = Vec::new();
        state.in_use.retain(|_, entry| match entry.upgrade() {
            None => false,
            Some(slot) if slot.is_disposed() => false,
            Some(slot) if !slot.owner_alive() => {
                abandoned.push(slot);
                false
            }
            Some(_) => true,
        });
        let reclaimed = before - state.in_use.len();
        let size = state.in_use.len() + state.available.len();
        let previous = self.count.swap(size, Ordering::AcqRel);
        drop(state);

        for slot in &abandoned {
            slot.dispose_value();
        }

        if reclaimed > 0 {
            debug!(reclaimed, abandoned = abandoned.len(), size, "purged in-use index");
        }
        self.stat(|s| {
            s.record_purge(reclaimed);
            if size != previous {
                s.record_size_change(size);
            }
        });
        if size < previous {
            self.available_signal.notify_waiters();
        }
        reclaimed
    }
}

/// Bounded pool of exclusively borrowed resources built by a factory
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, ResourcePool};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = PoolConfiguration::new().with_min_size(1).with_max_size(4);
/// let pool = ResourcePool::from_fn(|| Ok::<_, std::io::Error>(Vec::<u8>::new()), config).unwrap();
///
/// let caller = Arc::new(());
/// {
///     let buffer = pool.borrow(&caller).await.unwrap();
///     buffer.get_value(&caller).unwrap().push(1);
///     // Returned to the pool when dropped
/// }
///
/// assert_eq!(pool.count(), 1);
/// assert_eq!(pool.available_count(), 1);
/// # }
/// ```
pub struct ResourcePool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> ResourcePool<T> {
    /// Create a pool around `factory`.
    ///
    /// With `eager_initialize` set, `min_size` resources are built in the
    /// background when a tokio runtime is available.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when `max_size` ends up below 1.
    pub fn new<F: ResourceFactory<T>>(factory: F, config: PoolConfiguration) -> PoolResult<Self> {
        let pool = Self::build(Box::new(factory), config)?;
        if pool.shared.config.eager_initialize {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let warming = pool.clone();
                    handle.spawn(async move {
                        warming.warmup().await;
                    });
                }
                Err(_) => warn!("no tokio runtime available, skipping eager initialization"),
            }
        }
        Ok(pool)
    }

    /// Create a pool and wait for eager initialization to finish.
    pub async fn initialize<F: ResourceFactory<T>>(factory: F, config: PoolConfiguration) -> PoolResult<Self> {
        let pool = Self::build(Box::new(factory), config)?;
        if pool.shared.config.eager_initialize {
            pool.warmup().await;
        }
        Ok(pool)
    }

    /// Create a pool from a synchronous constructor
    pub fn from_fn<F, E>(f: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::new(FnFactory::new(f), config)
    }

    /// Create a pool from an asynchronous constructor
    pub fn from_async_fn<F, Fut, E>(f: F, config: PoolConfiguration) -> PoolResult<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        Self::new(AsyncFnFactory::new(f), config)
    }

    fn build(factory: Box<dyn ResourceFactory<T>>, config: PoolConfiguration) -> PoolResult<Self> {
        let config = config.normalized()?;
        let stats = config.gather_stats.then(PoolStats::new);
        debug!(
            min_size = config.min_size,
            max_size = config.max_size,
            gather_stats = config.gather_stats,
            "creating resource pool"
        );

        Ok(Self {
            shared: Arc::new(PoolShared {
                factory,
                state: Mutex::new(PoolState {
                    available: VecDeque::with_capacity(config.max_size),
                    in_use: HashMap::with_capacity(config.max_size),
                }),
                config,
                count: AtomicUsize::new(0),
                growing: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                available_signal: Notify::new(),
                stats,
            }),
        })
    }

    /// Build resources concurrently until the pool holds `min_size`.
    /// Failures are logged; returns how many were added.
    pub async fn warmup(&self) -> usize {
        let missing = self.shared.config.min_size.saturating_sub(self.count());
        let mut tasks = JoinSet::new();
        for _ in 0..missing {
            let shared = Arc::clone(&self.shared);
            tasks.spawn(async move { shared.construct().await });
        }

        let mut added = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(error) => warn!(error = %error, "warm-up task failed"),
            }
        }
        if added > 0 {
            self.shared.available_signal.notify_waiters();
        }
        debug!(added, size = self.count(), "pool warmed up");
        added
    }

    /// Borrow a resource for `owner`, waiting up to the configured default
    /// timeout
    pub async fn borrow<O: Any + Send + Sync>(&self, owner: &Arc<O>) -> PoolResult<Individual<T>> {
        self.borrow_within(owner, None).await
    }

    /// Borrow a resource for `owner`, waiting up to `timeout`
    pub async fn borrow_with_timeout<O: Any + Send + Sync>(
        &self,
        owner: &Arc<O>,
        timeout: Duration,
    ) -> PoolResult<Individual<T>> {
        self.borrow_within(owner, Some(timeout)).await
    }

    async fn borrow_within<O: Any + Send + Sync>(
        &self,
        owner: &Arc<O>,
        timeout: Option<Duration>,
    ) -> PoolResult<Individual<T>> {
        let shared = &self.shared;
        let timeout = timeout.unwrap_or(shared.config.default_timeout);
        let deadline = Instant::now() + timeout;
        let mut first_attempt = true;

        loop {
            if shared.is_disposed() {
                return Err(PoolError::ObjectDisposed("ResourcePool"));
            }

            let notified = shared.available_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match shared.try_take(owner, deadline) {
                Take::Hit {
                    individual,
                    available,
                } => {
                    if first_attempt {
                        shared.stat(|s| s.record_request(true));
                    }
                    if available < shared.config.min_size {
                        shared.try_grow();
                    }
                    return Ok(individual);
                }
                Take::Empty => {}
                Take::Disposed => return Err(PoolError::ObjectDisposed("ResourcePool")),
                Take::LockTimeout => {
                    if first_attempt {
                        shared.stat(|s| s.record_request(false));
                    }
                    return Err(self.timed_out(timeout));
                }
            }

            if first_attempt {
                first_attempt = false;
                shared.stat(|s| {
                    s.record_request(false);
                    s.record_wait();
                });
            }
            shared.try_grow();

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(timeout));
            }
            let wake_at = deadline.min(now + RECHECK_INTERVAL);
            let _ = tokio::time::timeout_at(tokio::time::Instant::from_std(wake_at), notified).await;
        }
    }

    fn timed_out(&self, timeout: Duration) -> PoolError {
        let purge = match &self.shared.stats {
            Some(stats) => {
                stats.record_timeout();
                stats.recent_timeout_ratio() > PURGE_TIMEOUT_RATIO
            }
            None => true,
        };
        if purge {
            let reclaimed = self.shared.purge();
            warn!(?timeout, reclaimed, "borrow timed out, purged in-use index");
        } else {
            debug!(?timeout, "borrow timed out");
        }
        PoolError::Timeout(timeout)
    }

    /// Return a borrowed resource to this pool. Returns `true` when it was
    /// recycled and `false` when it was disposed.
    pub fn give_back(&self, individual: Individual<T>) -> bool {
        individual.hand_back_to(&self.shared)
    }

    /// Drop in-use entries whose borrower or handle is gone and recompute
    /// the pool size. Returns the number of reclaimed entries.
    pub fn purge(&self) -> usize {
        self.shared.purge()
    }

    /// Dispose the pool. Idle resources are dropped right away; borrowed
    /// ones are dropped when they come back. Every later borrow fails.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: Vec<_> = match shared.state.try_lock_for(shared.config.default_timeout) {
            Some(mut state) => {
                state.in_use.clear();
                let drained = state.available.drain(..).collect();
                shared.count.store(0, Ordering::Release);
                drained
            }
            None => {
                warn!("pool lock not acquired in time, idle resources dropped with the pool");
                Vec::new()
            }
        };
        for slot in &drained {
            slot.dispose_value();
        }
        shared.stat(|s| {
            for _ in &drained {
                s.record_disposed();
            }
            s.record_size_change(0);
        });
        shared.available_signal.notify_waiters();
        info!(disposed = drained.len(), "resource pool disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Health as seen by an external aggregator
    pub fn health_status(&self) -> HealthStatus {
        let max_size = self.shared.config.max_size;
        match self.sizes() {
            Some((in_use, available)) => HealthStatus::new(in_use, available, self.count(), max_size),
            None => HealthStatus::unresponsive(self.count(), max_size, self.shared.config.default_timeout),
        }
    }

    /// Purge, then report health
    pub async fn check_health(&self) -> HealthStatus {
        self.purge();
        self.health_status()
    }

    /// Resources owned by the pool, available or borrowed
    pub fn count(&self) -> usize {
        self.shared.count.load(Ordering::Acquire)
    }

    /// Idle resources. Reads as 0 when the pool lock is not acquired in time.
    pub fn available_count(&self) -> usize {
        self.sizes().map_or(0, |(_, available)| available)
    }

    /// Borrowed resources. Reads as `count()` when the pool lock is not
    /// acquired in time.
    pub fn in_use_count(&self) -> usize {
        self.sizes().map_or_else(|| self.count(), |(in_use, _)| in_use)
    }

    fn sizes(&self) -> Option<(usize, usize)> {
        let Some(state) = self.shared.state.try_lock_for(self.shared.config.default_timeout) else {
            warn!("pool lock not acquired in time, reporting sizes from count");
            return None;
        };
        Some((state.in_use.len(), state.available.len()))
    }

    pub fn min_size(&self) -> usize {
        self.shared.config.min_size
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_size
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.shared.config
    }

    /// Statistics collector, absent when `gather_stats` is off
    pub fn stats(&self) -> Option<&PoolStats> {
        self.shared.stats.as_ref()
    }
}

impl<T: Send + 'static> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("count", &self.count())
            .field("min_size", &self.shared.config.min_size)
            .field("max_size", &self.shared.config.max_size)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
