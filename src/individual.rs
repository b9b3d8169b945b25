//! Owner-checked handle around a pooled resource

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::errors::{PoolError, PoolResult};
use crate::pool::PoolShared;

/// Borrowed access to the resource inside an [`Individual`]
pub type ValueGuard<'a, T> = MappedMutexGuard<'a, T>;

type OwnerRef = Weak<dyn Any + Send + Sync>;

/// Pool-side state of one resource. The pool keeps a strong reference while
/// the resource is available and only a weak one while it is borrowed.
pub(crate) struct Slot<T> {
    id: u64,
    value: Mutex<Option<T>>,
    owner: Mutex<Option<OwnerRef>>,
    stalled: AtomicBool,
    disposed: AtomicBool,
}

impl<T> Slot<T> {
    pub(crate) fn new(id: u64, value: T) -> Self {
        Self {
            id,
            value: Mutex::new(Some(value)),
            owner: Mutex::new(None),
            stalled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn bind<O: Any + Send + Sync>(&self, owner: &Arc<O>) {
        let weak = Arc::downgrade(owner);
        let owner: OwnerRef = weak;
        *self.owner.lock() = Some(owner);
    }

    pub(crate) fn unbind(&self) {
        self.owner.lock().take();
    }

    fn is_owned_by<O: ?Sized>(&self, owner: &Arc<O>) -> bool {
        self.owner.lock().as_ref().is_some_and(|bound| {
            bound.strong_count() > 0 && std::ptr::addr_eq(bound.as_ptr(), Arc::as_ptr(owner))
        })
    }

    /// Whether the bound owner still exists
    pub(crate) fn owner_alive(&self) -> bool {
        self.owner
            .lock()
            .as_ref()
            .is_some_and(|bound| bound.strong_count() > 0)
    }

    pub(crate) fn is_stalled(&self) -> bool {
        self.stalled.load(Ordering::Acquire)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark the resource disposed and drop it unless a borrower is holding
    /// the value right now. In that case the drop happens when the handle is
    /// returned or dropped, which calls this again. Returns `false` if the
    /// slot was already disposed.
    pub(crate) fn dispose_value(&self) -> bool {
        let first = !self.disposed.swap(true, Ordering::AcqRel);
        if let Some(mut value) = self.value.try_lock() {
            drop(value.take());
        }
        if first {
            self.unbind();
        }
        first
    }

    #[cfg(test)]
    pub(crate) fn holds_value(&self) -> bool {
        self.value.try_lock().is_some_and(|value| value.is_some())
    }
}

/// A pooled resource bound to the caller that borrowed it
///
/// The resource is only reachable through [`Individual::get_value`], which
/// checks the caller against the bound owner on every access. Dropping the
/// handle returns it to the pool it came from; if that pool is gone or
/// refuses it, the resource is dropped instead.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{PoolConfiguration, ResourcePool};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = ResourcePool::from_fn(|| Ok::<_, std::io::Error>(7u32), PoolConfiguration::default())
///     .unwrap();
/// let me = Arc::new("worker-1");
/// let stranger = Arc::new("worker-2");
///
/// let individual = pool.borrow(&me).await.unwrap();
/// assert_eq!(*individual.get_value(&me).unwrap(), 7);
/// assert!(individual.get_value(&stranger).is_err());
/// # }
/// ```
pub struct Individual<T: Send + 'static> {
    slot: Arc<Slot<T>>,
    pool: Weak<PoolShared<T>>,
    returned: bool,
}

impl<T: Send + 'static> Individual<T> {
    pub(crate) fn new(slot: Arc<Slot<T>>, pool: Weak<PoolShared<T>>) -> Self {
        Self {
            slot,
            pool,
            returned: false,
        }
    }

    /// Pool-local identifier
    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Access the resource as `owner`.
    ///
    /// # Errors
    ///
    /// `ObjectDisposed` once the resource has been disposed,
    /// `InvalidOperation` when `owner` is not the borrower.
    pub fn get_value<O: ?Sized>(&self, owner: &Arc<O>) -> PoolResult<ValueGuard<'_, T>> {
        if self.slot.is_disposed() {
            return Err(PoolError::ObjectDisposed("Individual"));
        }
        if !self.slot.is_owned_by(owner) {
            return Err(PoolError::InvalidOperation(format!(
                "individual {} is not owned by the caller",
                self.slot.id
            )));
        }
        MutexGuard::try_map(self.slot.value.lock(), |value| value.as_mut())
            .map_err(|_| PoolError::ObjectDisposed("Individual"))
    }

    /// Run `f` against the resource as `owner`
    pub fn with_value<O: ?Sized, R>(&self, owner: &Arc<O>, f: impl FnOnce(&mut T) -> R) -> PoolResult<R> {
        let mut value = self.get_value(owner)?;
        Ok(f(&mut value))
    }

    pub fn is_owned_by<O: ?Sized>(&self, owner: &Arc<O>) -> bool {
        self.slot.is_owned_by(owner)
    }

    /// Flag the resource as unfit for reuse; it is disposed when returned.
    pub fn mark_stalled(&self) {
        self.slot.stalled.store(true, Ordering::Release);
    }

    pub fn is_stalled(&self) -> bool {
        self.slot.is_stalled()
    }

    pub fn is_disposed(&self) -> bool {
        self.slot.is_disposed()
    }

    /// Dispose the resource now. Safe to call more than once; returns
    /// whether this call did the disposal.
    pub fn dispose_value(&self) -> bool {
        self.slot.dispose_value()
    }

    /// Return to the owning pool, reporting whether the resource was
    /// recycled (`true`) or disposed (`false`).
    pub fn release(mut self) -> bool {
        match self.pool.upgrade() {
            Some(pool) => self.hand_back(&pool),
            None => {
                self.returned = true;
                self.slot.dispose_value();
                false
            }
        }
    }

    pub(crate) fn hand_back_to(mut self, pool: &PoolShared<T>) -> bool {
        self.hand_back(pool)
    }

    fn hand_back(&mut self, pool: &PoolShared<T>) -> bool {
        if std::mem::replace(&mut self.returned, true) {
            return false;
        }
        match pool.accept(Arc::clone(&self.slot)) {
            Ok(()) => true,
            Err(slot) => {
                slot.dispose_value();
                false
            }
        }
    }
}

impl<T: Send + 'static> Drop for Individual<T> {
    fn drop(&mut self) {
        if self.returned {
            return;
        }
        match self.pool.upgrade() {
            Some(pool) => {
                self.hand_back(&pool);
            }
            None => {
                self.returned = true;
                self.slot.dispose_value();
            }
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Individual<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Individual")
            .field("id", &self.slot.id)
            .field("stalled", &self.slot.is_stalled())
            .field("disposed", &self.slot.is_disposed())
            .finish()
    }
}
