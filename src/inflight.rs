//! Deduplication of concurrent identical requests.
//!
//! The registry keeps a weak handle to each pending operation. Callers asking for a key that
//! is still pending get a clone of the same shared future, so the underlying work runs once
//! and every waiter sees the same output. The entry removes itself the moment the operation
//! settles, or when the last waiter drops it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};

/// A pending operation that any number of callers may await.
pub type Pending<T> = Shared<BoxFuture<'static, T>>;

type Entries<T> = Mutex<HashMap<String, Slot<T>>>;

struct Slot<T> {
    id: u64,
    pending: WeakShared<BoxFuture<'static, T>>,
}

/// Whether a caller started the operation or joined an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    Joined,
}

/// Collapses concurrent operations that share a key into a single execution.
pub struct InFlightRegistry<T> {
    entries: Arc<Entries<T>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for InFlightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<T> std::fmt::Debug for InFlightRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("len", &lock(&self.entries).len())
            .finish()
    }
}

fn lock<T>(entries: &Entries<T>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the registry slot when the operation completes or is dropped unfinished.
struct Deregister<T> {
    entries: Weak<Entries<T>>,
    key: String,
    id: u64,
}

impl<T> Drop for Deregister<T> {
    fn drop(&mut self) {
        let Some(entries) = self.entries.upgrade() else {
            return;
        };
        let mut map = lock(&entries);
        // a newer operation may already own the key
        if map.get(&self.key).is_some_and(|slot| slot.id == self.id) {
            map.remove(&self.key);
        }
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending operation for `key`, starting it with `factory` if none is running.
    ///
    /// `factory` is only invoked when no unsettled operation exists for the key. It runs while
    /// the registry is locked and must not call back into it; the future it returns is lazy
    /// and only starts when first polled.
    pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> (Pending<T>, Admission)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut map = lock(&self.entries);

        if let Some(pending) = map.get(key).and_then(|slot| slot.pending.upgrade()) {
            return (pending, Admission::Joined);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = Deregister {
            entries: Arc::downgrade(&self.entries),
            key: key.to_string(),
            id,
        };
        let work = factory();
        let pending = async move {
            let _guard = guard;
            work.await
        }
        .boxed()
        .shared();

        if let Some(weak) = pending.downgrade() {
            map.insert(key.to_string(), Slot { id, pending: weak });
        }
        (pending, Admission::Started)
    }

    /// Number of keys with an unsettled operation.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }
}
