//! Refetch registry: force every live query to re-subscribe at once.
//!
//! One registry is shared by everything mounted under a [`LinkContext`].
//! Each live query registers a callback when it mounts and removes it when
//! it unmounts. After a mutation that affects several queries, a caller
//! runs [`RefetchRegistry::refetch_all`].
//!
//! Registrations are keyed by a stable [`RegistrationId`]. Adding the same
//! callback twice yields two registrations, and it will run twice.
//!
//! [`LinkContext`]: crate::app::LinkContext

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Zero-argument refetch callback.
pub type RefetchCallback = Arc<dyn Fn() + Send + Sync>;

/// Stable identity of one registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct RegistryInner {
    /// Registration order. Ids are monotonic, so this is also id order.
    entries: Mutex<Vec<(RegistrationId, RefetchCallback)>>,
    next_id: AtomicU64,
}

/// Shared list of refetch callbacks. Cloning shares the same registry.
#[derive(Clone)]
pub struct RefetchRegistry {
    inner: Arc<RegistryInner>,
}

impl RefetchRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append a callback.
    pub fn add<F>(&self, callback: F) -> RegistrationId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_shared(Arc::new(callback))
    }

    /// Append an already shared callback.
    pub fn add_shared(&self, callback: RefetchCallback) -> RegistrationId {
        let id = RegistrationId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.entries.lock().push((id, callback));
        id
    }

    /// Remove one registration. Returns false if it was not present.
    pub fn remove(&self, id: RegistrationId) -> bool {
        remove_entry(&self.inner, id)
    }

    /// Add a callback that is removed when the guard drops.
    pub fn register<F>(&self, callback: F) -> RefetchGuard
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.add(callback);
        RefetchGuard {
            registry: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Run every registered callback, in registration order.
    ///
    /// The list is copied before any callback runs, so callbacks may add or
    /// remove registrations. A panicking callback aborts the remaining ones.
    /// Returns how many callbacks ran.
    pub fn refetch_all(&self) -> usize {
        let callbacks: Vec<RefetchCallback> = self
            .inner
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        tracing::debug!(count = callbacks.len(), "refetching all live queries");
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<RegistrationId> {
        self.inner.entries.lock().iter().map(|(id, _)| *id).collect()
    }

    pub fn contains(&self, id: RegistrationId) -> bool {
        self.inner.entries.lock().iter().any(|(i, _)| *i == id)
    }

    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }
}

impl Default for RefetchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RefetchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefetchRegistry")
            .field("registrations", &self.len())
            .finish()
    }
}

fn remove_entry(inner: &RegistryInner, id: RegistrationId) -> bool {
    let mut entries = inner.entries.lock();
    match entries.iter().position(|(i, _)| *i == id) {
        Some(pos) => {
            entries.remove(pos);
            true
        }
        None => false,
    }
}

/// Removes its registration on drop.
///
/// Holds the registry weakly: a guard outliving its registry is a no-op.
#[derive(Debug)]
pub struct RefetchGuard {
    registry: Weak<RegistryInner>,
    id: RegistrationId,
}

impl RefetchGuard {
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

impl Drop for RefetchGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            remove_entry(&inner, self.id);
        }
    }
}
