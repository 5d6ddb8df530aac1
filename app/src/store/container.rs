use parking_lot::{ReentrantMutex, RwLock};
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the new state after every published change.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`StateContainer::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Inner<T> {
    name: &'static str,
    initial: T,
    state: RwLock<T>,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
    next_id: AtomicU64,
    /// Bumped inside the write lock, so versions follow commit order.
    version: AtomicU64,
    /// Highest version handed to listeners so far.
    delivered: ReentrantMutex<Cell<u64>>,
}

/// Shared single-record state with synchronous change notification.
///
/// Clones share the same record. Every mutation runs inside one write-lock
/// critical section; listeners are invoked after the lock is released, in
/// subscription order, with a snapshot of the state the mutation produced.
///
/// Deliveries are serialized and never go backwards: a snapshot older than
/// one listeners have already seen is dropped, so concurrent or nested
/// writers always leave listeners on the latest committed state. A listener
/// must not block on another thread that writes to the same container.
pub struct StateContainer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for StateContainer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StateContainer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: RwLock::new(initial.clone()),
                initial,
                listeners: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                version: AtomicU64::new(0),
                delivered: ReentrantMutex::new(Cell::new(0)),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Clone of the current state.
    pub fn get(&self) -> T {
        (*self.inner.state.read()).clone()
    }

    /// Borrow the current state without cloning it.
    pub fn read<F, R>(&self, op: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.state.read();
        op(&guard)
    }

    /// Replace the state wholesale.
    pub fn set(&self, value: T) {
        self.update(move |state| *state = value);
    }

    /// Mutate the state in place and publish the result.
    pub fn update<F, R>(&self, op: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        self.update_if(|state| (op(state), true))
    }

    /// Mutate the state and publish only when `op` reports a change.
    ///
    /// Used for guarded transitions that must inspect and modify the state
    /// atomically but may decide to leave it untouched.
    pub fn update_if<F, R>(&self, op: F) -> R
    where
        F: FnOnce(&mut T) -> (R, bool),
    {
        let (result, snapshot) = {
            let mut guard = self.inner.state.write();
            let (result, changed) = op(&mut guard);
            let snapshot = changed.then(|| {
                let version = self.inner.version.fetch_add(1, Ordering::SeqCst) + 1;
                (version, (*guard).clone())
            });
            (result, snapshot)
        };

        if let Some((version, snapshot)) = snapshot {
            log::trace!("{} updated to version {}", self.inner.name, version);
            self.publish(version, &snapshot);
        }
        result
    }

    /// Restore the state the container was created with.
    pub fn reset(&self) {
        self.set(self.inner.initial.clone());
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Returns `false` when the subscription was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    fn publish(&self, version: u64, snapshot: &T) {
        // Reentrant so a listener may write to the store it is observing.
        let delivered = self.inner.delivered.lock();
        if delivered.get() > version {
            log::trace!("{} skipped stale version {}", self.inner.name, version);
            return;
        }
        delivered.set(version);

        // Listeners may subscribe or read the store; never hold the state or listener lock while calling them.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            // A nested write already delivered a newer snapshot to everyone.
            if delivered.get() != version {
                break;
            }
            listener(snapshot);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for StateContainer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateContainer")
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.read())
            .field("listeners", &self.inner.listeners.read().len())
            .finish()
    }
}
