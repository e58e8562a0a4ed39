//! Subscriber types for the tracking engine.
//!
//! A listener is registered on one node and hears about every write at or
//! below it. Unbatched listeners are called once per write with a single
//! path. Batched listeners buffer paths and receive them all at once when
//! the store's task queue is drained.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::store::{Store, StoreInner};
use crate::graph::{NodeId, TaskId};
use crate::path::Path;

/// Unique identifier for a registered listener.
///
/// Uses an atomic counter so ids stay unique across stores and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-node callback invoked by the notification engine, once per path.
pub type Callback = Arc<dyn Fn(&Path) + Send + Sync>;

/// The user-facing listener signature. Unbatched listeners always receive a
/// one-element slice.
pub type PathsListener = Arc<dyn Fn(&[Path]) + Send + Sync>;

/// Options for [`Store::subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Coalesce the paths of one tick into a single call. `None` uses the
    /// store's `batch_by_default` setting.
    pub batch: Option<bool>,
}

impl SubscribeOptions {
    /// Always batch.
    pub fn batched() -> Self {
        Self { batch: Some(true) }
    }

    /// Deliver every path as it happens.
    pub fn unbatched() -> Self {
        Self { batch: Some(false) }
    }
}

/// Pending state of one batched subscription.
#[derive(Default)]
pub(crate) struct BatchState {
    pending: Mutex<Vec<Path>>,
    scheduled: Mutex<Option<TaskId>>,
}

impl BatchState {
    /// Build the per-path callback that buffers into this state and
    /// (re)schedules a flush on the store's queue.
    pub(crate) fn callback(
        self: &Arc<Self>,
        store: Weak<StoreInner>,
        listener: PathsListener,
    ) -> Callback {
        let state = Arc::clone(self);
        Arc::new(move |path: &Path| {
            state.pending.lock().push(path.clone());

            let Some(store) = store.upgrade() else {
                return;
            };
            let mut scheduled = state.scheduled.lock();
            if let Some(previous) = scheduled.take() {
                store.tasks.cancel(previous);
            }
            let flush_state = Arc::clone(&state);
            let listener = Arc::clone(&listener);
            *scheduled = Some(store.tasks.schedule(move || flush_state.flush(&listener)));
        })
    }

    fn flush(&self, listener: &PathsListener) {
        self.scheduled.lock().take();
        let paths = std::mem::take(&mut *self.pending.lock());
        if !paths.is_empty() {
            tracing::trace!(count = paths.len(), "flushing batched paths");
            listener(&paths);
        }
    }

    /// Drop buffered paths and the scheduled flush, if any.
    fn cancel(&self, store: &Store) {
        if let Some(task) = self.scheduled.lock().take() {
            store.inner.tasks.cancel(task);
        }
        self.pending.lock().clear();
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it leaves the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe), or convert it with
/// [`guard`](Subscription::guard) to tie the registration to a scope.
pub struct Subscription {
    store: Store,
    node: NodeId,
    id: ListenerId,
    batch: Option<Arc<BatchState>>,
}

impl Subscription {
    pub(crate) fn new(
        store: Store,
        node: NodeId,
        id: ListenerId,
        batch: Option<Arc<BatchState>>,
    ) -> Self {
        Self { store, node, id, batch }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// The node the listener is registered on.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.store.has_listener(self.node, self.id)
    }

    /// Remove exactly this listener. Calling it again is a no-op.
    ///
    /// Paths buffered by a batched subscription but not yet flushed are
    /// discarded.
    pub fn unsubscribe(&self) {
        if self.store.remove_listener(self.node, self.id) {
            tracing::debug!(listener = ?self.id, node = ?self.node, "listener removed");
        }
        if let Some(batch) = &self.batch {
            batch.cancel(&self.store);
        }
    }

    /// Turn this subscription into a guard that unsubscribes when dropped.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard { subscription: self }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("node", &self.node)
            .field("batched", &self.batch.is_some())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Unsubscribes when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard {
    subscription: Subscription,
}

impl SubscriptionGuard {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
