//! Batch Context
//!
//! A batch is the synchronous stand-in for "one tick": writes made inside it
//! are buffered by batched subscribers and delivered together when the
//! outermost batch exits and the store's task queue is drained.
//!
//! # Implementation
//!
//! The store keeps a depth counter. Entering a batch increments it and hands
//! back a guard; dropping the guard decrements it and, when the depth returns
//! to zero, flushes the queue. Nested batches therefore flush once, at the
//! outer boundary, and the counter stays balanced even if the body panics.

use std::sync::atomic::Ordering;

use super::store::Store;

/// Guard that leaves the batch when dropped.
pub struct BatchScope<'a> {
    store: &'a Store,
}

impl<'a> BatchScope<'a> {
    /// Enter a batch on `store`.
    pub fn enter(store: &'a Store) -> Self {
        store.inner.batch_depth.fetch_add(1, Ordering::SeqCst);
        Self { store }
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        let depth = self.store.inner.batch_depth.fetch_sub(1, Ordering::SeqCst) - 1;

        // Don't run listeners while unwinding.
        if depth == 0 && !std::thread::panicking() {
            self.store.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Path;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn scope_tracks_depth() {
        let store = Store::new();
        assert!(!store.is_batching());

        {
            let _outer = BatchScope::enter(&store);
            assert!(store.is_batching());
            {
                let _inner = BatchScope::enter(&store);
                assert!(store.is_batching());
            }
            assert!(store.is_batching());
        }

        assert!(!store.is_batching());
    }

    #[test]
    fn nested_batches_flush_once_at_the_outer_boundary() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": 0, "b": 0 })).unwrap();
        let batches = Arc::new(Mutex::new(Vec::new()));

        let sink = batches.clone();
        let _sub = root.subscribe(move |paths: &[Path]| sink.lock().push(paths.len()));

        store.batch(|| {
            root.set("a", 1).unwrap();
            store.batch(|| root.set("b", 1).unwrap());
            // Inner exit must not flush
            assert!(batches.lock().is_empty());
        });

        assert_eq!(*batches.lock(), vec![2]);
    }

    #[test]
    fn panicking_batch_leaves_depth_balanced() {
        let store = Store::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.batch(|| panic!("boom"));
        }));

        assert!(result.is_err());
        assert!(!store.is_batching());
    }
}
