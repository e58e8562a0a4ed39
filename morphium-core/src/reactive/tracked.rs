//! Tracked Nodes
//!
//! [`Tracked`] is the caller's handle to one node. It stands in for the
//! wrapped value itself: reads go through [`get`](Tracked::get) and return
//! tracked children, writes go through [`set`](Tracked::set) and friends and
//! notify every listener that can see the change.
//!
//! # Identity
//!
//! Handles compare equal iff they refer to the same node of the same store.
//! Wrapping a handle again returns an equal handle, and moving a node into a
//! new slot keeps its identity and its listeners.
//!
//! A handle keeps its store alive and its node pinned. Listeners live inside
//! the store, so a listener that needs to reach back into the data captures
//! a [`WeakTracked`] from [`downgrade`](Tracked::downgrade) instead.
//!
//! # Arrays
//!
//! Arrays expose their elements under index keys and their size under the
//! `length` pseudo field. [`push`](Tracked::push) reports the new index and
//! then `length`; [`pop`](Tracked::pop) reports `length` only.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use serde_json::Value as JsonValue;

use super::store::{length_key, Store, StoreInner};
use super::subscriber::{SubscribeOptions, Subscription};
use super::value::Value;
use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::lookup;
use crate::path::{Key, Path};

/// Handle to a tracked node.
#[derive(Clone)]
pub struct Tracked {
    store: Store,
    id: NodeId,
    /// Keeps the node alive across garbage collection.
    _pin: Arc<()>,
}

impl Tracked {
    pub(crate) fn new(store: Store, id: NodeId, pin: Arc<()>) -> Self {
        Self {
            store,
            id,
            _pin: pin,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The store this node belongs to.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// A handle that keeps neither the store nor the node alive.
    pub fn downgrade(&self) -> WeakTracked {
        WeakTracked {
            store: Arc::downgrade(&self.store.inner),
            id: self.id,
        }
    }

    /// Read one slot. Returns `None` if the key does not exist.
    ///
    /// A composite that has not been wrapped yet is wrapped now and the
    /// wrapped node is stored back, so later reads return the same node.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let mut arena = self.store.lock();
        let slot = arena.read(self.id, key.into())?;
        self.store.slot_value(&mut arena, slot).ok()
    }

    /// Write one slot and notify.
    ///
    /// Writing a tracked node attaches it here in addition to wherever else
    /// it is stored. Writing a plain composite wraps it first. The value the
    /// slot held before is detached from this node.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let incoming = self.store.incoming(value.into())?;
        let mut arena = self.store.lock();
        let key = arena.write(self.id, key.into(), incoming)?;
        self.store.notify(arena, self.id, Path::from(key));
        Ok(())
    }

    /// Delete an object field and notify. Returns the removed value, if any.
    ///
    /// Arrays cannot have holes; shrink them with [`pop`](Tracked::pop) or by
    /// writing `length`.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        let mut arena = self.store.lock();
        let Some(slot) = arena.remove(self.id, key.clone())? else {
            return Ok(None);
        };
        let removed = self.store.slot_value(&mut arena, slot)?;
        self.store
            .notify(arena, self.id, Path::from(Key::Field(key.into_field())));
        Ok(Some(removed))
    }

    /// Append to an array. Notifies `[index]`, then `["length"]`.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        let incoming = self.store.incoming(value.into())?;
        let mut arena = self.store.lock();
        let container = arena.node(self.id)?.container();
        if !container.is_array() {
            return Err(Error::invalid_argument("Cannot push onto an object"));
        }
        let index = container.len();
        let key = arena.write(self.id, Key::Index(index), incoming)?;
        self.store.notify(arena, self.id, Path::from(key));

        let arena = self.store.lock();
        self.store.notify(arena, self.id, Path::from(length_key()));
        Ok(())
    }

    /// Remove the last array element. Notifies `["length"]` when something
    /// was removed.
    pub fn pop(&self) -> Result<Option<Value>> {
        let mut arena = self.store.lock();
        let Some(slot) = arena.pop(self.id)? else {
            return Ok(None);
        };
        let popped = self.store.slot_value(&mut arena, slot)?;
        self.store.notify(arena, self.id, Path::from(length_key()));
        Ok(Some(popped))
    }

    /// The user keys, in order. Arrays list their indices.
    pub fn keys(&self) -> Vec<Key> {
        self.store
            .lock()
            .get(self.id)
            .map(|node| node.container().keys())
            .unwrap_or_default()
    }

    /// Number of fields or elements.
    pub fn len(&self) -> usize {
        self.store
            .lock()
            .get(self.id)
            .map_or(0, |node| node.container().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        self.store
            .lock()
            .get(self.id)
            .is_some_and(|node| node.container().is_array())
    }

    /// Whether `key` names an existing slot (or `length` on an array).
    pub fn contains_key(&self, key: impl Into<Key>) -> bool {
        let arena = self.store.lock();
        let Some(node) = arena.get(self.id) else {
            return false;
        };
        let container = node.container();
        match container.normalize(key.into()) {
            Some(key) if key.is_length() => true,
            Some(key) => container.contains(&key),
            None => false,
        }
    }

    /// Every place this node is currently stored.
    pub fn parents(&self) -> Vec<(Tracked, Key)> {
        let mut arena = self.store.lock();
        let attachments: Vec<_> = arena
            .get(self.id)
            .map(|node| node.parents().iter().cloned().collect())
            .unwrap_or_default();
        attachments
            .into_iter()
            .filter_map(|attachment| {
                let parent = self.store.handle(&mut arena, attachment.parent).ok()?;
                Some((parent, attachment.key))
            })
            .collect()
    }

    /// Plain deep copy of the node's current data.
    pub fn to_json(&self) -> JsonValue {
        self.store.lock().snapshot(self.id, &mut Vec::new())
    }

    /// Resolve `path` relative to this node.
    pub fn lookup(&self, path: &Path) -> Result<Value> {
        lookup::get(&Value::Node(self.clone()), path)
    }

    /// Subscribe with the store's default batching.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[Path]) + Send + Sync + 'static,
    {
        self.subscribe_with(listener, SubscribeOptions::default())
    }

    /// Subscribe with explicit options.
    pub fn subscribe_with<F>(&self, listener: F, options: SubscribeOptions) -> Subscription
    where
        F: Fn(&[Path]) + Send + Sync + 'static,
    {
        // Nodes are only removed by garbage collection, which never removes a
        // pinned node, and this handle pins its node. Storing it in
        // `Value::Node` also satisfies the same-store check.
        self.store
            .subscribe(&Value::Node(self.clone()), listener, options)
            .expect("live handle refers to a node of its own store")
    }

    /// Subscribe unbatched, one path per call.
    pub fn watch<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        self.subscribe_with(
            move |paths: &[Path]| paths.iter().for_each(&listener),
            SubscribeOptions::unbatched(),
        )
    }
}

/// Non-owning handle to a tracked node.
///
/// Does not keep the store alive and does not pin the node against garbage
/// collection. [`upgrade`](WeakTracked::upgrade) fails once either is gone.
#[derive(Clone)]
pub struct WeakTracked {
    store: Weak<StoreInner>,
    id: NodeId,
}

impl WeakTracked {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get a full handle back, if the store and the node still exist.
    pub fn upgrade(&self) -> Option<Tracked> {
        let store = Store {
            inner: self.store.upgrade()?,
        };
        let mut arena = store.lock();
        let handle = store.handle(&mut arena, self.id).ok();
        drop(arena);
        handle
    }
}

impl std::fmt::Debug for WeakTracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WeakTracked").field(&self.id).finish()
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.store.ptr_eq(&other.store)
    }
}

impl Eq for Tracked {}

impl Hash for Tracked {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        Arc::as_ptr(&self.store.inner).hash(state);
    }
}

impl std::fmt::Debug for Tracked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Tracked").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(node: &Tracked) -> (Arc<Mutex<Vec<Path>>>, Subscription) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let subscription = node.watch(move |path: &Path| sink.lock().push(path.clone()));
        (log, subscription)
    }

    #[test]
    fn reads_and_writes_are_transparent() {
        let store = Store::new();
        let root = store.wrap(json!({ "path": { "to": { "value": "test" } } })).unwrap();
        let to = root.lookup(&path!["path", "to"]).unwrap().into_node().unwrap();

        assert_eq!(to.get("value").unwrap(), json!("test"));
        to.set("value", "changed").unwrap();
        assert_eq!(to.get("value").unwrap(), json!("changed"));
        assert_eq!(root.to_json(), json!({ "path": { "to": { "value": "changed" } } }));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": {} })).unwrap();
        let again = store.wrap(&root).unwrap();
        assert_eq!(again, root);

        let child = root.get("a").unwrap().into_node().unwrap();
        assert_eq!(root.get("a").unwrap().into_node().unwrap(), child);
    }

    #[test]
    fn keys_exclude_bookkeeping() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": 1, "b": 2 })).unwrap();
        let _sub = root.watch(|_| {});
        assert_eq!(root.keys(), vec![Key::from("a"), Key::from("b")]);
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn missing_keys_read_as_none() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": 1 })).unwrap();
        assert!(root.get("missing").is_none());
        assert!(!root.contains_key("missing"));
        assert!(root.contains_key("a"));
    }

    #[test]
    fn writing_a_plain_composite_wraps_and_attaches_it() {
        let store = Store::new();
        let root = store.wrap(json!({})).unwrap();
        root.set("child", json!({ "deep": { "x": 1 } })).unwrap();

        let child = root.get("child").unwrap().into_node().unwrap();
        let deep = child.get("deep").unwrap().into_node().unwrap();
        assert_eq!(child.parents(), vec![(root.clone(), Key::from("child"))]);
        assert_eq!(deep.parents(), vec![(child.clone(), Key::from("deep"))]);
    }

    #[test]
    fn replacing_a_child_detaches_it() {
        let store = Store::new();
        let root = store.wrap(json!({ "name": { "first": "John" } })).unwrap();
        let old = root.get("name").unwrap().into_node().unwrap();

        root.set("name", json!({ "first": "Jane" })).unwrap();
        assert!(old.parents().is_empty());

        root.set("name", &old).unwrap();
        assert_eq!(old.parents(), vec![(root.clone(), Key::from("name"))]);
    }

    #[test]
    fn same_parent_two_keys_are_tracked_separately() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": { "v": 0 } })).unwrap();
        let shared = root.get("a").unwrap().into_node().unwrap();
        root.set("b", &shared).unwrap();
        assert_eq!(shared.parents().len(), 2);

        let (log, _sub) = recorder(&root);
        shared.set("v", 1).unwrap();
        assert_eq!(*log.lock(), vec![path!["a", "v"], path!["b", "v"]]);

        // Overwriting one slot leaves the other attachment in place
        root.set("a", json!(null)).unwrap();
        log.lock().clear();
        shared.set("v", 2).unwrap();
        assert_eq!(*log.lock(), vec![path!["b", "v"]]);
    }

    #[test]
    fn array_writes() {
        let store = Store::new();
        let root = store.wrap(json!({ "array": [1, 2, 3] })).unwrap();
        let array = root.get("array").unwrap().into_node().unwrap();
        let (log, _sub) = recorder(&root);

        array.set(1, 4).unwrap();
        assert_eq!(*log.lock(), vec![path!["array", 1]]);

        array.push(5).unwrap();
        assert_eq!(log.lock()[1..], [path!["array", 3], path!["array", "length"]]);
        assert_eq!(array.to_json(), json!([1, 4, 3, 5]));

        assert_eq!(array.pop().unwrap().unwrap(), json!(5));
        assert_eq!(log.lock().len(), 4);
        assert_eq!(log.lock()[3], path!["array", "length"]);
        assert_eq!(array.to_json(), json!([1, 4, 3]));
    }

    #[test]
    fn array_length_pseudo_field() {
        let store = Store::new();
        let array = store.wrap(json!([{ "a": 1 }, { "b": 2 }])).unwrap();
        let second = array.get(1).unwrap().into_node().unwrap();

        assert_eq!(array.get("length").unwrap(), json!(2));
        assert!(array.contains_key("length"));

        array.set("length", 1).unwrap();
        assert_eq!(array.len(), 1);
        assert!(second.parents().is_empty());

        array.set("length", 3).unwrap();
        assert_eq!(array.to_json(), json!([{ "a": 1 }, null, null]));

        assert!(matches!(array.set("length", -1), Err(Error::InvalidArgument(_))));
        assert!(matches!(array.set("name", 1), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn numeric_field_names_address_array_elements() {
        let store = Store::new();
        let array = store.wrap(json!(["a", "b"])).unwrap();
        assert_eq!(array.get("1").unwrap(), json!("b"));
        array.set("0", "z").unwrap();
        assert_eq!(array.get(0).unwrap(), json!("z"));
    }

    #[test]
    fn remove_detaches_and_notifies() {
        let store = Store::new();
        let root = store.wrap(json!({ "a": { "x": 1 }, "b": 2 })).unwrap();
        let a = root.get("a").unwrap().into_node().unwrap();
        let (log, _sub) = recorder(&root);

        let removed = root.remove("a").unwrap().unwrap();
        assert_eq!(removed, Value::Node(a.clone()));
        assert!(a.parents().is_empty());
        assert_eq!(root.keys(), vec![Key::from("b")]);
        assert_eq!(*log.lock(), vec![path!["a"]]);

        assert!(root.remove("missing").unwrap().is_none());
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn array_only_operations_reject_objects() {
        let store = Store::new();
        let object = store.wrap(json!({})).unwrap();
        let array = store.wrap(json!([])).unwrap();

        assert!(object.push(1).is_err());
        assert!(object.pop().is_err());
        assert!(array.remove(0).is_err());
        assert!(array.pop().unwrap().is_none());
    }

    #[test]
    fn oversized_array_writes_are_rejected() {
        let store = Store::new();
        let array = store.wrap(json!([1])).unwrap();
        let (log, _sub) = recorder(&array);

        assert!(matches!(
            array.set(usize::MAX, json!({ "x": 1 })),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            array.set(u32::MAX as usize, json!({ "x": 1 })),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            array.set("length", u64::MAX),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            array.set("length", 1u64 << 40),
            Err(Error::InvalidArgument(_))
        ));

        // No orphan node was created and nothing changed
        assert_eq!(store.node_count(), 1);
        assert_eq!(array.to_json(), json!([1]));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn non_canonical_index_names_are_not_positions() {
        let store = Store::new();
        let array = store.wrap(json!(["a", "b"])).unwrap();

        assert!(array.get("+1").is_none());
        assert!(array.get("01").is_none());
        assert!(!array.contains_key("01"));
        assert!(matches!(array.set("01", "z"), Err(Error::InvalidArgument(_))));
        assert_eq!(array.get("1").unwrap(), json!("b"));
    }

    #[test]
    fn weak_handles_upgrade_while_the_node_lives() {
        let store = Store::new();
        let root = store.wrap(json!({ "child": {} })).unwrap();
        let weak = root.get("child").unwrap().into_node().unwrap().downgrade();

        assert_eq!(weak.upgrade().unwrap(), root.get("child").unwrap().into_node().unwrap());

        root.set("child", json!(null)).unwrap();
        store.collect_garbage();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn weak_handles_do_not_keep_the_store_alive() {
        let inner = {
            let store = Store::new();
            let root = store.wrap(json!({ "count": 0, "mirror": 0 })).unwrap();

            let writer = root.downgrade();
            let _ = root.watch(move |path: &Path| {
                if *path == path!["count"] {
                    if let Some(root) = writer.upgrade() {
                        let count = root.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                        root.set("mirror", count).unwrap();
                    }
                }
            });

            root.set("count", 3).unwrap();
            assert_eq!(root.get("mirror").unwrap(), json!(3));
            Arc::downgrade(&store.inner)
        };
        assert!(inner.upgrade().is_none());
    }

    #[test]
    fn subscribing_through_a_detached_handle_survives_collection() {
        let store = Store::new();
        let root = store.wrap(json!({ "child": { "x": 0 } })).unwrap();
        let child = root.get("child").unwrap().into_node().unwrap();

        root.remove("child").unwrap();
        store.collect_garbage();

        let (log, _sub) = recorder(&child);
        child.set("x", 1).unwrap();
        assert_eq!(*log.lock(), vec![path!["x"]]);
    }

    #[test]
    fn snapshot_renders_cycles() {
        let store = Store::new();
        let root = store.wrap(json!({ "name": "root" })).unwrap();
        root.set("me", &root).unwrap();
        assert_eq!(root.to_json(), json!({ "name": "root", "me": "[Circular]" }));
    }
}
