//! Store
//!
//! The store is the context object every tracked node belongs to. It owns:
//!
//! - the arena of nodes (containers, attachments, listeners),
//! - the task queue used by batched subscriptions,
//! - the batch depth counter and the [`StoreConfig`].
//!
//! There is no process-wide registry: "is this value already tracked" is
//! answered by the value itself (a [`Value::Node`] handle) and the handle's
//! store, so independent stores never interfere.
//!
//! # Locking
//!
//! The arena sits behind one `parking_lot::Mutex`. Every operation locks it,
//! does its bookkeeping and collects the notifications it owes, then releases
//! the lock before any listener runs. Listeners are therefore free to read
//! and write tracked nodes, including the one that notified them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value as JsonValue;
use slotmap::SlotMap;
use tracing::{debug, trace};

use super::context::BatchScope;
use super::notify::{self, Delivery};
use super::subscriber::{BatchState, Callback, ListenerId, PathsListener, SubscribeOptions, Subscription};
use super::tracked::Tracked;
use super::value::Value;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::graph::{is_composite, Attachment, Container, Node, NodeId, Slot, TaskQueue, MAX_ARRAY_LEN};
use crate::path::{Key, Path, LENGTH};

/// What a write stores, once resolved against the arena.
pub(crate) enum Incoming {
    Plain(JsonValue),
    Node(NodeId),
}

/// The node table.
pub(crate) struct Arena {
    nodes: SlotMap<NodeId, Node>,
    deep_wrap: bool,
}

impl Arena {
    fn new(deep_wrap: bool) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            deep_wrap,
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| Error::invalid_argument(format!("Node {id:?} no longer exists")))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::invalid_argument(format!("Node {id:?} no longer exists")))
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Insert a container as a new node, optionally pre-attached, and wrap
    /// its composite children when deep wrapping is on.
    pub(crate) fn insert(&mut self, container: Container, attachment: Option<Attachment>) -> NodeId {
        let mut node = Node::new(container);
        if let Some(attachment) = attachment {
            node.attach(attachment);
        }
        let id = self.nodes.insert(node);
        debug!(node = ?id, "tracked node created");

        if self.deep_wrap {
            let keys = self.nodes[id].container().unwrapped_keys();
            for key in keys {
                self.wrap_slot(id, &key);
            }
        }
        id
    }

    /// Wrap the plain composite stored in `parent[key]` and store the node
    /// back into the slot. Returns the child id, or `None` if the slot does
    /// not hold an unwrapped composite.
    fn wrap_slot(&mut self, parent: NodeId, key: &Key) -> Option<NodeId> {
        let value = self.nodes.get_mut(parent)?.container_mut().take_unwrapped(key)?;
        let container = Container::from_json(value).ok()?;
        let child = self.insert(container, Some(Attachment::new(parent, key.clone())));
        self.nodes
            .get_mut(parent)?
            .container_mut()
            .put(key, Slot::Node(child));
        Some(child)
    }

    /// Read one slot. Unwrapped composites are wrapped on the way out and the
    /// wrapped form is memoized in the slot.
    pub(crate) fn read(&mut self, id: NodeId, key: Key) -> Option<Slot> {
        let container = self.nodes.get(id)?.container();
        let key = container.normalize(key)?;

        if key.is_length() {
            return Some(Slot::Plain(JsonValue::from(container.len())));
        }
        if !container.get(&key)?.is_unwrapped_composite() {
            return container.get(&key).cloned();
        }
        let child = self.wrap_slot(id, &key)?;
        trace!(parent = ?id, child = ?child, key = %key, "wrapped lazily on read");
        Some(Slot::Node(child))
    }

    /// Resolve an incoming value into a slot, wrapping fresh composites with
    /// the attachment to `parent[key]` already registered.
    fn resolve(&mut self, incoming: Incoming, parent: NodeId, key: &Key) -> Result<Slot> {
        match incoming {
            Incoming::Node(child) => {
                self.node(child)?;
                Ok(Slot::Node(child))
            }
            Incoming::Plain(value) => match Container::from_json(value) {
                Ok(container) => {
                    let attachment = Attachment::new(parent, key.clone());
                    Ok(Slot::Node(self.insert(container, Some(attachment))))
                }
                Err(scalar) => Ok(Slot::Plain(scalar)),
            },
        }
    }

    /// Write `incoming` into `id[key]`, keeping the attachment graph in step.
    /// Returns the normalized key that changed.
    pub(crate) fn write(&mut self, id: NodeId, key: Key, incoming: Incoming) -> Result<Key> {
        let key = self.node(id)?.container().normalize_for_write(key)?;
        if key.is_length() {
            self.set_length(id, incoming)?;
            return Ok(key);
        }

        // Nothing may be inserted or attached until the slot is known to fit.
        self.node_mut(id)?.container_mut().reserve_for(&key)?;

        let fresh = matches!(incoming, Incoming::Plain(ref value) if is_composite(value));
        let slot = self.resolve(incoming, id, &key)?;
        let previous = self.node_mut(id)?.container_mut().put(&key, slot.clone());

        if let Some(old) = previous.as_ref().and_then(Slot::node) {
            self.detach(old, id, &key);
        }
        if let (Some(child), false) = (slot.node(), fresh) {
            self.attach(child, id, key.clone());
        }
        Ok(key)
    }

    /// Delete an object field.
    pub(crate) fn remove(&mut self, id: NodeId, key: Key) -> Result<Option<Slot>> {
        let container = self.node(id)?.container();
        if container.is_array() {
            return Err(Error::invalid_argument(format!(
                "Cannot remove key {key} from an array; use pop or set its length"
            )));
        }
        let key = Key::Field(key.into_field());
        let removed = self.node_mut(id)?.container_mut().remove(&key);
        if let Some(old) = removed.as_ref().and_then(Slot::node) {
            self.detach(old, id, &key);
        }
        Ok(removed)
    }

    fn set_length(&mut self, id: NodeId, incoming: Incoming) -> Result<()> {
        let len = match incoming {
            Incoming::Plain(JsonValue::Number(ref n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|len| *len <= MAX_ARRAY_LEN),
            _ => None,
        }
        .ok_or_else(|| Error::invalid_argument("Invalid array length"))?;

        let removed = self.node_mut(id)?.container_mut().set_len(len)?;
        for (key, slot) in removed {
            if let Some(old) = slot.node() {
                self.detach(old, id, &key);
            }
        }
        Ok(())
    }

    /// Remove the last element of an array.
    pub(crate) fn pop(&mut self, id: NodeId) -> Result<Option<Slot>> {
        let node = self.node_mut(id)?;
        if !node.container().is_array() {
            return Err(Error::invalid_argument("Cannot pop from an object"));
        }
        let Some((key, slot)) = node.container_mut().pop() else {
            return Ok(None);
        };
        if let Some(old) = slot.node() {
            self.detach(old, id, &key);
        }
        Ok(Some(slot))
    }

    fn attach(&mut self, child: NodeId, parent: NodeId, key: Key) {
        if let Some(node) = self.nodes.get_mut(child) {
            debug!(child = ?child, parent = ?parent, key = %key, "attached");
            node.attach(Attachment::new(parent, key));
        }
    }

    fn detach(&mut self, child: NodeId, parent: NodeId, key: &Key) {
        if let Some(node) = self.nodes.get_mut(child) {
            if node.detach(&Attachment::new(parent, key.clone())) {
                debug!(child = ?child, parent = ?parent, key = %key, "detached");
            }
        }
    }

    /// Plain deep copy of a node. Cycles render as `"[Circular]"`.
    pub(crate) fn snapshot(&self, id: NodeId, chain: &mut Vec<NodeId>) -> JsonValue {
        let Some(node) = self.nodes.get(id) else {
            return JsonValue::Null;
        };
        chain.push(id);
        let mut render = |slot: &Slot| match slot {
            Slot::Plain(value) => value.clone(),
            Slot::Node(child) if chain.contains(child) => JsonValue::from("[Circular]"),
            Slot::Node(child) => self.snapshot(*child, chain),
        };
        let out = match node.container() {
            Container::Object(map) => JsonValue::Object(
                map.iter().map(|(k, slot)| (k.clone(), render(slot))).collect(),
            ),
            Container::Array(items) => JsonValue::Array(items.iter().map(render).collect()),
        };
        chain.pop();
        out
    }

    /// Detach every listener from every node, handing them to the caller.
    fn take_listeners(&mut self) -> Vec<Callback> {
        self.nodes
            .values_mut()
            .flat_map(|node| node.take_listeners().into_values())
            .collect()
    }

    /// Remove every node not reachable from a root. Roots are nodes with a
    /// live handle or at least one listener.
    fn collect_garbage(&mut self) -> usize {
        let mut reachable = HashSet::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.is_pinned() || !node.listeners().is_empty())
            .map(|(id, _)| id)
            .collect();

        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.container().child_ids());
            }
        }

        let dead: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !reachable.contains(id))
            .collect();
        for id in &dead {
            self.nodes.remove(*id);
        }
        for (_, node) in self.nodes.iter_mut() {
            for id in &dead {
                node.forget_parent(*id);
            }
        }
        dead.len()
    }
}

pub(crate) struct StoreInner {
    arena: Mutex<Arena>,
    pub(crate) tasks: TaskQueue,
    pub(crate) batch_depth: AtomicUsize,
    config: StoreConfig,
}

/// Owner of a family of tracked nodes.
///
/// Cloning a store is cheap and yields another handle to the same nodes.
///
/// ```rust
/// use morphium_core::{path, Path, Store};
/// use serde_json::json;
/// use std::sync::{Arc, Mutex};
///
/// let store = Store::new();
/// let state = store.wrap(json!({ "user": { "name": "Ada" } })).unwrap();
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// state.subscribe(move |paths: &[Path]| sink.lock().unwrap().extend_from_slice(paths));
///
/// store.batch(|| {
///     let user = state.get("user").unwrap().into_node().unwrap();
///     user.set("name", "Grace").unwrap();
/// });
///
/// assert_eq!(*seen.lock().unwrap(), vec![path!["user", "name"]]);
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Create a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                arena: Mutex::new(Arena::new(config.deep_wrap)),
                tasks: TaskQueue::new(),
                batch_depth: AtomicUsize::new(0),
                config,
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Arena> {
        self.inner.arena.lock()
    }

    pub(crate) fn ptr_eq(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a handle to `id`. Must be called with the arena locked.
    pub(crate) fn handle(&self, arena: &mut Arena, id: NodeId) -> Result<Tracked> {
        let pin = arena.node_mut(id)?.pin();
        Ok(Tracked::new(self.clone(), id, pin))
    }

    pub(crate) fn slot_value(&self, arena: &mut Arena, slot: Slot) -> Result<Value> {
        match slot {
            Slot::Plain(value) => Ok(Value::Plain(value)),
            Slot::Node(id) => self.handle(arena, id).map(Value::Node),
        }
    }

    /// Map a caller's value onto this store.
    pub(crate) fn incoming(&self, value: Value) -> Result<Incoming> {
        match value {
            Value::Plain(value) => Ok(Incoming::Plain(value)),
            Value::Node(node) if node.store().ptr_eq(self) => Ok(Incoming::Node(node.id())),
            Value::Node(_) => Err(Error::invalid_argument(
                "Tracked node belongs to a different store",
            )),
        }
    }

    /// Turn a plain composite into a tracked node.
    ///
    /// Wrapping is idempotent: a value that is already a node of this store
    /// comes back unchanged.
    pub fn wrap(&self, value: impl Into<Value>) -> Result<Tracked> {
        match self.incoming(value.into())? {
            Incoming::Node(id) => {
                let mut arena = self.lock();
                self.handle(&mut arena, id)
            }
            Incoming::Plain(value) => {
                let container = Container::from_json(value).map_err(|scalar| {
                    Error::invalid_argument(format!("Invalid object provided: {scalar}"))
                })?;
                let mut arena = self.lock();
                let id = arena.insert(container, None);
                self.handle(&mut arena, id)
            }
        }
    }

    /// Register `listener` on a tracked value.
    ///
    /// Fails with [`Error::InvalidArgument`] when `target` is not a tracked
    /// node of this store.
    pub fn subscribe<F>(
        &self,
        target: &Value,
        listener: F,
        options: SubscribeOptions,
    ) -> Result<Subscription>
    where
        F: Fn(&[Path]) + Send + Sync + 'static,
    {
        let node = match target {
            Value::Node(node) if node.store().ptr_eq(self) => node.id(),
            Value::Node(_) => {
                return Err(Error::invalid_argument(
                    "Tracked node belongs to a different store",
                ))
            }
            Value::Plain(_) => return Err(Error::invalid_argument("Object is not morphed")),
        };

        let listener: PathsListener = Arc::new(listener);
        let batch = options.batch.unwrap_or(self.inner.config.batch_by_default);
        let (callback, state) = if batch {
            let state = Arc::new(BatchState::default());
            let callback = state.callback(Arc::downgrade(&self.inner), listener);
            (callback, Some(state))
        } else {
            let callback: Callback =
                Arc::new(move |path: &Path| listener(std::slice::from_ref(path)));
            (callback, None)
        };

        let id = ListenerId::new();
        self.lock().node_mut(node)?.add_listener(id, callback);
        debug!(listener = ?id, node = ?node, batch, "listener added");

        Ok(Subscription::new(self.clone(), node, id, state))
    }

    pub(crate) fn has_listener(&self, node: NodeId, id: ListenerId) -> bool {
        self.lock()
            .get(node)
            .is_some_and(|node| node.has_listener(id))
    }

    pub(crate) fn remove_listener(&self, node: NodeId, id: ListenerId) -> bool {
        self.lock()
            .node_mut(node)
            .map(|node| node.remove_listener(id))
            .unwrap_or(false)
    }

    /// Collect the notifications owed for a change at `node[path]` and run
    /// them with the arena unlocked.
    pub(crate) fn notify(&self, arena: MutexGuard<'_, Arena>, node: NodeId, path: Path) {
        let deliveries: Vec<Delivery> = arena.propagation(node, path);
        drop(arena);
        notify::deliver(self, deliveries);
    }

    /// Run every deferred task, including tasks scheduled while draining.
    /// Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;
        while let Some((id, task)) = self.inner.tasks.pop() {
            trace!(task = ?id, "running deferred task");
            notify::isolate(task, || format!("deferred task {id:?}"));
            ran += 1;
        }
        ran
    }

    /// Run `f`, then flush deferred tasks once the outermost batch exits.
    ///
    /// This is the synchronous stand-in for "the end of the current tick":
    /// every batched subscriber hears about the writes made inside `f` in a
    /// single call.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = BatchScope::enter(self);
        f()
    }

    /// Whether a [`Store::batch`] call is in progress.
    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.load(Ordering::SeqCst) > 0
    }

    /// Number of deferred tasks waiting for [`Store::flush`].
    pub fn pending_tasks(&self) -> usize {
        self.inner.tasks.len()
    }

    /// Number of nodes in the arena, reachable or not.
    pub fn node_count(&self) -> usize {
        self.lock().len()
    }

    /// Reclaim nodes that can no longer be observed: not reachable from any
    /// node that has a live handle or a listener. Returns how many were
    /// removed.
    pub fn collect_garbage(&self) -> usize {
        let removed = self.lock().collect_garbage();
        if removed > 0 {
            debug!(removed, "collected unreachable nodes");
        }
        removed
    }

    /// Tear down every subscription: remove all listeners and drop pending
    /// deferred tasks without running them. Nodes and handles stay valid.
    ///
    /// Listeners that capture strong [`Tracked`] handles keep the store alive;
    /// clearing releases them. Returns how many listeners were removed.
    pub fn clear(&self) -> usize {
        let listeners = self.lock().take_listeners();
        let tasks = self.inner.tasks.clear();
        debug!(listeners = listeners.len(), tasks, "store cleared");
        listeners.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("nodes", &self.node_count())
            .field("pending_tasks", &self.pending_tasks())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Name of the array `length` pseudo key as a path element.
pub(crate) fn length_key() -> Key {
    Key::Field(LENGTH.to_owned())
}
