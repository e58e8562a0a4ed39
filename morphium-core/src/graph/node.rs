//! Graph Nodes
//!
//! This module defines the per-node bookkeeping that lives in the arena:
//! the wrapped container, the set of parent attachments and the listeners.

use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::path::{Key, LENGTH};
use crate::reactive::{Callback, ListenerId};

slotmap::new_key_type! {
    /// Stable identifier of a tracked node inside its store's arena.
    pub struct NodeId;
}

/// One edge of the attachment graph: the node is stored in `parent` under `key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attachment {
    /// The container node holding the reference.
    pub parent: NodeId,
    /// The key under which the parent holds it.
    pub key: Key,
}

impl Attachment {
    pub fn new(parent: NodeId, key: Key) -> Self {
        Self { parent, key }
    }
}

/// What a container slot currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// A scalar, or a composite that has not been wrapped yet.
    Plain(JsonValue),
    /// A tracked child node.
    Node(NodeId),
}

impl Slot {
    /// Whether this slot holds a composite that still needs wrapping.
    pub fn is_unwrapped_composite(&self) -> bool {
        matches!(self, Slot::Plain(value) if is_composite(value))
    }

    pub fn node(&self) -> Option<NodeId> {
        match self {
            Slot::Node(id) => Some(*id),
            Slot::Plain(_) => None,
        }
    }
}

/// Largest array length accepted, the same bound JavaScript arrays have.
pub const MAX_ARRAY_LEN: usize = u32::MAX as usize;

/// Whether a plain value is trackable (object or array).
pub fn is_composite(value: &JsonValue) -> bool {
    matches!(value, JsonValue::Object(_) | JsonValue::Array(_))
}

/// The user data a node wraps.
#[derive(Debug)]
pub enum Container {
    /// Record-like container; keys keep insertion order.
    Object(IndexMap<String, Slot>),
    /// Ordered list.
    Array(Vec<Slot>),
}

impl Container {
    /// Build a container from a plain composite. Scalars are handed back.
    pub fn from_json(value: JsonValue) -> std::result::Result<Self, JsonValue> {
        match value {
            JsonValue::Object(map) => Ok(Container::Object(
                map.into_iter().map(|(k, v)| (k, Slot::Plain(v))).collect(),
            )),
            JsonValue::Array(items) => Ok(Container::Array(
                items.into_iter().map(Slot::Plain).collect(),
            )),
            scalar => Err(scalar),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Container::Array(_))
    }

    pub fn len(&self) -> usize {
        match self {
            Container::Object(map) => map.len(),
            Container::Array(items) => items.len(),
        }
    }

    /// The user keys, in order.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Container::Object(map) => map.keys().cloned().map(Key::Field).collect(),
            Container::Array(items) => (0..items.len()).map(Key::Index).collect(),
        }
    }

    /// Coerce a key into this container's shape for reading.
    ///
    /// Returns `None` for keys that cannot exist here. The array `length`
    /// pseudo field is passed through as a field key.
    pub fn normalize(&self, key: Key) -> Option<Key> {
        match self {
            Container::Object(_) => Some(Key::Field(key.into_field())),
            Container::Array(_) if key.is_length() => Some(key),
            Container::Array(_) => key.as_index().map(Key::Index),
        }
    }

    /// Coerce a key for writing; arrays reject non-numeric field names and
    /// indices at or beyond [`MAX_ARRAY_LEN`].
    pub fn normalize_for_write(&self, key: Key) -> Result<Key> {
        let described = key.to_string();
        match self.normalize(key) {
            Some(Key::Index(index)) if index >= MAX_ARRAY_LEN => Err(Error::invalid_argument(
                format!("Invalid array index provided: {described}"),
            )),
            Some(key) => Ok(key),
            None => Err(Error::invalid_argument(format!(
                "Invalid array key provided: {described}"
            ))),
        }
    }

    /// Allocate the room a later [`put`](Container::put) under `key` needs,
    /// so that the write itself cannot fail.
    pub fn reserve_for(&mut self, key: &Key) -> Result<()> {
        match (self, key) {
            (Container::Array(items), Key::Index(index)) => grow(items, index.saturating_add(1)),
            _ => Ok(()),
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Slot> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.get(name),
            (Container::Array(items), Key::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.get(key).is_some()
    }

    /// Store `slot` under `key`, returning the slot it replaced.
    ///
    /// Writing past the end of an array pads the gap with `null`.
    pub fn put(&mut self, key: &Key, slot: Slot) -> Option<Slot> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.insert(name.clone(), slot),
            (Container::Array(items), Key::Index(index)) => {
                if *index < items.len() {
                    Some(std::mem::replace(&mut items[*index], slot))
                } else {
                    items.resize(*index, Slot::Plain(JsonValue::Null));
                    items.push(slot);
                    None
                }
            }
            _ => None,
        }
    }

    /// Remove an object field, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &Key) -> Option<Slot> {
        match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.shift_remove(name),
            _ => None,
        }
    }

    /// Resize an array. Returns the removed tail, first index first.
    pub fn set_len(&mut self, len: usize) -> Result<Vec<(Key, Slot)>> {
        match self {
            Container::Array(items) if len < items.len() => {
                let tail = items.split_off(len);
                Ok(tail
                    .into_iter()
                    .enumerate()
                    .map(|(offset, slot)| (Key::Index(len + offset), slot))
                    .collect())
            }
            Container::Array(items) => {
                grow(items, len)?;
                items.resize(len, Slot::Plain(JsonValue::Null));
                Ok(Vec::new())
            }
            Container::Object(_) => Ok(Vec::new()),
        }
    }

    /// Remove the last array element.
    pub fn pop(&mut self) -> Option<(Key, Slot)> {
        match self {
            Container::Array(items) => {
                let slot = items.pop()?;
                Some((Key::Index(items.len()), slot))
            }
            Container::Object(_) => None,
        }
    }

    /// Keys of slots holding composites that have not been wrapped yet.
    pub fn unwrapped_keys(&self) -> Vec<Key> {
        self.entries()
            .filter(|(_, slot)| slot.is_unwrapped_composite())
            .map(|(key, _)| key)
            .collect()
    }

    /// Take a plain composite out of its slot, leaving `null` behind.
    pub fn take_unwrapped(&mut self, key: &Key) -> Option<JsonValue> {
        let slot = match (self, key) {
            (Container::Object(map), Key::Field(name)) => map.get_mut(name)?,
            (Container::Array(items), Key::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
        if !slot.is_unwrapped_composite() {
            return None;
        }
        match std::mem::replace(slot, Slot::Plain(JsonValue::Null)) {
            Slot::Plain(value) => Some(value),
            Slot::Node(_) => None,
        }
    }

    /// All `(key, slot)` pairs, in order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (Key, &Slot)> + '_> {
        match self {
            Container::Object(map) => {
                Box::new(map.iter().map(|(k, slot)| (Key::Field(k.clone()), slot)))
            }
            Container::Array(items) => {
                Box::new(items.iter().enumerate().map(|(i, slot)| (Key::Index(i), slot)))
            }
        }
    }

    /// Ids of every tracked child, with repeats if a child is held twice.
    pub fn child_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries().filter_map(|(_, slot)| slot.node())
    }
}

/// Make sure `items` can hold `len` slots without reallocating.
fn grow(items: &mut Vec<Slot>, len: usize) -> Result<()> {
    if len > MAX_ARRAY_LEN {
        return Err(Error::invalid_argument(format!("Invalid array length: {len}")));
    }
    items
        .try_reserve(len.saturating_sub(items.len()))
        .map_err(|err| Error::invalid_argument(format!("Cannot grow array to {len}: {err}")))
}

/// A tracked node in the arena.
pub struct Node {
    /// The wrapped user data.
    container: Container,

    /// Every place this node is currently stored, in attachment order.
    /// Empty for roots and detached nodes.
    parents: IndexSet<Attachment>,

    /// Callbacks registered directly on this node.
    listeners: IndexMap<ListenerId, Callback>,

    /// Shared with every live handle to this node. While any handle exists
    /// the node is a garbage collection root.
    pin: Weak<()>,
}

impl Node {
    /// Create a detached node around `container`.
    pub fn new(container: Container) -> Self {
        Self {
            container,
            parents: IndexSet::new(),
            listeners: IndexMap::new(),
            pin: Weak::new(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    /// Record that `attachment.parent` holds this node. Returns false if the
    /// attachment was already known.
    pub fn attach(&mut self, attachment: Attachment) -> bool {
        self.parents.insert(attachment)
    }

    /// Forget one attachment. Returns false if it was not present.
    pub fn detach(&mut self, attachment: &Attachment) -> bool {
        self.parents.shift_remove(attachment)
    }

    /// Drop every attachment to `parent`, whatever the key.
    pub fn forget_parent(&mut self, parent: NodeId) {
        self.parents.retain(|attachment| attachment.parent != parent);
    }

    pub fn parents(&self) -> &IndexSet<Attachment> {
        &self.parents
    }

    pub fn add_listener(&mut self, id: ListenerId, callback: Callback) {
        self.listeners.insert(id, callback);
    }

    /// Returns false if the listener was not registered here.
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.shift_remove(&id).is_some()
    }

    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    pub fn listeners(&self) -> &IndexMap<ListenerId, Callback> {
        &self.listeners
    }

    /// Remove and return every listener.
    pub fn take_listeners(&mut self) -> IndexMap<ListenerId, Callback> {
        std::mem::take(&mut self.listeners)
    }

    /// Get the pin shared by handles, creating it if no handle is alive.
    pub fn pin(&mut self) -> Arc<()> {
        match self.pin.upgrade() {
            Some(pin) => pin,
            None => {
                let pin = Arc::new(());
                self.pin = Arc::downgrade(&pin);
                pin
            }
        }
    }

    /// Whether a handle to this node is alive.
    pub fn is_pinned(&self) -> bool {
        self.pin.strong_count() > 0
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("container", &self.container)
            .field("parents", &self.parents)
            .field("listener_count", &self.listeners.len())
            .field("pinned", &self.is_pinned())
            .finish()
    }
}
