//! Attachment Graph
//!
//! This module implements the bookkeeping that relates tracked nodes to the
//! containers holding them.
//!
//! # Overview
//!
//! Nodes live in an arena owned by their store and refer to each other only
//! by [`NodeId`]. The graph has two directions:
//!
//! - Downward edges are the container slots: a slot holds either plain data
//!   or the id of a child node.
//! - Upward edges are [`Attachment`]s: every node keeps the set of
//!   `(parent, key)` pairs under which it is currently stored.
//!
//! The upward set is what change notifications walk. A node may have no
//! parents (a root, or a detached subtree), one, or many when the same
//! subtree is shared between containers. Both directions are updated
//! together on every write, so they always agree.
//!
//! The graph may contain cycles (a node stored somewhere beneath itself).
//! Walks cut them by never revisiting a node already on the current chain.
//!
//! # Deferred work
//!
//! [`TaskQueue`] holds the flush tasks scheduled by batched subscriptions.

mod node;
mod scheduler;

pub use node::{is_composite, Attachment, Container, Node, NodeId, Slot, MAX_ARRAY_LEN};
pub use scheduler::{Task, TaskId, TaskQueue};
