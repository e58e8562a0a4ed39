//! Notification Engine
//!
//! When a slot changes, the engine tells every listener that can observe the
//! change, each with a path relative to the node it is registered on.
//!
//! # How It Works
//!
//! 1. Listeners registered directly on the mutated node receive `[key]`.
//!
//! 2. For every current attachment `(parent, k)` of the node, the walk
//!    continues at `parent` with `[k, key]`, and so on up to every root.
//!
//! 3. A node shared by several parents is walked once per attachment, so a
//!    listener reachable along two chains hears the change once per chain.
//!
//! The walk reads the live attachment sets at the moment of the write:
//! detached subtrees no longer reach their former ancestors, reattached ones
//! reach the new ones from then on.
//!
//! # Delivery
//!
//! The walk only collects `(listener, path)` pairs while the arena is locked.
//! The callbacks run afterwards, unlocked, each inside its own
//! `catch_unwind`: a panicking listener is logged and the remaining
//! listeners still run. A listener removed by an earlier listener of the
//! same delivery is skipped.
//!
//! The set of recipients is fixed when the write happens. Attachments changed
//! by a listener take effect for the next write, not for the pass in flight.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, trace, warn};

use super::store::{Arena, Store};
use super::subscriber::{Callback, ListenerId};
use crate::graph::NodeId;
use crate::path::Path;

/// One pending listener invocation.
pub(crate) struct Delivery {
    node: NodeId,
    listener: ListenerId,
    callback: Callback,
    path: Path,
}

impl Arena {
    /// Collect every delivery owed for a change at `node[path]`.
    pub(crate) fn propagation(&self, node: NodeId, path: Path) -> Vec<Delivery> {
        let mut out = Vec::new();
        let mut chain = Vec::new();
        self.walk(node, path, &mut chain, &mut out);
        out
    }

    fn walk(&self, id: NodeId, path: Path, chain: &mut Vec<NodeId>, out: &mut Vec<Delivery>) {
        let Some(node) = self.get(id) else {
            return;
        };

        for (listener, callback) in node.listeners() {
            out.push(Delivery {
                node: id,
                listener: *listener,
                callback: callback.clone(),
                path: path.clone(),
            });
        }

        chain.push(id);
        for attachment in node.parents() {
            if chain.contains(&attachment.parent) {
                warn!(node = ?id, parent = ?attachment.parent, path = %path, "cycle in attachment graph; not following");
                continue;
            }
            let path = path.prepend(attachment.key.clone());
            self.walk(attachment.parent, path, chain, out);
        }
        chain.pop();
    }
}

/// Run collected deliveries in order. Must be called with the arena unlocked.
pub(crate) fn deliver(store: &Store, deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if !store.has_listener(delivery.node, delivery.listener) {
            continue;
        }
        trace!(listener = ?delivery.listener, node = ?delivery.node, path = %delivery.path, "notify");
        let Delivery {
            listener,
            callback,
            path,
            ..
        } = delivery;
        isolate(
            || callback(&path),
            || format!("listener {listener:?} at path [{path}]"),
        );
    }
}

/// Run `f`, logging instead of propagating a panic.
pub(crate) fn isolate(f: impl FnOnce(), describe: impl FnOnce() -> String) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(callback = %describe(), panic = %message, "callback panicked");
    }
}
