//! Morphium Core
//!
//! This crate provides deep reactivity for nested data. Wrap an arbitrary
//! structure of objects and arrays, and you get a tracked version that:
//!
//! - reads and writes like the plain data,
//! - notifies listeners of every mutation with the exact path that changed,
//! - keeps those paths correct while subtrees are moved, replaced, detached,
//!   reattached or shared between several trees.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: arena nodes, containers and the parent attachment graph
//! - `reactive`: the store, tracked handles, notification engine and
//!   subscriptions
//! - `lookup`: path resolution against tracked or plain values
//! - `path`: keys and paths
//!
//! # Example
//!
//! ```rust
//! use morphium_core::{path, Path, Store};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! let store = Store::new();
//! let state = store.wrap(json!({ "path": { "to": { "value": "test" } } })).unwrap();
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let subscription = state.watch(move |path: &Path| sink.lock().unwrap().push(path.clone()));
//!
//! let to = state.lookup(&path!["path", "to"]).unwrap().into_node().unwrap();
//! to.set("value", "changed").unwrap();
//!
//! assert_eq!(*seen.lock().unwrap(), vec![path!["path", "to", "value"]]);
//! subscription.unsubscribe();
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod lookup;
pub mod path;
pub mod reactive;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use graph::NodeId;
pub use lookup::get;
pub use path::{Key, Path};
pub use reactive::{
    BatchScope, ListenerId, Store, SubscribeOptions, Subscription, SubscriptionGuard, Tracked,
    Value, WeakTracked,
};
