//! Tracked Values
//!
//! This module implements the tracking wrapper, the notification engine and
//! the subscription API on top of the attachment graph.
//!
//! # Concepts
//!
//! ## Store
//!
//! A [`Store`] owns a family of tracked nodes. It is the explicit context for
//! everything in this module: wrapping, reading, writing, subscribing and
//! flushing deferred work all go through it.
//!
//! ## Tracked nodes
//!
//! [`Store::wrap`] turns plain JSON-like data into a [`Tracked`] node. Reads
//! return tracked children; writes update the data, keep the attachment graph
//! in step (detach what was replaced, attach what was stored) and notify.
//!
//! ## Notifications
//!
//! A write at `node[key]` reaches every listener on `node` with `[key]`, and
//! every listener on an ancestor with the path from that ancestor. Shared
//! subtrees notify once per parent chain.
//!
//! ## Batching
//!
//! Batched subscribers buffer paths and receive them in one call when the
//! store's deferred task queue is drained, via [`Store::flush`] or at the end
//! of [`Store::batch`].
//!
//! # Implementation Notes
//!
//! Nodes live in an arena and reference each other by id, so the ownership
//! graph may share and even cycle without reference-counted cycles. Listener
//! callbacks never run with the arena locked, which makes reentrant writes
//! from inside a listener safe.

mod context;
mod notify;
mod store;
mod subscriber;
mod tracked;
mod value;

pub use context::BatchScope;
pub use store::Store;
pub use subscriber::{ListenerId, SubscribeOptions, Subscription, SubscriptionGuard};
pub use tracked::{Tracked, WeakTracked};
pub use value::Value;

pub(crate) use subscriber::Callback;
