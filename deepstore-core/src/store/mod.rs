//! Observable Stores
//!
//! This module implements the container hierarchy: base stores, derived
//! stores, sub stores and adapter stores. Together they form a small
//! dependency graph where every edge is a plain subscription.
//!
//! # Concepts
//!
//! ## Stores
//!
//! A [`Store`] holds a value and a set of subscribers. Writes pass through an
//! equality gate; accepted writes are announced to every subscriber before
//! the write returns. There is no scheduler and no deferred delivery.
//!
//! ## Policies
//!
//! How a store compares and copies values is injected as a [`Policy`]:
//! an [`Equality`] rule and a [`Cloning`] rule.
//!
//! ## Lazy sources
//!
//! Upstream subscriptions (parents, foreign observables) are declared as
//! sources and armed only while the store itself has subscribers. An unused
//! store holds nothing upstream and can be dropped freely.
//!
//! ## Derived, sub and adapter stores
//!
//! - [`DerivedStore`]: read-only, computed from one or more parents.
//! - [`SubStore`]: read-write view into a slice of one parent.
//! - [`AdapterStore`]: mirrors a foreign observable in both directions
//!   without feedback loops.
//!
//! All of them speak the [`Readable`] / [`Writable`] / [`Settable`] contract,
//! which is all a consumer ever needs to know.

mod adapter;
mod base;
mod contract;
mod debounce;
mod derived;
mod policy;
mod sub;
mod subscriber;

pub use adapter::AdapterStore;
pub use base::{SourceInit, Store};
pub use contract::{try_set, Readable, Settable, Writable};
pub use debounce::Debouncer;
pub use derived::DerivedStore;
pub use policy::{Cloning, CloningKind, Equality, EqualityKind, Policy};
pub use sub::SubStore;
pub use subscriber::{Callback, SubscriberId, Subscription};
