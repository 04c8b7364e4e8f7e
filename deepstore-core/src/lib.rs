//! Deepstore Core
//!
//! This crate provides observable state containers ("stores") that propagate
//! changes to interested listeners without a central event loop.
//! It implements:
//!
//! - A base store with pluggable equality and clone policies
//! - Lazy upstream sources, armed only while a store has subscribers
//! - Derived stores computed from one or more parents, with optional debounce
//! - Sub stores that read and write a slice of a parent
//! - Adapter stores that bridge foreign observables without echo loops
//!
//! # Architecture
//!
//! - `store`: the containers and the contract they share
//! - `path`: dot-path accessors over `serde_json::Value`
//! - `toast`: a toast queue built on a plain store
//! - `error`: usage errors
//!
//! # Example
//!
//! ```rust
//! use deepstore_core::store::{DerivedStore, Store, SubStore};
//! use serde_json::json;
//!
//! let form = Store::new(json!({ "user": { "name": "ada" }, "dirty": false }));
//!
//! // A two-way view into one field.
//! let name = SubStore::at_path(form.clone(), "user.name").unwrap();
//!
//! // A read-only projection.
//! let greeting = DerivedStore::new(name.clone(), |n: &serde_json::Value| {
//!     format!("hello, {}", n.as_str().unwrap_or("stranger"))
//! });
//!
//! name.set(json!("grace"));
//! assert_eq!(greeting.get(), "hello, grace");
//! assert_eq!(form.get()["user"]["name"], "grace");
//! ```

pub mod error;
pub mod path;
pub mod store;
pub mod toast;

pub use error::{Result, StoreError};
