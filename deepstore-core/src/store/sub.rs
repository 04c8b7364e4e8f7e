//! Sub Store Implementation
//!
//! A SubStore is a read-write view into a slice of one parent store.
//!
//! Reading works like a single-parent derived store: a getter maps the
//! parent value to the slice, and the parent is subscribed lazily.
//!
//! Writing goes the other way. `set(v)` runs exactly one `update` on the
//! parent with `setter(v, parent_value)`. The sub store keeps no pending
//! copy of `v`; it converges when the parent notifies, which happens before
//! `set` returns.

use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::base::Store;
use super::contract::{Readable, Settable, Writable};
use super::policy::{CloningKind, Policy};
use super::subscriber::{Callback, Subscription};
use crate::error::Result;
use crate::path::Path;

type Setter<S, P> = Arc<dyn Fn(S, P) -> P + Send + Sync>;

/// A two-way view into part of a parent store.
///
/// # Example
///
/// ```rust
/// use deepstore_core::store::{Store, SubStore};
/// use serde_json::json;
///
/// let parent = Store::new(json!({ "deep": { "value": "here" }, "hello": "world" }));
/// let leaf = SubStore::at_path(parent.clone(), "deep.value").unwrap();
///
/// leaf.set(json!("there"));
/// assert_eq!(parent.get()["deep"]["value"], "there");
/// assert_eq!(parent.get()["hello"], "world");
/// ```
pub struct SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
{
    store: Store<S>,
    parent: Arc<dyn Writable<P>>,
    setter: Setter<S, P>,
}

impl<S, P> SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: 'static,
{
    /// Build from a getter and a setter. The setter receives the new slice
    /// and the current parent value and returns the new parent value.
    ///
    /// The slice skips structurally equal writes and copies values the way
    /// the parent does: a slice of a deep-copying parent is deep-copied too.
    pub fn new<W, G, F>(parent: W, getter: G, setter: F) -> Self
    where
        W: Writable<P> + 'static,
        G: Fn(&P) -> S + Send + Sync + 'static,
        F: Fn(S, P) -> P + Send + Sync + 'static,
        S: PartialEq + Serialize + DeserializeOwned,
    {
        let policy = match parent.cloning_kind() {
            CloningKind::Deep => Policy::safe(),
            CloningKind::Identity | CloningKind::Custom => Policy::structural(),
        };
        Self::with_policy(parent, getter, setter, policy)
    }

    /// Build with explicit policies for the slice.
    pub fn with_policy<W, G, F>(parent: W, getter: G, setter: F, policy: Policy<S>) -> Self
    where
        W: Writable<P> + 'static,
        G: Fn(&P) -> S + Send + Sync + 'static,
        F: Fn(S, P) -> P + Send + Sync + 'static,
    {
        let parent: Arc<dyn Writable<P>> = Arc::new(parent);
        let store = Store::with_policy(getter(&parent.get()), policy);

        let getter = Arc::new(getter);
        let upstream = Arc::clone(&parent);
        let weak = store.downgrade();
        store.register_source(move || {
            let getter = Arc::clone(&getter);
            let weak = weak.clone();
            upstream.subscribe_boxed(Arc::new(move |value: &P| {
                if let Some(store) = weak.upgrade() {
                    store.set(getter(value));
                }
            }))
        });

        Self {
            store,
            parent,
            setter: Arc::new(setter),
        }
    }

    pub fn id(&self) -> u64 {
        self.store.id()
    }

    /// Get the current slice, refreshing from the parent if idle.
    pub fn get(&self) -> S {
        self.store.get()
    }

    /// Write the slice back into the parent.
    pub fn set(&self, value: S) {
        let setter = Arc::clone(&self.setter);
        self.parent
            .update_boxed(Box::new(move |current: P| setter(value, current)));
    }

    /// Replace the slice with `updater` applied to a copy of it.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(S) -> S,
    {
        self.set(updater(self.store.get()));
    }

    /// Register a callback; see [`Readable::subscribe_boxed`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Drop every subscriber and release the parent.
    pub fn clear_subscribers(&self) {
        self.store.clear_subscribers();
    }
}

impl SubStore<Value, Value> {
    /// View the location at a dot path inside a JSON parent.
    ///
    /// Fails when the path cannot be parsed, since no setter can be built
    /// for it.
    pub fn at_path<W>(parent: W, path: &str) -> Result<Self>
    where
        W: Writable<Value> + 'static,
    {
        let path = Arc::new(Path::parse(path)?);
        let read = Arc::clone(&path);
        Ok(Self::new(
            parent,
            move |value: &Value| read.get(value),
            move |slice, value| path.with(value, slice),
        ))
    }
}

impl<S, P> Clone for SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            parent: Arc::clone(&self.parent),
            setter: Arc::clone(&self.setter),
        }
    }
}

impl<S, P> Debug for SubStore<S, P>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubStore")
            .field("store", &self.store)
            .field("parent", &self.parent.id())
            .finish()
    }
}

impl<S, P> Readable<S> for SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: 'static,
{
    fn subscribe_boxed(&self, callback: Callback<S>) -> Subscription {
        self.store.subscribe_boxed(callback)
    }

    fn get(&self) -> S {
        self.store.get()
    }

    fn id(&self) -> u64 {
        self.store.id()
    }

    fn as_settable(&self) -> Option<&dyn Settable<S>> {
        Some(self)
    }

    fn cloning_kind(&self) -> CloningKind {
        self.store.cloning_kind()
    }
}

impl<S, P> Writable<S> for SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: 'static,
{
    fn update_boxed(&self, updater: Box<dyn FnOnce(S) -> S + '_>) {
        self.set(updater(self.store.get()));
    }
}

impl<S, P> Settable<S> for SubStore<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: 'static,
{
    fn set(&self, value: S) {
        SubStore::set(self, value);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
