//! Store Implementation
//!
//! A Store is the base observable container. It holds a value, a registry of
//! subscriber callbacks, and a list of upstream sources.
//!
//! # How Stores Work
//!
//! 1. `subscribe` registers a callback and immediately calls it with the
//!    current value.
//!
//! 2. `set` and `update` run the equality policy against the stored value.
//!    Equal values are dropped; anything else is copied in (per the clone
//!    policy) and every subscriber is called before the write returns.
//!
//! 3. Sources are registered up front but only armed while at least one
//!    subscriber exists. The first subscriber arms them, the last
//!    unsubscribe tears them down. A store nobody listens to holds no
//!    upstream subscriptions and no timers.
//!
//! # Locking
//!
//! Values and registries sit behind `parking_lot` locks so handles can cross
//! threads (debounce timers fire on the tokio runtime). No lock is held while
//! user callbacks run, so callbacks may read from or write to any store,
//! including the one notifying them.
//!
//! # Delivery order
//!
//! Notifications go through a per-thread queue. A write made by a callback
//! is delivered after the deliveries already queued, so a subscriber never
//! receives an older value after a newer one. The outermost write drains the
//! queue before it returns.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::contract::{Readable, Settable, Writable};
use super::policy::{CloningKind, Policy};
use super::subscriber::{Callback, SubscriberId, Subscription};

/// Counter for generating unique store IDs. Zero is reserved for "untracked".
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Arms an upstream source and returns the handle that disarms it.
pub type SourceInit = Arc<dyn Fn() -> Subscription + Send + Sync>;

/// One callback invocation waiting in the delivery queue.
type Delivery = Box<dyn FnOnce()>;

thread_local! {
    static PENDING: RefCell<VecDeque<Delivery>> = RefCell::new(VecDeque::new());
    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Resets the queue if a callback unwinds mid-drain.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        PENDING.with(|pending| pending.borrow_mut().clear());
        DRAINING.with(|draining| draining.set(false));
    }
}

/// Queue `batch` and, unless an outer call on this thread is already
/// draining, run every queued delivery in order.
///
/// A write made from inside a callback is queued behind the deliveries of
/// the write that triggered it, so each subscriber always sees the newest
/// value last.
fn deliver(batch: impl Iterator<Item = Delivery>) {
    PENDING.with(|pending| pending.borrow_mut().extend(batch));
    if DRAINING.with(|draining| draining.replace(true)) {
        return;
    }

    let _guard = DrainGuard;
    while let Some(delivery) = PENDING.with(|pending| pending.borrow_mut().pop_front()) {
        delivery();
    }
}

#[derive(Default)]
struct Sources {
    /// Every registered source, armed or not.
    inits: SmallVec<[SourceInit; 2]>,
    /// Handles of the currently armed sources. Empty whenever the store has
    /// no subscribers.
    active: Vec<Subscription>,
}

struct Inner<T> {
    id: u64,
    value: RwLock<T>,
    subscribers: Mutex<IndexMap<SubscriberId, Callback<T>>>,
    sources: Mutex<Sources>,
    policy: Policy<T>,
}

/// An observable value holder.
///
/// Cloning a `Store` produces another handle to the same state.
///
/// # Example
///
/// ```rust
/// use deepstore_core::store::Store;
///
/// let count = Store::new(0);
/// let _sub = count.subscribe(|v| println!("count = {v}"));
///
/// count.set(5);            // prints "count = 5"
/// count.update(|v| v + 1); // prints "count = 6"
/// count.set(6);            // equal, nothing printed
/// ```
pub struct Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<T>>,
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a store that skips structurally equal writes.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_policy(value, Policy::structural())
    }

    /// Create a store that notifies on every write.
    pub fn active(value: T) -> Self {
        Self::with_policy(value, Policy::active())
    }

    /// Create a store that deep-copies values at every boundary, so callers
    /// may mutate what `update` hands them.
    pub fn safe(value: T) -> Self
    where
        T: PartialEq + Serialize + DeserializeOwned,
    {
        Self::with_policy(value, Policy::safe())
    }

    /// Create a store with explicit policies.
    pub fn with_policy(value: T, policy: Policy<T>) -> Self {
        let value = policy.cloning.copy(&value);
        Self {
            inner: Arc::new(Inner {
                id: next_store_id(),
                value: RwLock::new(value),
                subscribers: Mutex::new(IndexMap::new()),
                sources: Mutex::new(Sources::default()),
                policy,
            }),
        }
    }

    /// Get the store's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The policies this store was built with.
    pub fn policy(&self) -> &Policy<T> {
        &self.inner.policy
    }

    /// Get the current value.
    ///
    /// If sources are registered but not armed, they are armed for the
    /// duration of the read so the value reflects upstream state.
    pub fn get(&self) -> T {
        self.read()
    }

    /// Replace the value and notify subscribers if it changed.
    pub fn set(&self, value: T) {
        self.apply(value);
    }

    /// Like [`set`](Self::set), but reports whether the value was accepted.
    pub fn replace(&self, value: T) -> bool {
        self.apply(value)
    }

    /// Replace the value with `updater` applied to a copy of it.
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(T) -> T,
    {
        let next = updater(self.read());
        self.apply(next);
    }

    /// Register a callback; see [`Readable::subscribe_boxed`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.attach(Arc::new(callback))
    }

    /// Declare an upstream source.
    ///
    /// `init` subscribes to the external source and returns the handle that
    /// unsubscribes from it. It runs now if the store already has
    /// subscribers, and otherwise on the next transition from zero to one
    /// subscriber.
    pub fn register_source<F>(&self, init: F)
    where
        F: Fn() -> Subscription + Send + Sync + 'static,
    {
        let init: SourceInit = Arc::new(init);
        self.inner.sources.lock().inits.push(Arc::clone(&init));

        if self.subscriber_count() > 0 {
            let handle = init();
            self.inner.sources.lock().active.push(handle);
            debug!(store = self.inner.id, "armed late source");
        }
    }

    /// Disarm and forget every registered source.
    pub fn unregister_sources(&self) {
        self.disarm_sources();
        self.inner.sources.lock().inits.clear();
    }

    /// Drop every subscriber at once and disarm sources.
    ///
    /// A last resort for subscribers that never release their handles.
    /// Outstanding [`Subscription`]s become no-ops.
    pub fn clear_subscribers(&self) {
        let dropped = mem::take(&mut *self.inner.subscribers.lock());
        debug!(store = self.inner.id, count = dropped.len(), "cleared subscribers");
        drop(dropped);
        self.disarm_sources();
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.inner.sources.lock().inits.len()
    }

    /// Number of sources currently armed.
    pub fn active_source_count(&self) -> usize {
        self.inner.sources.lock().active.len()
    }

    /// A weak handle that does not keep the store alive.
    pub(crate) fn downgrade(&self) -> WeakStore<T> {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn snapshot(&self) -> T {
        let guard = self.inner.value.read();
        self.inner.policy.cloning.copy(&guard)
    }

    /// Pull upstream state into an idle store by arming its sources for a
    /// moment. A store with subscribers is already current.
    pub(crate) fn refresh(&self) {
        let idle = self.subscriber_count() == 0 && self.source_count() > 0;
        if idle {
            self.arm_sources();
            self.disarm_sources();
        }
    }

    fn read(&self) -> T {
        self.refresh();
        self.snapshot()
    }

    fn apply(&self, value: T) -> bool {
        let delivered = {
            let mut current = self.inner.value.write();
            if self.inner.policy.equality.equal(&value, &current) {
                trace!(store = self.inner.id, "write skipped, value unchanged");
                return false;
            }
            *current = self.inner.policy.cloning.copy(&value);
            self.inner.policy.cloning.copy(&current)
        };
        self.notify(delivered);
        true
    }

    fn notify(&self, value: T) {
        let callbacks: SmallVec<[(SubscriberId, Callback<T>); 4]> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();
        if callbacks.is_empty() {
            return;
        }
        trace!(store = self.inner.id, subscribers = callbacks.len(), "notifying");

        let value = Arc::new(value);
        deliver(callbacks.into_iter().map(|(id, callback)| {
            let value = Arc::clone(&value);
            let weak = self.downgrade();
            Box::new(move || {
                // Skip subscribers that left while this delivery was queued.
                if weak.upgrade().is_some_and(|store| store.is_subscribed(id)) {
                    callback(&*value);
                }
            }) as Delivery
        }));
    }

    fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.lock().contains_key(&id)
    }

    fn attach(&self, callback: Callback<T>) -> Subscription {
        if self.subscriber_count() == 0 {
            self.arm_sources();
        }

        let id = SubscriberId::new();
        self.inner
            .subscribers
            .lock()
            .insert(id, Arc::clone(&callback));
        trace!(store = self.inner.id, subscriber = id.raw(), "subscribed");

        callback(&self.snapshot());

        let weak = self.downgrade();
        Subscription::new(move || {
            if let Some(store) = weak.upgrade() {
                store.detach(id);
            }
        })
    }

    fn detach(&self, id: SubscriberId) {
        let now_empty = {
            let mut subscribers = self.inner.subscribers.lock();
            subscribers.shift_remove(&id).is_some() && subscribers.is_empty()
        };
        trace!(store = self.inner.id, subscriber = id.raw(), "unsubscribed");
        if now_empty {
            self.disarm_sources();
        }
    }

    fn arm_sources(&self) {
        let inits: SmallVec<[SourceInit; 2]> =
            self.inner.sources.lock().inits.iter().cloned().collect();
        if inits.is_empty() {
            return;
        }

        debug!(store = self.inner.id, sources = inits.len(), "arming sources");
        let handles: Vec<Subscription> = inits.iter().map(|init| init()).collect();
        self.inner.sources.lock().active.extend(handles);
    }

    fn disarm_sources(&self) {
        let handles = mem::take(&mut self.inner.sources.lock().active);
        if handles.is_empty() {
            return;
        }

        debug!(store = self.inner.id, sources = handles.len(), "disarming sources");
        drop(handles);
    }
}

/// Non-owning handle to a [`Store`], used by source callbacks so a parent
/// never keeps its children alive.
pub(crate) struct WeakStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Weak<Inner<T>>,
}

impl<T> WeakStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn upgrade(&self) -> Option<Store<T>> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl<T> Clone for WeakStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> Clone for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Store<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .field("active_sources", &self.active_source_count())
            .finish()
    }
}

impl<T> Readable<T> for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        self.attach(callback)
    }

    fn get(&self) -> T {
        self.read()
    }

    fn id(&self) -> u64 {
        self.inner.id
    }

    fn as_settable(&self) -> Option<&dyn Settable<T>> {
        Some(self)
    }

    fn cloning_kind(&self) -> CloningKind {
        self.policy().cloning.kind()
    }
}

impl<T> Writable<T> for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn update_boxed(&self, updater: Box<dyn FnOnce(T) -> T + '_>) {
        let next = updater(self.read());
        self.apply(next);
    }
}

impl<T> Settable<T> for Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn set(&self, value: T) {
        self.apply(value);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
