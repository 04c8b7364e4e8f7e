//! Derived Store Implementation
//!
//! A DerivedStore is a read-only store whose value is computed from one or
//! more parent stores.
//!
//! # How Derived Stores Work
//!
//! 1. On construction the value is computed once from the parents' current
//!    values, and one lazy source is registered per parent.
//!
//! 2. When the derived store gains its first subscriber, every parent is
//!    subscribed. Parents answer immediately with their current value; the
//!    computation runs once all of them have reported, never with a partial
//!    input list.
//!
//! 3. After that, any parent notification records that parent's value and
//!    recomputes from the latest value of every parent. The result goes
//!    through the normal equality gate, so subscribers only hear about real
//!    changes.
//!
//! 4. With a debounce delay, recomputation waits until parent notifications
//!    have been quiet for the delay, then reads the settled inputs.
//!
//! 5. When the last subscriber leaves, parent subscriptions are dropped,
//!    the recorded inputs are forgotten and any pending debounce is aborted.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::trace;

use super::base::{Store, WeakStore};
use super::contract::Readable;
use super::debounce::Debouncer;
use super::policy::{CloningKind, Policy};
use super::subscriber::{Callback, Subscription};
use crate::error::Result;
use crate::path::Path;

type Compute<P, T> = Box<dyn Fn(&[P]) -> T + Send + Sync>;

/// Latest values reported by the parents of one derived store.
struct Inputs<P, T>
where
    T: Clone + Send + Sync + 'static,
{
    values: Mutex<SmallVec<[Option<P>; 4]>>,
    compute: Compute<P, T>,
    debouncer: Arc<Debouncer>,
    target: WeakStore<T>,
}

impl<P, T> Inputs<P, T>
where
    P: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn receive(self: &Arc<Self>, index: usize, value: P) {
        let (was_complete, is_complete) = {
            let mut values = self.values.lock();
            let was_complete = values.iter().all(Option::is_some);
            values[index] = Some(value);
            (was_complete, values.iter().all(Option::is_some))
        };

        if !is_complete {
            return;
        }
        if !was_complete {
            // First full set of inputs since arming: never debounced.
            self.recompute();
            return;
        }

        let inputs = Arc::clone(self);
        self.debouncer.schedule(move || inputs.recompute());
    }

    fn recompute(&self) {
        let Some(store) = self.target.upgrade() else {
            return;
        };
        let values: Option<SmallVec<[P; 4]>> = self.values.lock().iter().cloned().collect();
        if let Some(values) = values {
            trace!(store = store.id(), parents = values.len(), "recomputing");
            store.set((self.compute)(&values));
        }
    }

    fn forget(&self, index: usize) {
        self.values.lock()[index] = None;
        self.debouncer.cancel();
    }
}

/// A read-only store computed from parent stores.
///
/// # Example
///
/// ```rust
/// use deepstore_core::store::{DerivedStore, Store};
///
/// let a = Store::new(1);
/// let b = Store::new(1);
/// let sum = DerivedStore::from_many([a.clone(), b.clone()], |v: &[i32]| v[0] + v[1]);
/// assert_eq!(sum.get(), 2);
///
/// a.set(4);
/// assert_eq!(sum.get(), 5);
/// ```
pub struct DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    store: Store<T>,
    debouncer: Arc<Debouncer>,
}

impl<T> DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Derive from a single parent.
    pub fn new<P, R, F>(parent: R, compute: F) -> Self
    where
        P: Clone + Send + Sync + 'static,
        R: Readable<P> + 'static,
        F: Fn(&P) -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::with_policy([parent], move |values: &[P]| compute(&values[0]), Policy::structural())
    }

    /// Derive from an ordered list of parents. `compute` receives their
    /// values in the same order.
    pub fn from_many<P, R, I, F>(parents: I, compute: F) -> Self
    where
        P: Clone + Send + Sync + 'static,
        R: Readable<P> + 'static,
        I: IntoIterator<Item = R>,
        F: Fn(&[P]) -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::with_policy(parents, compute, Policy::structural())
    }

    /// Derive with explicit policies.
    pub fn with_policy<P, R, I, F>(parents: I, compute: F, policy: Policy<T>) -> Self
    where
        P: Clone + Send + Sync + 'static,
        R: Readable<P> + 'static,
        I: IntoIterator<Item = R>,
        F: Fn(&[P]) -> T + Send + Sync + 'static,
    {
        let parents: Vec<R> = parents.into_iter().collect();
        let current: SmallVec<[P; 4]> = parents.iter().map(|parent| parent.get()).collect();
        let store = Store::with_policy(compute(&current), policy);
        let debouncer = Arc::new(Debouncer::new());

        let inputs = Arc::new(Inputs {
            values: Mutex::new(parents.iter().map(|_| None).collect()),
            compute: Box::new(compute),
            debouncer: Arc::clone(&debouncer),
            target: store.downgrade(),
        });

        for (index, parent) in parents.into_iter().enumerate() {
            let inputs = Arc::clone(&inputs);
            store.register_source(move || {
                let receiver = Arc::clone(&inputs);
                let upstream = parent.subscribe_boxed(Arc::new(move |value: &P| {
                    receiver.receive(index, value.clone());
                }));

                let inputs = Arc::clone(&inputs);
                Subscription::new(move || {
                    drop(upstream);
                    inputs.forget(index);
                })
            });
        }

        Self { store, debouncer }
    }

    /// Collapse bursts of parent notifications into one recomputation after
    /// `delay` of quiet. Requires a tokio runtime; without one, changes are
    /// applied immediately.
    pub fn debounced(self, delay: Duration) -> Self {
        self.debouncer.set_delay(Some(delay));
        self
    }

    pub fn id(&self) -> u64 {
        self.store.id()
    }

    /// Get the current value, refreshing from the parents if idle.
    pub fn get(&self) -> T {
        self.store.get()
    }

    /// Register a callback; see [`Readable::subscribe_boxed`].
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn subscriber_count(&self) -> usize {
        self.store.subscriber_count()
    }

    /// Number of parent subscriptions currently held.
    pub fn active_source_count(&self) -> usize {
        self.store.active_source_count()
    }

    /// Whether a debounced recomputation is waiting to fire.
    pub fn is_settling(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Drop every subscriber and release the parents.
    pub fn clear_subscribers(&self) {
        self.store.clear_subscribers();
    }
}

impl DerivedStore<Value> {
    /// Derive the value found at a dot path inside a JSON parent.
    pub fn at_path<R>(parent: R, path: &str) -> Result<Self>
    where
        R: Readable<Value> + 'static,
    {
        let path = Path::parse(path)?;
        Ok(Self::new(parent, move |value: &Value| path.get(value)))
    }
}

impl<T> Clone for DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            debouncer: Arc::clone(&self.debouncer),
        }
    }
}

impl<T> Debug for DerivedStore<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedStore")
            .field("store", &self.store)
            .field("debounce", &self.debouncer.delay())
            .finish()
    }
}

impl<T> Readable<T> for DerivedStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        self.store.subscribe_boxed(callback)
    }

    fn get(&self) -> T {
        self.store.get()
    }

    fn cloning_kind(&self) -> CloningKind {
        self.store.cloning_kind()
    }

    fn id(&self) -> u64 {
        self.store.id()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::contract::try_set;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn derived_follows_single_parent() {
        let parent = Store::new(3);
        let doubled = DerivedStore::new(parent.clone(), |v: &i32| v * 2);
        assert_eq!(doubled.get(), 6);

        parent.set(5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn derived_from_two_parents() {
        let a = Store::new(1);
        let b = Store::new(1);
        let sum = DerivedStore::from_many([a.clone(), b.clone()], |v: &[i32]| v[0] + v[1]);

        let _sub = sum.subscribe(|_| {});
        assert_eq!(sum.get(), 2);
        a.set(4);
        assert_eq!(sum.get(), 5);
        b.set(4);
        assert_eq!(sum.get(), 8);
    }

    #[test]
    fn arming_computes_once_with_full_inputs() {
        let a = Store::new(1);
        let b = Store::new(2);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let sum = DerivedStore::from_many([a, b], move |v: &[i32]| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            v.iter().sum::<i32>()
        });
        // Construction computes once.
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _sub = sum.subscribe(|_| {});
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parents_are_subscribed_only_while_derived_is() {
        let parent = Store::new(1);
        let derived = DerivedStore::new(parent.clone(), |v: &i32| v + 1);
        assert_eq!(parent.subscriber_count(), 0);

        let sub = derived.subscribe(|_| {});
        assert_eq!(parent.subscriber_count(), 1);
        assert_eq!(derived.active_source_count(), 1);

        drop(sub);
        assert_eq!(parent.subscriber_count(), 0);
        assert_eq!(derived.active_source_count(), 0);
    }

    #[test]
    fn unchanged_result_does_not_notify() {
        let parent = Store::new(1);
        let parity = DerivedStore::new(parent.clone(), |v: &i32| v % 2);
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let _sub = parity.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        parent.set(3);
        parent.set(5);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        parent.set(6);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn writes_through_the_contract_are_rejected() {
        let parent = Store::new(1);
        let derived = DerivedStore::new(parent, |v: &i32| *v);

        let err = try_set(&derived, 5).unwrap_err();
        assert_eq!(err, StoreError::ReadOnly { store: derived.id() });
        assert_eq!(derived.get(), 1);
    }

    #[test]
    fn derives_from_path() {
        let parent = Store::new(json!({ "deep": { "value": "here" } }));
        let leaf = DerivedStore::at_path(parent.clone(), "deep.value").unwrap();
        assert_eq!(leaf.get(), json!("here"));

        parent.update(|mut v| {
            v["deep"]["value"] = json!("there");
            v
        });
        assert_eq!(leaf.get(), json!("there"));

        assert!(DerivedStore::at_path(parent, "deep..value").is_err());
    }

    #[test]
    fn derived_can_chain() {
        let base = Store::new(2);
        let squared = DerivedStore::new(base.clone(), |v: &i32| v * v);
        let label = DerivedStore::new(squared.clone(), |v: &i32| format!("{v}"));

        let _sub = label.subscribe(|_| {});
        base.set(3);
        assert_eq!(label.get(), "9");
        assert_eq!(squared.subscriber_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_settles_on_final_inputs() {
        let parent = Store::new(0);
        let derived =
            DerivedStore::new(parent.clone(), |v: &i32| *v).debounced(Duration::from_millis(50));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _sub = derived.subscribe(move |v| seen_clone.lock().push(*v));
        for value in 1..=5 {
            parent.set(value);
        }
        assert!(derived.is_settling());
        assert_eq!(*seen.lock(), vec![0]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![0, 5]);
        assert!(!derived.is_settling());
    }

    #[tokio::test(start_paused = true)]
    async fn unsubscribing_cancels_pending_debounce() {
        let parent = Store::new(0);
        let derived =
            DerivedStore::new(parent.clone(), |v: &i32| *v).debounced(Duration::from_millis(50));
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();

        let sub = derived.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        parent.set(1);
        drop(sub);
        assert!(!derived.is_settling());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
