//! Adapter Store Implementation
//!
//! An AdapterStore mirrors a foreign observable that implements only the
//! [`Readable`] contract (and possibly [`Settable`]).
//!
//! Values arriving from the foreign source are stored and announced, but
//! never written back to it. Local writes are stored, announced, and then
//! pushed to the foreign source if it can be set. If the foreign source
//! echoes that push synchronously, the echo arrives tagged as foreign and
//! therefore cannot trigger a second push.

use std::fmt::{self, Debug};
use std::sync::Arc;

use tracing::trace;

use super::base::Store;
use super::contract::{Readable, Settable, Writable};
use super::policy::CloningKind;
use super::subscriber::{Callback, Subscription};

/// Where a write came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// `set`/`update` called on the adapter.
    Local,
    /// Mirrored from the foreign source's notification.
    Foreign,
}

/// A store that stays in sync with a foreign observable.
///
/// Changes in either direction pass a structural equality check first.
pub struct AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    store: Store<T>,
    foreign: Arc<dyn Readable<T>>,
}

impl<T> AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    pub fn new<R>(foreign: R) -> Self
    where
        R: Readable<T> + 'static,
    {
        let foreign: Arc<dyn Readable<T>> = Arc::new(foreign);
        let store = Store::new(foreign.get());

        let source = Arc::clone(&foreign);
        let weak = store.downgrade();
        store.register_source(move || {
            let weak = weak.clone();
            source.subscribe_boxed(Arc::new(move |value: &T| {
                if let Some(store) = weak.upgrade() {
                    write(&store, None, value.clone(), Origin::Foreign);
                }
            }))
        });

        Self { store, foreign }
    }

    pub fn id(&self) -> u64 {
        self.store.id()
    }

    /// Get the current value, refreshing from the foreign source if idle.
    pub fn get(&self) -> T {
        self.store.get()
    }

    /// Store `value` and push it to the foreign source.
    pub fn set(&self, value: T) {
        write(&self.store, Some(&*self.foreign), value, Origin::Local);
    }

    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(T) -> T,
    {
        self.set(updater(self.store.get()));
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

    /// Whether writes reach the foreign source.
    pub fn is_two_way(&self) -> bool {
        self.foreign.as_settable().is_some()
    }
}

fn write<T>(store: &Store<T>, foreign: Option<&dyn Readable<T>>, value: T, origin: Origin)
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    match origin {
        Origin::Foreign => {
            store.set(value);
        }
        Origin::Local => {
            // An idle adapter holds whatever the foreign source said last
            // time it was armed; compare against its current value instead.
            store.refresh();
            if !store.replace(value.clone()) {
                return;
            }
            if let Some(target) = foreign.and_then(|foreign| foreign.as_settable()) {
                trace!(store = store.id(), foreign = target.id(), "pushing to foreign source");
                target.set(value);
            }
        }
    }
}

impl<T> Clone for AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            foreign: Arc::clone(&self.foreign),
        }
    }
}

impl<T> Debug for AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterStore")
            .field("store", &self.store)
            .field("foreign", &self.foreign.id())
            .field("two_way", &self.is_two_way())
            .finish()
    }
}

impl<T> Readable<T> for AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        self.store.subscribe_boxed(callback)
    }

    fn get(&self) -> T {
        self.store.get()
    }

    fn id(&self) -> u64 {
        self.store.id()
    }

    fn as_settable(&self) -> Option<&dyn Settable<T>> {
        Some(self)
    }

    fn cloning_kind(&self) -> CloningKind {
        self.store.cloning_kind()
    }
}

impl<T> Writable<T> for AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn update_boxed(&self, updater: Box<dyn FnOnce(T) -> T + '_>) {
        AdapterStore::set(self, updater(self.store.get()));
    }
}

impl<T> Settable<T> for AdapterStore<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn set(&self, value: T) {
        AdapterStore::set(self, value);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    /// A foreign two-way subject that counts writes made to it.
    #[derive(Clone)]
    struct Subject {
        inner: Store<i32>,
        writes: Arc<AtomicI32>,
    }

    impl Subject {
        fn new(value: i32) -> Self {
            Self {
                inner: Store::new(value),
                writes: Arc::new(AtomicI32::new(0)),
            }
        }

        fn writes(&self) -> i32 {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl Readable<i32> for Subject {
        fn subscribe_boxed(&self, callback: Callback<i32>) -> Subscription {
            self.inner.subscribe_boxed(callback)
        }

        fn get(&self) -> i32 {
            self.inner.get()
        }

        fn as_settable(&self) -> Option<&dyn Settable<i32>> {
            Some(self)
        }
    }

    impl Writable<i32> for Subject {
        fn update_boxed(&self, updater: Box<dyn FnOnce(i32) -> i32 + '_>) {
            Settable::set(self, updater(self.inner.get()));
        }
    }

    impl Settable<i32> for Subject {
        fn set(&self, value: i32) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set(value);
        }
    }

    /// A foreign subject that can only be observed.
    struct ReadOnlySubject(Store<i32>);

    impl Readable<i32> for ReadOnlySubject {
        fn subscribe_boxed(&self, callback: Callback<i32>) -> Subscription {
            self.0.subscribe_boxed(callback)
        }

        fn get(&self) -> i32 {
            self.0.get()
        }
    }

    #[test]
    fn stays_in_sync_with_foreign_subject() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());

        Settable::set(&subject, 5);
        assert_eq!(subject.get(), 5);
        assert_eq!(adapter.get(), 5);

        adapter.set(20);
        assert_eq!(subject.get(), 20);
        assert_eq!(adapter.get(), 20);
    }

    #[test]
    fn local_set_writes_foreign_once() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());
        let _sub = adapter.subscribe(|_| {});

        adapter.set(1);
        assert_eq!(subject.writes(), 1);

        adapter.set(1);
        assert_eq!(subject.writes(), 1);

        adapter.update(|v| v + 1);
        assert_eq!(subject.writes(), 2);
    }

    #[test]
    fn foreign_changes_are_not_echoed() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = adapter.subscribe(move |v| seen_clone.lock().push(*v));

        subject.inner.set(7);
        assert_eq!(*seen.lock(), vec![0, 7]);
        assert_eq!(subject.writes(), 0);
    }

    #[test]
    fn read_only_foreign_is_never_written() {
        let foreign = Store::new(3);
        let adapter = AdapterStore::new(ReadOnlySubject(foreign.clone()));
        assert!(!adapter.is_two_way());

        adapter.set(4);
        assert_eq!(adapter.get(), 3);
        assert_eq!(foreign.get(), 3);
    }

    #[test]
    fn idle_adapter_pushes_write_matching_stale_value() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());

        subject.inner.set(5);
        adapter.set(0);
        assert_eq!(subject.get(), 0);
        assert_eq!(adapter.get(), 0);
        assert_eq!(subject.writes(), 1);
    }

    #[test]
    fn idle_adapter_skips_write_matching_foreign_value() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());

        subject.inner.set(5);
        adapter.set(5);
        assert_eq!(subject.writes(), 0);
        assert_eq!(adapter.get(), 5);
    }

    #[test]
    fn foreign_subscription_is_lazy() {
        let subject = Subject::new(0);
        let adapter = AdapterStore::new(subject.clone());
        assert_eq!(subject.inner.subscriber_count(), 0);

        let sub = adapter.subscribe(|_| {});
        assert_eq!(subject.inner.subscriber_count(), 1);

        drop(sub);
        assert_eq!(subject.inner.subscriber_count(), 0);
    }
}
