//! The structural contract every container speaks.
//!
//! Collaborators depend only on these traits, never on a concrete store:
//!
//! - [`Readable`]: `subscribe` (and `get`). Required of every container.
//! - [`Writable`]: `update`. Required of every writable container.
//! - [`Settable`]: `set`. Required of every directly settable container.
//!
//! The `*_boxed` methods keep the traits object safe so containers can be
//! passed around as `Arc<dyn Readable<T>>`. The generic conveniences are only
//! available on sized receivers.

use std::sync::Arc;

use super::policy::CloningKind;
use super::subscriber::{Callback, Subscription};
use crate::error::{Result, StoreError};

/// A container that can be observed.
pub trait Readable<T>: Send + Sync {
    /// Register a callback. It is invoked once, synchronously, with the
    /// current value before this method returns, and again after every
    /// accepted change until the returned [`Subscription`] is released.
    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription;

    /// Read the current value.
    ///
    /// Containers backed by lazy sources refresh themselves for the read,
    /// so the result is current even with no subscribers attached.
    fn get(&self) -> T;

    /// Identifier used in diagnostics. Zero means "not tracked".
    fn id(&self) -> u64 {
        0
    }

    /// Direct write access, if this container supports being set.
    fn as_settable(&self) -> Option<&dyn Settable<T>> {
        None
    }

    /// How this container copies values. Views such as sub stores take
    /// the same kind of copy as their parent.
    fn cloning_kind(&self) -> CloningKind {
        CloningKind::Identity
    }

    /// Register a closure as a callback.
    fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_boxed(Arc::new(callback))
    }
}

/// A container whose value can be replaced through an updater.
pub trait Writable<T>: Readable<T> {
    /// Apply `updater` to a copy of the current value and store the result.
    fn update_boxed(&self, updater: Box<dyn FnOnce(T) -> T + '_>);

    fn update<F>(&self, updater: F)
    where
        F: FnOnce(T) -> T,
        Self: Sized,
    {
        self.update_boxed(Box::new(updater))
    }
}

/// A container whose value can be replaced directly.
pub trait Settable<T>: Writable<T> {
    fn set(&self, value: T);
}

/// Write through the dynamic contract.
///
/// Fails with [`StoreError::ReadOnly`] when `store` cannot be set, which is
/// how a write to a derived store surfaces when the concrete type is erased.
pub fn try_set<T>(store: &dyn Readable<T>, value: T) -> Result<()> {
    match store.as_settable() {
        Some(settable) => {
            settable.set(value);
            Ok(())
        }
        None => Err(StoreError::ReadOnly { store: store.id() }),
    }
}

impl<T, R> Readable<T> for Arc<R>
where
    R: Readable<T> + ?Sized,
{
    fn subscribe_boxed(&self, callback: Callback<T>) -> Subscription {
        (**self).subscribe_boxed(callback)
    }

    fn get(&self) -> T {
        (**self).get()
    }

    fn id(&self) -> u64 {
        (**self).id()
    }

    fn as_settable(&self) -> Option<&dyn Settable<T>> {
        (**self).as_settable()
    }

    fn cloning_kind(&self) -> CloningKind {
        (**self).cloning_kind()
    }
}

impl<T, R> Writable<T> for Arc<R>
where
    R: Writable<T> + ?Sized,
{
    fn update_boxed(&self, updater: Box<dyn FnOnce(T) -> T + '_>) {
        (**self).update_boxed(updater)
    }
}

impl<T, R> Settable<T> for Arc<R>
where
    R: Settable<T> + ?Sized,
{
    fn set(&self, value: T) {
        (**self).set(value)
    }
}
