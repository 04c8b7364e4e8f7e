//! Subscriber identities and subscription handles.
//!
//! Every callback registered on a store is keyed by a [`SubscriberId`].
//! The registration is owned by a [`Subscription`], which plays the role of
//! the unsubscribe function: dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the callback again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked with the value of a store whenever it changes.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Unique identifier for a subscriber.
///
/// Issued from a process-wide counter, so ids never collide even across
/// stores. Unsubscribing is an O(1) map removal by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered subscriber or an armed upstream source.
///
/// Dropping this handle runs its teardown exactly once. Use
/// [`detach`](Self::detach) to keep the registration alive for the rest of
/// the process.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a handle that runs `teardown` when released.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// Unsubscribe now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the registration alive forever.
    pub fn detach(mut self) {
        self.teardown = None;
    }

    /// Whether the teardown is still pending.
    pub fn is_active(&self) -> bool {
        self.teardown.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
