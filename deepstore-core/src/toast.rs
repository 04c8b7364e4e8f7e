//! Toast queue.
//!
//! A small store of transient messages for a UI to render. Each toast
//! expires after its time-to-live; expiry is swept by a timer on the tokio
//! runtime, or by the next explicit [`ToastStore::clean`] when no runtime is
//! available.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;

use crate::store::{Callback, Readable, Store, Subscription};

/// Default time a toast stays on screen.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15);

/// Severity of a toast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToastKind {
    #[default]
    Error,
    Warning,
    Info,
    Success,
}

/// A toast as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    /// `Duration::MAX` keeps the toast until it is closed.
    pub ttl: Duration,
    pub stamp: Instant,
}

impl Toast {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stamp) < self.ttl
    }
}

/// A store of toasts, oldest first.
#[derive(Debug, Clone)]
pub struct ToastStore {
    store: Store<Vec<Toast>>,
}

impl ToastStore {
    pub fn new() -> Self {
        Self {
            store: Store::new(Vec::new()),
        }
    }

    /// Queue a message. A toast with the same message is replaced.
    ///
    /// Returns the id of the new toast.
    pub fn add(
        &self,
        message: impl Into<String>,
        kind: Option<ToastKind>,
        ttl: Option<Duration>,
    ) -> u64 {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let toast = Toast {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            message: message.into(),
            kind: kind.unwrap_or_default(),
            ttl: ttl.unwrap_or(DEFAULT_TTL),
            stamp: Instant::now(),
        };
        let (id, ttl) = (toast.id, toast.ttl);

        self.store.update(|mut toasts| {
            toasts.retain(|t| t.message != toast.message);
            toasts.push(toast);
            toasts
        });
        self.schedule_clean(ttl);
        id
    }

    /// Dismiss a toast.
    pub fn close(&self, id: u64) {
        self.store.update(|mut toasts| {
            toasts.retain(|t| t.id != id);
            toasts
        });
    }

    /// Drop every expired toast.
    pub fn clean(&self) {
        let now = Instant::now();
        self.store.update(|mut toasts| {
            toasts.retain(|t| t.is_live(now));
            toasts
        });
    }

    pub fn get(&self) -> Vec<Toast> {
        self.store.get()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Vec<Toast>) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    fn schedule_clean(&self, ttl: Duration) {
        if ttl == Duration::MAX {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!("no tokio runtime; toast expiry waits for clean()");
            return;
        };

        let weak = self.store.downgrade();
        handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(store) = weak.upgrade() {
                ToastStore { store }.clean();
            }
        });
    }
}

impl Default for ToastStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Readable<Vec<Toast>> for ToastStore {
    fn subscribe_boxed(&self, callback: Callback<Vec<Toast>>) -> Subscription {
        self.store.subscribe_boxed(callback)
    }

    fn get(&self) -> Vec<Toast> {
        self.store.get()
    }

    fn id(&self) -> u64 {
        self.store.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(store: &ToastStore) -> Vec<String> {
        store.get().into_iter().map(|t| t.message).collect()
    }

    #[test]
    fn add_defaults_to_error_with_fifteen_seconds() {
        let toasts = ToastStore::new();
        toasts.add("disk full", None, None);

        let stored = toasts.get();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, ToastKind::Error);
        assert_eq!(stored[0].ttl, DEFAULT_TTL);
    }

    #[test]
    fn duplicate_message_replaces_existing() {
        let toasts = ToastStore::new();
        let first = toasts.add("saved", Some(ToastKind::Success), None);
        toasts.add("other", Some(ToastKind::Info), None);
        let second = toasts.add("saved", Some(ToastKind::Success), None);

        assert_ne!(first, second);
        assert_eq!(messages(&toasts), vec!["other", "saved"]);
    }

    #[test]
    fn close_removes_by_id() {
        let toasts = ToastStore::new();
        let id = toasts.add("a", None, None);
        toasts.add("b", None, None);

        toasts.close(id);
        assert_eq!(messages(&toasts), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_toasts_are_swept() {
        let toasts = ToastStore::new();
        toasts.add("short", Some(ToastKind::Info), Some(Duration::from_secs(1)));
        toasts.add("long", Some(ToastKind::Info), Some(Duration::from_secs(10)));
        toasts.add("pinned", Some(ToastKind::Warning), Some(Duration::MAX));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(messages(&toasts), vec!["long", "pinned"]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(messages(&toasts), vec!["pinned"]);
    }
}
