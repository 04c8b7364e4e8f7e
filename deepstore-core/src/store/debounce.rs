//! Quiet-period timer used by derived stores.
//!
//! Each call to [`Debouncer::schedule`] cancels the pending job and starts a
//! new one, so a burst of triggers produces a single run once the burst has
//! been quiet for the configured delay. The job reads its inputs when it
//! fires, never when it was scheduled.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

#[derive(Debug, Default)]
pub struct Debouncer {
    delay: Mutex<Option<Duration>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the quiet period. `None` disables debouncing.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn delay(&self) -> Option<Duration> {
        *self.delay.lock()
    }

    /// Run `job` after the quiet period, replacing any pending job.
    ///
    /// Without a delay, or outside a tokio runtime, `job` runs immediately.
    pub fn schedule<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(delay) = self.delay() else {
            job();
            return;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(?delay, "no tokio runtime for debounce; running immediately");
                self.cancel();
                job();
                return;
            }
        };

        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            job();
        });
        if let Some(previous) = self.pending.lock().replace(task) {
            trace!("debounce restarted");
            previous.abort();
        }
    }

    /// Abort the pending job, if any.
    pub fn cancel(&self) {
        if let Some(task) = self.pending.lock().take() {
            task.abort();
        }
    }

    /// Whether a job is waiting for its quiet period to end.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
