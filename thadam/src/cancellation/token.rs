//! Shutdown token shared between the consumer loop and its owner.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

/// A callback invoked once when shutdown is requested.
pub type ShutdownCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Inner {
    requested: AtomicBool,
    reason: RwLock<Option<String>>,
    callbacks: RwLock<Vec<ShutdownCallback>>,
    notify: Notify,
}

/// A cloneable token for cooperative shutdown.
///
/// The consumer loop stops taking new jobs once shutdown is requested; jobs
/// already dequeued run to completion. Only the first reason is kept.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

impl ShutdownToken {
    /// Creates a new token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Idempotent; callbacks run on the first call.
    pub fn shutdown(&self, reason: impl Into<String>) {
        if self
            .inner
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let reason = reason.into();
        info!(reason = %reason, "Shutdown requested");
        *self.inner.reason.write() = Some(reason);

        for callback in self.inner.callbacks.read().iter() {
            run_callback(callback.as_ref());
        }
        self.inner.notify.notify_waiters();
    }

    /// Registers a callback; runs it immediately if shutdown was already requested.
    pub fn on_shutdown<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_shutdown() {
            run_callback(&callback);
        } else {
            self.inner.callbacks.write().push(Box::new(callback));
        }
    }

    /// Returns whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Returns the shutdown reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Completes once shutdown is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

fn run_callback(callback: &(dyn Fn() + Send + Sync)) {
    if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)) {
        warn!("Shutdown callback panicked: {:?}", e);
    }
}

impl std::fmt::Debug for ShutdownToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownToken")
            .field("requested", &self.is_shutdown())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = ShutdownToken::new();
        assert!(!token.is_shutdown());

        token.shutdown("SIGTERM");
        token.shutdown("second");

        assert!(token.is_shutdown());
        assert_eq!(token.reason(), Some("SIGTERM".to_string()));
    }

    #[test]
    fn test_callbacks_run_once() {
        let token = ShutdownToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let before = counter.clone();
        token.on_shutdown(move || {
            before.fetch_add(1, Ordering::SeqCst);
        });

        token.shutdown("stop");
        token.shutdown("stop again");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let after = counter.clone();
        token.on_shutdown(move || {
            after.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_callback_panic_suppressed() {
        let token = ShutdownToken::new();
        token.on_shutdown(|| panic!("Intentional panic"));
        token.shutdown("test");
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_clones() {
        let token = ShutdownToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.shutdown("done");

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_after_shutdown_returns_immediately() {
        let token = ShutdownToken::new();
        token.shutdown("early");
        tokio_test::assert_ready!(tokio_test::task::spawn(token.cancelled()).poll());
    }
}
