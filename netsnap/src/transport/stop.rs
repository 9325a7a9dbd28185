//! Cooperative stop signal shared between a run and whoever controls it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot stop request.
///
/// The orchestrator polls [`is_stopped`](Self::is_stopped) between commands.
/// Transport I/O tasks await [`stopped`](Self::stopped) and tear their
/// connection down when it fires, which unblocks any in-flight read.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Safe to call from any thread, any number of times.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_stopped_resolves_after_stop() {
        let signal = StopSignal::new();
        let waiter = signal.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        signal.stop();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn test_stopped_returns_immediately_when_already_stopped() {
        let signal = StopSignal::new();
        signal.stop();
        signal.stop();
        tokio::time::timeout(Duration::from_millis(100), signal.stopped())
            .await
            .unwrap();
    }
}
