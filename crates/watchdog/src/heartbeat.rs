//! Heartbeat stamp and cooperative stop flag shared between the poll cycle
//! and its watchdog.
//!
//! Both are single-writer, lock-free handles. Clones share state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

#[derive(Debug)]
struct HeartbeatInner {
    origin: Instant,
    last_ns: AtomicU64,
    beats: AtomicU64,
}

/// Monotonically increasing "last successful tick" stamp.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    inner: Arc<HeartbeatInner>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

impl Heartbeat {
    /// A heartbeat whose first stamp is the moment of creation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                origin: Instant::now(),
                last_ns: AtomicU64::new(0),
                beats: AtomicU64::new(0),
            }),
        }
    }

    fn elapsed_ns(&self) -> u64 {
        u64::try_from(self.inner.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Record a completed tick. The stamp never moves backwards.
    pub fn beat(&self) {
        let now = self.elapsed_ns();
        self.inner.last_ns.fetch_max(now, Ordering::Release);
        self.inner.beats.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn beats(&self) -> u64 {
        self.inner.beats.load(Ordering::Relaxed)
    }

    /// Offset of the latest stamp from the heartbeat's creation.
    #[must_use]
    pub fn last_beat(&self) -> Duration {
        Duration::from_nanos(self.inner.last_ns.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn since_last_beat(&self) -> Duration {
        let last = self.inner.last_ns.load(Ordering::Acquire);
        Duration::from_nanos(self.elapsed_ns().saturating_sub(last))
    }

    #[must_use]
    pub fn is_stalled(&self, timeout: Duration) -> bool {
        self.since_last_beat() > timeout
    }
}

#[derive(Debug, Default)]
struct StopInner {
    requested: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag checked at the top of every loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    inner: Arc<StopInner>,
}

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every task waiting in [`stopped`](Self::stopped).
    pub fn request_stop(&self) {
        self.inner.requested.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` when woken by a stop request.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => self.is_stop_requested(),
            () = self.stopped() => true,
        }
    }
}
