//! Pending-operation counter with a re-armable drain signal.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct DrainSignal {
    done: AtomicBool,
    notify: Notify,
}

impl DrainSignal {
    fn resolved() -> Arc<Self> {
        let signal = Self::default();
        signal.done.store(true, Ordering::Release);
        Arc::new(signal)
    }

    fn resolve(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Resolves once the workload that was in flight when it was obtained drains.
#[derive(Debug, Clone)]
pub struct Barrier {
    signal: Arc<DrainSignal>,
}

impl Barrier {
    pub fn is_resolved(&self) -> bool {
        self.signal.done.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.signal.notify.notified();
            if self.is_resolved() {
                return;
            }
            notified.await;
        }
    }

    /// True when both barriers observe the same drain cycle.
    pub fn same_cycle(&self, other: &Barrier) -> bool {
        Arc::ptr_eq(&self.signal, &other.signal)
    }
}

struct TrackerState {
    count: usize,
    drain: Arc<DrainSignal>,
}

pub struct CompletionTracker {
    state: Mutex<TrackerState>,
    pending: AtomicUsize,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                count: 0,
                drain: DrainSignal::resolved(),
            }),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn on_start(&self) {
        let mut state = self.state.lock();
        if state.count == 0 {
            state.drain = Arc::new(DrainSignal::default());
        }
        state.count += 1;
        self.pending.store(state.count, Ordering::Release);
    }

    pub fn on_complete(&self) {
        let mut state = self.state.lock();
        if state.count == 0 {
            tracing::error!("completion reported with no pending operations");
            return;
        }
        state.count -= 1;
        self.pending.store(state.count, Ordering::Release);
        if state.count == 0 {
            state.drain.resolve();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// The drain future for the current cycle; already resolved when idle.
    pub fn barrier(&self) -> Barrier {
        Barrier {
            signal: self.state.lock().drain.clone(),
        }
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}
