//! # Completion Barrier
//!
//! Collapses a known number of independent asynchronous confirmations into a
//! single completion signal. The barrier fires exactly once: when the last
//! confirmation arrives, or on the first failure, whichever comes first.
//! Later confirmations and failures are ignored.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{InteropError, InteropResult};

/// Counter that resolves its [`BarrierWait`] once `arity` confirmations arrive.
#[derive(Debug, Clone)]
pub struct CompletionBarrier {
    inner: Arc<BarrierInner>,
}

#[derive(Debug)]
struct BarrierInner {
    remaining: AtomicUsize,
    fired: AtomicBool,
    signal: Mutex<Option<oneshot::Sender<InteropResult<()>>>>,
}

/// Receiving half of a [`CompletionBarrier`].
#[derive(Debug)]
pub struct BarrierWait {
    rx: oneshot::Receiver<InteropResult<()>>,
}

impl CompletionBarrier {
    /// Create a barrier expecting `arity` confirmations.
    ///
    /// A barrier of arity zero is already complete.
    pub fn new(arity: usize) -> (Self, BarrierWait) {
        let (tx, rx) = oneshot::channel();
        let barrier = Self {
            inner: Arc::new(BarrierInner {
                remaining: AtomicUsize::new(arity),
                fired: AtomicBool::new(false),
                signal: Mutex::new(Some(tx)),
            }),
        };
        if arity == 0 {
            barrier.fire(Ok(()));
        }
        (barrier, BarrierWait { rx })
    }

    /// Number of confirmations still outstanding.
    pub fn remaining(&self) -> usize {
        self.inner.remaining.load(Ordering::Acquire)
    }

    /// Whether the barrier has already delivered its signal.
    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Record one confirmation; the last one fires the barrier.
    pub fn confirm(&self, label: &str) {
        let previous = self
            .inner
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {
                debug!(confirmation = label, "final confirmation received");
                self.fire(Ok(()));
            }
            Ok(n) => debug!(confirmation = label, remaining = n - 1, "confirmation received"),
            Err(_) => debug!(confirmation = label, "confirmation after barrier completed"),
        }
    }

    /// Fire the barrier with an error unless it already fired.
    pub fn fail(&self, error: InteropError) {
        self.fire(Err(error));
    }

    fn fire(&self, result: InteropResult<()>) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        let sender = self.inner.signal.lock().take();
        if let Some(tx) = sender {
            let _ = tx.send(result);
        }
    }
}

impl BarrierWait {
    /// Wait for the barrier to fire.
    ///
    /// If every [`CompletionBarrier`] handle is dropped before firing, the wait
    /// fails with an assertion naming `test_case`.
    pub async fn wait(self, test_case: &str) -> InteropResult<()> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(InteropError::assertion(
                test_case,
                "completion barrier dropped before all confirmations arrived",
            )),
        }
    }
}
