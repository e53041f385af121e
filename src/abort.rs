use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token shared by every clustering variant of a run.
///
/// Raising the signal never interrupts a computation directly: engines poll
/// it at round or point boundaries on the coordinating thread and unwind
/// through their normal return path. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    raised: Arc<AtomicBool>,
}

impl AbortSignal {
    /// Create a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every computation observing this signal.
    pub fn abort(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Lower the signal so new computations run to completion.
    ///
    /// Only call this when no computation observing the signal is in flight.
    pub fn resume(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}
