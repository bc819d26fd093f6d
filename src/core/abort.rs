use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

/// The capability a producer uses to tear down its owning execution context
/// when it cannot continue.
///
/// A consumer blocked on the channel has no other way to learn that the
/// producer died mid-stream, so the owner must unwind instead of staying
/// partially alive.
pub trait AbortHook: Send + Sync {
    fn shutdown(&self);
}

/// Cancelling the token wakes every consumer waiting on it.
impl AbortHook for CancellationToken {
    fn shutdown(&self) {
        debug!("Cancelling execution context");
        self.cancel();
    }
}

impl<H: AbortHook + ?Sized> AbortHook for Arc<H> {
    fn shutdown(&self) {
        (**self).shutdown()
    }
}

/// An abort hook that only logs. Useful when the owner watches the producer
/// report instead.
#[derive(Default)]
pub struct LogOnlyAbort {}

impl AbortHook for LogOnlyAbort {
    fn shutdown(&self) {
        warn!("Producer aborted, no execution context to shut down");
    }
}

/// Wraps an [`AbortHook`] so that it fires at most once, whatever the
/// number of callers.
pub struct AbortOnce {
    hook: Box<dyn AbortHook>,
    fired: AtomicBool,
}

impl AbortOnce {
    pub fn new<H: AbortHook + 'static>(hook: H) -> Self {
        Self {
            hook: Box::new(hook),
            fired: AtomicBool::new(false),
        }
    }

    /// Invokes the wrapped hook unless it already fired.
    ///
    /// Returns `true` if this call fired the hook.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            debug!("Abort hook already fired, ignoring");
            return false;
        }
        self.hook.shutdown();
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
