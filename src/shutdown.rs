use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

type Hook = Box<dyn Fn() + Send + Sync>;

/// Clone-shared stop request for a whole pipeline.
///
/// The orchestrator registers one hook per queue; [`request`]
/// (ShutdownSignal::request) fires them all, cancelling every queue so that
/// no stage stays parked in a blocking wait. Stages observe the flag and
/// treat an interrupted wait like end-of-stream.
#[derive(Clone)]
pub struct ShutdownSignal {
    shared: Arc<SharedState>,
}

struct SharedState {
    requested: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState {
                requested: AtomicBool::new(false),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Request pipeline-wide shutdown. Idempotent; the first call fires
    /// every registered hook.
    pub fn request(&self) {
        if self.shared.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        for hook in self.shared.hooks.lock().iter() {
            hook();
        }
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::SeqCst)
    }

    /// Register a hook to run on the first shutdown request. A hook
    /// registered after the request runs immediately.
    pub(crate) fn on_request(&self, hook: impl Fn() + Send + Sync + 'static) {
        let mut hooks = self.shared.hooks.lock();
        if self.shared.requested.load(Ordering::SeqCst) {
            hook();
        }
        hooks.push(Box::new(hook));
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("requested", &self.is_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_request_is_idempotent() {
        let fired = Arc::new(AtomicU32::new(0));
        let signal = ShutdownSignal::new();
        {
            let fired = Arc::clone(&fired);
            signal.on_request(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(!signal.is_requested());
        signal.request();
        signal.request();
        assert!(signal.is_requested());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_hook_fires_immediately() {
        let fired = Arc::new(AtomicU32::new(0));
        let signal = ShutdownSignal::new();
        signal.request();
        {
            let fired = Arc::clone(&fired);
            signal.on_request(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let signal = ShutdownSignal::new();
        let observer = signal.clone();
        signal.request();
        assert!(observer.is_requested());
    }
}
