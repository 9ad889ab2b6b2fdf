//! Cooperative cancellation shared between a scheduler and the work it runs.
//!
//! A [`CancellationController`] owns the right to cancel; any number of
//! [`CancellationSignal`] clones observe it. Cancelling only stops new
//! admission, it never preempts work that is already running.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError, Weak,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type Callback = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    token: CancellationToken,
    aborted: AtomicBool,
    disposed: AtomicBool,
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Callback)>>,
}

impl Shared {
    fn observers(&self) -> MutexGuard<'_, Vec<(u64, Callback)>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}


/// Owner of a cancellation signal.
///
/// Dropping the controller does not cancel the signal.
pub struct CancellationController {
    signal: CancellationSignal,
}

impl CancellationController {
    pub fn new() -> Self {
        Self {
            signal: CancellationSignal {
                shared: Arc::new(Shared {
                    token: CancellationToken::new(),
                    aborted: AtomicBool::new(false),
                    disposed: AtomicBool::new(false),
                    next_id: AtomicU64::new(0),
                    observers: Mutex::new(Vec::new()),
                }),
            },
        }
    }

    #[inline]
    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Flips the signal and notifies every observer once.
    ///
    /// Returns `true` only for the call that performed the flip.
    pub fn cancel(&self) -> bool {
        let shared = &self.signal.shared;
        if shared.aborted.swap(true, Ordering::SeqCst) {
            return false;
        }
        shared.token.cancel();

        let observers = std::mem::take(&mut *shared.observers());
        info!(observers = observers.len(), "cancellation requested");
        for (_, callback) in observers {
            callback();
        }
        true
    }

    /// Detaches all observers. Registrations made afterwards are ignored.
    pub fn dispose(&self) {
        let shared = &self.signal.shared;
        if shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let removed = std::mem::take(&mut *shared.observers()).len();
        debug!(removed, "cancellation controller disposed");
    }
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationController")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}


/// Read side of a [`CancellationController`]. Cheap to clone.
#[derive(Clone)]
pub struct CancellationSignal {
    shared: Arc<Shared>,
}

impl CancellationSignal {
    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Completes once the signal is cancelled.
    pub async fn cancelled(&self) {
        self.shared.token.cancelled().await
    }

    /// Token cancelled together with this signal, for work written against tokio-util.
    pub fn child_token(&self) -> CancellationToken {
        self.shared.token.child_token()
    }

    /// Registers `callback` to run when the signal is cancelled.
    ///
    /// On an already-cancelled signal the callback runs immediately. After the
    /// controller is disposed the callback is dropped without running.
    pub fn on_cancel<F>(&self, callback: F) -> Subscription
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut observers = self.shared.observers();
            if self.shared.disposed.load(Ordering::SeqCst) {
                return Subscription::detached();
            }
            if !self.shared.aborted.load(Ordering::SeqCst) {
                observers.push((id, Box::new(callback)));
                return Subscription {
                    id,
                    shared: Arc::downgrade(&self.shared),
                };
            }
        }

        callback();
        Subscription::detached()
    }
}

impl std::fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}


/// Registration returned by [`CancellationSignal::on_cancel`].
///
/// Dropping it keeps the callback registered; call [`Subscription::unsubscribe`]
/// to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    fn detached() -> Self {
        Self {
            id: u64::MAX,
            shared: Weak::new(),
        }
    }

    /// Removes the callback. Returns `false` if it already ran or was removed.
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut observers = shared.observers();
        let before = observers.len();
        observers.retain(|(id, _)| *id != self.id);
        observers.len() != before
    }
}
