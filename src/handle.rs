use super::{
    errors::{SpawnError, SpawnResult},
    model::{StateCell, TaskState},
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::{
    sync::oneshot,
    time::Duration,
};


/// Dispatched unit of work. Resolves to `true` when the operation succeeded.
pub type Task = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

/// Work waiting in the pool queue. `launch` is only invoked once a slot is free.
pub(crate) struct QueuedTask {
    pub(crate) state: Arc<StateCell>,
    pub(crate) launch: Box<dyn FnOnce() -> Task + Send + 'static>,
}


/// Handle to a task submitted to a [`Pool`](crate::Pool).
///
/// Dropping the handle detaches the task; it still runs once admitted.
pub struct JoinHandle<T> {
    state: Arc<StateCell>,
    receiver: oneshot::Receiver<SpawnResult<T>>,
}

impl<T> JoinHandle<T> {

    pub(crate) fn new
    (
        state: Arc<StateCell>,
        receiver: oneshot::Receiver<SpawnResult<T>>,
    ) -> Self {
        Self {
            state,
            receiver
        }
    }

    /// Handle for work that was refused before it was queued.
    pub(crate) fn abandoned() -> Self {
        let state = Arc::new(StateCell::new());
        state.set(TaskState::Abandoned);
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(SpawnError::Abandoned));
        Self::new(state, rx)
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state.get()
    }

    /// Skips the task if it has not started yet. Returns `false` once it is running.
    #[inline]
    pub fn abandon(&self) -> bool {
        self.state.transition(TaskState::Queued, TaskState::Abandoned)
    }

    /// Waits at most `timeout` for the result. The task itself keeps running.
    pub async fn await_timeout(self, timeout: Duration) -> SpawnResult<T> {
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(SpawnError::Timeout),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = SpawnResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.state.get() == TaskState::Abandoned {
            return Poll::Ready(Err(SpawnError::Abandoned));
        }
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) if this.state.get() == TaskState::Abandoned => {
                Poll::Ready(Err(SpawnError::Abandoned))
            }
            Poll::Ready(Err(_)) => Poll::Ready(Err(SpawnError::ChannelClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
