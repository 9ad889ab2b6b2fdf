use super::{
    config::Config,
    errors::{BoxError, SpawnError, SpawnResult},
    handle::{JoinHandle, QueuedTask, Task},
    model::{JoinOrdering, PoolMetrics, StateCell, TaskState},
};
use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::deque::{Injector, Steal};
use futures::{
    future::join_all,
    stream::{FuturesUnordered, StreamExt},
    FutureExt,
};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace, warn};


/// Bounded admission pool.
///
/// At most `limit` tasks run at once; the rest wait in a FIFO queue and are
/// dispatched as soon as a running task settles. Cloning the pool yields
/// another handle to the same queue and counters.
///
/// Tasks are dispatched with `tokio::spawn`, so [`Pool::add`] must be called
/// from within a tokio runtime.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    limit: usize,
    inject: Injector<QueuedTask>,
    queued: AtomicUsize,
    running: AtomicUsize,
    closed: AtomicBool,
    idle: Notify,
    total_spawned: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    abandoned: AtomicUsize,
}

impl Pool {
    pub fn new(limit: usize) -> SpawnResult<Self> {
        Self::with_config(Config::default().with_concurrency(limit))
    }

    pub fn with_config(config: Config) -> SpawnResult<Self> {
        let limit = config.validate()?.get();
        debug!(limit, "pool created");

        let inner = Arc::new(PoolInner {
            limit,
            inject: Injector::new(),
            queued: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            idle: Notify::new(),
            total_spawned: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            abandoned: AtomicUsize::new(0),
        });
        inner.pump();

        Ok(Self { inner })
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Enqueues `thunk`. It is invoked once a slot is free and the returned
    /// handle resolves with its outcome.
    pub fn add<F, Fut, R, E>(&self, thunk: F) -> JoinHandle<R>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        if self.is_closed() {
            debug!("pool closed, task refused");
            self.inner.abandoned.fetch_add(1, Ordering::Relaxed);
            return JoinHandle::abandoned();
        }

        let (tx, rx) = oneshot::channel::<SpawnResult<R>>();
        let state = Arc::new(StateCell::new());
        let task_state = Arc::clone(&state);

        let launch = move || -> Task {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { thunk().await })
                    .catch_unwind()
                    .await;

                let result = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => {
                        let err: BoxError = err.into();
                        warn!(error = %err, "operation failed");
                        Err(SpawnError::OperationFailure(err))
                    }
                    Err(panic_info) => {
                        let message = panic_message(panic_info.as_ref());
                        warn!(panic = %message, "operation panicked");
                        Err(SpawnError::Panic(message))
                    }
                };

                let succeeded = result.is_ok();
                task_state.set(if succeeded { TaskState::Completed } else { TaskState::Failed });
                let _ = tx.send(result);
                succeeded
            })
        };

        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        self.inner.inject.push(QueuedTask {
            state: Arc::clone(&state),
            launch: Box::new(launch),
        });
        self.inner.pump();

        JoinHandle::new(state, rx)
    }

    /// Resolves once nothing is queued and nothing is running.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Stops admission. Queued tasks are abandoned, running tasks finish.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(queued = self.inner.queued.load(Ordering::Relaxed), "pool closing");
        self.inner.abandon_queued();
        self.inner.notify_if_idle();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            limit: self.inner.limit,
            running: self.inner.running.load(Ordering::Relaxed),
            queued: self.inner.queued.load(Ordering::Relaxed),
            total_spawned: self.inner.total_spawned.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            abandoned: self.inner.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl PoolInner {
    /// Fills free slots from the queue head.
    ///
    /// A slot is reserved before popping, so `running` never exceeds `limit`
    /// even while several settling tasks pump at once.
    fn pump(self: &Arc<Self>) {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                self.abandon_queued();
                self.notify_if_idle();
                return;
            }

            let reserved = self
                .running
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |running| {
                    (running < self.limit).then_some(running + 1)
                })
                .is_ok();
            if !reserved {
                return;
            }

            match self.pop() {
                Some(task) => {
                    if task.state.transition(TaskState::Queued, TaskState::Running) {
                        self.dispatch(task);
                    } else {
                        trace!("skipping abandoned task");
                        self.abandoned.fetch_add(1, Ordering::Relaxed);
                        self.running.fetch_sub(1, Ordering::SeqCst);
                    }
                }
                None => {
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    // A push may have raced with the reservation above.
                    if self.inject.is_empty() {
                        self.notify_if_idle();
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, task: QueuedTask) {
        let spawned = self.total_spawned.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(spawned, running = self.running.load(Ordering::Relaxed), "dispatching task");

        let pool = Arc::clone(self);
        let fut = (task.launch)();
        tokio::spawn(async move {
            let succeeded = fut.await;
            pool.settle(succeeded);
        });
    }

    fn settle(self: &Arc<Self>, succeeded: bool) {
        if succeeded {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.pump();
    }

    fn pop(&self) -> Option<QueuedTask> {
        loop {
            match self.inject.steal() {
                Steal::Success(task) => {
                    self.queued.fetch_sub(1, Ordering::SeqCst);
                    return Some(task);
                }
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    fn abandon_queued(&self) {
        while let Some(task) = self.pop() {
            task.state.set(TaskState::Abandoned);
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    fn is_idle(&self) -> bool {
        self.running.load(Ordering::SeqCst) == 0 && self.queued.load(Ordering::SeqCst) == 0
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }
}


/// Runs `operation` over `items` with at most `limit` in flight.
///
/// Results come back in input order. The first failure is returned
/// immediately; siblings already running are left to finish and their
/// outcomes are discarded, siblings still queued are abandoned.
pub async fn map_with_concurrency<T, R, E, F, Fut>(
    items: Vec<T>,
    operation: F,
    limit: usize,
) -> SpawnResult<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let pool = Pool::new(limit)?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let len = items.len();
    let operation = Arc::new(operation);
    let mut pending: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let op = Arc::clone(&operation);
            let batch = pool.clone();
            pool.add(move || async move {
                let mut guard = FailFast { pool: batch, armed: true };
                let result = op(item).await;
                guard.armed = result.is_err();
                result
            })
            .map(move |result| (index, result))
        })
        .collect();

    let mut slots: Vec<Option<R>> = (0..len).map(|_| None).collect();
    while let Some((index, result)) = pending.next().await {
        match result {
            Ok(value) => slots[index] = Some(value),
            Err(err) => {
                debug!(index, error = %err, "batch failed, abandoning remaining tasks");
                pool.close();
                return Err(err);
            }
        }
    }

    // The loop only ends once every handle resolved with `Ok`, so no slot is empty.
    Ok(slots.into_iter().flatten().collect())
}

/// Closes the batch pool when the guarded operation fails or panics.
///
/// Dropped inside the task, before the pool pumps its next queued item.
struct FailFast {
    pool: Pool,
    armed: bool,
}

impl Drop for FailFast {
    fn drop(&mut self) {
        if self.armed {
            self.pool.close();
        }
    }
}

/// Like [`map_with_concurrency`], but waits for every item and returns each
/// outcome in input order.
pub async fn map_with_concurrency_settled<T, R, E, F, Fut>(
    items: Vec<T>,
    operation: F,
    limit: usize,
) -> SpawnResult<Vec<SpawnResult<R>>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let pool = Pool::new(limit)?;
    let operation = Arc::new(operation);
    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let op = Arc::clone(&operation);
            pool.add(move || op(item))
        })
        .collect();

    Ok(join_handles(handles, JoinOrdering::Ordered).await)
}

/// Awaits every handle, returning results in the requested order.
pub async fn join_handles<T>(handles: Vec<JoinHandle<T>>, ordering: JoinOrdering) -> Vec<SpawnResult<T>>
where
    T: Send + 'static,
{
    if handles.is_empty() {
        return Vec::new();
    }

    match ordering {
        JoinOrdering::Ordered => join_all(handles).await,
        JoinOrdering::UnOrdered => FuturesUnordered::from_iter(handles).collect::<Vec<_>>().await,
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(message) = panic_info.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic_info.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic in spawned task".into()
    }
}
