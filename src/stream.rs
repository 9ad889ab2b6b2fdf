use super::{
    cancel::CancellationSignal,
    errors::{BoxError, SpawnResult},
    handle::JoinHandle,
    pool::Pool,
};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use futures::stream::{FusedStream, FuturesUnordered, Stream, StreamExt};
use tracing::debug;


type Launcher<R> = Box<dyn FnMut() -> Option<JoinHandle<R>> + Send + 'static>;

/// Runs `operation` over `items` with at most `limit` in flight and yields
/// each outcome as soon as it completes.
///
/// Admission happens when the stream is polled: a slot freed by a yielded
/// result is refilled on the next poll, unless `signal` was aborted in the
/// meantime. A failing item is yielded as `Err` and the stream carries on.
pub fn run_with_concurrency<T, R, E, F, Fut>(
    items: Vec<T>,
    limit: usize,
    mut operation: F,
    signal: Option<&CancellationSignal>,
) -> SpawnResult<ConcurrentStream<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    E: Into<BoxError> + Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let pool = Pool::new(limit)?;
    let remaining = items.len();
    let mut items = items.into_iter();

    let launcher: Launcher<R> = Box::new(move || {
        let item = items.next()?;
        let fut = operation(item);
        Some(pool.add(move || fut))
    });

    Ok(ConcurrentStream {
        limit,
        launcher,
        in_flight: FuturesUnordered::new(),
        signal: signal.cloned(),
        remaining,
        started: 0,
        stopped: false,
    })
}


/// Completion-ordered stream returned by [`run_with_concurrency`].
///
/// Dropping the stream detaches tasks that are still running.
pub struct ConcurrentStream<R> {
    limit: usize,
    launcher: Launcher<R>,
    in_flight: FuturesUnordered<JoinHandle<R>>,
    signal: Option<CancellationSignal>,
    remaining: usize,
    started: usize,
    stopped: bool,
}

impl<R> ConcurrentStream<R> {
    /// Tasks started and not yet yielded.
    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Items not yet started.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Items started so far.
    #[inline]
    pub fn started(&self) -> usize {
        self.started
    }

    fn admit(&mut self) {
        while !self.stopped && self.in_flight.len() < self.limit {
            if self.signal.as_ref().is_some_and(CancellationSignal::is_aborted) {
                debug!(remaining = self.remaining, "cancellation observed, admission stopped");
                self.stopped = true;
                break;
            }

            match (self.launcher)() {
                Some(handle) => {
                    self.in_flight.push(handle);
                    self.started += 1;
                    self.remaining -= 1;
                }
                None => self.stopped = true,
            }
        }
    }
}

impl<R> Stream for ConcurrentStream<R> {
    type Item = SpawnResult<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        this.admit();
        this.in_flight.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let upper = if self.stopped { self.in_flight.len() } else { self.in_flight.len() + self.remaining };
        (0, Some(upper))
    }
}

impl<R> FusedStream for ConcurrentStream<R> {
    fn is_terminated(&self) -> bool {
        self.stopped && self.in_flight.is_empty()
    }
}
