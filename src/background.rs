//! Fire-and-forget scheduling of single computations.

use std::{
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};

use async_task::Task;
use tracing::debug;

use crate::{
    computation::{Computation, Procedure},
    error::{panic_message, Error, Result},
    executor::{Executor, Release},
    latch::{LockLatch, SetOnWake},
};

/// Submits `work` as a single task and hands back its handle without waiting.
///
/// An owned executor gets a single-worker pool that is shut down right away
/// without blocking; its worker exits after running `work`. A failure of
/// `work` is wrapped once in [`Error::Background`].
fn submit<T, W>(executor: &Executor<'_>, work: W) -> Result<AsyncHandle<T>>
where
    T: Send + 'static,
    W: FnOnce() -> Result<T> + Send + 'static,
{
    let pool = executor.acquire(1, Release::Detach)?;
    let task = pool.spawn_future(async move {
        match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(outcome) => outcome.map_err(|source| Error::Background { source }.into()),
            Err(payload) => Err(Error::Panicked(panic_message(&*payload)).into()),
        }
    })?;
    debug!(pool = pool.id(), owned = pool.is_owned(), "task scheduled");
    Ok(AsyncHandle { task: Some(task) })
}

/// A function whose calls run in the background.
///
/// ```
/// use deferred::prelude::*;
///
/// let square = Async::new(|n: u64| -> Result<u64> { Ok(n * n) }, Executor::owned());
/// let handle = square.apply(12).unwrap();
/// assert_eq!(handle.get().unwrap(), 144);
/// ```
pub struct Async<'p, F> {
    func: Arc<F>,
    executor: Executor<'p>,
}

impl<'p, F> Async<'p, F> {
    pub fn new(func: F, executor: Executor<'p>) -> Self {
        Self {
            func: Arc::new(func),
            executor,
        }
    }

    /// Schedules `func(input)` and returns at once.
    pub fn apply<X, Y>(&self, input: X) -> Result<AsyncHandle<Y>>
    where
        F: Fn(X) -> Result<Y> + Send + Sync + 'static,
        X: Send + 'static,
        Y: Send + 'static,
    {
        let func = Arc::clone(&self.func);
        submit(&self.executor, move || func(input))
    }
}

/// Fire and forget: the call is scheduled and its handle detached.
impl<X, Y, F> Procedure<X> for Async<'_, F>
where
    F: Fn(X) -> Result<Y> + Send + Sync + 'static,
    X: Send + 'static,
    Y: Send + 'static,
{
    fn exec(&self, input: X) -> Result<()> {
        self.apply(input).map(drop)
    }
}

impl Async<'_, ()> {
    /// Schedules one computation and returns at once.
    pub fn schedule<C>(computation: C, executor: Executor<'_>) -> Result<AsyncHandle<C::Output>>
    where
        C: Computation + Send + 'static,
        C::Output: Send + 'static,
    {
        submit(&executor, move || computation.value())
    }
}

impl<F> fmt::Debug for Async<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Async")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Handle

/// The pending outcome of a background task.
///
/// Dropping the handle does not cancel the task; it still runs to completion
/// and its outcome is discarded.
pub struct AsyncHandle<T> {
    task: Option<Task<Result<T>>>,
}

impl<T> AsyncHandle<T> {
    /// Returns `true` once the task has finished. Never blocks.
    pub fn is_done(&self) -> bool {
        self.task.as_ref().map_or(true, Task::is_finished)
    }

    /// Blocks until the task has finished and returns its outcome.
    ///
    /// A failure of the task comes back wrapped in [`Error::Background`], a
    /// panic as [`Error::Panicked`]. If the pool dropped the task without running it,
    /// this fails with [`Error::Rejected`].
    pub fn get(mut self) -> Result<T> {
        let Some(task) = self.task.take() else {
            return Err(Error::Rejected.into());
        };
        let mut task = pin!(task.fallible());

        let signal = SetOnWake::new(LockLatch::new());
        let waker = Waker::from(Arc::clone(&signal));
        let mut cx = Context::from_waker(&waker);
        loop {
            match task.as_mut().poll(&mut cx) {
                Poll::Ready(Some(outcome)) => return outcome,
                Poll::Ready(None) => return Err(Error::Rejected.into()),
                Poll::Pending => signal.latch().wait_and_reset(),
            }
        }
    }
}

impl<T> Drop for AsyncHandle<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.detach();
        }
    }
}

impl<T> fmt::Debug for AsyncHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("done", &self.is_done())
            .finish()
    }
}
