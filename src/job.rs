//! Type-erased units of work queued on a pool.
//!
//! A [`JobRef`] is a pointer plus the function that knows how to run what it
//! points to. Two kinds of work end up behind one: boxed closures, submitted
//! by [`ThreadPool::spawn`](crate::thread_pool::ThreadPool::spawn) and scopes,
//! and `async_task` runnables, submitted whenever a future is scheduled.
//!
//! Each `JobRef` must be run exactly once. One that is dropped without
//! running leaks its closure.

use std::ptr::NonNull;

use async_task::Runnable;

/// A queued unit of work.
pub struct JobRef {
    pointer: NonNull<()>,
    run_fn: unsafe fn(NonNull<()>),
}

// SAFETY: Every constructor requires the erased work to be `Send`.
unsafe impl Send for JobRef {}

// SAFETY: A `JobRef` has no shared-access methods; `run` consumes it.
unsafe impl Sync for JobRef {}

impl JobRef {
    /// Queues a closure that owns everything it touches.
    pub fn from_static<F>(work: F) -> JobRef
    where
        F: FnOnce() + Send + 'static,
    {
        // SAFETY: A `'static` closure cannot outlive anything it captures.
        unsafe { JobRef::from_closure(work) }
    }

    /// Queues a closure, erasing its lifetime.
    ///
    /// # Safety
    ///
    /// The caller must make sure the job runs before anything the closure
    /// borrows goes away. Scopes guarantee this by blocking until all of
    /// their jobs have run.
    pub unsafe fn from_closure<F>(work: F) -> JobRef
    where
        F: FnOnce() + Send,
    {
        unsafe fn run_boxed<F: FnOnce()>(pointer: NonNull<()>) {
            // SAFETY: The pointer came out of `Box::into_raw` for an `F`.
            let work = unsafe { Box::from_raw(pointer.cast::<F>().as_ptr()) };
            work();
        }

        let pointer = NonNull::from(Box::leak(Box::new(work))).cast::<()>();
        JobRef {
            pointer,
            run_fn: run_boxed::<F>,
        }
    }

    /// Queues one poll of an async task.
    pub fn from_runnable(runnable: Runnable) -> JobRef {
        unsafe fn poll_task(pointer: NonNull<()>) {
            // SAFETY: The pointer came out of `Runnable::into_raw`.
            let runnable = unsafe { Runnable::<()>::from_raw(pointer) };
            runnable.run();
        }

        JobRef {
            pointer: runnable.into_raw(),
            run_fn: poll_task,
        }
    }

    /// Runs the job, consuming it.
    ///
    /// # Safety
    ///
    /// Whatever the job borrows must still be alive.
    #[inline]
    pub unsafe fn run(self) {
        // SAFETY: `run_fn` was paired with `pointer` by a constructor.
        unsafe { (self.run_fn)(self.pointer) }
    }
}
