//! Jobs that borrow from the caller's stack.

use std::{
    any::Any,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    error::Error,
    job::JobRef,
    latch::{CountLatch, Latch},
    thread_pool::{Registry, WorkerThread},
    util::CallOnDrop,
};

/// A set of jobs that may borrow anything living longer than `'scope`.
///
/// Created by [`ThreadPool::scope`](crate::thread_pool::ThreadPool::scope),
/// which does not return before every job spawned here has run.
pub struct Scope<'scope> {
    registry: Arc<Registry>,
    /// Counts the jobs still pending, plus one held by the owner until it
    /// completes the scope.
    pending: CountLatch,
    /// The first panic raised by a job.
    panic: Mutex<Option<Box<dyn Any + Send>>>,
    /// Jobs are `Send` closures bounded by `'scope`. They are only ever moved
    /// to the worker that runs them, so sharing `&Scope` is fine.
    #[allow(clippy::type_complexity)]
    marker: PhantomData<Box<dyn FnOnce(&Scope<'scope>) + Send + Sync + 'scope>>,
}

impl<'scope> Scope<'scope> {
    /// Opens a scope. `owner` is the worker of this pool that will complete
    /// it, or `None` if an outside thread will block on it.
    ///
    /// # Safety
    ///
    /// The scope must be finished with [`Scope::complete`] using the same
    /// owner. Otherwise its jobs may outlive what they borrow.
    pub(crate) unsafe fn new(registry: Arc<Registry>, owner: Option<&WorkerThread>) -> Scope<'scope> {
        Scope {
            registry,
            pending: CountLatch::with_count(1, owner),
            panic: Mutex::new(None),
            marker: PhantomData,
        }
    }

    /// Queues `f` on the pool. It runs before the scope completes and gets
    /// the scope back, so it can spawn more jobs.
    ///
    /// If the pool has been shut down this fails with [`Error::Rejected`] and
    /// `f` is dropped unrun. A panic in `f` is held until the scope completes
    /// and is raised there.
    pub fn spawn<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce(&Scope<'scope>) + Send + 'scope,
    {
        let this = ScopePtr(self);
        self.registry.try_inject(move || {
            // Only counted once the pool has accepted the job.
            self.pending.increment();

            let job = move || {
                // SAFETY: The count taken above keeps the owner inside
                // `complete`, so the scope is alive until the latch is set.
                let scope = unsafe { this.get() };
                let _finished = CallOnDrop(|| unsafe { Latch::set(&scope.pending) });
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(scope))) {
                    scope.panic.lock().get_or_insert(payload);
                }
            };

            // SAFETY: `complete` blocks until this job has run, so nothing
            // it borrows can go away first.
            unsafe { JobRef::from_closure(job) }
        })
    }

    /// Releases the owner's count, waits for every job, and re-raises the
    /// first job panic, if any.
    ///
    /// Takes `&self`: jobs hold a pointer to this scope, so it must stay in
    /// place until they have all run.
    pub(crate) fn complete(&self, owner: Option<&WorkerThread>) {
        // SAFETY: `self` is borrowed for the whole call.
        unsafe { Latch::set(&self.pending) };
        self.pending.wait(owner);

        if let Some(payload) = self.panic.lock().take() {
            panic::resume_unwind(payload);
        }
    }
}

/// A scope reference smuggled into a job without a lifetime.
struct ScopePtr<T>(*const T);

// SAFETY: Only dereferenced while the scope is known to be alive, and `T` is
// shared across threads only if it is `Sync`.
unsafe impl<T: Sync> Send for ScopePtr<T> {}

// SAFETY: As above.
unsafe impl<T: Sync> Sync for ScopePtr<T> {}

impl<T> ScopePtr<T> {
    /// Takes `&self` so the closure captures the whole wrapper, not the raw
    /// pointer field.
    ///
    /// # Safety
    ///
    /// The pointee must still be alive.
    unsafe fn get(&self) -> &T {
        unsafe { &*self.0 }
    }
}
