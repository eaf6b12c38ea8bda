use std::{
    cell::Cell,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    ptr,
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
    thread,
};

use async_task::{Runnable, Task};
use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::{
    error::{panic_message, Error},
    job::JobRef,
    latch::{AtomicLatch, Latch, Probe},
    scope::Scope,
    util::available_threads,
};

// -----------------------------------------------------------------------------
// Thread pool types

/// Produces the name of the worker thread with the given index.
pub type ThreadNaming = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Configuration for a new [`ThreadPool`].
///
/// ```
/// # use deferred::thread_pool::Builder;
/// let pool = Builder::new()
///     .num_threads(2)
///     .thread_name(|index| format!("compute-{index}"))
///     .build()
///     .unwrap();
/// assert_eq!(pool.num_threads(), 2);
/// ```
#[derive(Clone, Default)]
pub struct Builder {
    num_threads: Option<usize>,
    thread_name: Option<ThreadNaming>,
}

impl Builder {
    /// Creates a builder for a pool with one worker per available hardware
    /// thread and default thread names.
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Sets the number of worker threads. Zero is treated as one.
    pub fn num_threads(mut self, num_threads: usize) -> Builder {
        self.num_threads = Some(num_threads);
        self
    }

    /// Sets the function naming each worker thread.
    pub fn thread_name<F>(mut self, naming: F) -> Builder
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.thread_name = Some(Arc::new(naming));
        self
    }

    /// Returns the number of workers a pool built from this configuration
    /// will have.
    pub fn resolved_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(available_threads).max(1)
    }

    /// Spawns the worker threads and returns the running pool. Returns once
    /// every worker has entered its main loop.
    pub fn build(&self) -> Result<ThreadPool, Error> {
        let num_threads = self.resolved_threads();
        let registry = Arc::new(Registry::new(num_threads));

        for index in 0..num_threads {
            let name = match &self.thread_name {
                Some(naming) => naming(index),
                None => format!("deferred-worker-{index}"),
            };
            let worker_registry = Arc::clone(&registry);
            // SAFETY: The main loop is the first thing called on the new
            // thread.
            let spawned = thread::Builder::new()
                .name(name)
                .spawn(move || unsafe { main_loop(worker_registry, index) });
            if let Err(err) = spawned {
                // Let the workers that did start exit. Workers that never
                // started were never marked as running.
                registry.state.running_threads.store(index, Ordering::Release);
                registry.shutdown();
                return Err(Error::Spawn(err));
            }
        }

        // Wait for each thread to become ready.
        for control in &registry.threads {
            control.await_ready();
        }

        debug!(pool = registry.id(), num_threads, "thread pool started");
        Ok(ThreadPool { registry })
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("num_threads", &self.num_threads)
            .field("thread_name", &self.thread_name.as_ref().map(|_| ".."))
            .finish()
    }
}

/// A fixed-size pool of worker threads.
///
/// The pool is the unit of ownership for worker threads: whoever holds the
/// `ThreadPool` decides when it shuts down. Dropping it calls
/// [`ThreadPool::shutdown`], which lets the workers finish every job already
/// submitted and then exit without blocking the dropping thread.
pub struct ThreadPool {
    registry: Arc<Registry>,
}

/// The state shared by a pool and its workers.
pub struct Registry {
    /// The control block of each worker thread.
    threads: Vec<CachePadded<ThreadControl>>,
    /// Submitted jobs, taken by whichever worker gets there first.
    queue: SegQueue<JobRef>,
    /// Infrequently modified shared data, kept on its own cache line.
    state: CachePadded<RegistryState>,
}

struct RegistryState {
    /// Number of workers that have not yet exited their main loop.
    running_threads: AtomicUsize,
    /// `true` while the pool accepts new jobs. Submissions hold the read lock
    /// across the push, so once `shutdown` holds the write lock no job can
    /// land in the queue after the workers have drained it.
    accepting: RwLock<bool>,
}

/// This is a generalized control mechanism for a thread, implementing
/// sleeping, wakeups and a termination procedure.
struct ThreadControl {
    /// `true` while the worker is parked waiting for jobs.
    is_sleeping: Mutex<bool>,
    awakened: Condvar,
    /// `true` between entering and leaving the main loop. The pool waits on
    /// it at startup and in `await_termination`.
    is_running: Mutex<bool>,
    synchronized: Condvar,
    /// Set by `shutdown`; the worker drains the queue and exits.
    should_terminate: AtomicLatch,
}

// -----------------------------------------------------------------------------
// Registry

impl Registry {
    fn new(num_threads: usize) -> Registry {
        Registry {
            threads: (0..num_threads)
                .map(|_| CachePadded::new(ThreadControl::new()))
                .collect(),
            queue: SegQueue::new(),
            state: CachePadded::new(RegistryState {
                running_threads: AtomicUsize::new(num_threads),
                accepting: RwLock::new(true),
            }),
        }
    }

    /// Returns an opaque identifier for this registry.
    pub fn id(&self) -> usize {
        self as *const Self as usize
    }

    /// Pushes the job built by `make_job` onto the queue, unless the pool has
    /// been shut down. The job is only built once it is known to be accepted.
    pub(crate) fn try_inject<F>(&self, make_job: F) -> Result<(), Error>
    where
        F: FnOnce() -> JobRef,
    {
        let accepting = self.state.accepting.read();
        if !*accepting {
            return Err(Error::Rejected);
        }
        self.queue.push(make_job());
        drop(accepting);

        self.wake_any(1);
        Ok(())
    }

    /// Pops a job from the queue.
    fn pop(&self) -> Option<JobRef> {
        self.queue.pop()
    }

    /// Wakes up to `num_to_wake` sleeping workers. Returns how many were
    /// actually woken.
    pub fn wake_any(&self, num_to_wake: usize) -> usize {
        let mut num_woken = 0;
        if num_to_wake > 0 {
            for index in 0..self.threads.len() {
                if self.wake_thread(index) {
                    num_woken += 1;
                    if num_to_wake == num_woken {
                        break;
                    }
                }
            }
        }
        num_woken
    }

    /// Wakes the worker at `index`. Returns `false` if it was not asleep.
    pub fn wake_thread(&self, index: usize) -> bool {
        self.threads[index].wake()
    }

    /// Returns `true` once the pool has stopped accepting work.
    pub fn is_shutdown(&self) -> bool {
        !*self.state.accepting.read()
    }

    /// Returns `true` once the pool is shut down and every worker has left
    /// its main loop.
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.state.running_threads.load(Ordering::Acquire) == 0
    }

    /// Stops accepting jobs and asks every worker to exit once the queue is
    /// empty. Does not block on the workers.
    fn shutdown(&self) {
        {
            let mut accepting = self.state.accepting.write();
            if !*accepting {
                return;
            }
            *accepting = false;
        }
        for control in &self.threads {
            control.halt();
        }
        debug!(pool = self.id(), "thread pool shutting down");
    }
}

// -----------------------------------------------------------------------------
// Thread control

impl ThreadControl {
    fn new() -> ThreadControl {
        ThreadControl {
            is_sleeping: Mutex::new(false),
            awakened: Condvar::new(),
            is_running: Mutex::new(false),
            synchronized: Condvar::new(),
            should_terminate: AtomicLatch::new(),
        }
    }

    /// The controller may call this to wait until the worker calls
    /// `post_ready_status`.
    fn await_ready(&self) {
        let mut is_running = self.is_running.lock();
        while !*is_running {
            self.synchronized.wait(&mut is_running);
        }
    }

    /// The worker calls this when it enters its main loop.
    fn post_ready_status(&self) {
        let mut is_running = self.is_running.lock();
        *is_running = true;
        self.synchronized.notify_all();
    }

    /// Wakes the worker if it is sleeping.
    fn wake(&self) -> bool {
        let mut is_sleeping = self.is_sleeping.lock();
        if *is_sleeping {
            *is_sleeping = false;
            self.awakened.notify_one();
            true
        } else {
            false
        }
    }

    /// Tells the worker to leave its main loop.
    fn halt(&self) {
        // SAFETY: The control block is owned by the registry, which outlives
        // this call.
        unsafe { Latch::set(&self.should_terminate) }
        self.wake();
    }

    /// The controller may call this to wait until the worker calls
    /// `post_termination_status`.
    fn await_termination(&self) {
        let mut is_running = self.is_running.lock();
        while *is_running {
            self.synchronized.wait(&mut is_running);
        }
    }

    /// The worker calls this right before it terminates.
    fn post_termination_status(&self) {
        let mut is_running = self.is_running.lock();
        *is_running = false;
        self.synchronized.notify_all();
    }
}

// -----------------------------------------------------------------------------
// Core API

impl ThreadPool {
    /// Creates a pool with one worker per available hardware thread.
    pub fn new() -> Result<ThreadPool, Error> {
        Builder::new().build()
    }

    /// Returns the number of worker threads the pool was built with.
    pub fn num_threads(&self) -> usize {
        self.registry.threads.len()
    }

    /// Returns an opaque identifier for this pool.
    pub fn id(&self) -> usize {
        self.registry.id()
    }

    /// Returns `true` once the pool has stopped accepting work.
    pub fn is_shutdown(&self) -> bool {
        self.registry.is_shutdown()
    }

    /// Returns `true` once the pool is shut down and every worker has exited.
    pub fn is_terminated(&self) -> bool {
        self.registry.is_terminated()
    }

    /// Stops accepting new work. Jobs already submitted still run to
    /// completion, after which the workers exit. This does not block.
    pub fn shutdown(&self) {
        self.registry.shutdown();
    }

    /// Blocks until every worker has exited. Call [`ThreadPool::shutdown`]
    /// first, or this waits forever.
    ///
    /// A worker of this pool cannot wait for itself to exit, so on a worker
    /// this returns immediately.
    pub fn await_termination(&self) {
        if WorkerThread::current_in(&self.registry).is_some() {
            warn!(pool = self.id(), "await_termination called from one of the pool's own workers");
            return;
        }
        for control in &self.registry.threads {
            control.await_termination();
        }
        debug!(pool = self.id(), "thread pool terminated");
    }

    /// Spawns a closure onto the pool. The closure cannot borrow from the
    /// caller; use [`ThreadPool::scope`] for that.
    pub fn spawn<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.registry.try_inject(|| JobRef::from_static(f))
    }

    /// Spawns a future onto the pool and returns its task handle. Dropping
    /// the task cancels the future; detach it to let it run unobserved.
    pub fn spawn_future<F, T>(&self, future: F) -> Result<Task<T>, Error>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shutdown() {
            return Err(Error::Rejected);
        }

        // The schedule function turns the future into a job when woken.
        let registry = Arc::clone(&self.registry);
        let schedule = move |runnable: Runnable| {
            let outcome = registry.try_inject(move || JobRef::from_runnable(runnable));
            if outcome.is_err() {
                // The runnable was dropped with the rejected closure, which
                // cancels the task.
                warn!(pool = registry.id(), "future rescheduled onto a shut down pool");
            }
        };

        let (runnable, task) = async_task::spawn(future, schedule);
        runnable.schedule();
        Ok(task)
    }

    /// Creates a scope on which closures borrowing from the caller can be
    /// spawned. When `f` returns, this blocks until every job spawned into
    /// the scope has completed, then returns the outcome of `f`.
    ///
    /// When called on one of this pool's own workers, the worker keeps
    /// running queued jobs while it waits instead of blocking.
    pub fn scope<'scope, F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Scope<'scope>) -> T,
    {
        let owner = WorkerThread::current_in(&self.registry);
        // SAFETY: The scope is completed below on every path, including when
        // `f` panics.
        let scope = unsafe { Scope::<'scope>::new(Arc::clone(&self.registry), owner) };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&scope)));
        scope.complete(owner);
        match outcome {
            Ok(outcome) => outcome,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.registry.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("id", &self.id())
            .field("num_threads", &self.num_threads())
            .field("is_shutdown", &self.is_shutdown())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Worker threads

/// Data for a local worker thread, stored in a thread-local static.
pub struct WorkerThread {
    registry: Arc<Registry>,
    index: usize,
}

thread_local! {
    static WORKER_THREAD_STATE: Cell<*const WorkerThread> = const { Cell::new(ptr::null()) };
}

impl WorkerThread {
    /// Sets `self` as the worker thread for the current thread.
    ///
    /// # Safety
    ///
    /// This must be called only once per thread, and `self` must outlive
    /// every later call to `current` on the thread.
    unsafe fn set_current(&self) {
        WORKER_THREAD_STATE.with(|t| {
            assert!(t.get().is_null());
            t.set(self);
        });
    }

    /// Returns the worker running on this thread; null if this is
    /// not a worker thread.
    #[inline]
    pub(crate) fn current() -> *const WorkerThread {
        WORKER_THREAD_STATE.with(Cell::get)
    }

    /// Returns the current worker if it belongs to `registry`.
    pub(crate) fn current_in<'a>(registry: &Registry) -> Option<&'a WorkerThread> {
        let worker_thread = WorkerThread::current();
        // SAFETY: The pointer is only set by `main_loop`, which keeps the
        // worker alive until the thread exits.
        unsafe { worker_thread.as_ref() }.filter(|thread| thread.registry.id() == registry.id())
    }

    /// Returns the registry of the pool the calling thread works for, or
    /// `None` outside of a worker.
    pub fn current_registry() -> Option<Arc<Registry>> {
        // SAFETY: See `current_in`.
        unsafe { WorkerThread::current().as_ref() }.map(|thread| Arc::clone(&thread.registry))
    }

    /// Returns the registry of the pool the worker belongs to.
    #[inline]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the unique index of the thread within the pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Executes a job. A panicking job is logged and does not take the worker
    /// down with it.
    #[inline]
    pub fn execute(&self, job: JobRef) {
        // SAFETY: A job is popped before it runs, so it runs once. Scoped
        // jobs are kept valid by their scope until they have run.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { job.run() }));
        if let Err(payload) = outcome {
            warn!(
                pool = self.registry.id(),
                worker = self.index,
                panic = %panic_message(payload.as_ref()),
                "job panicked"
            );
        }
    }

    /// Runs queued jobs until `latch` opens, sleeping whenever the queue is
    /// empty.
    #[inline]
    pub fn run_until<L: Probe>(&self, latch: &L) {
        if !latch.probe() {
            self.run_until_cold(latch);
        }
    }

    #[cold]
    fn run_until_cold<L: Probe>(&self, latch: &L) {
        while !latch.probe() {
            if let Some(job) = self.registry.pop() {
                self.execute(job);
                continue;
            }

            let control = &self.registry.threads[self.index];
            let mut is_sleeping = control.is_sleeping.lock();

            // Jobs are pushed before the pusher takes this lock to wake us, so
            // checking the queue under the lock cannot miss a wakeup.
            if latch.probe() || !self.registry.queue.is_empty() {
                continue;
            }

            *is_sleeping = true;
            while *is_sleeping {
                control.awakened.wait(&mut is_sleeping);
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Main worker loop

/// This is the main loop for a worker thread. It executes jobs until the pool
/// shuts down, then drains whatever is still queued before exiting.
///
/// # Safety
///
/// This must be the first thing run on a freshly spawned thread.
unsafe fn main_loop(registry: Arc<Registry>, index: usize) {
    let worker_thread = WorkerThread {
        registry: Arc::clone(&registry),
        index,
    };

    // SAFETY: This function is the only thing that has been run on this
    // thread, and `worker_thread` lives until the thread exits.
    unsafe {
        worker_thread.set_current();
    }

    let control = &registry.threads[index];
    control.post_ready_status();

    worker_thread.run_until(&control.should_terminate);

    // Submitted work always runs to completion, even after shutdown.
    while let Some(job) = registry.pop() {
        worker_thread.execute(job);
    }

    registry.state.running_threads.fetch_sub(1, Ordering::AcqRel);
    control.post_termination_status();

    WORKER_THREAD_STATE.with(|t| t.set(ptr::null()));
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    };

    use super::*;

    #[test]
    fn spawned_jobs_run_on_named_workers() {
        let pool = Builder::new()
            .num_threads(2)
            .thread_name(|index| format!("unit-{index}"))
            .build()
            .unwrap();
        let (sender, receiver) = mpsc::channel();
        pool.spawn(move || {
            let name = thread::current().name().map(str::to_owned);
            sender.send(name).unwrap();
        })
        .unwrap();
        let name = receiver.recv().unwrap().unwrap();
        assert!(name.starts_with("unit-"));
    }

    #[test]
    fn shutdown_drains_queue_then_terminates() {
        let pool = Builder::new().num_threads(1).build().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        pool.shutdown();
        pool.await_termination();
        assert!(pool.is_terminated());
        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert!(matches!(pool.spawn(|| {}), Err(Error::Rejected)));
    }

    #[test]
    fn worker_survives_panicking_job() {
        let pool = Builder::new().num_threads(1).build().unwrap();
        pool.spawn(|| panic!("job failure")).unwrap();
        let (sender, receiver) = mpsc::channel();
        pool.spawn(move || sender.send(7).unwrap()).unwrap();
        assert_eq!(receiver.recv().unwrap(), 7);
    }

    #[test]
    fn scope_joins_borrowed_jobs() {
        let pool = Builder::new().num_threads(3).build().unwrap();
        let counter = AtomicUsize::new(0);
        pool.scope(|scope| {
            for _ in 0..10 {
                scope
                    .spawn(|_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn nested_scope_on_single_worker_does_not_deadlock() {
        let pool = Arc::new(Builder::new().num_threads(1).build().unwrap());
        let (sender, receiver) = mpsc::channel();
        let inner = Arc::clone(&pool);
        pool.spawn(move || {
            let counter = AtomicUsize::new(0);
            inner.scope(|scope| {
                for _ in 0..4 {
                    scope
                        .spawn(|_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                        })
                        .unwrap();
                }
            });
            sender.send(counter.load(Ordering::SeqCst)).unwrap();
        })
        .unwrap();
        assert_eq!(receiver.recv().unwrap(), 4);
    }

    #[test]
    fn spawn_future_completes() {
        let pool = Builder::new().num_threads(1).build().unwrap();
        let task = pool.spawn_future(async { 40 + 2 }).unwrap();
        while !task.is_finished() {
            thread::yield_now();
        }
        assert!(task.is_finished());
    }
}
