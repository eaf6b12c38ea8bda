//! One-shot signals the pool and its callers block on.
//!
//! A latch starts closed. Setting it opens it, and whoever waits on it moves
//! on. Setting goes through [`Latch`], checking through [`Probe`].
//!
//! # Safety
//!
//! The thread released by a latch often frees the memory the latch lives in.
//! [`Latch::set`] therefore takes a raw pointer and implementations must not
//! touch `self` after the write that opens the latch.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    sync::Arc,
    task::Wake,
};

use parking_lot::{Condvar, Mutex};

use crate::thread_pool::{Registry, WorkerThread};

/// Opens a latch.
pub trait Latch {
    /// Opens the latch, or counts towards opening it.
    ///
    /// # Safety
    ///
    /// `this` must be valid on entry. It may dangle as soon as the latch is
    /// open, so implementations read everything they need beforehand.
    unsafe fn set(this: *const Self);
}

/// Checks a latch.
pub trait Probe {
    /// Returns `true` once the latch is open.
    fn probe(&self) -> bool;
}

// -----------------------------------------------------------------------------
// Atomic latch

/// A latch that is only ever polled.
#[derive(Default)]
pub struct AtomicLatch {
    open: AtomicBool,
}

impl AtomicLatch {
    #[inline]
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
        }
    }
}

impl Latch for AtomicLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: The store is the last access.
        unsafe { (*this).open.store(true, Ordering::Release) }
    }
}

impl Probe for AtomicLatch {
    #[inline]
    fn probe(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// -----------------------------------------------------------------------------
// Worker latch

/// A latch awaited by a worker that keeps running jobs meanwhile. Opening it
/// wakes that worker in case it went to sleep.
pub struct WorkerLatch {
    open: AtomicLatch,
    registry: Arc<Registry>,
    index: usize,
}

impl WorkerLatch {
    #[inline]
    pub fn new(thread: &WorkerThread) -> WorkerLatch {
        WorkerLatch {
            open: AtomicLatch::new(),
            registry: Arc::clone(thread.registry()),
            index: thread.index(),
        }
    }
}

impl Latch for WorkerLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: The registry and index are taken out before opening. Our
        // own arc keeps the registry alive even if the latch is freed.
        unsafe {
            let registry = Arc::clone(&(*this).registry);
            let index = (*this).index;
            Latch::set(&(*this).open);
            registry.wake_thread(index);
        }
    }
}

impl Probe for WorkerLatch {
    #[inline]
    fn probe(&self) -> bool {
        self.open.probe()
    }
}

// -----------------------------------------------------------------------------
// Lock latch

/// A latch an outside thread blocks on.
#[derive(Default)]
pub struct LockLatch {
    open: Mutex<bool>,
    changed: Condvar,
}

impl LockLatch {
    #[inline]
    pub const fn new() -> LockLatch {
        LockLatch {
            open: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    /// Blocks until the latch is open.
    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
    }

    /// Blocks until the latch is open, then closes it again so it can be
    /// reused for the next wait.
    pub fn wait_and_reset(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
        *open = false;
    }
}

impl Latch for LockLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: A waiter cannot see the latch open, and free it, before the
        // guard is dropped at the end of this block.
        unsafe {
            let mut open = (*this).open.lock();
            *open = true;
            (*this).changed.notify_all();
        }
    }
}

impl Probe for LockLatch {
    #[inline]
    fn probe(&self) -> bool {
        *self.open.lock()
    }
}

// -----------------------------------------------------------------------------
// Count latch

enum Waiter {
    Worker(WorkerLatch),
    Outside(LockLatch),
}

/// Opens after as many sets as its count. Scopes use it to join their jobs.
pub struct CountLatch {
    remaining: AtomicUsize,
    waiter: Waiter,
}

impl CountLatch {
    /// Creates a latch that needs `count` sets. It is awaited by `owner`, or
    /// by a blocked outside thread if `owner` is `None`.
    #[inline]
    pub fn with_count(count: usize, owner: Option<&WorkerThread>) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            waiter: match owner {
                Some(thread) => Waiter::Worker(WorkerLatch::new(thread)),
                None => Waiter::Outside(LockLatch::new()),
            },
        }
    }

    /// Requires one more set before the latch opens.
    #[inline]
    pub fn increment(&self) {
        self.remaining.fetch_add(1, Ordering::Relaxed);
    }

    /// Waits for the latch to open. `owner` must be the one given to
    /// [`CountLatch::with_count`].
    pub fn wait(&self, owner: Option<&WorkerThread>) {
        match &self.waiter {
            Waiter::Outside(latch) => latch.wait(),
            Waiter::Worker(_) => {
                debug_assert!(owner.is_some(), "count latch awaited without its owning worker");
                if let Some(thread) = owner {
                    thread.run_until(self);
                }
            }
        }
    }
}

impl Latch for CountLatch {
    #[inline]
    unsafe fn set(this: *const Self) {
        // SAFETY: Only the last set touches the waiter, and it is the last
        // access.
        unsafe {
            if (*this).remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                match &(*this).waiter {
                    Waiter::Worker(latch) => Latch::set(latch),
                    Waiter::Outside(latch) => Latch::set(latch),
                }
            }
        }
    }
}

impl Probe for CountLatch {
    #[inline]
    fn probe(&self) -> bool {
        match &self.waiter {
            Waiter::Worker(latch) => latch.probe(),
            Waiter::Outside(latch) => latch.probe(),
        }
    }
}

// -----------------------------------------------------------------------------
// Wakers

/// A task waker that sets a latch.
pub struct SetOnWake<L: Latch> {
    latch: L,
}

impl<L: Latch> SetOnWake<L> {
    pub fn new(latch: L) -> Arc<Self> {
        Arc::new(Self { latch })
    }

    pub fn latch(&self) -> &L {
        &self.latch
    }
}

impl<L: Latch> Wake for SetOnWake<L> {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        // SAFETY: The arc keeps the latch alive.
        unsafe { Latch::set(&self.latch) };
    }
}
