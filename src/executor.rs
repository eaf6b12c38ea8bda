//! Where concurrent work runs, and who is responsible for shutting it down.
//!
//! Every concurrent component takes an [`Executor`]. A borrowed pool belongs
//! to the caller and is never shut down by this crate. An owned pool is
//! created for a single call from a [`Builder`] and released through a guard,
//! so it is shut down on every exit path.

use std::ops::Deref;

use tracing::debug;

use crate::{
    error::Error,
    thread_pool::{Builder, ThreadPool},
};

/// The pool a concurrent component runs on.
#[derive(Debug, Clone)]
pub enum Executor<'p> {
    /// A caller-owned pool. It is used as-is and stays open afterwards.
    Borrowed(&'p ThreadPool),
    /// A pool created for each call from this configuration and shut down
    /// when the call is done with it.
    Owned(Builder),
}

impl<'p> Executor<'p> {
    /// Runs on a caller-owned pool.
    pub fn borrowed(pool: &'p ThreadPool) -> Executor<'p> {
        Executor::Borrowed(pool)
    }

    /// Runs on a pool created per call with default settings.
    pub fn owned() -> Executor<'static> {
        Executor::Owned(Builder::new())
    }

    /// Runs on a pool created per call whose workers are named by `naming`.
    pub fn named<F>(naming: F) -> Executor<'static>
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        Executor::Owned(Builder::new().thread_name(naming))
    }

    /// Returns `true` if each call creates and releases its own pool.
    pub fn is_owned(&self) -> bool {
        matches!(self, Executor::Owned(_))
    }

    /// Provides a pool for one call. An owned pool gets at most `max_threads`
    /// workers; borrowed pools are returned untouched.
    pub(crate) fn acquire(
        &self,
        max_threads: usize,
        release: Release,
    ) -> Result<Pool<'p>, Error> {
        match self {
            Executor::Borrowed(pool) => Ok(Pool::Borrowed(pool)),
            Executor::Owned(builder) => {
                let num_threads = builder.resolved_threads().min(max_threads.max(1));
                let pool = builder.clone().num_threads(num_threads).build()?;
                Ok(Pool::Owned(OwnedPool { pool, release }))
            }
        }
    }
}

/// How an owned pool is let go when its guard drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Release {
    /// Shut down and wait for every worker to exit.
    Join,
    /// Shut down without waiting; workers exit once their queue is drained.
    Detach,
}

/// A pool acquired for the duration of one call.
pub(crate) enum Pool<'p> {
    Borrowed(&'p ThreadPool),
    Owned(OwnedPool),
}

impl Pool<'_> {
    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Pool::Owned(_))
    }
}

impl Deref for Pool<'_> {
    type Target = ThreadPool;

    fn deref(&self) -> &ThreadPool {
        match self {
            Pool::Borrowed(pool) => pool,
            Pool::Owned(owned) => &owned.pool,
        }
    }
}

/// Releases an owned pool when dropped.
pub(crate) struct OwnedPool {
    pool: ThreadPool,
    release: Release,
}

impl Drop for OwnedPool {
    fn drop(&mut self) {
        self.pool.shutdown();
        if self.release == Release::Join {
            self.pool.await_termination();
        }
        debug!(pool = self.pool.id(), release = ?self.release, "owned pool released");
    }
}
