//! Parallel evaluation on a worker pool.
//!
//! Every child runs as its own task. The caller blocks until all of them have
//! finished, and only then are the results combined: a `false` or a failure
//! does not stop the siblings that are already submitted.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    computation::{Computation, Procedure},
    error::{panic_message, Error, Failure, Result},
    executor::{Executor, Release},
    logic::{apply_over, Applied},
};

/// Runs `tasks` in parallel and combines their outcomes with logical AND.
///
/// Outcomes are read in submission order once every task has finished. The
/// first failure in that order is returned as [`Error::Aggregate`]; the
/// failures after it only contribute to the count.
fn join_all<'a, T>(executor: &Executor<'_>, tasks: Vec<T>) -> Result<bool>
where
    T: FnOnce() -> Result<bool> + Send + 'a,
{
    if tasks.is_empty() {
        return Ok(true);
    }

    let pool = executor.acquire(tasks.len(), Release::Join)?;
    let slots: Vec<Mutex<Option<Result<bool>>>> = tasks.iter().map(|_| Mutex::new(None)).collect();
    trace!(
        pool = pool.id(),
        tasks = tasks.len(),
        owned = pool.is_owned(),
        "submitting tasks"
    );

    pool.scope(|scope| -> Result<(), Error> {
        for (task, slot) in tasks.into_iter().zip(&slots) {
            scope.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                    Err(Error::Panicked(panic_message(&*payload)).into())
                });
                *slot.lock() = Some(outcome);
            })?;
        }
        Ok(())
    })?;
    trace!(pool = pool.id(), "tasks joined");
    drop(pool);

    let mut verdict = true;
    let mut failed = 0;
    let mut first: Option<(usize, Failure)> = None;
    for (index, slot) in slots.into_iter().enumerate() {
        match slot.into_inner() {
            Some(Ok(holds)) => verdict &= holds,
            Some(Err(failure)) => {
                failed += 1;
                first.get_or_insert((index, failure));
            }
            None => {
                failed += 1;
                first.get_or_insert((index, Error::Rejected.into()));
            }
        }
    }

    match first {
        None => Ok(verdict),
        Some((index, source)) => Err(Error::Aggregate {
            index,
            failed,
            source,
        }
        .into()),
    }
}

// -----------------------------------------------------------------------------
// AndInThreads

/// Logical conjunction of children evaluated in parallel.
///
/// Unlike [`And`](crate::logic::And) this never short-circuits: every child
/// runs to completion before the result is decided. An empty set of children
/// is `true` and never touches the executor.
///
/// With an owned executor, a pool of at most one worker per child is created
/// for each evaluation and joined before `value` returns, whatever the
/// outcome.
///
/// ```
/// use deferred::prelude::*;
///
/// let pool = ThreadPool::new().unwrap();
/// let all_short = AndInThreads::over(
///     |word: &&str| Ok(word.len() < 8),
///     vec!["one", "two", "three"],
///     Executor::borrowed(&pool),
/// );
/// assert!(all_short.value().unwrap());
/// assert!(!pool.is_shutdown());
/// ```
#[derive(Debug)]
pub struct AndInThreads<'p, C> {
    children: Vec<C>,
    executor: Executor<'p>,
}

impl<'p, C> AndInThreads<'p, C>
where
    C: Computation<Output = bool> + Sync,
{
    pub fn new(children: impl IntoIterator<Item = C>, executor: Executor<'p>) -> Self {
        Self {
            children: children.into_iter().collect(),
            executor,
        }
    }
}

impl<'p, X, F> AndInThreads<'p, Applied<X, F>>
where
    X: Send + Sync,
    F: Fn(&X) -> Result<bool> + Send + Sync,
{
    /// Tests every item with one predicate, one task per item.
    pub fn over(predicate: F, items: impl IntoIterator<Item = X>, executor: Executor<'p>) -> Self {
        Self::new(apply_over(predicate, items), executor)
    }
}

impl<C> Computation for AndInThreads<'_, C>
where
    C: Computation<Output = bool> + Sync,
{
    type Output = bool;

    fn value(&self) -> Result<bool> {
        let tasks = self
            .children
            .iter()
            .map(|child| move || child.value())
            .collect();
        join_all(&self.executor, tasks)
    }
}

// -----------------------------------------------------------------------------
// ForEachInThreads

/// Runs a procedure on every item of a collection in parallel.
///
/// Returns once every call has finished. There is no ordering between the
/// calls; if any of them failed, the first failure in input order is returned.
#[derive(Debug)]
pub struct ForEachInThreads<'p, P> {
    procedure: P,
    executor: Executor<'p>,
}

impl<'p, P> ForEachInThreads<'p, P> {
    pub fn new(procedure: P, executor: Executor<'p>) -> Self {
        Self {
            procedure,
            executor,
        }
    }
}

impl<X, P> Procedure<Vec<X>> for ForEachInThreads<'_, P>
where
    X: Send,
    P: Procedure<X> + Sync,
{
    fn exec(&self, items: Vec<X>) -> Result<()> {
        let procedure = &self.procedure;
        let tasks = items
            .into_iter()
            .map(|item| move || procedure.exec(item).map(|()| true))
            .collect();
        join_all(&self.executor, tasks).map(|_| ())
    }
}
