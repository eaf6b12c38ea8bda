//! The contract every unit of work implements, and the leaf computations the
//! combinators are built from.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::error::Result;

// -----------------------------------------------------------------------------
// Contracts

/// A zero-argument unit of work that produces a value or fails.
///
/// Nothing runs until [`Computation::value`] is called, and every call runs
/// the work again. Wrap a computation in [`Sticky`] to cache its value.
pub trait Computation {
    /// The value produced on success.
    type Output;

    /// Runs the computation.
    fn value(&self) -> Result<Self::Output>;
}

impl<C: Computation + ?Sized> Computation for &C {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        (**self).value()
    }
}

impl<C: Computation + ?Sized> Computation for Box<C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        (**self).value()
    }
}

impl<C: Computation + ?Sized> Computation for Arc<C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        (**self).value()
    }
}

/// A computation of a boolean, boxed so that differently typed children can
/// share one collection.
pub type BoxedCondition<'a> = Box<dyn Computation<Output = bool> + Send + Sync + 'a>;

/// A side effect taking one input.
pub trait Procedure<X> {
    /// Runs the side effect.
    fn exec(&self, input: X) -> Result<()>;
}

impl<X, F> Procedure<X> for F
where
    F: Fn(X) -> Result<()>,
{
    fn exec(&self, input: X) -> Result<()> {
        self(input)
    }
}

/// A side effect taking two inputs.
pub trait BiProcedure<X, Y> {
    /// Runs the side effect.
    fn exec(&self, first: X, second: Y) -> Result<()>;
}

impl<X, Y, F> BiProcedure<X, Y> for F
where
    F: Fn(X, Y) -> Result<()>,
{
    fn exec(&self, first: X, second: Y) -> Result<()> {
        self(first, second)
    }
}

// -----------------------------------------------------------------------------
// Leaves

/// A computation backed by a closure. Built with [`from_fn`].
#[derive(Clone)]
pub struct FromFn<F>(F);

/// Turns a closure into a [`Computation`].
///
/// ```
/// use deferred::prelude::*;
///
/// let answer = from_fn(|| Ok(6 * 7));
/// assert_eq!(answer.value().unwrap(), 42);
/// ```
pub fn from_fn<T, F>(f: F) -> FromFn<F>
where
    F: Fn() -> Result<T>,
{
    FromFn(f)
}

impl<T, F> Computation for FromFn<F>
where
    F: Fn() -> Result<T>,
{
    type Output = T;

    fn value(&self) -> Result<T> {
        (self.0)()
    }
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FromFn(..)")
    }
}

/// A computation that always yields a clone of the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant<T>(pub T);

impl<T: Clone> Computation for Constant<T> {
    type Output = T;

    fn value(&self) -> Result<T> {
        Ok(self.0.clone())
    }
}

/// Always `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct True;

impl Computation for True {
    type Output = bool;

    fn value(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Always `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct False;

impl Computation for False {
    type Output = bool;

    fn value(&self) -> Result<bool> {
        Ok(false)
    }
}

// -----------------------------------------------------------------------------
// Caching

/// Caches the first successful value of a computation.
///
/// Later calls return clones of the cached value without running the inner
/// computation. A failure is not cached, so the next call tries again.
/// Concurrent first calls are serialized, and the inner computation runs
/// exactly once on success.
pub struct Sticky<C: Computation> {
    inner: C,
    cache: Mutex<Option<C::Output>>,
}

impl<C: Computation> Sticky<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: Mutex::new(None),
        }
    }
}

impl<C> Computation for Sticky<C>
where
    C: Computation,
    C::Output: Clone,
{
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        let mut cache = self.cache.lock();
        if let Some(value) = cache.as_ref() {
            return Ok(value.clone());
        }
        let value = self.inner.value()?;
        *cache = Some(value.clone());
        Ok(value)
    }
}

impl<C: Computation> fmt::Debug for Sticky<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sticky")
            .field("cached", &self.cache.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn sticky_runs_inner_once() {
        let calls = AtomicUsize::new(0);
        let sticky = Sticky::new(from_fn(|| Ok(calls.fetch_add(1, Ordering::SeqCst))));
        assert_eq!(sticky.value().unwrap(), 0);
        assert_eq!(sticky.value().unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sticky_does_not_cache_failures() {
        let calls = AtomicUsize::new(0);
        let sticky = Sticky::new(from_fn(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("not yet"))
            } else {
                Ok("ready")
            }
        }));
        assert!(sticky.value().is_err());
        assert_eq!(sticky.value().unwrap(), "ready");
        assert_eq!(sticky.value().unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closures_are_procedures() {
        let seen = AtomicUsize::new(0);
        let record = |n: usize| -> Result<()> {
            seen.fetch_add(n, Ordering::SeqCst);
            Ok(())
        };
        Procedure::exec(&record, 3).unwrap();
        let pair = |a: usize, b: usize| -> Result<()> { Procedure::exec(&record, a * b) };
        BiProcedure::exec(&pair, 2, 5).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 13);
    }
}
