//! Running the same work a fixed number of times.

use std::fmt;

use crate::{
    computation::{Computation, Procedure},
    error::{Error, Result},
};

/// Evaluates a computation `count` times and yields the last value.
///
/// Every repetition must succeed; the first failure stops the run. A count of
/// zero or less fails with [`Error::NonPositiveCount`] without evaluating
/// anything.
#[derive(Debug, Clone)]
pub struct Repeated<C> {
    origin: C,
    count: i64,
}

impl<C: Computation> Repeated<C> {
    pub fn new(origin: C, count: i64) -> Self {
        Self { origin, count }
    }
}

impl<C: Computation> Computation for Repeated<C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        if self.count <= 0 {
            return Err(Error::NonPositiveCount(self.count).into());
        }
        let mut last = self.origin.value()?;
        for _ in 1..self.count {
            last = self.origin.value()?;
        }
        Ok(last)
    }
}

/// Runs a procedure `count` times, each time on a clone of the input.
pub struct RepeatedProc<P> {
    origin: P,
    count: i64,
}

impl<P> RepeatedProc<P> {
    pub fn new(origin: P, count: i64) -> Self {
        Self { origin, count }
    }
}

impl<X, P> Procedure<X> for RepeatedProc<P>
where
    X: Clone,
    P: Procedure<X>,
{
    fn exec(&self, input: X) -> Result<()> {
        if self.count <= 0 {
            return Err(Error::NonPositiveCount(self.count).into());
        }
        for _ in 1..self.count {
            self.origin.exec(input.clone())?;
        }
        self.origin.exec(input)
    }
}

impl<P> fmt::Debug for RepeatedProc<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatedProc")
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
