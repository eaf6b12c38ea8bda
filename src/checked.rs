//! Adapters that narrow a computation's failure to one error kind.
//!
//! All of them share one rule: a failure that already is the target kind is
//! passed through untouched, anything else is wrapped exactly once.

use std::{error::Error as StdError, fmt, io};

use crate::{
    computation::{BiProcedure, Computation},
    error::{Failure, Result, UncheckedFailure},
};

/// Maps a failure into `E`, leaving it untouched if it already is an `E`.
pub fn narrow<E, W>(failure: Failure, wrap: &W) -> E
where
    E: StdError + Send + Sync + 'static,
    W: Fn(Failure) -> E,
{
    match failure.downcast::<E>() {
        Ok(same) => same,
        Err(other) => wrap(other),
    }
}

/// A computation whose failures are narrowed to `E` by a wrapping function.
pub struct Checked<C, W> {
    origin: C,
    wrap: W,
}

impl<C, W> Checked<C, W> {
    pub fn new(origin: C, wrap: W) -> Self {
        Self { origin, wrap }
    }
}

impl<C, W, E> Checked<C, W>
where
    C: Computation,
    E: StdError + Send + Sync + 'static,
    W: Fn(Failure) -> E,
{
    /// Runs the computation, failing with `E` only.
    pub fn value(&self) -> Result<C::Output, E> {
        self.origin.value().map_err(|failure| narrow(failure, &self.wrap))
    }
}

impl<C, W, E> Computation for Checked<C, W>
where
    C: Computation,
    E: StdError + Send + Sync + 'static,
    W: Fn(Failure) -> E,
{
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        Ok(Checked::value(self)?)
    }
}

impl<C, W> fmt::Debug for Checked<C, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checked").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Unchecked

/// A computation that fails with [`UncheckedFailure`] only.
///
/// ```
/// use deferred::prelude::*;
/// use deferred::error::UncheckedFailure;
///
/// let failing = from_fn(|| -> Result<u8> { Err(UncheckedFailure::new("gone").into()) });
/// let failure = Unchecked::new(failing).value().unwrap_err();
/// assert!(!failure.has_cause());
/// ```
pub struct Unchecked<C>(Checked<C, fn(Failure) -> UncheckedFailure>);

impl<C: Computation> Unchecked<C> {
    pub fn new(origin: C) -> Self {
        Self(Checked::new(
            origin,
            UncheckedFailure::wrap as fn(Failure) -> UncheckedFailure,
        ))
    }

    /// Runs the computation.
    pub fn value(&self) -> Result<C::Output, UncheckedFailure> {
        self.0.value()
    }
}

impl<C: Computation> Computation for Unchecked<C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        Ok(Unchecked::value(self)?)
    }
}

impl<C> fmt::Debug for Unchecked<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unchecked").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// IoChecked

/// A computation that fails with [`std::io::Error`] only.
pub struct IoChecked<C>(Checked<C, fn(Failure) -> io::Error>);

fn io_other(failure: Failure) -> io::Error {
    io::Error::other(failure)
}

impl<C: Computation> IoChecked<C> {
    pub fn new(origin: C) -> Self {
        Self(Checked::new(origin, io_other as fn(Failure) -> io::Error))
    }

    /// Runs the computation.
    pub fn value(&self) -> Result<C::Output, io::Error> {
        self.0.value()
    }
}

impl<C: Computation> Computation for IoChecked<C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        Ok(IoChecked::value(self)?)
    }
}

impl<C> fmt::Debug for IoChecked<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoChecked").finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// CheckedBiProc

/// A two-input procedure whose failures are narrowed to `E`.
pub struct CheckedBiProc<P, W> {
    origin: P,
    wrap: W,
}

impl<P, W> CheckedBiProc<P, W> {
    pub fn new(origin: P, wrap: W) -> Self {
        Self { origin, wrap }
    }

    /// Runs the procedure, failing with `E` only.
    pub fn exec<X, Y, E>(&self, first: X, second: Y) -> Result<(), E>
    where
        P: BiProcedure<X, Y>,
        E: StdError + Send + Sync + 'static,
        W: Fn(Failure) -> E,
    {
        self.origin
            .exec(first, second)
            .map_err(|failure| narrow(failure, &self.wrap))
    }
}

impl<P, W> fmt::Debug for CheckedBiProc<P, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedBiProc").finish_non_exhaustive()
    }
}
