//! Recovery from failures of a specific runtime type.

use std::{any::type_name, error::Error as StdError, fmt};

use crate::{
    computation::Computation,
    error::{Failure, Result},
};

/// A recovery for failures of one type.
pub trait Recovery<T> {
    /// Produces a substitute value if `failure` is of the handled type, or
    /// hands the failure back unchanged.
    fn recover(&self, failure: Failure) -> Result<T, Failure>;

    /// The name of the handled failure type, for diagnostics.
    fn handles(&self) -> &'static str;
}

/// Recovers from failures of type `E` with a function of the failure.
pub struct FallbackFrom<E, F> {
    func: F,
    marker: std::marker::PhantomData<fn(E)>,
}

impl<E, F> FallbackFrom<E, F> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            marker: std::marker::PhantomData,
        }
    }
}

impl<T, E, F> Recovery<T> for FallbackFrom<E, F>
where
    E: StdError + Send + Sync + 'static,
    F: Fn(E) -> T,
{
    fn recover(&self, failure: Failure) -> Result<T, Failure> {
        failure.downcast::<E>().map(&self.func)
    }

    fn handles(&self) -> &'static str {
        type_name::<E>()
    }
}

/// A computation paired with an ordered list of recoveries.
///
/// On failure the recoveries are tried in order, and the first one whose type
/// matches the failure produces the value. A failure no recovery matches is
/// returned unchanged.
///
/// ```
/// use std::io;
/// use deferred::prelude::*;
///
/// let read = from_fn(|| -> Result<String> {
///     Err(io::Error::new(io::ErrorKind::NotFound, "missing").into())
/// });
/// let recovered = Fallback::new(read)
///     .on(|_: std::fmt::Error| "format".to_owned())
///     .on(|err: io::Error| format!("io: {err}"));
/// assert_eq!(recovered.value().unwrap(), "io: missing");
/// ```
pub struct Fallback<'a, C: Computation> {
    origin: C,
    recoveries: Vec<Box<dyn Recovery<C::Output> + Send + Sync + 'a>>,
}

impl<'a, C: Computation> Fallback<'a, C> {
    /// Wraps a computation with no recoveries yet.
    pub fn new(origin: C) -> Self {
        Self {
            origin,
            recoveries: Vec::new(),
        }
    }

    /// Adds a recovery for failures of type `E`, tried after the ones added
    /// before it.
    pub fn on<E, F>(mut self, func: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(E) -> C::Output + Send + Sync + 'a,
    {
        self.recoveries.push(Box::new(FallbackFrom::<E, F>::new(func)));
        self
    }

    /// Adds a prepared recovery.
    pub fn with<R>(mut self, recovery: R) -> Self
    where
        R: Recovery<C::Output> + Send + Sync + 'a,
    {
        self.recoveries.push(Box::new(recovery));
        self
    }
}

impl<C: Computation> Computation for Fallback<'_, C> {
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        let mut failure = match self.origin.value() {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };
        for recovery in &self.recoveries {
            match recovery.recover(failure) {
                Ok(value) => return Ok(value),
                Err(unmatched) => failure = unmatched,
            }
        }
        Err(failure)
    }
}

impl<C: Computation> fmt::Debug for Fallback<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fallback")
            .field(
                "handles",
                &self.recoveries.iter().map(|r| r.handles()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
