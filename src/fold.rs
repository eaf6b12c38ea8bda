//! Left folds over sequences.

use std::fmt;

use crate::{
    computation::{Computation, Constant},
    error::{Error, Result},
};

/// Combines a sequence of computations from left to right without a seed.
///
/// Each child is evaluated when its turn comes. A single child is returned
/// unreduced, and an empty sequence fails with [`Error::EmptyReduction`].
/// Use [`Folded`] when an identity value exists.
///
/// ```
/// use deferred::prelude::*;
///
/// let joined = Reduced::of_values(|a: String, b: String| Ok(a + &b), ["One", "Two"].map(String::from));
/// assert_eq!(joined.value().unwrap(), "OneTwo");
/// ```
pub struct Reduced<F, C> {
    combiner: F,
    children: Vec<C>,
}

impl<F, C> Reduced<F, C>
where
    C: Computation,
    F: Fn(C::Output, C::Output) -> Result<C::Output>,
{
    pub fn new(combiner: F, children: impl IntoIterator<Item = C>) -> Self {
        Self {
            combiner,
            children: children.into_iter().collect(),
        }
    }
}

impl<F, T> Reduced<F, Constant<T>>
where
    T: Clone,
    F: Fn(T, T) -> Result<T>,
{
    /// Reduces plain values.
    pub fn of_values(combiner: F, values: impl IntoIterator<Item = T>) -> Self {
        Self::new(combiner, values.into_iter().map(Constant))
    }
}

impl<F, C> Computation for Reduced<F, C>
where
    C: Computation,
    F: Fn(C::Output, C::Output) -> Result<C::Output>,
{
    type Output = C::Output;

    fn value(&self) -> Result<C::Output> {
        let mut children = self.children.iter();
        let first = children.next().ok_or(Error::EmptyReduction)?;
        children.try_fold(first.value()?, |acc, child| {
            (self.combiner)(acc, child.value()?)
        })
    }
}

impl<F, C> fmt::Debug for Reduced<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reduced")
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

/// A left fold with an explicit seed.
///
/// The accumulator and the elements may have different types. An empty source
/// yields a clone of the seed.
///
/// ```
/// use deferred::prelude::*;
///
/// let total = Folded::new(0usize, |acc, word: &&str| Ok(acc + word.len()), vec!["ab", "cde"]);
/// assert_eq!(total.value().unwrap(), 5);
/// ```
pub struct Folded<A, F, X> {
    seed: A,
    accumulator: F,
    source: Vec<X>,
}

impl<A, F, X> Folded<A, F, X>
where
    A: Clone,
    F: Fn(A, &X) -> Result<A>,
{
    pub fn new(seed: A, accumulator: F, source: impl IntoIterator<Item = X>) -> Self {
        Self {
            seed,
            accumulator,
            source: source.into_iter().collect(),
        }
    }
}

impl<A, F, X> Computation for Folded<A, F, X>
where
    A: Clone,
    F: Fn(A, &X) -> Result<A>,
{
    type Output = A;

    fn value(&self) -> Result<A> {
        self.source
            .iter()
            .try_fold(self.seed.clone(), |acc, item| (self.accumulator)(acc, item))
    }
}

impl<A: fmt::Debug, F, X> fmt::Debug for Folded<A, F, X> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Folded")
            .field("seed", &self.seed)
            .field("source", &self.source.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::computation::from_fn;

    #[test]
    fn single_child_is_not_combined() {
        let combined = AtomicUsize::new(0);
        let reduced = Reduced::of_values(
            |a: u32, b: u32| {
                combined.fetch_add(1, Ordering::SeqCst);
                Ok(a + b)
            },
            [7],
        );
        assert_eq!(reduced.value().unwrap(), 7);
        assert_eq!(combined.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_reduction_fails() {
        let reduced = Reduced::of_values(|a: u32, b: u32| Ok(a + b), []);
        let failure = reduced.value().unwrap_err();
        assert!(matches!(
            failure.downcast_ref::<Error>(),
            Some(Error::EmptyReduction)
        ));
    }

    #[test]
    fn children_are_evaluated_lazily() {
        let calls = &AtomicUsize::new(0);
        let child = move || {
            from_fn(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(1u64)
            })
        };
        let reduced = Reduced::new(|a: u64, b: u64| Ok(a + b), [child(), child(), child()]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(reduced.value().unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn empty_fold_yields_seed() {
        let folded = Folded::new(String::from("seed"), |acc, x: &u8| Ok(format!("{acc}{x}")), []);
        assert_eq!(folded.value().unwrap(), "seed");
    }
}
