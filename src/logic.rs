//! Short-circuit boolean combinators.
//!
//! Children are evaluated on the caller's thread, strictly left to right, and
//! evaluation stops as soon as the outcome is known. Children after that point
//! never run.

use std::{fmt, sync::Arc};

use crate::{computation::Computation, error::Result};

// -----------------------------------------------------------------------------
// Applied

/// A function bound to one input, evaluated as a computation.
///
/// Both halves sit behind an `Arc`, so one function can be bound to many
/// inputs, or one input tested by many functions, without cloning either.
pub struct Applied<X, F> {
    input: Arc<X>,
    func: Arc<F>,
}

impl<X, F> Applied<X, F> {
    pub fn new(input: Arc<X>, func: Arc<F>) -> Self {
        Self { input, func }
    }
}

impl<X, Y, F> Computation for Applied<X, F>
where
    F: Fn(&X) -> Result<Y>,
{
    type Output = Y;

    fn value(&self) -> Result<Y> {
        (self.func)(&self.input)
    }
}

impl<X, F> Clone for Applied<X, F> {
    fn clone(&self) -> Self {
        Self {
            input: Arc::clone(&self.input),
            func: Arc::clone(&self.func),
        }
    }
}

impl<X: fmt::Debug, F> fmt::Debug for Applied<X, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applied")
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Binds one shared function to every item.
pub(crate) fn apply_over<X, F, I>(func: F, items: I) -> Vec<Applied<X, F>>
where
    I: IntoIterator<Item = X>,
{
    let func = Arc::new(func);
    items
        .into_iter()
        .map(|item| Applied::new(Arc::new(item), Arc::clone(&func)))
        .collect()
}

/// Binds one shared input to every function.
pub(crate) fn apply_each<X, F, I>(input: X, funcs: I) -> Vec<Applied<X, F>>
where
    I: IntoIterator<Item = F>,
{
    let input = Arc::new(input);
    funcs
        .into_iter()
        .map(|func| Applied::new(Arc::clone(&input), Arc::new(func)))
        .collect()
}

// -----------------------------------------------------------------------------
// And

/// Logical conjunction of its children.
///
/// Stops at the first `false`. An empty conjunction is `true`.
///
/// ```
/// use deferred::prelude::*;
///
/// let all_even = And::over(|n: &u32| Ok(n % 2 == 0), [2, 4, 6]);
/// assert!(all_even.value().unwrap());
/// assert!(And::<True>::new([]).value().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct And<C> {
    children: Vec<C>,
}

impl<C> And<C>
where
    C: Computation<Output = bool>,
{
    pub fn new(children: impl IntoIterator<Item = C>) -> Self {
        Self {
            children: children.into_iter().collect(),
        }
    }
}

impl<X, F> And<Applied<X, F>>
where
    F: Fn(&X) -> Result<bool>,
{
    /// Tests every item with one predicate.
    pub fn over(predicate: F, items: impl IntoIterator<Item = X>) -> Self {
        Self::new(apply_over(predicate, items))
    }

    /// Tests one input with every predicate.
    pub fn each(input: X, predicates: impl IntoIterator<Item = F>) -> Self {
        Self::new(apply_each(input, predicates))
    }
}

impl<C> Computation for And<C>
where
    C: Computation<Output = bool>,
{
    type Output = bool;

    fn value(&self) -> Result<bool> {
        for child in &self.children {
            if !child.value()? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

// -----------------------------------------------------------------------------
// Or

/// Logical disjunction of its children.
///
/// Stops at the first `true`. An empty disjunction is `false`.
#[derive(Debug, Clone)]
pub struct Or<C> {
    children: Vec<C>,
}

impl<C> Or<C>
where
    C: Computation<Output = bool>,
{
    pub fn new(children: impl IntoIterator<Item = C>) -> Self {
        Self {
            children: children.into_iter().collect(),
        }
    }
}

impl<X, F> Or<Applied<X, F>>
where
    F: Fn(&X) -> Result<bool>,
{
    /// Tests every item with one predicate.
    pub fn over(predicate: F, items: impl IntoIterator<Item = X>) -> Self {
        Self::new(apply_over(predicate, items))
    }

    /// Tests one input with every predicate.
    pub fn each(input: X, predicates: impl IntoIterator<Item = F>) -> Self {
        Self::new(apply_each(input, predicates))
    }
}

impl<C> Computation for Or<C>
where
    C: Computation<Output = bool>,
{
    type Output = bool;

    fn value(&self) -> Result<bool> {
        for child in &self.children {
            if child.value()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;
    use crate::computation::{from_fn, BoxedCondition, False, True};

    #[test]
    fn or_stops_at_first_true() {
        let calls = &AtomicUsize::new(0);
        let counted = move |outcome: bool| {
            from_fn(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(outcome)
            })
        };
        let any = Or::new([counted(false), counted(true), counted(false)]);
        assert!(any.value().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_or_is_false() {
        assert!(!Or::<False>::new([]).value().unwrap());
    }

    #[test]
    fn failure_stops_evaluation() {
        let reached = AtomicUsize::new(0);
        let children: Vec<BoxedCondition<'_>> = vec![
            Box::new(True),
            Box::new(from_fn(|| -> Result<bool> { Err(anyhow!("broken")) })),
            Box::new(from_fn(|| {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })),
        ];
        let failure = And::new(children).value().unwrap_err();
        assert_eq!(failure.to_string(), "broken");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn each_tests_one_input() {
        let checks: Vec<Box<dyn Fn(&&str) -> Result<bool>>> = vec![
            Box::new(|s| Ok(s.starts_with('d'))),
            Box::new(|s| Ok(s.len() == 8)),
        ];
        assert!(And::each("deferred", checks).value().unwrap());
        let bounds: [fn(&i32) -> Result<bool>; 2] = [|n| Ok(*n > 5), |n| Ok(*n < 0)];
        assert!(!Or::each(3, bounds).value().unwrap());
    }
}
