//! Conditional evaluation.

use std::fmt;

use crate::{computation::Computation, error::Result};

/// Chooses between two functions of a shared input.
///
/// On every call the input is evaluated exactly once. That single value is
/// tested by the condition and then handed to whichever branch runs.
///
/// ```
/// use deferred::prelude::*;
///
/// let sign = Ternary::new(
///     Constant(-4),
///     |n: &i32| Ok(*n >= 0),
///     |n: i32| Ok(format!("+{n}")),
///     |n: i32| Ok(format!("{n}")),
/// );
/// assert_eq!(sign.value().unwrap(), "-4");
/// ```
pub struct Ternary<I, P, A, B> {
    input: I,
    condition: P,
    consequent: A,
    alternative: B,
}

impl<I, P, A, B, Y> Ternary<I, P, A, B>
where
    I: Computation,
    P: Fn(&I::Output) -> Result<bool>,
    A: Fn(I::Output) -> Result<Y>,
    B: Fn(I::Output) -> Result<Y>,
{
    pub fn new(input: I, condition: P, consequent: A, alternative: B) -> Self {
        Self {
            input,
            condition,
            consequent,
            alternative,
        }
    }
}

impl<I, P, A, B, Y> Computation for Ternary<I, P, A, B>
where
    I: Computation,
    P: Fn(&I::Output) -> Result<bool>,
    A: Fn(I::Output) -> Result<Y>,
    B: Fn(I::Output) -> Result<Y>,
{
    type Output = Y;

    fn value(&self) -> Result<Y> {
        let input = self.input.value()?;
        if (self.condition)(&input)? {
            (self.consequent)(input)
        } else {
            (self.alternative)(input)
        }
    }
}

impl<I: fmt::Debug, P, A, B> fmt::Debug for Ternary<I, P, A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ternary")
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

/// Chooses between two computations by a boolean computation. Only the chosen
/// branch runs.
#[derive(Debug, Clone)]
pub struct Branch<C, A, B> {
    condition: C,
    consequent: A,
    alternative: B,
}

/// Builds a [`Branch`].
pub fn branch<C, A, B>(condition: C, consequent: A, alternative: B) -> Branch<C, A, B>
where
    C: Computation<Output = bool>,
    A: Computation,
    B: Computation<Output = A::Output>,
{
    Branch {
        condition,
        consequent,
        alternative,
    }
}

impl<C, A, B> Computation for Branch<C, A, B>
where
    C: Computation<Output = bool>,
    A: Computation,
    B: Computation<Output = A::Output>,
{
    type Output = A::Output;

    fn value(&self) -> Result<A::Output> {
        if self.condition.value()? {
            self.consequent.value()
        } else {
            self.alternative.value()
        }
    }
}

/// Runs a side effect when a condition holds, and yields the condition.
pub struct Binary<C, F> {
    condition: C,
    consequent: F,
}

impl<C, F> Binary<C, F>
where
    C: Computation<Output = bool>,
    F: Fn() -> Result<()>,
{
    pub fn new(condition: C, consequent: F) -> Self {
        Self {
            condition,
            consequent,
        }
    }
}

impl<C, F> Computation for Binary<C, F>
where
    C: Computation<Output = bool>,
    F: Fn() -> Result<()>,
{
    type Output = bool;

    fn value(&self) -> Result<bool> {
        let holds = self.condition.value()?;
        if holds {
            (self.consequent)()?;
        }
        Ok(holds)
    }
}

impl<C: fmt::Debug, F> fmt::Debug for Binary<C, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binary")
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}
