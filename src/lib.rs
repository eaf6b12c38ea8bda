//! Composable deferred computations.
//!
//! A [`Computation`](computation::Computation) is a unit of work that produces
//! a value or fails. Nothing runs when a computation is built; combinators
//! only wrap smaller computations into bigger ones, and the whole tree runs
//! when [`value`](computation::Computation::value) is called on its root.
//!
//! Most combinators evaluate their children on the caller's thread, left to
//! right, stopping early where the outcome is already known. Two components
//! run work in parallel on a worker pool:
//!
//! * [`AndInThreads`](threads::AndInThreads) evaluates every child as its own
//!   task, joins all of them, and combines the results with logical AND.
//! * [`Async`](background::Async) schedules one computation in the
//!   background and returns a handle right away.
//!
//! Both take an [`Executor`](executor::Executor), which states whether the
//! pool is borrowed from the caller or created and shut down by the component
//! itself.
//!
//! # Failures
//!
//! Failures are [`anyhow::Error`] values, aliased as
//! [`Failure`](error::Failure). The crate's own conditions are variants of
//! [`Error`](error::Error) and can be matched by downcasting. The adapters in
//! [`checked`] narrow a failure to one concrete type, and
//! [`Fallback`](fallback::Fallback) substitutes values for failures of
//! registered types.
//!
//! # Logging
//!
//! Pool lifecycle and task submission are reported through `tracing`. The
//! crate never installs a subscriber.

pub mod background;
pub mod checked;
pub mod computation;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod fold;
pub mod job;
pub mod latch;
pub mod logic;
pub mod repeated;
pub mod scope;
pub mod ternary;
pub mod thread_pool;
pub mod threads;

mod util;

pub mod prelude {
    pub use crate::{
        background::{Async, AsyncHandle},
        checked::{Checked, CheckedBiProc, IoChecked, Unchecked},
        computation::{
            from_fn, BiProcedure, BoxedCondition, Computation, Constant, False, Procedure, Sticky,
            True,
        },
        error::{Error, Failure, Result, UncheckedFailure},
        executor::Executor,
        fallback::Fallback,
        fold::{Folded, Reduced},
        logic::{And, Or},
        repeated::{Repeated, RepeatedProc},
        scope::Scope,
        ternary::{branch, Binary, Ternary},
        thread_pool::{Builder, ThreadPool},
        threads::{AndInThreads, ForEachInThreads},
    };
}
