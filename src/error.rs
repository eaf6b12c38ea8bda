//! Failure types shared by every computation in the crate.
//!
//! A unit of work fails with a [`Failure`], which is an opaque
//! [`anyhow::Error`]. Anything implementing `std::error::Error` converts into
//! it with `?`, and the original type can be recovered with
//! [`Failure::downcast`]. That runtime-type recovery is what the
//! [`Fallback`](crate::fallback::Fallback) and
//! [`Checked`](crate::checked::Checked) adapters are built on.
//!
//! Failures produced by the crate itself are variants of [`Error`].

use std::{error::Error as StdError, io};

use thiserror::Error;

/// The failure of a single unit of work.
pub type Failure = anyhow::Error;

/// Result of evaluating a computation.
pub type Result<T, E = Failure> = std::result::Result<T, E>;

/// Failures raised by the combinators and the worker pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A reduction was asked to fold an empty sequence without a seed.
    #[error("cannot reduce an empty sequence")]
    EmptyReduction,

    /// A repetition count was zero or negative.
    #[error("repetition count must be positive, got {0}")]
    NonPositiveCount(i64),

    /// The pool has been shut down and no longer accepts work.
    #[error("task rejected: the thread pool has been shut down")]
    Rejected,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),

    /// A task panicked while it was running.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// A background task failed. The task's own failure is the source.
    #[error("background task failed: {source}")]
    Background {
        #[source]
        source: Failure,
    },

    /// The first failure observed after joining a set of concurrent tasks.
    ///
    /// `index` is the submission position of the failed task and `failed`
    /// is the total number of tasks that failed. Failures of the other tasks
    /// are dropped.
    #[error("{failed} of the concurrent tasks failed, first at position {index}")]
    Aggregate {
        index: usize,
        failed: usize,
        #[source]
        source: Failure,
    },
}

/// A failure surfaced without asking the caller to handle it locally.
///
/// Produced by [`Unchecked`](crate::checked::Unchecked). A failure that is
/// already an `UncheckedFailure` passes through it as-is, so this type never
/// wraps itself.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UncheckedFailure {
    message: String,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl UncheckedFailure {
    /// Creates a failure with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Wraps a failure once, keeping it as the source.
    pub fn wrap(cause: Failure) -> Self {
        Self {
            message: cause.to_string(),
            cause: Some(cause.into()),
        }
    }

    /// Returns `true` if this failure wraps another one.
    pub fn has_cause(&self) -> bool {
        self.cause.is_some()
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
