//! Error types raised while assembling and executing trees.
//!
//! Two tiers exist. [`ConfigError`] marks a programming error in how a tree or
//! runner was put together; it is raised at the offending call and never
//! retried. [`TreeError`] is what a running node produces; runners capture it
//! and surface it either as a plain `Failure` or as an error, at the caller's
//! choice.
use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by fallible leaf operations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, TreeError>;

/// Fatal configuration and usage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("action has no operation defined")]
    MissingOperation,

    #[error("conditional branch has no predicate defined")]
    MissingPredicate,

    #[error("conditional branch has no success child defined")]
    MissingSuccessChild,

    #[error("repeat bound must be positive or UNBOUNDED, got {0}")]
    InvalidRepeatBound(i64),

    #[error("repeat requires a condition when the condition must succeed")]
    MissingCondition,

    #[error("children of a running composite cannot be replaced")]
    CompositeRunning,

    #[error("node is not a child of this composite")]
    ChildNotFound,

    #[error("runner has not been started")]
    RunnerNotStarted,

    #[error("worker pool requires a tokio runtime")]
    NoRuntime,
}

/// Errors raised by a node while it executes.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("operation raised an error")]
    Operation(#[source] BoxError),

    #[error("child node failed")]
    Child(#[source] Arc<TreeError>),

    #[error("node panicked: {0}")]
    Panicked(String),

    #[error("node advance returned without reaching a terminal status")]
    Unfinished,

    #[error("worker pool has been drained and is not accepting work")]
    PoolShutdown,
}

impl TreeError {
    /// Returns `true` if this error, or the child error it wraps, comes from a
    /// misconfigured tree rather than from a node's work.
    pub fn is_fatal(&self) -> bool {
        match self {
            TreeError::Config(_) => true,
            TreeError::Child(inner) => inner.is_fatal(),
            _ => false,
        }
    }

    /// Returns `true` if the error was raised by the node itself rather than
    /// passed up from one of its children.
    pub fn is_origin(&self) -> bool {
        !matches!(self, TreeError::Child(_))
    }

    /// Follows `Child` wrappers down to the error that was originally raised.
    pub fn root_cause(&self) -> &TreeError {
        match self {
            TreeError::Child(inner) => inner.root_cause(),
            other => other,
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
