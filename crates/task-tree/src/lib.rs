//! Behavior tree engine where every node runs as its own polled task.
//!
//! A tree is built from a few composable nodes and executed by wrapping its
//! root in a [`TaskRunner`]. The runner submits the node to a [`WorkerPool`]
//! and the caller polls it with a timeout until it reports a terminal
//! [`Status`]. Composites drive their children the same way, so the whole tree
//! runs as nested runners polling each other.
//!
//! - **Non-blocking observation**: `poll` waits at most the given timeout
//! - **Cascading cancellation**: aborting a runner cancels whatever child its
//!   node is currently driving, and every interrupted node is cleaned up once
//! - **Errors as values**: a node's error is captured by its runner and either
//!   reported as `Failure` or propagated, at the caller's choice
//!
//! # Architecture
//!
//! - [`Node`]: Core trait for all nodes (prepare / advance / cleanup)
//! - [`Status`]: Running, Success or Failure
//! - Leaf node: [`Action`]
//! - Decorator node: [`ConditionalBranch`]
//! - Composite nodes: [`Sequence`], [`RepeatingSequence`]
//! - Execution: [`TaskRunner`] on a [`WorkerPool`]
//!
//! # Example
//!
//! ```rust,ignore
//! use task_tree::builder::{action, branch_else, sequence};
//! use task_tree::{TaskRunner, WorkerPool};
//!
//! let tree = sequence(vec![
//!     action(|| open_door()),
//!     branch_else(|| is_dark(), action(|| turn_on_light()), action(|| look_around())),
//! ]);
//! let mut runner = TaskRunner::new(tree, WorkerPool::current()?);
//! let status = runner.run().await?;
//! ```

pub mod action;
pub mod builder;
pub mod composite;
pub mod config;
pub mod decorator;
pub mod error;
pub mod node;
pub mod pool;
pub mod runner;
pub mod status;

// Re-export core types for ergonomic API
pub use action::{Action, Operation};
pub use composite::{RepeatBound, RepeatingSequence, Sequence, TickHook, UNBOUNDED};
pub use config::EngineConfig;
pub use decorator::{ConditionalBranch, Predicate};
pub use error::{BoxError, ConfigError, TreeError};
pub use node::{Node, SharedNode, same_node, shared, try_replace_child};
pub use pool::WorkerPool;
pub use runner::TaskRunner;
pub use status::Status;
