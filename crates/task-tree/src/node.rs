//! Core node trait.
//!
//! This module defines the [`Node`] trait, the lifecycle every tree node
//! follows, and [`SharedNode`], the handle through which parents own children
//! and runners execute them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::trace;

use crate::error::{ConfigError, Result, TreeError, panic_message};
use crate::{Status, WorkerPool};

/// A node shared between its parent and the runner currently executing it.
///
/// The mutex is held by the runner's task for the whole lifecycle, so a node
/// can never be driven by two runners at once. Identity is the allocation:
/// compare handles with [`same_node`].
pub type SharedNode = Arc<Mutex<dyn Node>>;

/// Wraps a node into a [`SharedNode`] handle.
pub fn shared<N: Node + 'static>(node: N) -> SharedNode {
    Arc::new(Mutex::new(node))
}

/// Returns `true` if both handles point at the same node.
#[inline]
pub fn same_node(a: &SharedNode, b: &SharedNode) -> bool {
    Arc::ptr_eq(a, b)
}

/// Replaces `old` with `new` among the children of `parent` without waiting
/// for a run to finish.
///
/// # Errors
///
/// - [`ConfigError::CompositeRunning`] while `parent` is held by a runner
/// - [`ConfigError::ChildNotFound`] if `old` is not one of its children
pub fn try_replace_child(
    parent: &SharedNode,
    old: &SharedNode,
    new: SharedNode,
) -> std::result::Result<(), ConfigError> {
    let mut parent = parent
        .try_lock()
        .map_err(|_| ConfigError::CompositeRunning)?;
    parent.replace_child(old, new)
}

/// A behavior tree node with a prepare / advance / cleanup lifecycle.
///
/// The owning [`TaskRunner`](crate::TaskRunner) invokes the three steps in
/// order on a pool task. Nodes are reusable: every `prepare` starts a fresh
/// run.
#[async_trait]
pub trait Node: Send {
    /// Display name used in log spans.
    fn name(&self) -> &str {
        "node"
    }

    /// Optional human-readable description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Swaps the child `old` for `new`, keeping its position.
    ///
    /// Nodes without replaceable children report [`ConfigError::ChildNotFound`].
    fn replace_child(
        &mut self,
        old: &SharedNode,
        new: SharedNode,
    ) -> std::result::Result<(), ConfigError> {
        let _ = (old, new);
        Err(ConfigError::ChildNotFound)
    }

    /// Reset per-run state and validate configuration.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` to continue with [`advance`](Node::advance)
    /// - `Ok(false)` to skip the run; the overall result is `Failure`
    /// - `Err` with a [`ConfigError`](crate::ConfigError) if the node is missing
    ///   something it needs
    fn prepare(&mut self) -> Result<bool>;

    /// Execute the node until it reaches `Success` or `Failure`.
    ///
    /// Composites spawn their children on `pool`. Returning `Running` is a
    /// contract violation and is reported as [`TreeError::Unfinished`].
    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status>;

    /// Release per-run state. Must be idempotent.
    fn cleanup(&mut self);
}

/// Blanket implementation for boxed nodes, so trees built from
/// `Box<dyn Node>` can be shared like any other node.
#[async_trait]
impl<N: Node + ?Sized> Node for Box<N> {
    #[inline]
    fn name(&self) -> &str {
        (**self).name()
    }

    #[inline]
    fn description(&self) -> Option<&str> {
        (**self).description()
    }

    #[inline]
    fn replace_child(
        &mut self,
        old: &SharedNode,
        new: SharedNode,
    ) -> std::result::Result<(), ConfigError> {
        (**self).replace_child(old, new)
    }

    #[inline]
    fn prepare(&mut self) -> Result<bool> {
        (**self).prepare()
    }

    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status> {
        (**self).advance(pool).await
    }

    #[inline]
    fn cleanup(&mut self) {
        (**self).cleanup()
    }
}

/// Runs one complete lifecycle of `node`.
///
/// A declined `prepare` yields `Failure` without advancing or cleaning up.
/// Otherwise `cleanup` always runs after `advance`, whatever it returned,
/// including when it panicked; the panic becomes [`TreeError::Panicked`].
pub(crate) async fn run_lifecycle<N: Node + ?Sized>(
    node: &mut N,
    pool: &WorkerPool,
) -> Result<Status> {
    if !node.prepare()? {
        trace!(node = node.name(), "prepare declined the run");
        return Ok(Status::Failure);
    }

    let outcome = AssertUnwindSafe(node.advance(pool))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(TreeError::Panicked(panic_message(payload))));
    node.cleanup();

    match outcome? {
        Status::Running => Err(TreeError::Unfinished),
        status => Ok(status),
    }
}
