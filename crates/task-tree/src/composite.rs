//! Composite nodes.
//!
//! Composite nodes run several children in order. This module provides
//! [`Sequence`] (AND logic) and [`RepeatingSequence`], which runs a sequence
//! several times or until a condition holds.

use std::collections::VecDeque;
use std::num::NonZeroU64;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::decorator::Predicate;
use crate::error::{ConfigError, Result};
use crate::node::{run_lifecycle, same_node};
use crate::{Node, SharedNode, Status, TaskRunner, WorkerPool};

/// Callback invoked with the running child every time a poll finds it still
/// `Running`.
pub type TickHook = Arc<dyn Fn(&SharedNode) + Send + Sync>;

/// Executes children in order until one fails.
///
/// # Semantics
///
/// A `Sequence` runs its children from first to last, one at a time, each on
/// its own [`TaskRunner`]:
/// - If a child returns `Failure`, the sequence **stops immediately** and
///   returns `Failure`; later children never start
/// - If a child returns `Success`, the sequence **continues** with the next one
/// - If all children return `Success`, the sequence returns `Success`
///
/// This is analogous to a short-circuited logical AND (&&) operation. A child
/// that raises an error stops the sequence and the error travels up as
/// [`TreeError::Child`](crate::TreeError::Child).
#[derive(Default)]
pub struct Sequence {
    name: Option<String>,
    description: Option<String>,
    children: Vec<SharedNode>,
    on_tick: Option<TickHook>,

    /// Children still to run in the current pass, snapshotted on prepare
    pending: VecDeque<SharedNode>,
    /// Runner of the child currently executing
    running: Option<TaskRunner>,
}

impl Sequence {
    /// Creates a new sequence with the given children.
    pub fn new(children: Vec<SharedNode>) -> Self {
        Self {
            children,
            ..Self::default()
        }
    }

    /// Sets the name shown in log spans.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Installs a hook called whenever the running child is polled and found
    /// still `Running`. It observes progress without affecting control flow.
    pub fn with_tick_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SharedNode) + Send + Sync + 'static,
    {
        self.on_tick = Some(Arc::new(hook));
        self
    }

    pub fn children(&self) -> &[SharedNode] {
        &self.children
    }

    /// Returns `true` while a pass is in progress.
    pub fn is_running(&self) -> bool {
        !self.pending.is_empty() || self.running.is_some()
    }

    /// Replaces all children.
    pub fn set_children(
        &mut self,
        children: Vec<SharedNode>,
    ) -> std::result::Result<(), ConfigError> {
        self.ensure_idle()?;
        self.children = children;
        Ok(())
    }

    /// Appends a child.
    pub fn push_child(&mut self, child: SharedNode) -> std::result::Result<(), ConfigError> {
        self.ensure_idle()?;
        self.children.push(child);
        Ok(())
    }

    fn ensure_idle(&self) -> std::result::Result<(), ConfigError> {
        if self.is_running() {
            return Err(ConfigError::CompositeRunning);
        }
        Ok(())
    }
}

#[async_trait]
impl Node for Sequence {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("sequence")
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Fails with [`ConfigError::CompositeRunning`] while a pass is in
    /// progress. A sequence shared with a runner is edited through
    /// [`try_replace_child`](crate::try_replace_child).
    fn replace_child(
        &mut self,
        old: &SharedNode,
        new: SharedNode,
    ) -> std::result::Result<(), ConfigError> {
        self.ensure_idle()?;

        let slot = self
            .children
            .iter_mut()
            .find(|child| same_node(child, old))
            .ok_or(ConfigError::ChildNotFound)?;
        *slot = new;
        Ok(())
    }

    fn prepare(&mut self) -> Result<bool> {
        self.pending = self.children.iter().cloned().collect();
        Ok(true)
    }

    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status> {
        let hook = self.on_tick.clone();

        // Execute children in order until one fails
        while let Some(child) = self.pending.pop_front() {
            trace!(
                sequence = self.name(),
                remaining = self.pending.len(),
                "starting child"
            );

            let runner = self.running.insert(TaskRunner::new(child, pool.clone()));
            let status = runner
                .drive(|node| {
                    if let Some(hook) = &hook {
                        hook(node);
                    }
                })
                .await;
            self.running = None;

            if status?.is_failure() {
                trace!(sequence = self.name(), "child failed, stopping");
                return Ok(Status::Failure);
            }
        }

        // All children succeeded
        Ok(Status::Success)
    }

    fn cleanup(&mut self) {
        self.pending.clear();
        self.running = None;
    }
}

/// Sentinel accepted by [`RepeatBound::try_from`] for an unbounded repeat.
pub const UNBOUNDED: i64 = -1;

/// How many passes a [`RepeatingSequence`] may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatBound {
    Times(NonZeroU64),
    Unbounded,
}

impl RepeatBound {
    /// A bound of `count` passes; zero is rejected.
    pub fn times(count: u64) -> std::result::Result<Self, ConfigError> {
        NonZeroU64::new(count)
            .map(RepeatBound::Times)
            .ok_or(ConfigError::InvalidRepeatBound(0))
    }

    /// Returns `true` if another pass may start after `completed` passes.
    pub fn allows(self, completed: u64) -> bool {
        match self {
            RepeatBound::Times(limit) => completed < limit.get(),
            RepeatBound::Unbounded => true,
        }
    }
}

impl TryFrom<i64> for RepeatBound {
    type Error = ConfigError;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        if value == UNBOUNDED {
            return Ok(RepeatBound::Unbounded);
        }

        u64::try_from(value)
            .ok()
            .and_then(NonZeroU64::new)
            .map(RepeatBound::Times)
            .ok_or(ConfigError::InvalidRepeatBound(value))
    }
}

/// Runs a [`Sequence`] over the same children repeatedly.
///
/// # Semantics
///
/// Before each pass, while the bound allows another one:
/// - If the condition is set and holds, looping stops without running the pass
/// - Otherwise one full pass of the sequence runs; a failed pass makes the
///   repeat return `Failure` immediately
///
/// Once looping stops, the repeat returns `Success`, unless the condition is
/// required to succeed, in which case it returns whether the condition holds
/// at that moment. An unbounded repeat without a condition only ends when a
/// pass fails.
pub struct RepeatingSequence {
    name: Option<String>,
    description: Option<String>,
    sequence: Sequence,
    bound: RepeatBound,
    condition: Option<Predicate>,
    require_condition: bool,
    iterations: u64,
}

impl RepeatingSequence {
    /// Creates a repeat with full control over its exit rules.
    ///
    /// Fails with [`ConfigError::MissingCondition`] if `require_condition` is
    /// set without a condition.
    pub fn new(
        bound: RepeatBound,
        condition: Option<Predicate>,
        require_condition: bool,
        children: Vec<SharedNode>,
    ) -> std::result::Result<Self, ConfigError> {
        if require_condition && condition.is_none() {
            return Err(ConfigError::MissingCondition);
        }

        Ok(Self {
            name: None,
            description: None,
            sequence: Sequence::new(children),
            bound,
            condition,
            require_condition,
            iterations: 0,
        })
    }

    /// Repeats the children until one of them fails.
    pub fn forever(children: Vec<SharedNode>) -> Self {
        Self {
            name: None,
            description: None,
            sequence: Sequence::new(children),
            bound: RepeatBound::Unbounded,
            condition: None,
            require_condition: false,
            iterations: 0,
        }
    }

    /// Repeats the children `count` times. Fails if a pass fails.
    pub fn times(count: u64, children: Vec<SharedNode>) -> std::result::Result<Self, ConfigError> {
        Self::new(RepeatBound::times(count)?, None, false, children)
    }

    /// Repeats the children until `condition` holds. Fails if a pass fails.
    pub fn until<P>(condition: P, children: Vec<SharedNode>) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            name: None,
            description: None,
            sequence: Sequence::new(children),
            bound: RepeatBound::Unbounded,
            condition: Some(Arc::new(condition)),
            require_condition: true,
            iterations: 0,
        }
    }

    /// Sets the name shown in log spans.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Installs a progress hook on the repeated sequence.
    pub fn with_tick_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SharedNode) + Send + Sync + 'static,
    {
        self.sequence = self.sequence.with_tick_hook(hook);
        self
    }

    pub fn bound(&self) -> RepeatBound {
        self.bound
    }

    /// Passes completed by the current or most recent run.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn children(&self) -> &[SharedNode] {
        self.sequence.children()
    }

    fn condition_met(&self) -> bool {
        self.condition.as_ref().is_some_and(|condition| condition())
    }
}

#[async_trait]
impl Node for RepeatingSequence {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("repeat")
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn replace_child(
        &mut self,
        old: &SharedNode,
        new: SharedNode,
    ) -> std::result::Result<(), ConfigError> {
        self.sequence.replace_child(old, new)
    }

    fn prepare(&mut self) -> Result<bool> {
        self.iterations = 0;
        Ok(true)
    }

    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status> {
        while self.bound.allows(self.iterations) {
            if self.condition_met() {
                debug!(
                    repeat = self.name(),
                    iterations = self.iterations,
                    "condition met, stopping"
                );
                break;
            }

            trace!(repeat = self.name(), pass = self.iterations + 1, "starting pass");
            if run_lifecycle(&mut self.sequence, pool).await?.is_failure() {
                debug!(
                    repeat = self.name(),
                    iterations = self.iterations,
                    "pass failed"
                );
                return Ok(Status::Failure);
            }
            self.iterations += 1;
        }

        if self.require_condition {
            return Ok(Status::from(self.condition_met()));
        }
        Ok(Status::Success)
    }

    fn cleanup(&mut self) {
        self.sequence.cleanup();
    }
}
