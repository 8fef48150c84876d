//! Decorator nodes.
//!
//! Decorators guard a child behind a condition. This module provides
//! [`ConditionalBranch`], the tree's if/else.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::{Node, SharedNode, Status, TaskRunner, WorkerPool, same_node};

/// Condition evaluated synchronously by branches and repeats.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Runs one of two children depending on a predicate.
///
/// # Semantics
///
/// - The predicate is evaluated **once**, when the branch is prepared
/// - If it holds, the success child runs and its status is the branch's status
/// - If it does not, the failure child runs instead
/// - If it does not hold and there is no failure child, the branch returns
///   `Success`, like an `if` without an `else`
///
/// The selected child runs on its own [`TaskRunner`], which the branch polls
/// until the child finishes.
#[derive(Default)]
pub struct ConditionalBranch {
    name: Option<String>,
    description: Option<String>,
    predicate: Option<Predicate>,
    on_success: Option<SharedNode>,
    on_failure: Option<SharedNode>,

    selected: Option<SharedNode>,
    active: Option<TaskRunner>,
}

impl ConditionalBranch {
    /// Creates a branch that runs `on_success` when `predicate` holds.
    pub fn new<P>(predicate: P, on_success: SharedNode) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
            on_success: Some(on_success),
            ..Self::default()
        }
    }

    /// Adds the child to run when the predicate does not hold.
    pub fn otherwise(mut self, on_failure: SharedNode) -> Self {
        self.on_failure = Some(on_failure);
        self
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

    pub fn set_predicate<P>(&mut self, predicate: P)
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
    }

    pub fn success_child(&self) -> Option<&SharedNode> {
        self.on_success.as_ref()
    }

    pub fn set_success_child(&mut self, child: SharedNode) {
        self.on_success = Some(child);
    }

    pub fn failure_child(&self) -> Option<&SharedNode> {
        self.on_failure.as_ref()
    }

    pub fn set_failure_child(&mut self, child: Option<SharedNode>) {
        self.on_failure = child;
    }
}

#[async_trait]
impl Node for ConditionalBranch {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("branch")
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Swaps either child by identity. A run already in progress keeps the
    /// child it selected.
    fn replace_child(
        &mut self,
        old: &SharedNode,
        new: SharedNode,
    ) -> std::result::Result<(), ConfigError> {
        let slot = [&mut self.on_success, &mut self.on_failure]
            .into_iter()
            .flatten()
            .find(|child| same_node(child, old))
            .ok_or(ConfigError::ChildNotFound)?;
        *slot = new;
        Ok(())
    }

    fn prepare(&mut self) -> Result<bool> {
        let predicate = self.predicate.as_ref().ok_or(ConfigError::MissingPredicate)?;
        let on_success = self
            .on_success
            .as_ref()
            .ok_or(ConfigError::MissingSuccessChild)?;

        let holds = predicate();
        self.selected = if holds {
            Some(Arc::clone(on_success))
        } else {
            self.on_failure.clone()
        };

        debug!(
            branch = self.name(),
            holds,
            selected = self.selected.is_some(),
            "condition evaluated"
        );
        Ok(true)
    }

    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status> {
        // No branch to take
        let Some(child) = self.selected.clone() else {
            return Ok(Status::Success);
        };

        let runner = self.active.insert(TaskRunner::new(child, pool.clone()));
        let status = runner.drive(|_| {}).await;
        self.active = None;
        status
    }

    fn cleanup(&mut self) {
        self.selected = None;
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::TreeError;
    use crate::{Action, EngineConfig, shared};

    fn pool() -> WorkerPool {
        WorkerPool::current_with(
            EngineConfig::default().with_poll_interval(Duration::from_millis(5)),
        )
        .unwrap()
    }

    fn counting(result: bool) -> (SharedNode, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action = Action::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            result
        });
        (shared(action), calls)
    }

    async fn run(branch: ConditionalBranch) -> (Status, Option<Arc<TreeError>>) {
        let mut runner = TaskRunner::new(shared(branch), pool());
        runner.start().unwrap();
        let status = runner.poll(Duration::from_secs(5), false).await.unwrap();
        (status, runner.last_error().await)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn true_predicate_runs_only_success_child() {
        let (on_success, success_calls) = counting(false);
        let (on_failure, failure_calls) = counting(true);
        let branch = ConditionalBranch::new(|| true, on_success).otherwise(on_failure);

        let (status, _) = run(branch).await;
        assert_eq!(status, Status::Failure);
        assert_eq!(success_calls.load(Ordering::SeqCst), 1);
        assert_eq!(failure_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn false_predicate_runs_only_failure_child() {
        let (on_success, success_calls) = counting(true);
        let (on_failure, failure_calls) = counting(true);
        let branch = ConditionalBranch::new(|| false, on_success).otherwise(on_failure);

        let (status, _) = run(branch).await;
        assert_eq!(status, Status::Success);
        assert_eq!(success_calls.load(Ordering::SeqCst), 0);
        assert_eq!(failure_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_selected_child_succeeds() {
        let (on_success, success_calls) = counting(false);
        let branch = ConditionalBranch::new(|| false, on_success);

        let (status, error) = run(branch).await;
        assert_eq!(status, Status::Success);
        assert!(error.is_none());
        assert_eq!(success_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn predicate_is_evaluated_once_per_run() {
        let evaluations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&evaluations);
        let slow = shared(Action::new(|| {
            std::thread::sleep(Duration::from_millis(50));
            true
        }));
        let branch = ConditionalBranch::new(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
            slow,
        );

        let (status, _) = run(branch).await;
        assert_eq!(status, Status::Success);
        assert_eq!(evaluations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_predicate_is_fatal() {
        let (on_success, _) = counting(true);
        let mut branch = ConditionalBranch::default();
        branch.set_success_child(on_success);

        let (status, error) = run(branch).await;
        assert_eq!(status, Status::Failure);
        assert!(matches!(
            error.as_deref(),
            Some(TreeError::Config(ConfigError::MissingPredicate))
        ));
    }

    #[tokio::test]
    async fn missing_success_child_is_fatal() {
        let mut branch = ConditionalBranch::default();
        branch.set_predicate(|| true);

        let (_, error) = run(branch).await;
        assert!(matches!(
            error.as_deref(),
            Some(TreeError::Config(ConfigError::MissingSuccessChild))
        ));
    }

    #[test]
    fn either_child_can_be_replaced_by_identity() {
        let (on_success, _) = counting(true);
        let (on_failure, _) = counting(true);
        let (replacement, _) = counting(false);
        let (stranger, _) = counting(false);
        let mut branch = ConditionalBranch::new(|| true, Arc::clone(&on_success))
            .otherwise(Arc::clone(&on_failure))
            .with_description("light switch");

        branch
            .replace_child(&on_failure, Arc::clone(&replacement))
            .unwrap();
        assert!(same_node(branch.failure_child().unwrap(), &replacement));
        assert!(same_node(branch.success_child().unwrap(), &on_success));
        assert_eq!(
            branch.replace_child(&stranger, replacement),
            Err(ConfigError::ChildNotFound)
        );
        assert_eq!(branch.description(), Some("light switch"));
    }

    #[tokio::test]
    async fn child_error_travels_up_as_child_error() {
        let raising = shared(Action::fallible(|| Err("no route")));
        let branch = ConditionalBranch::new(|| true, raising);

        let (status, error) = run(branch).await;
        assert_eq!(status, Status::Failure);
        let error = error.unwrap();
        assert!(matches!(&*error, TreeError::Child(_)));
        assert!(matches!(error.root_cause(), TreeError::Operation(_)));
    }
}
