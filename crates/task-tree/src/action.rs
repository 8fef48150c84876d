//! Leaf node that runs a user operation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, ConfigError, Result, TreeError};
use crate::runner::join_error_message;
use crate::{Node, Status, WorkerPool};

/// Operation wrapped by an [`Action`]: returns `true` on success.
pub type Operation = Arc<dyn Fn() -> std::result::Result<bool, BoxError> + Send + Sync>;

/// Runs a single operation and reports its outcome.
///
/// # Semantics
///
/// - The operation returns `true`: the action returns `Success`
/// - The operation returns `false`: the action returns `Failure`
/// - The operation returns an error: the action raises
///   [`TreeError::Operation`]
///
/// The operation is synchronous. By default it runs on the pool's blocking
/// threads so long-running work does not stall other nodes; see
/// [`EngineConfig::offload_actions`](crate::EngineConfig::offload_actions).
#[derive(Default)]
pub struct Action {
    name: Option<String>,
    description: Option<String>,
    operation: Option<Operation>,
}

impl Action {
    /// Creates an action from an infallible operation.
    pub fn new<F>(operation: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::fallible(move || Ok::<_, BoxError>(operation()))
    }

    /// Creates an action from an operation that may raise an error.
    pub fn fallible<F, E>(operation: F) -> Self
    where
        F: Fn() -> std::result::Result<bool, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            operation: Some(Arc::new(move || operation().map_err(Into::<BoxError>::into))),
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

    /// Replaces the operation.
    pub fn set_operation<F>(&mut self, operation: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.operation = Some(Arc::new(move || Ok::<_, BoxError>(operation())));
    }
}

#[async_trait]
impl Node for Action {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("action")
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn prepare(&mut self) -> Result<bool> {
        if self.operation.is_none() {
            return Err(ConfigError::MissingOperation.into());
        }
        Ok(true)
    }

    async fn advance(&mut self, pool: &WorkerPool) -> Result<Status> {
        let operation = self
            .operation
            .clone()
            .ok_or(ConfigError::MissingOperation)?;

        let outcome = if pool.config().offload_actions {
            pool.spawn_blocking(move || operation())
                .await
                .map_err(|err| TreeError::Panicked(join_error_message(err)))?
        } else {
            operation()
        };

        outcome.map(Status::from).map_err(TreeError::Operation)
    }

    fn cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{EngineConfig, TaskRunner, shared};

    async fn run(action: Action, config: EngineConfig) -> (Status, Option<Arc<TreeError>>) {
        let pool = WorkerPool::current_with(config).unwrap();
        let mut runner = TaskRunner::new(shared(action), pool);
        runner.start().unwrap();

        let mut status = runner.poll(std::time::Duration::from_millis(10), false).await.unwrap();
        while status.is_running() {
            status = runner.poll(std::time::Duration::from_millis(10), false).await.unwrap();
        }
        (status, runner.last_error().await)
    }

    #[tokio::test]
    async fn true_maps_to_success() {
        let (status, error) = run(Action::new(|| true), EngineConfig::default()).await;
        assert_eq!(status, Status::Success);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn false_maps_to_failure() {
        let (status, error) = run(Action::new(|| false), EngineConfig::default()).await;
        assert_eq!(status, Status::Failure);
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn raised_error_fails_the_action() {
        let action = Action::fallible(|| Err(io::Error::other("disk on fire")));
        let (status, error) = run(action, EngineConfig::default()).await;

        assert_eq!(status, Status::Failure);
        let error = error.expect("operation error should be captured");
        assert!(matches!(&*error, TreeError::Operation(source) if source.to_string() == "disk on fire"));
    }

    #[tokio::test]
    async fn missing_operation_is_fatal() {
        let (status, error) = run(Action::default(), EngineConfig::default()).await;

        assert_eq!(status, Status::Failure);
        let error = error.unwrap();
        assert!(error.is_fatal());
        assert!(matches!(
            &*error,
            TreeError::Config(ConfigError::MissingOperation)
        ));
    }

    #[tokio::test]
    async fn inline_operation_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let action = Action::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .named("count");

        let config = EngineConfig::default().with_offload_actions(false);
        let (status, _) = run(action, config).await;
        assert_eq!(status, Status::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn name_and_description() {
        let mut action = Action::default().named("open door").with_description("pushes");
        action.set_operation(|| true);
        assert_eq!(action.name(), "open door");
        assert_eq!(action.description(), Some("pushes"));
        assert_eq!(Action::new(|| true).name(), "action");
    }
}
