//! Task runner that executes one node on the worker pool.
//!
//! A [`TaskRunner`] submits its node's whole lifecycle as a pool task and lets
//! the owner observe it without blocking indefinitely: [`TaskRunner::poll`]
//! waits at most the given timeout and reports `Running` if the node is not
//! done yet. Composites drive every child through a runner of its own, so a
//! tree executes as nested runners polling each other.
//!
//! Cancellation is cooperative: the session token is observed at the node's
//! await points. When a cancellation interrupts a node, the node's task runs
//! its cleanup before exiting, so cleanup happens exactly once per session on
//! every path. Dropping a runner cancels its unfinished work.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, warn};

use crate::error::{ConfigError, Result, TreeError, panic_message};
use crate::node::{SharedNode, run_lifecycle};
use crate::{Status, WorkerPool};

/// How a node task ended.
enum Completion {
    Finished(Result<Status>),
    Cancelled,
}

type Outcome = std::result::Result<Status, Arc<TreeError>>;

/// One submission of the node to the pool.
struct Session {
    token: CancellationToken,
    handle: Option<JoinHandle<Completion>>,
    /// Terminal outcome, cached once the task has been joined
    outcome: Option<Outcome>,
    cancelled: bool,
}

impl Session {
    fn is_settled(&self) -> bool {
        self.cancelled || self.outcome.is_some()
    }
}

/// Executes a node's lifecycle on a [`WorkerPool`] and exposes polling and
/// cancellation.
pub struct TaskRunner {
    node: SharedNode,
    pool: WorkerPool,
    session: Option<Session>,
    last_error: Option<Arc<TreeError>>,
}

impl TaskRunner {
    pub fn new(node: SharedNode, pool: WorkerPool) -> Self {
        Self {
            node,
            pool,
            session: None,
            last_error: None,
        }
    }

    /// The node this runner executes.
    pub fn node(&self) -> &SharedNode {
        &self.node
    }

    /// Returns `true` once [`start`](Self::start) has been called and the
    /// runner has not been reset since.
    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Submits the node's lifecycle to the pool.
    ///
    /// A session that is still in flight is cancelled first. The new task
    /// waits for the previous one to release the node, so the old cleanup
    /// always finishes before the new prepare. Never blocks.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("runner restarted, aborting previous session");
            self.reset();
        }

        let token = self.pool.session_token()?;
        let handle = self.pool.spawn(execute(
            Arc::clone(&self.node),
            self.pool.clone(),
            token.clone(),
        ));

        self.session = Some(Session {
            token,
            handle: Some(handle),
            outcome: None,
            cancelled: false,
        });
        Ok(())
    }

    /// Checks the node's progress, waiting up to `timeout` for it to finish.
    ///
    /// # Returns
    ///
    /// - `Running` if the node did not finish within `timeout`; it keeps
    ///   running in the background
    /// - `Success` or `Failure` once it has finished; a cancelled session
    ///   reports `Failure`
    /// - If the node raised an error: the error is recorded for
    ///   [`last_error`](Self::last_error) and returned as
    ///   [`TreeError::Child`] when `propagate` is set, or reported as
    ///   `Failure` otherwise
    ///
    /// Polling a runner that was never started is a [`ConfigError`].
    pub async fn poll(&mut self, timeout: Duration, propagate: bool) -> Result<Status> {
        let session = self
            .session
            .as_mut()
            .ok_or(ConfigError::RunnerNotStarted)?;

        if session.cancelled {
            return Ok(Status::Failure);
        }

        let outcome = if let Some(outcome) = session.outcome.clone() {
            outcome
        } else {
            let Some(handle) = session.handle.as_mut() else {
                return Ok(Status::Failure);
            };
            let Ok(joined) = tokio::time::timeout(timeout, handle).await else {
                return Ok(Status::Running);
            };
            session.handle = None;

            let outcome = match joined {
                Ok(Completion::Finished(result)) => result.map_err(Arc::new),
                Ok(Completion::Cancelled) => {
                    session.cancelled = true;
                    return Ok(Status::Failure);
                }
                Err(err) if err.is_cancelled() => {
                    session.cancelled = true;
                    return Ok(Status::Failure);
                }
                Err(err) => Err(Arc::new(TreeError::Panicked(join_error_message(err)))),
            };

            // Each level of the tree captures the same failure; report it once.
            if let Err(error) = &outcome {
                if error.is_origin() {
                    warn!(error = %error, "node execution failed");
                } else {
                    debug!(error = %error, "child failure passed up");
                }
            }
            session.outcome = Some(outcome.clone());
            outcome
        };

        match outcome {
            Ok(status) => Ok(status),
            Err(error) => {
                // The task has already finished; this only reaches sessions
                // spawned below it that are still winding down.
                session.token.cancel();
                self.last_error = Some(Arc::clone(&error));

                if propagate {
                    Err(TreeError::Child(error))
                } else {
                    Ok(Status::Failure)
                }
            }
        }
    }

    /// Requests cancellation of the in-flight session.
    ///
    /// Returns `true` if the work was still pending or running, in which case
    /// the node's cleanup runs on its task once the interrupted advance has
    /// been dropped. Returns `false` if the session had already finished.
    pub fn cancel(&mut self) -> Result<bool> {
        let session = self
            .session
            .as_mut()
            .ok_or(ConfigError::RunnerNotStarted)?;

        if session.is_settled() {
            return Ok(false);
        }

        let took_effect = session
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        session.token.cancel();

        if took_effect {
            session.cancelled = true;
            debug!("session cancelled");
        }
        Ok(took_effect)
    }

    /// Cancels the in-flight session and waits until the node's task has
    /// exited, so this node's cleanup has completed when this returns.
    ///
    /// Children the node was driving are cancelled as its cleanup drops their
    /// runners. They clean up on their own tasks, shortly after this returns;
    /// [`WorkerPool::drain`] waits for those as well.
    pub async fn abort(&mut self) -> Result<bool> {
        let took_effect = self.cancel()?;

        if took_effect {
            let handle = self.session.as_mut().and_then(|session| session.handle.take());
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }
        Ok(took_effect)
    }

    /// Cancels unfinished work and forgets the session so the runner can be
    /// started again. Idempotent; also runs when the runner is dropped.
    pub fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            if !session.is_settled() {
                session.token.cancel();
            }
        }
    }

    /// The most recent error raised by the node.
    ///
    /// Polls once without waiting first, so a failure that just happened is
    /// reported.
    pub async fn last_error(&mut self) -> Option<Arc<TreeError>> {
        if self.session.is_some() {
            let _ = self.poll(Duration::ZERO, false).await;
        }
        self.last_error.clone()
    }

    /// Starts the node and polls it to completion, calling `on_running` after
    /// every poll that still reports `Running`.
    ///
    /// Polls wait for the pool's configured interval. The closing poll does
    /// not wait and propagates the node's error, if any.
    pub async fn drive<F>(&mut self, mut on_running: F) -> Result<Status>
    where
        F: FnMut(&SharedNode) + Send,
    {
        let interval = self.pool.config().poll_interval;

        self.start()?;
        while self.poll(interval, true).await?.is_running() {
            on_running(&self.node);
        }
        self.poll(Duration::ZERO, true).await
    }

    /// Starts the node and polls it to completion.
    pub async fn run(&mut self) -> Result<Status> {
        self.drive(|_| {}).await
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.reset();
    }
}

/// Body of a node task: take the node, run its lifecycle, and clean up if
/// the session is cancelled midway.
async fn execute(node: SharedNode, pool: WorkerPool, token: CancellationToken) -> Completion {
    let mut node = tokio::select! {
        biased;
        _ = token.cancelled() => return Completion::Cancelled,
        guard = node.lock_owned() => guard,
    };

    let span = debug_span!("node", name = node.name(), description = node.description());
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = run_lifecycle(&mut *node, &pool).instrument(span.clone()) => Some(result),
    };

    match outcome {
        Some(result) => Completion::Finished(result),
        None => {
            span.in_scope(|| {
                debug!("interrupted, cleaning up");
                node.cleanup();
            });
            Completion::Cancelled
        }
    }
}

/// Extracts a readable message from a failed task.
pub(crate) fn join_error_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => panic_message(payload),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::node::{Node, shared};

    const TICK: Duration = Duration::from_millis(10);

    #[derive(Default, Clone, Copy)]
    enum Script {
        #[default]
        Succeed,
        Fail,
        Raise,
        Panic,
    }

    #[derive(Default)]
    struct Scripted {
        delay: Duration,
        script: Script,
        prepares: Arc<AtomicUsize>,
        cleanups: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Node for Scripted {
        fn prepare(&mut self) -> Result<bool> {
            self.prepares.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn advance(&mut self, _pool: &WorkerPool) -> Result<Status> {
            tokio::time::sleep(self.delay).await;
            match self.script {
                Script::Succeed => Ok(Status::Success),
                Script::Fail => Ok(Status::Failure),
                Script::Raise => Err(TreeError::Operation("scripted error".into())),
                Script::Panic => panic!("scripted panic"),
            }
        }

        fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool() -> WorkerPool {
        WorkerPool::current_with(crate::EngineConfig::default().with_poll_interval(TICK)).unwrap()
    }

    #[tokio::test]
    async fn poll_before_start_is_a_usage_error() {
        let mut runner = TaskRunner::new(shared(Scripted::default()), pool());

        let err = runner.poll(Duration::ZERO, false).await.unwrap_err();
        assert!(matches!(err, TreeError::Config(ConfigError::RunnerNotStarted)));
        assert!(matches!(
            runner.cancel(),
            Err(TreeError::Config(ConfigError::RunnerNotStarted))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeout_reports_running_without_cancelling() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let node = shared(Scripted {
            delay: Duration::from_millis(150),
            cleanups: Arc::clone(&cleanups),
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        runner.start().unwrap();
        assert_eq!(runner.poll(TICK, false).await.unwrap(), Status::Running);
        assert_eq!(
            runner.poll(Duration::from_secs(5), false).await.unwrap(),
            Status::Success
        );
        // Terminal outcomes are stable.
        assert_eq!(runner.poll(Duration::ZERO, false).await.unwrap(), Status::Success);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abort_mid_execution_cleans_up_once() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let node = shared(Scripted {
            delay: Duration::from_secs(30),
            cleanups: Arc::clone(&cleanups),
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        runner.start().unwrap();
        assert_eq!(runner.poll(TICK, false).await.unwrap(), Status::Running);

        assert!(runner.abort().await.unwrap());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(runner.poll(Duration::ZERO, false).await.unwrap(), Status::Failure);

        // A second abort has nothing left to stop.
        assert!(!runner.abort().await.unwrap());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_after_completion_has_no_effect() {
        let mut runner = TaskRunner::new(shared(Scripted::default()), pool());

        assert_eq!(runner.run().await.unwrap(), Status::Success);
        assert!(!runner.cancel().unwrap());
        assert_eq!(runner.poll(Duration::ZERO, false).await.unwrap(), Status::Success);
    }

    #[tokio::test]
    async fn raised_error_is_captured_or_propagated() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let node = shared(Scripted {
            script: Script::Raise,
            cleanups: Arc::clone(&cleanups),
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        runner.start().unwrap();
        assert_eq!(
            runner.poll(Duration::from_secs(5), false).await.unwrap(),
            Status::Failure
        );
        let error = runner.last_error().await.expect("error should be captured");
        assert!(matches!(*error, TreeError::Operation(_)));

        let err = runner.poll(Duration::ZERO, true).await.unwrap_err();
        assert!(matches!(err.root_cause(), TreeError::Operation(_)));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panics_are_captured_as_errors() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let node = shared(Scripted {
            script: Script::Panic,
            cleanups: Arc::clone(&cleanups),
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        runner.start().unwrap();
        assert_eq!(
            runner.poll(Duration::from_secs(5), false).await.unwrap(),
            Status::Failure
        );
        let error = runner.last_error().await.unwrap();
        assert!(matches!(&*error, TreeError::Panicked(message) if message == "scripted panic"));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn restart_aborts_previous_session() {
        let prepares = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));
        let node = shared(Scripted {
            delay: Duration::from_millis(100),
            prepares: Arc::clone(&prepares),
            cleanups: Arc::clone(&cleanups),
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        runner.start().unwrap();
        assert_eq!(runner.poll(TICK, false).await.unwrap(), Status::Running);

        runner.start().unwrap();
        assert_eq!(
            runner.poll(Duration::from_secs(5), false).await.unwrap(),
            Status::Success
        );
        assert_eq!(prepares.load(Ordering::SeqCst), 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reset_is_idempotent() {
        let mut runner = TaskRunner::new(shared(Scripted::default()), pool());

        runner.reset();
        runner.start().unwrap();
        runner.reset();
        runner.reset();
        assert!(!runner.is_started());
        assert!(runner.last_error().await.is_none());
    }

    #[tokio::test]
    async fn failed_status_is_not_an_error() {
        let node = shared(Scripted {
            script: Script::Fail,
            ..Scripted::default()
        });
        let mut runner = TaskRunner::new(node, pool());

        assert_eq!(runner.run().await.unwrap(), Status::Failure);
        assert!(runner.last_error().await.is_none());
    }
}
