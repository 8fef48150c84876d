//! Worker pool that hosts node executions.
//!
//! Every [`TaskRunner`](crate::TaskRunner) spawns its node's lifecycle as a
//! task on a [`WorkerPool`]. The pool is an explicit handle rather than
//! process-wide state: whoever builds the root runner decides which pool the
//! whole tree uses, and composites hand the same pool to their children.
//!
//! Design principles:
//! - Node bodies are async tasks, so a parent awaiting its child never ties up
//!   a thread and deep trees cannot exhaust the pool
//! - Blocking leaf operations go to the runtime's blocking threads, which grow
//!   on demand
//! - Each session token is a child of the pool's shutdown token, so draining
//!   the pool reaches every in-flight session

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::EngineConfig;
use crate::error::{ConfigError, TreeError};

/// Cloneable handle to a pool of workers backed by a tokio runtime.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    runtime: Handle,
    config: EngineConfig,
    /// Tracks node tasks so drain can wait for their cleanup
    tracker: TaskTracker,
    /// Parent of every session token; replaced on restart
    shutdown: Mutex<CancellationToken>,
}

impl WorkerPool {
    /// Creates a pool on the given runtime.
    pub fn new(runtime: Handle, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                runtime,
                config,
                tracker: TaskTracker::new(),
                shutdown: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Creates a pool with default configuration on the ambient runtime.
    pub fn current() -> Result<Self, ConfigError> {
        Self::current_with(EngineConfig::default())
    }

    /// Creates a pool on the ambient runtime.
    ///
    /// Fails with [`ConfigError::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn current_with(config: EngineConfig) -> Result<Self, ConfigError> {
        let runtime = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::new(runtime, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Number of node tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Returns `false` between [`drain`](Self::drain) and
    /// [`restart`](Self::restart).
    pub fn is_accepting(&self) -> bool {
        !self.inner.tracker.is_closed()
    }

    /// Cancels every in-flight session and stops accepting new ones.
    ///
    /// Returns once every cancelled node has finished its cleanup. Runners
    /// whose sessions were cancelled report `Failure` on their next poll.
    pub async fn drain(&self) {
        let token = self.shutdown_token();
        self.inner.tracker.close();
        info!(in_flight = self.in_flight(), "draining worker pool");

        token.cancel();
        self.inner.tracker.wait().await;

        info!("worker pool drained");
    }

    /// Re-opens a drained pool with a fresh shutdown token.
    pub fn restart(&self) {
        let mut shutdown = self
            .inner
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *shutdown = CancellationToken::new();
        self.inner.tracker.reopen();

        info!("worker pool restarted");
    }

    /// Issues the cancellation token for a new session.
    pub(crate) fn session_token(&self) -> Result<CancellationToken, TreeError> {
        if !self.is_accepting() {
            return Err(TreeError::PoolShutdown);
        }
        Ok(self.shutdown_token().child_token())
    }

    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.tracker.spawn_on(task, &self.inner.runtime)
    }

    pub(crate) fn spawn_blocking<F, R>(&self, operation: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.runtime.spawn_blocking(operation)
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.inner
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_requires_a_runtime() {
        assert_eq!(WorkerPool::current().unwrap_err(), ConfigError::NoRuntime);
    }

    #[tokio::test]
    async fn drained_pool_refuses_sessions_until_restart() {
        let pool = WorkerPool::current().unwrap();
        assert!(pool.session_token().is_ok());

        pool.drain().await;
        assert!(!pool.is_accepting());
        assert!(matches!(pool.session_token(), Err(TreeError::PoolShutdown)));

        pool.restart();
        assert!(pool.is_accepting());
        let token = pool.session_token().unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn drain_cancels_issued_tokens() {
        let pool = WorkerPool::current().unwrap();
        let token = pool.session_token().unwrap();

        pool.drain().await;
        assert!(token.is_cancelled());
    }
}
