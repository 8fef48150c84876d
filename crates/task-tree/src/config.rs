//! Engine configuration and its environment loader.
use std::env;
use std::time::Duration;

/// Default wait applied by composites between polls of a running child.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tuning shared by every runner spawned on a [`WorkerPool`](crate::WorkerPool).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a composite waits on a child before checking it again.
    pub poll_interval: Duration,
    /// Run action operations on the blocking thread pool instead of the
    /// async workers.
    pub offload_actions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            offload_actions: true,
        }
    }
}

impl EngineConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `TASK_TREE_POLL_INTERVAL_MS` - Child poll interval (default: 100)
    /// - `TASK_TREE_OFFLOAD_ACTIONS` - Run actions on blocking threads (default: true)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(millis) = read_env::<u64>("TASK_TREE_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(millis);
        }

        if let Some(offload) = read_env::<bool>("TASK_TREE_OFFLOAD_ACTIONS") {
            config.offload_actions = offload;
        }

        config
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Choose whether actions run on blocking threads.
    pub fn with_offload_actions(mut self, offload_actions: bool) -> Self {
        self.offload_actions = offload_actions;
        self
    }
}

pub(crate) fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
