//! Demo configuration and its environment loader.
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use task_tree::EngineConfig;

/// Which demonstration tree to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scenario {
    /// Walk a fixed route a few times, checking a sensor at every lap.
    #[default]
    Patrol,
    /// Retry a flaky operation until it reports success.
    Retry,
    /// Start a long tree and abort it midway.
    Abort,
}

impl FromStr for Scenario {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "patrol" => Ok(Self::Patrol),
            "retry" => Ok(Self::Retry),
            "abort" => Ok(Self::Abort),
            other => anyhow::bail!("unknown scenario '{other}' (expected patrol, retry or abort)"),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Patrol => "patrol",
            Self::Retry => "retry",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliConfig {
    pub scenario: Scenario,
    /// Passes made by repeating nodes.
    pub repeats: u64,
    /// Simulated duration of a single action.
    pub step: Duration,
    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            repeats: 3,
            step: Duration::from_millis(20),
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `TASK_TREE_SCENARIO` - patrol, retry or abort (default: patrol)
    /// - `TASK_TREE_REPEATS` - Passes made by repeating nodes (default: 3)
    /// - `TASK_TREE_STEP_MS` - Duration of a simulated action (default: 20)
    /// - Engine settings, see [`EngineConfig::from_env`]
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self {
            engine: EngineConfig::from_env(),
            ..Self::default()
        };

        if let Ok(scenario) = env::var("TASK_TREE_SCENARIO") {
            config.scenario = scenario.parse()?;
        }

        if let Some(repeats) = read_env::<u64>("TASK_TREE_REPEATS") {
            config.repeats = repeats.max(1);
        }

        if let Some(millis) = read_env::<u64>("TASK_TREE_STEP_MS") {
            config.step = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Applies command-line overrides; the first argument names the scenario.
    pub fn with_args<I>(mut self, mut args: I) -> anyhow::Result<Self>
    where
        I: Iterator<Item = String>,
    {
        if let Some(scenario) = args.next() {
            self.scenario = scenario.parse()?;
        }
        Ok(self)
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_names_parse_case_insensitively() {
        assert_eq!("patrol".parse::<Scenario>().unwrap(), Scenario::Patrol);
        assert_eq!(" Retry ".parse::<Scenario>().unwrap(), Scenario::Retry);
        assert_eq!("ABORT".parse::<Scenario>().unwrap(), Scenario::Abort);
        assert!("sprint".parse::<Scenario>().is_err());
    }

    #[test]
    fn first_argument_overrides_scenario() {
        let config = CliConfig::default()
            .with_args(vec!["abort".to_string(), "ignored".to_string()].into_iter())
            .unwrap();
        assert_eq!(config.scenario, Scenario::Abort);

        let unchanged = CliConfig::default().with_args(std::iter::empty()).unwrap();
        assert_eq!(unchanged.scenario, Scenario::Patrol);
    }

    #[test]
    fn scenario_display_round_trips() {
        for scenario in [Scenario::Patrol, Scenario::Retry, Scenario::Abort] {
            assert_eq!(scenario.to_string().parse::<Scenario>().unwrap(), scenario);
        }
    }
}
