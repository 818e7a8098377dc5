use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// The prefix of environment variables that override configuration values.
/// Nested keys are separated by double underscores,
/// e.g. `OFFLOAD__TOPOLOGY__EDGE_COUNT=8`.
pub const CONFIG_ENV_PREFIX: &str = "OFFLOAD__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub simulation: SimulationConfig,
    pub topology: TopologyConfig,
    pub workload: WorkloadConfig,
    pub engine: EngineConfig,
    pub dqn: DqnConfig,
}

impl AppConfig {
    pub fn load() -> CommonResult<Self> {
        Self::figment()
            .extract::<Self>()
            .map_err(|e| CommonError::InvalidArgument(e.to_string()))?
            .validate()
    }

    fn figment() -> Figment {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed(CONFIG_ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()))
    }

    /// Checks the invariants that serde cannot express.
    pub fn validate(self) -> CommonResult<Self> {
        if self.topology.edge_cpu_min <= 0.0 || self.topology.edge_cpu_max < self.topology.edge_cpu_min
        {
            return Err(CommonError::invalid(format!(
                "invalid edge cpu range: [{}, {})",
                self.topology.edge_cpu_min, self.topology.edge_cpu_max
            )));
        }
        if self.topology.cloud_cpu < 0.0 {
            return Err(CommonError::invalid("cloud cpu must not be negative"));
        }
        if self.workload.cpu_min <= 0.0 || self.workload.cpu_max < self.workload.cpu_min {
            return Err(CommonError::invalid(format!(
                "invalid task cpu range: [{}, {})",
                self.workload.cpu_min, self.workload.cpu_max
            )));
        }
        if self.simulation.network_latency_secs < 0.0
            || self.simulation.launch_delay_secs < 0.0
            || self.simulation.launch_delay_step_secs < 0.0
        {
            return Err(CommonError::invalid("simulation delays must not be negative"));
        }
        if self.dqn.batch_size == 0 || self.dqn.memory_size == 0 {
            return Err(CommonError::invalid(
                "DQN batch size and memory size must be positive",
            ));
        }
        if !(self.dqn.learning_rate.is_finite() && self.dqn.learning_rate > 0.0) {
            return Err(CommonError::invalid(format!(
                "DQN learning rate must be finite and positive: {}",
                self.dqn.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.dqn.e_greedy) {
            return Err(CommonError::invalid(format!(
                "DQN e-greedy must be in [0, 1]: {}",
                self.dqn.e_greedy
            )));
        }
        if self.dqn.learn_interval == 0 || self.dqn.replace_target_iter == 0 {
            return Err(CommonError::invalid(
                "DQN learn interval and target replacement interval must be positive",
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub network_latency_secs: f64,
    pub launch_delay_secs: f64,
    pub launch_delay_step_secs: f64,
    /// The simulated time at which the run stops, or zero to run
    /// until no events are pending.
    pub stop_time_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub edge_count: usize,
    pub edge_cpu_min: f64,
    pub edge_cpu_max: f64,
    /// The cpu capacity of the cloud server, or zero if there is no cloud server.
    pub cloud_cpu: f64,
    pub client_count: usize,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub task_count: usize,
    pub group: String,
    pub size_min: f64,
    pub size_max: f64,
    pub cpu_min: f64,
    pub cpu_max: f64,
    pub deadline_min: f64,
    pub deadline_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub kind: EngineKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    RuleBased,
    Dqn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DqnConfig {
    pub learning_rate: f64,
    pub reward_decay: f64,
    /// The probability of acting greedily instead of exploring.
    pub e_greedy: f64,
    pub replace_target_iter: usize,
    pub memory_size: usize,
    pub batch_size: usize,
    pub hidden_units: usize,
    /// The number of training steps before the network starts learning.
    pub warmup_steps: usize,
    pub learn_interval: usize,
    pub episodes: usize,
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn test_load_default_config() {
        Jail::expect_with(|_| {
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.topology.edge_count, 5);
            assert_eq!(config.engine.kind, EngineKind::RuleBased);
            assert_eq!(config.dqn.memory_size, 3000);
            assert_eq!(config.workload.group, "dummy");
            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("OFFLOAD__TOPOLOGY__EDGE_COUNT", "8");
            jail.set_env("OFFLOAD__ENGINE__KIND", "dqn");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.topology.edge_count, 8);
            assert_eq!(config.engine.kind, EngineKind::Dqn);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_cpu_range() {
        Jail::expect_with(|jail| {
            jail.set_env("OFFLOAD__WORKLOAD__CPU_MIN", "0");
            assert!(matches!(
                AppConfig::load(),
                Err(CommonError::InvalidArgument(_))
            ));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_dqn_options() {
        for (key, value) in [
            ("OFFLOAD__DQN__E_GREEDY", "1.5"),
            ("OFFLOAD__DQN__E_GREEDY", "-0.1"),
            ("OFFLOAD__DQN__LEARNING_RATE", "0"),
            ("OFFLOAD__DQN__LEARNING_RATE", "inf"),
        ] {
            Jail::expect_with(|jail| {
                jail.set_env(key, value);
                assert!(
                    matches!(AppConfig::load(), Err(CommonError::InvalidArgument(_))),
                    "{key}={value} accepted"
                );
                Ok(())
            });
        }
    }

    #[test]
    fn test_greedy_bounds_are_valid() {
        Jail::expect_with(|jail| {
            jail.set_env("OFFLOAD__DQN__E_GREEDY", "1");
            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.dqn.e_greedy, 1.0);
            Ok(())
        });
    }
}
