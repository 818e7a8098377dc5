use std::time::Duration;

use offload_common::config::{AppConfig, EngineKind};

use crate::engine::dqn::DqnOptions;
use crate::error::{ExecutionError, ExecutionResult};

#[readonly::make]
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    pub engine: EngineKind,
    pub network_latency: Duration,
    pub launch_delay: Duration,
    pub launch_delay_step: Duration,
    pub stop_time: Option<Duration>,
    pub dqn: DqnOptions,
}

impl ClusterOptions {
    pub fn new(config: &AppConfig) -> ExecutionResult<Self> {
        let stop_time = match config.simulation.stop_time_secs {
            x if x > 0.0 => Some(seconds(x)?),
            _ => None,
        };
        Ok(Self {
            engine: config.engine.kind,
            network_latency: seconds(config.simulation.network_latency_secs)?,
            launch_delay: seconds(config.simulation.launch_delay_secs)?,
            launch_delay_step: seconds(config.simulation.launch_delay_step_secs)?,
            stop_time,
            dqn: DqnOptions::new(&config.dqn, config.simulation.seed),
        })
    }
}

fn seconds(value: f64) -> ExecutionResult<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| ExecutionError::invalid(format!("invalid duration {value}s: {e}")))
}
