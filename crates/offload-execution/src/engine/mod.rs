pub mod dqn;
mod rule_based;

use std::time::Duration;

pub use rule_based::RuleBasedEngine;

use crate::device::{DeviceKind, DeviceRegistry, Endpoint};
use crate::engine::dqn::{EpisodeCallback, EpisodeEvent};
use crate::error::ExecutionResult;
use crate::id::DeviceId;
use crate::resource::DeviceCache;
use crate::task::{Task, TaskElement};

/// The placement chosen for a task element.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub device_id: DeviceId,
    pub endpoint: Endpoint,
    pub kind: DeviceKind,
    /// The cpu supply the engine believed the device had when deciding.
    /// The device compares it against its own record to detect conflicts.
    pub cpu_supply: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    Episode { episode: usize, event: EpisodeEvent },
    NextEpisode,
}

/// The simulated clock that drives training.
pub trait TrainingScheduler {
    fn now(&self) -> Duration;
    fn schedule(&mut self, delay: Duration, event: TrainingEvent);
}

/// A strategy that places task elements on devices.
pub trait DecisionEngine {
    fn name(&self) -> &'static str;

    /// Builds the resource cache from the provisioned devices.
    fn initialize(&mut self, devices: &DeviceRegistry) -> ExecutionResult<()>;

    fn cache(&self) -> &DeviceCache;

    fn cache_mut(&mut self) -> &mut DeviceCache;

    /// Returns the device that should run the element,
    /// or [None] if no device is feasible.
    fn make_decision(&self, element: &TaskElement) -> Option<Decision>;

    fn train(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        task: Task,
        episodes: usize,
    ) -> ExecutionResult<()>;

    fn on_training_event(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        event: TrainingEvent,
    ) -> ExecutionResult<()>;

    fn when_episode_done(&mut self, callback: EpisodeCallback) -> ExecutionResult<()>;
}
