mod agent;
mod episode;
mod network;
mod options;
mod replay;
mod trainer;

use std::cmp::Ordering;

use log::warn;

pub use agent::{DeepQNetwork, Learner, TrainingSteps};
pub use episode::{terminal_reward, Episode, EpisodeEvent, EpisodeState};
pub use network::{argmax, QNetwork};
pub use options::DqnOptions;
pub use replay::{ReplayBuffer, Transition};
pub use trainer::{EpisodeCallback, EpisodeSummary, EpisodeTrainer};

use crate::device::{DeviceKind, DeviceRegistry};
use crate::engine::{Decision, DecisionEngine, TrainingEvent, TrainingScheduler};
use crate::error::{ExecutionError, ExecutionResult};
use crate::resource::{CachedDevice, DeviceCache};
use crate::task::{Task, TaskElement};

/// Placement learned with deep Q-learning over the edge servers.
///
/// Each edge server is an action, identified by its index in the cache.
/// The observation is the believed cpu of every edge server followed by
/// the demand of the element to place. The cloud is not an action and
/// only serves elements that no edge server has the cpu for.
pub struct DqnEngine {
    options: DqnOptions,
    cache: DeviceCache,
    cloud: Option<CachedDevice>,
    trainer: Option<EpisodeTrainer>,
}

impl DqnEngine {
    pub fn new(options: DqnOptions) -> Self {
        Self {
            options,
            cache: DeviceCache::default(),
            cloud: None,
            trainer: None,
        }
    }

    pub fn trainer(&self) -> Option<&EpisodeTrainer> {
        self.trainer.as_ref()
    }

    fn trainer_mut(&mut self) -> ExecutionResult<&mut EpisodeTrainer> {
        self.trainer
            .as_mut()
            .ok_or_else(|| ExecutionError::invalid("the DQN engine is not initialized"))
    }

    fn observe(&self, demand: f64) -> Vec<f64> {
        let mut observation = self.cache.cpu_values();
        observation.push(demand);
        observation
    }
}

impl DecisionEngine for DqnEngine {
    fn name(&self) -> &'static str {
        "dqn"
    }

    fn initialize(&mut self, devices: &DeviceRegistry) -> ExecutionResult<()> {
        self.cache = DeviceCache::build(devices.of_kind(DeviceKind::Edge));
        if self.cache.is_empty() {
            return Err(ExecutionError::invalid(
                "the DQN engine needs at least one edge server",
            ));
        }
        self.cloud = devices
            .of_kind(DeviceKind::Cloud)
            .next()
            .map(|device| CachedDevice {
                device_id: device.id,
                endpoint: device.endpoint,
                kind: device.kind,
                cpu: device.resource.cpu(),
            });
        let n_actions = self.cache.size();
        let agent = DeepQNetwork::new(n_actions, n_actions + 1, self.options.clone())?;
        self.trainer = Some(EpisodeTrainer::new(Learner::new(agent, &self.options)));
        Ok(())
    }

    fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut DeviceCache {
        &mut self.cache
    }

    fn make_decision(&self, element: &TaskElement) -> Option<Decision> {
        let trainer = self.trainer.as_ref()?;
        let demand = element.cpu;
        let q_values = match trainer.learner().agent().q_values(&self.observe(demand)) {
            Ok(x) => x,
            Err(e) => {
                warn!("failed to evaluate task({}): {e}", element.task_id);
                vec![0.0; self.cache.size()]
            }
        };
        let mut actions = (0..q_values.len()).collect::<Vec<_>>();
        actions.sort_by(|a, b| {
            q_values[*b]
                .partial_cmp(&q_values[*a])
                .unwrap_or(Ordering::Equal)
        });
        let edge = actions.into_iter().find_map(|action| {
            let device = self.cache.get(action)?;
            let supply = device.cpu;
            (supply > 0.0 && supply >= demand).then_some(device)
        });
        if let Some(device) = edge {
            return Some(Decision {
                device_id: device.device_id,
                endpoint: device.endpoint,
                kind: DeviceKind::Edge,
                cpu_supply: Some(device.cpu),
            });
        }
        self.cloud.as_ref().map(|cloud| Decision {
            device_id: cloud.device_id,
            endpoint: cloud.endpoint,
            kind: DeviceKind::Cloud,
            cpu_supply: None,
        })
    }

    fn train(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        task: Task,
        episodes: usize,
    ) -> ExecutionResult<()> {
        let cache = self.cache.clone();
        self.trainer_mut()?.train(scheduler, task, episodes, &cache)
    }

    fn on_training_event(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        event: TrainingEvent,
    ) -> ExecutionResult<()> {
        let cache = self.cache.clone();
        self.trainer_mut()?.on_event(scheduler, event, &cache)
    }

    fn when_episode_done(&mut self, callback: EpisodeCallback) -> ExecutionResult<()> {
        self.trainer_mut()?.set_callback(callback);
        Ok(())
    }
}
