use log::warn;

use crate::device::{DeviceKind, DeviceRegistry};
use crate::engine::dqn::EpisodeCallback;
use crate::engine::{Decision, DecisionEngine, TrainingEvent, TrainingScheduler};
use crate::error::{ExecutionError, ExecutionResult};
use crate::resource::{CachedDevice, DeviceCache};
use crate::task::{Task, TaskElement};

/// Greedy deadline-aware placement.
///
/// The element goes to the edge server with the most cpu if that server
/// can finish it before the deadline, and to the cloud otherwise.
/// The cloud always accepts, so its capacity and the deadline are not checked.
#[derive(Debug, Default)]
pub struct RuleBasedEngine {
    cache: DeviceCache,
}

impl RuleBasedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn best_edge(&self) -> Option<&CachedDevice> {
        self.cache
            .view()
            .iter()
            .filter(|x| x.kind == DeviceKind::Edge)
            .fold(None, |best: Option<&CachedDevice>, x| match best {
                Some(b) if b.cpu >= x.cpu => Some(b),
                _ => Some(x),
            })
    }
}

impl DecisionEngine for RuleBasedEngine {
    fn name(&self) -> &'static str {
        "rule-based"
    }

    fn initialize(&mut self, devices: &DeviceRegistry) -> ExecutionResult<()> {
        self.cache = DeviceCache::build(
            devices
                .iter()
                .filter(|x| matches!(x.kind, DeviceKind::Edge | DeviceKind::Cloud)),
        );
        if self.cache.is_empty() {
            return Err(ExecutionError::invalid(
                "the rule-based engine needs at least one edge or cloud server",
            ));
        }
        Ok(())
    }

    fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    fn cache_mut(&mut self) -> &mut DeviceCache {
        &mut self.cache
    }

    fn make_decision(&self, element: &TaskElement) -> Option<Decision> {
        let demand = element.cpu;
        if let Some(edge) = self.best_edge() {
            let supply = edge.cpu;
            if supply > 0.0 && supply >= demand && demand / supply < element.deadline {
                return Some(Decision {
                    device_id: edge.device_id,
                    endpoint: edge.endpoint,
                    kind: DeviceKind::Edge,
                    cpu_supply: Some(supply),
                });
            }
        }
        self.cache
            .find_if(|x| x.kind == DeviceKind::Cloud)
            .map(|(_, cloud)| Decision {
                device_id: cloud.device_id,
                endpoint: cloud.endpoint,
                kind: DeviceKind::Cloud,
                cpu_supply: None,
            })
    }

    fn train(
        &mut self,
        _scheduler: &mut dyn TrainingScheduler,
        _task: Task,
        _episodes: usize,
    ) -> ExecutionResult<()> {
        warn!("the rule-based engine does not need training");
        Ok(())
    }

    fn on_training_event(
        &mut self,
        _scheduler: &mut dyn TrainingScheduler,
        event: TrainingEvent,
    ) -> ExecutionResult<()> {
        warn!("the rule-based engine ignores training event {event:?}");
        Ok(())
    }

    fn when_episode_done(&mut self, _callback: EpisodeCallback) -> ExecutionResult<()> {
        Err(ExecutionError::invalid(
            "the rule-based engine does not run training episodes",
        ))
    }
}
