use std::mem;
use std::time::Duration;

use log::{debug, error};

use crate::device::DeviceKind;
use crate::engine::dqn::agent::Learner;
use crate::engine::dqn::replay::Transition;
use crate::engine::{TrainingEvent, TrainingScheduler};
use crate::error::{ExecutionError, ExecutionResult};
use crate::resource::DeviceCache;
use crate::task::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeState {
    Ready,
    /// A step is scheduled and the agent will act on the observation.
    AwaitAction { observation: Vec<f64> },
    /// Nothing can be placed until a device releases its resources.
    Waiting,
    Finished { total_time: f64 },
    /// An element does not fit any device even with all resources released.
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EpisodeEvent {
    Start,
    Step,
    /// The device at the action index finished an element and released the demand.
    Restored { action: usize, demand: f64 },
}

/// The reward for completing all elements of the task in the given total processing time.
pub fn terminal_reward(total_time: f64) -> f64 {
    if total_time > 28.0 {
        -300.0
    } else if total_time > 26.0 {
        -200.0
    } else if total_time > 25.0 {
        50.0
    } else if total_time > 24.0 {
        100.0
    } else if total_time > 23.0 {
        150.0
    } else {
        200.0
    }
}

/// One pass of placing every element of a task on the edge servers.
///
/// The episode plans against its own copy of the cache. Placing an element
/// deducts its demand from the chosen device, and the demand is added back
/// once the processing time has elapsed on the simulated clock.
pub struct Episode {
    id: usize,
    task: Task,
    cache: DeviceCache,
    state: EpisodeState,
    pending_restorations: usize,
}

impl Episode {
    pub fn new(id: usize, task: Task, cache: DeviceCache) -> Self {
        Self {
            id,
            task,
            cache,
            state: EpisodeState::Ready,
            pending_restorations: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> &EpisodeState {
        &self.state
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            EpisodeState::Finished { .. } | EpisodeState::Aborted
        )
    }

    pub fn on_event(
        &mut self,
        learner: &mut Learner,
        scheduler: &mut dyn TrainingScheduler,
        event: EpisodeEvent,
    ) -> ExecutionResult<()> {
        let state = mem::replace(&mut self.state, EpisodeState::Ready);
        let next = match (state, event) {
            (EpisodeState::Ready, EpisodeEvent::Start) => self.start(scheduler),
            (EpisodeState::AwaitAction { observation }, EpisodeEvent::Step) => {
                self.settle(learner, scheduler, observation)
            }
            (state, EpisodeEvent::Restored { action, demand }) => {
                self.restore(scheduler, state, action, demand)
            }
            (state, event) => {
                debug!("episode {} ignored {event:?} in state {state:?}", self.id);
                Ok(state)
            }
        };
        match next {
            Ok(state) => {
                self.state = state;
                Ok(())
            }
            Err(e) => {
                self.state = EpisodeState::Aborted;
                Err(e)
            }
        }
    }

    fn start(&mut self, scheduler: &mut dyn TrainingScheduler) -> ExecutionResult<EpisodeState> {
        self.task.reset();
        self.pending_restorations = 0;
        match self.next_demand() {
            Some(demand) => {
                let observation = self.observe(demand);
                self.schedule(scheduler, Duration::ZERO, EpisodeEvent::Step);
                Ok(EpisodeState::AwaitAction { observation })
            }
            None => Ok(EpisodeState::Finished { total_time: 0.0 }),
        }
    }

    fn settle(
        &mut self,
        learner: &mut Learner,
        scheduler: &mut dyn TrainingScheduler,
        observation: Vec<f64>,
    ) -> ExecutionResult<EpisodeState> {
        let Some(index) = self.task.first_unprocessed() else {
            return Ok(EpisodeState::Finished {
                total_time: self.task.total_processing_time(),
            });
        };
        let demand = self.task.elements()[index].cpu;
        let action = learner.agent_mut().choose_action(&observation)?;
        let average = self.cache.mean_processing_time(DeviceKind::Edge, demand);
        let entry = self.cache.get_mut(action).ok_or_else(|| {
            ExecutionError::internal(format!("action {action} is not a cached device"))
        })?;
        let supply = entry.cpu;

        if supply <= 0.0 || supply < demand {
            learner.agent_mut().store_transition(Transition {
                state: observation.clone(),
                action,
                reward: -average,
                next_state: observation.clone(),
            });
            learner.step()?;
            if self.pending_restorations > 0 {
                return Ok(EpisodeState::Waiting);
            }
            if self.cache.view().iter().any(|x| x.cpu > 0.0 && x.cpu >= demand) {
                self.schedule(scheduler, Duration::ZERO, EpisodeEvent::Step);
                return Ok(EpisodeState::AwaitAction { observation });
            }
            error!(
                "episode {}: task({}) with cpu demand {demand} does not fit any device",
                self.id,
                self.task.elements()[index].task_id
            );
            return Ok(EpisodeState::Aborted);
        }

        entry.cpu = supply - demand;
        let processing_time = demand / supply;
        let delay = Duration::try_from_secs_f64(processing_time).map_err(|e| {
            ExecutionError::internal(format!("invalid processing time {processing_time}: {e}"))
        })?;
        self.schedule(scheduler, delay, EpisodeEvent::Restored { action, demand });
        self.pending_restorations += 1;
        let element = &mut self.task.elements_mut()[index];
        element.status = TaskStatus::Finished;
        element.processing_time = Some(processing_time);

        match self.next_demand() {
            Some(next_demand) => {
                learner.agent_mut().store_transition(Transition {
                    state: observation,
                    action,
                    reward: average - processing_time,
                    next_state: self.observe(next_demand),
                });
                learner.step()?;
                Ok(EpisodeState::Waiting)
            }
            None => {
                let total_time = self.task.total_processing_time();
                learner.agent_mut().store_transition(Transition {
                    state: observation,
                    action,
                    reward: terminal_reward(total_time),
                    next_state: self.observe(demand),
                });
                Ok(EpisodeState::Finished { total_time })
            }
        }
    }

    fn restore(
        &mut self,
        scheduler: &mut dyn TrainingScheduler,
        state: EpisodeState,
        action: usize,
        demand: f64,
    ) -> ExecutionResult<EpisodeState> {
        self.pending_restorations = self.pending_restorations.saturating_sub(1);
        let entry = self.cache.get_mut(action).ok_or_else(|| {
            ExecutionError::internal(format!("action {action} is not a cached device"))
        })?;
        entry.cpu += demand;
        let waiting = match &state {
            EpisodeState::Waiting => true,
            EpisodeState::AwaitAction { .. } => false,
            _ => return Ok(state),
        };
        match self.next_demand() {
            Some(next_demand) => {
                let observation = self.observe(next_demand);
                if waiting {
                    self.schedule(scheduler, Duration::ZERO, EpisodeEvent::Step);
                }
                Ok(EpisodeState::AwaitAction { observation })
            }
            None => Ok(state),
        }
    }

    fn next_demand(&self) -> Option<f64> {
        self.task
            .first_unprocessed()
            .map(|index| self.task.elements()[index].cpu)
    }

    fn observe(&self, demand: f64) -> Vec<f64> {
        let mut observation = self.cache.cpu_values();
        observation.push(demand);
        observation
    }

    fn schedule(&self, scheduler: &mut dyn TrainingScheduler, delay: Duration, event: EpisodeEvent) {
        scheduler.schedule(
            delay,
            TrainingEvent::Episode {
                episode: self.id,
                event,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use offload_server::actor::{Actor, ActorAction, ActorContext, ActorSystem};

    use super::*;
    use crate::device::Topology;
    use crate::engine::dqn::agent::DeepQNetwork;
    use crate::engine::dqn::options::test_options;
    use crate::id::TaskId;
    use crate::task::TaskElement;

    struct EpisodeActor {
        episode: Episode,
        learner: Learner,
    }

    impl TrainingScheduler for ActorContext<EpisodeActor> {
        fn now(&self) -> Duration {
            ActorContext::now(self)
        }

        fn schedule(&mut self, delay: Duration, event: TrainingEvent) {
            self.send_with_delay(event, delay);
        }
    }

    impl Actor for EpisodeActor {
        type Message = TrainingEvent;
        type Options = (Episode, Learner);
        type Error = ExecutionError;

        fn new((episode, learner): Self::Options) -> ExecutionResult<Self> {
            Ok(Self { episode, learner })
        }

        fn start(&mut self, ctx: &mut ActorContext<Self>) -> ExecutionResult<()> {
            ctx.send(TrainingEvent::Episode {
                episode: self.episode.id(),
                event: EpisodeEvent::Start,
            });
            Ok(())
        }

        fn receive(
            &mut self,
            ctx: &mut ActorContext<Self>,
            message: TrainingEvent,
        ) -> ExecutionResult<ActorAction> {
            if let TrainingEvent::Episode { event, .. } = message {
                self.episode.on_event(&mut self.learner, ctx, event)?;
            }
            Ok(ActorAction::Continue)
        }

        fn stop(self) -> ExecutionResult<()> {
            Ok(())
        }
    }

    fn run(edges: &[f64], demands: &[f64]) -> ExecutionResult<ActorSystem<EpisodeActor>> {
        let mut builder = Topology::builder();
        for cpu in edges {
            builder = builder.edge(*cpu);
        }
        let topology = builder.build()?;
        let cache = DeviceCache::build(topology.registry.of_kind(DeviceKind::Edge));
        let task = Task::new(
            demands
                .iter()
                .enumerate()
                .map(|(i, cpu)| TaskElement::new(TaskId::from(i as u64 + 1), "g", 1.0, *cpu, 2.0))
                .collect(),
        );
        let options = test_options(0.9);
        let agent = DeepQNetwork::new(cache.size(), cache.size() + 1, options.clone())?;
        let learner = Learner::new(agent, &options);
        let mut system = ActorSystem::new((Episode::new(1, task, cache), learner))?;
        system.run()?;
        Ok(system)
    }

    #[test]
    fn test_terminal_reward() {
        assert_eq!(terminal_reward(24.5), 100.0);
        assert_eq!(terminal_reward(30.0), -300.0);
        assert_eq!(terminal_reward(27.0), -200.0);
        assert_eq!(terminal_reward(25.5), 50.0);
        assert_eq!(terminal_reward(23.5), 150.0);
        assert_eq!(terminal_reward(10.0), 200.0);
    }

    #[test]
    fn test_wait_for_released_resources() -> ExecutionResult<()> {
        let system = run(&[2.0], &[1.5, 1.5])?;
        let actor = system.actor();
        assert_eq!(actor.episode.state(), &EpisodeState::Finished { total_time: 1.5 });
        let times = actor
            .episode
            .task()
            .elements()
            .iter()
            .map(|x| x.processing_time)
            .collect::<Vec<_>>();
        assert_eq!(times, vec![Some(0.75), Some(0.75)]);
        // The second element starts once the first one releases its demand.
        assert_eq!(system.now(), Duration::from_secs_f64(1.5));
        assert!((actor.episode.cache().view()[0].cpu - 2.0).abs() < 1e-9);
        assert_eq!(actor.learner.agent().memory().stored(), 2);
        Ok(())
    }

    #[test]
    fn test_abort_when_nothing_fits() -> ExecutionResult<()> {
        let system = run(&[1.0, 0.5], &[1.5])?;
        let actor = system.actor();
        assert_eq!(actor.episode.state(), &EpisodeState::Aborted);
        assert_eq!(actor.learner.agent().memory().stored(), 1);
        let transitions = actor.learner.agent().memory().iter().collect::<Vec<_>>();
        let transition = transitions[0];
        // The penalty is the mean of 1.5 / 1.0 and 1.5 / 0.5.
        assert_eq!(transition.reward, -2.25);
        assert_eq!(transition.state, vec![1.0, 0.5, 1.5]);
        assert_eq!(transition.next_state, transition.state);
        Ok(())
    }

    #[test]
    fn test_step_rewards() -> ExecutionResult<()> {
        let system = run(&[2.0, 4.0, 1.0], &[1.5, 1.0])?;
        let actor = system.actor();
        let transitions = actor.learner.agent().memory().iter().collect::<Vec<_>>();
        let Some((last, steps)) = transitions.split_last() else {
            panic!("no transition was stored");
        };

        // The mean processing time of demand 1.5 is (0.75 + 0.375 + 1.5) / 3 = 0.875.
        let mut placed = 0;
        for transition in steps {
            assert_eq!(transition.state, vec![2.0, 4.0, 1.0, 1.5]);
            match transition.action {
                0 => {
                    assert_eq!(transition.reward, 0.125);
                    assert_eq!(transition.next_state, vec![0.5, 4.0, 1.0, 1.0]);
                    placed += 1;
                }
                1 => {
                    assert_eq!(transition.reward, 0.5);
                    assert_eq!(transition.next_state, vec![2.0, 2.5, 1.0, 1.0]);
                    placed += 1;
                }
                2 => {
                    assert_eq!(transition.reward, -0.875);
                    assert_eq!(transition.next_state, transition.state);
                }
                action => panic!("unexpected action {action}"),
            }
        }
        assert_eq!(placed, 1);

        // The second element is decided once the first one has released its demand.
        assert_eq!(last.state, vec![2.0, 4.0, 1.0, 1.0]);
        assert_eq!(last.reward, terminal_reward(actor.episode.task().total_processing_time()));
        assert_eq!(last.reward, 200.0);
        Ok(())
    }

    #[test]
    fn test_action_indexes_stay_stable() -> ExecutionResult<()> {
        let system = run(&[2.1, 2.2, 2.15], &[0.5, 0.7, 1.1, 0.9])?;
        let actor = system.actor();
        assert!(matches!(actor.episode.state(), EpisodeState::Finished { .. }));
        let ids = actor
            .episode
            .cache()
            .view()
            .iter()
            .map(|x| u64::from(x.device_id))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![2, 3, 4]);
        assert!(actor
            .episode
            .task()
            .elements()
            .iter()
            .all(|x| x.status == TaskStatus::Finished));
        Ok(())
    }
}
