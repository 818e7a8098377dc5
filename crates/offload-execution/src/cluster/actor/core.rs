use std::time::Duration;

use indexmap::IndexMap;
use log::{error, info};
use offload_common::config::EngineKind;
use offload_server::actor::{Actor, ActorAction, ActorContext};

use crate::client::{Client, DoneCallback};
use crate::cluster::actor::ClusterActor;
use crate::cluster::{ClusterEvent, ClusterOptions};
use crate::coordinator::Coordinator;
use crate::device::{DeviceRegistry, Topology};
use crate::engine::dqn::{DqnEngine, EpisodeCallback};
use crate::engine::{Decision, DecisionEngine, RuleBasedEngine, TrainingEvent, TrainingScheduler};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::DeviceId;
use crate::task::TaskElement;

impl Actor for ClusterActor {
    type Message = ClusterEvent;
    type Options = (ClusterOptions, Topology);
    type Error = ExecutionError;

    fn new((options, topology): Self::Options) -> ExecutionResult<Self> {
        let Topology {
            registry,
            base_station,
            clients,
            ..
        } = topology;
        let mut engine: Box<dyn DecisionEngine> = match options.engine {
            EngineKind::RuleBased => Box::new(RuleBasedEngine::new()),
            EngineKind::Dqn => Box::new(DqnEngine::new(options.dqn.clone())),
        };
        engine.initialize(&registry)?;
        info!("using the {} decision engine", engine.name());
        let bs = registry.try_get(base_station)?;
        let coordinator = Coordinator::new(bs.id, bs.endpoint, engine);
        let clients = clients
            .iter()
            .map(|id| {
                let device = registry.try_get(*id)?;
                Ok((*id, Client::new(device.id, device.endpoint)))
            })
            .collect::<ExecutionResult<IndexMap<_, _>>>()?;
        let next_launch_delay = options.launch_delay;
        Ok(Self {
            options,
            devices: registry,
            coordinator,
            clients,
            next_launch_delay,
        })
    }

    fn start(&mut self, ctx: &mut ActorContext<Self>) -> ExecutionResult<()> {
        if let Some(stop_time) = self.options.stop_time {
            ctx.send_with_delay(ClusterEvent::Shutdown, stop_time);
        }
        Ok(())
    }

    fn receive(
        &mut self,
        ctx: &mut ActorContext<Self>,
        message: ClusterEvent,
    ) -> ExecutionResult<ActorAction> {
        let action = match &message {
            ClusterEvent::Shutdown => ActorAction::Stop,
            _ => ActorAction::Continue,
        };
        let out = match message {
            ClusterEvent::SubmitTask { client, task } => self.handle_submit_task(ctx, client, task),
            ClusterEvent::Deliver { from, to, payload } => {
                self.handle_deliver(ctx, from, to, payload)
            }
            ClusterEvent::TaskCompleted {
                device,
                element,
                reply_to,
                processing_time,
                demand,
            } => self.handle_task_completed(ctx, device, element, reply_to, processing_time, demand),
            ClusterEvent::HandleNext => {
                let outgoing = self.coordinator.handle_next();
                self.dispatch(ctx, outgoing)
            }
            ClusterEvent::ResourceChanged { device, cpu } => {
                self.handle_resource_changed(device, cpu);
                Ok(())
            }
            ClusterEvent::Train { task, episodes } => {
                self.coordinator.engine_mut().train(ctx, task, episodes)
            }
            ClusterEvent::Training(event) => {
                self.coordinator.engine_mut().on_training_event(ctx, event)
            }
            ClusterEvent::Shutdown => Ok(()),
        };
        if let Err(e) = out {
            error!("error processing cluster event: {e}");
        }
        Ok(action)
    }

    fn stop(self) -> ExecutionResult<()> {
        info!("cluster stopped");
        Ok(())
    }
}

impl TrainingScheduler for ActorContext<ClusterActor> {
    fn now(&self) -> Duration {
        ActorContext::now(self)
    }

    fn schedule(&mut self, delay: Duration, event: TrainingEvent) {
        self.send_with_delay(ClusterEvent::Training(event), delay);
    }
}

impl ClusterActor {
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.devices
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn client(&self, id: DeviceId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn client_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.clients.keys().copied()
    }

    pub fn make_decision(&self, element: &TaskElement) -> Option<Decision> {
        self.coordinator.make_decision(element)
    }

    pub fn when_done(&mut self, client: DeviceId, callback: DoneCallback) -> ExecutionResult<()> {
        self.clients
            .get_mut(&client)
            .ok_or_else(|| ExecutionError::DeviceNotFound(format!("client {client}")))?
            .when_done(callback);
        Ok(())
    }

    pub fn when_episode_done(&mut self, callback: EpisodeCallback) -> ExecutionResult<()> {
        self.coordinator.engine_mut().when_episode_done(callback)
    }
}
