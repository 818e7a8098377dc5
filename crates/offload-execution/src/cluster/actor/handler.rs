use std::time::Duration;

use log::{error, info, warn};
use offload_server::actor::ActorContext;

use crate::cluster::actor::ClusterActor;
use crate::cluster::ClusterEvent;
use crate::coordinator::Outgoing;
use crate::device::{DeviceKind, Endpoint};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::DeviceId;
use crate::message::{Message, ResponseContent};
use crate::task::{Task, TaskElement, TaskStatus};
use crate::worker::{self, Resolution};

impl ClusterActor {
    pub(super) fn handle_submit_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        client: DeviceId,
        task: Task,
    ) -> ExecutionResult<()> {
        let client = self
            .clients
            .get_mut(&client)
            .ok_or_else(|| ExecutionError::DeviceNotFound(format!("client {client}")))?;
        let from = client.endpoint();
        let elements = client.prepare(task);
        let to = self.coordinator.endpoint();
        for element in elements {
            let delay = self.next_launch_delay;
            info!(
                "client({from}) sends task({}) at {:.6}s",
                element.task_id,
                (ctx.now() + delay).as_secs_f64()
            );
            self.send_message(ctx, from, to, &Message::Decision { element }, delay)?;
            self.next_launch_delay += self.options.launch_delay_step;
        }
        Ok(())
    }

    pub(super) fn handle_deliver(
        &mut self,
        ctx: &mut ActorContext<Self>,
        from: Endpoint,
        to: Endpoint,
        payload: Vec<u8>,
    ) -> ExecutionResult<()> {
        let message = match Message::decode(&payload) {
            Ok(x) => x,
            Err(e) => {
                warn!("dropped a message from {from} to {to}: {e}");
                return Ok(());
            }
        };
        let Some(device) = self.devices.find_by_endpoint(&to) else {
            warn!("dropped a message from {from} to unknown device {to}");
            return Ok(());
        };
        let (device_id, kind) = (device.id, device.kind);
        match (kind, message) {
            (DeviceKind::BaseStation, Message::Decision { element }) => {
                let outgoing = self.coordinator.on_decision(from, element);
                self.dispatch(ctx, outgoing)
            }
            (DeviceKind::BaseStation, Message::Response { content }) => {
                let outgoing = self.coordinator.on_response(content);
                self.dispatch(ctx, outgoing)
            }
            (
                DeviceKind::Edge,
                Message::Handling {
                    element,
                    cpu_supply,
                },
            ) => self.handle_edge_task(ctx, device_id, from, element, cpu_supply),
            (DeviceKind::Cloud, Message::Handling { element, .. }) => {
                self.handle_cloud_task(ctx, device_id, from, element)
            }
            (DeviceKind::Client, Message::Response { content }) => {
                self.handle_client_response(device_id, content)
            }
            (kind, message) => {
                warn!(
                    "device {to} ({kind}) cannot handle a {:?} message",
                    message.message_type()
                );
                Ok(())
            }
        }
    }

    fn handle_edge_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        device_id: DeviceId,
        reply_to: Endpoint,
        mut element: TaskElement,
        cpu_supply: Option<f64>,
    ) -> ExecutionResult<()> {
        let demand = element.cpu;
        let device = self.devices.try_get(device_id)?;
        let endpoint = device.endpoint;
        let authoritative = device.resource.cpu();
        match worker::resolve(cpu_supply, authoritative, demand) {
            Resolution::Conflict => {
                error!(
                    "conflict at edge server({endpoint}): task({}) assumed cpu {cpu_supply:?} \
                     but {authoritative} is left for demand {demand}",
                    element.task_id
                );
                element.status = TaskStatus::Unprocessed;
                let coordinator = self.coordinator.endpoint();
                self.send_message(
                    ctx,
                    endpoint,
                    coordinator,
                    &Message::Decision { element },
                    Duration::ZERO,
                )
            }
            Resolution::Accept => {
                let device = self.devices.try_get_mut(device_id)?;
                let acceptance = match worker::accept(&mut device.resource, demand) {
                    Ok(x) => x,
                    Err(e) => {
                        warn!("edge server({endpoint}) rejected task({}): {e}", element.task_id);
                        return self.reply_failure(ctx, endpoint, reply_to, &element);
                    }
                };
                info!(
                    "edge server({endpoint}) accepted task({}): cpu {} -> {}, processing time {:.6}s",
                    element.task_id,
                    acceptance.supply,
                    acceptance.remaining,
                    acceptance.processing_time
                );
                let delay = processing_delay(acceptance.processing_time)?;
                ctx.send_with_delay(
                    ClusterEvent::ResourceChanged {
                        device: device_id,
                        cpu: acceptance.remaining,
                    },
                    self.options.network_latency,
                );
                ctx.send_with_delay(
                    ClusterEvent::TaskCompleted {
                        device: device_id,
                        element,
                        reply_to,
                        processing_time: acceptance.processing_time,
                        demand: Some(demand),
                    },
                    delay,
                );
                Ok(())
            }
        }
    }

    fn handle_cloud_task(
        &mut self,
        ctx: &mut ActorContext<Self>,
        device_id: DeviceId,
        reply_to: Endpoint,
        element: TaskElement,
    ) -> ExecutionResult<()> {
        let device = self.devices.try_get(device_id)?;
        let endpoint = device.endpoint;
        let processing_time = match worker::unbounded_processing_time(&device.resource, element.cpu)
        {
            Ok(Some(x)) => x,
            Ok(None) => {
                error!(
                    "cloud server({endpoint}) has no cpu for task({})",
                    element.task_id
                );
                return self.reply_failure(ctx, endpoint, reply_to, &element);
            }
            Err(e) => {
                warn!("cloud server({endpoint}) rejected task({}): {e}", element.task_id);
                return self.reply_failure(ctx, endpoint, reply_to, &element);
            }
        };
        info!(
            "cloud server({endpoint}) accepted task({}), processing time {processing_time:.6}s",
            element.task_id
        );
        ctx.send_with_delay(
            ClusterEvent::TaskCompleted {
                device: device_id,
                element,
                reply_to,
                processing_time,
                demand: None,
            },
            processing_delay(processing_time)?,
        );
        Ok(())
    }

    pub(super) fn handle_task_completed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        device_id: DeviceId,
        element: TaskElement,
        reply_to: Endpoint,
        processing_time: f64,
        demand: Option<f64>,
    ) -> ExecutionResult<()> {
        let device = self.devices.try_get_mut(device_id)?;
        let endpoint = device.endpoint;
        let kind = device.kind;
        if let Some(demand) = demand {
            let (old, new) = worker::release(&mut device.resource, demand);
            info!(
                "server({endpoint}) finished task({}): cpu {old} -> {new}",
                element.task_id
            );
            ctx.send_with_delay(
                ClusterEvent::ResourceChanged {
                    device: device_id,
                    cpu: new,
                },
                self.options.network_latency,
            );
        } else {
            info!("server({endpoint}) finished task({})", element.task_id);
        }
        let content = ResponseContent {
            device_type: Some(kind),
            device_address: Some(endpoint.host.to_string()),
            processing_time: Some(processing_time),
            ..ResponseContent::failure(&element)
        };
        self.send_message(
            ctx,
            endpoint,
            reply_to,
            &Message::Response { content },
            Duration::ZERO,
        )
    }

    pub(super) fn handle_resource_changed(&mut self, device_id: DeviceId, cpu: f64) {
        self.coordinator.on_resource_changed(device_id, cpu);
    }

    fn handle_client_response(
        &mut self,
        device_id: DeviceId,
        content: ResponseContent,
    ) -> ExecutionResult<()> {
        self.clients
            .get_mut(&device_id)
            .ok_or_else(|| ExecutionError::DeviceNotFound(format!("client {device_id}")))?
            .receive(content);
        Ok(())
    }

    fn reply_failure(
        &self,
        ctx: &mut ActorContext<Self>,
        from: Endpoint,
        to: Endpoint,
        element: &TaskElement,
    ) -> ExecutionResult<()> {
        let content = ResponseContent::failure(element);
        self.send_message(ctx, from, to, &Message::Response { content }, Duration::ZERO)
    }

    pub(super) fn dispatch(
        &self,
        ctx: &mut ActorContext<Self>,
        outgoing: impl IntoIterator<Item = Outgoing>,
    ) -> ExecutionResult<()> {
        let from = self.coordinator.endpoint();
        for Outgoing { to, message } in outgoing {
            self.send_message(ctx, from, to, &message, Duration::ZERO)?;
        }
        Ok(())
    }

    /// Encodes the message and delivers it after the delay plus the network latency.
    fn send_message(
        &self,
        ctx: &mut ActorContext<Self>,
        from: Endpoint,
        to: Endpoint,
        message: &Message,
        delay: Duration,
    ) -> ExecutionResult<()> {
        let payload = message.encode()?;
        ctx.send_with_delay(
            ClusterEvent::Deliver { from, to, payload },
            delay + self.options.network_latency,
        );
        Ok(())
    }
}

fn processing_delay(seconds: f64) -> ExecutionResult<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| {
        ExecutionError::internal(format!("invalid processing time {seconds}s: {e}"))
    })
}
