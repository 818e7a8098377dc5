use log::{debug, error, info, warn};

use crate::coordinator::{Coordinator, Outgoing};
use crate::device::{DeviceKind, Endpoint};
use crate::engine::{Decision, DecisionEngine};
use crate::id::DeviceId;
use crate::message::{Message, ResponseContent};
use crate::task::{TaskElement, TaskStatus};

impl Coordinator {
    pub fn new(device_id: DeviceId, endpoint: Endpoint, engine: Box<dyn DecisionEngine>) -> Self {
        Self {
            device_id,
            endpoint,
            engine,
            task_sequence: vec![],
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn engine(&self) -> &dyn DecisionEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn DecisionEngine {
        self.engine.as_mut()
    }

    pub fn task_sequence(&self) -> &[TaskElement] {
        &self.task_sequence
    }

    pub fn make_decision(&self, element: &TaskElement) -> Option<Decision> {
        self.engine.make_decision(element)
    }

    /// Accepts an element sent by a client, or an element returned by a server
    /// after a resource conflict, and decides the next pending element.
    ///
    /// Elements are identified by their origin, group and task id. A client
    /// submitting an element that is already in the sequence is ignored.
    pub fn on_decision(&mut self, from: Endpoint, element: TaskElement) -> Option<Outgoing> {
        let resubmitted = element.origin() == Some(from);
        match self
            .task_sequence
            .iter_mut()
            .find(|x| is_same_element(x, &element))
        {
            Some(existing) if resubmitted => {
                error!(
                    "client({from}) submitted task({}) of group {} twice",
                    existing.task_id, existing.group
                );
                return None;
            }
            Some(existing) => {
                debug!("task({}) needs another decision", existing.task_id);
                existing.status = TaskStatus::Unprocessed;
            }
            None => {
                let mut element = element;
                element.status = TaskStatus::Unprocessed;
                self.task_sequence.push(element);
            }
        }
        self.handle_next()
    }

    /// Decides the first unprocessed element, if any.
    ///
    /// An element that no device can handle is removed, and a failure
    /// response is addressed to the client that sent it.
    pub fn handle_next(&mut self) -> Option<Outgoing> {
        let index = self.task_sequence.iter().position(|x| x.is_unprocessed())?;
        match self.engine.make_decision(&self.task_sequence[index]) {
            Some(decision) => {
                let element = &mut self.task_sequence[index];
                element.status = TaskStatus::Dispatched;
                if decision.kind == DeviceKind::Cloud {
                    warn!(
                        "offloading task({}) to the cloud server({})",
                        element.task_id, decision.endpoint
                    );
                } else {
                    info!(
                        "offloading task({}) to the edge server({}) believed to have cpu {:?}",
                        element.task_id, decision.endpoint, decision.cpu_supply
                    );
                }
                Some(Outgoing {
                    to: decision.endpoint,
                    message: Message::Handling {
                        element: element.clone(),
                        cpu_supply: decision.cpu_supply,
                    },
                })
            }
            None => {
                let element = self.task_sequence.remove(index);
                error!(
                    "no device can handle task({}) of group {}",
                    element.task_id, element.group
                );
                let Some(origin) = element.origin() else {
                    error!("task({}) has no origin", element.task_id);
                    return None;
                };
                let content = ResponseContent::failure(&element);
                Some(Outgoing {
                    to: origin,
                    message: Message::Response { content },
                })
            }
        }
    }

    /// Relays the response of a server to the client that sent the element,
    /// then decides the next pending element.
    pub fn on_response(&mut self, content: ResponseContent) -> Vec<Outgoing> {
        let mut outgoing = vec![];
        match self
            .task_sequence
            .iter()
            .position(|x| content.is_for(x))
        {
            Some(index) => {
                let element = self.task_sequence.remove(index);
                match element.origin() {
                    Some(origin) => outgoing.push(Outgoing {
                        to: origin,
                        message: Message::Response { content },
                    }),
                    None => error!("task({}) has no origin", element.task_id),
                }
            }
            None => warn!(
                "received a response for unknown task({}) of group {:?} from {:?}",
                content.task_id,
                content.group,
                content.origin()
            ),
        }
        outgoing.extend(self.handle_next());
        outgoing
    }

    pub fn on_resource_changed(&mut self, device_id: DeviceId, cpu: f64) {
        if self.engine.cache_mut().sync(device_id, cpu) {
            debug!("device {device_id} reported cpu {cpu}");
        } else {
            debug!("device {device_id} is not known to the decision engine");
        }
    }
}

fn is_same_element(a: &TaskElement, b: &TaskElement) -> bool {
    a.task_id == b.task_id && a.group == b.group && a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::device::Topology;
    use crate::engine::RuleBasedEngine;
    use crate::error::ExecutionResult;
    use crate::id::TaskId;

    fn coordinator(edges: &[f64], cloud: Option<f64>) -> ExecutionResult<Coordinator> {
        let mut builder = Topology::builder();
        for cpu in edges {
            builder = builder.edge(*cpu);
        }
        if let Some(cpu) = cloud {
            builder = builder.cloud(cpu);
        }
        let topology = builder.build()?;
        let mut engine = RuleBasedEngine::new();
        engine.initialize(&topology.registry)?;
        let bs = topology.registry.try_get(topology.base_station)?;
        Ok(Coordinator::new(bs.id, bs.endpoint, Box::new(engine)))
    }

    fn client() -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 2, 0, 1), 8860)
    }

    fn other_client() -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 2, 0, 2), 8860)
    }

    fn server() -> Endpoint {
        Endpoint::new(Ipv4Addr::new(10, 1, 1, 1), 8860)
    }

    fn element(id: u64, cpu: f64) -> TaskElement {
        element_from(client(), "g", id, cpu)
    }

    fn element_from(origin: Endpoint, group: &str, id: u64, cpu: f64) -> TaskElement {
        let mut element = TaskElement::new(TaskId::from(id), group, 1.0, cpu, 2.0);
        element.set_origin(origin);
        element
    }

    fn edge_response(element: &TaskElement) -> ResponseContent {
        ResponseContent {
            device_type: Some(DeviceKind::Edge),
            device_address: Some("10.1.1.1".to_string()),
            processing_time: Some(0.5),
            ..ResponseContent::failure(element)
        }
    }

    #[test]
    fn test_dispatch_to_edge() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        let out = coordinator.on_decision(client(), element(1, 1.0));
        let Some(Outgoing {
            message: Message::Handling {
                element,
                cpu_supply,
            },
            ..
        }) = out
        else {
            panic!("expected a handling message");
        };
        assert_eq!(element.status, TaskStatus::Dispatched);
        assert_eq!(cpu_supply, Some(2.0));
        assert_eq!(coordinator.task_sequence().len(), 1);
        assert!(coordinator.handle_next().is_none());
        Ok(())
    }

    #[test]
    fn test_failure_response_without_feasible_device() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[0.5], None)?;
        let out = coordinator.on_decision(client(), element(1, 1.0));
        let Some(Outgoing {
            to,
            message: Message::Response { content },
        }) = out
        else {
            panic!("expected a response");
        };
        assert_eq!(to, client());
        assert_eq!(content.device_type, None);
        assert_eq!(content.group.as_deref(), Some("g"));
        assert!(coordinator.task_sequence().is_empty());
        Ok(())
    }

    #[test]
    fn test_redecision_resets_existing_element() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        coordinator.on_decision(client(), element(1, 1.0));
        let out = coordinator.on_decision(server(), element(1, 1.0));
        assert!(matches!(
            out,
            Some(Outgoing {
                message: Message::Handling { .. },
                ..
            })
        ));
        assert_eq!(coordinator.task_sequence().len(), 1);
        Ok(())
    }

    #[test]
    fn test_ignore_duplicate_submission() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        coordinator.on_decision(client(), element(1, 1.0));
        assert!(coordinator.on_decision(client(), element(1, 1.0)).is_none());
        assert_eq!(coordinator.task_sequence().len(), 1);
        assert_eq!(coordinator.task_sequence()[0].status, TaskStatus::Dispatched);
        Ok(())
    }

    #[test]
    fn test_same_task_id_from_different_clients() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        let first = element_from(client(), "a", 1, 1.0);
        let second = element_from(other_client(), "b", 1, 1.0);
        assert!(coordinator.on_decision(client(), first.clone()).is_some());
        assert!(coordinator.on_decision(other_client(), second.clone()).is_some());
        assert_eq!(coordinator.task_sequence().len(), 2);

        let out = coordinator.on_response(edge_response(&second));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, other_client());
        assert_eq!(coordinator.task_sequence().len(), 1);
        assert_eq!(coordinator.task_sequence()[0].group, "a");

        let out = coordinator.on_response(edge_response(&first));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, client());
        assert!(coordinator.task_sequence().is_empty());
        Ok(())
    }

    #[test]
    fn test_relay_response() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        coordinator.on_decision(client(), element(1, 1.0));
        let content = edge_response(&element(1, 1.0));
        let out = coordinator.on_response(content.clone());
        assert_eq!(
            out,
            vec![Outgoing {
                to: client(),
                message: Message::Response {
                    content: content.clone()
                }
            }]
        );
        assert!(coordinator.task_sequence().is_empty());
        assert!(coordinator.on_response(content).is_empty());
        Ok(())
    }

    #[test]
    fn test_ignore_response_without_origin() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        coordinator.on_decision(client(), element(1, 1.0));
        let content = ResponseContent {
            from_ip: None,
            from_port: None,
            ..edge_response(&element(1, 1.0))
        };
        assert!(coordinator.on_response(content).is_empty());
        assert_eq!(coordinator.task_sequence().len(), 1);
        Ok(())
    }

    #[test]
    fn test_sync_resource_change() -> ExecutionResult<()> {
        let mut coordinator = coordinator(&[2.0], Some(50.0))?;
        let edge = coordinator.engine().cache().view()[0].device_id;
        coordinator.on_resource_changed(edge, 0.5);
        assert_eq!(coordinator.engine().cache().view()[0].cpu, 0.5);
        let out = coordinator.on_decision(client(), element(1, 1.0));
        assert!(matches!(
            out,
            Some(Outgoing {
                message: Message::Handling {
                    cpu_supply: None,
                    ..
                },
                ..
            })
        ));
        Ok(())
    }
}
