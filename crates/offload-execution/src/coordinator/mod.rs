mod core;

use crate::device::Endpoint;
use crate::engine::DecisionEngine;
use crate::id::DeviceId;
use crate::message::Message;
use crate::task::TaskElement;

/// A message the coordinator wants delivered over the network.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub to: Endpoint,
    pub message: Message,
}

/// The decision point at the base station.
///
/// Task elements wait in arrival order until the decision engine places them.
/// An element stays in the sequence until its response is relayed to the client.
pub struct Coordinator {
    device_id: DeviceId,
    endpoint: Endpoint,
    engine: Box<dyn DecisionEngine>,
    task_sequence: Vec<TaskElement>,
}
