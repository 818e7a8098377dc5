mod core;
mod handler;

use std::time::Duration;

use indexmap::IndexMap;

use crate::client::Client;
use crate::cluster::ClusterOptions;
use crate::coordinator::Coordinator;
use crate::device::DeviceRegistry;
use crate::id::DeviceId;

/// The whole simulated network: clients, the coordinator at the base station,
/// and the servers, all driven by one actor on the simulated clock.
pub struct ClusterActor {
    options: ClusterOptions,
    devices: DeviceRegistry,
    coordinator: Coordinator,
    clients: IndexMap<DeviceId, Client>,
    next_launch_delay: Duration,
}
