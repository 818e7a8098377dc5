mod topology;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
pub use topology::{Topology, TopologyBuilder};

use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{DeviceId, IdGenerator};
use crate::resource::ResourceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    #[serde(rename = "client")]
    Client,
    #[serde(rename = "bs")]
    BaseStation,
    #[serde(rename = "es")]
    Edge,
    #[serde(rename = "cs")]
    Cloud,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Client => write!(f, "client"),
            DeviceKind::BaseStation => write!(f, "bs"),
            DeviceKind::Edge => write!(f, "es"),
            DeviceKind::Cloud => write!(f, "cs"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: Ipv4Addr, port: u16) -> Self {
        Self { host, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug)]
pub struct Device {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub endpoint: Endpoint,
    pub resource: ResourceRecord,
}

/// The arena that owns every device of the simulation.
/// Other components refer to devices by [`DeviceId`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<DeviceId, Device>,
    endpoints: HashMap<Endpoint, DeviceId>,
    id_generator: IdGenerator<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        kind: DeviceKind,
        endpoint: Endpoint,
        attributes: impl IntoIterator<Item = (&'static str, f64)>,
    ) -> ExecutionResult<DeviceId> {
        if self.endpoints.contains_key(&endpoint) {
            return Err(ExecutionError::invalid(format!(
                "endpoint {endpoint} is already in use"
            )));
        }
        let id = self.id_generator.next()?;
        let resource = attributes
            .into_iter()
            .fold(ResourceRecord::new(id), |r, (k, v)| r.with_attribute(k, v));
        self.devices.insert(
            id,
            Device {
                id,
                kind,
                endpoint,
                resource,
            },
        );
        self.endpoints.insert(endpoint, id);
        Ok(id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    pub fn get_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(&id)
    }

    pub fn try_get(&self, id: DeviceId) -> ExecutionResult<&Device> {
        self.get(id)
            .ok_or_else(|| ExecutionError::DeviceNotFound(id.to_string()))
    }

    pub fn try_get_mut(&mut self, id: DeviceId) -> ExecutionResult<&mut Device> {
        self.get_mut(id)
            .ok_or_else(|| ExecutionError::DeviceNotFound(id.to_string()))
    }

    pub fn find_by_endpoint(&self, endpoint: &Endpoint) -> Option<&Device> {
        self.endpoints
            .get(endpoint)
            .and_then(|id| self.devices.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    /// The devices of the given kind in provisioning order.
    pub fn of_kind(&self, kind: DeviceKind) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(move |x| x.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
