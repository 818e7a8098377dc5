use std::net::Ipv4Addr;

use offload_common::config::TopologyConfig;
use rand::Rng;

use crate::device::{DeviceKind, DeviceRegistry, Endpoint};
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::DeviceId;
use crate::resource::CPU;

/// The provisioned devices of a simulation and their roles.
#[derive(Debug)]
pub struct Topology {
    pub registry: DeviceRegistry,
    pub base_station: DeviceId,
    pub edges: Vec<DeviceId>,
    pub cloud: Option<DeviceId>,
    pub clients: Vec<DeviceId>,
}

impl Topology {
    pub fn builder() -> TopologyBuilder {
        TopologyBuilder::default()
    }

    /// Provisions the devices described by the configuration.
    /// The cpu of each edge server is drawn uniformly from the configured range.
    pub fn generate(config: &TopologyConfig, rng: &mut impl Rng) -> ExecutionResult<Self> {
        let mut builder = Self::builder().port(config.port).clients(config.client_count);
        for _ in 0..config.edge_count {
            let cpu = if config.edge_cpu_max > config.edge_cpu_min {
                rng.random_range(config.edge_cpu_min..config.edge_cpu_max)
            } else {
                config.edge_cpu_min
            };
            builder = builder.edge(cpu);
        }
        if config.cloud_cpu > 0.0 {
            builder = builder.cloud(config.cloud_cpu);
        }
        builder.build()
    }
}

pub struct TopologyBuilder {
    port: u16,
    edges: Vec<f64>,
    cloud: Option<f64>,
    clients: usize,
}

impl Default for TopologyBuilder {
    fn default() -> Self {
        Self {
            port: 8860,
            edges: vec![],
            cloud: None,
            clients: 1,
        }
    }
}

impl TopologyBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn edge(mut self, cpu: f64) -> Self {
        self.edges.push(cpu);
        self
    }

    pub fn cloud(mut self, cpu: f64) -> Self {
        self.cloud = Some(cpu);
        self
    }

    pub fn clients(mut self, count: usize) -> Self {
        self.clients = count;
        self
    }

    pub fn build(self) -> ExecutionResult<Topology> {
        if self.edges.is_empty() && self.cloud.is_none() {
            return Err(ExecutionError::invalid(
                "the topology must have at least one edge or cloud server",
            ));
        }
        if self.clients == 0 {
            return Err(ExecutionError::invalid(
                "the topology must have at least one client",
            ));
        }
        if self.edges.iter().chain(self.cloud.iter()).any(|x| *x < 0.0) {
            return Err(ExecutionError::invalid("device cpu must not be negative"));
        }
        let port = self.port;
        let mut registry = DeviceRegistry::new();
        let base_station = registry.add(
            DeviceKind::BaseStation,
            Endpoint::new(Ipv4Addr::new(10, 1, 0, 1), port),
            [],
        )?;
        let edges = self
            .edges
            .iter()
            .enumerate()
            .map(|(i, cpu)| {
                let endpoint = Endpoint::new(host(10, 1, 1, i)?, port);
                registry.add(DeviceKind::Edge, endpoint, [(CPU, *cpu)])
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        let cloud = self
            .cloud
            .map(|cpu| {
                let endpoint = Endpoint::new(Ipv4Addr::new(10, 3, 0, 1), port);
                registry.add(DeviceKind::Cloud, endpoint, [(CPU, cpu)])
            })
            .transpose()?;
        let clients = (0..self.clients)
            .map(|i| {
                let endpoint = Endpoint::new(host(10, 2, 0, i)?, port);
                registry.add(DeviceKind::Client, endpoint, [])
            })
            .collect::<ExecutionResult<Vec<_>>>()?;
        Ok(Topology {
            registry,
            base_station,
            edges,
            cloud,
            clients,
        })
    }
}

fn host(a: u8, b: u8, c: u8, index: usize) -> ExecutionResult<Ipv4Addr> {
    let d = u8::try_from(index + 1)
        .ok()
        .filter(|x| *x < u8::MAX)
        .ok_or_else(|| ExecutionError::invalid(format!("too many devices in {a}.{b}.{c}.0/24")))?;
    Ok(Ipv4Addr::new(a, b, c, d))
}
