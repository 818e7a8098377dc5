use std::fmt;

use indexmap::IndexMap;

use crate::id::DeviceId;

/// The key of the compute capacity attribute.
pub const CPU: &str = "cpu";

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub device_id: DeviceId,
    pub key: String,
    pub old_value: Option<f64>,
    pub new_value: f64,
}

pub type ResourceMonitor = Box<dyn FnMut(&ResourceChange)>;

/// The authoritative resource attributes of a device.
///
/// Only the owning device mutates the record. Every `set` is reported to
/// the monitor if one is installed.
pub struct ResourceRecord {
    device_id: DeviceId,
    attributes: IndexMap<String, f64>,
    monitor: Option<ResourceMonitor>,
}

impl fmt::Debug for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRecord")
            .field("device_id", &self.device_id)
            .field("attributes", &self.attributes)
            .field("monitored", &self.monitor.is_some())
            .finish()
    }
}

impl ResourceRecord {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            attributes: IndexMap::new(),
            monitor: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: f64) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).copied()
    }

    /// The remaining compute capacity, or zero if the device has none.
    pub fn cpu(&self) -> f64 {
        self.get(CPU).unwrap_or(0.0)
    }

    /// Sets the attribute and returns the previous value.
    pub fn set(&mut self, key: &str, value: f64) -> Option<f64> {
        let old_value = self.attributes.insert(key.to_string(), value);
        if let Some(monitor) = self.monitor.as_mut() {
            monitor(&ResourceChange {
                device_id: self.device_id,
                key: key.to_string(),
                old_value,
                new_value: value,
            });
        }
        old_value
    }

    pub fn set_monitor(&mut self, monitor: ResourceMonitor) {
        self.monitor = Some(monitor);
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, f64)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
