use crate::device::{Device, DeviceKind, Endpoint};
use crate::id::DeviceId;

/// The decision engine's belief about one device.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedDevice {
    pub device_id: DeviceId,
    pub endpoint: Endpoint,
    pub kind: DeviceKind,
    pub cpu: f64,
}

/// A local and possibly stale mirror of device resources.
///
/// The cache is built once and no entry is ever added or removed afterwards,
/// so the index of a device is stable and doubles as the action identifier
/// of the learned engine. Mutating the cache never affects the devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceCache {
    entries: Vec<CachedDevice>,
}

impl DeviceCache {
    pub fn build<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Self {
        let entries = devices
            .into_iter()
            .map(|device| CachedDevice {
                device_id: device.id,
                endpoint: device.endpoint,
                kind: device.kind,
                cpu: device.resource.cpu(),
            })
            .collect();
        Self { entries }
    }

    pub fn view(&self) -> &[CachedDevice] {
        &self.entries
    }

    pub fn view_mut(&mut self) -> &mut [CachedDevice] {
        &mut self.entries
    }

    pub fn get(&self, index: usize) -> Option<&CachedDevice> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut CachedDevice> {
        self.entries.get_mut(index)
    }

    pub fn find_if(&self, predicate: impl Fn(&CachedDevice) -> bool) -> Option<(usize, &CachedDevice)> {
        self.entries.iter().enumerate().find(|(_, x)| predicate(x))
    }

    pub fn index_of(&self, device_id: DeviceId) -> Option<usize> {
        self.entries.iter().position(|x| x.device_id == device_id)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cpu_values(&self) -> Vec<f64> {
        self.entries.iter().map(|x| x.cpu).collect()
    }

    /// The mean time the demand would take over the devices of the given kind
    /// that have capacity left. Returns zero if there is no such device.
    pub fn mean_processing_time(&self, kind: DeviceKind, demand: f64) -> f64 {
        let times = self
            .entries
            .iter()
            .filter(|x| x.kind == kind && x.cpu > 0.0)
            .map(|x| demand / x.cpu)
            .collect::<Vec<_>>();
        if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<f64>() / times.len() as f64
        }
    }

    /// Overwrites the believed cpu of a device with a value reported by the device.
    /// Returns `false` if the device is not cached.
    pub fn sync(&mut self, device_id: DeviceId, cpu: f64) -> bool {
        match self.entries.iter_mut().find(|x| x.device_id == device_id) {
            Some(entry) => {
                entry.cpu = cpu;
                true
            }
            None => false,
        }
    }
}
