mod cache;
mod record;

pub use cache::{CachedDevice, DeviceCache};
pub use record::{ResourceChange, ResourceMonitor, ResourceRecord, CPU};
