//! Device health observation: probe abstraction, change detection, and the
//! monitor that turns raw readings into a debounced snapshot stream.

pub mod debounce;
pub mod monitor;
pub mod probe;
pub mod system_probe;

pub use monitor::HealthMonitor;
pub use probe::{DeviceProbe, MockProbe};
pub use system_probe::SystemProbe;
