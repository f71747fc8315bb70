pub mod monitor;

pub use monitor::{run_monitor, Emission, MonitorCommand, MonitorParams};
