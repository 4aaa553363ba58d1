pub mod driver;

#[cfg(feature = "cli")]
pub mod output;

pub use driver::{InstanceSlot, PERF_REPORT_INTERVAL, PerfStats, SampleDriver, retire_channel};
