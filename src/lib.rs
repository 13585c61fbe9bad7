//! Fluctuating per-core CPU load generation, plus the sysfs readers used by
//! the companion RAPL power monitor.

pub mod affinity;
pub mod cpu_load;
pub mod cpuidle;
pub mod duty_cycle;
pub mod powercap;
