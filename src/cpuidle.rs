//! Per-CPU C-state descriptors from the cpuidle sysfs tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sysfs root holding the per-CPU directories (`cpu0`, `cpu1`, ...).
pub const CPUIDLE_ROOT: &str = "/sys/devices/system/cpu";

/// One C-state of one CPU (`.../cpuN/cpuidle/stateM`).
#[derive(Debug, Clone)]
pub struct CpuIdleState {
    pub cpu: usize,
    pub name: String,
    time_path: PathBuf,
    disable_path: PathBuf,
}

impl CpuIdleState {
    /// Column key combining the CPU index and state name, e.g. `CPU0_C1E`.
    pub fn column_key(&self) -> String {
        format!("CPU{}_{}", self.cpu, self.name)
    }

    /// Cumulative time spent in this state, in microseconds.
    pub fn read_time_us(&self) -> io::Result<u64> {
        let raw = fs::read_to_string(&self.time_path)?;
        raw.trim().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad cpuidle time value {:?}: {}", raw.trim(), e),
            )
        })
    }

    /// Whether the state is currently enabled (its `disable` knob reads 0).
    pub fn is_enabled(&self) -> bool {
        fs::read_to_string(&self.disable_path)
            .map(|s| s.trim() == "0")
            .unwrap_or(false)
    }
}

/// Enumerate every C-state of CPUs `0..num_cpus` under `root`, ordered by CPU
/// and then by state number. CPUs without a cpuidle directory (or with states
/// missing their `name` or `time` files) contribute nothing.
pub fn discover_states(root: &Path, num_cpus: usize) -> Vec<CpuIdleState> {
    let mut states = Vec::new();
    for cpu in 0..num_cpus {
        let idle_dir = root.join(format!("cpu{}", cpu)).join("cpuidle");
        let entries = match fs::read_dir(&idle_dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        let mut numbered: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let number = entry
                    .file_name()
                    .to_str()
                    .and_then(|n| n.strip_prefix("state"))
                    .and_then(|n| n.parse().ok())?;
                Some((number, entry.path()))
            })
            .collect();
        numbered.sort_by_key(|(number, _)| *number);

        for (_, dir) in numbered {
            let name = match fs::read_to_string(dir.join("name")) {
                Ok(name) => name.trim().to_string(),
                Err(_) => continue,
            };
            let time_path = dir.join("time");
            if !time_path.is_file() {
                continue;
            }
            states.push(CpuIdleState {
                cpu,
                name,
                time_path,
                disable_path: dir.join("disable"),
            });
        }
    }
    states
}
