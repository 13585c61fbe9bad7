//! Intel RAPL energy counters exposed through the powercap sysfs tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sysfs root under which the powercap framework exposes RAPL domains.
pub const POWERCAP_ROOT: &str = "/sys/class/powercap";

/// Counter range assumed when a domain does not report one.
const FALLBACK_ENERGY_RANGE_UJ: u64 = 1 << 32;

/// One RAPL domain (package, core, uncore, dram) with its energy counter.
#[derive(Debug, Clone)]
pub struct RaplDomain {
    /// Human-readable domain name from the sysfs `name` file.
    pub name: String,
    energy_path: PathBuf,
    max_energy_range_uj: u64,
}

impl RaplDomain {
    /// Current value of the domain's cumulative energy counter, in microjoules.
    pub fn read_energy_uj(&self) -> io::Result<u64> {
        let raw = fs::read_to_string(&self.energy_path)?;
        raw.trim().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad energy_uj value {:?}: {}", raw.trim(), e),
            )
        })
    }

    /// Energy consumed between two counter readings, accounting for the
    /// counter wrapping past its maximum range.
    pub fn energy_delta_uj(&self, prev: u64, curr: u64) -> u64 {
        if curr >= prev {
            curr - prev
        } else {
            self.max_energy_range_uj - prev + curr
        }
    }
}

/// Whether a powercap entry name is a RAPL domain (`intel-rapl:0`,
/// `intel-rapl:0:1`, ...). The separate `intel-rapl-mmio` hierarchy mirrors
/// the same counters and is skipped.
fn is_rapl_domain(entry_name: &str) -> bool {
    entry_name
        .strip_prefix("intel-rapl:")
        .is_some_and(|rest| rest.chars().next().is_some_and(|c| c.is_ascii_digit()))
}

/// Enumerate the RAPL domains under `root`, sorted by entry name so columns
/// derived from them keep a stable order. Entries without a readable
/// `energy_uj` file are skipped.
pub fn discover_domains(root: &Path) -> io::Result<Vec<RaplDomain>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_rapl_domain)
        })
        .collect();
    entries.sort();

    let mut domains = Vec::new();
    for dir in entries {
        let energy_path = dir.join("energy_uj");
        if !energy_path.is_file() {
            continue;
        }
        let name = fs::read_to_string(dir.join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let max_energy_range_uj = fs::read_to_string(dir.join("max_energy_range_uj"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(FALLBACK_ENERGY_RANGE_UJ);
        domains.push(RaplDomain {
            name,
            energy_path,
            max_energy_range_uj,
        });
    }
    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn fake_domain(max_energy_range_uj: u64) -> RaplDomain {
        RaplDomain {
            name: "package-0".to_string(),
            energy_path: PathBuf::from("/nonexistent/energy_uj"),
            max_energy_range_uj,
        }
    }

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("powercap-{}-{}", label, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_domain(root: &Path, entry: &str, name: Option<&str>, energy: Option<&str>) {
        let dir = root.join(entry);
        fs::create_dir_all(&dir).unwrap();
        if let Some(name) = name {
            fs::write(dir.join("name"), name).unwrap();
        }
        if let Some(energy) = energy {
            fs::write(dir.join("energy_uj"), energy).unwrap();
        }
    }

    #[test]
    fn recognizes_rapl_domain_entries() {
        assert!(is_rapl_domain("intel-rapl:0"));
        assert!(is_rapl_domain("intel-rapl:1"));
        assert!(is_rapl_domain("intel-rapl:0:2"));
        assert!(!is_rapl_domain("intel-rapl"));
        assert!(!is_rapl_domain("intel-rapl:"));
        assert!(!is_rapl_domain("intel-rapl-mmio:0"));
        assert!(!is_rapl_domain("dtpm"));
    }

    #[test]
    fn delta_is_simple_difference_without_wraparound() {
        let domain = fake_domain(1000);
        assert_eq!(domain.energy_delta_uj(100, 900), 800);
        assert_eq!(domain.energy_delta_uj(0, 0), 0);
        assert_eq!(domain.energy_delta_uj(500, 500), 0);
    }

    #[test]
    fn delta_spans_a_counter_wraparound() {
        let domain = fake_domain(1000);
        assert_eq!(domain.energy_delta_uj(900, 100), 200);
        assert_eq!(domain.energy_delta_uj(1000, 0), 0);
    }

    #[test]
    fn discovery_finds_domains_in_name_order() {
        let root = scratch_dir("discovery");
        write_domain(&root, "intel-rapl:1", Some("package-1"), Some("222\n"));
        write_domain(&root, "intel-rapl:0", Some("package-0"), Some("111\n"));
        write_domain(&root, "intel-rapl:0:0", Some("core"), Some("42\n"));

        let domains = discover_domains(&root).unwrap();
        let names: Vec<&str> = domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["package-0", "core", "package-1"]);
        assert_eq!(domains[0].read_energy_uj().unwrap(), 111);
        assert_eq!(domains[1].read_energy_uj().unwrap(), 42);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn discovery_skips_foreign_and_incomplete_entries() {
        let root = scratch_dir("skips");
        write_domain(&root, "intel-rapl:0", Some("package-0"), Some("7"));
        write_domain(&root, "intel-rapl-mmio:0", Some("package-0"), Some("7"));
        write_domain(&root, "intel-rapl:1", Some("psys"), None);

        let domains = discover_domains(&root).unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].name, "package-0");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_name_falls_back_to_unknown() {
        let root = scratch_dir("noname");
        write_domain(&root, "intel-rapl:0", None, Some("7"));

        let domains = discover_domains(&root).unwrap();
        assert_eq!(domains[0].name, "unknown");

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn unreadable_max_range_uses_the_fallback() {
        let root = scratch_dir("norange");
        write_domain(&root, "intel-rapl:0", Some("package-0"), Some("7"));

        let domains = discover_domains(&root).unwrap();
        // With the 2^32 fallback range, a wrapped reading still yields a
        // sensible delta.
        assert_eq!(
            domains[0].energy_delta_uj((1 << 32) - 100, 50),
            150
        );

        let _ = fs::remove_dir_all(&root);
    }
}
