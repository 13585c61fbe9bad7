//! CSV logger for RAPL package power, per-CPU frequency, governor and
//! P-state settings, and C-state residency, sampled on a fixed 500 ms grid.

use std::error::Error;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use clap::Parser;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use load_generator::cpuidle::{discover_states, CPUIDLE_ROOT};
use load_generator::duty_cycle::{monotonic_ns, CycleAnchor, NSEC_PER_SEC};
use load_generator::powercap::{discover_domains, POWERCAP_ROOT};

const SAMPLE_INTERVAL_NS: i64 = 500_000_000;
const SAMPLE_INTERVAL_SECS: f64 = 0.5;
/// Rows buffered between flushes, so a killed run loses at most this many.
const FLUSH_EVERY: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "rapl-monitor", version, about = "Log RAPL power and CPU state to CSV")]
struct Args {
    /// Measurement duration in seconds (0 = run until interrupted)
    #[arg(default_value_t = 0)]
    duration: u64,

    /// Output CSV file
    #[arg(short, long, default_value = "rapl_power_log.csv")]
    output: PathBuf,

    /// Print sampling-loop timing statistics when the run ends
    #[arg(long)]
    benchmark: bool,
}

fn read_sysfs_string(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

fn pstate_status() -> String {
    read_sysfs_string(Path::new("/sys/devices/system/cpu/intel_pstate/status"))
        .unwrap_or_else(|| "unknown".to_string())
}

fn current_governor() -> String {
    read_sysfs_string(Path::new("/sys/devices/system/cpu/cpu0/cpufreq/scaling_governor"))
        .unwrap_or_else(|| "unknown".to_string())
}

fn energy_preference(cpu: usize) -> String {
    let path = format!(
        "/sys/devices/system/cpu/cpu{}/cpufreq/energy_performance_preference",
        cpu
    );
    read_sysfs_string(Path::new(&path)).unwrap_or_else(|| "N/A".to_string())
}

/// P-state columns of one sample row. With the driver active there is one
/// energy-performance-preference column per CPU; otherwise a single column
/// records the driver status string (`passive`, `off`, `unknown`).
fn push_pstate_fields(fields: &mut Vec<String>, pstate: &str, num_cpus: usize) {
    if pstate == "active" {
        for cpu in 0..num_cpus {
            fields.push(energy_preference(cpu));
        }
    } else {
        fields.push(pstate.to_string());
    }
}

/// CSV header row. The column set is fixed here at startup; every sample row
/// must follow the same layout.
fn build_header(
    domain_names: &[String],
    num_cpus: usize,
    pstate_active: bool,
    idle_columns: &[String],
) -> String {
    let mut columns = vec!["Timestamp".to_string()];
    for name in domain_names {
        columns.push(format!("{} (W)", name));
    }
    for cpu in 0..num_cpus {
        columns.push(format!("CPU{}_Freq (MHz)", cpu));
    }
    columns.push("Governor".to_string());
    if pstate_active {
        for cpu in 0..num_cpus {
            columns.push(format!("CPU{}_P-State", cpu));
        }
    } else {
        columns.push("P-State".to_string());
    }
    for cpu in 0..num_cpus {
        columns.push(format!("CPU{}_Enabled_CStates", cpu));
    }
    for key in idle_columns {
        columns.push(format!("{} (ms)", key));
    }
    columns.join(",")
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    ctrlc::set_handler(move || running_clone.store(false, Ordering::SeqCst))?;

    let domains = match discover_domains(Path::new(POWERCAP_ROOT)) {
        Ok(domains) if !domains.is_empty() => domains,
        Ok(_) | Err(_) => {
            eprintln!(
                "No RAPL domains found under {} (try running as root)",
                POWERCAP_ROOT
            );
            process::exit(1);
        }
    };

    let num_cpus = num_cpus::get();
    let idle_states = discover_states(Path::new(CPUIDLE_ROOT), num_cpus);
    let pstate = pstate_status();
    let pstate_active = pstate == "active";

    let domain_names: Vec<String> = domains.iter().map(|d| d.name.clone()).collect();
    let idle_columns: Vec<String> = idle_states.iter().map(|s| s.column_key()).collect();

    let mut sys = System::new_with_specifics(
        RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_frequency()),
    );

    let mut writer = BufWriter::new(File::create(&args.output)?);
    writeln!(
        writer,
        "{}",
        build_header(&domain_names, num_cpus, pstate_active, &idle_columns)
    )?;

    println!(
        "Monitoring {} RAPL domains on {} CPUs every {} ms. Output: {}",
        domains.len(),
        num_cpus,
        SAMPLE_INTERVAL_NS / 1_000_000,
        args.output.display()
    );
    if args.duration == 0 {
        println!("To stop, use: kill {}", process::id());
    }

    // Baseline counter readings; every logged value is a delta from these.
    let mut prev_energy = Vec::with_capacity(domains.len());
    for domain in &domains {
        prev_energy.push(domain.read_energy_uj()?);
    }
    let mut prev_idle_us: Vec<u64> = idle_states
        .iter()
        .map(|s| s.read_time_us().unwrap_or(0))
        .collect();

    let start_ns = monotonic_ns();
    // A duration too large to express in nanoseconds behaves like unlimited.
    let deadline_ns = i64::try_from(args.duration)
        .ok()
        .filter(|d| *d > 0)
        .and_then(|d| d.checked_mul(NSEC_PER_SEC))
        .map(|d| start_ns.saturating_add(d));
    let mut anchor = CycleAnchor::now();

    let mut rows_buffered = 0usize;
    let mut samples: u64 = 0;
    let mut overruns: u64 = 0;
    let mut sample_secs_total = 0.0f64;
    let mut sample_secs_min = f64::MAX;
    let mut sample_secs_max = 0.0f64;

    while running.load(Ordering::SeqCst) {
        if deadline_ns.is_some_and(|deadline| monotonic_ns() >= deadline) {
            break;
        }

        // Sampling instants stay on the absolute 500 ms grid no matter how
        // long the previous sample took to collect.
        anchor.advance(SAMPLE_INTERVAL_NS);
        if monotonic_ns() > anchor.as_ns() {
            overruns += 1;
        }
        anchor.sleep_until();

        let sample_start_ns = monotonic_ns();
        let mut fields = Vec::with_capacity(idle_columns.len() + 3 * num_cpus + 3);
        fields.push(Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string());

        for (domain, prev) in domains.iter().zip(prev_energy.iter_mut()) {
            let curr = domain.read_energy_uj().unwrap_or(*prev);
            let delta_uj = domain.energy_delta_uj(*prev, curr);
            *prev = curr;
            let watts = delta_uj as f64 / 1e6 / SAMPLE_INTERVAL_SECS;
            fields.push(format!("{:.3}", watts));
        }

        sys.refresh_cpu_specifics(CpuRefreshKind::nothing().with_frequency());
        for cpu in 0..num_cpus {
            let freq = sys.cpus().get(cpu).map(|c| c.frequency()).unwrap_or(0);
            fields.push(freq.to_string());
        }

        fields.push(current_governor());

        push_pstate_fields(&mut fields, &pstate, num_cpus);

        for cpu in 0..num_cpus {
            let enabled: Vec<&str> = idle_states
                .iter()
                .filter(|s| s.cpu == cpu && s.is_enabled())
                .map(|s| s.name.as_str())
                .collect();
            fields.push(if enabled.is_empty() {
                "none".to_string()
            } else {
                enabled.join(" ")
            });
        }

        for (state, prev) in idle_states.iter().zip(prev_idle_us.iter_mut()) {
            let curr = state.read_time_us().unwrap_or(*prev);
            let delta_us = curr.saturating_sub(*prev);
            *prev = curr;
            fields.push(format!("{:.3}", delta_us as f64 / 1000.0));
        }

        writeln!(writer, "{}", fields.join(","))?;
        rows_buffered += 1;
        if rows_buffered >= FLUSH_EVERY {
            writer.flush()?;
            rows_buffered = 0;
        }

        samples += 1;
        let sample_secs = (monotonic_ns() - sample_start_ns) as f64 / 1e9;
        sample_secs_total += sample_secs;
        sample_secs_min = sample_secs_min.min(sample_secs);
        sample_secs_max = sample_secs_max.max(sample_secs);
    }

    writer.flush()?;

    if args.benchmark {
        if samples > 0 {
            println!(
                "Sampled {} rows: avg {:.6} s, min {:.6} s, max {:.6} s per sample, {} overruns",
                samples,
                sample_secs_total / samples as f64,
                sample_secs_min,
                sample_secs_max,
                overruns
            );
        } else {
            println!("No iterations recorded.");
        }
    }

    println!("Measurement complete. Data saved in {}", args.output.display());
    Ok(())
}
