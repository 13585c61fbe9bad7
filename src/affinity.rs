//! Best-effort binding of the calling thread to a single logical CPU.

use std::io;
use std::mem;

/// Restrict the calling thread to `core_id` for the rest of its lifetime.
/// Returns false (after printing a warning) if the kernel rejects the mask;
/// the thread then keeps running unbound.
pub fn pin_to_core(core_id: usize) -> bool {
    let rc = unsafe {
        let mut cpuset: libc::cpu_set_t = mem::zeroed();
        libc::CPU_SET(core_id, &mut cpuset);
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &cpuset)
    };
    if rc != 0 {
        eprintln!(
            "Warning: could not pin thread to core {}: {}",
            core_id,
            io::Error::last_os_error()
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    /// Affinity list of the calling thread as the kernel reports it.
    fn allowed_list_for_current_thread() -> String {
        let tid = unsafe { libc::syscall(libc::SYS_gettid) };
        let file = File::open(format!("/proc/self/task/{}/status", tid)).unwrap();
        for line in BufReader::new(file).lines() {
            let line = line.unwrap();
            if let Some(rest) = line.strip_prefix("Cpus_allowed_list:") {
                return rest.trim().to_string();
            }
        }
        panic!("Cpus_allowed_list missing from thread status");
    }

    fn first_allowed_core() -> usize {
        let list = allowed_list_for_current_thread();
        list.split([',', '-']).next().unwrap().parse().unwrap()
    }

    #[test]
    fn pin_restricts_the_current_thread() {
        let core = first_allowed_core();
        assert!(pin_to_core(core));
        assert_eq!(allowed_list_for_current_thread(), core.to_string());
    }

    #[test]
    fn pin_to_a_missing_core_fails_without_panicking() {
        // 1023 is the last slot of the default cpu_set_t mask; machines that
        // large do not run this suite.
        if num_cpus::get() <= 1023 {
            assert!(!pin_to_core(1023));
        }
    }
}
