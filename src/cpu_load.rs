//! Per-core duty-cycle load workers and the launcher that starts one per core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::affinity::pin_to_core;
use crate::duty_cycle::{busy_wait, CycleAnchor, CyclePlan, CYCLE_NS};

/// Delay between successive worker starts. Offsets the cycle anchors so the
/// busy phases do not begin in lockstep on every core.
const STARTUP_STAGGER: Duration = Duration::from_millis(10);

/// Seed for one worker's generator: wall-clock seconds plus the core id, so
/// workers started within the same second still draw different sequences.
fn worker_seed(core_id: usize) -> u64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    secs.wrapping_add(core_id as u64)
}

/// One duty cycle: draw a plan, spin through the busy phase, then sleep to
/// the next absolute cycle boundary. Returns the executed plan.
pub fn run_cycle(rng: &mut StdRng, anchor: &mut CycleAnchor) -> CyclePlan {
    let plan = CyclePlan::draw(rng);
    busy_wait(plan.busy_ns);
    anchor.advance(CYCLE_NS);
    anchor.sleep_until();
    plan
}

/// Body of one load worker: pin to the core once, then cycle until `running`
/// is cleared. The flag is checked between cycles, never inside the spin.
pub fn load_on_core(core_id: usize, running: Arc<AtomicBool>) {
    pin_to_core(core_id);
    let mut rng = StdRng::seed_from_u64(worker_seed(core_id));
    let mut anchor = CycleAnchor::now();
    while running.load(Ordering::SeqCst) {
        run_cycle(&mut rng, &mut anchor);
    }
}

/// Start one named load worker per core, each spawn closure capturing its own
/// core id. The caller is responsible for joining the handles.
pub fn spawn_load_workers(num_cores: usize, running: Arc<AtomicBool>) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(num_cores);
    for core_id in 0..num_cores {
        let running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("load-core-{}", core_id))
            .spawn(move || load_on_core(core_id, running))
            .expect("failed to spawn load worker");
        handles.push(handle);
        thread::sleep(STARTUP_STAGGER);
    }
    handles
}

/// Generate load on `num_cores` cores for `duration` seconds, 0 meaning
/// indefinitely. Blocks until every worker has stopped.
pub fn run_load(num_cores: usize, duration: u64) {
    let running = Arc::new(AtomicBool::new(true));

    // Stop after the specified duration; with 0 the flag is never cleared.
    let mut stop_thread = None;
    if duration > 0 {
        let running_clone = Arc::clone(&running);
        stop_thread = Some(thread::spawn(move || {
            thread::sleep(Duration::from_secs(duration));
            running_clone.store(false, Ordering::SeqCst);
        }));
    }

    for handle in spawn_load_workers(num_cores, running) {
        let _ = handle.join();
    }
    if let Some(handle) = stop_thread {
        let _ = handle.join();
    }
}
