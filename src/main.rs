use load_generator::cpu_load;
use load_generator::duty_cycle::{CYCLE_NS, MAX_LOAD, MIN_LOAD};

fn main() {
    let num_cores = num_cpus::get();

    println!(
        "Generating fluctuating CPU load ({}-{}% duty cycle, {} ms cycles) on {} cores...",
        MIN_LOAD,
        MAX_LOAD,
        CYCLE_NS / 1_000_000,
        num_cores
    );
    cpu_load::run_load(num_cores, 0);
}
