//! Timing core for the duty-cycle load loop: the busy/idle split drawn each
//! cycle and the absolute cycle boundary the idle sleep targets.

use rand::Rng;

/// Lower bound of the random load percentage.
pub const MIN_LOAD: u32 = 40;
/// Upper bound of the random load percentage.
pub const MAX_LOAD: u32 = 50;
/// Length of one busy/idle cycle in nanoseconds (100 ms).
pub const CYCLE_NS: i64 = 100_000_000;

pub const NSEC_PER_SEC: i64 = 1_000_000_000;

/// Current reading of `CLOCK_MONOTONIC` in nanoseconds.
pub fn monotonic_ns() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as i64 * NSEC_PER_SEC + ts.tv_nsec as i64
}

/// Active wait: re-read the monotonic clock until `busy_ns` nanoseconds have
/// elapsed. The spin is the load mechanism, so it must not block or sleep.
pub fn busy_wait(busy_ns: i64) {
    let start = monotonic_ns();
    while monotonic_ns() - start < busy_ns {}
}

/// Busy/idle split for one cycle, derived from a random load draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclePlan {
    pub load_percent: u32,
    pub busy_ns: i64,
    pub idle_ns: i64,
}

impl CyclePlan {
    /// Draw a load percentage uniformly from `[MIN_LOAD, MAX_LOAD]`.
    pub fn draw<R: Rng>(rng: &mut R) -> CyclePlan {
        CyclePlan::from_load(rng.random_range(MIN_LOAD..=MAX_LOAD))
    }

    /// Split the cycle for a given load percentage (integer math, truncating).
    pub fn from_load(load_percent: u32) -> CyclePlan {
        debug_assert!(load_percent <= 100);
        let busy_ns = CYCLE_NS * load_percent as i64 / 100;
        CyclePlan {
            load_percent,
            busy_ns,
            idle_ns: CYCLE_NS - busy_ns,
        }
    }
}

/// Absolute timestamp of the next cycle boundary on the monotonic clock.
///
/// The anchor only ever moves by whole cycle lengths, so the n-th boundary is
/// always `start + n * CYCLE_NS` no matter how long the busy phases took.
pub struct CycleAnchor {
    ts: libc::timespec,
}

impl CycleAnchor {
    pub fn now() -> CycleAnchor {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        CycleAnchor { ts }
    }

    /// Advance the anchor by `ns`, carrying sub-second overflow into seconds.
    pub fn advance(&mut self, ns: i64) {
        self.ts.tv_nsec += ns as libc::c_long;
        while self.ts.tv_nsec >= NSEC_PER_SEC as libc::c_long {
            self.ts.tv_nsec -= NSEC_PER_SEC as libc::c_long;
            self.ts.tv_sec += 1;
        }
    }

    /// Suspend the calling thread until the anchor timestamp. Uses
    /// `TIMER_ABSTIME`, so a late caller returns immediately instead of
    /// pushing the schedule back.
    pub fn sleep_until(&self) {
        unsafe {
            libc::clock_nanosleep(
                libc::CLOCK_MONOTONIC,
                libc::TIMER_ABSTIME,
                &self.ts,
                std::ptr::null_mut(),
            )
        };
    }

    pub fn as_ns(&self) -> i64 {
        self.ts.tv_sec as i64 * NSEC_PER_SEC + self.ts.tv_nsec as i64
    }
}
