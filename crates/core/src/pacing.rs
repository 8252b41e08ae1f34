//! Real-time pacing with frame-skip and drift correction.
//!
//! A machine bridge calls [`Pacer::sync`] once per emulated video frame.
//! Elapsed cycles are converted to a wall-clock deadline; when emulation
//! falls behind, rendering is skipped for a bounded number of frames and the
//! deadline is rebased so drift cannot accumulate. When emulation is ahead,
//! the pacer busy-waits to the deadline; host sleep granularity is too
//! coarse for sub-frame precision.

use std::time::Instant;

/// Millisecond time source, injectable for tests.
pub trait TimeSource: Send {
    fn now_ms(&self) -> u64;
}

/// System time relative to an anchor taken at construction.
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Consecutive frames that may skip rendering before the deadline rebases.
pub const MAX_FRAME_SKIP: u32 = 20;

pub struct Pacer<T: TimeSource = WallClock> {
    time: T,
    deadline: u64,
    start_cycles: u64,
    frame_skip: u32,
}

impl Pacer<WallClock> {
    pub fn new() -> Self {
        Self::with_time_source(WallClock::new())
    }
}

impl Default for Pacer<WallClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> Pacer<T> {
    pub fn with_time_source(time: T) -> Self {
        let deadline = time.now_ms();
        Self {
            time,
            deadline,
            start_cycles: 0,
            frame_skip: 0,
        }
    }

    /// Restart pacing from the current wall-clock time and cycle count.
    /// Called when an emulation action begins so idle time is not counted
    /// as lag.
    pub fn rebase(&mut self, cycles: u64) {
        self.start_cycles = cycles;
        self.deadline = self.time.now_ms();
    }

    /// Advance the deadline by the cycles elapsed since the last sync and
    /// reconcile with real time.
    pub fn sync(&mut self, cycles: u64, cycles_per_second: u64) {
        let elapsed = cycles.saturating_sub(self.start_cycles);
        // Rounded milliseconds: (cycles * 2000 / rate + 1) / 2.
        self.deadline += (elapsed * 2000 / cycles_per_second + 1) / 2;
        self.start_cycles = cycles;

        let now = self.time.now_ms();
        if now > self.deadline {
            if self.frame_skip == MAX_FRAME_SKIP {
                // Sustained slowdown: stop hiding it behind skipped frames
                // and accept the new baseline.
                self.frame_skip = 0;
                self.deadline = now + 1;
            } else {
                self.frame_skip += 1;
            }
        } else {
            self.frame_skip = 0;
            while self.time.now_ms() < self.deadline {
                std::hint::spin_loop();
            }
        }
    }

    /// Non-zero while rendering should be skipped to let emulation catch up.
    pub fn frame_skip(&self) -> u32 {
        self.frame_skip
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// Deterministic clock advancing a fixed step on every query, so the
    /// catch-up spin always terminates.
    struct SteppingClock {
        now: Arc<AtomicU64>,
        step: u64,
    }

    impl TimeSource for SteppingClock {
        fn now_ms(&self) -> u64 {
            self.now.fetch_add(self.step, Ordering::Relaxed)
        }
    }

    fn pacer(start_ms: u64, step: u64) -> (Pacer<SteppingClock>, Arc<AtomicU64>) {
        let now = Arc::new(AtomicU64::new(start_ms));
        let clock = SteppingClock {
            now: Arc::clone(&now),
            step,
        };
        (Pacer::with_time_source(clock), now)
    }

    #[test]
    fn ahead_of_deadline_resets_skip_and_spins_to_it() {
        let (mut pacer, now) = pacer(0, 1);
        pacer.frame_skip = 3;
        pacer.rebase(0);

        // 20ms of emulated time; the clock starts just past the rebase.
        pacer.sync(20_000, 1_000_000);

        assert_eq!(pacer.frame_skip(), 0);
        // The spin consumed the clock up to the deadline.
        assert!(now.load(Ordering::Relaxed) >= pacer.deadline);
    }

    #[test]
    fn behind_deadline_increments_skip() {
        let (mut pacer, now) = pacer(0, 0);
        pacer.rebase(0);
        // Jump real time far past any deadline the sync will compute.
        now.store(500, Ordering::Relaxed);

        pacer.sync(1_000, 1_000_000);
        assert_eq!(pacer.frame_skip(), 1);

        pacer.sync(2_000, 1_000_000);
        assert_eq!(pacer.frame_skip(), 2);
    }

    #[test]
    fn at_max_skip_rebases_deadline_to_now() {
        let (mut pacer, now) = pacer(0, 0);
        pacer.rebase(0);
        now.store(500, Ordering::Relaxed);
        pacer.frame_skip = MAX_FRAME_SKIP;

        pacer.sync(1_000, 1_000_000);

        assert_eq!(pacer.frame_skip(), 0);
        assert_eq!(pacer.deadline, 501);
    }

    #[test]
    fn deadline_advances_by_rounded_milliseconds() {
        let (mut pacer, now) = pacer(0, 0);
        pacer.rebase(0);
        now.store(1_000, Ordering::Relaxed);

        // 71136 cycles at 3.5795MHz is 19.87ms, rounding to 20.
        pacer.sync(71_136, 3_579_500);
        assert_eq!(pacer.deadline, 20);
        assert_eq!(pacer.start_cycles, 71_136);
    }
}
