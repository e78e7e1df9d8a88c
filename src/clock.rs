use std::time::Instant;

/// Monotonic seconds source used for all pacing decisions, so the
/// pacing/catch-up arithmetic (see `pipeline::video_loop`) can be unit
/// tested against a fake clock instead of real wall time.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Production clock, backed by `std::time::Instant`.
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
pub struct FakeClock {
    pub t: std::sync::atomic::AtomicU64, // microseconds
}

#[cfg(test)]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            t: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn advance(&self, secs: f64) {
        self.t.fetch_add(
            (secs * 1_000_000.0) as u64,
            std::sync::atomic::Ordering::SeqCst,
        );
    }
}

#[cfg(test)]
impl Clock for FakeClock {
    fn now(&self) -> f64 {
        self.t.load(std::sync::atomic::Ordering::SeqCst) as f64 / 1_000_000.0
    }
}
