use std::time::Instant;

/// Single monotonic time source shared by the producer and decision loops.
///
/// Timestamps are seconds since the clock was created. Copies share the same
/// origin, so values from different tasks compare directly.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
