//! Pacing strategies for a sweep
//!
//! A sweep either walks its targets one at a time with a randomized pause in
//! front of every probe, or fans them out over a fixed worker pool.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How targets are dispatched. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PacingPlan {
    /// One probe at a time, sleeping `delay * (1 ± jitter)` before each
    Sequential { delay: Duration, jitter: f64 },
    /// `workers` probes in flight at once
    Concurrent { workers: usize },
}

impl PacingPlan {
    pub fn is_sequential(&self) -> bool {
        matches!(self, PacingPlan::Sequential { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PacingPlan::Sequential { .. } => "sequential",
            PacingPlan::Concurrent { .. } => "concurrent",
        }
    }
}

/// Randomized inter-probe delay
#[derive(Debug, Clone)]
pub struct JitterTimer {
    base_delay: Duration,
    jitter: f64,
}

impl JitterTimer {
    /// `jitter` is clamped into `[0, 1]`
    pub fn new(base_delay: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        Self { base_delay, jitter }
    }

    /// Draw the next delay from the thread-local RNG
    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Draw the next delay from `rng`
    pub fn next_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        jittered_delay(self.base_delay, self.jitter, rng)
    }

    /// Smallest delay this timer can produce
    pub fn min_delay(&self) -> Duration {
        self.base_delay.mul_f64((1.0 - self.jitter).max(0.0))
    }

    /// Largest delay this timer can produce
    pub fn max_delay(&self) -> Duration {
        self.base_delay.mul_f64(1.0 + self.jitter)
    }
}

/// `base * (1 + U)` with `U` uniform in `[-jitter, +jitter]`
///
/// The lower end of the draw is clamped to zero so the result is never
/// negative, even with `jitter` at 1.0.
pub fn jittered_delay<R: Rng + ?Sized>(base: Duration, jitter: f64, rng: &mut R) -> Duration {
    let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
    if jitter == 0.0 || base.is_zero() {
        return base;
    }

    let low = (1.0 - jitter).max(0.0);
    let high = 1.0 + jitter;
    let factor = rng.gen_range(low..=high);
    base.mul_f64(factor)
}
