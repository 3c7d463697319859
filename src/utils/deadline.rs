// src/utils/deadline.rs
use std::time::{Duration, Instant};

/// Convert an absolute deadline into the relative timeout socket APIs expect.
///
/// A deadline already in the past maps to the smallest non-zero timeout,
/// since a zero timeout is rejected by `set_read_timeout`.
pub fn timeout_until(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|at| {
        let remaining = at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            Duration::from_nanos(1)
        } else {
            remaining
        }
    })
}
