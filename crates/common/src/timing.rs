//! Request ids and elapsed-time measurement for log correlation.

use std::time::{Duration, Instant};

/// Short correlation id attached to every log line of one inbound request,
/// e.g. `req-3f9a`.
#[must_use]
pub fn new_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("req-{}", &id[..4])
}

/// Measures elapsed wall time of one step.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    #[must_use]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed milliseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
