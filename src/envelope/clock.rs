//! Per-worker wall-clock source with a monotonic clamp

use chrono::{DateTime, Utc};

/// Wall-clock readings that never go backwards.
///
/// Each worker owns one, so envelope timestamps are non-decreasing per
/// worker even if the system clock steps back between readings.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last {
            if now < last {
                now = last;
            }
        }
        self.last = Some(now);
        now
    }
}
