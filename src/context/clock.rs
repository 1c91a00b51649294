//! Wall-clock source for the tracker.

use chrono::{DateTime, FixedOffset, Local};

pub trait Clock: Send {
    /// Current local time.
    fn now(&self) -> DateTime<FixedOffset>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, FixedOffset, TimeDelta};

    use super::Clock;

    /// Clock advanced by hand; clones share the same time.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<FixedOffset>>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<FixedOffset>) -> Self {
            Self {
                now: Arc::new(Mutex::new(start)),
            }
        }

        pub fn advance_secs(&self, secs: i64) {
            *self.now.lock().unwrap() += TimeDelta::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<FixedOffset> {
            *self.now.lock().unwrap()
        }
    }
}
