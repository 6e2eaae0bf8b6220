use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Time source seam. Production code uses `SystemClock`; the report-window
/// and activity tests pin time with `ManualClock`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(instant: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(instant),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().expect("clock poisoned");
        *current = *current + by;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock().expect("clock poisoned") = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("clock poisoned")
    }
}
