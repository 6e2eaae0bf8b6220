use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CHECKPOINTS: &str = "checkpoints";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityCategory {
    /// Requests received as the ride owner.
    Driver,
    /// The user's own outstanding bookings.
    Bookings,
    /// Paid contact unlocks.
    Unlocks,
}

/// Per-user last-seen marks, one per category. Owned by the backend and
/// advanced explicitly when the user views a category, so "new since last
/// visit" is the same number on every device.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SeenCheckpoints {
    pub driver: Option<DateTime<Utc>>,
    pub bookings: Option<DateTime<Utc>>,
    pub unlocks: Option<DateTime<Utc>>,
}

impl SeenCheckpoints {
    pub fn for_category(&self, category: ActivityCategory) -> Option<DateTime<Utc>> {
        match category {
            ActivityCategory::Driver => self.driver,
            ActivityCategory::Bookings => self.bookings,
            ActivityCategory::Unlocks => self.unlocks,
        }
    }

    pub fn set(&mut self, category: ActivityCategory, instant: DateTime<Utc>) {
        match category {
            ActivityCategory::Driver => self.driver = Some(instant),
            ActivityCategory::Bookings => self.bookings = Some(instant),
            ActivityCategory::Unlocks => self.unlocks = Some(instant),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_unset_checkpoints_default_to_none() {
        let seen = SeenCheckpoints::default();
        assert!(seen.for_category(ActivityCategory::Driver).is_none());
        assert!(seen.for_category(ActivityCategory::Unlocks).is_none());
    }

    #[test]
    fn test_set_touches_only_its_category() {
        let mut seen = SeenCheckpoints::default();
        let now = Utc::now();
        seen.set(ActivityCategory::Bookings, now);

        assert_eq!(seen.for_category(ActivityCategory::Bookings), Some(now));
        assert!(seen.for_category(ActivityCategory::Driver).is_none());
    }
}
