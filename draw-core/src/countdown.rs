use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whole time units left until the event date.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// All fields are zero once `now` reaches `target`.
    pub fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = (target - now).num_seconds();
        if remaining <= 0 {
            return Self::default();
        }

        Self {
            days: remaining / 86_400,
            hours: (remaining / 3_600) % 24,
            minutes: (remaining / 60) % 60,
            seconds: remaining % 60,
        }
    }

    pub fn is_elapsed(&self) -> bool {
        *self == Self::default()
    }
}
