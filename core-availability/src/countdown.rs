//! Listener-facing countdown text.
//!
//! Locked messages are bucketed by how far away they are: near unlocks read
//! as a countdown, far ones as a calendar date. Wording lives behind
//! [`CountdownFormatter`] so hosts can plug in their own string tables.

use chrono::{Duration, NaiveDate};

use crate::classifier::{Availability, AvailabilityWindow};

/// Day-count buckets for a locked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownBucket {
    Today,
    Tomorrow,
    /// Two to seven days away.
    WithinWeek { days: i64 },
    OnDate(NaiveDate),
}

impl CountdownBucket {
    /// Bucket a lock that lifts in `days_until` days, on `unlock_date`.
    pub fn for_days(days_until: i64, unlock_date: NaiveDate) -> Self {
        match days_until {
            i64::MIN..=0 => CountdownBucket::Today,
            1 => CountdownBucket::Tomorrow,
            2..=7 => CountdownBucket::WithinWeek { days: days_until },
            _ => CountdownBucket::OnDate(unlock_date),
        }
    }
}

/// Text collaborator for availability messages.
pub trait CountdownFormatter: Send + Sync {
    fn locked(&self, bucket: CountdownBucket) -> String;

    /// Unlocked, closing in `days_remaining` days (`0` = last day).
    fn expiring(&self, days_remaining: i64) -> String;

    fn expired(&self) -> String;

    /// Text for `status`, or `None` when there is nothing to tell the
    /// listener (ungated, or unlocked without an end date).
    fn describe(&self, today: NaiveDate, status: &Availability) -> Option<String> {
        match *status {
            Availability::Unlocked {
                days_remaining: None,
            } => None,
            Availability::Unlocked {
                days_remaining: Some(days),
            } => Some(self.expiring(days)),
            Availability::Locked { days_until } => {
                let unlock_date = today + Duration::days(days_until);
                Some(self.locked(CountdownBucket::for_days(days_until, unlock_date)))
            }
            Availability::Expired => Some(self.expired()),
        }
    }

    /// Classify `window` on `today` and describe the result.
    fn describe_window(&self, today: NaiveDate, window: &AvailabilityWindow) -> Option<String> {
        self.describe(today, &window.classify(today))
    }
}

/// Default English wording.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishCountdown;

impl CountdownFormatter for EnglishCountdown {
    fn locked(&self, bucket: CountdownBucket) -> String {
        match bucket {
            CountdownBucket::Today => "Unlocks today".to_string(),
            CountdownBucket::Tomorrow => "Unlocks tomorrow".to_string(),
            CountdownBucket::WithinWeek { days } => format!("Unlocks in {} days", days),
            CountdownBucket::OnDate(date) => {
                format!("Unlocks on {}", date.format("%B %-d, %Y"))
            }
        }
    }

    fn expiring(&self, days_remaining: i64) -> String {
        match days_remaining {
            i64::MIN..=0 => "Available until end of today".to_string(),
            1 => "Available for 1 more day".to_string(),
            days => format!("Available for {} more days", days),
        }
    }

    fn expired(&self) -> String {
        "No longer available".to_string()
    }
}
