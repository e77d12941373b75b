//! Lock / unlock / expiry classification.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of one message on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    /// Playable. `days_remaining` is set when the window has an end date;
    /// `0` means the last day is today.
    Unlocked { days_remaining: Option<i64> },
    /// Not playable yet.
    Locked { days_until: i64 },
    /// The window has closed.
    Expired,
}

impl Availability {
    pub fn is_playable(&self) -> bool {
        matches!(self, Availability::Unlocked { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Unlocked { .. } => "unlocked",
            Availability::Locked { .. } => "locked",
            Availability::Expired => "expired",
        }
    }

    /// Same status, ignoring the day counts.
    pub fn same_status(&self, other: &Availability) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `today` against an optional availability window.
///
/// Rules, first match wins:
/// 1. no bounds: unlocked
/// 2. before `from`: locked, `days_until = from - today`
/// 3. after `to`: expired
/// 4. otherwise unlocked, with `days_remaining = to - today` when `to` is set
///
/// Both bounds are inclusive.
pub fn classify(today: NaiveDate, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Availability {
    if from.is_none() && to.is_none() {
        return Availability::Unlocked {
            days_remaining: None,
        };
    }

    if let Some(from) = from {
        if today < from {
            return Availability::Locked {
                days_until: (from - today).num_days(),
            };
        }
    }

    match to {
        Some(to) if today > to => Availability::Expired,
        Some(to) => Availability::Unlocked {
            days_remaining: Some((to - today).num_days()),
        },
        None => Availability::Unlocked {
            days_remaining: None,
        },
    }
}

/// Optional `[from, to]` day window attached to a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl AvailabilityWindow {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn classify(&self, today: NaiveDate) -> Availability {
        classify(today, self.from, self.to)
    }

    /// Whether this window can still change classification after `status`.
    ///
    /// Locked tracks will unlock; unlocked tracks with an end date will
    /// expire. Expired and unbounded tracks are final.
    pub fn needs_recheck(&self, status: &Availability) -> bool {
        match status {
            Availability::Locked { .. } => true,
            Availability::Unlocked { .. } => self.to.is_some(),
            Availability::Expired => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_unbounded_is_unlocked() {
        assert_eq!(
            classify(day(2025, 6, 1), None, None),
            Availability::Unlocked {
                days_remaining: None
            }
        );
    }

    #[test]
    fn test_from_today_is_unlocked() {
        let status = classify(day(2025, 6, 1), Some(day(2025, 6, 1)), None);
        assert_eq!(
            status,
            Availability::Unlocked {
                days_remaining: None
            }
        );
        assert!(status.is_playable());
    }

    #[test]
    fn test_future_from_is_locked_with_day_count() {
        assert_eq!(
            classify(day(2025, 6, 1), Some(day(2025, 6, 5)), None),
            Availability::Locked { days_until: 4 }
        );
    }

    #[test]
    fn test_past_to_is_expired() {
        let status = classify(day(2025, 6, 10), None, Some(day(2025, 6, 5)));
        assert_eq!(status, Availability::Expired);
        assert!(!status.is_playable());
    }

    #[test]
    fn test_window_reports_days_remaining() {
        assert_eq!(
            classify(day(2025, 6, 3), Some(day(2025, 6, 1)), Some(day(2025, 6, 5))),
            Availability::Unlocked {
                days_remaining: Some(2)
            }
        );
        assert_eq!(
            classify(day(2025, 6, 5), None, Some(day(2025, 6, 5))),
            Availability::Unlocked {
                days_remaining: Some(0)
            }
        );
    }

    #[test]
    fn test_lock_takes_precedence_over_inverted_window() {
        // from after to: before `from` it is still reported locked.
        assert_eq!(
            classify(day(2025, 6, 1), Some(day(2025, 6, 10)), Some(day(2025, 6, 5))),
            Availability::Locked { days_until: 9 }
        );
    }

    #[test]
    fn test_needs_recheck() {
        let open_ended = AvailabilityWindow::new(Some(day(2025, 6, 1)), None);
        let closing = AvailabilityWindow::new(None, Some(day(2025, 6, 5)));

        assert!(open_ended.needs_recheck(&Availability::Locked { days_until: 1 }));
        assert!(!open_ended.needs_recheck(&Availability::Unlocked {
            days_remaining: None
        }));
        assert!(closing.needs_recheck(&Availability::Unlocked {
            days_remaining: Some(3)
        }));
        assert!(!closing.needs_recheck(&Availability::Expired));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Availability::Locked { days_until: 4 }).unwrap();
        assert_eq!(json, r#"{"status":"locked","days_until":4}"#);
    }
}
