use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Wall-clock time in the server's local calendar.
pub type Timestamp = DateTime<Local>;

/// Half-open creation-time window `[from, to)` for URL enumeration.
///
/// A missing bound is unbounded in that direction, so the default range
/// matches every URL.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTimeRange {
    /// Inclusive lower bound.
    pub from: Option<Timestamp>,
    /// Exclusive upper bound.
    pub to: Option<Timestamp>,
}

impl UrlTimeRange {
    pub fn new(from: Option<Timestamp>, to: Option<Timestamp>) -> Self {
        Self { from, to }
    }

    /// The range matching every time.
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    /// Returns `true` if neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Returns `true` if `time` falls inside `[from, to)`.
    pub fn contains(&self, time: &Timestamp) -> bool {
        if let Some(ref from) = self.from {
            if time < from {
                return false;
            }
        }
        if let Some(ref to) = self.to {
            if time >= to {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for UrlTimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(f, "[{}", from.to_rfc3339())?,
            None => f.write_str("(-inf")?,
        }
        match self.to {
            Some(to) => write!(f, ", {})", to.to_rfc3339()),
            None => f.write_str(", +inf)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> Timestamp {
        Local.with_ymd_and_hms(2024, 6, 10, hour, 0, 0).unwrap()
    }

    #[test]
    fn unbounded_contains_everything() {
        let range = UrlTimeRange::unbounded();
        assert!(range.is_unbounded());
        assert!(range.contains(&at(0)));
        assert!(range.contains(&at(23)));
        assert_eq!(range, UrlTimeRange::default());
    }

    #[test]
    fn lower_bound_is_inclusive() {
        let range = UrlTimeRange::new(Some(at(10)), None);
        assert!(!range.contains(&at(9)));
        assert!(range.contains(&at(10)));
        assert!(range.contains(&at(11)));
    }

    #[test]
    fn upper_bound_is_exclusive() {
        let range = UrlTimeRange::new(None, Some(at(10)));
        assert!(range.contains(&at(9)));
        assert!(!range.contains(&at(10)));
    }

    #[test]
    fn empty_when_bounds_meet() {
        let range = UrlTimeRange::new(Some(at(10)), Some(at(10)));
        assert!(!range.contains(&at(10)));
        assert!(!range.is_unbounded());
    }

    #[test]
    fn display_marks_open_ends() {
        let range = UrlTimeRange::unbounded();
        assert_eq!(format!("{range}"), "(-inf, +inf)");

        let bounded = UrlTimeRange::new(Some(at(1)), None).to_string();
        assert!(bounded.starts_with('['));
        assert!(bounded.ends_with("+inf)"));
    }
}
