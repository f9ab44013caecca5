//! Effective fetch window.
//!
//! The window comes from three sources, in order of precedence:
//!
//! 1. `process.previous.days` > 0 replaces the explicit window with
//!    "the last N days up to now" (an explicit from-date can still narrow it);
//! 2. `process.resume.from.last` (default on) moves the start forward to the
//!    persisted watermark;
//! 3. otherwise `process.from.date` / `process.to.date` as configured.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::Cfg;
use crate::error::Result;

/// The raw window settings of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub previous_days: i64,
    pub resume_from_last: bool,
}

impl Default for DateWindow {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            previous_days: 0,
            resume_from_last: true,
        }
    }
}

impl DateWindow {
    /// Read the `process.*` window keys. Malformed dates or numbers are errors.
    pub fn from_config(cfg: &Cfg) -> Result<Self> {
        Ok(Self {
            from: cfg.date("process.from.date")?,
            to: cfg.end_date("process.to.date")?,
            previous_days: cfg.int_or("process.previous.days", 0)?,
            resume_from_last: cfg.bool_or("process.resume.from.last", true),
        })
    }

    /// Combine with the persisted watermark at time `now`.
    pub fn resolve(&self, watermark: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateRange {
        let (mut from, mut to) = (self.from, self.to);

        if self.previous_days > 0 {
            to = Some(now);
            // Spans past the calendar's range start at its beginning.
            let start = Duration::try_days(self.previous_days)
                .and_then(|span| now.checked_sub_signed(span))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            from = later(from, Some(start));
        }
        if self.resume_from_last {
            from = later(from, watermark);
        }

        DateRange::new(from, to)
    }
}

/// The later of two optional instants. Absent values do not constrain.
pub fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// A resolved received-date filter. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateRange {
    /// No date filter: the whole folder.
    All,
    Since { from: DateTime<Utc> },
    Until { to: DateTime<Utc> },
    Between { from: DateTime<Utc>, to: DateTime<Utc> },
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        match (from, to) {
            (None, None) => Self::All,
            (Some(from), None) => Self::Since { from },
            (None, Some(to)) => Self::Until { to },
            (Some(from), Some(to)) => Self::Between { from, to },
        }
    }

    pub fn from(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Since { from } | Self::Between { from, .. } => Some(from),
            Self::All | Self::Until { .. } => None,
        }
    }

    pub fn to(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Until { to } | Self::Between { to, .. } => Some(to),
            Self::All | Self::Since { .. } => None,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from().is_none_or(|from| instant >= from) && self.to().is_none_or(|to| instant <= to)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const FMT: &str = "%Y-%m-%d %H:%M:%S";
        match self {
            Self::All => write!(f, "all messages"),
            Self::Since { from } => write!(f, "since {}", from.format(FMT)),
            Self::Until { to } => write!(f, "until {}", to.format(FMT)),
            Self::Between { from, to } => {
                write!(f, "from {} to {}", from.format(FMT), to.format(FMT))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_later_ignores_absent() {
        assert_eq!(later(None, None), None);
        assert_eq!(later(Some(at(2024, 1, 1)), None), Some(at(2024, 1, 1)));
        assert_eq!(later(None, Some(at(2024, 1, 1))), Some(at(2024, 1, 1)));
        assert_eq!(
            later(Some(at(2024, 1, 1)), Some(at(2024, 2, 1))),
            Some(at(2024, 2, 1))
        );
    }

    #[test]
    fn test_previous_days_overrides_explicit_window() {
        let now = at(2024, 6, 30);
        let window = DateWindow {
            from: Some(at(2020, 1, 1)),
            to: Some(at(2020, 12, 31)),
            previous_days: 7,
            resume_from_last: false,
        };
        let range = window.resolve(None, now);
        assert_eq!(range.from(), Some(now - Duration::days(7)));
        assert_eq!(range.to(), Some(now));
    }

    #[test]
    fn test_huge_previous_days_starts_at_calendar_start() {
        let now = at(2024, 6, 30);
        for days in [1_000_000_000_000, i64::MAX] {
            let window = DateWindow {
                previous_days: days,
                resume_from_last: false,
                ..Default::default()
            };
            let range = window.resolve(None, now);
            assert_eq!(range.from(), Some(DateTime::<Utc>::MIN_UTC), "{days}");
            assert_eq!(range.to(), Some(now));
            assert!(range.contains(at(1970, 1, 1)));
        }
    }

    #[test]
    fn test_previous_days_keeps_later_explicit_from() {
        let now = at(2024, 6, 30);
        let window = DateWindow {
            from: Some(at(2024, 6, 29)),
            previous_days: 7,
            resume_from_last: false,
            ..Default::default()
        };
        assert_eq!(window.resolve(None, now).from(), Some(at(2024, 6, 29)));
    }

    #[test]
    fn test_resume_from_at_least_watermark() {
        let watermark = at(2024, 3, 1);
        let window = DateWindow {
            from: Some(at(2024, 1, 1)),
            ..Default::default()
        };
        let range = window.resolve(Some(watermark), at(2024, 6, 1));
        assert!(range.from().unwrap() >= watermark);

        // An explicit from-date past the watermark still wins.
        let window = DateWindow {
            from: Some(at(2024, 5, 1)),
            ..Default::default()
        };
        assert_eq!(window.resolve(Some(watermark), at(2024, 6, 1)).from(), Some(at(2024, 5, 1)));
    }

    #[test]
    fn test_watermark_only_gives_open_range() {
        let watermark = at(2024, 3, 1);
        let range = DateWindow::default().resolve(Some(watermark), at(2024, 6, 1));
        assert_eq!(range, DateRange::Since { from: watermark });
    }

    #[test]
    fn test_resume_disabled_ignores_watermark() {
        let window = DateWindow {
            resume_from_last: false,
            ..Default::default()
        };
        assert_eq!(window.resolve(Some(at(2024, 3, 1)), at(2024, 6, 1)), DateRange::All);
    }

    #[test]
    fn test_range_shapes_and_contains() {
        assert_eq!(DateRange::new(None, None), DateRange::All);
        assert!(DateRange::All.contains(at(1999, 1, 1)));

        let until = DateRange::new(None, Some(at(2024, 1, 10)));
        assert!(until.contains(at(2024, 1, 10)));
        assert!(!until.contains(at(2024, 1, 11)));

        let between = DateRange::new(Some(at(2024, 1, 1)), Some(at(2024, 1, 31)));
        assert!(between.contains(at(2024, 1, 1)));
        assert!(between.contains(at(2024, 1, 31)));
        assert!(!between.contains(at(2024, 2, 1)));
    }

    #[test]
    fn test_from_config() {
        let cfg = Cfg::from_pairs([
            ("process.from.date", "2024/01/05"),
            ("process.to.date", "01-31-2024"),
            ("process.resume.from.last", "no"),
        ]);
        let window = DateWindow::from_config(&cfg).unwrap();
        assert_eq!(window.from, Some(Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap()));
        assert!(window.to.unwrap() > Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap());
        assert!(!window.resume_from_last);
        assert_eq!(window.previous_days, 0);
    }

    #[test]
    fn test_from_config_rejects_bad_date() {
        let cfg = Cfg::from_pairs([("process.from.date", "yesterday")]);
        assert!(DateWindow::from_config(&cfg).is_err());
    }
}
