//! Clock conversions shared by the whole pipeline: the corpus date format,
//! epoch seconds, and the day/week indices every table is keyed on.

use std::error::Error;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Timestamp format used by every raw log file and the ground-truth answers.
pub const DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

const WORK_START_MIN: u32 = 7 * 60 + 30;
const WORK_END_MIN: u32 = 17 * 60 + 30;

/// A date-time string that does not match [`DATE_FORMAT`].
#[derive(Debug)]
pub struct FormatError {
    pub input: String,
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unparseable date-time '{}'", self.input)
    }
}

impl Error for FormatError {}

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, FormatError> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| FormatError {
        input: s.to_string(),
    })
}

pub fn epoch(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

pub fn from_epoch(e: i64) -> NaiveDateTime {
    match DateTime::from_timestamp(e, 0) {
        Some(dt) => dt.naive_utc(),
        None => NaiveDateTime::default(),
    }
}

/// The two reference dates every index is counted from.
///
/// `day_anchor` is the calendar day of the very first log record; week numbers
/// are elapsed days since it, divided by 7, so week 0 is the first seven days
/// of data. `week_anchor` is the Sunday on or before `day_anchor`; day numbers
/// are elapsed days since it, so `day % 7` is the weekday with Sunday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAnchors {
    pub day_anchor: NaiveDate,
    pub week_anchor: NaiveDate,
}

impl TimeAnchors {
    pub fn from_first(first: NaiveDateTime) -> TimeAnchors {
        let day_anchor = first.date();
        let back = day_anchor.weekday().num_days_from_sunday() as i64;
        TimeAnchors {
            day_anchor,
            week_anchor: day_anchor - chrono::Duration::days(back),
        }
    }

    pub fn week_of(&self, dt: NaiveDateTime) -> i64 {
        (dt.date() - self.day_anchor).num_days().div_euclid(7)
    }

    pub fn day_of(&self, dt: NaiveDateTime) -> i64 {
        (dt.date() - self.week_anchor).num_days()
    }

    /// Midnight opening the given week window.
    pub fn week_start(&self, week: i64) -> NaiveDateTime {
        (self.day_anchor + chrono::Duration::days(7 * week)).and_time(NaiveTime::MIN)
    }

    /// Midnight opening the given day window.
    pub fn day_start(&self, day: i64) -> NaiveDateTime {
        (self.week_anchor + chrono::Duration::days(day)).and_time(NaiveTime::MIN)
    }
}

/// Work hours run 07:30 to 17:30 inclusive; both boundaries count as work time.
pub fn is_after_hours(dt: NaiveDateTime) -> bool {
    let minute = dt.hour() * 60 + dt.minute();
    minute < WORK_START_MIN || minute > WORK_END_MIN || (minute == WORK_END_MIN && dt.second() > 0)
}

pub fn is_weekend(dt: NaiveDateTime) -> bool {
    let wd = dt.weekday().num_days_from_sunday();
    wd == 0 || wd == 6
}

/// Time-of-week bucket: 1 workday/work-hours, 2 workday/after-hours,
/// 3 weekend/work-hours, 4 weekend/after-hours.
pub fn time_bucket(dt: NaiveDateTime) -> i64 {
    match (is_weekend(dt), is_after_hours(dt)) {
        (true, true) => 4,
        (true, false) => 3,
        (false, true) => 2,
        (false, false) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_datetime("2010-01-02 08:00:00").is_err());
        assert!(parse_datetime("01/02/2010 08:00:00").is_ok());
    }

    #[test]
    fn epoch_round_trip() {
        let d = dt("01/02/2010 07:21:14");
        assert_eq!(from_epoch(epoch(d)), d);
    }

    #[test]
    fn anchors_from_saturday_start() {
        // 2010-01-02 is a Saturday, so the week anchor is Sunday 2009-12-27.
        let a = TimeAnchors::from_first(dt("01/02/2010 07:21:14"));
        assert_eq!(a.day_anchor, NaiveDate::from_ymd_opt(2010, 1, 2).unwrap());
        assert_eq!(a.week_anchor, NaiveDate::from_ymd_opt(2009, 12, 27).unwrap());
        assert_eq!(a.day_of(dt("01/02/2010 07:21:14")), 6);
        assert_eq!(a.week_of(dt("01/02/2010 23:59:59")), 0);
        assert_eq!(a.week_of(dt("01/08/2010 23:59:59")), 0);
        assert_eq!(a.week_of(dt("01/09/2010 00:00:01")), 1);
    }

    #[test]
    fn same_timestamp_same_indices() {
        let a = TimeAnchors::from_first(dt("01/02/2010 00:00:00"));
        let probe = dt("02/14/2010 13:00:00");
        let via_epoch = from_epoch(epoch(probe));
        assert_eq!(a.week_of(probe), a.week_of(via_epoch));
        assert_eq!(a.day_of(probe), a.day_of(via_epoch));
    }

    #[test]
    fn window_starts_are_midnights() {
        let a = TimeAnchors::from_first(dt("01/02/2010 07:21:14"));
        assert_eq!(a.week_start(1), dt("01/09/2010 00:00:00"));
        assert_eq!(a.day_start(6), dt("01/02/2010 00:00:00"));
    }

    #[test]
    fn work_hour_boundaries() {
        assert!(!is_after_hours(dt("01/04/2010 07:30:00")));
        assert!(is_after_hours(dt("01/04/2010 07:29:59")));
        assert!(!is_after_hours(dt("01/04/2010 17:30:00")));
        assert!(is_after_hours(dt("01/04/2010 17:30:01")));
        assert!(is_after_hours(dt("01/04/2010 23:10:00")));
    }

    #[test]
    fn buckets_cover_the_grid() {
        assert_eq!(time_bucket(dt("01/04/2010 09:00:00")), 1); // Monday morning
        assert_eq!(time_bucket(dt("01/04/2010 22:00:00")), 2);
        assert_eq!(time_bucket(dt("01/02/2010 09:00:00")), 3); // Saturday
        assert_eq!(time_bucket(dt("01/02/2010 22:00:00")), 4);
    }
}
