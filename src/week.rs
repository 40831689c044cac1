use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// An ISO-8601 (week, year) pair. Weeks run Monday to Sunday and week 1 holds
/// the year's first Thursday, so early January can belong to the previous year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

impl IsoWeek {
    pub fn of(at: DateTime<Utc>) -> Self {
        let iso = at.iso_week();
        IsoWeek {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl std::fmt::Display for IsoWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// The `count` most recent ISO weeks ending at the week of `now`, newest first.
///
/// Steps back seven days at a time instead of decrementing the week number so
/// that year boundaries (including 53-week years) fall out of the calendar.
pub fn recent_weeks(now: DateTime<Utc>, count: usize) -> Vec<IsoWeek> {
    (0..count)
        .map(|offset| IsoWeek::of(now - Duration::days(7 * offset as i64)))
        .collect()
}

/// Every ISO week touched by the range `[start, end]`, oldest first.
pub fn weeks_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<IsoWeek> {
    let mut weeks = Vec::new();
    if end < start {
        return weeks;
    }

    let last = IsoWeek::of(end);
    let mut cursor = start;
    loop {
        let week = IsoWeek::of(cursor);
        weeks.push(week);
        if week == last {
            break;
        }
        cursor += Duration::days(7);
    }

    weeks
}
