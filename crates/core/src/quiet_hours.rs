//! Quiet-hours calculation in a fixed civil timezone.
//!
//! A quiet-hours window is a pair of wall-clock times. When `start < end`
//! the window sits inside one day; when `start > end` it crosses midnight;
//! when `start == end` it has zero length and is never active.
//!
//! Academies run in a fixed-offset timezone (no DST), so one calendar day is
//! always exactly 24 hours.

use chrono::{FixedOffset, NaiveDateTime, NaiveTime, TimeDelta};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Default academy offset: UTC+09:00.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 9 * 60;

/// Wall-clock format of `quiet_hours_start` / `quiet_hours_end`.
const WALL_CLOCK_FORMAT: &str = "%H:%M";

/// Build a fixed-offset timezone from a minute offset east of UTC.
pub fn timezone_from_offset_minutes(minutes: i32) -> Result<FixedOffset, CoreError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            CoreError::Validation(format!("UTC offset of {minutes} minutes is out of range"))
        })
}

/// Parse an `"HH:mm"` wall-clock string.
pub fn parse_wall_clock(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value.trim(), WALL_CLOCK_FORMAT)
        .map_err(|_| CoreError::Validation(format!("'{value}' is not a valid HH:mm time")))
}

/// Whether `now` falls inside the `[start, end)` window in `tz`.
pub fn is_in_quiet_hours(
    start: NaiveTime,
    end: NaiveTime,
    now: Timestamp,
    tz: &FixedOffset,
) -> bool {
    if start == end {
        return false;
    }
    let local = now.with_timezone(tz).time();
    if start < end {
        start <= local && local < end
    } else {
        local >= start || local < end
    }
}

/// The next instant strictly after `now` at which the local clock reads `end`.
pub fn next_quiet_hours_end(end: NaiveTime, now: Timestamp, tz: &FixedOffset) -> Timestamp {
    let today = now.with_timezone(tz).date_naive();
    let candidate = local_to_utc(today.and_time(end), tz);
    if candidate > now {
        candidate
    } else {
        candidate + TimeDelta::days(1)
    }
}

fn local_to_utc(local: NaiveDateTime, tz: &FixedOffset) -> Timestamp {
    (local - TimeDelta::seconds(i64::from(tz.local_minus_utc()))).and_utc()
}

// ---------------------------------------------------------------------------
// QuietHours
// ---------------------------------------------------------------------------

/// A parsed quiet-hours window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    /// Parse the `"HH:mm"` boundaries stored in academy settings.
    pub fn parse(start: &str, end: &str) -> Result<Self, CoreError> {
        Ok(Self {
            start: parse_wall_clock(start)?,
            end: parse_wall_clock(end)?,
        })
    }

    pub fn contains(&self, now: Timestamp, tz: &FixedOffset) -> bool {
        is_in_quiet_hours(self.start, self.end, now, tz)
    }

    pub fn next_end(&self, now: Timestamp, tz: &FixedOffset) -> Timestamp {
        next_quiet_hours_end(self.end, now, tz)
    }

    /// Earliest send time for a message created at `now`.
    pub fn schedule_for(&self, now: Timestamp, tz: &FixedOffset) -> Timestamp {
        if self.contains(now, tz) {
            self.next_end(now, tz)
        } else {
            now
        }
    }
}
