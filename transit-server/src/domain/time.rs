//! GTFS service time handling.
//!
//! GTFS schedules give departure times as "HH:MM:SS" strings measured from
//! local midnight of the service day. Hours may exceed 23 for trips that run
//! past midnight ("25:10:00" is 01:10 the following morning).

use std::fmt;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, TimeZone};
use chrono_tz::Tz;

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid service time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A time of day relative to the start of a service day.
///
/// # Examples
///
/// ```
/// use transit_server::domain::ServiceTime;
///
/// let t = ServiceTime::parse("08:15:00").unwrap();
/// assert_eq!(t.as_secs(), 8 * 3600 + 15 * 60);
/// assert_eq!(t.to_string(), "08:15:00");
///
/// // Single-digit hours and post-midnight hours are valid GTFS
/// assert!(ServiceTime::parse("8:15:00").is_ok());
/// assert!(ServiceTime::parse("25:10:00").is_ok());
///
/// assert!(ServiceTime::parse("08:15").is_err());
/// assert!(ServiceTime::parse("08:61:00").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime {
    secs: u32,
}

impl ServiceTime {
    /// Create a service time from seconds after midnight.
    pub fn from_secs(secs: u32) -> Self {
        Self { secs }
    }

    /// Parse "H:MM:SS" or "HH:MM:SS".
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let mut parts = s.trim().split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TimeError::new("expected HH:MM:SS format"));
        };

        if h.is_empty() || h.len() > 3 || !h.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TimeError::new("invalid hour digits"));
        }
        let hours: u32 = h
            .parse()
            .map_err(|_| TimeError::new("invalid hour digits"))?;

        let minutes =
            parse_two_digits(m.as_bytes()).ok_or_else(|| TimeError::new("invalid minute digits"))?;
        if minutes > 59 {
            return Err(TimeError::new("minute must be 0-59"));
        }

        let seconds = parse_two_digits(sec.as_bytes())
            .ok_or_else(|| TimeError::new("invalid second digits"))?;
        if seconds > 59 {
            return Err(TimeError::new("second must be 0-59"));
        }

        Ok(Self {
            secs: hours * 3600 + minutes * 60 + seconds,
        })
    }

    /// Seconds after the start of the service day.
    pub fn as_secs(&self) -> u32 {
        self.secs
    }

    /// Offset from local midnight as a chrono duration.
    pub fn as_duration(&self) -> Duration {
        Duration::seconds(i64::from(self.secs))
    }

    /// Resolve this wall-clock time on `date` in `tz`.
    ///
    /// Ambiguous local times (clocks going back) resolve to the earlier
    /// instant. Times that fall in a spring-forward gap are pushed forward
    /// by an hour, matching how a wall clock reads after the change.
    pub fn on_date(&self, date: NaiveDate, tz: Tz) -> Option<DateTime<Tz>> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let local = midnight.checked_add_signed(self.as_duration())?;

        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => tz
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest(),
        }
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.secs / 3600,
            (self.secs / 60) % 60,
            self.secs % 60
        )
    }
}

/// Parse two ASCII digit bytes into a u32.
fn parse_two_digits(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 2 {
        return None;
    }
    let d1 = (bytes[0] as char).to_digit(10)?;
    let d2 = (bytes[1] as char).to_digit(10)?;
    Some(d1 * 10 + d2)
}
