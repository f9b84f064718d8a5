use crate::error::ShowError;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use std::fmt;

/// When a show was recorded, taken from its file name.
///
/// Recordings are named `YYYYMMDD_HHMM...`: the first 8 characters are the
/// date and characters 9–13 the 24-hour start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShowStamp {
    pub recorded_at: NaiveDateTime,
}

impl ShowStamp {
    pub fn from_filename(name: &str) -> Result<Self, ShowError> {
        let bad = || ShowError::BadFilename(name.to_string());
        let date = name.get(0..8).ok_or_else(bad)?;
        let time = name.get(9..13).ok_or_else(bad)?;
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| bad())?;
        let time = NaiveTime::parse_from_str(time, "%H%M").map_err(|_| bad())?;
        Ok(ShowStamp {
            recorded_at: NaiveDateTime::new(date, time),
        })
    }

    /// Human label, e.g. `15 Jan 14:00`.
    pub fn label(&self) -> String {
        self.recorded_at.format("%d %b %H:%M").to_string()
    }

    /// Name of the per-day archive folder, e.g. `15 Jan`.
    pub fn day_folder(&self) -> String {
        self.recorded_at.format("%d %b").to_string()
    }

    /// Timestamp suitable for a recording-date tag.
    pub fn tag_date(&self) -> String {
        self.recorded_at.format("%Y-%m-%dT%H:%M").to_string()
    }

    /// The broadcast slot: recording start shifted by `offset_minutes`,
    /// rounded down to the quarter hour.
    ///
    /// Recorders start a few minutes early, so with the usual 15 minute offset
    /// a 13:50 recording belongs to the 14:00 slot.
    pub fn slot(&self, offset_minutes: i64) -> NaiveDateTime {
        let shifted = self.recorded_at + Duration::minutes(offset_minutes);
        let minute = shifted.minute() - shifted.minute() % 15;
        let time = NaiveTime::from_hms_opt(shifted.hour(), minute, 0).unwrap_or(shifted.time());
        NaiveDateTime::new(shifted.date(), time)
    }
}

impl fmt::Display for ShowStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
