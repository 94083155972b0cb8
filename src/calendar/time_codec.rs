use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use regex::Regex;
use thiserror::Error;

use crate::calendar::event::{EventStart, parse_instant};

const MINUTES_PER_DAY: i32 = 24 * 60;

const DISPLAY_DATE_FORMAT: &str = "%-m/%-d/%Y";
const DISPLAY_DATE_TIME_FORMAT: &str = "%-m/%-d/%Y, %-I:%M %p";
pub const INVALID_DATE: &str = "Invalid date";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeCodecError {
    #[error("Invalid wall-clock time '{0}', expected HH:MM")]
    InvalidTime(String),
}

fn wall_clock_pattern() -> &'static Regex {
    static WALL_CLOCK_RE: OnceLock<Regex> = OnceLock::new();
    WALL_CLOCK_RE.get_or_init(|| Regex::new(r"^\d{2}:\d{2}$").expect("invalid wall clock regex"))
}

pub fn parse_wall_clock(value: &str) -> Result<(u32, u32), TimeCodecError> {
    let invalid = || TimeCodecError::InvalidTime(value.to_string());

    if !wall_clock_pattern().is_match(value) {
        return Err(invalid());
    }

    let (hour, minute) = value.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;

    if hour >= 24 || minute >= 60 {
        return Err(invalid());
    }

    Ok((hour, minute))
}

// Offsets are minutes to add to local time to get UTC, so UTC+5:30 is -330.
// A shift past midnight wraps within the day.
pub fn encode_local_time_to_utc(
    local_time: &str,
    utc_offset_minutes: i32,
) -> Result<String, TimeCodecError> {
    let (hour, minute) = parse_wall_clock(local_time)?;
    let local_minutes = (hour * 60 + minute) as i32;
    let utc_minutes = (local_minutes + utc_offset_minutes).rem_euclid(MINUTES_PER_DAY);

    let encoded = format!("{:02}:{:02}", utc_minutes / 60, utc_minutes % 60);
    tracing::debug!(
        "Encoded local time {} (offset {}) as UTC {}",
        local_time,
        utc_offset_minutes,
        encoded
    );
    Ok(encoded)
}

pub fn local_utc_offset_minutes() -> i32 {
    -Local::now().offset().local_minus_utc() / 60
}

pub fn decode_utc_to_local_display(iso_instant: &str) -> String {
    decode_in_zone(iso_instant, &Local)
}

pub fn decode_in_zone<Tz>(iso_instant: &str, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if let Ok(date) = NaiveDate::parse_from_str(iso_instant, "%Y-%m-%d") {
        return format_start_in(&EventStart::AllDay(date), zone);
    }

    match parse_instant(iso_instant, None) {
        Ok(instant) => format_instant_in(instant, zone),
        Err(e) => {
            tracing::warn!("Cannot display instant {}: {}", iso_instant, e);
            INVALID_DATE.to_string()
        }
    }
}

pub fn format_instant_in<Tz>(instant: DateTime<Utc>, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    instant
        .with_timezone(zone)
        .format(DISPLAY_DATE_TIME_FORMAT)
        .to_string()
}

pub fn format_start(start: &EventStart) -> String {
    format_start_in(start, &Local)
}

pub fn format_start_in<Tz>(start: &EventStart, zone: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match start {
        EventStart::AllDay(date) => date.format(DISPLAY_DATE_FORMAT).to_string(),
        EventStart::At(instant) => format_instant_in(*instant, zone),
    }
}
