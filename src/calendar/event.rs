use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::calendar::time_codec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Assignment,
    Announcement,
    Custom,
    #[default]
    #[serde(other)]
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Assignment,
        EventKind::Announcement,
        EventKind::Custom,
        EventKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Assignment => "assignment",
            EventKind::Announcement => "announcement",
            EventKind::Custom => "custom",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

// Exactly one of date or instant on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStart {
    AllDay(NaiveDate),
    At(DateTime<Utc>),
}

impl EventStart {
    pub fn is_all_day(&self) -> bool {
        matches!(self, EventStart::AllDay(_))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            EventStart::AllDay(date) => Some(*date),
            EventStart::At(_) => None,
        }
    }

    pub fn date_time(&self) -> Option<DateTime<Utc>> {
        match self {
            EventStart::AllDay(_) => None,
            EventStart::At(instant) => Some(*instant),
        }
    }

    fn from_wire(wire: WireStart) -> Result<Self, String> {
        match (wire.date, wire.date_time) {
            (Some(_), Some(_)) => Err("start carries both date and dateTime".to_string()),
            (None, None) => Err("start carries neither date nor dateTime".to_string()),
            (Some(date), None) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map(EventStart::AllDay)
                .map_err(|e| format!("invalid date '{}': {}", date, e)),
            (None, Some(date_time)) => {
                parse_instant(&date_time, wire.time_zone.as_deref()).map(EventStart::At)
            }
        }
    }

    fn to_wire(self) -> WireStart {
        match self {
            EventStart::AllDay(date) => WireStart {
                date: Some(date.format("%Y-%m-%d").to_string()),
                ..WireStart::default()
            },
            EventStart::At(instant) => WireStart {
                date_time: Some(instant.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ..WireStart::default()
            },
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl Serialize for EventStart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventStart {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireStart::deserialize(deserializer)?;
        EventStart::from_wire(wire).map_err(serde::de::Error::custom)
    }
}

pub(crate) fn parse_instant(value: &str, time_zone: Option<&str>) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("invalid dateTime '{}': {}", value, e))?;

    match time_zone {
        None | Some("UTC") | Some("Etc/UTC") => Ok(naive.and_utc()),
        Some(name) => {
            let zone: chrono_tz::Tz = name
                .parse()
                .map_err(|_| format!("unknown timeZone '{}'", name))?;
            zone.from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| format!("'{}' does not exist in {}", value, name))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    pub start: EventStart,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventStart>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none", skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
}

impl CalendarEvent {
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn empty_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.filter(|value| !value.is_empty()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Kind(EventKind),
}

impl EventFilter {
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kind(kind) => event.kind == *kind,
        }
    }
}

impl FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(EventFilter::All),
            other => other.parse().map(EventFilter::Kind),
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFilter::All => f.write_str("all"),
            EventFilter::Kind(kind) => kind.fmt(f),
        }
    }
}

pub fn filter_events(events: &[CalendarEvent], filter: EventFilter) -> Vec<&CalendarEvent> {
    events.iter().filter(|event| filter.matches(event)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("Event title is required")]
    MissingTitle,
    #[error("Please enter a valid date in YYYY-MM-DD format (got '{0}')")]
    InvalidDate(String),
    #[error("Please enter a valid time in HH:MM format (got '{0}')")]
    InvalidTime(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: Option<String>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date: date.into(),
            ..Self::default()
        }
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn time(&self) -> Option<&str> {
        self.time.as_deref().filter(|time| !time.is_empty())
    }

    pub fn validate(&self) -> Result<(), DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::MissingTitle);
        }

        if !date_pattern().is_match(&self.date)
            || NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").is_err()
        {
            return Err(DraftError::InvalidDate(self.date.clone()));
        }

        if let Some(time) = self.time() {
            time_codec::parse_wall_clock(time)
                .map_err(|_| DraftError::InvalidTime(time.to_string()))?;
        }

        Ok(())
    }

    pub fn to_request(&self, utc_offset_minutes: i32) -> Result<NewEventRequest, DraftError> {
        self.validate()?;

        let time = match self.time() {
            Some(local) => Some(
                time_codec::encode_local_time_to_utc(local, utc_offset_minutes)
                    .map_err(|_| DraftError::InvalidTime(local.to_string()))?,
            ),
            None => None,
        };

        Ok(NewEventRequest {
            title: self.title.clone(),
            description: self.description.clone(),
            date: self.date.clone(),
            time,
            kind: EventKind::Custom,
        })
    }
}

fn date_pattern() -> &'static Regex {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    DATE_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("invalid date regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEventRequest {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: Option<String>,
    #[serde(rename = "type")]
    pub kind: EventKind,
}
