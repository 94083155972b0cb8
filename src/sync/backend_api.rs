use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::calendar::{CalendarEvent, NewEventRequest};
use crate::storage::config::BackendConfig;
use crate::storage::stats::Stats;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Not authenticated: {}", .detail.as_deref().unwrap_or("please log in first"))]
    Unauthorized { detail: Option<String> },
    #[error("Status {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { detail } | ApiError::Server { detail, .. } => {
                detail.as_deref()
            }
            ApiError::Http(_) | ApiError::Parse(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSnapshot {
    pub events: Vec<CalendarEvent>,
    pub stats: Stats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub snapshot: EventSnapshot,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AuthStatusResponse {
    #[serde(default)]
    authenticated: bool,
}

#[derive(Debug, Deserialize)]
struct ListEventsResponse {
    calendar_events: Option<Vec<serde_json::Value>>,
    stats: Option<ListStats>,
}

#[derive(Debug, Deserialize)]
struct ListStats {
    assignments: Option<u32>,
    announcements: Option<u32>,
    total_calendar_events: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SyncAllResponse {
    calendar_events: Option<Vec<serde_json::Value>>,
    sync_stats: Option<SyncStats>,
    errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SyncStats {
    assignments_count: Option<u32>,
    announcements_count: Option<u32>,
    total_calendar_events: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl From<ListStats> for Stats {
    fn from(stats: ListStats) -> Self {
        Stats::new(
            stats.assignments.unwrap_or(0),
            stats.announcements.unwrap_or(0),
            stats.total_calendar_events.unwrap_or(0),
        )
    }
}

impl From<SyncStats> for Stats {
    fn from(stats: SyncStats) -> Self {
        Stats::new(
            stats.assignments_count.unwrap_or(0),
            stats.announcements_count.unwrap_or(0),
            stats.total_calendar_events.unwrap_or(0),
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn check_auth_status(&self) -> Result<bool, ApiError>;

    async fn logout(&self) -> Result<(), ApiError>;

    async fn list_events(&self) -> Result<EventSnapshot, ApiError>;

    async fn sync_all(&self) -> Result<SyncReport, ApiError>;

    async fn create_event(&self, request: &NewEventRequest) -> Result<CalendarEvent, ApiError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), ApiError>;

    fn login_url(&self) -> String;
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().cookie_store(config.include_credentials);

        if let Some(cookie) = config
            .session_cookie
            .as_deref()
            .filter(|_| config.include_credentials)
        {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ApiError::Parse(format!("Invalid session cookie: {}", e)))?;
            let mut headers = HeaderMap::new();
            headers.insert(COOKIE, value);
            builder = builder.default_headers(headers);
        }

        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn error_for(response: reqwest::Response, action: &str) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = parse_detail(&body);
        tracing::error!("Failed to {}. Status: {}, Body: {}", action, status, body);

        if status == 401 {
            ApiError::Unauthorized { detail }
        } else {
            ApiError::Server {
                status: status.as_u16(),
                detail,
            }
        }
    }
}

fn parse_detail(body: &str) -> Option<String> {
    let detail = serde_json::from_str::<ErrorBody>(body).ok()?.detail?;
    match detail {
        serde_json::Value::String(message) => Some(message),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

// One malformed entry must not hide the rest.
fn decode_events(values: Vec<serde_json::Value>) -> Vec<CalendarEvent> {
    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<CalendarEvent>(value) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Skipping malformed calendar event: {}", e);
                None
            }
        })
        .collect()
}

fn snapshot_from(
    values: Option<Vec<serde_json::Value>>,
    stats: Option<Stats>,
) -> Result<EventSnapshot, ApiError> {
    let values =
        values.ok_or_else(|| ApiError::Parse("Response has no calendar_events".to_string()))?;
    let events = decode_events(values);
    let stats = stats.unwrap_or_else(|| {
        tracing::warn!("Response has no stats, counting {} events locally", events.len());
        Stats::from_events(&events)
    });
    Ok(EventSnapshot { events, stats })
}

#[async_trait]
impl CalendarBackend for HttpBackend {
    async fn check_auth_status(&self) -> Result<bool, ApiError> {
        let response = self.client.get(self.url("/check-auth-status")).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, "check auth status").await);
        }

        let status: AuthStatusResponse = response.json().await?;
        tracing::info!("Auth status: authenticated={}", status.authenticated);
        Ok(status.authenticated)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let response = self.client.get(self.url("/logout")).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, "log out").await);
        }

        tracing::info!("Logged out");
        Ok(())
    }

    async fn list_events(&self) -> Result<EventSnapshot, ApiError> {
        tracing::info!("Fetching calendar events");

        let response = self.client.get(self.url("/list-calendar-events")).send().await?;

        let status = response.status();
        tracing::info!("List events response status: {}", status);

        if !status.is_success() {
            return Err(Self::error_for(response, "list calendar events").await);
        }

        let body: ListEventsResponse = response.json().await?;
        let snapshot = snapshot_from(body.calendar_events, body.stats.map(Stats::from))?;

        tracing::info!("Fetched {} events successfully", snapshot.events.len());
        Ok(snapshot)
    }

    async fn sync_all(&self) -> Result<SyncReport, ApiError> {
        tracing::info!("Requesting full sync");

        let response = self.client.get(self.url("/sync-all")).send().await?;

        let status = response.status();
        tracing::info!("Sync response status: {}", status);

        if !status.is_success() {
            return Err(Self::error_for(response, "sync").await);
        }

        let body: SyncAllResponse = response.json().await?;
        let snapshot = snapshot_from(body.calendar_events, body.sync_stats.map(Stats::from))?;
        let errors = body.errors.unwrap_or_default();

        if !errors.is_empty() {
            tracing::warn!("Sync reported errors: {:?}", errors);
        }

        tracing::info!("Sync returned {} events", snapshot.events.len());
        Ok(SyncReport {
            snapshot,
            errors,
        })
    }

    async fn create_event(&self, request: &NewEventRequest) -> Result<CalendarEvent, ApiError> {
        let url = self.url("/calendar-event");

        tracing::info!("Creating event: {} on {}", request.title, request.date);
        tracing::debug!("POST {} with payload: {:?}", url, request);

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        tracing::info!("Create event response status: {}", status);

        if !status.is_success() {
            return Err(Self::error_for(response, "create event").await);
        }

        let body: serde_json::Value = response.json().await?;
        let created: CalendarEvent = serde_json::from_value(body)
            .map_err(|e| ApiError::Parse(format!("Invalid created event: {}", e)))?;

        if created.id.is_empty() {
            return Err(ApiError::Parse("Created event has no id".to_string()));
        }

        tracing::info!("Event created successfully with ID: {}", created.id);
        Ok(created)
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/calendar-event/{}", urlencoding::encode(event_id)));

        tracing::info!("Deleting event {}", event_id);

        let response = self.client.delete(&url).send().await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response, "delete event").await);
        }

        tracing::info!("Event {} deleted successfully", event_id);
        Ok(())
    }

    fn login_url(&self) -> String {
        self.url("/login")
    }
}
