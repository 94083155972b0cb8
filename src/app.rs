use std::cell::Cell;
use std::sync::Arc;

use chrono::Local;

use crate::calendar::time_codec::format_instant_in;
use crate::calendar::{CalendarEvent, EventFilter};
use crate::notify::{Notifier, Severity};
use crate::storage::config::BackendConfig;
use crate::storage::event_store::{EventStore, StoreError};
use crate::storage::stats::Stats;
use crate::sync::backend_api::{ApiError, CalendarBackend, HttpBackend};
use crate::sync::sync_controller::{SyncController, SyncError, SyncState};

const NO_MATCHES: &str = "No events match your current filter.";
const NO_EVENTS: &str = "No calendar events found. Sync with Google Classroom to create events.";

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub authenticated: bool,
    pub filter: EventFilter,
    pub stats: Stats,
    pub events: Vec<CalendarEvent>,
    pub sync: SyncState,
    cached_count: usize,
}

impl DashboardView {
    pub fn last_synced(&self) -> String {
        match self.sync.last_synced_at() {
            Some(at) => format_instant_in(at, &Local),
            None => "Never".to_string(),
        }
    }

    pub fn sync_error(&self) -> Option<&str> {
        self.sync.error()
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        if !self.events.is_empty() {
            None
        } else if self.cached_count > 0 {
            Some(NO_MATCHES)
        } else {
            Some(NO_EVENTS)
        }
    }
}

pub struct Dashboard {
    backend: Arc<dyn CalendarBackend>,
    notifier: Arc<dyn Notifier>,
    store: EventStore,
    sync: SyncController,
    authenticated: Cell<bool>,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn CalendarBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store: EventStore::new(backend.clone(), notifier.clone()),
            sync: SyncController::new(backend.clone(), notifier.clone()),
            backend,
            notifier,
            authenticated: Cell::new(false),
        }
    }

    pub fn from_config(
        config: &BackendConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let backend = HttpBackend::new(config)?;
        Ok(Self::new(Arc::new(backend), notifier))
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn sync_controller(&self) -> &SyncController {
        &self.sync
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.get()
    }

    pub async fn check_auth(&self) -> bool {
        let authenticated = match self.backend.check_auth_status().await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                tracing::error!("Error checking auth status: {}", e);
                false
            }
        };
        self.authenticated.set(authenticated);
        authenticated
    }

    pub async fn load(&self) -> Result<bool, StoreError> {
        if !self.check_auth().await {
            tracing::info!("Not authenticated, skipping event fetch");
            return Ok(false);
        }
        self.store.fetch().await?;
        Ok(true)
    }

    pub fn login_url(&self) -> String {
        self.backend.login_url()
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        match self.backend.logout().await {
            Ok(()) => {
                self.authenticated.set(false);
                self.notifier.notify(Severity::Success, "Logged out successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error logging out: {}", e);
                self.notifier.notify(Severity::Error, "Logout failed");
                Err(e)
            }
        }
    }

    pub async fn sync(&self) -> Result<Stats, SyncError> {
        self.sync.start(&self.store).await
    }

    pub fn view(&self, filter: EventFilter) -> DashboardView {
        DashboardView {
            authenticated: self.is_authenticated(),
            filter,
            stats: self.store.stats(),
            events: self.store.filtered(filter),
            sync: self.sync.state(),
            cached_count: self.store.len(),
        }
    }
}
