use std::cell::RefCell;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::notify::{Notifier, Severity};
use crate::storage::event_store::EventStore;
use crate::storage::stats::Stats;
use crate::sync::backend_api::{ApiError, CalendarBackend};

const SYNC_FAILED: &str = "Failed to sync with Google Classroom and Calendar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStep {
    pub number: u8,
    pub name: &'static str,
    pub description: &'static str,
}

pub const SYNC_STEPS: [SyncStep; 5] = [
    SyncStep {
        number: 1,
        name: "Fetching Assignments",
        description: "Getting assignments from Google Classroom",
    },
    SyncStep {
        number: 2,
        name: "Fetching Announcements",
        description: "Getting announcements from Google Classroom",
    },
    SyncStep {
        number: 3,
        name: "Syncing Assignments",
        description: "Creating calendar events for assignments",
    },
    SyncStep {
        number: 4,
        name: "Syncing Announcements",
        description: "Creating calendar events for announcements",
    },
    SyncStep {
        number: 5,
        name: "Complete",
        description: "Sync process completed successfully",
    },
];

pub const STEP_COUNT: u8 = SYNC_STEPS.len() as u8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("A sync is already running")]
    AlreadyRunning,
    #[error("Sync failed: {reason}")]
    Failed { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    Running {
        step: u8,
    },
    Complete,
    Failed {
        step: u8,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    phase: SyncPhase,
    current_action: String,
    last_synced_at: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &SyncPhase {
        &self.phase
    }

    pub fn step(&self) -> u8 {
        match &self.phase {
            SyncPhase::Idle => 0,
            SyncPhase::Running { step } | SyncPhase::Failed { step, .. } => *step,
            SyncPhase::Complete => STEP_COUNT,
        }
    }

    pub fn progress(&self) -> u8 {
        (u32::from(self.step()) * 100 / u32::from(STEP_COUNT)) as u8
    }

    pub fn current_step(&self) -> Option<&'static SyncStep> {
        SYNC_STEPS.iter().find(|s| s.number == self.step())
    }

    pub fn current_action(&self) -> &str {
        &self.current_action
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            SyncPhase::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SyncPhase::Running { .. })
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn begin(&mut self) -> bool {
        if self.is_loading() {
            return false;
        }
        self.phase = SyncPhase::Running { step: 1 };
        self.current_action = "Starting sync process...".to_string();
        true
    }

    pub fn advance(&mut self, step: u8) -> bool {
        match self.phase {
            SyncPhase::Running { step: current } if step > current && step <= STEP_COUNT => {
                self.phase = SyncPhase::Running { step };
                if step == STEP_COUNT {
                    self.current_action = "Sync complete!".to_string();
                }
                true
            }
            _ => false,
        }
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> bool {
        if !self.is_loading() {
            return false;
        }
        self.advance(STEP_COUNT);
        self.phase = SyncPhase::Complete;
        self.last_synced_at = Some(at);
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let SyncPhase::Running { step } = self.phase else {
            return false;
        };
        let reason = reason.into();
        self.current_action = format!("Error during sync: {}", reason);
        self.phase = SyncPhase::Failed { step, reason };
        true
    }
}

pub struct SyncController {
    backend: Arc<dyn CalendarBackend>,
    notifier: Arc<dyn Notifier>,
    state: RefCell<SyncState>,
}

impl SyncController {
    pub fn new(backend: Arc<dyn CalendarBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            state: RefCell::new(SyncState::new()),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub async fn start(&self, store: &EventStore) -> Result<Stats, SyncError> {
        let began = self.state.borrow_mut().begin();
        if !began {
            tracing::warn!("Sync requested while another is running");
            return Err(SyncError::AlreadyRunning);
        }

        tracing::info!("Starting sync");
        let result = self.backend.sync_all().await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Error during sync: {}", e);
                return Err(self.fail(reason_for(&e)));
            }
        };

        if let Some(first) = report.errors.first() {
            tracing::error!("Sync pipeline reported {} errors", report.errors.len());
            return Err(self.fail(first.clone()));
        }

        let stats = report.snapshot.stats;
        store.replace(report.snapshot);
        self.state.borrow_mut().complete(Utc::now());

        tracing::info!("Sync complete: {} events", store.len());
        self.notifier
            .notify(Severity::Success, "Successfully synchronized with Google Calendar");
        Ok(stats)
    }

    fn fail(&self, reason: String) -> SyncError {
        self.state.borrow_mut().fail(reason.clone());
        self.notifier.notify(Severity::Error, "Sync failed. Please try again.");
        SyncError::Failed { reason }
    }
}

fn reason_for(error: &ApiError) -> String {
    error.detail().unwrap_or(SYNC_FAILED).to_string()
}
