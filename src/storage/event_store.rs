use std::cell::{Cell, RefCell};
use std::sync::Arc;

use thiserror::Error;

use crate::calendar::{
    CalendarEvent, DraftError, EventDraft, EventFilter, filter_events, local_utc_offset_minutes,
};
use crate::notify::{Notifier, Severity};
use crate::storage::stats::{Stats, StatsAggregator};
use crate::sync::backend_api::{ApiError, CalendarBackend, EventSnapshot};

const FETCH_FAILED: &str = "Failed to fetch calendar events";
const ADD_FAILED: &str = "Failed to add event";
const DELETE_FAILED: &str = "Failed to delete event";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidDraft(#[from] DraftError),
    #[error("Failed to fetch calendar events: {0}")]
    Fetch(#[source] ApiError),
    #[error("{message}")]
    Mutation {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl StoreError {
    fn mutation(source: ApiError, fallback: &str) -> Self {
        let message = source.detail().unwrap_or(fallback).to_string();
        StoreError::Mutation { message, source }
    }

    pub fn user_message(&self) -> String {
        match self {
            StoreError::InvalidDraft(e) => e.to_string(),
            StoreError::Fetch(_) => FETCH_FAILED.to_string(),
            StoreError::Mutation { message, .. } => message.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    events: Vec<CalendarEvent>,
    stats: StatsAggregator,
}

pub struct EventStore {
    backend: Arc<dyn CalendarBackend>,
    notifier: Arc<dyn Notifier>,
    state: RefCell<StoreState>,
    fetching: Cell<bool>,
}

impl EventStore {
    pub fn new(backend: Arc<dyn CalendarBackend>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            notifier,
            state: RefCell::new(StoreState::default()),
            fetching: Cell::new(false),
        }
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        self.state.borrow().events.clone()
    }

    pub fn filtered(&self, filter: EventFilter) -> Vec<CalendarEvent> {
        let state = self.state.borrow();
        filter_events(&state.events, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.borrow().events.iter().any(|event| event.id == id)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> Stats {
        self.state.borrow().stats.current()
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching.get()
    }

    pub fn replace(&self, snapshot: EventSnapshot) {
        let mut state = self.state.borrow_mut();
        tracing::info!(
            "Replacing {} cached events with {} from server",
            state.events.len(),
            snapshot.events.len()
        );
        if snapshot.stats.total_events as usize != snapshot.events.len() {
            tracing::warn!(
                "Server reports {} events but sent {}",
                snapshot.stats.total_events,
                snapshot.events.len()
            );
        }
        state.events = snapshot.events;
        state.stats.apply_snapshot(snapshot.stats);
    }

    pub async fn fetch(&self) -> Result<usize, StoreError> {
        self.fetching.set(true);
        let result = self.backend.list_events().await;
        self.fetching.set(false);

        match result {
            Ok(snapshot) => {
                let count = snapshot.events.len();
                self.replace(snapshot);
                Ok(count)
            }
            Err(e) => {
                tracing::error!("Error fetching calendar events: {}", e);
                self.notifier.notify(Severity::Error, FETCH_FAILED);
                Err(StoreError::Fetch(e))
            }
        }
    }

    pub async fn add(&self, draft: &EventDraft) -> Result<CalendarEvent, StoreError> {
        self.add_with_offset(draft, local_utc_offset_minutes()).await
    }

    pub async fn add_with_offset(
        &self,
        draft: &EventDraft,
        utc_offset_minutes: i32,
    ) -> Result<CalendarEvent, StoreError> {
        let request = draft.to_request(utc_offset_minutes).inspect_err(|e| {
            tracing::warn!("Rejected event draft: {}", e);
            self.notifier.notify(Severity::Error, &e.to_string());
        })?;

        self.notifier.notify(Severity::Info, "Adding event...");

        match self.backend.create_event(&request).await {
            Ok(created) => {
                let mut state = self.state.borrow_mut();
                state.events.push(created.clone());
                state.stats.adjust_total(1);
                drop(state);

                self.notifier.notify(Severity::Success, "Event added successfully");
                Ok(created)
            }
            Err(e) => {
                tracing::error!("Error adding event: {}", e);
                let err = StoreError::mutation(e, ADD_FAILED);
                self.notifier
                    .notify(Severity::Error, &format!("Error: {}", err.user_message()));
                Err(err)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.notifier.notify(Severity::Info, "Deleting event...");

        match self.backend.delete_event(id).await {
            Ok(()) => {
                let mut state = self.state.borrow_mut();
                state.events.retain(|event| event.id != id);
                state.stats.adjust_total(-1);
                drop(state);

                self.notifier.notify(Severity::Success, "Event deleted successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!("Error deleting event {}: {}", id, e);
                let err = StoreError::mutation(e, DELETE_FAILED);
                self.notifier
                    .notify(Severity::Error, &format!("Error: {}", err.user_message()));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{EventKind, EventStart};
    use crate::notify::RecordingNotifier;
    use crate::sync::backend_api::MockCalendarBackend;
    use crate::sync::test_support::{GatedBackend, event, snapshot_of};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_pending, assert_ready};

    fn store_with(backend: MockCalendarBackend) -> (EventStore, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let store = EventStore::new(Arc::new(backend), notifier.clone());
        (store, notifier)
    }

    fn loaded_store(
        backend: MockCalendarBackend,
        ids: &[&str],
    ) -> (EventStore, Arc<RecordingNotifier>) {
        let (store, notifier) = store_with(backend);
        let events = ids.iter().map(|id| event(id, EventKind::Assignment)).collect();
        store.replace(snapshot_of(events));
        (store, notifier)
    }

    fn created(id: &str) -> CalendarEvent {
        CalendarEvent {
            start: EventStart::At(Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap()),
            ..event(id, EventKind::Custom)
        }
    }

    #[test]
    fn new_store_is_empty() {
        let (store, _) = store_with(MockCalendarBackend::new());

        assert!(store.is_empty());
        assert_eq!(store.stats(), Stats::default());
    }

    #[tokio::test]
    async fn fetch_replaces_events_and_stats() {
        let mut backend = MockCalendarBackend::new();
        backend
            .expect_list_events()
            .times(1)
            .returning(|| {
                Ok(snapshot_of(vec![
                    event("a1", EventKind::Assignment),
                    event("n1", EventKind::Announcement),
                ]))
            });
        let (store, _) = loaded_store(backend, &["old1", "old2", "old3"]);

        let count = store.fetch().await.unwrap();

        assert_eq!(count, 2);
        assert!(!store.contains("old1"));
        assert_eq!(store.stats(), Stats::new(1, 1, 2));
        assert_eq!(store.stats().total_events as usize, store.len());
    }

    #[tokio::test]
    async fn repeated_fetch_of_same_snapshot_leaves_store_unchanged() {
        let mut backend = MockCalendarBackend::new();
        backend
            .expect_list_events()
            .times(2)
            .returning(|| {
                Ok(snapshot_of(vec![
                    event("a1", EventKind::Assignment),
                    event("c1", EventKind::Custom),
                ]))
            });
        let (store, _) = store_with(backend);

        store.fetch().await.unwrap();
        let first = (store.events(), store.stats());
        store.fetch().await.unwrap();

        assert_eq!((store.events(), store.stats()), first);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_events() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_list_events().returning(|| {
            Err(ApiError::Server {
                status: 500,
                detail: None,
            })
        });
        let (store, notifier) = loaded_store(backend, &["a1", "a2"]);

        let result = store.fetch().await;

        assert!(matches!(result, Err(StoreError::Fetch(_))));
        assert_eq!(store.len(), 2);
        assert!(!store.is_fetching());
        assert_eq!(notifier.messages(Severity::Error), vec![FETCH_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn add_with_invalid_date_never_reaches_the_server() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_create_event().never();
        let (store, notifier) = loaded_store(backend, &["a1"]);

        let result = store
            .add_with_offset(&EventDraft::new("Exam", "2024-13-01"), 0)
            .await;

        assert!(matches!(result, Err(StoreError::InvalidDraft(DraftError::InvalidDate(_)))));
        assert_eq!(store.len(), 1);
        assert_eq!(notifier.last().map(|n| n.severity), Some(Severity::Error));
    }

    #[tokio::test]
    async fn add_with_invalid_time_never_reaches_the_server() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_create_event().never();
        let (store, _) = store_with(backend);

        let draft = EventDraft::new("Exam", "2024-05-01").with_time("25:00");
        let result = store.add_with_offset(&draft, 0).await;

        assert!(matches!(result, Err(StoreError::InvalidDraft(DraftError::InvalidTime(_)))));
    }

    #[tokio::test]
    async fn add_sends_utc_time_and_appends_server_event() {
        let mut backend = MockCalendarBackend::new();
        backend
            .expect_create_event()
            .withf(|request| {
                request.time.as_deref() == Some("03:30") && request.kind == EventKind::Custom
            })
            .times(1)
            .returning(|_| Ok(created("srv-42")));
        let (store, notifier) = loaded_store(backend, &["a1", "a2"]);
        let before = store.stats();

        let draft = EventDraft::new("Study group", "2024-05-01").with_time("09:00");
        let event = store.add_with_offset(&draft, -330).await.unwrap();

        assert_eq!(event.id, "srv-42");
        assert_eq!(store.len(), 3);
        assert!(store.contains("srv-42"));
        assert_eq!(store.stats().total_events, before.total_events + 1);
        assert_eq!(store.stats().assignments, before.assignments);
        assert_eq!(
            notifier.messages(Severity::Success),
            vec!["Event added successfully".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_add_surfaces_server_detail() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_create_event().returning(|_| {
            Err(ApiError::Server {
                status: 400,
                detail: Some("Missing required fields: title and date are required".to_string()),
            })
        });
        let (store, notifier) = loaded_store(backend, &["a1"]);

        let err = store
            .add_with_offset(&EventDraft::new("Exam", "2024-05-01"), 0)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Missing required fields: title and date are required");
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().total_events, 1);
        assert_eq!(
            notifier.last().map(|n| n.message),
            Some("Error: Missing required fields: title and date are required".to_string())
        );
    }

    #[tokio::test]
    async fn failed_add_without_detail_uses_fallback() {
        let mut backend = MockCalendarBackend::new();
        backend
            .expect_create_event()
            .returning(|_| Err(ApiError::Parse("Created event has no id".to_string())));
        let (store, _) = store_with(backend);

        let err = store
            .add_with_offset(&EventDraft::new("Exam", "2024-05-01"), 0)
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), ADD_FAILED);
    }

    #[tokio::test]
    async fn delete_removes_event_and_decrements_total() {
        let mut backend = MockCalendarBackend::new();
        backend
            .expect_delete_event()
            .withf(|id| id == "a2")
            .times(1)
            .returning(|_| Ok(()));
        let (store, _) = loaded_store(backend, &["a1", "a2", "a3"]);

        store.delete("a2").await.unwrap();

        assert!(!store.contains("a2"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().total_events, 2);
    }

    #[tokio::test]
    async fn delete_of_absent_id_still_decrements_but_not_below_zero() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_delete_event().times(2).returning(|_| Ok(()));
        let (store, _) = store_with(backend);
        store.replace(EventSnapshot {
            events: vec![],
            stats: Stats::new(0, 0, 1),
        });

        store.delete("gone").await.unwrap();
        store.delete("gone").await.unwrap();

        assert_eq!(store.stats().total_events, 0);
    }

    #[tokio::test]
    async fn failed_delete_keeps_event() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_delete_event().returning(|_| {
            Err(ApiError::Server {
                status: 500,
                detail: Some("Failed to delete event: Not Found".to_string()),
            })
        });
        let (store, _) = loaded_store(backend, &["a1"]);

        let err = store.delete("a1").await.unwrap_err();

        assert!(store.contains("a1"));
        assert_eq!(store.stats().total_events, 1);
        assert_eq!(err.user_message(), "Failed to delete event: Not Found");
    }

    #[tokio::test]
    async fn local_total_drifts_from_server_until_next_snapshot() {
        let mut backend = MockCalendarBackend::new();
        backend.expect_create_event().returning(|_| Ok(created("srv-1")));
        backend.expect_list_events().returning(|| {
            Ok(EventSnapshot {
                events: vec![event("a1", EventKind::Assignment)],
                stats: Stats::new(1, 0, 1),
            })
        });
        let (store, _) = store_with(backend);
        store.replace(EventSnapshot {
            events: vec![event("a1", EventKind::Assignment)],
            stats: Stats::new(1, 0, 5),
        });

        store
            .add_with_offset(&EventDraft::new("Exam", "2024-05-01"), 0)
            .await
            .unwrap();
        assert_eq!(store.stats().total_events, 6);
        assert_eq!(store.len(), 2);

        store.fetch().await.unwrap();
        assert_eq!(store.stats().total_events, 1);
    }

    #[test]
    fn filtered_view_does_not_touch_store() {
        let (store, _) = store_with(MockCalendarBackend::new());
        store.replace(snapshot_of(vec![
            event("a1", EventKind::Assignment),
            event("c1", EventKind::Custom),
        ]));

        let customs = store.filtered(EventFilter::Kind(EventKind::Custom));

        assert_eq!(customs.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn nothing_changes_until_the_server_answers() {
        let (backend, gates) = GatedBackend::new();
        let store = EventStore::new(backend, Arc::new(RecordingNotifier::new()));
        store.replace(snapshot_of(vec![event("a1", EventKind::Assignment)]));

        let draft = EventDraft::new("Exam", "2024-05-01");
        let mut add = tokio_test::task::spawn(store.add_with_offset(&draft, 0));
        assert_pending!(add.poll());
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().total_events, 1);

        gates.create.send(Ok(created("srv-9"))).unwrap();
        assert!(assert_ready!(add.poll()).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_add_and_delete_apply_in_completion_order() {
        let (backend, gates) = GatedBackend::new();
        let store = EventStore::new(backend, Arc::new(RecordingNotifier::new()));
        store.replace(snapshot_of(vec![
            event("a1", EventKind::Assignment),
            event("a2", EventKind::Assignment),
        ]));

        let draft = EventDraft::new("Exam", "2024-05-01");
        let mut add = tokio_test::task::spawn(store.add_with_offset(&draft, 0));
        let mut delete = tokio_test::task::spawn(store.delete("a1"));
        assert_pending!(add.poll());
        assert_pending!(delete.poll());

        gates.delete.send(Ok(())).unwrap();
        assert!(assert_ready!(delete.poll()).is_ok());
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().total_events, 1);

        gates.create.send(Ok(created("srv-7"))).unwrap();
        assert!(assert_ready!(add.poll()).is_ok());

        let ids: Vec<String> = store.events().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a2".to_string(), "srv-7".to_string()]);
        assert_eq!(store.stats().total_events, 2);
    }
}
