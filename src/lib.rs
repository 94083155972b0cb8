pub mod app;
pub mod calendar;
pub mod notify;
pub mod storage;
pub mod sync;

pub use app::{Dashboard, DashboardView};
pub use calendar::{CalendarEvent, EventDraft, EventFilter, EventKind, EventStart};
pub use notify::{LogNotifier, Notifier, Severity};
