pub mod backend_api;
pub mod sync_controller;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend_api::{ApiError, CalendarBackend, EventSnapshot, HttpBackend, SyncReport};
pub use sync_controller::{SYNC_STEPS, SyncController, SyncError, SyncPhase, SyncState, SyncStep};
