use serde::Serialize;

use crate::calendar::{CalendarEvent, EventKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub assignments: u32,
    pub announcements: u32,
    pub total_events: u32,
}

impl Stats {
    pub fn new(assignments: u32, announcements: u32, total_events: u32) -> Self {
        Self {
            assignments,
            announcements,
            total_events,
        }
    }

    pub fn from_events(events: &[CalendarEvent]) -> Self {
        let count = |kind: EventKind| events.iter().filter(|e| e.kind == kind).count() as u32;
        Self {
            assignments: count(EventKind::Assignment),
            announcements: count(EventKind::Announcement),
            total_events: events.len() as u32,
        }
    }
}

// Only a snapshot sets the kind counters. Adds and deletes move the total
// locally until the next snapshot.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    current: Stats,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Stats {
        self.current
    }

    pub fn apply_snapshot(&mut self, counts: Stats) {
        self.current = counts;
    }

    pub fn adjust_total(&mut self, delta: i64) {
        let adjusted = i64::from(self.current.total_events).saturating_add(delta);
        self.current.total_events = adjusted.clamp(0, i64::from(u32::MAX)) as u32;
    }
}
