pub mod event;
pub mod time_codec;

pub use event::{
    CalendarEvent, DraftError, EventDraft, EventFilter, EventKind, EventStart, NewEventRequest,
    filter_events,
};
pub use time_codec::{
    TimeCodecError, decode_utc_to_local_display, encode_local_time_to_utc,
    local_utc_offset_minutes,
};
