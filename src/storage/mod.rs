pub mod config;
pub mod event_store;
pub mod stats;

pub use config::{BackendConfig, Config, ConfigError};
pub use event_store::{EventStore, StoreError};
pub use stats::{Stats, StatsAggregator};
