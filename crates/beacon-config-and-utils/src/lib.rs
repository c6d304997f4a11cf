//! Settings, paths, and logging for Beacon event delivery.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_COLLECTOR_URL, DEFAULT_LOG_LEVEL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_SWEEP_BATCH_SIZE, DEFAULT_SWEEP_INTERVAL_SECS, MIN_SWEEP_INTERVAL_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, LogFormat};
pub use paths::Paths;
