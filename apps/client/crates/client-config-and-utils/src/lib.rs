//! Configuration, paths, errors and logging setup shared by the Glassquote client crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_BASE_URL, DEFAULT_LOGIN_PATH, DEFAULT_LOG_LEVEL, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_PROACTIVE_REFRESH_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
