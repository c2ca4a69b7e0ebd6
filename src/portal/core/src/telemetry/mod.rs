//! Logging and metrics plumbing.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor};
pub use self::metrics::{record_session_state, register_metric_descriptions};
