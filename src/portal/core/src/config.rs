//! Configuration management.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, then `PORTAL__*` environment variables (`PORTAL__SESSION__READY_TIMEOUT=3s`).
//! A `.env` file is read first when present.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{PortalError, Result};
use crate::events::EventNameTable;
use crate::navigation::PathTable;
use crate::session::RetryPolicy;
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "PORTAL";
const ENV_SEPARATOR: &str = "__";

/// Main portal configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    /// Symbolic path table. Required before any page boots.
    #[serde(default)]
    pub paths: Option<PathTable>,

    /// Event-name table. Required before any page boots.
    #[serde(default)]
    pub events: Option<EventNameTable>,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// How long a page waits for the session before booting unauthenticated
    #[serde(default = "default_ready_timeout", with = "humantime_serde")]
    pub ready_timeout: Duration,

    /// Retry schedule for gateway outages during initialization
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout: default_ready_timeout(),
            retry: RetryPolicy::default(),
            min_password_length: default_min_password_length(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Public origin of the portal; password-reset links point back here
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            site_origin: default_site_origin(),
        }
    }
}

fn default_ready_timeout() -> Duration { Duration::from_secs(5) }
fn default_min_password_length() -> usize { 8 }
fn default_site_origin() -> String { "http://localhost:8080".to_string() }

impl Default for PortalConfig {
    /// Defaults with both static tables present.
    fn default() -> Self {
        Self {
            paths: Some(PathTable::default()),
            events: Some(EventNameTable::default()),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PortalConfig {
    /// Load configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?;

        let cfg: PortalConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?;

        let cfg: PortalConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Both static tables, checked for completeness.
    ///
    /// # Errors
    ///
    /// `ConfigurationError` if either table is missing or malformed.
    pub fn require_tables(&self) -> Result<(&PathTable, &EventNameTable)> {
        let paths = self
            .paths
            .as_ref()
            .ok_or_else(|| {
                PortalError::configuration("Path configuration is missing")
                    .with_context("table", "paths")
            })?;
        let events = self
            .events
            .as_ref()
            .ok_or_else(|| {
                PortalError::configuration("Event name configuration is missing")
                    .with_context("table", "events")
            })?;

        paths.validate()?;
        events.validate()?;
        Ok((paths, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::io::Write;

    #[test]
    fn test_defaults_carry_both_tables() {
        let config = PortalConfig::default();
        let (paths, events) = config.require_tables().unwrap();
        assert_eq!(paths.login, "/login.html");
        assert_eq!(events.module_ready, "auth:module:ready");
        assert_eq!(config.session.ready_timeout, Duration::from_secs(5));
        assert_eq!(config.session.min_password_length, 8);
    }

    #[test]
    fn test_missing_tables_are_configuration_errors() {
        let config = PortalConfig {
            paths: None,
            ..PortalConfig::default()
        };
        let err = config.require_tables().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert_eq!(err.details().context["table"], "paths");

        let config = PortalConfig {
            events: None,
            ..PortalConfig::default()
        };
        let err = config.require_tables().unwrap_err();
        assert_eq!(err.details().context["table"], "events");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[paths]
login = "/signin.html"

[events]
error = "auth:error"

[session]
ready_timeout = "2s"
min_password_length = 12

[session.retry]
max_attempts = 5
base_delay = "200ms"

[gateway]
site_origin = "https://portal.uni.test"
"#
        )
        .unwrap();

        let config = PortalConfig::from_file(file.path().to_str().unwrap()).unwrap();
        let (paths, events) = config.require_tables().unwrap();
        assert_eq!(paths.login, "/signin.html");
        assert_eq!(paths.student_dashboard, "/student.html");
        assert_eq!(events.error, "auth:error");
        assert_eq!(config.session.ready_timeout, Duration::from_secs(2));
        assert_eq!(config.session.min_password_length, 12);
        assert_eq!(config.session.retry.max_attempts, 5);
        assert_eq!(config.session.retry.base_delay, Duration::from_millis(200));
        assert_eq!(config.gateway.site_origin, "https://portal.uni.test");
    }

    #[test]
    fn test_file_without_tables() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[session]\nmin_password_length = 10").unwrap();

        let config = PortalConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.paths.is_none());
        assert!(config.require_tables().is_err());
    }
}
