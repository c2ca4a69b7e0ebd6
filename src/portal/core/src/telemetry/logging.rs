//! Structured logging with JSON/pretty/compact output and redaction of
//! credentials.
//!
//! Passwords never reach a log line through the session core, but paths and
//! gateway messages can carry tokens (a reset link lands on the reset page
//! with `#access_token=...`). The [`SensitiveFieldRedactor`] masks those.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global filter directive (`info`, `portal_core=debug`, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module levels layered on top of `level`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    #[serde(default = "default_include_location")]
    pub include_location: bool,

    #[serde(default = "default_include_target")]
    pub include_target: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: default_include_location(),
            include_target: default_include_target(),
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Redaction settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    /// Field names (substring, case-insensitive) whose values are masked
    #[serde(default = "default_sensitive_fields")]
    pub field_names: Vec<String>,

    /// Regexes masked wherever they occur in a value
    #[serde(default = "default_value_patterns")]
    pub value_patterns: Vec<String>,

    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            field_names: default_sensitive_fields(),
            value_patterns: default_value_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// Masks sensitive fields and token-shaped substrings.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    field_names: Vec<String>,
    value_patterns: Vec<regex::Regex>,
    replacement: String,
    enabled: bool,
}

impl SensitiveFieldRedactor {
    /// Build from configuration. Invalid patterns are skipped with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let value_patterns = config
            .value_patterns
            .iter()
            .filter_map(|pattern| match regex::Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(pattern = %pattern, error = %e, "Ignoring invalid redaction pattern");
                    None
                }
            })
            .collect();

        Self {
            field_names: config.field_names.iter().map(|f| f.to_lowercase()).collect(),
            value_patterns,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let lower = field_name.to_lowercase();
        self.field_names.iter().any(|f| lower.contains(f.as_str()))
    }

    /// Mask every token-shaped substring of `value`.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }
        self.value_patterns
            .iter()
            .fold(value.to_string(), |acc, regex| {
                regex.replace_all(&acc, self.replacement.as_str()).into_owned()
            })
    }

    /// Mask `value` entirely if `field_name` is sensitive, otherwise only its
    /// token-shaped parts.
    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// Redactor installed by [`init_logging`], or the default one.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

fn default_log_level() -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
}

fn default_include_location() -> bool {
    true
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_sensitive_fields() -> Vec<String> {
    ["password", "passwd", "secret", "credential", "token", "authorization"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_value_patterns() -> Vec<String> {
    vec![
        // token parameters in query strings and fragments
        r"(?i)((?:access|refresh)_token|token|code)=[^&#\s]+".to_string(),
        // bare JWTs
        r"eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+".to_string(),
    ]
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if a filter directive does not parse or a subscriber is
/// already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let mut filter = EnvFilter::try_new(&config.level)?;
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_fields() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        assert!(redactor.should_redact_field("password"));
        assert!(redactor.should_redact_field("new_Password"));
        assert!(redactor.should_redact_field("access_token"));
        assert!(!redactor.should_redact_field("email"));
        assert_eq!(redactor.redact("password", "hunter22"), "[REDACTED]");
        assert_eq!(redactor.redact("email", "a@b.c"), "a@b.c");
    }

    #[test]
    fn test_tokens_in_paths_are_masked() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        let path = "/reset-password.html#access_token=abc.def&type=recovery";
        assert_eq!(
            redactor.redact_value(path),
            "/reset-password.html#[REDACTED]&type=recovery"
        );
        assert_eq!(redactor.redact_value("/student.html?tab=2"), "/student.html?tab=2");
    }

    #[test]
    fn test_disabled_redactor_passes_through() {
        let config = RedactionConfig {
            enabled: false,
            ..RedactionConfig::default()
        };
        let redactor = SensitiveFieldRedactor::new(&config);
        assert_eq!(redactor.redact("password", "x"), "x");
    }

    #[test]
    fn test_invalid_patterns_are_skipped() {
        let config = RedactionConfig {
            value_patterns: vec!["(".to_string(), "secret-[0-9]+".to_string()],
            ..RedactionConfig::default()
        };
        let redactor = SensitiveFieldRedactor::new(&config);
        assert_eq!(redactor.redact_value("id secret-42"), "id [REDACTED]");
    }

    #[test]
    fn test_init_logging_installs_once() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            module_levels: HashMap::from([("portal_core".to_string(), "debug".to_string())]),
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_err());
    }
}
